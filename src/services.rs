pub mod renew_certificates;
