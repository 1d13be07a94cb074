pub mod certbot;
pub mod integrity;
