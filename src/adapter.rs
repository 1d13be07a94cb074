pub mod fs;
pub mod ssh;
pub mod transfer;

#[cfg(test)]
pub mod mock;
