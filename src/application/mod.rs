pub mod error;
pub mod repos;
