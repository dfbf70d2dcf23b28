pub mod client;
pub mod codes;
pub mod models;
