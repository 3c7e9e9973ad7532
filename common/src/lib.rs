pub mod config;
pub mod fetched;
pub mod models;
pub mod store;

pub use fetched::Fetched;
