pub mod config;
pub mod metadata;
pub mod server;
pub mod store;
pub mod token_id;
