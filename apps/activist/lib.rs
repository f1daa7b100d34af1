pub mod classifier;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod prices;
pub mod snapshot_api;
pub mod summary;
