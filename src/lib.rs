pub mod cli;
pub mod config;
pub mod db;
pub mod image;
mod metrics;
pub mod provider;
pub mod server;
pub mod store;
pub mod utils;
pub mod video;

pub use config::Opts;
pub use store::{ImageStore, ImageStoreBuilder};
