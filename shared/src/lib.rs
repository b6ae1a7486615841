mod models;
pub mod utils;

pub use models::*;
pub use utils::*;
pub mod codec;
pub mod config;
pub mod dedup;
pub mod error;
pub mod seen_registry;
