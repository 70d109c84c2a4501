//! Client configuration

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::{AnalysisConfig, ClientConfig, LoggingConfig, SessionConfig, WatchConfig};
