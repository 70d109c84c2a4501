//! luadbg-utils: Common utilities shared across luadbg crates
//!
//! This crate provides:
//! - Unified error type ([`LuadbgError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{LuadbgError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};

pub use paths::{config_dir, config_file, data_dir, log_dir, state_dir, watch_store_dir};
