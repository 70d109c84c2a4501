//! Configuration loader

use std::path::Path;

use luadbg_utils::{config_file, LuadbgError, Result};

use super::ClientConfig;

/// Largest frame size accepted in configuration
const MAX_FRAME_CEILING: usize = 256 * 1024 * 1024;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default location
    pub fn load() -> Result<ClientConfig> {
        let path = config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(ClientConfig::default())
        }
    }

    pub fn load_from_path(path: &Path) -> Result<ClientConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| LuadbgError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<ClientConfig> {
        toml::from_str(content).map_err(|e| LuadbgError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn validate(config: &ClientConfig) -> Result<()> {
        if config.session.send_queue_depth == 0 {
            return Err(LuadbgError::config("send_queue_depth must be at least 1"));
        }

        let frame = config.session.max_frame_size;
        if frame < luadbg_protocol::HEADER_SIZE || frame > MAX_FRAME_CEILING {
            return Err(LuadbgError::config(format!(
                "max_frame_size must be between {} and {} bytes",
                luadbg_protocol::HEADER_SIZE,
                MAX_FRAME_CEILING
            )));
        }

        if config.watches.store_file.trim().is_empty() {
            return Err(LuadbgError::config("watches.store_file must not be empty"));
        }

        if config.analysis.checker.trim().is_empty() {
            return Err(LuadbgError::config("analysis.checker must not be empty"));
        }

        Ok(())
    }

    pub fn load_and_validate() -> Result<ClientConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }
}
