//! Watch persistence
//!
//! Watches are stored as a JSON array of [`WatchRecord`]s. Loading checks
//! every entry on its own: entries that fail to parse or describe an
//! impossible lookup are dropped, reported, and the file is rewritten
//! without them.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use luadbg_protocol::{LuaType, NameAndType, Scope};
use luadbg_utils::{LuadbgError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_STORE_FILE: &str = "watches.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomKey {
    pub guid: Uuid,
    #[serde(default)]
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub scope: Scope,
    pub names_and_types: Vec<NameAndType>,
    #[serde(default)]
    pub level: u16,
    #[serde(default)]
    pub index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomKey>,
}

impl WatchRecord {
    /// Check that the record describes a lookup the runtime can answer
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.names_and_types.is_empty() {
            return Err("empty lookup path".into());
        }
        for (i, step) in self.names_and_types.iter().enumerate() {
            if step.name.is_empty() {
                return Err(format!("path step {} has an empty name", i));
            }
            if matches!(step.lua_type, LuaType::None | LuaType::Invalid) {
                return Err(format!("path step {} has key type {}", i, step.lua_type));
            }
        }
        match self.scope {
            Scope::Global if self.level != 0 || self.index != 0 => {
                Err("global watch carries a stack level or index".into())
            }
            Scope::Local | Scope::Upvalue if self.index < 1 => {
                Err(format!("{:?} watch needs a positive index", self.scope))
            }
            _ => Ok(()),
        }
    }
}

/// An entry dropped while loading
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("watch #{position} is invalid: {reason}")]
pub struct InvalidWatch {
    /// Position in the stored array
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub watches: Vec<WatchRecord>,
    pub invalid: Vec<InvalidWatch>,
}

pub struct WatchStore {
    path: PathBuf,
}

impl WatchStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the per-user data directory
    pub fn in_default_location(file_name: &str) -> Self {
        Self::new(luadbg_utils::watch_store_dir().join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every valid record. A missing file is an empty store. Invalid
    /// entries are reported and removed from the file.
    pub fn load(&self) -> Result<LoadOutcome> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no watch store, starting empty");
                return Ok(LoadOutcome::default());
            }
            Err(source) => {
                return Err(LuadbgError::FileRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        // Corrupt beyond entry level: leave the file alone for the user.
        let entries: Vec<serde_json::Value> = serde_json::from_str(&content).map_err(|e| {
            LuadbgError::persistence(format!("{}: {}", self.path.display(), e))
        })?;

        let mut outcome = LoadOutcome::default();
        for (position, value) in entries.into_iter().enumerate() {
            let checked = serde_json::from_value::<WatchRecord>(value)
                .map_err(|e| e.to_string())
                .and_then(|record| record.validate().map(|()| record));
            match checked {
                Ok(record) => outcome.watches.push(record),
                Err(reason) => {
                    warn!(position, %reason, "dropping invalid watch");
                    outcome.invalid.push(InvalidWatch { position, reason });
                }
            }
        }

        if !outcome.invalid.is_empty() {
            self.save(&outcome.watches)?;
        }
        Ok(outcome)
    }

    pub fn save(&self, records: &[WatchRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| LuadbgError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| LuadbgError::persistence(e.to_string()))?;
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json).map_err(|source| LuadbgError::FileWrite {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|source| LuadbgError::FileWrite {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = ?self.path, count = records.len(), "watches saved");
        Ok(())
    }
}
