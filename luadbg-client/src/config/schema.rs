//! Configuration schema structs

use luadbg_protocol::{codec::DEFAULT_MAX_FRAME_SIZE, ScmpCodec, DEFAULT_LUA_PLUGIN_ID};
use luadbg_utils::LogConfig;
use serde::{Deserialize, Serialize};

use crate::analysis::{BatchPool, SyntaxCheckTask};
use crate::persistence::{WatchStore, DEFAULT_STORE_FILE};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub session: SessionConfig,
    pub watches: WatchConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

/// Connection and framing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Plugin id carried by Lua debugger frames (default: 1)
    pub plugin_id: u16,
    /// Outgoing messages queued before sends fail
    pub send_queue_depth: usize,
    /// Largest frame accepted from the runtime, in bytes
    pub max_frame_size: usize,
}

impl SessionConfig {
    /// Frame codec for the connection driver
    pub fn codec(&self) -> ScmpCodec {
        ScmpCodec::new(self.plugin_id).with_max_frame_size(self.max_frame_size)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            plugin_id: DEFAULT_LUA_PLUGIN_ID,
            send_queue_depth: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// File name inside the watch store directory
    pub store_file: String,
    /// Write the store whenever the watch set changes (default: true)
    pub auto_save: bool,
}

impl WatchConfig {
    pub fn store(&self) -> WatchStore {
        WatchStore::in_default_location(&self.store_file)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            store_file: DEFAULT_STORE_FILE.to_string(),
            auto_save: true,
        }
    }
}

/// Static analysis worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Worker count, 0 uses one per processor
    pub workers: usize,
    /// Syntax checker executable
    pub checker: String,
    /// Arguments placed before the file path
    pub checker_args: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            checker: "luac".to_string(),
            checker_args: vec!["-p".to_string()],
        }
    }
}

impl AnalysisConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.workers
        }
    }

    pub fn pool(&self) -> BatchPool {
        BatchPool::new(self.effective_workers())
    }

    pub fn syntax_task(&self) -> SyntaxCheckTask {
        SyntaxCheckTask::new(self.checker.clone(), self.checker_args.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `LUADBG_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "luadbg=info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Session logging with this filter unless `LUADBG_LOG` is set
    pub fn log_config(&self) -> LogConfig {
        match std::env::var(luadbg_utils::logging::LOG_ENV) {
            Ok(_) => LogConfig::session(),
            Err(_) => LogConfig::session().with_filter(self.filter.clone()),
        }
    }
}
