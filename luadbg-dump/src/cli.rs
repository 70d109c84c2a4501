//! CLI argument parsing

use std::path::PathBuf;

use clap::Parser;
use luadbg_protocol::{codec::DEFAULT_MAX_FRAME_SIZE, DEFAULT_LUA_PLUGIN_ID};

/// Decode a captured SCMP byte stream and print one line per frame
#[derive(Parser, Debug)]
#[command(name = "scmp-dump")]
#[command(version)]
pub struct Cli {
    /// Capture file holding raw frames back to back
    pub file: PathBuf,

    /// Plugin id of Lua debugger frames; other ids are shown as foreign
    #[arg(long, env = "LUADBG_PLUGIN_ID", default_value_t = DEFAULT_LUA_PLUGIN_ID)]
    pub plugin_id: u16,

    /// Largest frame accepted before the stream is considered corrupt
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Print only type codes, not payloads
    #[arg(short, long)]
    pub brief: bool,
}
