//! luadbg-protocol: SCMP wire definitions shared by the debugger front-end
//!
//! This crate defines the type codes, payload structures and framing codec
//! used between the IDE-side debugger and a Lua runtime. Every frame is
//! `[type_code:u16][plugin_id:u16][length:u32][payload]` in network byte
//! order; the payload shape is fully determined by the type code.

pub mod codec;
pub mod codes;
pub mod messages;
pub mod types;
mod wire;

// Re-export main types at crate root
pub use codec::{decode, encode, CodecError, Header, ScmpCodec, ScmpFrame};
pub use codes::{Direction, TypeCode};
pub use messages::Message;
pub use types::{
    CallStackFrame, EnvVar, Limits, LuaStateInfo, LuaType, LuaVar, MemoryTraceKind,
    MemoryTraceRecord, NameAndType, ProfileLookup, ProfileRecord, Scope, StackVar, VarContext,
    VarFilterName, VarFilterType, VarLookUp, VarUpdate, FILTER_SLOTS,
};

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Plugin id the Lua runtime plugin registers under unless configured otherwise
pub const DEFAULT_LUA_PLUGIN_ID: u16 = 1;
