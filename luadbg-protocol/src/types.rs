//! Payload types carried by SCMP messages

use serde::{Deserialize, Serialize};

/// Number of positional slots in a variable type filter.
///
/// Slot `n` filters the Lua type whose wire code is `n - 1`, so slot 0 is
/// `LUA_TNONE` and slot 8 is `LUA_TUSERDATA`.
pub const FILTER_SLOTS: usize = 9;

/// Wire code the client uses for a variable whose type the runtime never
/// reported. The runtime never sends it.
pub const INVALID_VAR_WHAT: i16 = -2;

// ==================== Lua types ====================

/// Lua runtime type tag (`lua_type()` result)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LuaType {
    None,
    #[default]
    Nil,
    Boolean,
    LightUserData,
    Number,
    String,
    Table,
    Function,
    UserData,
    Thread,
    /// Client-side sentinel for placeholder variables
    Invalid,
}

impl LuaType {
    /// Decode a wire type tag. Only -1..=8 are valid on the wire.
    pub fn from_wire(code: i16) -> Option<Self> {
        Some(match code {
            -1 => Self::None,
            0 => Self::Nil,
            1 => Self::Boolean,
            2 => Self::LightUserData,
            3 => Self::Number,
            4 => Self::String,
            5 => Self::Table,
            6 => Self::Function,
            7 => Self::UserData,
            8 => Self::Thread,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> i16 {
        match self {
            Self::None => -1,
            Self::Nil => 0,
            Self::Boolean => 1,
            Self::LightUserData => 2,
            Self::Number => 3,
            Self::String => 4,
            Self::Table => 5,
            Self::Function => 6,
            Self::UserData => 7,
            Self::Thread => 8,
            Self::Invalid => INVALID_VAR_WHAT,
        }
    }

    /// Position of this type in the fixed-width filter array
    pub fn filter_slot(self) -> Option<usize> {
        let slot = self.to_wire() + 1;
        if (0..FILTER_SLOTS as i16).contains(&slot) {
            Some(slot as usize)
        } else {
            None
        }
    }

    /// Types whose values have children the runtime can enumerate
    pub fn is_expandable(self) -> bool {
        matches!(self, Self::Table | Self::UserData)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "LUA_TNONE",
            Self::Nil => "LUA_TNIL",
            Self::Boolean => "LUA_TBOOLEAN",
            Self::LightUserData => "LUA_TLIGHTUSERDATA",
            Self::Number => "LUA_TNUMBER",
            Self::String => "LUA_TSTRING",
            Self::Table => "LUA_TTABLE",
            Self::Function => "LUA_TFUNCTION",
            Self::UserData => "LUA_TUSERDATA",
            Self::Thread => "LUA_TTHREAD",
            Self::Invalid => "INVALID",
        }
    }
}

impl std::fmt::Display for LuaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ==================== Scopes and contexts ====================

/// Variable namespace a lookup applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Local,
    Upvalue,
    Environment,
}

impl Scope {
    /// Order in which the runtime expects scope-grouped lookup batches
    pub const ALL: [Scope; 4] = [Scope::Global, Scope::Local, Scope::Upvalue, Scope::Environment];

    pub fn from_wire(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Global,
            1 => Self::Local,
            2 => Self::Upvalue,
            3 => Self::Environment,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Local => 1,
            Self::Upvalue => 2,
            Self::Environment => 3,
        }
    }

    /// Whether variables in this scope belong to a call stack level
    pub fn is_stack_bound(self) -> bool {
        !matches!(self, Self::Global)
    }
}

/// Evaluation strategy the runtime uses for a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarContext {
    Normal,
    WatchProject,
    WatchCustom,
}

impl VarContext {
    pub fn from_wire(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Normal,
            1 => Self::WatchProject,
            2 => Self::WatchCustom,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::WatchProject => 1,
            Self::WatchCustom => 2,
        }
    }

    pub fn is_watch(self) -> bool {
        !matches!(self, Self::Normal)
    }
}

// ==================== Variables ====================

/// One step of a lookup path: a table key and its key type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameAndType {
    pub name: String,
    pub lua_type: LuaType,
}

impl NameAndType {
    pub fn new(name: impl Into<String>, lua_type: LuaType) -> Self {
        Self {
            name: name.into(),
            lua_type,
        }
    }
}

/// Fields common to every variable message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LuaVar {
    /// Leaf name (the key inside its container)
    pub name: String,
    pub key_type: LuaType,
    pub value: String,
    /// Type of the value
    pub what: LuaType,
    /// Containers from the root down to (not including) this variable
    pub hierarchy: Vec<NameAndType>,
}

/// Local or upvalue variable: bound to a stack level and slot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackVar {
    pub var: LuaVar,
    pub level: u16,
    pub index: i32,
}

/// Function environment variable: bound to a stack level only
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvVar {
    pub var: LuaVar,
    pub level: u16,
}

/// Request to evaluate a variable path (and enumerate its children)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarLookUp {
    pub scope: Scope,
    pub context: VarContext,
    pub level: u16,
    pub index: i32,
    /// Set for a watch root lookup, clear for a child expansion
    pub extra: bool,
    pub names_and_types: Vec<NameAndType>,
}

/// Request to assign a new value to a variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarUpdate {
    pub lookup: VarLookUp,
    pub value: String,
    pub value_type: LuaType,
}

// ==================== Call stack ====================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallStackFrame {
    pub rel_script_path: String,
    pub current_line: i32,
    pub line_defined: i32,
    pub last_line_defined: i32,
    pub function_name: String,
    pub level: u16,
}

// ==================== Filters ====================

/// Positional type filter for one scope. `true` hides the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarFilterType {
    pub scope: Scope,
    pub filter: [bool; FILTER_SLOTS],
}

/// Name pattern filter for one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarFilterName {
    pub scope: Scope,
    pub pattern: String,
}

// ==================== Profiling ====================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileRecord {
    pub function_name: String,
    pub rel_script_path: String,
    pub time_total: f32,
    pub time_avg: f32,
    pub time_shortest: f32,
    pub time_longest: f32,
    pub time_total_inner: f32,
    pub time_avg_inner: f32,
    pub time_shortest_inner: f32,
    pub time_longest_inner: f32,
    pub num_calls: u32,
    pub line_defined: i32,
    pub last_line_defined: i32,
    pub num_funcs_called: u32,
}

/// Identifies a profiled function whose callees should be looked up
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileLookup {
    pub function_name: String,
    pub rel_script_path: String,
    pub line_defined: i32,
}

// ==================== Memory tracing ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTraceKind {
    Allocation,
    Deallocation,
    Reallocation,
}

impl MemoryTraceKind {
    pub fn from_wire(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Allocation,
            1 => Self::Deallocation,
            2 => Self::Reallocation,
            _ => return None,
        })
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Allocation => 0,
            Self::Deallocation => 1,
            Self::Reallocation => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTraceRecord {
    pub kind: MemoryTraceKind,
    pub old_ptr: u32,
    pub new_ptr: u32,
    pub old_size: i32,
    pub new_size: i32,
}

// ==================== Runtime state ====================

/// One `lua_State` hosted by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaStateInfo {
    pub address: String,
    pub name: String,
    pub debugging: bool,
}

/// Capabilities and limits reported by the runtime after connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_breakpoints: u16,
    pub max_var_filters: u16,
    pub profiler_enabled: bool,
    pub memory_tracer_enabled: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_breakpoints: 0,
            max_var_filters: 0,
            profiler_enabled: true,
            memory_tracer_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lua_type_wire_codes() {
        for code in -1..=8 {
            let ty = LuaType::from_wire(code).unwrap();
            assert_eq!(ty.to_wire(), code);
        }
        assert_eq!(LuaType::from_wire(9), None);
        assert_eq!(LuaType::from_wire(INVALID_VAR_WHAT), None);
    }

    #[test]
    fn test_filter_slots_offset_by_one() {
        assert_eq!(LuaType::None.filter_slot(), Some(0));
        assert_eq!(LuaType::Nil.filter_slot(), Some(1));
        assert_eq!(LuaType::Number.filter_slot(), Some(4));
        assert_eq!(LuaType::UserData.filter_slot(), Some(8));
        assert_eq!(LuaType::Thread.filter_slot(), None);
        assert_eq!(LuaType::Invalid.filter_slot(), None);
    }

    #[test]
    fn test_scope_order() {
        let mut scopes = vec![Scope::Environment, Scope::Global, Scope::Upvalue, Scope::Local];
        scopes.sort();
        assert_eq!(scopes, Scope::ALL.to_vec());
    }
}
