//! Variable records and the snapshot builder
//!
//! Every variable message (global, local, upvalue, environment) becomes one
//! [`VariableRecord`]. The scope-specific fields live in [`VariableScope`].

use std::fmt;

use luadbg_protocol::{LuaType, LuaVar, Message, NameAndType, Scope, TypeCode, VarContext};
use sha2::{Digest, Sha256};

use crate::callstack::CallStack;
use crate::lookup::LookupRequest;

/// Where a variable lives in the runtime's namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableScope {
    Global,
    Local { level: u16, index: i32 },
    Upvalue { level: u16, index: i32 },
    EnvVar { level: u16 },
}

impl VariableScope {
    pub fn kind(&self) -> Scope {
        match self {
            Self::Global => Scope::Global,
            Self::Local { .. } => Scope::Local,
            Self::Upvalue { .. } => Scope::Upvalue,
            Self::EnvVar { .. } => Scope::Environment,
        }
    }

    pub fn level(&self) -> Option<u16> {
        match self {
            Self::Global => None,
            Self::Local { level, .. } | Self::Upvalue { level, .. } | Self::EnvVar { level } => {
                Some(*level)
            }
        }
    }

    pub fn index(&self) -> Option<i32> {
        match self {
            Self::Local { index, .. } | Self::Upvalue { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Rebuild a scope from its wire parts
    pub fn from_parts(scope: Scope, level: u16, index: i32) -> Self {
        match scope {
            Scope::Global => Self::Global,
            Scope::Local => Self::Local { level, index },
            Scope::Upvalue => Self::Upvalue { level, index },
            Scope::Environment => Self::EnvVar { level },
        }
    }
}

/// Content hash identifying a variable across tree rebuilds.
///
/// Computed over the structured key (scope, stack slot for locals and
/// upvalues, every hierarchy step with its key type, leaf name and key
/// type), each string length-prefixed, so `a.5.1` and `a.5` + `1.1` style
/// paths never collide and shadowed locals stay distinct.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarIdentity([u8; 32]);

impl VarIdentity {
    pub fn compute(
        scope: &VariableScope,
        hierarchy: &[NameAndType],
        display_name: &str,
        key_type: LuaType,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([scope.kind().to_wire()]);
        match scope.index() {
            Some(index) => {
                hasher.update([1]);
                hasher.update(index.to_be_bytes());
            }
            None => hasher.update([0]),
        }
        hasher.update((hierarchy.len() as u32).to_be_bytes());
        for step in hierarchy {
            hash_step(&mut hasher, &step.name, step.lua_type);
        }
        hash_step(&mut hasher, display_name, key_type);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

fn hash_step(hasher: &mut Sha256, name: &str, ty: LuaType) {
    hasher.update((name.len() as u32).to_be_bytes());
    hasher.update(name.as_bytes());
    hasher.update(ty.to_wire().to_be_bytes());
}

impl fmt::Debug for VarIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarIdentity({})", self)
    }
}

impl fmt::Display for VarIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Function owning a local or upvalue, taken from the call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub line_defined: i32,
}

/// Snapshot of one runtime variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRecord {
    pub scope: VariableScope,
    /// Full path, hierarchy names and the leaf joined with `.`
    pub name: String,
    /// Leaf name only
    pub display_name: String,
    pub value: String,
    pub key_type: LuaType,
    pub what: LuaType,
    pub hierarchy: Vec<NameAndType>,
    pub identity: VarIdentity,
    pub function: Option<FunctionInfo>,
    /// Cleared when a variable filter hides the record
    pub visible: bool,
    /// Children are re-requested on the next stop while set
    pub expanded: bool,
}

impl VariableRecord {
    pub fn new(var: &LuaVar, scope: VariableScope, function: Option<FunctionInfo>) -> Self {
        let name = flatten_name(&var.hierarchy, &var.name);
        let identity = VarIdentity::compute(&scope, &var.hierarchy, &var.name, var.key_type);
        Self {
            scope,
            name,
            display_name: var.name.clone(),
            value: var.value.clone(),
            key_type: var.key_type,
            what: var.what,
            hierarchy: var.hierarchy.clone(),
            identity,
            function,
            visible: true,
            expanded: false,
        }
    }

    /// Stand-in for a watch the runtime never answered
    pub fn placeholder(scope: VariableScope, names_and_types: &[NameAndType]) -> Self {
        let (hierarchy, leaf) = match names_and_types.split_last() {
            Some((leaf, hierarchy)) => (hierarchy.to_vec(), leaf.clone()),
            None => (Vec::new(), NameAndType::new("", LuaType::None)),
        };
        let var = LuaVar {
            name: leaf.name,
            key_type: leaf.lua_type,
            value: String::new(),
            what: LuaType::Invalid,
            hierarchy,
        };
        Self::new(&var, scope, None)
    }

    pub fn is_placeholder(&self) -> bool {
        self.what == LuaType::Invalid
    }

    pub fn is_expandable(&self) -> bool {
        self.what.is_expandable()
    }

    /// Lookup path from the root container down to this variable
    pub fn names_and_types(&self) -> Vec<NameAndType> {
        let mut path = self.hierarchy.clone();
        path.push(NameAndType::new(self.display_name.clone(), self.key_type));
        path
    }

    /// Request the runtime to enumerate this variable's children
    pub fn expansion_request(&self, context: VarContext) -> LookupRequest {
        LookupRequest {
            scope: self.scope.kind(),
            context,
            names_and_types: self.names_and_types(),
            level: self.scope.level().unwrap_or(0),
            index: self.scope.index().unwrap_or(0),
            extra: false,
        }
    }

    /// Overwrite the runtime-provided fields from a fresher snapshot,
    /// keeping GUI state
    pub fn refresh_from(&mut self, newer: VariableRecord) {
        let expanded = self.expanded;
        *self = newer;
        self.expanded = expanded;
    }
}

/// Errors turning a message into a record
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("no call stack frame at level {level}")]
    MissingFrame { level: u16 },

    #[error("type {0:?} does not carry a variable")]
    NotAVariable(TypeCode),
}

/// Convert a decoded variable message into a record.
///
/// Locals and upvalues take their owning function from the call stack
/// frame at their level, so that frame must already exist.
pub fn build_variable(message: &Message, call_stack: &CallStack) -> Result<VariableRecord, BuildError> {
    match message {
        Message::GlobalVar(var) => Ok(VariableRecord::new(var, VariableScope::Global, None)),
        Message::LocalVar(v) => {
            let function = owning_function(call_stack, v.level)?;
            let scope = VariableScope::Local {
                level: v.level,
                index: v.index,
            };
            Ok(VariableRecord::new(&v.var, scope, Some(function)))
        }
        Message::UpvalueVar(v) => {
            let function = owning_function(call_stack, v.level)?;
            let scope = VariableScope::Upvalue {
                level: v.level,
                index: v.index,
            };
            Ok(VariableRecord::new(&v.var, scope, Some(function)))
        }
        Message::EnvVar(v) => Ok(VariableRecord::new(
            &v.var,
            VariableScope::EnvVar { level: v.level },
            None,
        )),
        other => Err(BuildError::NotAVariable(other.type_code())),
    }
}

fn owning_function(call_stack: &CallStack, level: u16) -> Result<FunctionInfo, BuildError> {
    call_stack
        .frame(level)
        .map(|frame| FunctionInfo {
            name: frame.function_name.clone(),
            line_defined: frame.line_defined,
        })
        .ok_or(BuildError::MissingFrame { level })
}

fn flatten_name(hierarchy: &[NameAndType], leaf: &str) -> String {
    let mut name = String::new();
    for step in hierarchy {
        name.push_str(&step.name);
        name.push('.');
    }
    name.push_str(leaf);
    name
}
