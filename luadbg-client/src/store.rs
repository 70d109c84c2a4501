//! Per-scope variable collections

use std::collections::BTreeMap;

use crate::tree::VarTree;
use crate::variable::VariableScope;
use crate::watch::WatchId;

/// Names one variable tree owned by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKey {
    Global,
    Local(u16),
    Upvalue(u16),
    EnvVar(u16),
    Watch(WatchId),
}

impl CollectionKey {
    /// The collection a freshly received variable belongs to
    pub fn for_scope(scope: &VariableScope) -> Self {
        match *scope {
            VariableScope::Global => Self::Global,
            VariableScope::Local { level, .. } => Self::Local(level),
            VariableScope::Upvalue { level, .. } => Self::Upvalue(level),
            VariableScope::EnvVar { level } => Self::EnvVar(level),
        }
    }

    pub fn level(&self) -> Option<u16> {
        match *self {
            Self::Local(level) | Self::Upvalue(level) | Self::EnvVar(level) => Some(level),
            Self::Global | Self::Watch(_) => None,
        }
    }
}

/// Global collection plus one local, upvalue and environment collection per
/// stack level
#[derive(Debug, Default)]
pub struct VariableStore {
    globals: VarTree,
    locals: BTreeMap<u16, VarTree>,
    upvalues: BTreeMap<u16, VarTree>,
    env_vars: BTreeMap<u16, VarTree>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn globals(&self) -> &VarTree {
        &self.globals
    }

    /// Look up an existing tree. Watch keys are never stored here.
    pub fn tree(&self, key: CollectionKey) -> Option<&VarTree> {
        match key {
            CollectionKey::Global => Some(&self.globals),
            CollectionKey::Local(level) => self.locals.get(&level),
            CollectionKey::Upvalue(level) => self.upvalues.get(&level),
            CollectionKey::EnvVar(level) => self.env_vars.get(&level),
            CollectionKey::Watch(_) => None,
        }
    }

    /// Fetch a tree, creating per-level trees on first use
    pub fn tree_mut(&mut self, key: CollectionKey) -> Option<&mut VarTree> {
        match key {
            CollectionKey::Global => Some(&mut self.globals),
            CollectionKey::Local(level) => Some(self.locals.entry(level).or_default()),
            CollectionKey::Upvalue(level) => Some(self.upvalues.entry(level).or_default()),
            CollectionKey::EnvVar(level) => Some(self.env_vars.entry(level).or_default()),
            CollectionKey::Watch(_) => None,
        }
    }

    /// Every non-empty collection with its key, globals first then by level
    pub fn collections(&self) -> impl Iterator<Item = (CollectionKey, &VarTree)> + '_ {
        let globals = std::iter::once((CollectionKey::Global, &self.globals));
        let locals = self.locals.iter().map(|(l, t)| (CollectionKey::Local(*l), t));
        let upvalues = self.upvalues.iter().map(|(l, t)| (CollectionKey::Upvalue(*l), t));
        let env = self.env_vars.iter().map(|(l, t)| (CollectionKey::EnvVar(*l), t));
        globals
            .chain(locals)
            .chain(upvalues)
            .chain(env)
            .filter(|(_, t)| !t.is_empty())
    }

    pub fn collections_mut(&mut self) -> impl Iterator<Item = &mut VarTree> + '_ {
        std::iter::once(&mut self.globals)
            .chain(self.locals.values_mut())
            .chain(self.upvalues.values_mut())
            .chain(self.env_vars.values_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.collections().next().is_none()
    }

    pub fn clear(&mut self) {
        self.globals.clear();
        self.locals.clear();
        self.upvalues.clear();
        self.env_vars.clear();
    }

    /// Drop the stack-bound collections only, keeping globals
    pub fn clear_levels(&mut self) {
        self.locals.clear();
        self.upvalues.clear();
        self.env_vars.clear();
    }
}
