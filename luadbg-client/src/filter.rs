//! Variable filters
//!
//! Each scope hides variables by value type and by name pattern. The same
//! state is mirrored to the runtime so it can skip filtered variables at
//! the source; locally it only drives [`VariableRecord::visible`].

use std::collections::BTreeMap;

use luadbg_protocol::{LuaType, Message, Scope, VarFilterName, VarFilterType, FILTER_SLOTS};

use crate::tree::VarTree;
use crate::variable::VariableRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    /// Indexed by [`LuaType::filter_slot`]; `true` hides the type
    pub hidden_types: [bool; FILTER_SLOTS],
    /// `*` and `?` wildcards, matched against the display name
    pub hidden_names: Vec<String>,
}

impl ScopeFilter {
    pub fn hide_type(&mut self, ty: LuaType, hidden: bool) -> bool {
        match ty.filter_slot() {
            Some(slot) => {
                self.hidden_types[slot] = hidden;
                true
            }
            None => false,
        }
    }

    pub fn is_type_hidden(&self, ty: LuaType) -> bool {
        ty.filter_slot().is_some_and(|slot| self.hidden_types[slot])
    }

    pub fn hides(&self, var: &VariableRecord) -> bool {
        self.is_type_hidden(var.what)
            || self
                .hidden_names
                .iter()
                .any(|pattern| wildcard_match(pattern, &var.display_name))
    }

    pub fn is_empty(&self) -> bool {
        !self.hidden_types.iter().any(|h| *h) && self.hidden_names.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarFilters {
    scopes: BTreeMap<Scope, ScopeFilter>,
}

impl VarFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scope: Scope) -> Option<&ScopeFilter> {
        self.scopes.get(&scope)
    }

    pub fn set(&mut self, scope: Scope, filter: ScopeFilter) {
        self.scopes.insert(scope, filter);
    }

    /// Total name patterns across every scope
    pub fn name_count(&self) -> usize {
        self.scopes.values().map(|f| f.hidden_names.len()).sum()
    }

    pub fn is_visible(&self, var: &VariableRecord) -> bool {
        self.scopes
            .get(&var.scope.kind())
            .map_or(true, |filter| !filter.hides(var))
    }

    /// Recompute visibility for a whole tree
    pub fn apply(&self, tree: &mut VarTree) {
        tree.for_each_var_mut(|var| var.visible = self.is_visible(var));
    }

    /// The messages that push the whole filter state to the runtime
    pub fn messages(&self) -> Vec<Message> {
        let mut out = vec![Message::VarFilterStateTypeBegin];
        for (scope, filter) in &self.scopes {
            out.push(Message::VarFilterStateType(VarFilterType {
                scope: *scope,
                filter: filter.hidden_types,
            }));
        }
        out.push(Message::VarFilterStateTypeEnd);

        out.push(Message::VarFilterStateNameBegin);
        for (scope, filter) in &self.scopes {
            for pattern in &filter.hidden_names {
                out.push(Message::VarFilterStateName(VarFilterName {
                    scope: *scope,
                    pattern: pattern.clone(),
                }));
            }
        }
        out.push(Message::VarFilterStateNameEnd);
        out
    }
}

/// Glob-style match supporting `*` (any run) and `?` (one character)
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(c) if *c == '?' || *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
