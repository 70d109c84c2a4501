//! Watches
//!
//! A watch is a persisted lookup path. Project watches are added by the
//! user; custom watches come from registered [`CustomWatchProvider`]s and
//! are keyed by GUID. Each watch owns a small tree whose single root is the
//! live variable, rebuilt on every stop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use luadbg_protocol::{NameAndType, Scope, VarContext};
use tracing::debug;
use uuid::Uuid;

use crate::callstack::CallStack;
use crate::lookup::{save_expansions, InsertTarget, LookupRequest, PendingInsert, SavedExpansion};
use crate::persistence::{CustomKey, WatchRecord};
use crate::store::CollectionKey;
use crate::tree::VarTree;
use crate::variable::{VariableRecord, VariableScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}", self.0)
    }
}

/// Formats the displayed value of a custom watch
pub trait VarRenderer: Send + Sync {
    fn render(&self, var: &VariableRecord) -> String;
}

/// What a provider sees when asked for its watches
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext<'a> {
    pub current_level: u16,
    pub call_stack: &'a CallStack,
}

/// One watch offered by a provider
#[derive(Clone)]
pub struct CustomVariable {
    pub guid: Uuid,
    pub alias: String,
    pub scope: Scope,
    pub names_and_types: Vec<NameAndType>,
    pub level: u16,
    pub index: i32,
    pub renderer: Option<Arc<dyn VarRenderer>>,
}

impl fmt::Debug for CustomVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomVariable")
            .field("guid", &self.guid)
            .field("alias", &self.alias)
            .field("scope", &self.scope)
            .field("names_and_types", &self.names_and_types)
            .finish_non_exhaustive()
    }
}

/// Supplies watches computed by an extension on every stop
pub trait CustomWatchProvider: Send {
    fn variables(&self, context: &UpdateContext<'_>) -> Vec<CustomVariable>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOrigin {
    Project,
    Custom { guid: Uuid, alias: String },
}

pub struct WatchEntry {
    pub id: WatchId,
    pub origin: WatchOrigin,
    pub scope: Scope,
    pub names_and_types: Vec<NameAndType>,
    pub level: u16,
    pub index: i32,
    tree: VarTree,
    renderer: Option<Arc<dyn VarRenderer>>,
}

impl fmt::Debug for WatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchEntry")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("scope", &self.scope)
            .field("path", &self.display_path())
            .field("live", &self.live().map(|v| &v.value))
            .finish()
    }
}

impl WatchEntry {
    pub fn context(&self) -> VarContext {
        match self.origin {
            WatchOrigin::Project => VarContext::WatchProject,
            WatchOrigin::Custom { .. } => VarContext::WatchCustom,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.origin, WatchOrigin::Custom { .. })
    }

    pub fn tree(&self) -> &VarTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut VarTree {
        &mut self.tree
    }

    /// The watched variable as last reported by the runtime
    pub fn live(&self) -> Option<&VariableRecord> {
        self.tree.roots().first().and_then(|id| self.tree.var(*id))
    }

    /// Path names joined with `.`
    pub fn display_path(&self) -> String {
        self.names_and_types
            .iter()
            .map(|n| n.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Alias for custom watches, the dotted path otherwise
    pub fn label(&self) -> String {
        match &self.origin {
            WatchOrigin::Custom { alias, .. } if !alias.is_empty() => alias.clone(),
            _ => self.display_path(),
        }
    }

    /// The live value, passed through the custom renderer when present
    pub fn rendered_value(&self) -> Option<String> {
        let live = self.live()?;
        Some(match &self.renderer {
            Some(renderer) => renderer.render(live),
            None => live.value.clone(),
        })
    }

    pub fn root_request(&self) -> LookupRequest {
        LookupRequest {
            scope: self.scope,
            context: self.context(),
            names_and_types: self.names_and_types.clone(),
            level: self.level,
            index: self.index,
            extra: true,
        }
    }

    fn matches(&self, scope: Scope, names_and_types: &[NameAndType], level: u16, index: i32) -> bool {
        self.scope == scope
            && self.names_and_types == names_and_types
            && (!scope.is_stack_bound() || self.level == level)
            && (!matches!(scope, Scope::Local | Scope::Upvalue) || self.index == index)
    }

    fn to_record(&self) -> WatchRecord {
        WatchRecord {
            scope: self.scope,
            names_and_types: self.names_and_types.clone(),
            level: self.level,
            index: self.index,
            custom: match &self.origin {
                WatchOrigin::Project => None,
                WatchOrigin::Custom { guid, alias } => Some(CustomKey {
                    guid: *guid,
                    alias: alias.clone(),
                }),
            },
        }
    }
}

/// One lookup of a watch batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchLookup {
    pub watch: WatchId,
    pub pending: PendingInsert,
}

#[derive(Debug, Default)]
pub struct WatchList {
    entries: Vec<WatchEntry>,
    next_id: u64,
    saved: HashMap<WatchId, Vec<SavedExpansion>>,
}

impl WatchList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Watches in order of addition
    pub fn iter(&self) -> impl Iterator<Item = &WatchEntry> + '_ {
        self.entries.iter()
    }

    pub fn get(&self, id: WatchId) -> Option<&WatchEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: WatchId) -> Option<&mut WatchEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    fn allocate(&mut self) -> WatchId {
        self.next_id += 1;
        WatchId(self.next_id)
    }

    /// Watch a variable from a collection. Returns `None` when it is
    /// already watched.
    pub fn add_variable(&mut self, var: &VariableRecord) -> Option<WatchId> {
        let scope = var.scope.kind();
        self.add_project(
            scope,
            var.names_and_types(),
            var.scope.level().unwrap_or(0),
            var.scope.index().unwrap_or(0),
        )
    }

    pub fn add_project(
        &mut self,
        scope: Scope,
        names_and_types: Vec<NameAndType>,
        level: u16,
        index: i32,
    ) -> Option<WatchId> {
        if self.find(scope, &names_and_types, level, index).is_some() {
            return None;
        }
        let id = self.allocate();
        debug!(%id, ?scope, "watch added");
        self.entries.push(WatchEntry {
            id,
            origin: WatchOrigin::Project,
            scope,
            names_and_types,
            level,
            index,
            tree: VarTree::new(),
            renderer: None,
        });
        Some(id)
    }

    /// Add or refresh a provider watch, keyed by GUID
    pub fn upsert_custom(&mut self, custom: CustomVariable) -> WatchId {
        if let Some(entry) = self.entries.iter_mut().find(
            |e| matches!(&e.origin, WatchOrigin::Custom { guid, .. } if *guid == custom.guid),
        ) {
            if entry.names_and_types != custom.names_and_types || entry.scope != custom.scope {
                entry.tree.clear();
            }
            entry.origin = WatchOrigin::Custom {
                guid: custom.guid,
                alias: custom.alias,
            };
            entry.scope = custom.scope;
            entry.names_and_types = custom.names_and_types;
            entry.level = custom.level;
            entry.index = custom.index;
            entry.renderer = custom.renderer;
            return entry.id;
        }

        let id = self.allocate();
        debug!(%id, guid = %custom.guid, "custom watch added");
        self.entries.push(WatchEntry {
            id,
            origin: WatchOrigin::Custom {
                guid: custom.guid,
                alias: custom.alias,
            },
            scope: custom.scope,
            names_and_types: custom.names_and_types,
            level: custom.level,
            index: custom.index,
            tree: VarTree::new(),
            renderer: custom.renderer,
        });
        id
    }

    pub fn remove(&mut self, id: WatchId) -> Option<WatchEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        self.saved.remove(&id);
        Some(self.entries.remove(pos))
    }

    /// Stop watching a variable. Returns whether a watch was removed.
    pub fn remove_variable(&mut self, var: &VariableRecord) -> bool {
        match self.find_variable(var) {
            Some(id) => self.remove(id).is_some(),
            None => false,
        }
    }

    pub fn is_watched(&self, var: &VariableRecord) -> bool {
        self.find_variable(var).is_some()
    }

    fn find_variable(&self, var: &VariableRecord) -> Option<WatchId> {
        self.find(
            var.scope.kind(),
            &var.names_and_types(),
            var.scope.level().unwrap_or(0),
            var.scope.index().unwrap_or(0),
        )
    }

    fn find(&self, scope: Scope, path: &[NameAndType], level: u16, index: i32) -> Option<WatchId> {
        self.entries
            .iter()
            .find(|e| e.matches(scope, path, level, index))
            .map(|e| e.id)
    }

    /// Sync custom watches with what the providers currently offer. Custom
    /// watches nobody offers any more are removed and returned.
    pub fn reconcile_custom(&mut self, offered: Vec<CustomVariable>) -> Vec<WatchEntry> {
        let mut dropped = Vec::new();
        let offered_guids: Vec<Uuid> = offered.iter().map(|c| c.guid).collect();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let still_offered = match &entry.origin {
                WatchOrigin::Custom { guid, .. } => offered_guids.contains(guid),
                WatchOrigin::Project => true,
            };
            if still_offered {
                kept.push(entry);
            } else {
                dropped.push(entry);
            }
        }
        self.entries = kept;
        for entry in &dropped {
            self.saved.remove(&entry.id);
            debug!(id = %entry.id, "custom watch no longer offered");
        }
        for custom in offered {
            self.upsert_custom(custom);
        }
        dropped
    }

    /// Remember expanded watch nodes, then drop every live variable
    pub fn begin_cycle(&mut self) {
        self.saved.clear();
        for entry in &self.entries {
            let saved = save_expansions(&entry.tree, CollectionKey::Watch(entry.id), entry.context());
            if !saved.is_empty() {
                self.saved.insert(entry.id, saved);
            }
        }
        self.clear_live();
    }

    pub fn clear_live(&mut self) {
        for entry in &mut self.entries {
            entry.tree.clear();
        }
    }

    /// The lookups for one debug stop: every watch root followed by its
    /// remembered expansions, grouped Global, Local, Upvalue, Environment
    /// and in order of addition within a scope.
    pub fn lookup_batch(&mut self) -> Vec<WatchLookup> {
        let mut ordered: Vec<&WatchEntry> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.scope);

        let mut batch = Vec::new();
        for entry in ordered {
            batch.push(WatchLookup {
                watch: entry.id,
                pending: PendingInsert {
                    collection: CollectionKey::Watch(entry.id),
                    target: InsertTarget::Path(Vec::new()),
                    request: entry.root_request(),
                },
            });
            for saved in self.saved.remove(&entry.id).unwrap_or_default() {
                batch.push(WatchLookup {
                    watch: entry.id,
                    pending: saved.into_pending(),
                });
            }
        }
        batch
    }

    /// Give every watch the runtime did not answer a placeholder root.
    /// Returns how many were synthesized.
    pub fn synthesize_placeholders(&mut self) -> usize {
        let mut count = 0;
        for entry in &mut self.entries {
            if entry.tree.is_empty() {
                let scope = VariableScope::from_parts(entry.scope, entry.level, entry.index);
                entry
                    .tree
                    .insert_root(VariableRecord::placeholder(scope, &entry.names_and_types));
                count += 1;
            }
        }
        count
    }

    /// Display order: by label, ties in order of addition.
    ///
    /// Labels compare as text, so a watch on `t.10` sorts before `t.9`:
    /// a watch root is a path expression, not a table key.
    pub fn sorted_for_display(&self) -> Vec<&WatchEntry> {
        let mut sorted: Vec<&WatchEntry> = self.entries.iter().collect();
        sorted.sort_by_cached_key(|e| e.label());
        sorted
    }

    pub fn records(&self) -> Vec<WatchRecord> {
        self.entries.iter().map(WatchEntry::to_record).collect()
    }

    /// Replace every watch with persisted records
    pub fn load_records(&mut self, records: Vec<WatchRecord>) {
        self.entries.clear();
        self.saved.clear();
        for record in records {
            match record.custom {
                Some(CustomKey { guid, alias }) => {
                    self.upsert_custom(CustomVariable {
                        guid,
                        alias,
                        scope: record.scope,
                        names_and_types: record.names_and_types,
                        level: record.level,
                        index: record.index,
                        renderer: None,
                    });
                }
                None => {
                    self.add_project(record.scope, record.names_and_types, record.level, record.index);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.saved.clear();
    }
}
