//! Debug session state machine
//!
//! [`DebugSession`] owns every collection the front end renders and is
//! driven from a single task: one incoming message is handled to
//! completion before the next. Nothing here blocks; sends go through the
//! [`Transport`]'s non-blocking queue.

mod dispatch;
mod update;

use luadbg_protocol::{Message, ProfileLookup, Scope, VarContext, VarUpdate, VarLookUp};
use luadbg_utils::{LuadbgError, Result};
use tracing::{debug, warn};

use crate::callstack::CallStack;
use crate::edit::{coerce_value, EditError};
use crate::events::SessionEvent;
use crate::filter::{ScopeFilter, VarFilters};
use crate::lookup::{InsertTarget, LookupPipeline, PendingInsert, SavedExpansion, TreeResolver};
use crate::memtrace::MemoryTrace;
use crate::persistence::{InvalidWatch, WatchStore};
use crate::profiler::Profiler;
use crate::runtime::{FeatureError, Features, LuaStates};
use crate::store::{CollectionKey, VariableStore};
use crate::transport::Transport;
use crate::tree::{NodeId, VarTree};
use crate::variable::VariableRecord;
use crate::watch::{CustomWatchProvider, WatchId, WatchList};

impl From<FeatureError> for LuadbgError {
    fn from(err: FeatureError) -> Self {
        LuadbgError::Unsupported(err.to_string())
    }
}

/// Variable trees and watch trees seen as one set of collections
pub(crate) struct Trees<'a> {
    pub store: &'a mut VariableStore,
    pub watches: &'a mut WatchList,
}

impl TreeResolver for Trees<'_> {
    fn tree(&self, key: CollectionKey) -> Option<&VarTree> {
        match key {
            CollectionKey::Watch(id) => self.watches.get(id).map(|w| w.tree()),
            other => self.store.tree(other),
        }
    }

    fn tree_mut(&mut self, key: CollectionKey) -> Option<&mut VarTree> {
        match key {
            CollectionKey::Watch(id) => self.watches.get_mut(id).map(|w| w.tree_mut()),
            other => self.store.tree_mut(other),
        }
    }
}

pub struct DebugSession<T: Transport> {
    transport: T,
    call_stack: CallStack,
    variables: VariableStore,
    watches: WatchList,
    pipeline: LookupPipeline,
    filters: VarFilters,
    profiler: Profiler,
    memory_trace: MemoryTrace,
    lua_states: LuaStates,
    features: Features,
    providers: Vec<Box<dyn CustomWatchProvider>>,
    /// Expanded nodes remembered at update begin
    saved: Vec<SavedExpansion>,
    watch_store: Option<WatchStore>,
    auto_save: bool,
    events: Vec<SessionEvent>,
}

impl<T: Transport> DebugSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            call_stack: CallStack::new(),
            variables: VariableStore::new(),
            watches: WatchList::new(),
            pipeline: LookupPipeline::new(),
            filters: VarFilters::new(),
            profiler: Profiler::new(),
            memory_trace: MemoryTrace::new(),
            lua_states: LuaStates::new(),
            features: Features::new(),
            providers: Vec::new(),
            saved: Vec::new(),
            watch_store: None,
            auto_save: false,
            events: Vec::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ==================== Queries ====================

    pub fn current_stack_level(&self) -> u16 {
        self.call_stack.current_level()
    }

    pub fn previous_stack_level(&self) -> u16 {
        self.call_stack.previous_level()
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn watches(&self) -> &WatchList {
        &self.watches
    }

    pub fn filters(&self) -> &VarFilters {
        &self.filters
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn memory_trace(&self) -> &MemoryTrace {
        &self.memory_trace
    }

    pub fn lua_states(&self) -> &LuaStates {
        &self.lua_states
    }

    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn pending_lookups(&self) -> usize {
        self.pipeline.pending()
    }

    /// Drain the events raised since the last call
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// A variable from any collection, watches included
    pub fn variable(&self, collection: CollectionKey, node: NodeId) -> Option<&VariableRecord> {
        let tree = match collection {
            CollectionKey::Watch(id) => Some(self.watches.get(id)?.tree()),
            other => self.variables.tree(other),
        };
        tree?.var(node)
    }

    fn trees(&mut self) -> Trees<'_> {
        Trees {
            store: &mut self.variables,
            watches: &mut self.watches,
        }
    }

    fn context_for(&self, collection: CollectionKey) -> VarContext {
        match collection {
            CollectionKey::Watch(id) => self
                .watches
                .get(id)
                .map_or(VarContext::Normal, |w| w.context()),
            _ => VarContext::Normal,
        }
    }

    /// Send a lookup and remember where its reply goes
    fn send_lookup(&mut self, pending: PendingInsert) -> Result<()> {
        self.transport.send_message(pending.request.to_message())?;
        self.pipeline.push(pending);
        Ok(())
    }

    // ==================== Stack levels ====================

    /// Select a call stack level, fetching its variables when they have not
    /// been looked up yet
    pub fn select_stack_level(&mut self, level: u16) -> Result<()> {
        if self.call_stack.frame(level).is_none() {
            return Err(LuadbgError::protocol(format!("no call stack frame at level {}", level)));
        }
        let from = self.call_stack.current_level();
        if from == level {
            return Ok(());
        }
        self.events.push(SessionEvent::StackLevelChanging { from, to: level });
        self.call_stack.select(level);
        self.events.push(SessionEvent::StackLevelChanged { from, to: level });

        if self.call_stack.needs_lookup(level) {
            self.request_stack_level(level)?;
        }
        Ok(())
    }

    fn request_stack_level(&mut self, level: u16) -> Result<()> {
        if !self.call_stack.begin_lookup(level) {
            return Ok(());
        }
        if let Err(e) = self
            .transport
            .send_message(Message::CallStackLookupPerform { level })
        {
            self.call_stack.end_lookup();
            return Err(e);
        }
        self.events.push(SessionEvent::StackLevelLookingUp { level });
        Ok(())
    }

    // ==================== Expansion ====================

    /// Ask the runtime for the children of a table or userdata
    pub fn expand_variable(&mut self, collection: CollectionKey, node: NodeId) -> Result<()> {
        let context = self.context_for(collection);
        let request = {
            let var = self
                .variable(collection, node)
                .ok_or_else(|| LuadbgError::protocol("variable no longer exists"))?;
            if !var.is_expandable() {
                return Ok(());
            }
            var.expansion_request(context)
        };
        self.send_lookup(PendingInsert {
            collection,
            target: InsertTarget::Node(node),
            request,
        })?;
        if let Some(var) = self.trees().tree_mut(collection).and_then(|t| t.var_mut(node)) {
            var.expanded = true;
        }
        Ok(())
    }

    pub fn collapse_variable(&mut self, collection: CollectionKey, node: NodeId) {
        if let Some(var) = self.trees().tree_mut(collection).and_then(|t| t.var_mut(node)) {
            var.expanded = false;
        }
    }

    // ==================== Edits ====================

    /// Validate and send a new value for a variable.
    ///
    /// Nothing is sent unless the value is acceptable; the local record is
    /// only changed once the update is queued.
    pub fn try_apply_edit(
        &mut self,
        collection: CollectionKey,
        node: NodeId,
        input: &str,
    ) -> std::result::Result<(), EditError> {
        if !self.transport.is_connected() {
            return Err(EditError::NotConnected);
        }
        if !self.transport.is_debugging() {
            return Err(EditError::NotStopped);
        }
        if self.transport.is_update_in_progress() {
            return Err(EditError::UpdateInProgress);
        }

        let context = self.context_for(collection);
        let var = self
            .variable(collection, node)
            .ok_or(EditError::UnknownVariable)?;
        if var.is_placeholder() {
            return Err(EditError::Placeholder);
        }
        let value = coerce_value(var.what, input)?;
        let request = var.expansion_request(context);
        let value_type = var.what;

        self.transport.send_message(Message::VarUpdate(VarUpdate {
            lookup: VarLookUp {
                scope: request.scope,
                context: request.context,
                level: request.level,
                index: request.index,
                extra: request.extra,
                names_and_types: request.names_and_types,
            },
            value: value.clone(),
            value_type,
        }))?;

        if let Some(var) = self.trees().tree_mut(collection).and_then(|t| t.var_mut(node)) {
            debug!(name = %var.name, %value, "variable edited");
            var.value = value;
        }
        Ok(())
    }

    // ==================== Watches ====================

    pub fn is_variable_watched(&self, var: &VariableRecord) -> bool {
        self.watches.is_watched(var)
    }

    /// Watch a variable. Returns `None` when it is already watched.
    pub fn add_watched_variable(&mut self, var: &VariableRecord) -> Result<Option<WatchId>> {
        let Some(id) = self.watches.add_variable(var) else {
            return Ok(None);
        };
        self.watches_changed()?;
        if self.can_look_up() {
            self.look_up_watch(id)?;
        }
        Ok(Some(id))
    }

    pub fn remove_watched_variable(&mut self, var: &VariableRecord) -> Result<bool> {
        if !self.watches.remove_variable(var) {
            return Ok(false);
        }
        self.watches_changed()?;
        Ok(true)
    }

    pub fn remove_watch(&mut self, id: WatchId) -> Result<bool> {
        if self.watches.remove(id).is_none() {
            return Ok(false);
        }
        self.watches_changed()?;
        Ok(true)
    }

    pub fn register_provider(&mut self, provider: Box<dyn CustomWatchProvider>) {
        self.providers.push(provider);
    }

    /// Load persisted watches, replacing the current set. Returns the
    /// entries that were dropped as invalid.
    pub fn attach_watch_store(&mut self, store: WatchStore, auto_save: bool) -> Result<Vec<InvalidWatch>> {
        let outcome = store.load()?;
        for invalid in &outcome.invalid {
            warn!(%invalid, "watch removed from store");
        }
        self.watches.load_records(outcome.watches);
        self.watch_store = Some(store);
        self.auto_save = auto_save;
        self.events.push(SessionEvent::WatchesChanged);
        Ok(outcome.invalid)
    }

    pub fn save_watches(&self) -> Result<()> {
        match &self.watch_store {
            Some(store) => store.save(&self.watches.records()),
            None => Ok(()),
        }
    }

    fn watches_changed(&mut self) -> Result<()> {
        self.events.push(SessionEvent::WatchesChanged);
        if self.auto_save {
            self.save_watches()?;
        }
        Ok(())
    }

    fn can_look_up(&self) -> bool {
        self.transport.is_connected()
            && self.transport.is_debugging()
            && !self.transport.is_update_in_progress()
    }

    /// Look up one freshly added watch outside the update cycle
    fn look_up_watch(&mut self, id: WatchId) -> Result<()> {
        let Some(entry) = self.watches.get(id) else {
            return Ok(());
        };
        let scope = entry.scope;
        let pending = PendingInsert {
            collection: CollectionKey::Watch(id),
            target: InsertTarget::Path(Vec::new()),
            request: entry.root_request(),
        };
        self.transport.send_message(Message::WatchLookupBegin)?;
        self.transport.send_message(Message::watch_scope_begin(scope))?;
        self.send_lookup(pending)?;
        self.transport.send_message(Message::watch_scope_end(scope))?;
        self.transport.send_message(Message::WatchLookupEnd)?;
        Ok(())
    }

    // ==================== Filters and features ====================

    /// Replace the filter for one scope and push the new state
    pub fn set_filter(&mut self, scope: Scope, filter: ScopeFilter) -> Result<()> {
        let mut next = self.filters.clone();
        next.set(scope, filter);
        self.features.check_filter_count(next.name_count())?;
        self.filters = next;

        for tree in self.variables.collections_mut() {
            self.filters.apply(tree);
        }
        if self.transport.is_connected() {
            self.send_filters()?;
        }
        Ok(())
    }

    fn send_filters(&self) -> Result<()> {
        for message in self.filters.messages() {
            self.transport.send_message(message)?;
        }
        Ok(())
    }

    pub fn toggle_profiler(&mut self) -> Result<()> {
        let message = self.features.toggle_profiler()?;
        if let Err(e) = self.transport.send_message(message) {
            // not sent, so the runtime still has the old state
            self.features.revert_profiler_toggle();
            return Err(e);
        }
        Ok(())
    }

    pub fn toggle_memory_tracer(&mut self) -> Result<()> {
        let message = self.features.toggle_memory_tracer()?;
        if let Err(e) = self.transport.send_message(message) {
            self.features.revert_memory_tracer_toggle();
            return Err(e);
        }
        Ok(())
    }

    pub fn toggle_lua_state(&mut self, address: &str) -> Result<()> {
        let message = self
            .lua_states
            .toggle(address)
            .ok_or_else(|| LuadbgError::protocol(format!("unknown lua state {}", address)))?;
        if let Err(e) = self.transport.send_message(message) {
            self.lua_states.apply_toggle(address);
            return Err(e);
        }
        Ok(())
    }

    /// Ask the runtime which functions a profiled function called
    pub fn request_profile_callees(&mut self, key: ProfileLookup) -> Result<()> {
        if self.profiler.function(&key).is_none() {
            return Err(LuadbgError::protocol(format!(
                "unknown profiled function {}",
                key.function_name
            )));
        }
        self.transport
            .send_message(Message::ProfileInfoLookupPerform(key.clone()))?;
        self.profiler.expect_callees(key);
        Ok(())
    }
}
