//! Connection lifecycle and the per-stop update cycle:
//! `UpdateBegin → frames → UpdateSync → lookups → replies → UpdateEnd`

use luadbg_protocol::{Message, Scope, VarContext};
use luadbg_utils::Result;
use tracing::{debug, info, warn};

use super::DebugSession;
use crate::events::SessionEvent;
use crate::lookup::save_expansions;
use crate::store::CollectionKey;
use crate::transport::Transport;
use crate::watch::UpdateContext;

impl<T: Transport> DebugSession<T> {
    /// Push local state the runtime needs before its first stop
    pub fn on_connected(&mut self) -> Result<()> {
        info!("debug target connected");
        self.send_filters()
    }

    /// Drop everything tied to the connection. Safe to call repeatedly.
    pub fn on_disconnected(&mut self) {
        info!("debug target disconnected");
        self.events.push(SessionEvent::Clearing);
        self.variables.clear();
        self.call_stack.reset();
        self.pipeline.clear();
        self.saved.clear();
        self.watches.clear_live();
        self.profiler.clear();
        self.memory_trace.clear();
        self.lua_states.clear();
        self.features.reset();
        self.events.push(SessionEvent::Cleared);
    }

    /// The target stopped: remember what was expanded, then drop every
    /// collection. Level 0 variables follow unsolicited.
    pub fn on_update_begin(&mut self) {
        let level = self.call_stack.current_level();
        let mut saved = Vec::new();
        let mut keys = vec![CollectionKey::Global];
        for lvl in std::iter::once(0).chain((level != 0).then_some(level)) {
            keys.extend([
                CollectionKey::Local(lvl),
                CollectionKey::Upvalue(lvl),
                CollectionKey::EnvVar(lvl),
            ]);
        }
        for key in keys {
            if let Some(tree) = self.variables.tree(key) {
                saved.extend(save_expansions(tree, key, VarContext::Normal));
            }
        }
        debug!(expanded = saved.len(), level, "update begin");

        if self.pipeline.pending() > 0 {
            warn!(pending = self.pipeline.pending(), "dropping lookups from the previous stop");
        }
        self.events.push(SessionEvent::Clearing);
        self.variables.clear();
        self.call_stack.clear();
        self.pipeline.clear();
        self.watches.begin_cycle();
        self.saved = saved;
        self.events.push(SessionEvent::Cleared);
    }

    /// Frames have arrived: restore the selected level, re-request expanded
    /// nodes and look up every watch
    pub fn on_update_sync(&mut self) -> Result<()> {
        let level = self.call_stack.current_level();
        if level != 0 {
            if self.call_stack.frame(level).is_some() {
                self.request_stack_level(level)?;
            } else {
                debug!(level, "selected level gone, back to level 0");
                self.events.push(SessionEvent::StackLevelChanging { from: level, to: 0 });
                self.call_stack.select(0);
                self.events.push(SessionEvent::StackLevelChanged { from: level, to: 0 });
            }
        }
        let current = self.call_stack.current_level();

        for saved in std::mem::take(&mut self.saved) {
            let wanted = saved
                .collection
                .level()
                .map_or(true, |l| l == 0 || l == current);
            if wanted {
                self.send_lookup(saved.into_pending())?;
            }
        }

        self.reconcile_custom_watches()?;
        self.send_watch_batch()
    }

    fn reconcile_custom_watches(&mut self) -> Result<()> {
        if self.providers.is_empty() {
            return Ok(());
        }
        let context = UpdateContext {
            current_level: self.call_stack.current_level(),
            call_stack: &self.call_stack,
        };
        let offered: Vec<_> = self
            .providers
            .iter()
            .flat_map(|p| p.variables(&context))
            .collect();
        let before = self.watches.records();
        let dropped = self.watches.reconcile_custom(offered);
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "custom watches dropped");
        }
        if self.watches.records() != before {
            self.watches_changed()?;
        }
        Ok(())
    }

    /// One batch per stop, scopes in runtime order, each framed by its
    /// scope begin and end
    fn send_watch_batch(&mut self) -> Result<()> {
        let batch = self.watches.lookup_batch();
        if batch.is_empty() {
            return Ok(());
        }

        self.transport.send_message(Message::WatchLookupBegin)?;
        for scope in Scope::ALL {
            let mut in_scope = batch
                .iter()
                .filter(|l| l.pending.request.scope == scope)
                .peekable();
            if in_scope.peek().is_none() {
                continue;
            }
            self.transport.send_message(Message::watch_scope_begin(scope))?;
            for lookup in in_scope {
                self.send_lookup(lookup.pending.clone())?;
            }
            self.transport.send_message(Message::watch_scope_end(scope))?;
        }
        self.transport.send_message(Message::WatchLookupEnd)
    }

    /// Every reply is in: watches that got nothing show a placeholder
    pub fn on_update_end(&mut self) {
        let outstanding = self.pipeline.pending();
        if outstanding > 0 {
            warn!(outstanding, "update ended with lookups unanswered");
        }
        let synthesized = self.watches.synthesize_placeholders();
        if synthesized > 0 {
            debug!(synthesized, "placeholder watches");
            self.events.push(SessionEvent::WatchesChanged);
        }
    }
}
