//! Incoming message dispatch

use luadbg_protocol::{CallStackFrame, Direction, Message, Scope};
use tracing::{debug, error, trace, warn};

use super::{DebugSession, Trees};
use crate::events::SessionEvent;
use crate::store::CollectionKey;
use crate::transport::Transport;
use crate::variable::build_variable;

impl<T: Transport> DebugSession<T> {
    /// Handle one decoded message from the runtime. Protocol desyncs are
    /// logged and dropped; nothing here fails the session.
    pub fn on_message_received(&mut self, message: Message) {
        let type_code = message.type_code();
        if type_code.direction() == Direction::ToRuntime {
            warn!(?type_code, "runtime sent a message only the debugger sends");
            return;
        }
        trace!(?type_code, "received");

        match message {
            // Variables
            Message::GlobalVar(_) | Message::LocalVar(_) | Message::UpvalueVar(_) | Message::EnvVar(_) => {
                self.on_variable(&message)
            }
            Message::GlobalVarLookupBegin => self.on_lookup_begin(Scope::Global),
            Message::LocalVarLookupBegin => self.on_lookup_begin(Scope::Local),
            Message::UpvalueVarLookupBegin => self.on_lookup_begin(Scope::Upvalue),
            Message::EnvVarLookupBegin => self.on_lookup_begin(Scope::Environment),
            Message::GlobalVarLookupEnd => self.on_lookup_end(Scope::Global),
            Message::LocalVarLookupEnd => self.on_lookup_end(Scope::Local),
            Message::UpvalueVarLookupEnd => self.on_lookup_end(Scope::Upvalue),
            Message::EnvVarLookupEnd => self.on_lookup_end(Scope::Environment),
            Message::GlobalVarBegin
            | Message::GlobalVarEnd
            | Message::LocalVarBegin
            | Message::LocalVarEnd
            | Message::UpvalueVarBegin
            | Message::UpvalueVarEnd
            | Message::EnvVarBegin
            | Message::EnvVarEnd => {}

            // Call stack
            Message::CallStackBegin | Message::CallStackEnd => {}
            Message::CallStack(frame) => self.on_frame(&frame),
            Message::CallStackLookupBegin => {}
            Message::CallStackLookup(frame) => self.on_frame(&frame),
            Message::CallStackLookupEnd => self.on_call_stack_lookup_end(),

            // Profiler
            Message::ProfileInfoBegin => self.profiler.begin(),
            Message::ProfileInfo(record) => self.profiler.add(record),
            Message::ProfileInfoEnd => self.profiler.end(),
            Message::ProfileInfoLookupBegin => self.profiler.lookup_begin(),
            Message::ProfileInfoLookup(record) => self.profiler.lookup_add(record),
            Message::ProfileInfoLookupEnd => self.profiler.lookup_end(),

            // Memory trace
            Message::MemoryTraceBegin => self.memory_trace.begin_snapshot(),
            Message::MemoryTraceStreamBegin => self.memory_trace.begin_stream(),
            Message::MemoryTrace(record) | Message::MemoryTraceStream(record) => {
                self.memory_trace.add(record)
            }
            Message::MemoryTraceEnd | Message::MemoryTraceStreamEnd => self.memory_trace.end(),

            // Runtime state
            Message::LuaStateBegin => self.lua_states.begin(),
            Message::LuaStateAdd(state) => self.lua_states.add(state),
            Message::LuaStateRemove { address } => {
                if !self.lua_states.remove(&address) {
                    debug!(%address, "removal of unknown lua state");
                }
            }
            Message::LuaStateEnd => self.lua_states.end(),
            Message::LuaStateToggle { address } => self.lua_states.apply_toggle(&address),
            Message::Limits(limits) => {
                debug!(?limits, "runtime limits");
                self.features.set_limits(limits);
            }

            other => warn!(type_code = ?other.type_code(), "unhandled message"),
        }
    }

    fn on_frame(&mut self, frame: &CallStackFrame) {
        let level = frame.level;
        let is_new = self.call_stack.frame(level).is_none();
        if is_new {
            self.events.push(SessionEvent::LevelAdding { level });
        }
        self.call_stack.add_frame(frame);
        if is_new {
            self.events.push(SessionEvent::LevelAdded { level });
        }
    }

    fn on_call_stack_lookup_end(&mut self) {
        match self.call_stack.end_lookup() {
            Some(level) => self.events.push(SessionEvent::StackLevelLookedUp { level }),
            None => warn!("call stack lookup end with nothing in flight"),
        }
        // The user may have moved on while the reply was outstanding
        let current = self.call_stack.current_level();
        if self.call_stack.needs_lookup(current) {
            if let Err(e) = self.request_stack_level(current) {
                warn!(level = current, error = %e, "deferred call stack lookup not sent");
            }
        }
    }

    fn on_lookup_begin(&mut self, scope: Scope) {
        let mut trees = Trees {
            store: &mut self.variables,
            watches: &mut self.watches,
        };
        if let Err(e) = self.pipeline.begin(scope, &mut trees) {
            error!(error = %e, "lookup desync");
        }
    }

    fn on_lookup_end(&mut self, scope: Scope) {
        if let Err(e) = self.pipeline.end(scope) {
            error!(error = %e, "lookup desync");
        }
    }

    fn on_variable(&mut self, message: &Message) {
        let var = match build_variable(message, &self.call_stack) {
            Ok(var) => var,
            Err(e) => {
                warn!(error = %e, "dropping variable");
                return;
            }
        };

        let inserted = if self.pipeline.is_looking_up() {
            let mut trees = Trees {
                store: &mut self.variables,
                watches: &mut self.watches,
            };
            match self.pipeline.item(var, &mut trees) {
                Ok(Some(at)) => at,
                Ok(None) => return,
                Err(e) => {
                    error!(error = %e, "lookup desync");
                    return;
                }
            }
        } else {
            let collection = CollectionKey::for_scope(&var.scope);
            let Some(tree) = self.variables.tree_mut(collection) else {
                return;
            };
            (collection, tree.insert_root(var))
        };

        let (collection, node) = inserted;
        if !matches!(collection, CollectionKey::Watch(_)) {
            if let Some(var) = self.variables.tree_mut(collection).and_then(|t| t.var_mut(node)) {
                var.visible = self.filters.is_visible(var);
            }
        }
        self.events.push(SessionEvent::VariableInserted { collection, node });
    }
}
