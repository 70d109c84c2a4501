//! End-to-end session scenarios driven through a channel transport

use std::sync::Arc;

use luadbg_client::{
    ChannelTransport, CollectionKey, CustomVariable, CustomWatchProvider, DebugSession, EditError,
    SessionEvent, Transport, UpdateContext, VariableRecord, VariableScope, WatchStore,
};
use luadbg_protocol::{
    CallStackFrame, EnvVar, LuaType, LuaVar, Message, NameAndType, Scope, StackVar, VarContext,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

fn connected() -> (DebugSession<ChannelTransport>, mpsc::Receiver<Message>) {
    let (transport, rx) = ChannelTransport::channel(256);
    transport.state().set_connected(true);
    (DebugSession::new(transport), rx)
}

fn stopped() -> (DebugSession<ChannelTransport>, mpsc::Receiver<Message>) {
    let (session, rx) = connected();
    session.transport().state().set_debugging(true);
    (session, rx)
}

fn drain(rx: &mut mpsc::Receiver<Message>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn lua_var(name: &str, hierarchy: &[&str], value: &str, what: LuaType) -> LuaVar {
    LuaVar {
        name: name.into(),
        key_type: LuaType::String,
        value: value.into(),
        what,
        hierarchy: hierarchy
            .iter()
            .map(|h| NameAndType::new(*h, LuaType::String))
            .collect(),
    }
}

fn frame(level: u16, function: &str) -> CallStackFrame {
    CallStackFrame {
        rel_script_path: "scripts/main.lua".into(),
        current_line: 20,
        line_defined: 4,
        last_line_defined: 30,
        function_name: function.into(),
        level,
    }
}

/// Runtime side of a stop: frames plus globals pushed unsolicited
fn push_stop(session: &mut DebugSession<ChannelTransport>, frames: &[CallStackFrame], globals: Vec<LuaVar>) {
    session.on_update_begin();
    session.on_message_received(Message::CallStackBegin);
    for f in frames {
        session.on_message_received(Message::CallStack(f.clone()));
    }
    session.on_message_received(Message::CallStackEnd);
    session.on_message_received(Message::GlobalVarBegin);
    for var in globals {
        session.on_message_received(Message::GlobalVar(var));
    }
    session.on_message_received(Message::GlobalVarEnd);
}

fn global_root(session: &DebugSession<ChannelTransport>, name: &str) -> luadbg_client::NodeId {
    session
        .variables()
        .globals()
        .find_root(name)
        .unwrap_or_else(|| panic!("no global {}", name))
}

#[test]
fn test_global_number_scenario() {
    let (mut session, _rx) = connected();
    push_stop(
        &mut session,
        &[frame(0, "main")],
        vec![lua_var("x", &[], "42", LuaType::Number)],
    );

    let globals = session.variables().globals();
    let record = globals.var(global_root(&session, "x")).unwrap();
    assert_eq!(record.name, "x");
    assert_eq!(record.display_name, "x");
    assert_eq!(record.value, "42");
    assert_eq!(record.what, LuaType::Number);
}

#[test]
fn test_reply_item_nested_under_queue_head() {
    let (mut session, mut rx) = connected();
    push_stop(
        &mut session,
        &[frame(0, "main")],
        vec![lua_var("t", &[], "table: 0x1", LuaType::Table)],
    );
    let t = global_root(&session, "t");

    session.expand_variable(CollectionKey::Global, t).unwrap();
    let sent = drain(&mut rx);
    assert!(matches!(
        sent.as_slice(),
        [Message::VarLookUp(lookup)] if lookup.scope == Scope::Global && !lookup.extra
    ));

    session.on_message_received(Message::GlobalVarLookupBegin);
    session.on_message_received(Message::GlobalVar(lua_var("k", &["t"], "1", LuaType::Number)));
    session.on_message_received(Message::GlobalVarLookupEnd);

    let globals = session.variables().globals();
    assert_eq!(globals.roots().len(), 1);
    let k = globals.find_child(t, "k").expect("k is a child of t");
    assert_eq!(globals.var(k).unwrap().name, "t.k");
    assert_eq!(session.pending_lookups(), 0);
}

#[test]
fn test_pipelined_lookups_match_fifo() {
    let (mut session, _rx) = connected();
    push_stop(
        &mut session,
        &[frame(0, "main")],
        vec![
            lua_var("a", &[], "", LuaType::Table),
            lua_var("b", &[], "", LuaType::Table),
            lua_var("c", &[], "", LuaType::Table),
        ],
    );
    let roots: Vec<_> = ["a", "b", "c"].iter().map(|n| global_root(&session, n)).collect();
    for root in &roots {
        session.expand_variable(CollectionKey::Global, *root).unwrap();
    }
    assert_eq!(session.pending_lookups(), 3);

    let replies: [(&str, &[&str]); 3] = [("a", &["z", "y"]), ("b", &["x"]), ("c", &["w", "v", "u"])];
    for (parent, children) in replies {
        session.on_message_received(Message::GlobalVarLookupBegin);
        for child in children {
            session.on_message_received(Message::GlobalVar(lua_var(child, &[parent], "0", LuaType::Number)));
        }
        session.on_message_received(Message::GlobalVarLookupEnd);
    }

    let globals = session.variables().globals();
    let counts: Vec<usize> = roots.iter().map(|r| globals.children(*r).len()).collect();
    assert_eq!(counts, vec![2, 1, 3]);
    assert!(globals.find_child(roots[2], "u").is_some());
}

#[test]
fn test_watch_batch_ordered_by_scope() {
    let (mut session, mut rx) = connected();
    let env = VariableRecord::new(&lua_var("_ENV", &[], "", LuaType::Table), VariableScope::EnvVar { level: 0 }, None);
    let local = VariableRecord::new(&lua_var("i", &[], "", LuaType::Number), VariableScope::Local { level: 0, index: 1 }, None);
    let global = VariableRecord::new(&lua_var("score", &[], "", LuaType::Number), VariableScope::Global, None);
    let upvalue = VariableRecord::new(&lua_var("count", &[], "", LuaType::Number), VariableScope::Upvalue { level: 0, index: 1 }, None);
    for var in [&env, &local, &global, &upvalue] {
        session.add_watched_variable(var).unwrap().unwrap();
    }
    assert!(drain(&mut rx).is_empty());

    push_stop(&mut session, &[frame(0, "main")], vec![]);
    session.on_update_sync().unwrap();

    let sent = drain(&mut rx);
    let codes: Vec<_> = sent.iter().map(|m| m.type_code()).collect();
    use luadbg_protocol::TypeCode as T;
    assert_eq!(
        codes,
        vec![
            T::WatchLookupBegin,
            T::WatchLookupGlobalBegin,
            T::VarLookUp,
            T::WatchLookupGlobalEnd,
            T::WatchLookupLocalBegin,
            T::VarLookUp,
            T::WatchLookupLocalEnd,
            T::WatchLookupUpvalueBegin,
            T::VarLookUp,
            T::WatchLookupUpvalueEnd,
            T::WatchLookupEnvVarBegin,
            T::VarLookUp,
            T::WatchLookupEnvVarEnd,
            T::WatchLookupEnd,
        ]
    );
    let scopes: Vec<Scope> = sent
        .iter()
        .filter_map(|m| match m {
            Message::VarLookUp(l) => Some(l.scope),
            _ => None,
        })
        .collect();
    assert_eq!(scopes, Scope::ALL.to_vec());
    assert!(sent.iter().all(|m| match m {
        Message::VarLookUp(l) => l.extra && l.context == VarContext::WatchProject,
        _ => true,
    }));
}

#[test]
fn test_watch_reply_fills_live_and_unmatched_gets_placeholder() {
    let (mut session, _rx) = connected();
    let hp = VariableRecord::new(&lua_var("hp", &["player"], "", LuaType::Number), VariableScope::Global, None);
    let gone = VariableRecord::new(&lua_var("gone", &[], "", LuaType::Number), VariableScope::Global, None);
    let hp_id = session.add_watched_variable(&hp).unwrap().unwrap();
    let gone_id = session.add_watched_variable(&gone).unwrap().unwrap();

    push_stop(&mut session, &[frame(0, "main")], vec![]);
    session.on_update_sync().unwrap();

    session.on_message_received(Message::GlobalVarLookupBegin);
    session.on_message_received(Message::GlobalVar(lua_var("hp", &["player"], "87", LuaType::Number)));
    session.on_message_received(Message::GlobalVarLookupEnd);
    session.on_message_received(Message::GlobalVarLookupBegin);
    session.on_message_received(Message::GlobalVarLookupEnd);
    session.on_update_end();

    let live = session.watches().get(hp_id).unwrap().live().unwrap();
    assert_eq!(live.value, "87");
    assert!(!live.is_placeholder());

    let placeholder = session.watches().get(gone_id).unwrap().live().unwrap();
    assert!(placeholder.is_placeholder());
    assert_eq!(placeholder.what, LuaType::Invalid);
    assert!(session.variables().globals().is_empty());
}

#[test]
fn test_disconnect_twice() {
    let (mut session, _rx) = connected();
    push_stop(
        &mut session,
        &[frame(0, "main"), frame(1, "caller")],
        vec![lua_var("t", &[], "", LuaType::Table)],
    );
    session.on_message_received(Message::LocalVar(StackVar {
        var: lua_var("i", &[], "1", LuaType::Number),
        level: 0,
        index: 1,
    }));
    let t = global_root(&session, "t");
    session.expand_variable(CollectionKey::Global, t).unwrap();

    session.on_disconnected();
    session.on_disconnected();

    assert!(session.variables().is_empty());
    assert!(session.call_stack().is_empty());
    assert_eq!(session.pending_lookups(), 0);
    assert_eq!(session.current_stack_level(), 0);

    let events = session.take_events();
    assert_eq!(events.iter().filter(|e| **e == SessionEvent::Cleared).count(), 3);
}

#[test]
fn test_expansion_restored_on_next_stop() {
    let (mut session, mut rx) = connected();
    let globals = || vec![lua_var("t", &[], "", LuaType::Table)];
    push_stop(&mut session, &[frame(0, "main")], globals());
    let t = global_root(&session, "t");
    session.expand_variable(CollectionKey::Global, t).unwrap();
    session.on_message_received(Message::GlobalVarLookupBegin);
    session.on_message_received(Message::GlobalVar(lua_var("k", &["t"], "1", LuaType::Number)));
    session.on_message_received(Message::GlobalVarLookupEnd);
    drain(&mut rx);

    push_stop(&mut session, &[frame(0, "main")], globals());
    assert_eq!(session.variables().globals().len(), 1);
    session.on_update_sync().unwrap();

    let sent = drain(&mut rx);
    assert!(matches!(
        sent.as_slice(),
        [Message::VarLookUp(l)] if l.names_and_types == vec![NameAndType::new("t", LuaType::String)]
    ));

    session.on_message_received(Message::GlobalVarLookupBegin);
    session.on_message_received(Message::GlobalVar(lua_var("k", &["t"], "2", LuaType::Number)));
    session.on_message_received(Message::GlobalVarLookupEnd);

    let tree = session.variables().globals();
    let t = global_root(&session, "t");
    assert!(tree.var(t).unwrap().expanded);
    let k = tree.find_child(t, "k").unwrap();
    assert_eq!(tree.var(k).unwrap().value, "2");
}

#[test]
fn test_locals_need_their_frame() {
    let (mut session, _rx) = connected();
    push_stop(&mut session, &[frame(0, "main")], vec![]);

    session.on_message_received(Message::LocalVar(StackVar {
        var: lua_var("orphan", &[], "1", LuaType::Number),
        level: 4,
        index: 1,
    }));
    session.on_message_received(Message::LocalVar(StackVar {
        var: lua_var("i", &[], "1", LuaType::Number),
        level: 0,
        index: 1,
    }));
    session.on_message_received(Message::EnvVar(EnvVar {
        var: lua_var("_ENV", &[], "", LuaType::Table),
        level: 0,
    }));

    assert!(session.variables().tree(CollectionKey::Local(4)).is_none());
    let locals = session.variables().tree(CollectionKey::Local(0)).unwrap();
    let i = locals.var(locals.find_root("i").unwrap()).unwrap();
    assert_eq!(i.function.as_ref().unwrap().name, "main");
    assert_eq!(session.variables().tree(CollectionKey::EnvVar(0)).unwrap().len(), 1);
}

#[test]
fn test_select_deeper_level_looks_it_up() {
    let (mut session, mut rx) = connected();
    push_stop(&mut session, &[frame(0, "main"), frame(1, "caller")], vec![]);
    session.take_events();

    session.select_stack_level(1).unwrap();
    assert_eq!(drain(&mut rx), vec![Message::CallStackLookupPerform { level: 1 }]);

    session.on_message_received(Message::CallStackLookupBegin);
    session.on_message_received(Message::CallStackLookup(frame(1, "caller")));
    session.on_message_received(Message::LocalVar(StackVar {
        var: lua_var("n", &[], "3", LuaType::Number),
        level: 1,
        index: 1,
    }));
    session.on_message_received(Message::CallStackLookupEnd);

    assert_eq!(session.current_stack_level(), 1);
    assert_eq!(session.previous_stack_level(), 0);
    assert!(!session.call_stack().needs_lookup(1));
    assert_eq!(session.variables().tree(CollectionKey::Local(1)).unwrap().len(), 1);

    let events = session.take_events();
    assert_eq!(
        events,
        vec![
            SessionEvent::StackLevelChanging { from: 0, to: 1 },
            SessionEvent::StackLevelChanged { from: 0, to: 1 },
            SessionEvent::StackLevelLookingUp { level: 1 },
            SessionEvent::VariableInserted {
                collection: CollectionKey::Local(1),
                node: session
                    .variables()
                    .tree(CollectionKey::Local(1))
                    .unwrap()
                    .roots()[0],
            },
            SessionEvent::StackLevelLookedUp { level: 1 },
        ]
    );

    // Selection survives the next stop and is looked up again
    push_stop(&mut session, &[frame(0, "main"), frame(1, "caller")], vec![]);
    session.on_update_sync().unwrap();
    assert_eq!(drain(&mut rx), vec![Message::CallStackLookupPerform { level: 1 }]);
}

#[test]
fn test_shadowed_locals_kept_apart() {
    let (mut session, _rx) = connected();
    push_stop(&mut session, &[frame(0, "main")], vec![]);

    for (index, value) in [(1, "1"), (2, "2")] {
        session.on_message_received(Message::LocalVar(StackVar {
            var: lua_var("x", &[], value, LuaType::Number),
            level: 0,
            index,
        }));
    }

    let locals = session.variables().tree(CollectionKey::Local(0)).unwrap();
    assert_eq!(locals.len(), 2);
    let values: Vec<_> = locals
        .roots()
        .iter()
        .map(|id| locals.var(*id).unwrap())
        .map(|v| (v.scope.index(), v.value.as_str()))
        .collect();
    assert_eq!(values, vec![(Some(1), "1"), (Some(2), "2")]);

    // The same slot again refreshes instead of duplicating
    session.on_message_received(Message::LocalVar(StackVar {
        var: lua_var("x", &[], "3", LuaType::Number),
        level: 0,
        index: 2,
    }));
    let locals = session.variables().tree(CollectionKey::Local(0)).unwrap();
    assert_eq!(locals.len(), 2);
}

#[test]
fn test_level_selected_during_lookup_is_requested_after_it() {
    let (mut session, mut rx) = connected();
    push_stop(
        &mut session,
        &[frame(0, "main"), frame(1, "caller"), frame(2, "outer")],
        vec![],
    );

    session.select_stack_level(1).unwrap();
    session.select_stack_level(2).unwrap();
    assert_eq!(drain(&mut rx), vec![Message::CallStackLookupPerform { level: 1 }]);

    session.on_message_received(Message::CallStackLookupBegin);
    session.on_message_received(Message::CallStackLookup(frame(1, "caller")));
    session.on_message_received(Message::CallStackLookupEnd);

    assert_eq!(session.current_stack_level(), 2);
    assert_eq!(drain(&mut rx), vec![Message::CallStackLookupPerform { level: 2 }]);
    assert_eq!(session.call_stack().lookup_in_flight(), Some(2));

    session.on_message_received(Message::CallStackLookupBegin);
    session.on_message_received(Message::CallStackLookup(frame(2, "outer")));
    session.on_message_received(Message::CallStackLookupEnd);
    assert!(!session.call_stack().needs_lookup(2));
    assert!(drain(&mut rx).is_empty());
}

#[test]
fn test_edits_validated_before_sending() {
    let (mut session, mut rx) = stopped();
    push_stop(
        &mut session,
        &[frame(0, "main")],
        vec![
            lua_var("flag", &[], "false", LuaType::Boolean),
            lua_var("name", &[], "bob", LuaType::String),
        ],
    );
    let flag = global_root(&session, "flag");
    let name = global_root(&session, "name");

    let err = session.try_apply_edit(CollectionKey::Global, flag, "maybe").unwrap_err();
    assert!(matches!(err, EditError::InvalidBoolean(_)));
    let err = session.try_apply_edit(CollectionKey::Global, name, "alice").unwrap_err();
    assert!(matches!(err, EditError::UnsupportedType(LuaType::String)));
    assert!(drain(&mut rx).is_empty());

    session.try_apply_edit(CollectionKey::Global, flag, "1").unwrap();
    let sent = drain(&mut rx);
    assert!(matches!(
        sent.as_slice(),
        [Message::VarUpdate(u)] if u.value == "true" && u.value_type == LuaType::Boolean
    ));
    let value = &session.variables().globals().var(flag).unwrap().value;
    assert_eq!(value, "true");

    session.transport().state().set_update_in_progress(true);
    assert!(matches!(
        session.try_apply_edit(CollectionKey::Global, flag, "0"),
        Err(EditError::UpdateInProgress)
    ));
}

#[test]
fn test_edit_requires_connection() {
    let (transport, _rx) = ChannelTransport::channel(8);
    let mut session = DebugSession::new(transport);
    assert!(!session.transport().is_connected());

    let mut elsewhere = luadbg_client::VarTree::new();
    let node = elsewhere.insert_root(VariableRecord::new(
        &lua_var("x", &[], "1", LuaType::Number),
        VariableScope::Global,
        None,
    ));
    assert!(matches!(
        session.try_apply_edit(CollectionKey::Global, node, "1"),
        Err(EditError::NotConnected)
    ));
}

struct FixedProvider {
    offered: Vec<CustomVariable>,
}

impl CustomWatchProvider for FixedProvider {
    fn variables(&self, _context: &UpdateContext<'_>) -> Vec<CustomVariable> {
        self.offered.clone()
    }
}

#[test]
fn test_custom_watches_reconciled_and_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("watches.json");
    let stale = Uuid::new_v4();
    let offered = Uuid::new_v4();
    std::fs::write(
        &path,
        format!(
            r#"[
                {{"scope": "Global", "names_and_types": [{{"name": "score", "lua_type": "String"}}]}},
                {{"scope": "Global", "names_and_types": [{{"name": "old", "lua_type": "String"}}],
                  "custom": {{"guid": "{stale}", "alias": "old"}}}},
                {{"scope": "Global", "names_and_types": []}}
            ]"#
        ),
    )
    .unwrap();

    let (mut session, mut rx) = connected();
    let invalid = session.attach_watch_store(WatchStore::new(&path), true).unwrap();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].position, 2);
    assert_eq!(session.watches().len(), 2);

    session.register_provider(Box::new(FixedProvider {
        offered: vec![CustomVariable {
            guid: offered,
            alias: "Health".into(),
            scope: Scope::Global,
            names_and_types: vec![NameAndType::new("hp", LuaType::String)],
            level: 0,
            index: 0,
            renderer: None,
        }],
    }));

    push_stop(&mut session, &[frame(0, "main")], vec![]);
    session.on_update_sync().unwrap();

    let labels: Vec<String> = session.watches().iter().map(|w| w.label()).collect();
    assert_eq!(labels, vec!["score".to_string(), "Health".to_string()]);
    let lookups = drain(&mut rx)
        .into_iter()
        .filter(|m| matches!(m, Message::VarLookUp(_)))
        .count();
    assert_eq!(lookups, 2);

    let stored = WatchStore::new(&path).load().unwrap();
    assert_eq!(stored.watches.len(), 2);
    assert!(stored.watches.iter().all(|w| w.custom.as_ref().map_or(true, |c| c.guid == offered)));
}

#[test]
fn test_watch_added_while_stopped_is_looked_up_immediately() {
    let (mut session, mut rx) = stopped();
    push_stop(&mut session, &[frame(0, "main")], vec![lua_var("x", &[], "1", LuaType::Number)]);
    let x = session
        .variables()
        .globals()
        .var(global_root(&session, "x"))
        .cloned()
        .unwrap();

    let id = session.add_watched_variable(&x).unwrap().unwrap();
    assert!(session.is_variable_watched(&x));
    assert!(session.add_watched_variable(&x).unwrap().is_none());
    assert_eq!(drain(&mut rx).len(), 5);

    session.on_message_received(Message::GlobalVarLookupBegin);
    session.on_message_received(Message::GlobalVar(lua_var("x", &[], "1", LuaType::Number)));
    session.on_message_received(Message::GlobalVarLookupEnd);
    assert_eq!(session.watches().get(id).unwrap().live().unwrap().value, "1");

    assert!(session.remove_watched_variable(&x).unwrap());
    assert!(!session.is_variable_watched(&x));
}

#[test]
fn test_runtime_collections() {
    let (mut session, mut rx) = connected();
    session.on_message_received(Message::Limits(luadbg_protocol::Limits {
        max_breakpoints: 64,
        max_var_filters: 8,
        profiler_enabled: false,
        memory_tracer_enabled: true,
    }));
    assert!(session.toggle_profiler().is_err());
    session.toggle_memory_tracer().unwrap();
    assert_eq!(drain(&mut rx), vec![Message::MemoryTraceToggle]);

    session.on_message_received(Message::LuaStateBegin);
    session.on_message_received(Message::LuaStateAdd(luadbg_protocol::LuaStateInfo {
        address: "0x10".into(),
        name: "main".into(),
        debugging: true,
    }));
    session.on_message_received(Message::LuaStateEnd);
    session.toggle_lua_state("0x10").unwrap();
    assert!(!session.lua_states().get("0x10").unwrap().debugging);
    assert_eq!(
        drain(&mut rx),
        vec![Message::LuaStateToggle {
            address: "0x10".into()
        }]
    );

    // Requests sent by the debugger are never accepted from the runtime
    session.on_message_received(Message::ProfilerToggle);
    assert!(session.variables().is_empty());
}

#[test]
fn test_renderer_arc_is_shareable() {
    struct Shout;
    impl luadbg_client::VarRenderer for Shout {
        fn render(&self, var: &VariableRecord) -> String {
            format!("{}!", var.value)
        }
    }
    let renderer: Arc<dyn luadbg_client::VarRenderer> = Arc::new(Shout);
    let var = VariableRecord::new(&lua_var("x", &[], "1", LuaType::Number), VariableScope::Global, None);
    assert_eq!(renderer.render(&var), "1!");
}
