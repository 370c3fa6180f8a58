use crate::common::{start, wait_disconnect, wait_for, wait_stop, Script};
use luadbg::frame::FrameEvent;
use luadbg::protocol::{Breakpoint, LuaType, StackFrameRef};
use serial_test::serial;

const VARS: &str = r#"counter = 10
local player = { name = "bob", hp = 42, pos = { x = 1, y = 2 } }
local function two() return 1, "two" end
local label = "done"
print(label)
"#;

/// Zero-based line of `print(label)`.
const STOP_LINE: u32 = 4;

fn stop_before_print(name: &str) -> (luadbg::frame::FrameSession, crate::common::Debuggee) {
    let script = Script::new(name, VARS);
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);
    frame
        .set_breakpoint(Breakpoint::new(script.key.clone(), STOP_LINE))
        .unwrap();
    wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));
    frame.resume().unwrap();
    assert_eq!(wait_stop(&mut frame), STOP_LINE);
    (frame, debuggee)
}

fn finish(mut frame: luadbg::frame::FrameSession, debuggee: crate::common::Debuggee) {
    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

#[test]
#[serial]
fn test_locals_and_fields() {
    let (frame, debuggee) = stop_before_print("locals.lua");

    let locals = frame.locals(StackFrameRef::TOP).unwrap();
    let label = locals.iter().find(|v| v.name == "label").unwrap();
    assert_eq!(label.value, "\"done\"");
    assert_eq!(label.value_type, LuaType::String);

    let player = locals.iter().find(|v| v.name == "player").unwrap();
    assert_eq!(player.value_type, LuaType::Table);
    assert!(player.is_expandable());

    let fields = frame.fields(player).unwrap();
    let names = fields.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["hp", "name", "pos"]);

    let pos = fields.iter().find(|v| v.name == "pos").unwrap();
    let coords = frame.fields(pos).unwrap();
    assert_eq!(coords.len(), 2);
    assert_eq!(coords[0].value, "1");

    finish(frame, debuggee);
}

#[test]
#[serial]
fn test_eval() {
    let (frame, debuggee) = stop_before_print("eval.lua");

    let hp = frame.eval("player.hp + counter", StackFrameRef::TOP).unwrap();
    assert_eq!(hp.value, "52");
    assert_eq!(hp.value_type, LuaType::Integer);

    let values = frame.eval_multi("two()", StackFrameRef::TOP).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[1].value, "\"two\"");

    let bad = frame.eval("player.", StackFrameRef::TOP).unwrap();
    assert!(bad.is_error());

    let list = frame
        .evals(
            &["label".to_string(), "missing".to_string()],
            StackFrameRef::TOP,
        )
        .unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[1].value_type, LuaType::Nil);

    finish(frame, debuggee);
}

#[test]
#[serial]
fn test_globals_registry_stack() {
    let (frame, debuggee) = stop_before_print("globals.lua");

    let globals = frame.globals(StackFrameRef::TOP).unwrap();
    let counter = globals.iter().find(|v| v.name == "counter").unwrap();
    assert_eq!(counter.value, "10");
    assert!(globals.iter().any(|v| v.name == "print"));

    assert!(!frame.registry().unwrap().is_empty());

    let stack = frame.stack(StackFrameRef::TOP).unwrap();
    assert!(stack.iter().any(|v| v.name == "label"));

    finish(frame, debuggee);
}

#[test]
#[serial]
fn test_watches_follow_update_count() {
    let (mut frame, debuggee) = stop_before_print("watch.lua");

    assert!(frame.watches_mut().add("player.name"));
    let watches = frame.refresh_watches().unwrap();
    let (expr, value) = watches.entries().next().unwrap();
    assert_eq!(expr, "player.name");
    assert_eq!(value.unwrap().value, "\"bob\"");
    assert!(!frame.watches().is_stale(frame.update_count()));

    finish(frame, debuggee);
}

#[test]
#[serial]
fn test_sync_sources() {
    let (mut frame, debuggee) = stop_before_print("sync.lua");

    let events = frame.sync_sources().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, FrameEvent::SourceAdded { title, .. } if title == "sync.lua")));
    assert_eq!(frame.sources().len(), 1);

    finish(frame, debuggee);
}

#[test]
#[serial]
fn test_global_fields_under_local_with_same_name() {
    let script = Script::new(
        "shadow.lua",
        "t = { g = 1 }\nlocal t = { l = 2 }\nprint(t)\n",
    );
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);
    frame
        .set_breakpoint(Breakpoint::new(script.key.clone(), 2))
        .unwrap();
    wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));
    frame.resume().unwrap();
    assert_eq!(wait_stop(&mut frame), 2);

    let globals = frame.globals(StackFrameRef::TOP).unwrap();
    let global = globals.iter().find(|v| v.name == "t").unwrap();
    let fields = frame.fields(global).unwrap();
    let names = fields.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["g"]);

    let locals = frame.locals(StackFrameRef::TOP).unwrap();
    let local = locals.iter().find(|v| v.name == "t").unwrap();
    let fields = frame.fields(local).unwrap();
    assert_eq!(fields[0].name, "l");

    finish(frame, debuggee);
}
