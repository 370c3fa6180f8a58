use crate::common::{start, wait_disconnect, wait_for, wait_stop, Script};
use luadbg::frame::FrameEvent;
use luadbg::protocol::{Breakpoint, StackFrameRef};
use serial_test::serial;

const CALC: &str = r#"local function add(x, y)
  local s = x + y
  return s
end
local a = 1
local b = 2
local c = add(a, b)
print(c)
"#;

/// Zero-based line of `local c = add(a, b)`.
const CALL_LINE: u32 = 6;

fn stop_at_call(name: &str) -> (luadbg::frame::FrameSession, crate::common::Debuggee) {
    let script = Script::new(name, CALC);
    let (mut frame, debuggee) = start(&script);
    // the first executed line creates the `add` closure at its `end`
    assert_eq!(wait_stop(&mut frame), 3);

    frame
        .set_breakpoint(Breakpoint::new(script.key.clone(), CALL_LINE))
        .unwrap();
    wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));
    frame.resume().unwrap();
    assert_eq!(wait_stop(&mut frame), CALL_LINE);
    (frame, debuggee)
}

#[test]
#[serial]
fn test_step_over_call() {
    let (mut frame, debuggee) = stop_at_call("step_over.lua");

    frame.step_over().unwrap();
    assert_eq!(wait_stop(&mut frame), 7);

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

#[test]
#[serial]
fn test_step_into_and_return() {
    let (mut frame, debuggee) = stop_at_call("step_into.lua");

    frame.step_into().unwrap();
    assert_eq!(wait_stop(&mut frame), 1);
    let backtrace = frame.backtrace().unwrap();
    assert_eq!(backtrace[0].function, "add");
    assert_eq!(backtrace[0].line, Some(1));
    assert_eq!(backtrace[1].line, Some(CALL_LINE));

    frame.step_return().unwrap();
    assert_eq!(wait_stop(&mut frame), 7);
    let c = frame.eval("c", StackFrameRef::TOP).unwrap();
    assert_eq!(c.value, "3");

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

const PCALL: &str = r#"local function boom() error("x") end
local ok = pcall(boom)
local a = 1
local b = 2
"#;

#[test]
#[serial]
fn test_step_over_caught_error() {
    let script = Script::new("step_pcall.lua", PCALL);
    let (mut frame, debuggee) = start(&script);
    assert_eq!(wait_stop(&mut frame), 0);

    frame.step_over().unwrap();
    assert_eq!(wait_stop(&mut frame), 1);
    frame.step_over().unwrap();
    assert_eq!(wait_stop(&mut frame), 2);
    let ok = frame.eval("ok", StackFrameRef::TOP).unwrap();
    assert_eq!(ok.value, "false");
    frame.step_over().unwrap();
    assert_eq!(wait_stop(&mut frame), 3);

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

#[test]
#[serial]
fn test_step_out_of_function_left_by_error() {
    let script = Script::new(
        "step_out_error.lua",
        "local function boom()\n  local x = 1\n  error(\"x\")\nend\nlocal ok = pcall(boom)\nlocal a = 1\n",
    );
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);
    frame
        .set_breakpoint(Breakpoint::new(script.key.clone(), 1))
        .unwrap();
    wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));
    frame.resume().unwrap();
    assert_eq!(wait_stop(&mut frame), 1);

    frame.step_return().unwrap();
    assert_eq!(wait_stop(&mut frame), 5);

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

#[test]
#[serial]
fn test_step_line_by_line() {
    let script = Script::new("step_lines.lua", "local a = 1\nlocal b = 2\nlocal c = 3\n");
    let (mut frame, debuggee) = start(&script);

    assert_eq!(wait_stop(&mut frame), 0);
    frame.step_into().unwrap();
    assert_eq!(wait_stop(&mut frame), 1);
    frame.step_over().unwrap();
    assert_eq!(wait_stop(&mut frame), 2);

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

#[test]
#[serial]
fn test_step_needs_break() {
    let script = Script::new("step_running.lua", "local a = 1\n");
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);
    frame.resume().unwrap();
    assert!(frame.step_over().is_err());

    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}
