use crate::common::{start, wait_disconnect, wait_for, wait_stop, Script};
use luadbg::frame::FrameEvent;
use luadbg::protocol::{Breakpoint, StackFrameRef};
use serial_test::serial;

const LOOP: &str = r#"local sum = 0
for i = 1, 3 do
  sum = sum + i
end
print(sum)
"#;

#[test]
#[serial]
fn test_source_add_then_breakpoint() {
    let script = Script::new("loop.lua", LOOP);
    let (mut frame, debuggee) = start(&script);

    let events = wait_for(&mut frame, |e| matches!(e, FrameEvent::Stopped { .. }));
    let added = events
        .iter()
        .position(|e| matches!(e, FrameEvent::SourceAdded { key, .. } if *key == script.key))
        .expect("source not announced");
    let stopped = events
        .iter()
        .position(|e| matches!(e, FrameEvent::Stopped { .. }))
        .unwrap();
    assert!(added < stopped);

    let source = frame.resolve_source("loop.lua").unwrap();
    assert_eq!(source.key, script.key);
    assert_eq!(source.lines.len(), 5);

    frame
        .set_breakpoint(Breakpoint::new(script.key.clone(), 2))
        .unwrap();
    wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));
    assert!(frame.breakpoints().find(&script.key, 2).is_some());

    for i in 1..=3 {
        frame.resume().unwrap();
        assert_eq!(wait_stop(&mut frame), 2);
        let var = frame.eval("i", StackFrameRef::TOP).unwrap();
        assert_eq!(var.value, i.to_string());
    }

    frame.remove_breakpoint(&script.key, 2).unwrap();
    wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));
    assert!(frame.breakpoints().is_empty());

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

#[test]
#[serial]
fn test_breakpoint_set_twice() {
    let script = Script::new("twice.lua", LOOP);
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);

    for _ in 0..2 {
        frame
            .set_breakpoint(Breakpoint::new(script.key.clone(), 4))
            .unwrap();
        wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));
    }
    assert_eq!(frame.breakpoints().len(), 1);

    frame.resume().unwrap();
    assert_eq!(wait_stop(&mut frame), 4);
    let sum = frame.eval("sum", StackFrameRef::TOP).unwrap();
    assert_eq!(sum.value, "6");

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}

#[test]
#[serial]
fn test_temporary_breakpoint_is_removed_when_hit() {
    let script = Script::new("temp.lua", LOOP);
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);

    frame
        .set_breakpoint(Breakpoint::temporary(script.key.clone(), 2))
        .unwrap();
    wait_for(&mut frame, |e| matches!(e, FrameEvent::BreakpointsChanged));

    frame.resume().unwrap();
    // the list is broadcast before the stop is reported
    assert_eq!(wait_stop(&mut frame), 2);
    assert!(frame.breakpoints().is_empty());

    frame.resume().unwrap();
    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}
