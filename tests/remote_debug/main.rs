mod common;

mod breakpoints;
mod steps;
mod variables;

use crate::common::{start, wait_disconnect, wait_for, wait_stop, Script};
use luadbg::frame::FrameEvent;
use luadbg::protocol::{LogType, StackFrameRef};
use serial_test::serial;

const HELLO: &str = r#"local greeting = "hello"
local name = "world"
print(greeting, name)
"#;

#[test]
#[serial]
fn test_stop_on_first_line() {
    let script = Script::new("hello.lua", HELLO);
    let (mut frame, debuggee) = start(&script);

    assert_eq!(wait_stop(&mut frame), 0);
    assert!(frame.is_broken());
    let position = frame.position().unwrap();
    assert_eq!(position.key, script.key);
    assert_eq!(frame.sources().get(&script.key).unwrap().title, "hello.lua");

    frame.resume().unwrap();
    let events = wait_disconnect(&mut frame);
    assert!(events.contains(&FrameEvent::StateChanged { is_break: false }));
    assert!(events.iter().any(|e| matches!(
        e,
        FrameEvent::Log { log_type: LogType::Output, message, .. } if message == "hello\tworld"
    )));

    debuggee.join().unwrap();
    assert!(!frame.is_connected());
}

#[test]
#[serial]
fn test_disconnect_during_break() {
    let script = Script::new("disconnect.lua", HELLO);
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);

    frame.engine().abort();

    let err = debuggee.join().unwrap_err();
    assert!(err.contains("connection lost"), "{err}");
}

#[test]
#[serial]
fn test_quit_stops_script() {
    let script = Script::new("quit.lua", HELLO);
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);

    frame.quit().unwrap();

    let err = debuggee.join().unwrap_err();
    assert!(err.contains("quit requested"), "{err}");
    wait_disconnect(&mut frame);
}

#[test]
#[serial]
fn test_script_error_is_reported() {
    let script = Script::new("boom.lua", "local x = 1\nerror(\"boom\")\n");
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);
    frame.resume().unwrap();

    let events = wait_disconnect(&mut frame);
    let (key, line) = events
        .iter()
        .find_map(|e| match e {
            FrameEvent::Log {
                log_type: LogType::Error,
                message,
                key,
                line,
            } if message.contains("boom") => Some((key.clone(), *line)),
            _ => None,
        })
        .expect("error not forwarded");
    assert_eq!(key, script.key);
    assert_eq!(line, Some(1));

    assert!(debuggee.join().unwrap_err().contains("boom"));
}

#[test]
#[serial]
fn test_requests_fail_while_running() {
    let script = Script::new(
        "busy.lua",
        "local n = 0\nfor i = 1, 20000 do n = n + i end\nprint(n)\n",
    );
    let (mut frame, debuggee) = start(&script);
    wait_stop(&mut frame);
    frame.resume().unwrap();
    wait_for(&mut frame, |e| {
        matches!(e, FrameEvent::StateChanged { is_break: false })
    });

    assert!(frame.locals(StackFrameRef::TOP).is_err());

    wait_disconnect(&mut frame);
    debuggee.join().unwrap();
}
