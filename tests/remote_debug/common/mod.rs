use luadbg::debuggee::lua::new_interpreter;
use luadbg::debuggee::{RuntimeContext, Session};
use luadbg::frame::{FrameEvent, FrameSession};
use luadbg::remote::{Endpoint, Peer, RemoteEngine};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(20);

/// Lua script written to a temporary file.
pub struct Script {
    pub path: PathBuf,
    /// Chunk source key, `@path`.
    pub key: String,
}

impl Script {
    pub fn new(name: &str, code: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("ldb-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, code).unwrap();
        let key = format!("@{}", path.display());
        Self { path, key }
    }
}

/// Interpreter thread running a script under the debug hook.
pub struct Debuggee {
    handle: JoinHandle<Result<(), String>>,
}

impl Debuggee {
    /// Wait for the script to finish, return the script error if any.
    pub fn join(self) -> Result<(), String> {
        self.handle.join().expect("interpreter thread panicked")
    }
}

/// Start a frame and a debuggee running `script`, the script stops at its first line.
pub fn start(script: &Script) -> (FrameSession, Debuggee) {
    let frame = Arc::new(RemoteEngine::new(Peer::Frame));
    frame.start(Endpoint::loopback(0), WAIT).unwrap();
    let port = frame.local_addr().unwrap().port();

    let key = script.key.clone();
    let code = fs::read_to_string(&script.path).unwrap();
    let handle = thread::spawn(move || {
        let engine = Arc::new(RemoteEngine::new(Peer::Debuggee));
        engine
            .start_as_client("127.0.0.1", port, WAIT)
            .map_err(|e| e.to_string())?;

        let lua = new_interpreter();
        let context = RuntimeContext::new();
        let session = Arc::new(Session::new(engine.clone(), POLL));
        context
            .attach(&lua, session.clone())
            .map_err(|e| e.to_string())?;
        session.begin();

        let result = lua.load(code.as_str()).set_name(key).exec();
        if let Err(err) = &result {
            context.report_error(&lua, err);
        }
        context.detach(&lua);
        engine.shutdown();
        result.map_err(|e| e.to_string())
    });

    frame.wait_connected(WAIT).unwrap();
    (FrameSession::new(frame, WAIT), Debuggee { handle })
}

/// Wait for an event matching `pred`, events before it are returned too.
pub fn wait_for(
    session: &mut FrameSession,
    pred: impl Fn(&FrameEvent) -> bool,
) -> Vec<FrameEvent> {
    let deadline = Instant::now() + WAIT;
    let mut seen = vec![];
    while Instant::now() < deadline {
        for event in session.wait_events(POLL) {
            let found = pred(&event);
            seen.push(event);
            if found {
                return seen;
            }
        }
    }
    panic!("expected event not received, got {seen:?}");
}

/// Wait until the debuggee stops, return the zero-based stop line.
pub fn wait_stop(session: &mut FrameSession) -> u32 {
    let events = wait_for(session, |e| matches!(e, FrameEvent::Stopped { .. }));
    match events.last() {
        Some(FrameEvent::Stopped { line, .. }) => *line,
        _ => unreachable!(),
    }
}

/// Collect every event until the debuggee disconnects.
pub fn wait_disconnect(session: &mut FrameSession) -> Vec<FrameEvent> {
    wait_for(session, |e| matches!(e, FrameEvent::Disconnected))
}
