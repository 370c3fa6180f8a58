//! Frame side: the debugger front end view of a remote debuggee.
//!
//! [`FrameSession`] keeps mirrors of what the debuggee reports (state, position, sources,
//! breakpoints) and turns user actions into protocol commands. Mirrors change only when the
//! debuggee says so, a breakpoint set from here shows up after the debuggee broadcasts the
//! new list.

pub mod watch;

use crate::protocol::{
    Breakpoint, Command, LogType, LuaBacktrace, LuaVar, Message, Source, StackFrameRef,
};
use crate::registry::{BreakpointList, SourceManager};
use crate::remote::{self, RemoteEngine};
use crate::weak_error;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use watch::WatchList;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("debuggee is running, stop it first")]
    NotBroken,
    #[error("debuggee is not connected")]
    NotConnected,
    #[error("unknown source `{0}`")]
    UnknownSource(String),
    #[error("empty reply")]
    EmptyReply,
    #[error("debuggee stays stopped")]
    Refused,
    #[error(transparent)]
    Remote(#[from] remote::Error),
}

impl Error {
    /// Return a hint to the front end - keep the session or shut it down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::NotBroken => false,
            Error::UnknownSource(_) => false,
            Error::EmptyReply => false,
            Error::Refused => false,
            Error::Remote(e) => e.is_fatal(),

            Error::NotConnected => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Something the debuggee reported.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    StateChanged {
        is_break: bool,
    },
    /// Debuggee stopped at a zero-based line.
    Stopped {
        key: String,
        line: u32,
        is_refresh_only: bool,
    },
    SourceAdded {
        key: String,
        title: String,
    },
    BreakpointsChanged,
    Log {
        log_type: LogType,
        message: String,
        key: String,
        line: Option<u32>,
    },
    Disconnected,
}

/// Current stop position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub key: String,
    pub line: u32,
}

pub struct FrameSession {
    engine: Arc<RemoteEngine>,
    request_timeout: Duration,
    is_broken: bool,
    disconnected: bool,
    position: Option<Position>,
    update_count: u32,
    sources: SourceManager,
    breakpoints: BreakpointList,
    watches: WatchList,
    /// Events processed on the way of a control request, not yet seen by the caller.
    backlog: Vec<FrameEvent>,
}

impl FrameSession {
    pub fn new(engine: Arc<RemoteEngine>, request_timeout: Duration) -> Self {
        Self {
            engine,
            request_timeout,
            is_broken: false,
            disconnected: false,
            position: None,
            update_count: 0,
            sources: SourceManager::new(),
            breakpoints: BreakpointList::new(),
            watches: WatchList::new(),
            backlog: vec![],
        }
    }

    pub fn engine(&self) -> &RemoteEngine {
        &self.engine
    }

    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnected && self.engine.is_connected()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn update_count(&self) -> u32 {
        self.update_count
    }

    pub fn sources(&self) -> &SourceManager {
        &self.sources
    }

    pub fn breakpoints(&self) -> &BreakpointList {
        &self.breakpoints
    }

    pub fn watches(&self) -> &WatchList {
        &self.watches
    }

    pub fn watches_mut(&mut self) -> &mut WatchList {
        &mut self.watches
    }

    /// Process every command already received, don't wait for new ones.
    pub fn pump(&mut self) -> Vec<FrameEvent> {
        let mut events = std::mem::take(&mut self.backlog);
        while let Some(cmd) = self.engine.inbound().try_pop() {
            events.extend(self.handle(cmd));
        }
        events
    }

    /// Wait up to `timeout` for the debuggee to report something, then process the backlog.
    pub fn wait_events(&mut self, timeout: Duration) -> Vec<FrameEvent> {
        if !self.backlog.is_empty() {
            return self.pump();
        }
        let mut events = vec![];
        if let Some(cmd) = self.engine.inbound().pop(timeout) {
            events.extend(self.handle(cmd));
        }
        events.extend(self.pump());
        events
    }

    fn handle(&mut self, cmd: Command) -> Option<FrameEvent> {
        let event = match cmd.message {
            Message::ChangedState { is_break } => {
                self.is_broken = is_break;
                if !is_break {
                    self.position = None;
                }
                FrameEvent::StateChanged { is_break }
            }
            Message::UpdateSource {
                key,
                line,
                update_count,
                is_refresh_only,
            } => {
                // the debuggee may not resume until it gets the counter back
                weak_error!(
                    self.engine.send(Message::SetUpdateCount(update_count)),
                    "acknowledge source update:"
                );
                self.is_broken = true;
                self.update_count = update_count;
                self.position = Some(Position {
                    key: key.clone(),
                    line,
                });
                FrameEvent::Stopped {
                    key,
                    line,
                    is_refresh_only,
                }
            }
            Message::AddedSource(source) => {
                let event = FrameEvent::SourceAdded {
                    key: source.key.clone(),
                    title: source.title.clone(),
                };
                self.sources.insert(source);
                event
            }
            Message::ChangedBreakpointList(list) => {
                self.breakpoints.replace_all(list);
                FrameEvent::BreakpointsChanged
            }
            Message::OutputLog {
                log_type,
                message,
                key,
                line,
            } => FrameEvent::Log {
                log_type,
                message,
                key,
                line: u32::try_from(line).ok(),
            },
            Message::EndConnection => {
                info!(target: "frame", "debuggee disconnected");
                self.disconnected = true;
                self.is_broken = false;
                self.position = None;
                FrameEvent::Disconnected
            }
            other => {
                debug!(target: "frame", "ignore unexpected command {}", other.command_type());
                return None;
            }
        };
        Some(event)
    }

    fn send(&self, message: Message) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.engine.send(message)?;
        Ok(())
    }

    fn ensure_broken(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        if !self.is_broken {
            return Err(Error::NotBroken);
        }
        Ok(())
    }

    // --------------------------------- execution control -----------------------------------------

    /// Ask a running debuggee to stop.
    pub fn pause(&mut self) -> Result<()> {
        self.send(Message::Break)
    }

    pub fn resume(&mut self) -> Result<()> {
        self.continue_with(Message::Resume)
    }

    pub fn step_into(&mut self) -> Result<()> {
        self.continue_with(Message::StepInto)
    }

    pub fn step_over(&mut self) -> Result<()> {
        self.continue_with(Message::StepOver)
    }

    pub fn step_return(&mut self) -> Result<()> {
        self.continue_with(Message::StepReturn)
    }

    fn continue_with(&mut self, message: Message) -> Result<()> {
        // acknowledge a pending source update first, else a resume is refused
        let events = self.pump();
        self.backlog = events;
        self.ensure_broken()?;
        self.send(message)?;
        self.wait_resumed()
    }

    /// Wait until the debuggee reports it left the break. Events on the way go to the backlog.
    fn wait_resumed(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.request_timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(Error::Refused);
            }
            let Some(cmd) = self.engine.inbound().pop(left) else {
                continue;
            };
            let Some(event) = self.handle(cmd) else {
                continue;
            };
            let outcome = match event {
                FrameEvent::StateChanged { is_break: false } => Some(Ok(())),
                FrameEvent::Disconnected => Some(Err(Error::NotConnected)),
                _ => None,
            };
            self.backlog.push(event);
            if let Some(outcome) = outcome {
                return outcome;
            }
        }
    }

    /// Ask the debuggee to stop the script.
    pub fn quit(&mut self) -> Result<()> {
        self.send(Message::Quit)
    }

    /// Ask a stopped debuggee to report its position again.
    pub fn force_update_source(&mut self) -> Result<()> {
        self.ensure_broken()?;
        self.send(Message::ForceUpdateSource)
    }

    // --------------------------------- breakpoints -----------------------------------------------

    /// Find a known source by key, file path or title.
    pub fn resolve_source(&self, name: &str) -> Result<&Source> {
        if let Some(src) = self.sources.get(name) {
            return Ok(src);
        }
        if let Some(src) = self.sources.find_file(name) {
            return Ok(src);
        }
        self.sources
            .list()
            .find(|src| src.title == name || src.path.as_deref() == Some(Path::new(name)))
            .ok_or_else(|| Error::UnknownSource(name.to_string()))
    }

    pub fn set_breakpoint(&mut self, bp: Breakpoint) -> Result<()> {
        self.send(Message::SetBreakpoint(bp))
    }

    pub fn remove_breakpoint(&mut self, key: &str, line: u32) -> Result<()> {
        self.send(Message::RemoveBreakpoint(Breakpoint::new(key, line)))
    }

    /// Set a breakpoint if there is none at the line, remove it otherwise.
    pub fn toggle_breakpoint(&mut self, key: &str, line: u32) -> Result<()> {
        if self.breakpoints.find(key, line).is_some() {
            self.remove_breakpoint(key, line)
        } else {
            self.set_breakpoint(Breakpoint::new(key, line))
        }
    }

    // --------------------------------- queries ---------------------------------------------------

    fn query(&self, message: Message) -> Result<remote::Reply> {
        self.ensure_broken()?;
        let reply = self.engine.request(message).wait(self.request_timeout)?;
        Ok(reply)
    }

    pub fn locals(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        Ok(self
            .query(Message::RequestLocalVarList(frame))?
            .into_var_list()?)
    }

    pub fn globals(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        Ok(self
            .query(Message::RequestGlobalVarList(frame))?
            .into_var_list()?)
    }

    pub fn registry(&self) -> Result<Vec<LuaVar>> {
        Ok(self
            .query(Message::RequestRegistryVarList)?
            .into_var_list()?)
    }

    pub fn stack(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        Ok(self.query(Message::RequestStackList(frame))?.into_var_list()?)
    }

    pub fn fields(&self, var: &LuaVar) -> Result<Vec<LuaVar>> {
        Ok(self
            .query(Message::RequestFieldsVarList(var.clone()))?
            .into_var_list()?)
    }

    pub fn eval(&self, expr: &str, frame: StackFrameRef) -> Result<LuaVar> {
        let message = Message::EvalToVar {
            expr: expr.to_string(),
            frame,
        };
        Ok(self.query(message)?.into_var()?)
    }

    /// Evaluate an expression keeping every returned value.
    pub fn eval_multi(&self, expr: &str, frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        let message = Message::EvalToMultiVar {
            expr: expr.to_string(),
            frame,
        };
        Ok(self.query(message)?.into_var_list()?)
    }

    /// Evaluate several expressions at once, one var per expression.
    pub fn evals(&self, exprs: &[String], frame: StackFrameRef) -> Result<Vec<LuaVar>> {
        let message = Message::EvalsToVarList {
            exprs: exprs.to_vec(),
            frame,
        };
        Ok(self.query(message)?.into_var_list()?)
    }

    pub fn backtrace(&self) -> Result<Vec<LuaBacktrace>> {
        Ok(self
            .query(Message::RequestBacktraceList)?
            .into_backtrace()?)
    }

    /// Watch values for the current stop, evaluated again only after a new source update.
    pub fn refresh_watches(&mut self) -> Result<&WatchList> {
        if !self.watches.is_empty() && self.watches.is_stale(self.update_count) {
            let values = self.evals(self.watches.exprs(), StackFrameRef::TOP)?;
            self.watches.store(self.update_count, values);
        }
        Ok(&self.watches)
    }

    // --------------------------------- sources ---------------------------------------------------

    /// Write new text of a file source on the debuggee side.
    pub fn save_source(&mut self, key: &str, lines: Vec<String>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let message = Message::SaveSource {
            key: key.to_string(),
            lines,
        };
        self.engine
            .request(message)
            .wait(self.request_timeout)?;
        Ok(())
    }

    /// Ask the debuggee for every source it knows, the mirror is complete once the call returns.
    pub fn sync_sources(&mut self) -> Result<Vec<FrameEvent>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.engine
            .request(Message::RequestSourceList)
            .wait(self.request_timeout)?;
        // sources are sent ahead of the acknowledgement
        Ok(self.pump())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::LuaType;
    use crate::remote::{Endpoint, Peer};

    const WAIT: Duration = Duration::from_secs(5);

    fn pair() -> (FrameSession, Arc<RemoteEngine>) {
        pair_with_timeout(WAIT)
    }

    fn pair_with_timeout(request_timeout: Duration) -> (FrameSession, Arc<RemoteEngine>) {
        let frame = Arc::new(RemoteEngine::new(Peer::Frame));
        frame.start(Endpoint::loopback(0), WAIT).unwrap();
        let port = frame.local_addr().unwrap().port();
        let debuggee = Arc::new(RemoteEngine::new(Peer::Debuggee));
        debuggee.start_as_client("127.0.0.1", port, WAIT).unwrap();
        frame.wait_connected(WAIT).unwrap();
        (FrameSession::new(frame, request_timeout), debuggee)
    }

    fn wait_for(session: &mut FrameSession, pred: impl Fn(&FrameEvent) -> bool) -> FrameEvent {
        loop {
            let events = session.wait_events(WAIT);
            assert!(!events.is_empty(), "no event in time");
            if let Some(event) = events.into_iter().find(&pred) {
                return event;
            }
        }
    }

    #[test]
    fn test_update_source_is_acknowledged() {
        let (mut session, debuggee) = pair();
        debuggee
            .send(Message::UpdateSource {
                key: "@a.lua".to_string(),
                line: 4,
                update_count: 7,
                is_refresh_only: false,
            })
            .unwrap();

        let event = wait_for(&mut session, |e| matches!(e, FrameEvent::Stopped { .. }));
        assert_eq!(
            event,
            FrameEvent::Stopped {
                key: "@a.lua".to_string(),
                line: 4,
                is_refresh_only: false
            }
        );
        assert!(session.is_broken());
        assert_eq!(session.update_count(), 7);

        let ack = debuggee.inbound().pop(WAIT).unwrap();
        assert_eq!(ack.message, Message::SetUpdateCount(7));
    }

    #[test]
    fn test_breakpoint_mirror_follows_broadcast() {
        let (mut session, debuggee) = pair();
        session.set_breakpoint(Breakpoint::new("@a.lua", 2)).unwrap();
        assert!(session.breakpoints().is_empty());

        let cmd = debuggee.inbound().pop(WAIT).unwrap();
        let Message::SetBreakpoint(bp) = cmd.message else {
            panic!("unexpected {:?}", cmd.message);
        };
        debuggee
            .send(Message::ChangedBreakpointList(vec![bp]))
            .unwrap();
        wait_for(&mut session, |e| *e == FrameEvent::BreakpointsChanged);
        assert!(session.breakpoints().find("@a.lua", 2).is_some());

        session.toggle_breakpoint("@a.lua", 2).unwrap();
        let cmd = debuggee.inbound().pop(WAIT).unwrap();
        assert_eq!(
            cmd.message,
            Message::RemoveBreakpoint(Breakpoint::new("@a.lua", 2))
        );
    }

    #[test]
    fn test_queries_need_break() {
        let (mut session, debuggee) = pair();
        assert!(matches!(
            session.locals(StackFrameRef::TOP),
            Err(Error::NotBroken)
        ));
        assert!(matches!(session.resume(), Err(Error::NotBroken)));

        debuggee
            .send(Message::ChangedState { is_break: true })
            .unwrap();
        wait_for(&mut session, |e| {
            *e == FrameEvent::StateChanged { is_break: true }
        });

        let responder = std::thread::spawn(move || {
            let req = debuggee.inbound().pop(WAIT).unwrap();
            let var = LuaVar {
                name: "x".to_string(),
                value: "1".to_string(),
                value_type: LuaType::Integer,
                path: "x".to_string(),
                ..LuaVar::default()
            };
            debuggee.reply(req.id, Message::ValueVar(var)).unwrap();
            debuggee
        });
        let var = session.eval("x", StackFrameRef::TOP).unwrap();
        assert_eq!(var.value, "1");
        let _debuggee = responder.join().unwrap();
    }

    #[test]
    fn test_resume_follows_acknowledgement() {
        let (mut session, debuggee) = pair();
        debuggee
            .send(Message::UpdateSource {
                key: "@a.lua".to_string(),
                line: 0,
                update_count: 1,
                is_refresh_only: false,
            })
            .unwrap();
        // resume without looking at events first
        while session.engine().inbound().len() == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }

        let responder = std::thread::spawn(move || {
            let ack = debuggee.inbound().pop(WAIT).unwrap().message;
            let resume = debuggee.inbound().pop(WAIT).unwrap().message;
            debuggee
                .send(Message::ChangedState { is_break: false })
                .unwrap();
            (ack, resume, debuggee)
        });
        session.resume().unwrap();
        assert!(!session.is_broken());
        assert!(session.position().is_none());

        let (ack, resume, _debuggee) = responder.join().unwrap();
        assert_eq!(ack, Message::SetUpdateCount(1));
        assert_eq!(resume, Message::Resume);

        let events = session.pump();
        assert!(matches!(events[0], FrameEvent::Stopped { line: 0, .. }));
        assert_eq!(events[1], FrameEvent::StateChanged { is_break: false });
    }

    #[test]
    fn test_refused_resume_keeps_break() {
        let (mut session, debuggee) = pair_with_timeout(Duration::from_millis(200));
        debuggee
            .send(Message::UpdateSource {
                key: "@a.lua".to_string(),
                line: 3,
                update_count: 1,
                is_refresh_only: false,
            })
            .unwrap();
        wait_for(&mut session, |e| matches!(e, FrameEvent::Stopped { .. }));

        // the debuggee ignores the request
        assert!(matches!(session.step_over(), Err(Error::Refused)));
        assert!(session.is_broken());
        assert_eq!(session.position().map(|p| p.line), Some(3));
        assert_eq!(
            debuggee.inbound().pop(WAIT).unwrap().message,
            Message::SetUpdateCount(1)
        );
        assert_eq!(
            debuggee.inbound().pop(WAIT).unwrap().message,
            Message::StepOver
        );
    }

    #[test]
    fn test_disconnect() {
        let (mut session, debuggee) = pair();
        debuggee.shutdown();
        wait_for(&mut session, |e| *e == FrameEvent::Disconnected);
        assert!(!session.is_connected());
        assert!(matches!(session.pause(), Err(Error::NotConnected)));
    }
}
