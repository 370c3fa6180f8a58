//! Debug session of one interpreter.
//!
//! The hook calls [`Session::on_hook`] for every call, return and line event. While the
//! debuggee is stopped the call doesn't return: it serves frame commands until one of them
//! moves the state away from `Break`.

use crate::debuggee::coroutine::{CoroutineId, CoroutineStack};
use crate::debuggee::state::{DebugState, RequestedState, StateMachine, Transition};
use crate::debuggee::{Error, Result};
use crate::protocol::{
    Breakpoint, Command, LogType, LuaBacktrace, LuaType, LuaVar, Message, Source, StackFrameRef,
};
use crate::registry::{BreakpointList, SourceManager};
use crate::remote::{self, RemoteEngine};
use crate::{ldb_debug, ldb_info, ldb_warn, muted_error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Access to the stopped interpreter. Frame levels are counted from the function that
/// triggered the hook.
pub trait Inspector {
    /// Named locals and upvalues of a frame.
    fn local_vars(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>>;

    /// Every active stack slot of a frame, temporaries and varargs included.
    fn stack_vars(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>>;

    /// Global environment visible from a frame.
    fn global_vars(&self, frame: StackFrameRef) -> Result<Vec<LuaVar>>;

    fn registry_vars(&self) -> Result<Vec<LuaVar>>;

    /// Children of a previously returned var.
    fn field_vars(&self, var: &LuaVar) -> Result<Vec<LuaVar>>;

    /// Evaluate an expression (or a statement) in the scope of a frame, return every result.
    fn eval(&self, expr: &str, frame: StackFrameRef) -> Result<Vec<LuaVar>>;

    fn backtrace(&self) -> Result<Vec<LuaBacktrace>>;
}

/// Channel to the frame as the session sees it.
pub trait Link: Send + Sync {
    fn send(&self, message: Message) -> remote::error::Result<u32>;

    fn reply(&self, request_id: u32, message: Message) -> remote::error::Result<()>;

    /// Next frame command, zero timeout means don't wait.
    fn next_command(&self, timeout: Duration) -> Option<Command>;

    fn is_connected(&self) -> bool;
}

impl Link for RemoteEngine {
    fn send(&self, message: Message) -> remote::error::Result<u32> {
        RemoteEngine::send(self, message)
    }

    fn reply(&self, request_id: u32, message: Message) -> remote::error::Result<()> {
        RemoteEngine::reply(self, request_id, message)
    }

    fn next_command(&self, timeout: Duration) -> Option<Command> {
        if timeout.is_zero() {
            self.inbound().try_pop()
        } else {
            self.inbound().pop(timeout)
        }
    }

    fn is_connected(&self) -> bool {
        RemoteEngine::is_connected(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Call,
    TailCall,
    Return,
    /// One-based line about to be executed.
    Line(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    pub coroutine: CoroutineId,
    pub kind: HookKind,
    /// Source key of the running chunk.
    pub source: &'a str,
    /// Active frames of the running coroutine, the hooked function included.
    pub stack_depth: u32,
}

#[derive(Default)]
struct SessionInner {
    machine: StateMachine,
    coroutines: CoroutineStack,
    breakpoints: BreakpointList,
    sources: SourceManager,
    update_count: u32,
    awaiting_ack: bool,
    force_refresh: bool,
}

impl SessionInner {
    /// Whether the running coroutine came back to the step reference depth.
    fn step_finished(&self) -> bool {
        match (self.machine.step_ref(), self.coroutines.current()) {
            (Some(reference), Some(current)) => {
                current.handle == reference.handle && current.call_depth <= reference.call_depth
            }
            _ => true,
        }
    }

    /// Whether the step reference frame is gone without a return event.
    fn step_frame_unwound(&self) -> bool {
        match (self.machine.step_ref(), self.coroutines.current()) {
            (Some(reference), Some(current)) => {
                current.handle == reference.handle && current.call_depth < reference.call_depth
            }
            _ => true,
        }
    }

    fn acknowledge(&mut self, count: u32) {
        if count == self.update_count {
            self.awaiting_ack = false;
        } else {
            ldb_debug!(
                target: "debuggee",
                "ignore acknowledgement {count}, current update is {}",
                self.update_count
            );
        }
    }
}

pub struct Session {
    link: Arc<dyn Link>,
    inner: Mutex<SessionInner>,
    detached: AtomicBool,
    poll_interval: Duration,
}

impl Session {
    pub fn new(link: Arc<dyn Link>, poll_interval: Duration) -> Self {
        Self {
            link,
            inner: Mutex::new(SessionInner::default()),
            detached: AtomicBool::new(false),
            poll_interval,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start debugging, the debuggee stops at the first executed line.
    pub fn begin(&self) {
        let mut inner = self.lock();
        let result = inner.machine.begin();
        ldb_debug!(target: "debuggee", "session begin: {result:?}");
    }

    pub fn state(&self) -> DebugState {
        self.lock().machine.state()
    }

    /// Whether the frame is gone and the hook does nothing.
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    pub fn update_count(&self) -> u32 {
        self.lock().update_count
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.lock().breakpoints.to_vec()
    }

    pub fn source(&self, key: &str) -> Option<Source> {
        self.lock().sources.get(key).cloned()
    }

    /// Run a closure over the known sources.
    pub fn with_sources<R>(&self, f: impl FnOnce(&SourceManager) -> R) -> R {
        f(&self.lock().sources)
    }

    /// Forward a log record to the frame. `line` is zero-based.
    ///
    /// Doesn't take the session lock, so it is safe to call from Lua code the hook runs.
    pub fn output(&self, log_type: LogType, message: &str, key: &str, line: Option<u32>) {
        if self.is_detached() {
            return;
        }
        self.send(Message::OutputLog {
            log_type,
            message: message.to_string(),
            key: key.to_string(),
            line: line.map(|l| l as i32).unwrap_or(-1),
        });
    }

    fn send(&self, message: Message) {
        muted_error!(self.link.send(message), "send to frame:");
    }

    fn reply(&self, request_id: u32, message: Message) {
        muted_error!(self.link.reply(request_id, message), "reply to frame:");
    }

    fn broadcast_breakpoints(&self, inner: &SessionInner) {
        self.send(Message::ChangedBreakpointList(inner.breakpoints.to_vec()));
    }

    fn apply(&self, inner: &mut SessionInner, requested: RequestedState) -> bool {
        let current = inner.coroutines.current();
        match inner.machine.request(requested, inner.awaiting_ack, current) {
            Transition::Applied {
                from, to, notify, ..
            } => {
                ldb_debug!(target: "debuggee", "state {from} -> {to}");
                if let Some(is_break) = notify {
                    self.send(Message::ChangedState { is_break });
                }
                true
            }
            Transition::Rejected(reason) => {
                ldb_debug!(target: "debuggee", "{requested} request ignored: {reason}");
                false
            }
        }
    }

    /// Process a hook event. An error means the script must be aborted.
    pub fn on_hook(&self, event: &HookEvent, inspector: &dyn Inspector) -> Result<()> {
        if self.is_detached() {
            return Ok(());
        }
        let mut inner = self.lock();
        if inner.machine.state() == DebugState::Initial {
            return Ok(());
        }
        inner
            .coroutines
            .switch_to(event.coroutine, event.stack_depth);

        let line = match event.kind {
            HookKind::Call | HookKind::TailCall => return Ok(()),
            HookKind::Return => {
                if inner.machine.state() == DebugState::StepReturn && inner.step_finished() {
                    self.apply(&mut inner, RequestedState::Break);
                }
                return Ok(());
            }
            HookKind::Line(line) => line.saturating_sub(1),
        };

        while let Some(cmd) = self.link.next_command(Duration::ZERO) {
            self.handle_command(&mut inner, cmd, inspector)?;
            if self.is_detached() {
                return Ok(());
            }
        }

        if inner.sources.add(event.source) {
            if let Some(source) = inner.sources.get(event.source).cloned() {
                ldb_debug!(target: "debuggee", "new source {}", source.title);
                self.send(Message::AddedSource(source));
            }
        }

        match inner.machine.state() {
            DebugState::StepInto => {
                self.apply(&mut inner, RequestedState::Break);
            }
            DebugState::StepOver if inner.step_finished() => {
                self.apply(&mut inner, RequestedState::Break);
            }
            // an error skipped the return event of the stepped frame
            DebugState::StepReturn if inner.step_frame_unwound() => {
                self.apply(&mut inner, RequestedState::Break);
            }
            _ => {}
        }

        if inner.machine.state() != DebugState::Break {
            if let Some(bp) = inner.breakpoints.find(event.source, line).cloned() {
                ldb_info!(target: "debuggee", "breakpoint {}:{} hit", bp.key, bp.line + 1);
                self.apply(&mut inner, RequestedState::Break);
                if bp.is_temp {
                    inner.breakpoints.remove(&bp.key, bp.line);
                    self.broadcast_breakpoints(&inner);
                }
            }
        }

        if inner.machine.state() == DebugState::Break {
            return self.break_loop(inner, event.source, line, inspector);
        }
        Ok(())
    }

    /// Serve the frame while stopped at `key:line`.
    fn break_loop<'s>(
        &'s self,
        mut inner: MutexGuard<'s, SessionInner>,
        key: &str,
        line: u32,
        inspector: &dyn Inspector,
    ) -> Result<()> {
        let mut first = true;
        loop {
            while let Some(cmd) = self.link.next_command(Duration::ZERO) {
                self.handle_command(&mut inner, cmd, inspector)?;
            }
            if inner.machine.state() != DebugState::Break || self.is_detached() {
                return Ok(());
            }
            if !self.link.is_connected() {
                self.detached.store(true, Ordering::Release);
                return Err(Error::Aborted("connection lost"));
            }

            if first || inner.force_refresh {
                inner.update_count += 1;
                inner.awaiting_ack = true;
                let update = Message::UpdateSource {
                    key: key.to_string(),
                    line,
                    update_count: inner.update_count,
                    is_refresh_only: !first,
                };
                first = false;
                inner.force_refresh = false;
                self.send(update);
            }

            // let go of the session while waiting
            drop(inner);
            let cmd = self.link.next_command(self.poll_interval);
            inner = self.lock();
            if let Some(cmd) = cmd {
                self.handle_command(&mut inner, cmd, inspector)?;
            }
        }
    }

    fn handle_command(
        &self,
        inner: &mut SessionInner,
        cmd: Command,
        inspector: &dyn Inspector,
    ) -> Result<()> {
        let broken = inner.machine.state() == DebugState::Break;
        ldb_debug!(target: "debuggee", "handle {} #{}", cmd.command_type(), cmd.id);

        match cmd.message {
            Message::EndConnection => {
                self.detached.store(true, Ordering::Release);
                if broken {
                    return Err(Error::Aborted("connection lost"));
                }
                ldb_warn!(target: "debuggee", "frame disconnected, continue without debugging");
            }
            Message::Quit => {
                self.detached.store(true, Ordering::Release);
                return Err(Error::Aborted("quit requested"));
            }
            Message::Break => {
                self.apply(inner, RequestedState::Break);
            }
            Message::Resume => {
                self.apply(inner, RequestedState::Running);
            }
            Message::StepInto => {
                self.apply(inner, RequestedState::StepInto);
            }
            Message::StepOver => {
                self.apply(inner, RequestedState::StepOver);
            }
            Message::StepReturn => {
                self.apply(inner, RequestedState::StepReturn);
            }
            Message::SetUpdateCount(count) => inner.acknowledge(count),
            Message::ForceUpdateSource => inner.force_refresh = true,
            Message::SetBreakpoint(bp) => {
                inner.breakpoints.set(bp);
                self.broadcast_breakpoints(inner);
            }
            Message::RemoveBreakpoint(bp) => {
                inner.breakpoints.remove(&bp.key, bp.line);
                self.broadcast_breakpoints(inner);
            }
            Message::SaveSource { key, lines } => {
                let reply = match inner.sources.save(&key, lines) {
                    Ok(()) => Message::Successed,
                    Err(e) => Message::Failed(e.to_string()),
                };
                self.reply(cmd.id, reply);
            }
            Message::RequestSourceList => {
                for source in inner.sources.list() {
                    self.send(Message::AddedSource(source.clone()));
                }
                self.reply(cmd.id, Message::Successed);
            }
            request if request.expected_reply().is_some() => {
                let reply = if broken {
                    inspect(inner, request, inspector)
                } else {
                    Message::Failed(Error::NotBroken.to_string())
                };
                self.reply(cmd.id, reply);
            }
            other => {
                ldb_warn!(target: "debuggee", "unexpected command {}", other.command_type());
            }
        }
        Ok(())
    }
}

fn nil_var(name: String) -> LuaVar {
    LuaVar {
        name,
        value: "nil".to_string(),
        value_type: LuaType::Nil,
        ..Default::default()
    }
}

/// First result of an expression, an error placeholder if it can't be evaluated.
fn eval_one(inspector: &dyn Inspector, expr: String, frame: StackFrameRef) -> LuaVar {
    match inspector.eval(&expr, frame) {
        Ok(vars) => vars.into_iter().next().unwrap_or_else(|| nil_var(expr)),
        Err(e) => LuaVar::error(expr, e.to_string()),
    }
}

fn inspect(inner: &SessionInner, request: Message, inspector: &dyn Inspector) -> Message {
    let result = match request {
        Message::EvalToVar { expr, frame } => Ok(Message::ValueVar(eval_one(inspector, expr, frame))),
        Message::EvalToMultiVar { expr, frame } => {
            let vars = inspector
                .eval(&expr, frame)
                .unwrap_or_else(|e| vec![LuaVar::error(expr, e.to_string())]);
            Ok(Message::ValueVarList(vars))
        }
        Message::EvalsToVarList { exprs, frame } => Ok(Message::ValueVarList(
            exprs
                .into_iter()
                .map(|expr| eval_one(inspector, expr, frame))
                .collect(),
        )),
        Message::RequestFieldsVarList(var) => inspector.field_vars(&var).map(Message::ValueVarList),
        Message::RequestLocalVarList(frame) => inspector.local_vars(frame).map(Message::ValueVarList),
        Message::RequestGlobalVarList(frame) => {
            inspector.global_vars(frame).map(Message::ValueVarList)
        }
        Message::RequestRegistryVarList => inspector.registry_vars().map(Message::ValueVarList),
        Message::RequestStackList(frame) => inspector.stack_vars(frame).map(Message::ValueVarList),
        Message::RequestBacktraceList => inspector.backtrace().map(|mut trace| {
            for frame in trace.iter_mut() {
                if let Some(source) = inner.sources.get(&frame.key) {
                    frame.title = source.title.clone();
                }
            }
            Message::ValueBacktraceList(trace)
        }),
        other => {
            return Message::Failed(format!("{} is not an inspection", other.command_type()));
        }
    };
    result.unwrap_or_else(|e| Message::Failed(e.to_string()))
}
