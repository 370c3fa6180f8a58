use crate::frame::FrameSession;
use crate::protocol::Breakpoint;
use crate::ui::command;

/// Source name and one-based line as the user types them.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointIdentity {
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(BreakpointIdentity),
    Remove(BreakpointIdentity),
    Info,
}

pub enum ExecutionResult {
    /// Request sent, the breakpoint list changes once the debuggee confirms it.
    Requested(Breakpoint),
    Dump(Vec<Breakpoint>),
}

pub struct Handler<'a> {
    session: &'a mut FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a mut FrameSession) -> Self {
        Self { session }
    }

    /// Breakpoint at a zero-based line of a known source.
    fn resolve(&self, identity: &BreakpointIdentity) -> command::CommandResult<Breakpoint> {
        if identity.line == 0 {
            return Err(command::CommandError::Parsing(
                "line numbers start from 1".to_string(),
            ));
        }
        let source = self.session.resolve_source(&identity.file)?;
        Ok(Breakpoint::new(source.key.clone(), identity.line - 1))
    }

    pub fn handle(&mut self, cmd: &Command) -> command::CommandResult<ExecutionResult> {
        let result = match cmd {
            Command::Add(identity) => {
                let bp = self.resolve(identity)?;
                self.session.set_breakpoint(bp.clone())?;
                ExecutionResult::Requested(bp)
            }
            Command::Remove(identity) => {
                let bp = self.resolve(identity)?;
                self.session.remove_breakpoint(&bp.key, bp.line)?;
                ExecutionResult::Requested(bp)
            }
            Command::Info => {
                ExecutionResult::Dump(self.session.breakpoints().user_visible().cloned().collect())
            }
        };
        Ok(result)
    }
}
