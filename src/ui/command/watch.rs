use crate::frame::FrameSession;
use crate::protocol::LuaVar;
use crate::ui::command;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(String),
    Remove(String),
    Info,
}

pub enum ExecutionResult {
    New(String),
    Removed(Option<String>),
    /// Expressions with values, a value is missing while the debuggee is running.
    Dump(Vec<(String, Option<LuaVar>)>),
}

pub struct Handler<'a> {
    session: &'a mut FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a mut FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(&mut self, cmd: Command) -> command::CommandResult<ExecutionResult> {
        match cmd {
            Command::Add(expr) => {
                self.session.watches_mut().add(&expr);
                Ok(ExecutionResult::New(expr))
            }
            Command::Remove(expr) => {
                let removed = self.session.watches_mut().remove(&expr).then_some(expr);
                Ok(ExecutionResult::Removed(removed))
            }
            Command::Info => {
                let list = if self.session.is_broken() {
                    self.session.refresh_watches()?
                } else {
                    self.session.watches()
                };
                let dump = list
                    .entries()
                    .map(|(expr, value)| (expr.to_string(), value.cloned()))
                    .collect();
                Ok(ExecutionResult::Dump(dump))
            }
        }
    }
}
