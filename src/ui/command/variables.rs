use crate::frame::FrameSession;
use crate::protocol::{LuaVar, StackFrameRef};
use crate::ui::command;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Locals,
    Globals,
    Registry,
    Stack,
}

pub struct Handler<'a> {
    session: &'a FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(self, cmd: Command) -> command::CommandResult<Vec<LuaVar>> {
        let frame = StackFrameRef::TOP;
        let vars = match cmd {
            Command::Locals => self.session.locals(frame)?,
            Command::Globals => self.session.globals(frame)?,
            Command::Registry => self.session.registry()?,
            Command::Stack => self.session.stack(frame)?,
        };
        Ok(vars)
    }
}
