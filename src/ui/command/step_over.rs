use crate::frame::FrameSession;
use crate::ui::command;

/// Step program, proceeding through function calls.
/// Unlike "step", if the current source line calls a function,
/// this command does not enter the function, but instead steps over
/// the call, in effect treating it as a single source line.
pub struct Handler<'a> {
    session: &'a mut FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a mut FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(&mut self) -> command::CommandResult<()> {
        Ok(self.session.step_over()?)
    }
}
