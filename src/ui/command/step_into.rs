use crate::frame::FrameSession;
use crate::ui::command;

/// Step to the next executed line, entering called functions.
pub struct Handler<'a> {
    session: &'a mut FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a mut FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(&mut self) -> command::CommandResult<()> {
        Ok(self.session.step_into()?)
    }
}
