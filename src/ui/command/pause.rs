use crate::frame::FrameSession;
use crate::ui::command;

/// Stop a running debuggee at the next executed line.
pub struct Handler<'a> {
    session: &'a mut FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a mut FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(&mut self) -> command::CommandResult<()> {
        Ok(self.session.pause()?)
    }
}
