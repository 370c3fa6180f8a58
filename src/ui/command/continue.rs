use crate::frame::FrameSession;
use crate::ui::command;

pub struct Handler<'a> {
    session: &'a mut FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a mut FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(&mut self) -> command::CommandResult<()> {
        self.session.resume()?;
        Ok(())
    }
}
