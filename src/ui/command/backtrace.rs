use crate::frame::FrameSession;
use crate::protocol::LuaBacktrace;
use crate::ui::command;

pub struct Handler<'a> {
    session: &'a FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(&self) -> command::CommandResult<Vec<LuaBacktrace>> {
        let mut bt = self.session.backtrace()?;
        bt.sort_unstable_by_key(|frame| frame.level);
        Ok(bt)
    }
}
