use crate::frame::FrameSession;
use crate::protocol::{LuaVar, StackFrameRef};
use crate::ui::command;
use crate::weak_error;

/// Evaluated expression, every returned value with its direct fields.
pub struct PrintResult {
    pub values: Vec<(LuaVar, Vec<LuaVar>)>,
}

pub struct Handler<'a> {
    session: &'a FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a FrameSession) -> Self {
        Self { session }
    }

    pub fn handle(self, expr: &str) -> command::CommandResult<PrintResult> {
        let vars = self.session.eval_multi(expr, StackFrameRef::TOP)?;
        let values = vars
            .into_iter()
            .map(|var| {
                let fields = if var.is_expandable() {
                    weak_error!(self.session.fields(&var), "read fields:").unwrap_or_default()
                } else {
                    vec![]
                };
                (var, fields)
            })
            .collect();
        Ok(PrintResult { values })
    }
}
