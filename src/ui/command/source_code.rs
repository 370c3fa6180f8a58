use crate::frame::{Error, FrameSession};
use crate::protocol::Source;
use crate::ui::command;

pub const DEFAULT_RANGE: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Lines around the stop position.
    Range(u32),
    /// Every source known to the debuggee.
    List,
}

/// Source lines around the current position.
pub struct SourceFragment<'a> {
    pub source: &'a Source,
    /// Zero-based current line.
    pub current: u32,
    /// Zero-based index of the first line in `lines`.
    pub start: u32,
    pub lines: &'a [String],
}

pub struct Handler<'a> {
    session: &'a FrameSession,
}

impl<'a> Handler<'a> {
    pub fn new(session: &'a FrameSession) -> Self {
        Self { session }
    }

    pub fn range(&self, bounds: u32) -> command::CommandResult<SourceFragment<'a>> {
        let position = self.session.position().ok_or(Error::NotBroken)?;
        let source = self
            .session
            .sources()
            .get(&position.key)
            .ok_or_else(|| Error::UnknownSource(position.key.clone()))?;

        let start = position.line.saturating_sub(bounds);
        let end = position
            .line
            .saturating_add(bounds)
            .saturating_add(1)
            .min(source.lines.len() as u32);
        let lines = source
            .lines
            .get(start as usize..end as usize)
            .unwrap_or_default();
        Ok(SourceFragment {
            source,
            current: position.line,
            start,
            lines,
        })
    }

    pub fn list(&self) -> Vec<&'a Source> {
        self.session.sources().list().collect()
    }
}
