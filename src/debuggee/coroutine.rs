/// Identity of a Lua thread, the address of its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroutineId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoroutineInfo {
    pub handle: CoroutineId,
    /// Active frames of the coroutine at its last hook event.
    pub call_depth: u32,
}

/// Chain of coroutines resuming each other, innermost last.
///
/// Call depth is taken from the coroutine stack on every hook event. Frames unwound by
/// an error raise no return event, so a counted depth would drift.
#[derive(Debug, Default)]
pub struct CoroutineStack {
    stack: Vec<CoroutineInfo>,
}

impl CoroutineStack {
    /// Make `id` the running coroutine with `call_depth` active frames.
    ///
    /// A coroutine already on the chain means control went back to a resumer, everything
    /// above it is dropped. An unknown one was just resumed and goes on top.
    pub fn switch_to(&mut self, id: CoroutineId, call_depth: u32) {
        match self.stack.iter().position(|c| c.handle == id) {
            Some(pos) => self.stack.truncate(pos + 1),
            None => self.stack.push(CoroutineInfo {
                handle: id,
                call_depth,
            }),
        }
        if let Some(top) = self.stack.last_mut() {
            top.call_depth = call_depth;
        }
    }

    pub fn current(&self) -> Option<CoroutineInfo> {
        self.stack.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}
