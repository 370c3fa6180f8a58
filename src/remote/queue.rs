use crate::protocol::Command;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Commands waiting for the consumer thread. Many producers, one consumer, FIFO.
#[derive(Default)]
pub struct InboundQueue {
    commands: Mutex<VecDeque<Command>>,
    cond: Condvar,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cmd: Command) {
        let mut commands = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        commands.push_back(cmd);
        self.cond.notify_all();
    }

    pub fn try_pop(&self) -> Option<Command> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Take the oldest command, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<Command> {
        let deadline = Instant::now() + timeout;
        let mut commands = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(cmd) = commands.pop_front() {
                return Some(cmd);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            commands = self
                .cond
                .wait_timeout(commands, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Take every queued command at once.
    pub fn drain(&self) -> Vec<Command> {
        let mut commands = self.commands.lock().unwrap_or_else(|e| e.into_inner());
        commands.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
