//! Outstanding request/response correlations.

use crate::protocol::{LuaBacktrace, LuaVar, Message, ReplyKind};
use crate::remote::error::{Error, Result};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::time::Duration;

/// Decoded answer to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Var(LuaVar),
    VarList(Vec<LuaVar>),
    Backtrace(Vec<LuaBacktrace>),
    Ack,
}

impl Reply {
    pub fn into_var(self) -> Result<LuaVar> {
        match self {
            Reply::Var(var) => Ok(var),
            Reply::VarList(mut vars) if vars.len() == 1 => Ok(vars.remove(0)),
            other => Err(Error::Failed(format!("expect a single value, got {other:?}"))),
        }
    }

    pub fn into_var_list(self) -> Result<Vec<LuaVar>> {
        match self {
            Reply::VarList(vars) => Ok(vars),
            Reply::Var(var) => Ok(vec![var]),
            other => Err(Error::Failed(format!("expect a value list, got {other:?}"))),
        }
    }

    pub fn into_backtrace(self) -> Result<Vec<LuaBacktrace>> {
        match self {
            Reply::Backtrace(bt) => Ok(bt),
            other => Err(Error::Failed(format!("expect a backtrace, got {other:?}"))),
        }
    }
}

type ReplyResult = Result<Reply>;

struct Entry {
    kind: ReplyKind,
    tx: Sender<ReplyResult>,
}

/// Waiting side of a request.
pub struct ReplyHandle {
    id: u32,
    rx: Receiver<ReplyResult>,
}

impl ReplyHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Block until the reply arrives or the timeout expires.
    pub fn wait(self, timeout: Duration) -> Result<Reply> {
        match self.rx.recv_timeout(timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }

    /// A handle that is already resolved, used when a request can't be sent at all.
    pub(super) fn resolved(id: u32, result: ReplyResult) -> Self {
        let (tx, rx) = mpsc::channel();
        _ = tx.send(result);
        Self { id, rx }
    }
}

/// Map of request id to the expected reply shape and the waiter.
///
/// Every entry is delivered at most once: completing or failing an entry removes it.
#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<u32, Entry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request before it is written to the wire.
    pub fn register(&self, id: u32, kind: ReplyKind) -> ReplyHandle {
        let (tx, rx) = mpsc::channel();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(id, Entry { kind, tx });
        ReplyHandle { id, rx }
    }

    /// Drop an entry whose request never reached the wire.
    pub fn cancel(&self, id: u32) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&id);
    }

    /// Deliver a reply message to the request with the same id.
    pub fn complete(&self, id: u32, message: Message) -> Result<()> {
        let entry = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.remove(&id).ok_or(Error::UnknownCorrelation(id))?
        };

        let got = message.command_type();
        let result = match (entry.kind, message) {
            (_, Message::Failed(reason)) => Err(Error::Failed(reason)),
            (ReplyKind::Var, Message::ValueVar(var)) => Ok(Reply::Var(var)),
            (ReplyKind::VarList, Message::ValueVarList(vars)) => Ok(Reply::VarList(vars)),
            (ReplyKind::Backtrace, Message::ValueBacktraceList(bt)) => Ok(Reply::Backtrace(bt)),
            (ReplyKind::Ack, Message::Successed) => Ok(Reply::Ack),
            _ => Err(Error::UnexpectedReply { id, got }),
        };
        let mismatch = matches!(result, Err(Error::UnexpectedReply { .. }));
        // receiver may be gone if the waiter timed out
        _ = entry.tx.send(result);
        if mismatch {
            return Err(Error::UnexpectedReply { id, got });
        }
        Ok(())
    }

    /// Fail every outstanding request, called once the connection is gone.
    pub fn fail_all(&self) {
        let entries: Vec<_> = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.drain().collect()
        };
        for (_, entry) in entries {
            _ = entry.tx.send(Err(Error::Disconnected));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
