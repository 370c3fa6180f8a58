//! Debuggee side: the hook engine embedded into the Lua interpreter.

pub mod context;
pub mod coroutine;
pub mod lua;
pub mod session;
pub mod state;

pub use context::{InterpreterId, RuntimeContext};
pub use session::{HookEvent, HookKind, Inspector, Link, Session};
pub use state::{DebugState, RequestedState};

use crate::registry::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- session errors --------------------------------------------
    #[error("debugging aborted: {0}")]
    Aborted(&'static str),
    #[error("debuggee is running")]
    NotBroken,

    // --------------------------------- inspection errors -----------------------------------------
    #[error("frame number {0} not found")]
    FrameNotFound(u32),
    #[error("`{0}` has no fields")]
    NotExpandable(String),
    #[error(transparent)]
    Lua(#[from] mlua::Error),

    // --------------------------------- third party errors ----------------------------------------
    #[error(transparent)]
    Remote(#[from] crate::remote::Error),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl Error {
    /// Return a hint to the hook - keep running the script after error or stop it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::NotBroken => false,
            Error::FrameNotFound(_) => false,
            Error::NotExpandable(_) => false,
            Error::Lua(_) => false,
            Error::Source(_) => false,
            Error::Remote(e) => e.is_fatal(),

            Error::Aborted(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
