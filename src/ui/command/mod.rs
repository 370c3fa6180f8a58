//! An interface to a remote debuggee.
//! This is the most preferred way to drive a frame session from UI layer.
//!
//! Contains commands and corresponding command handlers. Command is a some sort of request to
//! the debuggee that define an action and a list of input arguments. Command handler validate
//! command, define what exactly the frame session must do and return result of it.

pub mod backtrace;
pub mod r#break;
pub mod r#continue;
pub mod parser;
pub mod pause;
pub mod print;
pub mod source_code;
pub mod step_into;
pub mod step_out;
pub mod step_over;
pub mod variables;
pub mod watch;

use crate::frame::Error;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Parsing(String),
    #[error(transparent)]
    Handle(#[from] Error),
}

impl CommandError {
    pub fn is_fatal(&self) -> bool {
        match self {
            CommandError::Parsing(_) => false,
            CommandError::Handle(e) => e.is_fatal(),
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// External commands that can be processed by the frame session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PrintVariables(variables::Command),
    Print(String),
    PrintBacktrace,
    Continue,
    Pause,
    StepInto,
    StepOut,
    StepOver,
    Breakpoint(r#break::Command),
    Watch(watch::Command),
    SourceCode(source_code::Command),
    SkipInput,
    Help {
        command: Option<String>,
        reason: Option<String>,
    },
}
