//! Values exchanged between the debuggee and the frame.

use std::path::PathBuf;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Breakpoint at a zero-based line of a source.
///
/// Breakpoints are ordered and identified by `(key, line)`, the two flags are payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub key: String,
    pub line: u32,
    /// Set by the debugger itself (run-to-cursor and similar), hidden from listings.
    pub is_internal: bool,
    /// Removed after the first hit.
    pub is_temp: bool,
}

impl Breakpoint {
    pub fn new(key: impl Into<String>, line: u32) -> Self {
        Self {
            key: key.into(),
            line,
            is_internal: false,
            is_temp: false,
        }
    }

    pub fn temporary(key: impl Into<String>, line: u32) -> Self {
        Self {
            is_temp: true,
            ..Self::new(key, line)
        }
    }
}

/// Chunk text known to the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// `@<path>` for files, the chunk text itself for string chunks.
    pub key: String,
    pub title: String,
    pub path: Option<PathBuf>,
    pub lines: Vec<String>,
}

impl Source {
    /// Whether the source came from a file.
    pub fn is_file(&self) -> bool {
        self.key.starts_with('@')
    }
}

/// Lua value type tag as reported by `type()`, plus the debugger's own `error` marker.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Default,
)]
#[repr(u8)]
pub enum LuaType {
    #[default]
    #[strum(serialize = "nil")]
    Nil = 0,
    #[strum(serialize = "boolean")]
    Boolean = 1,
    #[strum(serialize = "lightuserdata")]
    LightUserData = 2,
    #[strum(serialize = "integer")]
    Integer = 3,
    #[strum(serialize = "number")]
    Number = 4,
    #[strum(serialize = "string")]
    String = 5,
    #[strum(serialize = "table")]
    Table = 6,
    #[strum(serialize = "function")]
    Function = 7,
    #[strum(serialize = "userdata")]
    UserData = 8,
    #[strum(serialize = "thread")]
    Thread = 9,
    #[strum(serialize = "error")]
    Error = 10,
    #[strum(serialize = "other")]
    Other = 11,
}

impl LuaType {
    /// Decode a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => LuaType::Nil,
            1 => LuaType::Boolean,
            2 => LuaType::LightUserData,
            3 => LuaType::Integer,
            4 => LuaType::Number,
            5 => LuaType::String,
            6 => LuaType::Table,
            7 => LuaType::Function,
            8 => LuaType::UserData,
            9 => LuaType::Thread,
            10 => LuaType::Error,
            11 => LuaType::Other,
            _ => return None,
        })
    }
}

/// Reference to an active stack frame, level 0 is the innermost Lua function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StackFrameRef {
    pub level: u32,
}

impl StackFrameRef {
    pub const TOP: StackFrameRef = StackFrameRef { level: 0 };

    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

/// Snapshot of a single Lua value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LuaVar {
    pub name: String,
    pub value: String,
    pub value_type: LuaType,
    pub has_fields: bool,
    /// Frame whose scope the `path` expression is evaluated in.
    pub frame: StackFrameRef,
    /// Lua expression that evaluates to this value, empty if the value can't be reached again.
    pub path: String,
}

impl LuaVar {
    /// Placeholder returned in place of a value that failed to evaluate.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: message.into(),
            value_type: LuaType::Error,
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.value_type == LuaType::Error
    }

    /// Whether the frame may request children of this var.
    pub fn is_expandable(&self) -> bool {
        self.has_fields && !self.path.is_empty()
    }
}

/// One frame of the debuggee call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuaBacktrace {
    pub function: String,
    pub key: String,
    pub title: String,
    /// Zero-based current line, `None` for native functions.
    pub line: Option<u32>,
    pub level: u32,
}

/// Category of a forwarded log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[repr(u8)]
pub enum LogType {
    #[strum(serialize = "info")]
    Info = 0,
    #[strum(serialize = "output")]
    Output = 1,
    #[strum(serialize = "warning")]
    Warning = 2,
    #[strum(serialize = "error")]
    Error = 3,
}

impl LogType {
    /// Decode a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => LogType::Info,
            1 => LogType::Output,
            2 => LogType::Warning,
            3 => LogType::Error,
            _ => return None,
        })
    }
}
