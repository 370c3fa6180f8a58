//! Wire protocol shared by the debuggee and the frame.

pub mod codec;
pub mod message;
pub mod types;

pub use codec::DecodeError;
pub use message::{Command, CommandType, Header, Message, ReplyKind};
pub use types::{Breakpoint, LogType, LuaBacktrace, LuaType, LuaVar, Source, StackFrameRef};

/// Version sent in the id field of `StartConnection`.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound of a single payload, a larger declared length means the stream is out of sync.
pub const MAX_PAYLOAD: u32 = 16 << 20;
