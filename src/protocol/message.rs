use crate::protocol::codec::{Decode, DecodeError, DecodeResult, Encode};
use crate::protocol::types::{Breakpoint, LogType, LuaBacktrace, LuaVar, Source, StackFrameRef};
use crate::protocol::MAX_PAYLOAD;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use strum_macros::{Display, IntoStaticStr};

/// Wire tag of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[repr(u32)]
pub enum CommandType {
    StartConnection = 0,
    EndConnection = 1,
    ChangedState = 2,
    UpdateSource = 3,
    SetUpdateCount = 4,
    ForceUpdateSource = 5,
    AddedSource = 6,
    SaveSource = 7,
    SetBreakpoint = 8,
    RemoveBreakpoint = 9,
    ChangedBreakpointList = 10,
    Break = 11,
    Resume = 12,
    StepInto = 13,
    StepOver = 14,
    StepReturn = 15,
    Quit = 16,
    OutputLog = 17,
    EvalToVar = 18,
    EvalToMultiVar = 19,
    EvalsToVarList = 20,
    RequestFieldsVarList = 21,
    RequestLocalVarList = 22,
    RequestGlobalVarList = 23,
    RequestRegistryVarList = 24,
    RequestStackList = 25,
    RequestBacktraceList = 26,
    RequestSourceList = 27,
    ValueVar = 28,
    ValueVarList = 29,
    ValueBacktraceList = 30,
    Successed = 31,
    Failed = 32,
}

impl CommandType {
    const ALL: [CommandType; 33] = [
        CommandType::StartConnection,
        CommandType::EndConnection,
        CommandType::ChangedState,
        CommandType::UpdateSource,
        CommandType::SetUpdateCount,
        CommandType::ForceUpdateSource,
        CommandType::AddedSource,
        CommandType::SaveSource,
        CommandType::SetBreakpoint,
        CommandType::RemoveBreakpoint,
        CommandType::ChangedBreakpointList,
        CommandType::Break,
        CommandType::Resume,
        CommandType::StepInto,
        CommandType::StepOver,
        CommandType::StepReturn,
        CommandType::Quit,
        CommandType::OutputLog,
        CommandType::EvalToVar,
        CommandType::EvalToMultiVar,
        CommandType::EvalsToVarList,
        CommandType::RequestFieldsVarList,
        CommandType::RequestLocalVarList,
        CommandType::RequestGlobalVarList,
        CommandType::RequestRegistryVarList,
        CommandType::RequestStackList,
        CommandType::RequestBacktraceList,
        CommandType::RequestSourceList,
        CommandType::ValueVar,
        CommandType::ValueVarList,
        CommandType::ValueBacktraceList,
        CommandType::Successed,
        CommandType::Failed,
    ];

    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }
}

/// Shape of the answer a request waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// `ValueVar`
    Var,
    /// `ValueVarList`
    VarList,
    /// `ValueBacktraceList`
    Backtrace,
    /// `Successed`
    Ack,
}

/// Typed command payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    StartConnection,
    EndConnection,
    ChangedState {
        is_break: bool,
    },
    UpdateSource {
        key: String,
        line: u32,
        update_count: u32,
        is_refresh_only: bool,
    },
    SetUpdateCount(u32),
    ForceUpdateSource,
    AddedSource(Source),
    SaveSource {
        key: String,
        lines: Vec<String>,
    },
    SetBreakpoint(Breakpoint),
    RemoveBreakpoint(Breakpoint),
    ChangedBreakpointList(Vec<Breakpoint>),
    Break,
    Resume,
    StepInto,
    StepOver,
    StepReturn,
    Quit,
    OutputLog {
        log_type: LogType,
        message: String,
        key: String,
        /// Zero-based line or `-1` when unknown.
        line: i32,
    },
    EvalToVar {
        expr: String,
        frame: StackFrameRef,
    },
    EvalToMultiVar {
        expr: String,
        frame: StackFrameRef,
    },
    EvalsToVarList {
        exprs: Vec<String>,
        frame: StackFrameRef,
    },
    RequestFieldsVarList(LuaVar),
    RequestLocalVarList(StackFrameRef),
    RequestGlobalVarList(StackFrameRef),
    RequestRegistryVarList,
    RequestStackList(StackFrameRef),
    RequestBacktraceList,
    RequestSourceList,
    ValueVar(LuaVar),
    ValueVarList(Vec<LuaVar>),
    ValueBacktraceList(Vec<LuaBacktrace>),
    Successed,
    Failed(String),
}

impl Message {
    pub fn command_type(&self) -> CommandType {
        match self {
            Message::StartConnection => CommandType::StartConnection,
            Message::EndConnection => CommandType::EndConnection,
            Message::ChangedState { .. } => CommandType::ChangedState,
            Message::UpdateSource { .. } => CommandType::UpdateSource,
            Message::SetUpdateCount(_) => CommandType::SetUpdateCount,
            Message::ForceUpdateSource => CommandType::ForceUpdateSource,
            Message::AddedSource(_) => CommandType::AddedSource,
            Message::SaveSource { .. } => CommandType::SaveSource,
            Message::SetBreakpoint(_) => CommandType::SetBreakpoint,
            Message::RemoveBreakpoint(_) => CommandType::RemoveBreakpoint,
            Message::ChangedBreakpointList(_) => CommandType::ChangedBreakpointList,
            Message::Break => CommandType::Break,
            Message::Resume => CommandType::Resume,
            Message::StepInto => CommandType::StepInto,
            Message::StepOver => CommandType::StepOver,
            Message::StepReturn => CommandType::StepReturn,
            Message::Quit => CommandType::Quit,
            Message::OutputLog { .. } => CommandType::OutputLog,
            Message::EvalToVar { .. } => CommandType::EvalToVar,
            Message::EvalToMultiVar { .. } => CommandType::EvalToMultiVar,
            Message::EvalsToVarList { .. } => CommandType::EvalsToVarList,
            Message::RequestFieldsVarList(_) => CommandType::RequestFieldsVarList,
            Message::RequestLocalVarList(_) => CommandType::RequestLocalVarList,
            Message::RequestGlobalVarList(_) => CommandType::RequestGlobalVarList,
            Message::RequestRegistryVarList => CommandType::RequestRegistryVarList,
            Message::RequestStackList(_) => CommandType::RequestStackList,
            Message::RequestBacktraceList => CommandType::RequestBacktraceList,
            Message::RequestSourceList => CommandType::RequestSourceList,
            Message::ValueVar(_) => CommandType::ValueVar,
            Message::ValueVarList(_) => CommandType::ValueVarList,
            Message::ValueBacktraceList(_) => CommandType::ValueBacktraceList,
            Message::Successed => CommandType::Successed,
            Message::Failed(_) => CommandType::Failed,
        }
    }

    /// Reply kind a peer answers this message with, `None` for notifications.
    pub fn expected_reply(&self) -> Option<ReplyKind> {
        match self {
            Message::EvalToVar { .. } => Some(ReplyKind::Var),
            Message::EvalToMultiVar { .. }
            | Message::EvalsToVarList { .. }
            | Message::RequestFieldsVarList(_)
            | Message::RequestLocalVarList(_)
            | Message::RequestGlobalVarList(_)
            | Message::RequestRegistryVarList
            | Message::RequestStackList(_) => Some(ReplyKind::VarList),
            Message::RequestBacktraceList => Some(ReplyKind::Backtrace),
            Message::SaveSource { .. } | Message::RequestSourceList => Some(ReplyKind::Ack),
            _ => None,
        }
    }

    /// Whether the message answers an earlier request.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Message::ValueVar(_)
                | Message::ValueVarList(_)
                | Message::ValueBacktraceList(_)
                | Message::Successed
                | Message::Failed(_)
        )
    }

    pub fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            Message::StartConnection
            | Message::EndConnection
            | Message::ForceUpdateSource
            | Message::Break
            | Message::Resume
            | Message::StepInto
            | Message::StepOver
            | Message::StepReturn
            | Message::Quit
            | Message::RequestRegistryVarList
            | Message::RequestBacktraceList
            | Message::RequestSourceList
            | Message::Successed => {}
            Message::ChangedState { is_break } => is_break.encode(buf),
            Message::UpdateSource {
                key,
                line,
                update_count,
                is_refresh_only,
            } => {
                key.encode(buf);
                line.encode(buf);
                update_count.encode(buf);
                is_refresh_only.encode(buf);
            }
            Message::SetUpdateCount(count) => count.encode(buf),
            Message::AddedSource(source) => source.encode(buf),
            Message::SaveSource { key, lines } => {
                key.encode(buf);
                lines.encode(buf);
            }
            Message::SetBreakpoint(bp) | Message::RemoveBreakpoint(bp) => bp.encode(buf),
            Message::ChangedBreakpointList(list) => list.encode(buf),
            Message::OutputLog {
                log_type,
                message,
                key,
                line,
            } => {
                log_type.encode(buf);
                message.encode(buf);
                key.encode(buf);
                line.encode(buf);
            }
            Message::EvalToVar { expr, frame } | Message::EvalToMultiVar { expr, frame } => {
                expr.encode(buf);
                frame.encode(buf);
            }
            Message::EvalsToVarList { exprs, frame } => {
                exprs.encode(buf);
                frame.encode(buf);
            }
            Message::RequestFieldsVarList(var) | Message::ValueVar(var) => var.encode(buf),
            Message::RequestLocalVarList(frame)
            | Message::RequestGlobalVarList(frame)
            | Message::RequestStackList(frame) => frame.encode(buf),
            Message::ValueVarList(vars) => vars.encode(buf),
            Message::ValueBacktraceList(trace) => trace.encode(buf),
            Message::Failed(reason) => reason.encode(buf),
        }
    }

    /// Decode a payload of the given wire type. The payload must be consumed completely.
    pub fn decode(ty: u32, mut payload: Bytes) -> DecodeResult<Self> {
        let ty = CommandType::from_tag(ty).ok_or(DecodeError::UnknownCommand(ty))?;
        let buf = &mut payload;
        let msg = match ty {
            CommandType::StartConnection => Message::StartConnection,
            CommandType::EndConnection => Message::EndConnection,
            CommandType::ChangedState => Message::ChangedState {
                is_break: bool::decode(buf)?,
            },
            CommandType::UpdateSource => Message::UpdateSource {
                key: String::decode(buf)?,
                line: u32::decode(buf)?,
                update_count: u32::decode(buf)?,
                is_refresh_only: bool::decode(buf)?,
            },
            CommandType::SetUpdateCount => Message::SetUpdateCount(u32::decode(buf)?),
            CommandType::ForceUpdateSource => Message::ForceUpdateSource,
            CommandType::AddedSource => Message::AddedSource(Source::decode(buf)?),
            CommandType::SaveSource => Message::SaveSource {
                key: String::decode(buf)?,
                lines: Vec::decode(buf)?,
            },
            CommandType::SetBreakpoint => Message::SetBreakpoint(Breakpoint::decode(buf)?),
            CommandType::RemoveBreakpoint => Message::RemoveBreakpoint(Breakpoint::decode(buf)?),
            CommandType::ChangedBreakpointList => {
                Message::ChangedBreakpointList(Vec::decode(buf)?)
            }
            CommandType::Break => Message::Break,
            CommandType::Resume => Message::Resume,
            CommandType::StepInto => Message::StepInto,
            CommandType::StepOver => Message::StepOver,
            CommandType::StepReturn => Message::StepReturn,
            CommandType::Quit => Message::Quit,
            CommandType::OutputLog => Message::OutputLog {
                log_type: LogType::decode(buf)?,
                message: String::decode(buf)?,
                key: String::decode(buf)?,
                line: i32::decode(buf)?,
            },
            CommandType::EvalToVar => Message::EvalToVar {
                expr: String::decode(buf)?,
                frame: StackFrameRef::decode(buf)?,
            },
            CommandType::EvalToMultiVar => Message::EvalToMultiVar {
                expr: String::decode(buf)?,
                frame: StackFrameRef::decode(buf)?,
            },
            CommandType::EvalsToVarList => Message::EvalsToVarList {
                exprs: Vec::decode(buf)?,
                frame: StackFrameRef::decode(buf)?,
            },
            CommandType::RequestFieldsVarList => {
                Message::RequestFieldsVarList(LuaVar::decode(buf)?)
            }
            CommandType::RequestLocalVarList => {
                Message::RequestLocalVarList(StackFrameRef::decode(buf)?)
            }
            CommandType::RequestGlobalVarList => {
                Message::RequestGlobalVarList(StackFrameRef::decode(buf)?)
            }
            CommandType::RequestRegistryVarList => Message::RequestRegistryVarList,
            CommandType::RequestStackList => Message::RequestStackList(StackFrameRef::decode(buf)?),
            CommandType::RequestBacktraceList => Message::RequestBacktraceList,
            CommandType::RequestSourceList => Message::RequestSourceList,
            CommandType::ValueVar => Message::ValueVar(LuaVar::decode(buf)?),
            CommandType::ValueVarList => Message::ValueVarList(Vec::decode(buf)?),
            CommandType::ValueBacktraceList => Message::ValueBacktraceList(Vec::decode(buf)?),
            CommandType::Successed => Message::Successed,
            CommandType::Failed => Message::Failed(String::decode(buf)?),
        };

        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(buf.remaining()));
        }
        Ok(msg)
    }
}

/// Fixed size frame prefix, sent ahead of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub ty: u32,
    pub id: u32,
    pub len: u32,
}

impl Header {
    pub const SIZE: usize = 12;

    /// Read a header from exactly [`Header::SIZE`] bytes and check the declared payload length.
    pub fn parse(mut raw: &[u8]) -> DecodeResult<Self> {
        if raw.len() < Self::SIZE {
            return Err(DecodeError::Truncated {
                needed: Self::SIZE,
                remaining: raw.len(),
            });
        }
        let header = Header {
            ty: raw.get_u32_le(),
            id: raw.get_u32_le(),
            len: raw.get_u32_le(),
        };
        if header.len > MAX_PAYLOAD {
            return Err(DecodeError::PayloadTooLarge(header.len));
        }
        Ok(header)
    }

    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.ty);
        buf.put_u32_le(self.id);
        buf.put_u32_le(self.len);
    }
}

/// Command together with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: u32,
    pub message: Message,
}

impl Command {
    pub fn new(id: u32, message: Message) -> Self {
        Self { id, message }
    }

    pub fn command_type(&self) -> CommandType {
        self.message.command_type()
    }

    /// Serialize header and payload into a single frame.
    ///
    /// Fails if the payload doesn't fit into the frame length limit.
    pub fn to_frame(&self) -> DecodeResult<Bytes> {
        let mut payload = BytesMut::new();
        self.message.encode_payload(&mut payload);
        let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        if len > MAX_PAYLOAD {
            return Err(DecodeError::PayloadTooLarge(len));
        }

        let mut frame = BytesMut::with_capacity(Header::SIZE + payload.len());
        Header {
            ty: self.command_type() as u32,
            id: self.id,
            len,
        }
        .write(&mut frame);
        frame.extend_from_slice(&payload);
        Ok(frame.freeze())
    }

    /// Restore a command from a parsed header and its payload.
    pub fn from_parts(header: Header, payload: Bytes) -> DecodeResult<Self> {
        Ok(Self {
            id: header.id,
            message: Message::decode(header.ty, payload)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::types::LuaType;

    fn reparse(cmd: &Command) -> Command {
        let frame = cmd.to_frame().unwrap();
        let header = Header::parse(&frame[..Header::SIZE]).unwrap();
        assert_eq!(header.len as usize, frame.len() - Header::SIZE);
        Command::from_parts(header, frame.slice(Header::SIZE..)).unwrap()
    }

    #[test]
    fn test_tags_are_stable() {
        for (tag, ty) in CommandType::ALL.iter().enumerate() {
            assert_eq!(*ty as u32, tag as u32);
        }
        assert_eq!(CommandType::from_tag(32), Some(CommandType::Failed));
        assert_eq!(CommandType::from_tag(33), None);
    }

    #[test]
    fn test_zero_payload_frame() {
        let frame = Command::new(7, Message::Break).to_frame().unwrap();
        assert_eq!(&frame[..], &[11, 0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0]);
    }

    fn var(name: &str, value_type: LuaType) -> LuaVar {
        LuaVar {
            name: name.to_string(),
            value: "table: 0x1".to_string(),
            value_type,
            has_fields: value_type == LuaType::Table,
            frame: StackFrameRef::new(1),
            path: format!("_ENV[\"{name}\"]"),
        }
    }

    /// One message of every wire type, composite payloads filled in.
    fn every_message() -> Vec<Message> {
        let frame = StackFrameRef::new(2);
        let bp = Breakpoint {
            key: "@main.lua".to_string(),
            line: 9,
            is_internal: true,
            is_temp: false,
        };
        vec![
            Message::StartConnection,
            Message::EndConnection,
            Message::ChangedState { is_break: true },
            Message::UpdateSource {
                key: "@main.lua".to_string(),
                line: 41,
                update_count: 3,
                is_refresh_only: true,
            },
            Message::SetUpdateCount(u32::MAX),
            Message::ForceUpdateSource,
            Message::AddedSource(Source {
                key: "@scripts/main.lua".to_string(),
                title: "main.lua".to_string(),
                path: Some("scripts/main.lua".into()),
                lines: vec!["local a = 1".to_string(), String::new(), "print(a)".to_string()],
            }),
            Message::SaveSource {
                key: "@main.lua".to_string(),
                lines: vec!["return 1".to_string(), "-- ü".to_string()],
            },
            Message::SetBreakpoint(bp.clone()),
            Message::RemoveBreakpoint(Breakpoint::temporary("=chunk", 0)),
            Message::ChangedBreakpointList(vec![bp, Breakpoint::temporary("=chunk", 3)]),
            Message::Break,
            Message::Resume,
            Message::StepInto,
            Message::StepOver,
            Message::StepReturn,
            Message::Quit,
            Message::OutputLog {
                log_type: LogType::Error,
                message: "main.lua:3: boom".to_string(),
                key: "@main.lua".to_string(),
                line: 2,
            },
            Message::EvalToVar {
                expr: "t.x".to_string(),
                frame,
            },
            Message::EvalToMultiVar {
                expr: "f()".to_string(),
                frame,
            },
            Message::EvalsToVarList {
                exprs: vec!["a".to_string(), "b.c".to_string()],
                frame,
            },
            Message::RequestFieldsVarList(var("t", LuaType::Table)),
            Message::RequestLocalVarList(frame),
            Message::RequestGlobalVarList(StackFrameRef::TOP),
            Message::RequestRegistryVarList,
            Message::RequestStackList(frame),
            Message::RequestBacktraceList,
            Message::RequestSourceList,
            Message::ValueVar(var("x", LuaType::Error)),
            Message::ValueVarList(vec![var("t", LuaType::Table), var("n", LuaType::Number)]),
            Message::ValueBacktraceList(vec![
                LuaBacktrace {
                    function: "add".to_string(),
                    key: "@main.lua".to_string(),
                    title: "main.lua".to_string(),
                    line: Some(1),
                    level: 0,
                },
                LuaBacktrace {
                    function: "main chunk".to_string(),
                    key: "@main.lua".to_string(),
                    title: "main.lua".to_string(),
                    line: None,
                    level: 1,
                },
            ]),
            Message::Successed,
            Message::Failed("debuggee is running".to_string()),
        ]
    }

    #[test]
    fn test_every_type_reparse() {
        let messages = every_message();
        let types: Vec<CommandType> = messages.iter().map(Message::command_type).collect();
        assert_eq!(types, CommandType::ALL.to_vec());

        for (i, message) in messages.into_iter().enumerate() {
            let cmd = Command::new(i as u32 * 2 + 1, message);
            assert_eq!(reparse(&cmd), cmd, "{}", cmd.command_type());
        }
    }

    #[test]
    fn test_empty_lists_reparse() {
        let cases = [
            Message::ChangedBreakpointList(vec![]),
            Message::ValueVarList(vec![]),
            Message::ValueBacktraceList(vec![]),
            Message::EvalsToVarList {
                exprs: vec![],
                frame: StackFrameRef::TOP,
            },
            Message::SaveSource {
                key: String::new(),
                lines: vec![],
            },
            Message::Failed(String::new()),
        ];
        for message in cases {
            let cmd = Command::new(2, message);
            assert_eq!(reparse(&cmd), cmd, "{}", cmd.command_type());
        }
    }

    #[test]
    fn test_every_truncated_payload_fails() {
        for message in every_message() {
            let ty = message.command_type();
            let mut payload = BytesMut::new();
            message.encode_payload(&mut payload);
            let payload = payload.freeze();

            for cut in 0..payload.len() {
                let result = Message::decode(ty as u32, payload.slice(..cut));
                assert!(
                    matches!(result, Err(DecodeError::Truncated { .. })),
                    "{ty} cut at {cut} of {}: {result:?}",
                    payload.len()
                );
            }
        }
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            Message::decode(99, Bytes::new()),
            Err(DecodeError::UnknownCommand(99))
        );
    }

    #[test]
    fn test_payload_on_empty_command() {
        assert_eq!(
            Message::decode(CommandType::Resume as u32, Bytes::from_static(&[0])),
            Err(DecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_header_limits() {
        let mut raw = BytesMut::new();
        Header {
            ty: 0,
            id: 1,
            len: MAX_PAYLOAD + 1,
        }
        .write(&mut raw);
        assert_eq!(
            Header::parse(&raw),
            Err(DecodeError::PayloadTooLarge(MAX_PAYLOAD + 1))
        );
        assert!(matches!(
            Header::parse(&raw[..4]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_reply_kinds() {
        let frame = StackFrameRef::TOP;
        assert_eq!(
            Message::RequestLocalVarList(frame).expected_reply(),
            Some(ReplyKind::VarList)
        );
        assert_eq!(
            Message::EvalToVar {
                expr: "x".to_string(),
                frame
            }
            .expected_reply(),
            Some(ReplyKind::Var)
        );
        assert_eq!(Message::Break.expected_reply(), None);
        assert!(Message::Failed("no".to_string()).is_reply());
        assert!(!Message::SetUpdateCount(1).is_reply());
    }
}
