//! Binary layout of command payloads.
//!
//! Every integer is little-endian, strings and lists are prefixed with a `u32` length,
//! booleans take one byte. Decoding never reads past the end of a buffer: a short buffer
//! is reported as [`DecodeError::Truncated`].

use crate::protocol::types::{
    Breakpoint, LogType, LuaBacktrace, LuaType, LuaVar, Source, StackFrameRef,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated payload: {needed} bytes needed, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("invalid boolean byte {0:#x}")]
    InvalidBool(u8),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("invalid {name} tag {value}")]
    InvalidTag { name: &'static str, value: u32 },
    #[error("unknown command type {0}")]
    UnknownCommand(u32),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("payload length {0} exceeds limit")]
    PayloadTooLarge(u32),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// A value with a fixed binary layout.
pub trait Encode {
    fn encode(&self, buf: &mut BytesMut);
}

/// A value that can be restored from its binary layout.
pub trait Decode: Sized {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self>;
}

fn ensure(buf: &Bytes, needed: usize) -> DecodeResult<()> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Encode a value into a fresh buffer.
pub fn to_bytes<T: Encode + ?Sized>(value: &T) -> Bytes {
    let mut buf = BytesMut::new();
    value.encode(&mut buf);
    buf.freeze()
}

/// Decode a value that must occupy the whole buffer.
pub fn from_bytes<T: Decode>(mut buf: Bytes) -> DecodeResult<T> {
    let value = T::decode(&mut buf)?;
    if buf.has_remaining() {
        return Err(DecodeError::TrailingBytes(buf.remaining()));
    }
    Ok(value)
}

impl Encode for u8 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(*self);
    }
}

impl Decode for u8 {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        ensure(buf, 1)?;
        Ok(buf.get_u8())
    }
}

impl Encode for u32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(*self);
    }
}

impl Decode for u32 {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        ensure(buf, 4)?;
        Ok(buf.get_u32_le())
    }
}

impl Encode for i32 {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(*self);
    }
}

impl Decode for i32 {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        ensure(buf, 4)?;
        Ok(buf.get_i32_le())
    }
}

impl Encode for bool {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        match u8::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }
}

impl Encode for str {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u32).encode(buf);
        buf.put_slice(self.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_str().encode(buf)
    }
}

impl Decode for String {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let len = u32::decode(buf)? as usize;
        ensure(buf, len)?;
        let raw = buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u32).encode(buf);
        self.iter().for_each(|item| item.encode(buf));
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_slice().encode(buf)
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let count = u32::decode(buf)? as usize;
        // every element takes at least one byte, don't trust the count for preallocation
        let mut items = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }
}

/// `Option<u32>` travels as an `i32` where `-1` means absence.
impl Encode for Option<u32> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Some(v) => (*v as i32).encode(buf),
            None => (-1i32).encode(buf),
        }
    }
}

impl Decode for Option<u32> {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let raw = i32::decode(buf)?;
        Ok((raw >= 0).then_some(raw as u32))
    }
}

impl Encode for Breakpoint {
    fn encode(&self, buf: &mut BytesMut) {
        self.key.encode(buf);
        self.line.encode(buf);
        self.is_internal.encode(buf);
        self.is_temp.encode(buf);
    }
}

impl Decode for Breakpoint {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(Breakpoint {
            key: String::decode(buf)?,
            line: u32::decode(buf)?,
            is_internal: bool::decode(buf)?,
            is_temp: bool::decode(buf)?,
        })
    }
}

impl Encode for Source {
    fn encode(&self, buf: &mut BytesMut) {
        self.key.encode(buf);
        self.title.encode(buf);
        let path = self
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.encode(buf);
        self.lines.encode(buf);
    }
}

impl Decode for Source {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let key = String::decode(buf)?;
        let title = String::decode(buf)?;
        let path = String::decode(buf)?;
        let lines = Vec::<String>::decode(buf)?;
        Ok(Source {
            key,
            title,
            path: (!path.is_empty()).then(|| PathBuf::from(path)),
            lines,
        })
    }
}

impl Encode for LuaType {
    fn encode(&self, buf: &mut BytesMut) {
        (*self as u8).encode(buf)
    }
}

impl Decode for LuaType {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let tag = u8::decode(buf)?;
        LuaType::from_tag(tag).ok_or(DecodeError::InvalidTag {
            name: "lua type",
            value: tag as u32,
        })
    }
}

impl Encode for LogType {
    fn encode(&self, buf: &mut BytesMut) {
        (*self as u8).encode(buf)
    }
}

impl Decode for LogType {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let tag = u8::decode(buf)?;
        LogType::from_tag(tag).ok_or(DecodeError::InvalidTag {
            name: "log type",
            value: tag as u32,
        })
    }
}

impl Encode for StackFrameRef {
    fn encode(&self, buf: &mut BytesMut) {
        self.level.encode(buf)
    }
}

impl Decode for StackFrameRef {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(StackFrameRef {
            level: u32::decode(buf)?,
        })
    }
}

impl Encode for LuaVar {
    fn encode(&self, buf: &mut BytesMut) {
        self.name.encode(buf);
        self.value.encode(buf);
        self.value_type.encode(buf);
        self.has_fields.encode(buf);
        self.frame.encode(buf);
        self.path.encode(buf);
    }
}

impl Decode for LuaVar {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(LuaVar {
            name: String::decode(buf)?,
            value: String::decode(buf)?,
            value_type: LuaType::decode(buf)?,
            has_fields: bool::decode(buf)?,
            frame: StackFrameRef::decode(buf)?,
            path: String::decode(buf)?,
        })
    }
}

impl Encode for LuaBacktrace {
    fn encode(&self, buf: &mut BytesMut) {
        self.function.encode(buf);
        self.key.encode(buf);
        self.title.encode(buf);
        self.line.encode(buf);
        self.level.encode(buf);
    }
}

impl Decode for LuaBacktrace {
    fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(LuaBacktrace {
            function: String::decode(buf)?,
            key: String::decode(buf)?,
            title: String::decode(buf)?,
            line: Option::<u32>::decode(buf)?,
            level: u32::decode(buf)?,
        })
    }
}
