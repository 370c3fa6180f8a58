use crate::protocol::{CommandType, DecodeError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- transport errors ------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Decode(#[from] DecodeError),
    #[error("no peer connected within {0:?}")]
    ConnectTimeout(Duration),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection is closed")]
    Disconnected,
    #[error("engine already started")]
    AlreadyStarted,

    // --------------------------------- request errors --------------------------------------------
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("unexpected reply {got} to request {id}")]
    UnexpectedReply { id: u32, got: CommandType },
    #[error("reply {0} doesn't match any request")]
    UnknownCorrelation(u32),
    #[error("{0} is not a request")]
    NotARequest(CommandType),
    #[error("request failed: {0}")]
    Failed(String),
}

impl Error {
    /// Return a hint to a consumer - keep the session after the error or drop it.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Timeout(_) => false,
            Error::UnexpectedReply { .. } => false,
            Error::UnknownCorrelation(_) => false,
            Error::NotARequest(_) => false,
            Error::Failed(_) => false,
            Error::AlreadyStarted => false,

            // connection is unusable after these
            Error::IO(_) => true,
            Error::Decode(_) => true,
            Error::ConnectTimeout(_) => true,
            Error::Handshake(_) => true,
            Error::Disconnected => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
