//! Transport side of the debugger: TCP connection, framing, request correlation.

pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod pending;
pub mod queue;

pub use connection::{ConnectionState, Endpoint};
pub use dispatch::Peer;
pub use engine::RemoteEngine;
pub use error::Error;
pub use pending::{Reply, ReplyHandle};
pub use queue::InboundQueue;
