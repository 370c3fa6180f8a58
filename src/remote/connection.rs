//! A single TCP connection: establishing, handshake, framing and teardown.

use crate::protocol::codec::DecodeResult;
use crate::protocol::{Command, Header, Message, PROTOCOL_VERSION};
use crate::remote::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// How long a single read blocks before the I/O loop gets back to the write queue.
pub const READ_POLL: Duration = Duration::from_millis(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_millis(50);
const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal, a closed connection is never reopened.
    Closed,
}

/// Which side of the TCP connection this process takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Listen on `host:port`, usually a loopback or a single interface address.
    Server { host: String, port: u16 },
    Client { host: String, port: u16 },
}

impl Endpoint {
    pub fn loopback(port: u16) -> Self {
        Endpoint::Server {
            host: "127.0.0.1".to_string(),
            port,
        }
    }
}

/// Connection state shared between the I/O thread and its owners.
pub struct StateCell {
    state: Mutex<ConnectionState>,
    cond: Condvar,
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            cond: Condvar::new(),
        }
    }
}

impl StateCell {
    pub fn get(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to a non-terminal state. Has no effect once the connection is closed.
    pub fn set(&self, new: ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != ConnectionState::Closed {
            *state = new;
            self.cond.notify_all();
        }
    }

    /// Move to `Closed`. Return true only for the call that actually closed the connection.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == ConnectionState::Closed {
            return false;
        }
        *state = ConnectionState::Closed;
        self.cond.notify_all();
        true
    }

    /// Wait until the connection is established or closed.
    pub fn wait_settled(&self, timeout: Duration) -> ConnectionState {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| {
                matches!(
                    s,
                    ConnectionState::Disconnected | ConnectionState::Connecting
                )
            })
            .unwrap_or_else(|e| e.into_inner());
        *state
    }
}

/// Bind a listening socket on `host`, port 0 picks a free port.
pub fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((host, port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Accept the first peer before the deadline.
pub fn accept(listener: &TcpListener, deadline: Instant, stop: &AtomicBool) -> Result<TcpStream> {
    let started = Instant::now();
    loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!(target: "remote", "accept connection from {addr}");
                stream.set_nonblocking(false)?;
                return Ok(stream);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
        if stop.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::ConnectTimeout(now - started));
        }
        thread::sleep(RETRY_DELAY.min(deadline - now));
    }
}

/// Connect to the first resolved address that answers, retrying until the deadline.
pub fn connect(host: &str, port: u16, deadline: Instant, stop: &AtomicBool) -> Result<TcpStream> {
    let started = Instant::now();
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    loop {
        for addr in &addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match TcpStream::connect_timeout(addr, remaining) {
                Ok(stream) => {
                    debug!(target: "remote", "connected to {addr}");
                    return Ok(stream);
                }
                Err(e) => debug!(target: "remote", "connect to {addr}: {e}"),
            }
        }

        if stop.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::ConnectTimeout(now - started));
        }
        thread::sleep(RETRY_DELAY.min(deadline - now));
    }
}

/// Splits a byte stream into commands: a header, then exactly the declared payload.
#[derive(Default)]
pub struct FrameReader {
    buf: BytesMut,
    header: Option<Header>,
}

impl FrameReader {
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Return the next complete command, `None` if more bytes are needed.
    pub fn next_command(&mut self) -> DecodeResult<Option<Command>> {
        let header = match self.header {
            Some(header) => header,
            None => {
                if self.buf.len() < Header::SIZE {
                    return Ok(None);
                }
                let raw = self.buf.split_to(Header::SIZE);
                let header = Header::parse(&raw)?;
                self.header = Some(header);
                header
            }
        };

        let len = header.len as usize;
        if self.buf.len() < len {
            return Ok(None);
        }
        let payload = self.buf.split_to(len).freeze();
        self.header = None;
        Command::from_parts(header, payload).map(Some)
    }
}

/// Established TCP stream with framing.
pub struct Connection {
    stream: TcpStream,
    reader: FrameReader,
    chunk: Box<[u8]>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_POLL))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(Self {
            stream,
            reader: FrameReader::default(),
            chunk: vec![0; READ_CHUNK].into_boxed_slice(),
        })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Write a whole frame, the call returns once the transport took every byte.
    pub fn write_frame(&mut self, frame: &Bytes) -> Result<()> {
        self.stream.write_all(frame)?;
        Ok(())
    }

    /// Perform a single read and collect every command it completed.
    ///
    /// A read that times out is not an error. A closed stream or a malformed frame is.
    pub fn read_commands(&mut self, out: &mut Vec<Command>) -> Result<()> {
        match self.stream.read(&mut self.chunk) {
            Ok(0) => return Err(Error::Disconnected),
            Ok(n) => self.reader.feed(&self.chunk[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                return Ok(())
            }
            Err(e) => return Err(e.into()),
        }

        while let Some(cmd) = self.reader.next_command()? {
            out.push(cmd);
        }
        Ok(())
    }

    /// Exchange `StartConnection` sentinels.
    ///
    /// Commands that arrived right behind the peer's sentinel are returned to the caller.
    pub fn handshake(&mut self, stop: &AtomicBool) -> Result<Vec<Command>> {
        let hello = Command::new(PROTOCOL_VERSION, Message::StartConnection);
        self.write_frame(&hello.to_frame()?)?;

        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut received = vec![];
        loop {
            self.read_commands(&mut received)?;
            if let Some(first) = received.first() {
                if first.message != Message::StartConnection {
                    return Err(Error::Handshake(format!(
                        "expect StartConnection, got {}",
                        first.command_type()
                    )));
                }
                match first.id {
                    0 => return Err(Error::Handshake("peer sent no version".to_string())),
                    PROTOCOL_VERSION => {}
                    other => {
                        return Err(Error::Handshake(format!(
                            "protocol version mismatch: local {PROTOCOL_VERSION}, peer {other}"
                        )))
                    }
                }
                received.remove(0);
                return Ok(received);
            }

            if stop.load(Ordering::Acquire) {
                return Err(Error::Disconnected);
            }
            if Instant::now() >= deadline {
                return Err(Error::Handshake("peer sent no StartConnection".to_string()));
            }
        }
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                warn!(target: "remote", "socket shutdown: {e}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::StackFrameRef;

    fn frames(cmds: &[Command]) -> Vec<u8> {
        cmds.iter()
            .flat_map(|cmd| cmd.to_frame().unwrap().to_vec())
            .collect()
    }

    #[test]
    fn test_reader_partial_chunks() {
        let cmds = vec![
            Command::new(2, Message::RequestLocalVarList(StackFrameRef::new(1))),
            Command::new(4, Message::Resume),
            Command::new(6, Message::Failed("boom".to_string())),
        ];
        let bytes = frames(&cmds);

        // feed one byte at a time, every command must come out exactly once
        let mut reader = FrameReader::default();
        let mut out = vec![];
        for b in bytes {
            reader.feed(&[b]);
            while let Some(cmd) = reader.next_command().unwrap() {
                out.push(cmd);
            }
        }
        assert_eq!(out, cmds);
    }

    #[test]
    fn test_reader_whole_buffer() {
        let cmds = vec![
            Command::new(1, Message::ChangedState { is_break: true }),
            Command::new(3, Message::SetUpdateCount(9)),
        ];
        let mut reader = FrameReader::default();
        reader.feed(&frames(&cmds));
        assert_eq!(reader.next_command().unwrap(), Some(cmds[0].clone()));
        assert_eq!(reader.next_command().unwrap(), Some(cmds[1].clone()));
        assert_eq!(reader.next_command().unwrap(), None);
    }

    #[test]
    fn test_reader_rejects_unknown_type() {
        let mut reader = FrameReader::default();
        reader.feed(&[77, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(reader.next_command().is_err());
    }

    #[test]
    fn test_state_close_once() {
        let cell = StateCell::default();
        cell.set(ConnectionState::Connected);
        assert!(cell.close());
        assert!(!cell.close());
        cell.set(ConnectionState::Connected);
        assert_eq!(cell.get(), ConnectionState::Closed);
    }

    #[test]
    fn test_wait_settled_timeout() {
        let cell = StateCell::default();
        cell.set(ConnectionState::Connecting);
        assert_eq!(
            cell.wait_settled(Duration::from_millis(10)),
            ConnectionState::Connecting
        );
    }
}
