//! Remote engine: owns a connection and the I/O thread that services it.
//!
//! The consumer never touches the socket. Outgoing commands are put in a FIFO queue the I/O
//! thread writes one frame at a time, incoming commands are routed either to a waiting
//! request (see [`PendingTable`]) or to the [`InboundQueue`] the consumer drains at its own pace.

use crate::protocol::{Command, Message};
use crate::remote::connection::{self, Connection, ConnectionState, Endpoint, StateCell};
use crate::remote::dispatch::{route, Peer, Route};
use crate::remote::error::{Error, Result};
use crate::remote::pending::{PendingTable, ReplyHandle};
use crate::remote::queue::InboundQueue;
use crate::weak_error;
use bytes::Bytes;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Id of the `EndConnection` pseudo-command pushed when the connection goes away locally.
pub const LOCAL_TEARDOWN_ID: u32 = 0;

struct Shared {
    peer: Peer,
    state: StateCell,
    next_id: AtomicU32,
    pending: PendingTable,
    inbound: InboundQueue,
    outbound: Mutex<VecDeque<Bytes>>,
    stop: AtomicBool,
    discard_outbound: AtomicBool,
    start_error: Mutex<Option<Error>>,
}

impl Shared {
    fn pop_outbound(&self) -> Option<Bytes> {
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    fn enqueue(&self, cmd: Command) -> Result<()> {
        if self.state.get() != ConnectionState::Connected {
            return Err(Error::Disconnected);
        }
        let frame = cmd.to_frame()?;
        debug!(target: "remote", "{} send {} #{}", self.peer.name(), cmd.command_type(), cmd.id);
        self.outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(frame);
        Ok(())
    }

    /// Close the connection state and notify the consumer. Effective only once.
    fn teardown(&self) {
        if self.state.close() {
            self.pending.fail_all();
            self.inbound
                .push(Command::new(LOCAL_TEARDOWN_ID, Message::EndConnection));
            info!(target: "remote", "{} connection closed", self.peer.name());
        }
    }

    fn fail_start(&self, err: Error) {
        warn!(target: "remote", "{} connection not established: {err}", self.peer.name());
        *self.start_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err);
        self.state.close();
        self.pending.fail_all();
    }

    /// Route a received command. Return false if the connection must be closed.
    fn dispatch(&self, cmd: Command) -> bool {
        debug!(target: "remote", "{} recv {} #{}", self.peer.name(), cmd.command_type(), cmd.id);
        match route(cmd.command_type()) {
            Route::Handshake => {
                warn!(target: "remote", "repeated StartConnection ignored");
                true
            }
            Route::Teardown => false,
            Route::Reply => {
                if !self.peer.owns(cmd.id) {
                    warn!(target: "remote", "reply #{} has foreign id parity", cmd.id);
                }
                weak_error!(self.pending.complete(cmd.id, cmd.message), "deliver reply:");
                true
            }
            Route::Inbound => {
                self.inbound.push(cmd);
                true
            }
        }
    }
}

enum Setup {
    Listen(TcpListener),
    Dial { host: String, port: u16 },
}

/// Remote engine of one side of the debugging session.
pub struct RemoteEngine {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl RemoteEngine {
    pub fn new(peer: Peer) -> Self {
        Self {
            shared: Arc::new(Shared {
                peer,
                state: StateCell::default(),
                next_id: AtomicU32::new(peer.first_id()),
                pending: PendingTable::new(),
                inbound: InboundQueue::new(),
                outbound: Mutex::new(VecDeque::new()),
                stop: AtomicBool::new(false),
                discard_outbound: AtomicBool::new(false),
                start_error: Mutex::new(None),
            }),
            thread: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn peer(&self) -> Peer {
        self.shared.peer
    }

    /// Begin establishing the connection in background, the call doesn't wait for a peer.
    ///
    /// A server endpoint is bound before the call returns, so [`RemoteEngine::local_addr`]
    /// is known right away.
    pub fn start(&self, endpoint: Endpoint, wait: Duration) -> Result<()> {
        let mut thread_guard = self.thread.lock().unwrap_or_else(|e| e.into_inner());
        if thread_guard.is_some() || self.shared.state.get() != ConnectionState::Disconnected {
            return Err(Error::AlreadyStarted);
        }

        let setup = match endpoint {
            Endpoint::Server { host, port } => {
                let listener = connection::bind(&host, port)?;
                *self.local_addr.lock().unwrap_or_else(|e| e.into_inner()) =
                    listener.local_addr().ok();
                info!(target: "remote", "listen on {:?}", listener.local_addr().ok());
                Setup::Listen(listener)
            }
            Endpoint::Client { host, port } => Setup::Dial { host, port },
        };

        self.shared.state.set(ConnectionState::Connecting);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(format!("ldb-{}-io", self.shared.peer.name()))
            .spawn(move || run(shared, setup, Instant::now() + wait))?;
        *thread_guard = Some(handle);
        Ok(())
    }

    /// Wait until the handshake is completed.
    pub fn wait_connected(&self, timeout: Duration) -> Result<()> {
        match self.shared.state.wait_settled(timeout) {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => {
                let err = self
                    .shared
                    .start_error
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take();
                Err(err.unwrap_or(Error::Disconnected))
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                Err(Error::ConnectTimeout(timeout))
            }
        }
    }

    /// Listen on `host:port` and wait up to `wait` for a peer to connect.
    pub fn start_as_server(&self, host: &str, port: u16, wait: Duration) -> Result<()> {
        let endpoint = Endpoint::Server {
            host: host.to_string(),
            port,
        };
        self.start(endpoint, wait)?;
        self.wait_connected(wait)
    }

    /// Connect to `host:port`, retrying for up to `wait`.
    pub fn start_as_client(&self, host: &str, port: u16, wait: Duration) -> Result<()> {
        let endpoint = Endpoint::Client {
            host: host.to_string(),
            port,
        };
        self.start(endpoint, wait)?;
        self.wait_connected(wait)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn next_id(&self) -> u32 {
        self.shared.next_id.fetch_add(2, Ordering::Relaxed)
    }

    /// Send a command without waiting for an answer, return its id.
    pub fn send(&self, message: Message) -> Result<u32> {
        let id = self.next_id();
        self.shared.enqueue(Command::new(id, message))?;
        Ok(id)
    }

    /// Send a request, the answer is delivered through the returned handle.
    pub fn request(&self, message: Message) -> ReplyHandle {
        let id = self.next_id();
        let Some(kind) = message.expected_reply() else {
            return ReplyHandle::resolved(id, Err(Error::NotARequest(message.command_type())));
        };
        // register before writing, a fast reply must find its entry
        let handle = self.shared.pending.register(id, kind);
        if let Err(e) = self.shared.enqueue(Command::new(id, message)) {
            self.shared.pending.cancel(id);
            return ReplyHandle::resolved(id, Err(e));
        }
        handle
    }

    /// Answer a request of the peer.
    pub fn reply(&self, request_id: u32, message: Message) -> Result<()> {
        debug_assert!(message.is_reply(), "{} is not a reply", message.command_type());
        self.shared.enqueue(Command::new(request_id, message))
    }

    /// Commands waiting for the consumer.
    pub fn inbound(&self) -> &InboundQueue {
        &self.shared.inbound
    }

    /// Number of requests still waiting for an answer.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    fn stop_and_join(&self) {
        self.shared.stop.store(true, Ordering::Release);
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(target: "remote", "I/O thread panicked");
            }
        }
        self.shared.teardown();
    }

    /// Send `EndConnection` if still connected, stop the I/O thread and release the socket.
    pub fn shutdown(&self) {
        if self.is_connected() {
            weak_error!(self.send(Message::EndConnection), "send EndConnection:");
        }
        self.stop_and_join();
    }

    /// Drop the connection without saying goodbye, queued commands are discarded.
    pub fn abort(&self) {
        self.shared.discard_outbound.store(true, Ordering::Release);
        self.stop_and_join();
    }
}

impl Drop for RemoteEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(shared: Arc<Shared>, setup: Setup, deadline: Instant) {
    let stream = match setup {
        Setup::Listen(listener) => connection::accept(&listener, deadline, &shared.stop),
        Setup::Dial { host, port } => connection::connect(&host, port, deadline, &shared.stop),
    };
    let mut conn = match stream.and_then(Connection::new) {
        Ok(conn) => conn,
        Err(e) => return shared.fail_start(e),
    };

    let early = match conn.handshake(&shared.stop) {
        Ok(early) => early,
        Err(e) => {
            conn.shutdown();
            return shared.fail_start(e);
        }
    };
    shared.state.set(ConnectionState::Connected);
    info!(target: "remote", "{} connected to {:?}", shared.peer.name(), conn.peer_addr());

    let mut alive = early.into_iter().all(|cmd| shared.dispatch(cmd));
    let mut received = vec![];
    while alive {
        while let Some(frame) = shared.pop_outbound() {
            if let Err(e) = conn.write_frame(&frame) {
                warn!(target: "remote", "write failed: {e}");
                alive = false;
                break;
            }
        }
        if !alive {
            break;
        }

        if shared.stop.load(Ordering::Acquire) {
            if !shared.discard_outbound.load(Ordering::Acquire) {
                // commands queued right before the stop request, EndConnection among them
                while let Some(frame) = shared.pop_outbound() {
                    if conn.write_frame(&frame).is_err() {
                        break;
                    }
                }
            }
            break;
        }

        if let Err(e) = conn.read_commands(&mut received) {
            match e {
                Error::Disconnected => debug!(target: "remote", "peer closed the stream"),
                e => warn!(target: "remote", "read failed: {e}"),
            }
            alive = false;
        }
        for cmd in received.drain(..) {
            if !shared.dispatch(cmd) {
                alive = false;
                break;
            }
        }
    }

    shared.teardown();
    conn.shutdown();
    shared
        .outbound
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clear();
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{LuaVar, StackFrameRef};

    const WAIT: Duration = Duration::from_secs(5);

    fn pair() -> (RemoteEngine, RemoteEngine) {
        let frame = RemoteEngine::new(Peer::Frame);
        frame.start(Endpoint::loopback(0), WAIT).unwrap();
        let port = frame.local_addr().unwrap().port();
        let debuggee = RemoteEngine::new(Peer::Debuggee);
        debuggee.start_as_client("127.0.0.1", port, WAIT).unwrap();
        frame.wait_connected(WAIT).unwrap();
        (frame, debuggee)
    }

    #[test]
    fn test_server_listens_on_given_host() {
        let (frame, _debuggee) = pair();
        assert!(frame.local_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn test_ids_step_by_two() {
        let (frame, debuggee) = pair();
        assert_eq!(frame.send(Message::Break).unwrap(), 2);
        assert_eq!(frame.send(Message::Resume).unwrap(), 4);
        assert_eq!(debuggee.send(Message::Successed).unwrap(), 1);
        assert_eq!(debuggee.send(Message::Successed).unwrap(), 3);
    }

    #[test]
    fn test_request_reply() {
        let (frame, debuggee) = pair();
        let handle = frame.request(Message::RequestLocalVarList(StackFrameRef::TOP));
        let req = debuggee.inbound().pop(WAIT).unwrap();
        assert_eq!(req.id, handle.id());
        assert_eq!(
            req.message,
            Message::RequestLocalVarList(StackFrameRef::TOP)
        );
        debuggee
            .reply(req.id, Message::ValueVarList(vec![LuaVar::default()]))
            .unwrap();
        let vars = handle.wait(WAIT).unwrap().into_var_list().unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(frame.pending_count(), 0);
    }

    #[test]
    fn test_not_a_request() {
        let (frame, _debuggee) = pair();
        let handle = frame.request(Message::Break);
        assert!(matches!(handle.wait(WAIT), Err(Error::NotARequest(_))));
    }

    #[test]
    fn test_shutdown_notifies_peer() {
        let (frame, debuggee) = pair();
        let handle = debuggee.request(Message::RequestBacktraceList);
        frame.shutdown();
        assert_eq!(frame.state(), ConnectionState::Closed);
        assert!(frame.send(Message::Break).is_err());

        let cmd = debuggee.inbound().pop(WAIT).unwrap();
        assert_eq!(cmd.message, Message::EndConnection);
        assert!(matches!(handle.wait(WAIT), Err(Error::Disconnected)));
    }
}
