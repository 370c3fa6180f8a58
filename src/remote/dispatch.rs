//! Routing of inbound commands.

use crate::protocol::CommandType;

/// Where an inbound command goes after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `StartConnection` sentinel, consumed by the connection itself.
    Handshake,
    /// `EndConnection`, closes the connection and is forwarded to the consumer.
    Teardown,
    /// Answer to a pending request, delivered through the pending table.
    Reply,
    /// Everything else, queued for the consumer thread.
    Inbound,
}

pub fn route(ty: CommandType) -> Route {
    match ty {
        CommandType::StartConnection => Route::Handshake,
        CommandType::EndConnection => Route::Teardown,
        CommandType::ValueVar
        | CommandType::ValueVarList
        | CommandType::ValueBacktraceList
        | CommandType::Successed
        | CommandType::Failed => Route::Reply,
        _ => Route::Inbound,
    }
}

/// Connection side. Both sides number their commands independently, parity keeps the
/// two id spaces apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    /// Process running the Lua interpreter, odd ids.
    Debuggee,
    /// Process visualizing the session, even ids.
    Frame,
}

impl Peer {
    pub fn first_id(self) -> u32 {
        match self {
            Peer::Debuggee => 1,
            Peer::Frame => 2,
        }
    }

    /// Whether the id was issued by this side.
    pub fn owns(self, id: u32) -> bool {
        id % 2 == self.first_id() % 2
    }

    pub fn name(self) -> &'static str {
        match self {
            Peer::Debuggee => "debuggee",
            Peer::Frame => "frame",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_routes() {
        assert_eq!(route(CommandType::StartConnection), Route::Handshake);
        assert_eq!(route(CommandType::EndConnection), Route::Teardown);
        assert_eq!(route(CommandType::Failed), Route::Reply);
        assert_eq!(route(CommandType::ValueVarList), Route::Reply);
        assert_eq!(route(CommandType::RequestLocalVarList), Route::Inbound);
        assert_eq!(route(CommandType::SetUpdateCount), Route::Inbound);
    }

    #[test]
    fn test_id_parity() {
        assert!(Peer::Debuggee.owns(1));
        assert!(Peer::Debuggee.owns(301));
        assert!(!Peer::Debuggee.owns(2));
        assert!(Peer::Frame.owns(2));
        assert!(!Peer::Frame.owns(3));
    }
}
