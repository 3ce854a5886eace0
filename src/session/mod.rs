//! Per-connection session state machines (§4.3): a [`Session`] is a pure function
//! from `(state, incoming packet)` to `(state', reply?)`, with no knowledge of sockets,
//! timers, or retries — those belong to [`crate::connection::Connection`].

mod read;
mod write;

use std::sync::Arc;

pub use read::ReadSession;
pub use write::WriteSession;

use crate::packet::{ErrorCode, Packet};
use crate::store::FileStore;

/// The reply (if any) produced by dispatching one packet into a [`Session`].
pub type Outcome = Option<Packet>;

/// Either half of a TFTP transfer, dispatched uniformly by the connection loop (§4.3).
pub enum Session {
    Read(ReadSession),
    Write(WriteSession),
}

impl Session {
    /// Starts a session from the first datagram of a connection. `None` is reserved
    /// for opcodes that may not start a session; the caller sends the resulting error
    /// and never enters the loop (§4.4 opening bootstrap).
    pub fn start(fs: Arc<FileStore>, first: &Packet) -> Result<(Session, Outcome), Outcome> {
        match first {
            Packet::Rrq { .. } => {
                let mut session = ReadSession::new(fs);
                let reply = session.on_packet(Some(first.clone()));
                Ok((Session::Read(session), reply))
            }
            Packet::Wrq { .. } => {
                let mut session = WriteSession::new(fs);
                let reply = session.on_packet(Some(first.clone()));
                Ok((Session::Write(session), reply))
            }
            _ => Err(Some(Packet::error(
                ErrorCode::IllegalOperation,
                "Session must start with RRQ or WRQ",
            ))),
        }
    }

    /// Dispatches one incoming packet (or a parse failure, as `None`) and returns the
    /// reply to send, if any. A produced ERROR reply always marks the session
    /// terminal, on top of whatever the handler itself decided (§4.3 dispatch).
    pub fn on_packet(&mut self, packet: Option<Packet>) -> Outcome {
        match self {
            Session::Read(session) => session.on_packet(packet),
            Session::Write(session) => session.on_packet(packet),
        }
    }

    /// Whether the connection layer should tear this session (and its connection)
    /// down after the current exchange.
    pub fn wants_to_die(&self) -> bool {
        match self {
            Session::Read(session) => session.wants_to_die(),
            Session::Write(session) => session.wants_to_die(),
        }
    }
}

/// Shared helper for the two session variants: mark terminal and build the parse-
/// failure reply common to both (§4.3 "common rules").
fn parse_failure_reply() -> Packet {
    Packet::error(ErrorCode::IllegalOperation, "Error parsing packet")
}
