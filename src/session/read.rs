//! The RRQ (download) session state machine (§4.3 "ReadSession").

use std::sync::Arc;

use super::Outcome;
use crate::packet::{ErrorCode, Packet};
use crate::store::{FileReader, FileStore, StoreError};

enum State {
    AwaitingRrq,
    AwaitingAck(FileReader),
    Terminal,
}

pub struct ReadSession {
    fs: Arc<FileStore>,
    state: State,
}

impl ReadSession {
    pub(super) fn new(fs: Arc<FileStore>) -> Self {
        ReadSession { fs, state: State::AwaitingRrq }
    }

    pub fn wants_to_die(&self) -> bool {
        matches!(self.state, State::Terminal)
    }

    pub fn on_packet(&mut self, packet: Option<Packet>) -> Outcome {
        let Some(packet) = packet else {
            self.state = State::Terminal;
            return Some(super::parse_failure_reply());
        };

        if let Packet::Error { .. } = packet {
            self.state = State::Terminal;
            return None;
        }

        let reply = match (&mut self.state, packet) {
            (State::AwaitingRrq, Packet::Rrq { filename, .. }) => {
                match self.fs.get_reader(&filename) {
                    Ok(reader) => {
                        let block = reader.block();
                        let page = reader.read_block().to_vec();
                        self.state = State::AwaitingAck(reader);
                        Some(Packet::Data { block, data: page })
                    }
                    Err(StoreError::NotFound) => {
                        self.state = State::Terminal;
                        Some(Packet::error(ErrorCode::FileNotFound, ""))
                    }
                    Err(StoreError::AlreadyExists) => {
                        unreachable!("get_reader never returns AlreadyExists")
                    }
                }
            }
            (State::AwaitingAck(reader), Packet::Ack { block }) if block == reader.block() => {
                if reader.at_end() {
                    self.state = State::Terminal;
                    None
                } else {
                    reader.advance_block();
                    let block = reader.block();
                    let page = reader.read_block().to_vec();
                    Some(Packet::Data { block, data: page })
                }
            }
            (State::AwaitingAck(reader), Packet::Ack { block }) if block < reader.block() => {
                // Network duplicate of an already-acknowledged block.
                None
            }
            (State::AwaitingAck(_), Packet::Ack { .. }) => {
                self.state = State::Terminal;
                Some(Packet::error(ErrorCode::IllegalOperation, "Out of order"))
            }
            (_, _) => {
                self.state = State::Terminal;
                Some(Packet::error(ErrorCode::IllegalOperation, "Bad packet"))
            }
        };

        if matches!(reply, Some(Packet::Error { .. })) {
            self.state = State::Terminal;
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::BLOCK_SIZE;

    fn rrq(filename: &str) -> Packet {
        Packet::Rrq { filename: filename.into(), mode: "octet".into() }
    }

    fn ack(block: u16) -> Packet {
        Packet::Ack { block }
    }

    fn store_with_two_block_file() -> Arc<FileStore> {
        let fs = Arc::new(FileStore::new());
        let mut file = fs.create_file("foo").unwrap();
        file.append_page(vec![b'a'; BLOCK_SIZE]);
        file.append_page(b"tail".to_vec());
        fs.commit(file).unwrap();
        fs
    }

    #[test]
    fn rrq_on_missing_file_is_terminal_file_not_found() {
        let fs = Arc::new(FileStore::new());
        let mut session = ReadSession::new(fs);
        let reply = session.on_packet(Some(rrq("missing")));
        assert!(matches!(
            reply,
            Some(Packet::Error { code: ErrorCode::FileNotFound, .. })
        ));
        assert!(session.wants_to_die());
    }

    #[test]
    fn full_read_transfer_two_blocks() {
        let fs = store_with_two_block_file();
        let mut session = ReadSession::new(fs);

        let reply = session.on_packet(Some(rrq("foo")));
        assert_eq!(reply, Some(Packet::Data { block: 1, data: vec![b'a'; BLOCK_SIZE] }));
        assert!(!session.wants_to_die());

        let reply = session.on_packet(Some(ack(1)));
        assert_eq!(reply, Some(Packet::Data { block: 2, data: b"tail".to_vec() }));
        assert!(!session.wants_to_die());

        let reply = session.on_packet(Some(ack(2)));
        assert_eq!(reply, None);
        assert!(session.wants_to_die());
    }

    #[test]
    fn duplicate_ack_yields_no_reply() {
        let fs = store_with_two_block_file();
        let mut session = ReadSession::new(fs);
        session.on_packet(Some(rrq("foo")));
        session.on_packet(Some(ack(1)));

        // ACK(1) again: a network duplicate, already superseded by block 2.
        assert_eq!(session.on_packet(Some(ack(1))), None);
        assert!(!session.wants_to_die());
    }

    #[test]
    fn out_of_order_ack_is_rejected() {
        let fs = store_with_two_block_file();
        let mut session = ReadSession::new(fs);
        session.on_packet(Some(rrq("foo")));

        let reply = session.on_packet(Some(ack(5)));
        assert!(matches!(
            reply,
            Some(Packet::Error { code: ErrorCode::IllegalOperation, .. })
        ));
        assert!(session.wants_to_die());
    }

    #[test]
    fn wrq_mid_read_is_rejected_as_bad_packet() {
        let fs = store_with_two_block_file();
        let mut session = ReadSession::new(fs);
        session.on_packet(Some(rrq("foo")));

        let reply = session.on_packet(Some(Packet::Wrq { filename: "x".into(), mode: "octet".into() }));
        assert!(matches!(
            reply,
            Some(Packet::Error { code: ErrorCode::IllegalOperation, .. })
        ));
    }

    #[test]
    fn received_error_terminates_without_reply() {
        let fs = store_with_two_block_file();
        let mut session = ReadSession::new(fs);
        session.on_packet(Some(rrq("foo")));

        let reply = session.on_packet(Some(Packet::error(ErrorCode::Undefined, "giving up")));
        assert_eq!(reply, None);
        assert!(session.wants_to_die());
    }
}
