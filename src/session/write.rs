//! The WRQ (upload) session state machine (§4.3 "WriteSession").

use std::sync::Arc;

use super::Outcome;
use crate::packet::{ErrorCode, Packet, BLOCK_SIZE};
use crate::store::{File, FileStore, StoreError};

enum State {
    AwaitingWrq,
    AwaitingData(File),
    Terminal,
}

pub struct WriteSession {
    fs: Arc<FileStore>,
    state: State,
}

impl WriteSession {
    pub(super) fn new(fs: Arc<FileStore>) -> Self {
        WriteSession { fs, state: State::AwaitingWrq }
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
            (State::AwaitingWrq, Packet::Wrq { filename, .. }) => {
                match self.fs.create_file(&filename) {
                    Ok(file) => {
                        self.state = State::AwaitingData(file);
                        Some(Packet::Ack { block: 0 })
                    }
                    Err(StoreError::AlreadyExists) => {
                        self.state = State::Terminal;
                        Some(Packet::error(ErrorCode::FileAlreadyExists, ""))
                    }
                    Err(StoreError::NotFound) => unreachable!("create_file never returns NotFound"),
                }
            }
            (State::AwaitingData(file), Packet::Data { block, data }) => {
                let next = file.block_count() + 1;
                if block == next {
                    let is_final = data.len() < BLOCK_SIZE;
                    file.append_page(data);
                    if is_final {
                        let file = std::mem::take(file);
                        self.state = State::Terminal;
                        match self.fs.commit(file) {
                            Ok(()) => Some(Packet::Ack { block }),
                            Err(StoreError::AlreadyExists) => {
                                Some(Packet::error(ErrorCode::FileAlreadyExists, ""))
                            }
                            Err(StoreError::NotFound) => unreachable!("commit never returns NotFound"),
                        }
                    } else {
                        Some(Packet::Ack { block })
                    }
                } else if block <= file.block_count() {
                    // Duplicate of an already-acknowledged block: drop silently.
                    None
                } else {
                    self.state = State::Terminal;
                    Some(Packet::error(ErrorCode::IllegalOperation, "Out of order"))
                }
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
