//! One UDP endpoint per in-flight transfer: owns the session, the retransmission
//! timer, and the retry counter (§4.4).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::packet::{self, Packet, MAX_PACKET_SIZE};
use crate::session::Session;
use crate::store::FileStore;

/// Drives one transfer to completion: bind, bootstrap the session from the first
/// packet, then alternate send/receive with the peer until the session or the retry
/// budget says to stop.
pub struct Connection {
    socket: UdpSocket,
    remote_tid: SocketAddr,
    /// `None` when the opening packet could not start a session: the loop sends the
    /// rejection once and returns without receiving (§4.4 opening bootstrap).
    session: Option<Session>,
    last_reply: Option<Vec<u8>>,
    timeout: Duration,
    max_retries: u32,
    retries_so_far: u32,
}

impl Connection {
    /// Binds a fresh ephemeral port on `host` and bootstraps a session from `first`.
    pub async fn new(
        host: std::net::IpAddr,
        remote_tid: SocketAddr,
        fs: Arc<FileStore>,
        first: Packet,
        timeout: Duration,
        max_retries: u32,
    ) -> std::io::Result<Connection> {
        let socket = UdpSocket::bind((host, 0)).await?;

        let (session, reply) = match Session::start(fs, &first) {
            Ok((session, reply)) => (Some(session), reply),
            Err(reply) => (None, reply),
        };

        Ok(Connection {
            socket,
            remote_tid,
            session,
            last_reply: reply.as_ref().map(packet::marshal),
            timeout,
            max_retries,
            retries_so_far: 0,
        })
    }

    async fn send_last_reply(&self) -> std::io::Result<()> {
        if let Some(reply) = &self.last_reply {
            self.socket.send_to(reply, self.remote_tid).await?;
        }
        Ok(())
    }

    /// Runs the request/reply loop until the session terminates, the retry budget is
    /// exhausted, or the socket fails unrecoverably (§4.4).
    ///
    /// `last_reply` is the retransmit buffer: it is only replaced by a fresh reply,
    /// never cleared. `should_send` tracks whether *this* iteration owes the peer a
    /// transmission (the opening reply, a timeout retransmit, or a freshly dispatched
    /// reply) as opposed to one that produced no reply or was dropped outright — those
    /// must fall straight back into receiving, not resend the previous reply (§4.3,
    /// §4.4, §8 scenarios 1, 5, 6).
    pub async fn run(mut self) {
        let span = tracing::info_span!("connection", peer = %self.remote_tid);
        let _enter = span.enter();

        let mut should_send = true;

        loop {
            if should_send {
                if let Err(err) = self.send_last_reply().await {
                    tracing::warn!(%err, "send failed, abandoning connection");
                    return;
                }
            }

            let Some(session) = &self.session else {
                tracing::debug!("opening packet rejected, connection done");
                return;
            };
            if session.wants_to_die() {
                tracing::debug!("session complete");
                return;
            }
            if self.retries_so_far > self.max_retries {
                tracing::debug!(retries = self.retries_so_far, "retry budget exhausted");
                return;
            }

            let mut buf = [0u8; MAX_PACKET_SIZE];
            let recv = tokio::time::timeout(self.timeout, self.socket.recv_from(&mut buf)).await;

            let (len, from) = match recv {
                Err(_elapsed) => {
                    self.retries_so_far += 1;
                    tracing::debug!(retries = self.retries_so_far, "read timed out, retransmitting");
                    should_send = true;
                    continue;
                }
                Ok(Err(err)) => {
                    tracing::warn!(%err, "recv failed, abandoning connection");
                    return;
                }
                Ok(Ok(pair)) => pair,
            };

            if from != self.remote_tid {
                tracing::debug!(%from, "dropping datagram from foreign TID");
                should_send = false;
                continue;
            }

            self.retries_so_far = 0;
            let reply = match packet::unmarshal(&buf[..len]) {
                Ok(packet) => {
                    tracing::trace!(%packet, "received");
                    self.session.as_mut().expect("checked above").on_packet(Some(packet))
                }
                Err(err) => {
                    tracing::warn!(%err, "malformed datagram from peer");
                    self.session.as_mut().expect("checked above").on_packet(None)
                }
            };

            should_send = reply.is_some();
            if let Some(reply) = reply {
                self.last_reply = Some(packet::marshal(&reply));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use std::net::{IpAddr, Ipv4Addr};

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn wrq_bootstraps_a_session_with_ack_zero() {
        let fs = Arc::new(FileStore::new());
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let first = Packet::Wrq { filename: "foo".into(), mode: "octet".into() };
        let conn = Connection::new(
            loopback(),
            peer,
            fs,
            first,
            Duration::from_millis(50),
            3,
        )
        .await
        .unwrap();
        assert_eq!(conn.last_reply, Some(packet::marshal(&Packet::Ack { block: 0 })));
        assert!(conn.session.is_some());
    }

    #[tokio::test]
    async fn ack_does_not_bootstrap_a_session() {
        let fs = Arc::new(FileStore::new());
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let conn = Connection::new(
            loopback(),
            peer,
            fs,
            Packet::Ack { block: 0 },
            Duration::from_millis(50),
            3,
        )
        .await
        .unwrap();
        assert!(conn.session.is_none());
        assert!(conn.last_reply.is_some());
    }
}
