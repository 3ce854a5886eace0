//! The introduction socket: accepts the first datagram of every transfer and hands it
//! off to a freshly spawned [`Connection`] (§4.5).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::connection::Connection;
use crate::packet::{self, MAX_PACKET_SIZE};
use crate::store::FileStore;

pub struct Listener {
    socket: UdpSocket,
    host: IpAddr,
    fs: Arc<FileStore>,
    timeout: Duration,
    max_retries: u32,
}

impl Listener {
    pub async fn bind(
        addr: SocketAddr,
        fs: Arc<FileStore>,
        timeout: Duration,
        max_retries: u32,
    ) -> std::io::Result<Listener> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!(%addr, "listening");
        Ok(Listener { socket, host: addr.ip(), fs, timeout, max_retries })
    }

    /// The address actually bound, useful when `addr`'s port was 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receives datagrams forever, spawning one [`Connection`] per accepted first
    /// packet. Never returns except on an unrecoverable receive error.
    pub async fn run(self) -> std::io::Result<()> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            let payload = buf[..len].to_vec();
            self.spawn_connection(payload, peer).await;
        }
    }

    async fn spawn_connection(&self, payload: Vec<u8>, peer: SocketAddr) {
        let first = match packet::unmarshal(&payload) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(%peer, %err, "malformed opening datagram, dropping");
                return;
            }
        };

        match Connection::new(
            self.host,
            peer,
            self.fs.clone(),
            first,
            self.timeout,
            self.max_retries,
        )
        .await
        {
            Ok(connection) => {
                tokio::spawn(connection.run());
            }
            Err(err) => {
                tracing::warn!(%peer, %err, "failed to construct connection");
            }
        }
    }
}
