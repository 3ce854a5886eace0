//! An in-memory TFTP (RFC 1350) server: a per-peer connection/session engine sitting
//! atop a shared, concurrently accessed file store.

pub mod config;
pub mod connection;
pub mod listener;
pub mod packet;
pub mod session;
pub mod store;

use std::sync::Arc;

use crate::config::Config;
use crate::listener::Listener;
use crate::store::FileStore;

/// Binds the introduction socket and serves forever. Returns only on an
/// unrecoverable socket error (§6: fatal to `main`, non-zero exit).
pub async fn serve(config: Config) -> std::io::Result<()> {
    let fs = Arc::new(FileStore::new());
    let listener =
        Listener::bind((config.host, config.port).into(), fs, config.timeout, config.max_retries)
            .await?;
    listener.run().await
}
