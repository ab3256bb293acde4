//! Newline-delimited JSON transport over a Unix domain socket.
//!
//! Each line from a client is one request object, optionally carrying an
//! `id` that is echoed on every reply to it:
//!
//! ```text
//! -> {"id": 7, "method": "startTracking", "handler": "wifi"}
//! <- {"id": 7, "returnValue": true, "handler": "wifi", "latitude": 37.1, ...}
//! ```
//!
//! Closing the connection cancels every subscription the client holds.

mod codec;
mod server;

use std::path::PathBuf;

use thiserror::Error;

pub use codec::{decode_request, encode_reply, encode_request, Envelope};
pub use server::IpcServer;

/// IPC transport errors.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("Failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Socket {0} is in use by another process")]
    InUse(PathBuf),

    #[error("IPC I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}
