//! Unix socket server.
//!
//! One task per connection reads request lines and one writer task sends
//! replies back. When a connection closes, its requests are cancelled.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{decode_request, encode_reply};
use super::IpcError;
use crate::service::{ClientId, LocationService, Reply};

/// Serves a [`LocationService`] on a Unix socket.
pub struct IpcServer {
    path: PathBuf,
    service: Arc<LocationService>,
    next_client: AtomicU64,
}

impl IpcServer {
    pub fn new(path: impl Into<PathBuf>, service: Arc<LocationService>) -> Self {
        Self {
            path: path.into(),
            service,
            next_client: AtomicU64::new(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bind the socket, replacing a stale socket file left by a previous run.
    pub async fn bind(&self) -> Result<UnixListener, IpcError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match tokio::fs::symlink_metadata(&self.path).await {
            Ok(meta) if meta.file_type().is_socket() => {
                if UnixStream::connect(&self.path).await.is_ok() {
                    return Err(IpcError::InUse(self.path.clone()));
                }
                debug!(path = %self.path.display(), "Removing stale socket");
                tokio::fs::remove_file(&self.path).await?;
            }
            Ok(_) => {
                return Err(IpcError::Bind {
                    path: self.path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "path exists and is not a socket",
                    ),
                })
            }
            Err(_) => {}
        }

        UnixListener::bind(&self.path).map_err(|source| IpcError::Bind {
            path: self.path.clone(),
            source,
        })
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), IpcError> {
        let listener = self.bind().await?;
        info!(path = %self.path.display(), "IPC server listening");
        self.serve(listener, shutdown).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(
        self,
        listener: UnixListener,
        shutdown: CancellationToken,
    ) -> Result<(), IpcError> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("IPC server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let client = ClientId(self.next_client.fetch_add(1, Ordering::Relaxed));
                            let service = Arc::clone(&self.service);
                            let token = shutdown.child_token();
                            tokio::spawn(async move {
                                serve_connection(client, stream, service, token).await;
                            });
                        }
                        Err(e) => warn!(error = %e, "Failed to accept IPC connection"),
                    }
                }
            }
        }

        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            debug!(path = %self.path.display(), error = %e, "Socket file not removed");
        }
        Ok(())
    }
}

type Outgoing = (Option<u64>, Reply);

async fn serve_connection(
    client: ClientId,
    stream: UnixStream,
    service: Arc<LocationService>,
    token: CancellationToken,
) {
    debug!(client = %client, "Client connected");
    let (read, mut write) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();

    let writer_token = token.clone();
    let writer = tokio::spawn(async move {
        loop {
            let (id, reply) = tokio::select! {
                _ = writer_token.cancelled() => break,
                next = out_rx.recv() => match next {
                    Some(next) => next,
                    None => break,
                },
            };
            let line = match encode_reply(id, &reply) {
                Ok(line) => line,
                Err(e) => {
                    warn!(client = %client, error = %e, "Failed to encode reply");
                    continue;
                }
            };
            if let Err(e) = write.write_all(line.as_bytes()).await {
                debug!(client = %client, error = %e, "Client write failed");
                writer_token.cancel();
                break;
            }
        }
    });

    let mut lines = BufReader::new(read).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(client = %client, error = %e, "Client read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match decode_request(&line) {
            Ok(envelope) => {
                let replies = service.handle(client, envelope.request);
                forward(envelope.id, replies, out_tx.clone(), token.clone());
            }
            Err((id, error)) => {
                let _ = out_tx.send((id, Reply::error(error)));
            }
        }
    }

    token.cancel();
    service.cancel_client(client);
    let _ = writer.await;
    debug!(client = %client, "Client disconnected");
}

/// Copy one reply stream onto the connection's outgoing queue.
fn forward(
    id: Option<u64>,
    mut replies: mpsc::UnboundedReceiver<Reply>,
    out: mpsc::UnboundedSender<Outgoing>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                reply = replies.recv() => match reply {
                    Some(reply) => {
                        if out.send((id, reply)).is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });
}
