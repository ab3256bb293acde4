//! In-flight HTTP transaction tracking.
//!
//! Every submitted request gets a [`TaskId`] and an entry in a concurrent
//! table recording which component issued it. When the response arrives the
//! entry is removed and the body is handed to the completion callback the
//! issuer supplied, so it always reaches the originating provider instance.
//! Cancelled transactions are removed from the table first and their late
//! responses are discarded.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use super::AsyncHttpClient;
use crate::error::ErrorCode;

/// Identifier of one HTTP transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http-{}", self.0)
    }
}

/// Completion callback for a transaction.
pub type HttpCallback = Box<dyn FnOnce(Result<Vec<u8>, ErrorCode>) + Send + 'static>;

/// A GET request with optional headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Object-safe view of the transaction manager used by providers.
pub trait HttpTransport: Send + Sync {
    /// Start `request` on behalf of `origin`; `on_complete` receives the body.
    ///
    /// Fails with `Multithread` when no async runtime is available to run it.
    fn submit(
        &self,
        origin: &str,
        request: HttpRequest,
        on_complete: HttpCallback,
    ) -> Result<TaskId, ErrorCode>;

    /// Abort a transaction. Returns false if it already completed.
    fn cancel(&self, task: TaskId) -> bool;

    /// Number of transactions still waiting for a response.
    fn in_flight(&self) -> usize;
}

struct Transaction {
    origin: String,
    url: String,
    abort: Option<AbortHandle>,
}

/// Runs requests on the current tokio runtime and tracks them by task id.
pub struct HttpTransactionManager<C> {
    client: Arc<C>,
    next_id: AtomicU64,
    tasks: Arc<DashMap<TaskId, Transaction>>,
}

impl<C: AsyncHttpClient + 'static> HttpTransactionManager<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            next_id: AtomicU64::new(1),
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Component that issued `task`, while it is in flight.
    pub fn origin_of(&self, task: TaskId) -> Option<String> {
        self.tasks.get(&task).map(|t| t.origin.clone())
    }
}

impl<C: AsyncHttpClient + 'static> HttpTransport for HttpTransactionManager<C> {
    fn submit(
        &self,
        origin: &str,
        request: HttpRequest,
        on_complete: HttpCallback,
    ) -> Result<TaskId, ErrorCode> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            tracing::warn!(origin = origin, "HTTP transport inactive: no async runtime");
            ErrorCode::Multithread
        })?;

        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.tasks.insert(
            id,
            Transaction {
                origin: origin.to_string(),
                url: request.url.clone(),
                abort: None,
            },
        );
        tracing::debug!(task = %id, origin = origin, url = %request.url, "HTTP transaction submitted");

        let client = Arc::clone(&self.client);
        let tasks = Arc::clone(&self.tasks);
        let handle = runtime.spawn(async move {
            let result = if request.headers.is_empty() {
                client.get(&request.url).await
            } else {
                let headers: Vec<(&str, &str)> = request
                    .headers
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                client.get_with_headers(&request.url, &headers).await
            };

            match tasks.remove(&id) {
                Some((_, txn)) => {
                    tracing::debug!(
                        task = %id,
                        origin = %txn.origin,
                        ok = result.is_ok(),
                        "HTTP transaction completed"
                    );
                    on_complete(result.map_err(ErrorCode::from));
                }
                None => tracing::trace!(task = %id, "Dropping response for cancelled transaction"),
            }
        });

        if let Some(mut txn) = self.tasks.get_mut(&id) {
            txn.abort = Some(handle.abort_handle());
        }
        Ok(id)
    }

    fn cancel(&self, task: TaskId) -> bool {
        match self.tasks.remove(&task) {
            Some((_, txn)) => {
                if let Some(abort) = txn.abort {
                    abort.abort();
                }
                tracing::debug!(task = %task, origin = %txn.origin, url = %txn.url, "HTTP transaction cancelled");
                true
            }
            None => false,
        }
    }

    fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}
