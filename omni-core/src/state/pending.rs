//! Pending-request table.
//!
//! Maps a [`CorrelationKey`] to exactly one waiting caller. This is what
//! turns the unordered, untagged response stream into request/response
//! pairs: a response frame carries the same disambiguating fields (path,
//! offset) the request did, and the router resolves the matching key.
//!
//! A key holds at most one waiter. Registering an occupied key fails with
//! [`OmniError::DuplicateRequest`] and leaves the first waiter in place.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::OmniError;
use crate::protocol::{Chunk, FileInfo};

// ── CorrelationKey ───────────────────────────────────────────────

/// Identifies the response a caller is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// `getFileInfo:<path>`
    FileInfo { path: String },
    /// `downloadChunk:<path>:<offset>`
    DownloadChunk { path: String, offset: u64 },
    /// `uploadChunk:<offset>:<path>`
    UploadChunk { path: String, offset: u64 },
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileInfo { path } => write!(f, "getFileInfo:{path}"),
            Self::DownloadChunk { path, offset } => write!(f, "downloadChunk:{path}:{offset}"),
            Self::UploadChunk { path, offset } => write!(f, "uploadChunk:{offset}:{path}"),
        }
    }
}

// ── Response ─────────────────────────────────────────────────────

/// The value a resolved request receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// A chunk write or truncate was acknowledged.
    Written,
    /// File metadata.
    Info(FileInfo),
    /// A chunk of file data.
    Chunk(Chunk),
}

// ── PendingTable ─────────────────────────────────────────────────

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<Response>,
}

#[derive(Default)]
struct TableInner {
    next_ticket: u64,
    waiters: HashMap<CorrelationKey, Waiter>,
}

/// Per-session table of outstanding requests. Cheap to clone.
#[derive(Clone, Default)]
pub struct PendingTable {
    inner: Arc<Mutex<TableInner>>,
}

impl fmt::Debug for PendingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTable")
            .field("pending", &self.len())
            .finish()
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `key`.
    ///
    /// Must be called *before* the request frame is sent, so a fast
    /// response cannot slip past.
    pub fn register(&self, key: CorrelationKey) -> Result<PendingRequest, OmniError> {
        let mut inner = self.lock();
        if inner.waiters.contains_key(&key) {
            return Err(OmniError::DuplicateRequest { key });
        }

        inner.next_ticket += 1;
        let ticket = inner.next_ticket;
        let (tx, rx) = oneshot::channel();
        inner.waiters.insert(key.clone(), Waiter { ticket, tx });

        Ok(PendingRequest {
            key,
            ticket,
            rx,
            table: self.clone(),
        })
    }

    /// Hand `response` to the waiter registered under `key`.
    ///
    /// Returns `false` when nobody was waiting; that is not an error (the
    /// caller may have given up, or never asked).
    pub fn resolve(&self, key: &CorrelationKey, response: Response) -> bool {
        let waiter = self.lock().waiters.remove(key);
        match waiter {
            Some(waiter) => {
                if waiter.tx.send(response).is_err() {
                    debug!(%key, "waiter gave up before its response arrived");
                    return false;
                }
                true
            }
            None => {
                debug!(%key, "response with no pending request");
                false
            }
        }
    }

    /// Drop every waiter; each sees [`OmniError::ConnectionClosed`].
    ///
    /// Returns how many waiters were failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.lock().waiters.drain().collect();
        drained.len()
    }

    /// Remove `key` only if it still belongs to `ticket`.
    fn forget(&self, key: &CorrelationKey, ticket: u64) {
        let mut inner = self.lock();
        if inner.waiters.get(key).is_some_and(|w| w.ticket == ticket) {
            inner.waiters.remove(key);
        }
    }

    pub fn is_pending(&self, key: &CorrelationKey) -> bool {
        self.lock().waiters.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── PendingRequest ───────────────────────────────────────────────

/// A registered waiter. Dropping it without a response frees the key.
#[derive(Debug)]
pub struct PendingRequest {
    key: CorrelationKey,
    ticket: u64,
    rx: oneshot::Receiver<Response>,
    table: PendingTable,
}

impl PendingRequest {
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    /// Wait for the response, an optional deadline, or cancellation,
    /// whichever comes first.
    pub async fn wait(
        mut self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Response, OmniError> {
        let deadline = async {
            match timeout {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            res = &mut self.rx => res.map_err(|_| OmniError::ConnectionClosed(self.key.clone())),
            _ = deadline => Err(OmniError::RequestTimeout {
                key: self.key.clone(),
                after: timeout.unwrap_or_default(),
            }),
            _ = cancelled => Err(OmniError::Cancelled { key: self.key.clone() }),
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        self.table.forget(&self.key, self.ticket);
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn info_key(path: &str) -> CorrelationKey {
        CorrelationKey::FileInfo { path: path.into() }
    }

    #[test]
    fn key_formats() {
        assert_eq!(info_key("/etc/hostname").to_string(), "getFileInfo:/etc/hostname");
        assert_eq!(
            CorrelationKey::DownloadChunk {
                path: "/a".into(),
                offset: 40960
            }
            .to_string(),
            "downloadChunk:/a:40960"
        );
        assert_eq!(
            CorrelationKey::UploadChunk {
                path: "/a".into(),
                offset: 7
            }
            .to_string(),
            "uploadChunk:7:/a"
        );
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let table = PendingTable::new();
        let pending = table.register(info_key("/a")).unwrap();
        assert!(table.is_pending(&info_key("/a")));

        let info = FileInfo::new("/a", 1, 2);
        assert!(table.resolve(&info_key("/a"), Response::Info(info.clone())));
        assert_eq!(pending.wait(None, None).await.unwrap(), Response::Info(info));
        assert!(table.is_empty());
    }

    #[test]
    fn waiter_stays_pending_until_resolved() {
        let table = PendingTable::new();
        let pending = table.register(info_key("/a")).unwrap();
        let mut wait = tokio_test::task::spawn(pending.wait(None, None));
        tokio_test::assert_pending!(wait.poll());

        assert!(table.resolve(&info_key("/a"), Response::Written));
        assert!(wait.is_woken());
        let response = tokio_test::assert_ready!(wait.poll());
        assert_eq!(response.unwrap(), Response::Written);
    }

    #[test]
    fn resolve_missing_is_noop() {
        let table = PendingTable::new();
        assert!(!table.resolve(&info_key("/nobody"), Response::Written));
    }

    #[test]
    fn resolve_is_exactly_once() {
        let table = PendingTable::new();
        let _pending = table.register(info_key("/a")).unwrap();
        assert!(table.resolve(&info_key("/a"), Response::Written));
        assert!(!table.resolve(&info_key("/a"), Response::Written));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let table = PendingTable::new();
        let _first = table.register(info_key("/a")).unwrap();
        let err = table.register(info_key("/a")).unwrap_err();
        assert!(matches!(err, OmniError::DuplicateRequest { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn dropping_waiter_frees_key() {
        let table = PendingTable::new();
        drop(table.register(info_key("/a")).unwrap());
        assert!(table.is_empty());
        assert!(table.register(info_key("/a")).is_ok());
    }

    #[test]
    fn stale_drop_does_not_remove_newer_waiter() {
        let table = PendingTable::new();
        let first = table.register(info_key("/a")).unwrap();
        assert!(table.resolve(&info_key("/a"), Response::Written));
        let _second = table.register(info_key("/a")).unwrap();
        drop(first);
        assert!(table.is_pending(&info_key("/a")));
    }

    #[tokio::test]
    async fn wait_times_out_and_frees_key() {
        let table = PendingTable::new();
        let pending = table.register(info_key("/slow")).unwrap();
        let err = pending
            .wait(Some(Duration::from_millis(10)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OmniError::RequestTimeout { .. }));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn wait_cancelled() {
        let table = PendingTable::new();
        let token = CancellationToken::new();
        let pending = table.register(info_key("/a")).unwrap();
        token.cancel();
        let err = pending.wait(None, Some(&token)).await.unwrap_err();
        assert!(matches!(err, OmniError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn fail_all_wakes_waiters() {
        let table = PendingTable::new();
        let a = table.register(info_key("/a")).unwrap();
        let b = table.register(info_key("/b")).unwrap();
        assert_eq!(table.fail_all(), 2);
        assert!(matches!(
            a.wait(None, None).await,
            Err(OmniError::ConnectionClosed(_))
        ));
        assert!(matches!(
            b.wait(None, None).await,
            Err(OmniError::ConnectionClosed(_))
        ));
    }
}
