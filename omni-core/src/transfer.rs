//! File transfer: metadata, chunked read, chunked write/truncate.
//!
//! Every request follows the same shape: register a correlation key in the
//! session's [`PendingTable`](crate::state::PendingTable), send the frame,
//! then wait for the router to resolve the key (or for the deadline or
//! cancellation token to fire).
//!
//! ```text
//! download_file(path)
//!   ├─ 0x11 query(path)            ──► getFileInfo:<path>
//!   └─ 0x12 read(path, 0)          ──► downloadChunk:<path>:0
//!      0x12 read(path, 40960)      ──► downloadChunk:<path>:40960
//!      ...                             until offset ≥ size or empty chunk
//!
//! upload_file(path, data)
//!   ├─ 0x10 write(path, len, [])   ──► uploadChunk:<len>:<path>   (truncate)
//!   └─ 0x10 write(path, 0, ..)     ──► uploadChunk:0:<path>
//!      ...                             sequential 40960-byte chunks
//! ```
//!
//! Whole-file loops are strictly sequential, so a single transfer never
//! holds two waiters on the same key.

use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::Outbound;
use crate::error::{OmniError, ProtocolError};
use crate::network::Session;
use crate::protocol::{CHUNK_SIZE, Chunk, DownloadedFile, FileInfo};
use crate::state::{CorrelationKey, Response};

/// Progress as a percentage in `0.0..=100.0`.
fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).min(100.0)
}

fn unexpected(key: &CorrelationKey, response: &Response) -> OmniError {
    ProtocolError::Malformed {
        what: "response",
        reason: format!("{key} resolved with {response:?}"),
    }
    .into()
}

/// File operations over a borrowed [`Session`].
#[derive(Debug, Clone)]
pub struct FileTransfer<'a> {
    session: &'a Session,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<'a> FileTransfer<'a> {
    /// No deadline and no cancellation: a silent agent stalls the caller.
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            timeout: None,
            cancel: None,
        }
    }

    /// Fail each request with [`OmniError::RequestTimeout`] after `after`.
    pub fn with_timeout(mut self, after: Duration) -> Self {
        self.timeout = Some(after);
        self
    }

    /// Fail outstanding requests with [`OmniError::Cancelled`] once
    /// `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    async fn request(&self, key: CorrelationKey, frame: Outbound) -> Result<Response, OmniError> {
        let bytes = frame.encode()?;
        if !self.session.is_open() {
            return Err(OmniError::NotConnected);
        }

        let pending = self.session.pending().register(key)?;
        debug!(key = %pending.key(), "request sent");
        if !self.session.send_raw(bytes) {
            return Err(OmniError::NotConnected);
        }
        pending.wait(self.timeout, self.cancel.as_ref()).await
    }

    // ── Single requests ──────────────────────────────────────────

    pub async fn get_file_info(&self, path: &str) -> Result<FileInfo, OmniError> {
        let key = CorrelationKey::FileInfo { path: path.into() };
        let frame = Outbound::FileQueryInfo { path: path.into() };
        match self.request(key.clone(), frame).await? {
            Response::Info(info) => Ok(info),
            other => Err(unexpected(&key, &other)),
        }
    }

    /// Read up to [`CHUNK_SIZE`] bytes at `offset`. An empty chunk means
    /// end of file.
    pub async fn download_chunk(&self, path: &str, offset: u64) -> Result<Chunk, OmniError> {
        let key = CorrelationKey::DownloadChunk {
            path: path.into(),
            offset,
        };
        match self.request(key.clone(), Outbound::file_read(path, offset)).await? {
            Response::Chunk(chunk) => Ok(chunk),
            other => Err(unexpected(&key, &other)),
        }
    }

    /// Write `data` at `offset`. Empty `data` truncates the remote file
    /// to `offset` bytes.
    pub async fn upload_chunk(
        &self,
        path: &str,
        offset: u64,
        data: impl Into<Bytes>,
    ) -> Result<(), OmniError> {
        let key = CorrelationKey::UploadChunk {
            path: path.into(),
            offset,
        };
        let frame = Outbound::FileWrite {
            path: path.into(),
            offset,
            data: data.into(),
        };
        match self.request(key.clone(), frame).await? {
            Response::Written => Ok(()),
            other => Err(unexpected(&key, &other)),
        }
    }

    // ── Whole files ──────────────────────────────────────────────

    /// Download `path` chunk by chunk.
    ///
    /// Stops once the reported size is reached or the agent returns an
    /// empty chunk. An early stop is logged and the partial data returned;
    /// check [`DownloadedFile::is_complete`].
    pub async fn download_file(
        &self,
        path: &str,
        mut on_progress: impl FnMut(f64),
    ) -> Result<DownloadedFile, OmniError> {
        let info = self.get_file_info(path).await?;
        info!(path, size = info.size, "download started");

        let mut data = Vec::with_capacity(info.size.min(64 * CHUNK_SIZE as u64) as usize);
        let mut offset = 0u64;
        on_progress(0.0);

        while offset < info.size {
            let chunk = self.download_chunk(path, offset).await?;
            if chunk.is_empty() {
                let early = OmniError::TransferInconsistency {
                    path: path.into(),
                    expected: info.size,
                    received: offset,
                };
                warn!("{early}");
                break;
            }
            offset += chunk.len() as u64;
            data.extend_from_slice(&chunk.data);
            on_progress(percent(offset, info.size));
        }
        if info.size == 0 {
            on_progress(100.0);
        }

        info!(path, bytes = data.len(), "download finished");
        Ok(DownloadedFile {
            path: path.into(),
            mtime: info.mtime,
            expected_size: info.size,
            data,
        })
    }

    /// Upload `data` to `path`, replacing its contents.
    ///
    /// The remote file is first truncated to the final length, then
    /// written in sequential [`CHUNK_SIZE`] pieces.
    pub async fn upload_file(
        &self,
        path: &str,
        data: impl Into<Bytes>,
        mut on_progress: impl FnMut(f64),
    ) -> Result<(), OmniError> {
        let data = data.into();
        let total = data.len() as u64;
        info!(path, size = total, "upload started");

        self.upload_chunk(path, total, Bytes::new()).await?;
        on_progress(0.0);

        let mut offset = 0usize;
        while offset < data.len() {
            let end = (offset + CHUNK_SIZE).min(data.len());
            self.upload_chunk(path, offset as u64, data.slice(offset..end))
                .await?;
            offset = end;
            on_progress(percent(offset as u64, total));
        }
        if total == 0 {
            on_progress(100.0);
        }

        info!(path, "upload finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SessionConfig;

    #[test]
    fn percent_is_clamped() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(0, 10), 0.0);
        assert_eq!(percent(5, 10), 50.0);
        assert_eq!(percent(15, 10), 100.0);
    }

    #[tokio::test]
    async fn requests_fail_fast_when_idle() {
        let session = Session::new(SessionConfig::new("http://h", "a", "k"));
        let files = session.files().with_timeout(Duration::from_secs(5));

        assert!(matches!(
            files.get_file_info("/etc/hostname").await,
            Err(OmniError::NotConnected)
        ));
        assert!(matches!(
            files.download_chunk("/a", 0).await,
            Err(OmniError::NotConnected)
        ));
        assert!(matches!(
            files.upload_chunk("/a", 3, Bytes::new()).await,
            Err(OmniError::NotConnected)
        ));
        assert!(session.pending().is_empty());
    }

    #[tokio::test]
    async fn oversized_chunk_is_rejected_before_sending() {
        let session = Session::new(SessionConfig::new("http://h", "a", "k"));
        let err = session
            .files()
            .upload_chunk("/a", 0, vec![0u8; CHUNK_SIZE + 1])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OmniError::Protocol(ProtocolError::ChunkTooLarge { .. })
        ));
    }
}
