//! File transfer payloads: metadata, chunks, assembled downloads.
//!
//! # Wire Protocol
//!
//! ## Metadata
//! ```text
//! Client ──[0x11 FileQueryInfo]──────────────► Agent
//!   Payload: UTF-8 path
//!
//! Agent  ──[0x11 FileInfo]────────────────────► Client
//!   Payload: FileInfo (MessagePack map)
//! ```
//!
//! ## Chunked read
//! ```text
//! Client ──[0x12 FileRead]───────────────────► Agent
//!   Payload: i64 offset | u64 max_len (40960) | UTF-8 path
//!
//! Agent  ──[0x12 FileChunkRead]──────────────► Client
//!   Payload: u64 offset | u64 len | UTF-8 path | len bytes
//! ```
//!
//! ## Chunked write / truncate
//! ```text
//! Client ──[0x10 FileWriteOrTruncate]────────► Agent
//!   Payload: u64 offset | u64 len | UTF-8 path | len bytes
//!   (len == 0 truncates the file to `offset`)
//!
//! Agent  ──[0x10 FileWritten]────────────────► Client
//!   Payload: u64 offset | UTF-8 path
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Size of every chunk requested or sent by the transfer loops (40 KiB).
pub const CHUNK_SIZE: usize = 40960;

// ── FileInfo ─────────────────────────────────────────────────────

/// Remote file metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    /// Path exactly as queried.
    pub path: String,

    /// Size in bytes.
    pub size: u64,

    /// Last modification time as Unix timestamp (seconds).
    pub mtime: i64,

    /// Unix mode bits, when the agent reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,

    /// Any other fields the agent chose to send.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FileInfo {
    pub fn new(path: impl Into<String>, size: u64, mtime: i64) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
            mode: None,
            extra: BTreeMap::new(),
        }
    }

    /// Encode as a MessagePack map with named fields.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        rmp_serde::to_vec_named(self).map_err(|e| ProtocolError::Malformed {
            what: "file info",
            reason: e.to_string(),
        })
    }

    /// Decode from a MessagePack record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        rmp_serde::from_slice(bytes).map_err(|e| ProtocolError::Malformed {
            what: "file info",
            reason: e.to_string(),
        })
    }

    /// Modification time as a `SystemTime` (clamped at the epoch).
    pub fn modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.mtime.max(0) as u64)
    }
}

// ── Chunk ────────────────────────────────────────────────────────

/// A bounded slice of a file at a given offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset within the file.
    pub offset: u64,

    /// The bytes at `offset` (0..=CHUNK_SIZE long).
    pub data: Bytes,
}

impl Chunk {
    pub fn new(offset: u64, data: impl Into<Bytes>) -> Self {
        Self {
            offset,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the first byte after this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

// ── DownloadedFile ───────────────────────────────────────────────

/// The assembled result of a whole-file download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    /// Remote path.
    pub path: String,

    /// Remote modification time (Unix seconds).
    pub mtime: i64,

    /// Size the agent reported before the transfer began.
    pub expected_size: u64,

    /// The file contents.
    pub data: Vec<u8>,
}

impl DownloadedFile {
    /// Last path segment, or `"download"` when the path has none.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("download")
    }

    /// `false` when the agent stopped sending before `expected_size`.
    pub fn is_complete(&self) -> bool {
        self.data.len() as u64 >= self.expected_size
    }

    pub fn modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.mtime.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_info_msgpack_roundtrip() {
        let mut info = FileInfo::new("/etc/hostname", 9, 1_700_000_000);
        info.mode = Some(0o644);
        let bytes = info.to_bytes().unwrap();
        assert_eq!(FileInfo::from_bytes(&bytes).unwrap(), info);
    }

    #[test]
    fn file_info_keeps_unknown_fields() {
        #[derive(Serialize)]
        struct Wire {
            path: &'static str,
            size: i64,
            mtime: i64,
            owner: &'static str,
        }
        let bytes = rmp_serde::to_vec_named(&Wire {
            path: "/a",
            size: 3,
            mtime: 5,
            owner: "root",
        })
        .unwrap();

        let info = FileInfo::from_bytes(&bytes).unwrap();
        assert_eq!(info.size, 3);
        assert_eq!(info.mode, None);
        assert_eq!(info.extra.get("owner"), Some(&serde_json::json!("root")));
    }

    #[test]
    fn file_info_rejects_garbage() {
        assert!(matches!(
            FileInfo::from_bytes(&[0xc1]),
            Err(ProtocolError::Malformed { .. })
        ));
    }

    #[test]
    fn chunk_end() {
        let chunk = Chunk::new(100, vec![1, 2, 3]);
        assert_eq!(chunk.end(), 103);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn downloaded_file_name() {
        let mut file = DownloadedFile {
            path: "/var/log/syslog".into(),
            mtime: 0,
            expected_size: 0,
            data: Vec::new(),
        };
        assert_eq!(file.file_name(), "syslog");
        file.path = "/var/log/".into();
        assert_eq!(file.file_name(), "download");
    }

    #[test]
    fn downloaded_file_completeness() {
        let file = DownloadedFile {
            path: "a".into(),
            mtime: 0,
            expected_size: 4,
            data: vec![0; 2],
        };
        assert!(!file.is_complete());
    }
}
