//! Agent → client frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::{CHUNK_HEADER_LEN, read_path, read_u64, split_chunk_body, split_tag};
use crate::error::ProtocolError;
use crate::message::RecvTag;
use crate::protocol::{Chunk, FileInfo};
use crate::state::CorrelationKey;

/// A frame received from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Raw terminal output.
    TerminalData(Bytes),
    /// The terminal started.
    TerminalOpened,
    /// The terminal ended.
    TerminalClosed,
    /// A write or truncate at `offset` on `path` completed.
    FileWritten { offset: u64, path: String },
    /// Metadata for a queried path.
    FileInfo(FileInfo),
    /// Bytes read from `path`.
    FileChunk { path: String, chunk: Chunk },
    /// Diagnostic text.
    Log(String),
}

impl Inbound {
    pub fn tag(&self) -> RecvTag {
        match self {
            Self::TerminalData(_) => RecvTag::TerminalData,
            Self::TerminalOpened => RecvTag::TerminalOpened,
            Self::TerminalClosed => RecvTag::TerminalClosed,
            Self::FileWritten { .. } => RecvTag::FileWritten,
            Self::FileInfo(_) => RecvTag::FileInfo,
            Self::FileChunk { .. } => RecvTag::FileChunkRead,
            Self::Log(_) => RecvTag::Log,
        }
    }

    /// The pending request this frame answers, if any.
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        match self {
            Self::FileWritten { offset, path } => Some(CorrelationKey::UploadChunk {
                path: path.clone(),
                offset: *offset,
            }),
            Self::FileInfo(info) => Some(CorrelationKey::FileInfo {
                path: info.path.clone(),
            }),
            Self::FileChunk { path, chunk } => Some(CorrelationKey::DownloadChunk {
                path: path.clone(),
                offset: chunk.offset,
            }),
            _ => None,
        }
    }

    /// Parse one inbound frame.
    ///
    /// Unknown tags yield [`ProtocolError::UnknownTag`] so the router can
    /// offer the frame to extension handlers.
    pub fn decode(frame: Bytes) -> Result<Self, ProtocolError> {
        let (tag, payload) = split_tag(&frame)?;
        match RecvTag::try_from(tag)? {
            RecvTag::TerminalData => Ok(Self::TerminalData(payload)),
            RecvTag::TerminalOpened => Ok(Self::TerminalOpened),
            RecvTag::TerminalClosed => Ok(Self::TerminalClosed),
            RecvTag::FileWritten => Ok(Self::FileWritten {
                offset: read_u64(&frame, 1, "file written")?,
                path: read_path(&frame[9..], "file written path")?,
            }),
            RecvTag::FileInfo => Ok(Self::FileInfo(FileInfo::from_bytes(&payload)?)),
            RecvTag::FileChunkRead => {
                let offset = read_u64(&frame, 1, "file chunk")?;
                let len = read_u64(&frame, 9, "file chunk")?;
                let (path, data) = split_chunk_body(&frame, len, "file chunk")?;
                Ok(Self::FileChunk {
                    path,
                    chunk: Chunk { offset, data },
                })
            }
            RecvTag::Log => Ok(Self::Log(String::from_utf8_lossy(&payload).into_owned())),
        }
    }

    /// Serialize as the agent would.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let tag = self.tag() as u8;
        let frame = match self {
            Self::TerminalData(data) => {
                let mut buf = BytesMut::with_capacity(1 + data.len());
                buf.put_u8(tag);
                buf.put_slice(data);
                buf
            }
            Self::TerminalOpened | Self::TerminalClosed => BytesMut::from(&[tag][..]),
            Self::FileWritten { offset, path } => {
                let mut buf = BytesMut::with_capacity(9 + path.len());
                buf.put_u8(tag);
                buf.put_u64_le(*offset);
                buf.put_slice(path.as_bytes());
                buf
            }
            Self::FileInfo(info) => {
                let record = info.to_bytes()?;
                let mut buf = BytesMut::with_capacity(1 + record.len());
                buf.put_u8(tag);
                buf.put_slice(&record);
                buf
            }
            Self::FileChunk { path, chunk } => {
                let mut buf =
                    BytesMut::with_capacity(CHUNK_HEADER_LEN + path.len() + chunk.data.len());
                buf.put_u8(tag);
                buf.put_u64_le(chunk.offset);
                buf.put_u64_le(chunk.data.len() as u64);
                buf.put_slice(path.as_bytes());
                buf.put_slice(&chunk.data);
                buf
            }
            Self::Log(text) => {
                let mut buf = BytesMut::with_capacity(1 + text.len());
                buf.put_u8(tag);
                buf.put_slice(text.as_bytes());
                buf
            }
        };
        Ok(frame.freeze())
    }
}
