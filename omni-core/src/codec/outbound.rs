//! Client → agent frames.

use bytes::{BufMut, Bytes, BytesMut};

use super::{CHUNK_HEADER_LEN, RESIZE_FRAME_LEN, read_path, read_u16, read_u64, require, split_chunk_body, split_tag};
use crate::error::ProtocolError;
use crate::message::SendTag;
use crate::protocol::{CHUNK_SIZE, TerminalOptions, TerminalSize};

/// A frame sent to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Raw keystrokes for the terminal.
    TerminalWrite(Bytes),
    /// Start the terminal.
    TerminalOpen(TerminalOptions),
    /// Stop the terminal.
    TerminalClose,
    /// Change the terminal dimensions.
    TerminalResize(TerminalSize),
    /// Write `data` at `offset`; an empty `data` truncates to `offset`.
    FileWrite {
        path: String,
        offset: u64,
        data: Bytes,
    },
    /// Ask for a `FileInfo` record.
    FileQueryInfo { path: String },
    /// Read up to `max_len` bytes at `offset`.
    FileRead {
        path: String,
        offset: u64,
        max_len: u64,
    },
    /// Diagnostic text.
    Log(String),
}

impl Outbound {
    /// A chunk read of the standard transfer size.
    pub fn file_read(path: impl Into<String>, offset: u64) -> Self {
        Self::FileRead {
            path: path.into(),
            offset,
            max_len: CHUNK_SIZE as u64,
        }
    }

    pub fn tag(&self) -> SendTag {
        match self {
            Self::TerminalWrite(_) => SendTag::TerminalWrite,
            Self::TerminalOpen(_) => SendTag::TerminalOpen,
            Self::TerminalClose => SendTag::TerminalClose,
            Self::TerminalResize(_) => SendTag::TerminalResize,
            Self::FileWrite { .. } => SendTag::FileWriteOrTruncate,
            Self::FileQueryInfo { .. } => SendTag::FileQueryInfo,
            Self::FileRead { .. } => SendTag::FileRead,
            Self::Log(_) => SendTag::Log,
        }
    }

    /// Serialize to the exact wire bytes.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let tag = self.tag() as u8;
        let frame = match self {
            Self::TerminalWrite(data) => {
                let mut buf = BytesMut::with_capacity(1 + data.len());
                buf.put_u8(tag);
                buf.put_slice(data);
                buf
            }
            Self::TerminalOpen(options) => {
                let record = options.to_bytes()?;
                let mut buf = BytesMut::with_capacity(1 + record.len());
                buf.put_u8(tag);
                buf.put_slice(&record);
                buf
            }
            Self::TerminalClose => BytesMut::from(&[tag][..]),
            Self::TerminalResize(size) => {
                let mut buf = BytesMut::with_capacity(RESIZE_FRAME_LEN);
                buf.put_u8(tag);
                buf.put_u16_le(size.cols);
                buf.put_u16_le(size.rows);
                // pixel width / height, unused
                buf.put_u16_le(0);
                buf.put_u16_le(0);
                buf
            }
            Self::FileWrite { path, offset, data } => {
                if data.len() > CHUNK_SIZE {
                    return Err(ProtocolError::ChunkTooLarge {
                        size: data.len(),
                        max: CHUNK_SIZE,
                    });
                }
                let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + path.len() + data.len());
                buf.put_u8(tag);
                buf.put_u64_le(*offset);
                buf.put_u64_le(data.len() as u64);
                buf.put_slice(path.as_bytes());
                buf.put_slice(data);
                buf
            }
            Self::FileQueryInfo { path } => {
                let mut buf = BytesMut::with_capacity(1 + path.len());
                buf.put_u8(tag);
                buf.put_slice(path.as_bytes());
                buf
            }
            Self::FileRead {
                path,
                offset,
                max_len,
            } => {
                let offset = i64::try_from(*offset).map_err(|e| ProtocolError::Malformed {
                    what: "read offset",
                    reason: e.to_string(),
                })?;
                let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + path.len());
                buf.put_u8(tag);
                buf.put_i64_le(offset);
                buf.put_u64_le(*max_len);
                buf.put_slice(path.as_bytes());
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

    /// Parse a frame as the agent would see it.
    pub fn decode(frame: Bytes) -> Result<Self, ProtocolError> {
        let (tag, payload) = split_tag(&frame)?;
        match SendTag::try_from(tag)? {
            SendTag::TerminalWrite => Ok(Self::TerminalWrite(payload)),
            SendTag::TerminalOpen => Ok(Self::TerminalOpen(TerminalOptions::from_bytes(&payload)?)),
            SendTag::TerminalClose => Ok(Self::TerminalClose),
            SendTag::TerminalResize => Ok(Self::TerminalResize(TerminalSize {
                cols: read_u16(&frame, 1, "terminal resize")?,
                rows: read_u16(&frame, 3, "terminal resize")?,
            })),
            SendTag::FileWriteOrTruncate => {
                let offset = read_u64(&frame, 1, "file write")?;
                let len = read_u64(&frame, 9, "file write")?;
                let (path, data) = split_chunk_body(&frame, len, "file write")?;
                Ok(Self::FileWrite { path, offset, data })
            }
            SendTag::FileQueryInfo => Ok(Self::FileQueryInfo {
                path: read_path(&payload, "file query path")?,
            }),
            SendTag::FileRead => {
                require(&frame, CHUNK_HEADER_LEN, "file read")?;
                let offset = read_u64(&frame, 1, "file read")? as i64;
                let offset = u64::try_from(offset).map_err(|e| ProtocolError::Malformed {
                    what: "read offset",
                    reason: e.to_string(),
                })?;
                Ok(Self::FileRead {
                    offset,
                    max_len: read_u64(&frame, 9, "file read")?,
                    path: read_path(&frame[CHUNK_HEADER_LEN..], "file read path")?,
                })
            }
            SendTag::Log => Ok(Self::Log(String::from_utf8_lossy(&payload).into_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_layout() {
        let frame = Outbound::TerminalResize(TerminalSize::new(120, 40))
            .encode()
            .unwrap();
        assert_eq!(frame.len(), RESIZE_FRAME_LEN);
        assert_eq!(frame[0], 0x03);
        assert_eq!(u16::from_le_bytes([frame[1], frame[2]]), 120);
        assert_eq!(u16::from_le_bytes([frame[3], frame[4]]), 40);
        assert_eq!(&frame[5..], &[0, 0, 0, 0]);
    }

    #[test]
    fn resize_roundtrip() {
        let frame = Outbound::TerminalResize(TerminalSize::new(120, 40))
            .encode()
            .unwrap();
        assert_eq!(
            Outbound::decode(frame).unwrap(),
            Outbound::TerminalResize(TerminalSize { cols: 120, rows: 40 })
        );
    }

    #[test]
    fn file_write_layout() {
        let frame = Outbound::FileWrite {
            path: "/tmp/x".into(),
            offset: 81920,
            data: Bytes::from_static(b"hello"),
        }
        .encode()
        .unwrap();

        assert_eq!(frame[0], 0x10);
        assert_eq!(u64::from_le_bytes(frame[1..9].try_into().unwrap()), 81920);
        assert_eq!(u64::from_le_bytes(frame[9..17].try_into().unwrap()), 5);
        assert_eq!(&frame[17..23], b"/tmp/x");
        assert_eq!(&frame[23..], b"hello");
    }

    #[test]
    fn file_write_roundtrip_at_size_limits() {
        for len in [0usize, 1, 4096, CHUNK_SIZE] {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let original = Outbound::FileWrite {
                path: "/srv/ünïcode path".into(),
                offset: 7 * CHUNK_SIZE as u64,
                data: Bytes::from(data),
            };
            let decoded = Outbound::decode(original.encode().unwrap()).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn file_write_rejects_oversized_chunk() {
        let err = Outbound::FileWrite {
            path: "a".into(),
            offset: 0,
            data: Bytes::from(vec![0; CHUNK_SIZE + 1]),
        }
        .encode()
        .unwrap_err();
        assert!(matches!(err, ProtocolError::ChunkTooLarge { .. }));
    }

    #[test]
    fn truncate_is_header_plus_path() {
        let frame = Outbound::FileWrite {
            path: "/f".into(),
            offset: 10,
            data: Bytes::new(),
        }
        .encode()
        .unwrap();
        assert_eq!(frame.len(), CHUNK_HEADER_LEN + 2);
        assert_eq!(u64::from_le_bytes(frame[9..17].try_into().unwrap()), 0);
    }

    #[test]
    fn file_read_layout() {
        let frame = Outbound::file_read("/etc/hostname", 40960).encode().unwrap();
        assert_eq!(frame[0], 0x12);
        assert_eq!(i64::from_le_bytes(frame[1..9].try_into().unwrap()), 40960);
        assert_eq!(
            u64::from_le_bytes(frame[9..17].try_into().unwrap()),
            CHUNK_SIZE as u64
        );
        assert_eq!(&frame[17..], b"/etc/hostname");
    }

    #[test]
    fn query_info_is_tag_plus_path() {
        let frame = Outbound::FileQueryInfo {
            path: "/etc/hostname".into(),
        }
        .encode()
        .unwrap();
        assert_eq!(&frame[..], b"\x11/etc/hostname");
    }

    #[test]
    fn terminal_frames() {
        let write = Outbound::TerminalWrite(Bytes::from_static(b"ls\r")).encode().unwrap();
        assert_eq!(&write[..], b"\x00ls\r");

        let close = Outbound::TerminalClose.encode().unwrap();
        assert_eq!(&close[..], &[0x02]);

        let open = Outbound::TerminalOpen(TerminalOptions::new("bash")).encode().unwrap();
        assert_eq!(open[0], 0x01);
        assert_eq!(
            Outbound::decode(open).unwrap(),
            Outbound::TerminalOpen(TerminalOptions::new("bash"))
        );
    }

    #[test]
    fn decode_truncated_resize() {
        assert!(matches!(
            Outbound::decode(Bytes::from_static(&[0x03, 0x50])),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
