//! Frame codec: fixed little-endian headers plus variable payloads.
//!
//! Every frame is `tag (1 byte) | payload`. One WebSocket binary message
//! carries exactly one frame, so there is no outer length prefix: decoding
//! is a pure function of the buffer and performs no I/O.

mod inbound;
mod outbound;

pub use inbound::Inbound;
pub use outbound::Outbound;

use bytes::Bytes;

use crate::error::ProtocolError;

/// Length of the `tag | u64 offset | u64 length` header shared by the
/// chunk frames.
pub const CHUNK_HEADER_LEN: usize = 17;

/// Length of the terminal resize frame.
pub const RESIZE_FRAME_LEN: usize = 9;

/// Split a frame into its tag byte and the payload after it.
pub(crate) fn split_tag(frame: &Bytes) -> Result<(u8, Bytes), ProtocolError> {
    match frame.first() {
        Some(&tag) => Ok((tag, frame.slice(1..))),
        None => Err(ProtocolError::Empty),
    }
}

/// Ensure `frame` holds at least `needed` bytes.
pub(crate) fn require(frame: &[u8], needed: usize, what: &'static str) -> Result<(), ProtocolError> {
    if frame.len() < needed {
        return Err(ProtocolError::Truncated {
            what,
            needed,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Read a little-endian `u64` at byte offset `at`.
pub(crate) fn read_u64(frame: &[u8], at: usize, what: &'static str) -> Result<u64, ProtocolError> {
    require(frame, at + 8, what)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&frame[at..at + 8]);
    Ok(u64::from_le_bytes(raw))
}

/// Read a little-endian `u16` at byte offset `at`.
pub(crate) fn read_u16(frame: &[u8], at: usize, what: &'static str) -> Result<u16, ProtocolError> {
    require(frame, at + 2, what)?;
    Ok(u16::from_le_bytes([frame[at], frame[at + 1]]))
}

/// Decode a UTF-8 path field.
pub(crate) fn read_path(bytes: &[u8], what: &'static str) -> Result<String, ProtocolError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8(what))
}

/// Split `frame[CHUNK_HEADER_LEN..]` into a path and a trailing `len`-byte
/// payload. The path length is implied by the explicit payload length.
pub(crate) fn split_chunk_body(
    frame: &Bytes,
    len: u64,
    what: &'static str,
) -> Result<(String, Bytes), ProtocolError> {
    let len = usize::try_from(len).map_err(|_| ProtocolError::Truncated {
        what,
        needed: usize::MAX,
        actual: frame.len(),
    })?;
    let needed = CHUNK_HEADER_LEN
        .checked_add(len)
        .ok_or(ProtocolError::Truncated {
            what,
            needed: usize::MAX,
            actual: frame.len(),
        })?;
    require(frame, needed, what)?;

    let data_since = frame.len() - len;
    let path = read_path(&frame[CHUNK_HEADER_LEN..data_since], what)?;
    Ok((path, frame.slice(data_since..)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_tag_empty() {
        assert_eq!(split_tag(&Bytes::new()), Err(ProtocolError::Empty));
    }

    #[test]
    fn read_u64_truncated() {
        let err = read_u64(&[0x10, 1, 2, 3], 1, "header").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Truncated {
                what: "header",
                needed: 9,
                actual: 4
            }
        );
    }

    #[test]
    fn split_chunk_body_path_is_implied() {
        let mut frame = vec![0x12];
        frame.extend_from_slice(&0u64.to_le_bytes());
        frame.extend_from_slice(&3u64.to_le_bytes());
        frame.extend_from_slice(b"/a/b");
        frame.extend_from_slice(b"xyz");
        let (path, data) = split_chunk_body(&Bytes::from(frame), 3, "chunk").unwrap();
        assert_eq!(path, "/a/b");
        assert_eq!(&data[..], b"xyz");
    }

    #[test]
    fn split_chunk_body_length_overrun() {
        let mut frame = vec![0x12];
        frame.extend_from_slice(&0u64.to_le_bytes());
        frame.extend_from_slice(&100u64.to_le_bytes());
        frame.extend_from_slice(b"short");
        assert!(matches!(
            split_chunk_body(&Bytes::from(frame), 100, "chunk"),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn read_path_rejects_invalid_utf8() {
        assert_eq!(
            read_path(&[0xff, 0xfe], "path"),
            Err(ProtocolError::InvalidUtf8("path"))
        );
    }
}
