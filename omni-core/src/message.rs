//! Message tags: the first byte of every frame.
//!
//! Outbound (client → agent) and inbound (agent → client) tags live in
//! independent namespaces that happen to share numeric values. Uses proper
//! enums with `TryFrom`; unknown values are errors, never panics.

use std::fmt;

use crate::error::ProtocolError;

// ── SendTag ──────────────────────────────────────────────────────

/// Tags understood by the agent.
///
/// Organized by category:
/// - `0x00..0x0F`: Terminal
/// - `0x10..0x1F`: File transfer
/// - `0xFF`: Log
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendTag {
    // ── Terminal (0x0x) ──────────────────────────────────────────
    /// Raw keystroke bytes.
    TerminalWrite = 0x00,
    /// Open a terminal with a MessagePack options record.
    TerminalOpen = 0x01,
    /// Close the terminal.
    TerminalClose = 0x02,
    /// Resize the terminal.
    TerminalResize = 0x03,

    // ── File (0x1x) ──────────────────────────────────────────────
    /// Write a chunk, or truncate when the chunk is empty.
    FileWriteOrTruncate = 0x10,
    /// Query file metadata.
    FileQueryInfo = 0x11,
    /// Read a chunk.
    FileRead = 0x12,

    /// Free-form UTF-8 diagnostic text.
    Log = 0xFF,
}

impl TryFrom<u8> for SendTag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SendTag::TerminalWrite),
            0x01 => Ok(SendTag::TerminalOpen),
            0x02 => Ok(SendTag::TerminalClose),
            0x03 => Ok(SendTag::TerminalResize),

            0x10 => Ok(SendTag::FileWriteOrTruncate),
            0x11 => Ok(SendTag::FileQueryInfo),
            0x12 => Ok(SendTag::FileRead),

            0xFF => Ok(SendTag::Log),

            _ => Err(ProtocolError::UnknownTag(value)),
        }
    }
}

impl fmt::Display for SendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── RecvTag ──────────────────────────────────────────────────────

/// Tags emitted by the agent.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecvTag {
    // ── Terminal (0x0x) ──────────────────────────────────────────
    /// Raw terminal output.
    TerminalData = 0x00,
    /// The terminal process started.
    TerminalOpened = 0x01,
    /// The terminal process exited; the socket stays up.
    TerminalClosed = 0x02,

    // ── File (0x1x) ──────────────────────────────────────────────
    /// A chunk write (or truncate) completed.
    FileWritten = 0x10,
    /// File metadata record.
    FileInfo = 0x11,
    /// A chunk of file data.
    FileChunkRead = 0x12,

    /// Free-form UTF-8 diagnostic text.
    Log = 0xFF,
}

impl TryFrom<u8> for RecvTag {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(RecvTag::TerminalData),
            0x01 => Ok(RecvTag::TerminalOpened),
            0x02 => Ok(RecvTag::TerminalClosed),

            0x10 => Ok(RecvTag::FileWritten),
            0x11 => Ok(RecvTag::FileInfo),
            0x12 => Ok(RecvTag::FileChunkRead),

            0xFF => Ok(RecvTag::Log),

            _ => Err(ProtocolError::UnknownTag(value)),
        }
    }
}

impl fmt::Display for RecvTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl RecvTag {
    /// Returns `true` if frames with this tag answer a pending request.
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            RecvTag::FileWritten | RecvTag::FileInfo | RecvTag::FileChunkRead
        )
    }
}
