//! High-level payload definitions for omni services.
//!
//! Each sub-module defines the structured payloads for one protocol domain
//! (terminal, file transfer). Structured records are MessagePack
//! (`rmp-serde`, named fields); everything else is fixed little-endian
//! layout handled by [`codec`].
//!
//! [`codec`]: crate::codec

pub mod file;
pub mod terminal;

pub use file::{CHUNK_SIZE, Chunk, DownloadedFile, FileInfo};
pub use terminal::{TerminalEvent, TerminalOptions, TerminalSize};
