//! # omni-core
//!
//! Client library for the omni agent protocol: one WebSocket per agent,
//! carrying an interactive terminal and a chunked file-transfer protocol.
//!
//! This crate contains:
//! - **Message tags**: `SendTag`, `RecvTag`
//! - **Protocol payloads**: `FileInfo`, `Chunk`, `TerminalOptions`, `TerminalSize`
//! - **Codec**: `Outbound` / `Inbound` frame encoding and decoding
//! - **Network**: `Session` (connection manager) and the inbound `Router`
//! - **State**: `ConnectionState` and the correlated `PendingTable`
//! - **Terminal** / **Transfer**: high-level operations over a session
//! - **Error**: `OmniError` / `ProtocolError`, `thiserror`-based
//!
//! ```no_run
//! # async fn run() -> Result<(), omni_core::OmniError> {
//! use omni_core::{Session, SessionConfig};
//!
//! let session = Session::new(SessionConfig::new("https://console.example", "build-01", "key"));
//! session.connect().await?;
//! let file = session.files().download_file("/etc/hostname", |_| {}).await?;
//! println!("{} bytes", file.data.len());
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod network;
pub mod protocol;
pub mod state;
pub mod terminal;
pub mod transfer;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{Inbound, Outbound};
pub use error::{OmniError, ProtocolError};
pub use message::{RecvTag, SendTag};
pub use network::{ExtensionHandler, Routed, Router, Session, SessionConfig};
pub use protocol::{
    CHUNK_SIZE, Chunk, DownloadedFile, FileInfo, TerminalEvent, TerminalOptions, TerminalSize,
};
pub use state::{ConnectionState, CorrelationKey, PendingRequest, PendingTable, Response};
pub use terminal::Terminal;
pub use transfer::FileTransfer;
