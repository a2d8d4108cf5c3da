//! Terminal payloads: open options, resize, inbound lifecycle events.
//!
//! # Wire Protocol
//!
//! ```text
//! Client ──[0x01 TerminalOpen]─────────────► Agent
//!   Payload: TerminalOptions (MessagePack map)
//!
//! Agent  ──[0x01 TerminalOpened]───────────► Client
//!
//! Client ──[0x00 TerminalWrite]────────────► Agent    (repeated)
//!   Payload: raw keystroke bytes
//!
//! Agent  ──[0x00 TerminalData]─────────────► Client   (repeated)
//!   Payload: raw output bytes
//!
//! Client ──[0x03 TerminalResize]───────────► Agent
//!   Payload: u16 cols | u16 rows | u16 0 | u16 0
//!
//! Client ──[0x02 TerminalClose]────────────► Agent
//! Agent  ──[0x02 TerminalClosed]───────────► Client
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// ── TerminalOptions ──────────────────────────────────────────────

/// Options record sent with `TerminalOpen`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerminalOptions {
    /// Program to run.
    pub cmd: String,

    /// Arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,

    /// `KEY=VALUE` entries, in order.
    #[serde(default)]
    pub env: Vec<String>,

    /// Start from the agent's own environment before applying `env`.
    #[serde(default = "default_inherit_env")]
    pub inherit_env: bool,
}

fn default_inherit_env() -> bool {
    true
}

impl TerminalOptions {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: Vec::new(),
            env: Vec::new(),
            inherit_env: true,
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a `KEY=VALUE` environment entry.
    pub fn with_env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Do not inherit the agent's environment.
    pub fn without_inherited_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Encode as a MessagePack map with named fields.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        rmp_serde::to_vec_named(self).map_err(|e| ProtocolError::Malformed {
            what: "terminal options",
            reason: e.to_string(),
        })
    }

    /// Decode from a MessagePack record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        rmp_serde::from_slice(bytes).map_err(|e| ProtocolError::Malformed {
            what: "terminal options",
            reason: e.to_string(),
        })
    }
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self::new("sh")
    }
}

// ── TerminalSize ─────────────────────────────────────────────────

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

// ── TerminalEvent ────────────────────────────────────────────────

/// Everything the display side of a session needs to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// The socket opened.
    Connected,
    /// Raw output bytes, to be written verbatim to the display.
    Output(Bytes),
    /// The remote terminal process started.
    Opened,
    /// The remote terminal process ended; the socket remains open.
    Closed,
    /// The socket closed.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults_applied_on_decode() {
        #[derive(Serialize)]
        struct OnlyCmd {
            cmd: &'static str,
        }
        let bytes = rmp_serde::to_vec_named(&OnlyCmd { cmd: "bash" }).unwrap();
        let opts = TerminalOptions::from_bytes(&bytes).unwrap();
        assert_eq!(opts.cmd, "bash");
        assert!(opts.args.is_empty());
        assert!(opts.env.is_empty());
        assert!(opts.inherit_env);
    }

    #[test]
    fn options_builder() {
        let opts = TerminalOptions::new("bash")
            .with_arg("-l")
            .with_env("TERM", "xterm-256color")
            .without_inherited_env();
        assert_eq!(opts.args, vec!["-l".to_string()]);
        assert_eq!(opts.env, vec!["TERM=xterm-256color".to_string()]);
        assert!(!opts.inherit_env);
    }

    #[test]
    fn options_encode_as_named_map() {
        let bytes = TerminalOptions::new("sh").to_bytes().unwrap();
        // fixmap with 4 entries
        assert_eq!(bytes[0], 0x84);
        let decoded: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded["cmd"], "sh");
        assert_eq!(decoded["inherit_env"], true);
    }

    #[test]
    fn default_size() {
        assert_eq!(TerminalSize::default(), TerminalSize::new(80, 24));
    }
}
