//! Terminal channel: raw keystrokes out, raw output in.
//!
//! Outbound operations are fire-and-forget: they encode a frame and hand it
//! to the session. Output and lifecycle notices arrive as
//! [`TerminalEvent`](crate::protocol::TerminalEvent)s on the channel from
//! [`Session::take_terminal_events`].

use bytes::Bytes;
use tracing::debug;

use crate::codec::Outbound;
use crate::error::OmniError;
use crate::network::Session;
use crate::protocol::{TerminalOptions, TerminalSize};

/// Sends terminal frames over a borrowed [`Session`].
#[derive(Debug, Clone, Copy)]
pub struct Terminal<'a> {
    session: &'a Session,
}

impl<'a> Terminal<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Ask the agent to spawn a process attached to a pty.
    pub fn open(&self, options: &TerminalOptions) -> Result<(), OmniError> {
        debug!(cmd = %options.cmd, args = options.args.len(), "opening terminal");
        self.session.send(Outbound::TerminalOpen(options.clone()))
    }

    /// Send raw input bytes, unchunked.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<(), OmniError> {
        self.session.send(Outbound::TerminalWrite(data.into()))
    }

    pub fn resize(&self, size: TerminalSize) -> Result<(), OmniError> {
        debug!(cols = size.cols, rows = size.rows, "resizing terminal");
        self.session.send(Outbound::TerminalResize(size))
    }

    pub fn close(&self) -> Result<(), OmniError> {
        self.session.send(Outbound::TerminalClose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SessionConfig;

    #[test]
    fn operations_without_socket_are_noops() {
        let session = Session::new(SessionConfig::new("http://h", "a", "k"));
        let terminal = session.terminal();
        terminal.open(&TerminalOptions::default()).unwrap();
        terminal.write(&b"ls\r"[..]).unwrap();
        terminal.resize(TerminalSize::new(120, 40)).unwrap();
        terminal.close().unwrap();
        assert!(!session.is_open());
    }
}
