//! Inbound message router.
//!
//! Every inbound frame goes through [`Router::dispatch`] on the session's
//! single reader task, strictly in arrival order. The decoded tag picks
//! exactly one destination:
//!
//! ```text
//! 0x00 TerminalData ─┐
//! 0x01 Opened        ├──► terminal event channel
//! 0x02 Closed       ─┘
//! 0x10 FileWritten  ─┐
//! 0x11 FileInfo      ├──► PendingTable::resolve(correlation key)
//! 0x12 FileChunk    ─┘
//! 0xFF Log ──────────────► tracing (target "omni::agent")
//! other ─────────────────► extension handlers, in registration order
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec::Inbound;
use crate::error::ProtocolError;
use crate::protocol::TerminalEvent;
use crate::state::{PendingTable, Response};

// ── ExtensionHandler ─────────────────────────────────────────────

/// Claims frames whose tag the core protocol does not know.
///
/// Return `true` to consume the frame; `false` passes it to the next
/// handler.
pub trait ExtensionHandler: Send + Sync {
    fn handle(&self, frame: &[u8]) -> bool;
}

impl<F> ExtensionHandler for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn handle(&self, frame: &[u8]) -> bool {
        self(frame)
    }
}

type Extensions = Arc<RwLock<Vec<Arc<dyn ExtensionHandler>>>>;

// ── Routed ───────────────────────────────────────────────────────

/// Where a frame ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Forwarded to the terminal event channel.
    Terminal,
    /// Emitted to the diagnostic log.
    Log,
    /// A pending request was resolved.
    Resolved,
    /// A response arrived with nobody waiting for it.
    Unclaimed,
    /// An extension handler consumed it.
    Extension,
    /// Malformed, or unknown and unclaimed.
    Dropped,
}

// ── Router ───────────────────────────────────────────────────────

/// Dispatches inbound frames. Cheap to clone.
#[derive(Clone)]
pub struct Router {
    agent_name: Arc<str>,
    pending: PendingTable,
    terminal_tx: mpsc::UnboundedSender<TerminalEvent>,
    extensions: Extensions,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("agent_name", &self.agent_name)
            .field("pending", &self.pending)
            .field("extensions", &self.extension_count())
            .finish()
    }
}

impl Router {
    pub fn new(
        agent_name: impl Into<Arc<str>>,
        pending: PendingTable,
        terminal_tx: mpsc::UnboundedSender<TerminalEvent>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            pending,
            terminal_tx,
            extensions: Arc::default(),
        }
    }

    /// Append a handler for unknown tags.
    pub fn add_extension_handler(&self, handler: impl ExtensionHandler + 'static) {
        self.extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    pub fn extension_count(&self) -> usize {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Route one inbound frame.
    pub fn dispatch(&self, frame: Bytes) -> Routed {
        let inbound = match Inbound::decode(frame.clone()) {
            Ok(inbound) => inbound,
            Err(ProtocolError::UnknownTag(tag)) => return self.offer_to_extensions(tag, &frame),
            Err(e) => {
                warn!(agent = %self.agent_name, "dropping inbound frame: {e}");
                return Routed::Dropped;
            }
        };

        let key = inbound.correlation_key();
        match inbound {
            Inbound::TerminalData(data) => self.to_terminal(TerminalEvent::Output(data)),
            Inbound::TerminalOpened => self.to_terminal(TerminalEvent::Opened),
            Inbound::TerminalClosed => self.to_terminal(TerminalEvent::Closed),
            Inbound::Log(text) => {
                info!(target: "omni::agent", agent = %self.agent_name, "{text}");
                Routed::Log
            }
            Inbound::FileWritten { .. } => self.resolve(key, Response::Written),
            Inbound::FileInfo(info) => self.resolve(key, Response::Info(info)),
            Inbound::FileChunk { chunk, .. } => self.resolve(key, Response::Chunk(chunk)),
        }
    }

    fn to_terminal(&self, event: TerminalEvent) -> Routed {
        // The display side may have gone away; output is then discarded.
        if self.terminal_tx.send(event).is_err() {
            debug!(agent = %self.agent_name, "terminal event with no listener");
        }
        Routed::Terminal
    }

    fn resolve(&self, key: Option<crate::state::CorrelationKey>, response: Response) -> Routed {
        match key {
            Some(key) if self.pending.resolve(&key, response) => Routed::Resolved,
            _ => Routed::Unclaimed,
        }
    }

    fn offer_to_extensions(&self, tag: u8, frame: &[u8]) -> Routed {
        // Snapshot first: a handler may register another handler.
        let handlers: Vec<_> = self
            .extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if handlers.iter().any(|h| h.handle(frame)) {
            return Routed::Extension;
        }
        debug!(agent = %self.agent_name, "dropping frame with unclaimed tag {tag:#04x}");
        Routed::Dropped
    }
}
