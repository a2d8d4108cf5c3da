//! Socket ownership and inbound dispatch.

mod router;
mod session;

pub use router::{ExtensionHandler, Routed, Router};
pub use session::{Session, SessionConfig};
