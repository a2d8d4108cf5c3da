pub mod connection;
mod pending;

pub use connection::ConnectionState;
pub use pending::{CorrelationKey, PendingRequest, PendingTable, Response};
