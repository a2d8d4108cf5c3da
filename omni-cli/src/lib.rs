//! # omni-cli
//!
//! Operator front-end for omni agents. Connects to one agent per
//! invocation and runs an interactive shell or a single file operation.

pub mod config;
pub mod files;
pub mod shell;
