//! Shared JSON-RPC 2.0 types and the project data model.
//!
//! This crate contains no I/O or async code. It defines the message types
//! exchanged between IDE clients and the daemon, plus the file tree model
//! that the sync engine reconciles against remote repositories.

mod chat;
mod error;
mod jsonrpc;
mod project;

pub use chat::*;
pub use error::*;
pub use jsonrpc::*;
pub use project::*;
