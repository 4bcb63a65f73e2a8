//! ZRP Node Library
//!
//! Runs a zone routing device over a transport

pub mod config;
pub mod error;
pub mod node;

pub use error::{NodeError, Result};
pub use node::{Inbox, Node, NodeHandle};
