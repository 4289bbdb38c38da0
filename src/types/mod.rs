//! Shared types for the bridge

pub mod error;

pub use error::{BridgeError, Result};
