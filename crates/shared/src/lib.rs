//! Shared types for the greenwave dashboard client.
//!
//! Domain models, the WebSocket wire protocol, and the API error taxonomy
//! used by both the streaming and request layers.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
