//! Streaming connection to the optimization service.
//!
//! This module owns the only real state machine in the client:
//! - at most one live socket at a time, with idempotent `connect`
//! - deterministic exponential backoff on abnormal closes
//! - cancellation-token teardown so nothing fires after `disconnect`
//!
//! Consumers do not register callbacks. Inbound frames and lifecycle changes
//! arrive as [`WsEvent`]s on a channel, and the connected flag is observable
//! through a `watch` receiver; the state synchronizer in [`crate::sync`]
//! folds the events into [`crate::state::DashboardState`].

mod connection;

pub use connection::{
    ConnectionPhase, ReconnectPolicy, WsConnection, WsEvent, WsHandle, ABNORMAL_CLOSE_CODE,
    CLEAN_CLOSE_CODE,
};
