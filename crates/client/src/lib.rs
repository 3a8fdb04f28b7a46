//! Greenwave dashboard client core.
//!
//! Keeps a local snapshot of the traffic-signal optimization service
//! consistent over an unreliable streaming connection: a reconnecting
//! WebSocket connection manager ([`ws`]), a shared state container
//! ([`state`]), and the synchronizer that ties them to the REST layer
//! ([`sync`]).

pub mod api_client;
pub mod logging;
pub mod state;
pub mod sync;
pub mod ws;

pub use api_client::ApiClient;
pub use state::DashboardState;
pub use sync::{SyncConfig, TrafficSync};
pub use ws::{ConnectionPhase, ReconnectPolicy, WsConnection, WsEvent, WsHandle};
