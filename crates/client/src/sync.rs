//! State synchronizer: keeps [`DashboardState`] consistent with the remote
//! service.
//!
//! On construction it fires the one-shot snapshot fetch and starts dialing
//! the stream concurrently; neither blocks the other. Inbound events reduce
//! into the store on a single pump task, and action methods issue requests
//! whose observable effects arrive back over the stream.

use std::collections::HashMap;

use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use greenwave_shared::{
    ApiError, Approach, CameraConfig, RunRequest, RunResponse, StopResponse, UploadRequest,
    UploadResponse,
};

use crate::api_client::ApiClient;
use crate::state::DashboardState;
use crate::ws::{ReconnectPolicy, WsConnection, WsEvent, WsHandle, CLEAN_CLOSE_CODE};

/// Endpoint configuration for the synchronizer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Read endpoints from the environment.
    ///
    /// Environment variables:
    /// - `GREENWAVE_API_URL`: REST base URL (default: "http://localhost:8000")
    /// - `GREENWAVE_WS_URL`: stream endpoint (default: "ws://localhost:8000/ws")
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: std::env::var("GREENWAVE_API_URL")
                .unwrap_or(defaults.api_base_url),
            ws_url: std::env::var("GREENWAVE_WS_URL").unwrap_or(defaults.ws_url),
            reconnect: defaults.reconnect,
        }
    }
}

/// Composition root for the connection manager and the state reducer.
pub struct TrafficSync {
    state: DashboardState,
    api: ApiClient,
    connection: WsConnection,
    cancel: CancellationToken,
}

impl TrafficSync {
    /// Build the synchronizer and start it: the initial snapshot fetch and
    /// the stream connection proceed concurrently in background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: SyncConfig) -> Self {
        let state = DashboardState::new();
        let api = ApiClient::new(&config.api_base_url);
        let cancel = CancellationToken::new();

        let (events_tx, events_rx) = unbounded();
        let connection = WsConnection::new(config.ws_url, config.reconnect, events_tx);

        spawn_event_pump(state.clone(), events_rx, cancel.clone());
        spawn_initial_fetch(state.clone(), api.clone(), cancel.clone());
        connection.connect();

        Self {
            state,
            api,
            connection,
            cancel,
        }
    }

    /// The shared store consumers read from.
    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Observe the connected flag across reconnects.
    pub fn watch_connected(&self) -> tokio::sync::watch::Receiver<bool> {
        self.connection.watch_connected()
    }

    /// Handle for sending raw frames upstream.
    pub fn stream_handle(&self) -> WsHandle {
        self.connection.handle()
    }

    /// Redial after the reconnect policy has given up.
    pub fn reconnect(&self) {
        self.connection.connect();
    }

    /// Start the optimization model. Success here only means the request was
    /// accepted; `system_state`, `phase_update`, and `cycle_plan` messages
    /// carry the actual effects.
    pub async fn start_optimization(
        &self,
        configs: HashMap<Approach, CameraConfig>,
    ) -> Result<RunResponse, ApiError> {
        let _busy = BusyGuard::acquire(&self.state);
        self.state.clear_error();
        info!(approaches = configs.len(), "starting optimization");
        match self.api.run_optimization(&RunRequest { configs }).await {
            Ok(ack) => Ok(ack),
            Err(err) => {
                warn!(error = %err, "failed to start optimization");
                self.state.set_error(err.detail_message());
                Err(err)
            }
        }
    }

    /// Stop the optimization model.
    pub async fn stop_optimization(&self) -> Result<StopResponse, ApiError> {
        let _busy = BusyGuard::acquire(&self.state);
        self.state.clear_error();
        info!("stopping optimization");
        match self.api.stop_optimization().await {
            Ok(ack) => Ok(ack),
            Err(err) => {
                warn!(error = %err, "failed to stop optimization");
                self.state.set_error(err.detail_message());
                Err(err)
            }
        }
    }

    /// Register video sources per approach.
    pub async fn upload_videos(
        &self,
        sources: UploadRequest,
    ) -> Result<UploadResponse, ApiError> {
        let _busy = BusyGuard::acquire(&self.state);
        self.state.clear_error();
        info!("registering video sources");
        match self.api.upload_videos(&sources).await {
            Ok(ack) => Ok(ack),
            Err(err) => {
                warn!(error = %err, "failed to register video sources");
                self.state.set_error(err.detail_message());
                Err(err)
            }
        }
    }

    /// Tear everything down. After this, no pending callback or in-flight
    /// fetch may mutate the store, and the connection never redials.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.connection.disconnect();
    }
}

impl Drop for TrafficSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Fold one connection event into the store. Checked against the disposal
/// token so nothing queued behind a shutdown is observable.
fn apply_event(state: &DashboardState, cancel: &CancellationToken, event: WsEvent) {
    if cancel.is_cancelled() {
        return;
    }
    match event {
        WsEvent::Opened => state.clear_error(),
        WsEvent::Message(message) => state.apply(message),
        WsEvent::Closed { code } if code != CLEAN_CLOSE_CODE => {
            state.set_error("stream disconnected unexpectedly");
        }
        WsEvent::Closed { .. } => {}
        WsEvent::Error { message } => state.set_error(message),
    }
}

fn spawn_event_pump(
    state: DashboardState,
    mut events: UnboundedReceiver<WsEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.next() => match event {
                    Some(event) => apply_event(&state, &cancel, event),
                    None => break,
                }
            }
        }
    });
}

fn spawn_initial_fetch(state: DashboardState, api: ApiClient, cancel: CancellationToken) {
    tokio::spawn(async move {
        let _busy = BusyGuard::acquire(&state);
        info!("fetching initial system state");
        let result = api.get_state().await;
        if cancel.is_cancelled() {
            return;
        }
        match result {
            Ok(snapshot) => {
                info!(running = snapshot.running, "initial state received");
                state.replace_snapshot(snapshot);
            }
            Err(err) => {
                warn!(error = %err, "failed to fetch initial state");
                state.set_error(err.detail_message());
            }
        }
    });
}

/// Sets the busy flag for as long as it lives. Dropping on any exit path,
/// including a panic, clears the flag.
struct BusyGuard {
    state: DashboardState,
}

impl BusyGuard {
    fn acquire(state: &DashboardState) -> Self {
        state.set_busy(true);
        Self {
            state: state.clone(),
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.state.set_busy(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenwave_shared::{ServerMessage, SystemState};

    #[test]
    fn opened_clears_error() {
        let state = DashboardState::new();
        let cancel = CancellationToken::new();
        state.set_error("stream disconnected unexpectedly");

        apply_event(&state, &cancel, WsEvent::Opened);
        assert_eq!(state.error(), None);
    }

    #[test]
    fn abnormal_close_sets_error_and_clean_close_does_not() {
        let state = DashboardState::new();
        let cancel = CancellationToken::new();

        apply_event(&state, &cancel, WsEvent::Closed { code: 1006 });
        assert_eq!(
            state.error().as_deref(),
            Some("stream disconnected unexpectedly")
        );

        state.clear_error();
        apply_event(&state, &cancel, WsEvent::Closed { code: 1000 });
        assert_eq!(state.error(), None);
    }

    #[test]
    fn transport_error_is_surfaced_verbatim() {
        let state = DashboardState::new();
        let cancel = CancellationToken::new();

        apply_event(
            &state,
            &cancel,
            WsEvent::Error {
                message: "connection refused".to_string(),
            },
        );
        assert_eq!(state.error().as_deref(), Some("connection refused"));
    }

    #[test]
    fn first_snapshot_message_recovers_from_failed_fetch() {
        let state = DashboardState::new();
        let cancel = CancellationToken::new();
        // Initial fetch failed before any stream message arrived.
        state.set_error("network unreachable");

        apply_event(
            &state,
            &cancel,
            WsEvent::Message(ServerMessage::SystemState(SystemState {
                running: true,
                ..Default::default()
            })),
        );
        assert_eq!(state.error(), None);
        assert!(state.snapshot().running);
    }

    #[test]
    fn no_event_mutates_state_after_disposal() {
        let state = DashboardState::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        apply_event(
            &state,
            &cancel,
            WsEvent::Message(ServerMessage::SystemState(SystemState {
                running: true,
                ..Default::default()
            })),
        );
        apply_event(&state, &cancel, WsEvent::Closed { code: 1006 });
        apply_event(
            &state,
            &cancel,
            WsEvent::Error {
                message: "late error".to_string(),
            },
        );

        assert!(!state.snapshot().running);
        assert!(state.deltas().is_empty());
        assert_eq!(state.error(), None);
    }

    #[test]
    fn busy_guard_clears_on_every_exit_path() {
        let state = DashboardState::new();
        {
            let _busy = BusyGuard::acquire(&state);
            assert!(state.is_busy());
        }
        assert!(!state.is_busy());

        // Early-return path.
        fn early_return(state: &DashboardState) -> Result<(), ApiError> {
            let _busy = BusyGuard::acquire(state);
            Err(ApiError::Network("boom".to_string()))?;
            Ok(())
        }
        assert!(early_return(&state).is_err());
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn initial_fetch_failure_surfaces_error_and_releases_busy() {
        let state = DashboardState::new();
        // Nothing listens on the discard port, so the fetch fails fast.
        let api = ApiClient::new("http://127.0.0.1:9");
        spawn_initial_fetch(state.clone(), api, CancellationToken::new());

        for _ in 0..100 {
            if state.error().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(state.error().is_some());
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn event_pump_stops_at_shutdown() {
        let state = DashboardState::new();
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = unbounded();
        spawn_event_pump(state.clone(), events_rx, cancel.clone());

        events_tx
            .unbounded_send(WsEvent::Message(ServerMessage::SystemState(SystemState {
                running: true,
                ..Default::default()
            })))
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(state.snapshot().running);

        cancel.cancel();
        events_tx
            .unbounded_send(WsEvent::Error {
                message: "after shutdown".to_string(),
            })
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(state.error(), None);
    }

    #[test]
    fn config_defaults_point_at_local_service() {
        let config = SyncConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.ws_url, "ws://localhost:8000/ws");
        assert_eq!(config.reconnect.max_attempts, 10);
    }
}
