//! Domain models for the traffic-signal optimization service.
//!
//! Field names follow the service's wire format (snake_case JSON), so these
//! types round-trip through both the REST endpoints and the stream frames.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One leg of the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approach {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Motorcycle,
    Bus,
    Truck,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Region of interest inside a camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub points: Vec<Point>,
}

/// The line vehicles must cross to be counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountingLine {
    pub start: Point,
    pub end: Point,
}

/// Per-approach camera setup sent with a run request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub approach: Approach,
    pub roi: Roi,
    pub counting_line: CountingLine,
    /// Video file path or stream URL.
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VehicleCounts {
    pub car: u32,
    pub motorcycle: u32,
    pub bus: u32,
    pub truck: u32,
    pub total: u32,
}

/// Current vehicle counts for one approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveCount {
    pub approach: Approach,
    pub vehicles: VehicleCounts,
    pub total: u32,
}

/// Green/yellow/red durations for one approach within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPhase {
    pub approach: Approach,
    pub green: u32,
    pub yellow: u32,
    pub red: u32,
}

/// The full timing schedule for one signal cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclePlan {
    pub cycle_seconds: u32,
    pub phases: Vec<SignalPhase>,
    pub version: u32,
}

/// One green-time adjustment produced by the optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationDelta {
    pub approach: Approach,
    pub prev_green: u32,
    pub new_green: u32,
    pub delta: i32,
}

/// The complete client-side view of remote system state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_plan: Option<CyclePlan>,
    #[serde(default)]
    pub live_counts: Vec<LiveCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_active: Option<Approach>,
    #[serde(default)]
    pub remaining_seconds: u32,
}

// --- Request/response shapes for the REST endpoints ---

/// Body for `POST /api/run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub configs: HashMap<Approach, CameraConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    pub message: String,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approaches_configured: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopResponse {
    pub message: String,
    pub running: bool,
}

/// Body for `POST /api/upload`: one video path or stream URL per approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub north: String,
    pub south: String,
    pub east: String,
    pub west: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(default)]
    pub configs: HashMap<Approach, CameraConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub cycle_plan: Option<CyclePlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub running: bool,
}
