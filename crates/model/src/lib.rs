//! Shared types for a race frame: sessions, frames, driver records, and the
//! pieces of session metadata that travel with a cached session artifact.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FRAME_HZ: f64 = 25.0;
pub const DT_S: f64 = 1.0 / FRAME_HZ;
pub const TICK_HZ: f64 = 60.0;
pub const RETIREMENT_THRESHOLD_S: f64 = 10.0;
pub const PRE_SERIALIZE_FRAME_LIMIT: usize = 50_000;
pub const READY_WAIT_TIMEOUT_S: f64 = 300.0;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Race,
    Sprint,
    Qualifying,
    SprintQualifying,
}

impl SessionKind {
    pub fn code(self) -> &'static str {
        match self {
            SessionKind::Race => "R",
            SessionKind::Sprint => "S",
            SessionKind::Qualifying => "Q",
            SessionKind::SprintQualifying => "SQ",
        }
    }

    pub fn is_qualifying(self) -> bool {
        matches!(self, SessionKind::Qualifying | SessionKind::SprintQualifying)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    pub year: u16,
    pub round: u8,
    pub kind: SessionKind,
}

impl SessionIdentity {
    pub fn session_id(&self) -> String {
        format!("{}_{}_{}", self.year, self.round, self.kind.code())
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum ReplayState {
    Init,
    Loading,
    Ready,
    Error,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum TrackStatusCode {
    Green,
    Yellow,
    SafetyCar,
    Vsc,
    Red,
}

impl TrackStatusCode {
    pub fn from_upstream(code: &str) -> Option<Self> {
        match code {
            "1" => Some(TrackStatusCode::Green),
            "2" => Some(TrackStatusCode::Yellow),
            "4" => Some(TrackStatusCode::SafetyCar),
            "6" => Some(TrackStatusCode::Vsc),
            "7" => Some(TrackStatusCode::Red),
            _ => None,
        }
    }

    /// Hysteresis threshold (seconds) applied to rank changes under this status.
    pub fn hysteresis_theta_s(self) -> f64 {
        match self {
            TrackStatusCode::SafetyCar | TrackStatusCode::Vsc | TrackStatusCode::Red => 0.3,
            TrackStatusCode::Green | TrackStatusCode::Yellow => 1.0,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackStatusInterval {
    pub status: TrackStatusCode,
    pub start_s: f64,
    pub end_s: f64,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum DriverStatus {
    Running,
    Retired,
    Finished,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub enum RainState {
    Dry,
    Raining,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct WeatherSnapshot {
    pub track_temp_c: Option<f64>,
    pub air_temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub rain_state: Option<RainState>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DriverFrameRecord {
    pub code: String,
    pub x: f64,
    pub y: f64,
    pub speed_kph: f64,
    pub gear: i8,
    pub lap: u32,
    pub position: u32,
    pub tyre: String,
    pub throttle: f64,
    pub brake: f64,
    pub drs: bool,
    pub dist_m: f64,
    pub rel_dist: f64,
    pub race_progress_m: f64,
    pub gap_to_previous_s: f64,
    pub gap_to_leader_s: f64,
    pub lap_time_s: Option<f64>,
    pub sector1_s: Option<f64>,
    pub sector2_s: Option<f64>,
    pub sector3_s: Option<f64>,
    pub status: DriverStatus,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Frame {
    pub t_s: f64,
    pub leader_lap: u32,
    pub track_status: Option<TrackStatusCode>,
    pub drivers: BTreeMap<String, DriverFrameRecord>,
    pub weather: Option<WeatherSnapshot>,
}

/// Replaces NaN and out-of-range magnitudes with a default, matching the wire
/// contract: every floating field that reaches a client is finite and within
/// [-1e308, 1e308].
pub fn sanitize_f64(value: f64, default: f64) -> f64 {
    if value.is_nan() || !(-1e308..=1e308).contains(&value) {
        default
    } else {
        value
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DriverInfo {
    pub code: String,
    pub number: u32,
    pub team: String,
    pub color_rgb: (u8, u8, u8),
}

/// Opaque pass-through bundle produced by the track-geometry collaborator.
/// Nothing in this workspace constructs one; it is only carried and re-served.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackGeometryBundle {
    pub centerline_x: Vec<f64>,
    pub centerline_y: Vec<f64>,
    pub inner_x: Vec<f64>,
    pub inner_y: Vec<f64>,
    pub outer_x: Vec<f64>,
    pub outer_y: Vec<f64>,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub sectors: Option<Vec<u8>>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DrsZone {
    pub zone_start_m: f64,
    pub zone_end_m: Option<f64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct QualifyingLapTelemetry {
    pub driver: String,
    pub segment: String,
    pub lap_time_s: f64,
    pub frames: Vec<QualifyingFrame>,
    pub drs_zones: Vec<DrsZone>,
    pub max_speed_kph: f64,
    pub min_speed_kph: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct QualifyingFrame {
    pub t_s: f64,
    pub x: f64,
    pub y: f64,
    pub dist_m: f64,
    pub rel_dist: f64,
    pub speed_kph: f64,
    pub throttle: f64,
    pub brake: f64,
    pub gear: i8,
    pub drs: bool,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct QualifyingResult {
    pub driver: String,
    pub color_rgb: (u8, u8, u8),
    pub q1_s: Option<f64>,
    pub q2_s: Option<f64>,
    pub q3_s: Option<f64>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct SessionMetadata {
    pub total_frames: usize,
    pub total_laps: u32,
    pub driver_numbers: BTreeMap<String, u32>,
    pub driver_teams: BTreeMap<String, String>,
    pub driver_colors: BTreeMap<String, (u8, u8, u8)>,
    pub track_geometry: Option<TrackGeometryBundle>,
    pub track_status: Vec<TrackStatusInterval>,
    pub race_start_time_s: Option<f64>,
    pub qualifying_results: Vec<QualifyingResult>,
    pub error: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RoundInfo {
    pub round_number: u8,
    pub event_name: String,
    pub has_sprint: bool,
}

/// A replay session's resident state. `frames` is populated once `state`
/// reaches `Ready`; it is never mutated afterward.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ReplaySession {
    pub identity: SessionIdentity,
    pub state: ReplayState,
    pub progress_pct: u8,
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub qualifying: Vec<QualifyingLapTelemetry>,
}

impl ReplaySession {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            state: ReplayState::Init,
            progress_pct: 0,
            metadata: SessionMetadata::default(),
            frames: Vec::new(),
            qualifying: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_format() {
        let id = SessionIdentity { year: 2024, round: 9, kind: SessionKind::Race };
        assert_eq!(id.session_id(), "2024_9_R");
    }

    #[test]
    fn sanitize_replaces_nan_and_huge() {
        assert_eq!(sanitize_f64(f64::NAN, 0.0), 0.0);
        assert_eq!(sanitize_f64(2e308, 0.0), 0.0);
        assert_eq!(sanitize_f64(-2e308, 0.0), 0.0);
        assert_eq!(sanitize_f64(12.5, 0.0), 12.5);
    }

    #[test]
    fn track_status_thresholds() {
        assert_eq!(TrackStatusCode::Green.hysteresis_theta_s(), 1.0);
        assert_eq!(TrackStatusCode::SafetyCar.hysteresis_theta_s(), 0.3);
        assert_eq!(TrackStatusCode::from_upstream("4"), Some(TrackStatusCode::SafetyCar));
        assert_eq!(TrackStatusCode::from_upstream("9"), None);
    }
}
