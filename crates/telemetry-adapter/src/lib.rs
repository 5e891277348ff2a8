//! The upstream telemetry/timing data source, modeled as a trait.
//!
//! The real data source (an FIA-timing + per-lap-telemetry library) lives
//! outside this workspace. Everything here is the narrow seam the rest of
//! the system uses to talk to it, plus an in-memory fixture for tests.

use async_trait::async_trait;
use model::{DriverInfo, RoundInfo, SessionIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub time_s: f64,
    pub x: f64,
    pub y: f64,
    pub distance_m: f64,
    pub rel_distance: f64,
    pub speed_kph: f64,
    pub gear: i8,
    pub drs: bool,
    pub throttle: f64,
    pub brake: f64,
    pub rpm: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DriverLapRaw {
    pub lap_number: u32,
    pub compound: String,
    pub finishing_position: Option<u32>,
    pub lap_time_s: Option<f64>,
    pub sector1_s: Option<f64>,
    pub sector2_s: Option<f64>,
    pub sector3_s: Option<f64>,
    pub telemetry: Vec<TelemetrySample>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimingRow {
    pub time_s: f64,
    pub driver: String,
    pub position: Option<u32>,
    pub gap_to_leader_s: Option<f64>,
    pub interval_to_ahead_s: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrackStatusRow {
    pub time_s: f64,
    pub status_code: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WeatherRow {
    pub time_s: f64,
    pub track_temp_c: Option<f64>,
    pub air_temp_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub rainfall: bool,
}

/// One driver's fastest lap in one qualifying segment (Q1/Q2/Q3 or the
/// sprint-qualifying equivalents).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QualifyingSegmentLap {
    pub segment: String,
    pub lap_time_s: f64,
    pub telemetry: Vec<TelemetrySample>,
}

#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    async fn list_rounds(&self, year: u16) -> Result<Vec<RoundInfo>, AdapterError>;
    async fn list_drivers(&self, identity: &SessionIdentity) -> Result<Vec<DriverInfo>, AdapterError>;
    async fn get_per_driver_laps(
        &self,
        identity: &SessionIdentity,
        driver: &str,
    ) -> Result<Vec<DriverLapRaw>, AdapterError>;
    async fn get_stream_timing(&self, identity: &SessionIdentity) -> Result<Vec<TimingRow>, AdapterError>;
    async fn get_track_status(&self, identity: &SessionIdentity) -> Result<Vec<TrackStatusRow>, AdapterError>;
    async fn get_weather(&self, identity: &SessionIdentity) -> Result<Vec<WeatherRow>, AdapterError>;
    async fn get_qualifying_laps(
        &self,
        identity: &SessionIdentity,
        driver: &str,
    ) -> Result<Vec<QualifyingSegmentLap>, AdapterError>;
}

/// In-memory stand-in for the upstream library, used by tests and by the
/// pipeline's own doctests. Data is registered up front; nothing is fetched
/// over the network.
#[derive(Default)]
pub struct FixtureAdapter {
    pub rounds: HashMap<u16, Vec<RoundInfo>>,
    pub drivers: HashMap<String, Vec<DriverInfo>>,
    pub laps: HashMap<(String, String), Vec<DriverLapRaw>>,
    pub timing: HashMap<String, Vec<TimingRow>>,
    pub track_status: HashMap<String, Vec<TrackStatusRow>>,
    pub weather: HashMap<String, Vec<WeatherRow>>,
    pub qualifying_laps: HashMap<(String, String), Vec<QualifyingSegmentLap>>,
}

impl FixtureAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UpstreamAdapter for FixtureAdapter {
    async fn list_rounds(&self, year: u16) -> Result<Vec<RoundInfo>, AdapterError> {
        Ok(self.rounds.get(&year).cloned().unwrap_or_default())
    }

    async fn list_drivers(&self, identity: &SessionIdentity) -> Result<Vec<DriverInfo>, AdapterError> {
        Ok(self.drivers.get(&identity.session_id()).cloned().unwrap_or_default())
    }

    async fn get_per_driver_laps(
        &self,
        identity: &SessionIdentity,
        driver: &str,
    ) -> Result<Vec<DriverLapRaw>, AdapterError> {
        Ok(self
            .laps
            .get(&(identity.session_id(), driver.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_stream_timing(&self, identity: &SessionIdentity) -> Result<Vec<TimingRow>, AdapterError> {
        Ok(self.timing.get(&identity.session_id()).cloned().unwrap_or_default())
    }

    async fn get_track_status(&self, identity: &SessionIdentity) -> Result<Vec<TrackStatusRow>, AdapterError> {
        Ok(self.track_status.get(&identity.session_id()).cloned().unwrap_or_default())
    }

    async fn get_weather(&self, identity: &SessionIdentity) -> Result<Vec<WeatherRow>, AdapterError> {
        Ok(self.weather.get(&identity.session_id()).cloned().unwrap_or_default())
    }

    async fn get_qualifying_laps(
        &self,
        identity: &SessionIdentity,
        driver: &str,
    ) -> Result<Vec<QualifyingSegmentLap>, AdapterError> {
        Ok(self
            .qualifying_laps
            .get(&(identity.session_id(), driver.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
