//! Qualifying-lap telemetry extraction and DRS-zone detection.

use crate::error::PipelineError;
use crate::resample::linear_interp;
use model::{DrsZone, QualifyingFrame, QualifyingLapTelemetry, QualifyingResult, SessionIdentity, DT_S};
use telemetry_adapter::{TelemetrySample, UpstreamAdapter};

/// The upstream DRS channel arrives as a raw status code where `>= 10`
/// means open; `telemetry-adapter` already collapses that to a bool, so the
/// step-sampled value here only ever takes 0.0/1.0.
const DRS_OPEN_THRESHOLD: f64 = 0.5;

/// Builds the telemetry catalog entry for one driver's fastest lap in one
/// segment. `telemetry` must be time-sorted. `official_lap_time_s`
/// overwrites the final frame's timestamp, matching the source system's
/// behavior of trusting the timing tower over telemetry-derived duration.
pub fn extract_qualifying_lap(
    driver: &str,
    segment: &str,
    telemetry: &[TelemetrySample],
    official_lap_time_s: f64,
) -> QualifyingLapTelemetry {
    if telemetry.is_empty() {
        return QualifyingLapTelemetry {
            driver: driver.to_string(),
            segment: segment.to_string(),
            lap_time_s: official_lap_time_s,
            frames: Vec::new(),
            drs_zones: Vec::new(),
            max_speed_kph: 0.0,
            min_speed_kph: 0.0,
        };
    }

    let times: Vec<f64> = telemetry.iter().map(|s| s.time_s).collect();
    let t_min = times[0];
    let t_max = *times.last().unwrap();
    let n = (((t_max - t_min) / DT_S) + 0.5).floor() as usize + 1;

    let x: Vec<f64> = telemetry.iter().map(|s| s.x).collect();
    let y: Vec<f64> = telemetry.iter().map(|s| s.y).collect();
    let dist: Vec<f64> = telemetry.iter().map(|s| s.distance_m).collect();
    let rel_dist: Vec<f64> = telemetry.iter().map(|s| s.rel_distance).collect();
    let speed: Vec<f64> = telemetry.iter().map(|s| s.speed_kph).collect();
    let throttle: Vec<f64> = telemetry.iter().map(|s| s.throttle).collect();
    let brake: Vec<f64> = telemetry.iter().map(|s| s.brake * 100.0).collect();
    let gear: Vec<i8> = telemetry.iter().map(|s| s.gear).collect();
    let drs_raw: Vec<f64> = telemetry.iter().map(|s| if s.drs { 1.0 } else { 0.0 }).collect();

    let mut frames = Vec::with_capacity(n);
    for k in 0..n {
        let t = t_min + k as f64 * DT_S;
        let drs_val = crate::resample::step_sample(&times, &drs_raw, t).unwrap_or(0.0);
        frames.push(QualifyingFrame {
            t_s: t - t_min,
            x: linear_interp(&times, &x, t).unwrap_or(0.0),
            y: linear_interp(&times, &y, t).unwrap_or(0.0),
            dist_m: linear_interp(&times, &dist, t).unwrap_or(0.0),
            rel_dist: linear_interp(&times, &rel_dist, t).unwrap_or(0.0),
            speed_kph: linear_interp(&times, &speed, t).unwrap_or(0.0),
            throttle: linear_interp(&times, &throttle, t).unwrap_or(0.0),
            brake: linear_interp(&times, &brake, t).unwrap_or(0.0),
            gear: crate::resample::step_sample(&times, &gear, t).unwrap_or(0),
            drs: drs_val >= DRS_OPEN_THRESHOLD,
        });
    }
    if let Some(last) = frames.last_mut() {
        last.t_s = official_lap_time_s;
    }

    let drs_zones = detect_drs_zones(&dist, &telemetry.iter().map(|s| s.drs).collect::<Vec<_>>());
    let max_speed_kph = speed.iter().cloned().fold(f64::MIN, f64::max);
    let min_speed_kph = speed.iter().cloned().fold(f64::MAX, f64::min);

    QualifyingLapTelemetry {
        driver: driver.to_string(),
        segment: segment.to_string(),
        lap_time_s: official_lap_time_s,
        frames,
        drs_zones,
        max_speed_kph,
        min_speed_kph,
    }
}

/// Builds the full qualifying telemetry catalog and per-segment results for
/// a session, across every driver. A driver whose segment extraction fails
/// yields an empty frame list for that (driver, segment) rather than
/// aborting the whole session.
pub async fn build_qualifying_session(
    adapter: &dyn UpstreamAdapter,
    identity: &SessionIdentity,
) -> Result<(Vec<QualifyingLapTelemetry>, Vec<QualifyingResult>), PipelineError> {
    let drivers = adapter.list_drivers(identity).await?;
    if drivers.is_empty() {
        return Err(PipelineError::NoDrivers);
    }

    let mut catalog = Vec::new();
    let mut results = Vec::new();
    for driver in &drivers {
        let segments = adapter.get_qualifying_laps(identity, &driver.code).await?;
        let mut q1 = None;
        let mut q2 = None;
        let mut q3 = None;
        for seg in &segments {
            let lap = extract_qualifying_lap(&driver.code, &seg.segment, &seg.telemetry, seg.lap_time_s);
            match seg.segment.as_str() {
                "Q1" | "SQ1" => q1 = Some(seg.lap_time_s),
                "Q2" | "SQ2" => q2 = Some(seg.lap_time_s),
                "Q3" | "SQ3" => q3 = Some(seg.lap_time_s),
                _ => {}
            }
            catalog.push(lap);
        }
        results.push(QualifyingResult {
            driver: driver.code.clone(),
            color_rgb: driver.color_rgb,
            q1_s: q1,
            q2_s: q2,
            q3_s: q3,
        });
    }
    Ok((catalog, results))
}

/// Detects DRS zones from rising/falling edges of the raw (un-resampled)
/// boolean DRS flag against distance.
fn detect_drs_zones(dist: &[f64], drs: &[bool]) -> Vec<DrsZone> {
    let mut zones = Vec::new();
    let mut open_start: Option<f64> = None;
    for i in 1..drs.len() {
        let prev = drs[i - 1];
        let cur = drs[i];
        if !prev && cur {
            open_start = Some(dist[i]);
        } else if prev && !cur {
            if let Some(start) = open_start.take() {
                zones.push(DrsZone { zone_start_m: start, zone_end_m: Some(dist[i]) });
            }
        }
    }
    if let Some(start) = open_start {
        zones.push(DrsZone { zone_start_m: start, zone_end_m: None });
    }
    zones
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64, dist: f64, drs: bool) -> TelemetrySample {
        TelemetrySample {
            time_s: t,
            x: dist,
            y: 0.0,
            distance_m: dist,
            rel_distance: dist / 5000.0,
            speed_kph: 300.0,
            gear: 8,
            drs,
            throttle: 1.0,
            brake: 0.0,
            rpm: 11000.0,
        }
    }

    #[test]
    fn detects_single_drs_zone() {
        let dist = vec![0.0, 100.0, 200.0, 300.0, 400.0];
        let drs = vec![false, false, true, true, false];
        let zones = detect_drs_zones(&dist, &drs);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].zone_start_m, 200.0);
        assert_eq!(zones[0].zone_end_m, Some(400.0));
    }

    #[test]
    fn last_frame_timestamp_is_official_lap_time() {
        let telemetry = vec![sample(0.0, 0.0, false), sample(1.0, 300.0, true)];
        let lap = extract_qualifying_lap("VER", "Q3", &telemetry, 77.123);
        assert_eq!(lap.frames.last().unwrap().t_s, 77.123);
    }

    #[test]
    fn empty_telemetry_yields_empty_frames() {
        let lap = extract_qualifying_lap("VER", "Q3", &[], 80.0);
        assert!(lap.frames.is_empty());
        assert_eq!(lap.lap_time_s, 80.0);
    }
}
