//! Per-driver lap flattening and cumulative race distance.

use crate::error::PipelineError;
use std::collections::HashMap;
use telemetry_adapter::DriverLapRaw;

/// One driver's laps flattened into time-sorted parallel arrays, plus a
/// cumulative race-distance track built from per-lap distance resets.
#[derive(Clone, Debug, Default)]
pub struct DriverLapSeries {
    pub times: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub dist: Vec<f64>,
    pub rel_dist: Vec<f64>,
    pub cumulative_race_distance: Vec<f64>,
    pub lap_number: Vec<u32>,
    pub tyre: Vec<String>,
    pub speed_kph: Vec<f64>,
    pub gear: Vec<i8>,
    pub drs: Vec<bool>,
    pub throttle: Vec<f64>,
    pub brake: Vec<f64>,
    pub rpm: Vec<f64>,
    pub lap_time_s: Vec<Option<f64>>,
    pub sector1_s: Vec<Option<f64>>,
    pub sector2_s: Vec<Option<f64>>,
    pub sector3_s: Vec<Option<f64>>,
    /// lap_number -> official finishing position for that lap, used by the
    /// Tier 0 lap-anchor correction.
    pub lap_boundaries: HashMap<u32, u32>,
}

impl DriverLapSeries {
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.times.first().copied()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }
}

/// Concatenate a driver's laps (assumed already ordered by lap number) into
/// one time-sorted series. A non-monotonic time sequence within or across
/// laps is treated as corrupt telemetry for that driver and rejected; the
/// caller is expected to skip the driver and continue with the rest.
pub fn extract_driver(driver: &str, laps: &[DriverLapRaw]) -> Result<DriverLapSeries, PipelineError> {
    let mut ordered: Vec<&DriverLapRaw> = laps.iter().collect();
    ordered.sort_by_key(|l| l.lap_number);

    let mut series = DriverLapSeries::default();
    let mut total_distance_so_far = 0.0f64;
    let mut last_time = f64::NEG_INFINITY;

    for (lap_idx, lap) in ordered.iter().enumerate() {
        if lap.telemetry.is_empty() {
            continue;
        }
        if lap_idx == 0 {
            if let Some(first) = lap.telemetry.first() {
                if first.distance_m > 100.0 {
                    tracing::warn!(driver, distance_m = first.distance_m, "first lap telemetry starts far from the line");
                }
            }
        }
        let mut lap_end_distance = 0.0f64;
        for sample in &lap.telemetry {
            if sample.time_s < last_time {
                return Err(PipelineError::CorruptTelemetry {
                    driver: driver.to_string(),
                    reason: format!("non-monotonic time at lap {}: {} < {}", lap.lap_number, sample.time_s, last_time),
                });
            }
            last_time = sample.time_s;

            series.times.push(sample.time_s);
            series.x.push(sample.x);
            series.y.push(sample.y);
            series.dist.push(sample.distance_m);
            series.rel_dist.push(sample.rel_distance);
            series.cumulative_race_distance.push(total_distance_so_far + sample.distance_m);
            series.lap_number.push(lap.lap_number);
            series.tyre.push(lap.compound.clone());
            series.speed_kph.push(sample.speed_kph);
            series.gear.push(sample.gear);
            series.drs.push(sample.drs);
            series.throttle.push(sample.throttle);
            series.brake.push(sample.brake);
            series.rpm.push(sample.rpm);
            series.lap_time_s.push(lap.lap_time_s);
            series.sector1_s.push(lap.sector1_s);
            series.sector2_s.push(lap.sector2_s);
            series.sector3_s.push(lap.sector3_s);

            lap_end_distance = sample.distance_m;
        }
        total_distance_so_far += lap_end_distance;
        if let Some(pos) = lap.finishing_position {
            series.lap_boundaries.insert(lap.lap_number, pos);
        }
    }

    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_adapter::TelemetrySample;

    fn sample(t: f64, dist: f64) -> TelemetrySample {
        TelemetrySample {
            time_s: t,
            x: 0.0,
            y: 0.0,
            distance_m: dist,
            rel_distance: dist / 100.0,
            speed_kph: 200.0,
            gear: 5,
            drs: false,
            throttle: 1.0,
            brake: 0.0,
            rpm: 10000.0,
        }
    }

    #[test]
    fn concatenates_laps_and_accumulates_distance() {
        let laps = vec![
            DriverLapRaw {
                lap_number: 1,
                compound: "SOFT".into(),
                finishing_position: Some(2),
                lap_time_s: Some(90.0),
                sector1_s: Some(30.0),
                sector2_s: Some(30.0),
                sector3_s: Some(30.0),
                telemetry: vec![sample(0.0, 0.0), sample(1.0, 50.0), sample(2.0, 100.0)],
            },
            DriverLapRaw {
                lap_number: 2,
                compound: "SOFT".into(),
                finishing_position: Some(1),
                lap_time_s: Some(88.0),
                sector1_s: Some(29.0),
                sector2_s: Some(29.0),
                sector3_s: Some(30.0),
                telemetry: vec![sample(2.0, 0.0), sample(3.0, 50.0)],
            },
        ];
        let series = extract_driver("VER", &laps).unwrap();
        assert_eq!(series.times, vec![0.0, 1.0, 2.0, 2.0, 3.0]);
        assert_eq!(series.cumulative_race_distance, vec![0.0, 50.0, 100.0, 100.0, 150.0]);
        assert_eq!(series.lap_boundaries.get(&1), Some(&2));
        assert_eq!(series.lap_boundaries.get(&2), Some(&1));
    }

    #[test]
    fn non_monotonic_time_is_corrupt() {
        let laps = vec![DriverLapRaw {
            lap_number: 1,
            compound: "SOFT".into(),
            finishing_position: None,
            lap_time_s: None,
            sector1_s: None,
            sector2_s: None,
            sector3_s: None,
            telemetry: vec![sample(1.0, 0.0), sample(0.5, 10.0)],
        }];
        assert!(extract_driver("VER", &laps).is_err());
    }
}
