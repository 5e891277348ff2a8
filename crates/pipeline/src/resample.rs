//! Per-channel resampling onto the common timeline.

use crate::extraction::DriverLapSeries;
use crate::timeline::Timeline;

#[derive(Clone, Debug, Default)]
pub struct ResampledDriverChannels {
    pub x: Vec<Option<f64>>,
    pub y: Vec<Option<f64>>,
    pub dist: Vec<Option<f64>>,
    pub rel_dist: Vec<Option<f64>>,
    pub cumulative_race_distance: Vec<Option<f64>>,
    pub speed_kph: Vec<Option<f64>>,
    pub throttle: Vec<Option<f64>>,
    pub brake: Vec<Option<f64>>,
    pub rpm: Vec<Option<f64>>,
    pub gear: Vec<Option<i8>>,
    pub tyre: Vec<Option<String>>,
    pub drs: Vec<Option<bool>>,
    pub lap_number: Vec<Option<u32>>,
    pub lap_time_s: Vec<Option<f64>>,
    pub sector1_s: Vec<Option<f64>>,
    pub sector2_s: Vec<Option<f64>>,
    pub sector3_s: Vec<Option<f64>>,
}

/// Linear interpolation of `values` (sampled at `times`) at `query`.
/// `None` outside of `[times[0], times[last]]`, matching the resampling
/// policy for continuous channels.
pub fn linear_interp(times: &[f64], values: &[f64], query: f64) -> Option<f64> {
    if times.is_empty() {
        return None;
    }
    if query < times[0] || query > *times.last().unwrap() {
        return None;
    }
    let idx = times.partition_point(|&t| t <= query);
    if idx == 0 {
        return Some(values[0]);
    }
    if idx >= times.len() {
        return Some(*values.last().unwrap());
    }
    let (t0, t1) = (times[idx - 1], times[idx]);
    let (v0, v1) = (values[idx - 1], values[idx]);
    if (t1 - t0).abs() < f64::EPSILON {
        return Some(v0);
    }
    let frac = (query - t0) / (t1 - t0);
    Some(v0 + frac * (v1 - v0))
}

/// Nearest-earlier ("step") sample, matching the discrete-channel policy.
pub fn step_sample<T: Clone>(times: &[f64], values: &[T], query: f64) -> Option<T> {
    if times.is_empty() || query < times[0] {
        return None;
    }
    let idx = times.partition_point(|&t| t <= query);
    if idx == 0 {
        return None;
    }
    values.get(idx - 1).cloned()
}

/// Linear interpolation over an `Option<f64>` series (lap/sector scalars),
/// propagating `None` whenever either endpoint is missing.
fn linear_interp_optional(times: &[f64], values: &[Option<f64>], query: f64) -> Option<f64> {
    if times.is_empty() || query < times[0] || query > *times.last().unwrap() {
        return None;
    }
    let idx = times.partition_point(|&t| t <= query);
    let idx = idx.min(times.len() - 1).max(1);
    let (v0, v1) = (values[idx - 1], values[idx]);
    match (v0, v1) {
        (Some(a), Some(b)) => {
            let (t0, t1) = (times[idx - 1], times[idx]);
            if (t1 - t0).abs() < f64::EPSILON {
                Some(a)
            } else {
                let frac = (query - t0) / (t1 - t0);
                Some(a + frac * (b - a))
            }
        }
        _ => None,
    }
}

pub fn resample_driver(series: &DriverLapSeries, timeline: &Timeline) -> ResampledDriverChannels {
    let mut out = ResampledDriverChannels::default();
    for k in 0..timeline.n {
        let t = timeline.abs(k);
        out.x.push(linear_interp(&series.times, &series.x, t));
        out.y.push(linear_interp(&series.times, &series.y, t));
        out.dist.push(linear_interp(&series.times, &series.dist, t));
        out.rel_dist.push(linear_interp(&series.times, &series.rel_dist, t));
        out.cumulative_race_distance
            .push(linear_interp(&series.times, &series.cumulative_race_distance, t));
        out.speed_kph.push(linear_interp(&series.times, &series.speed_kph, t));
        out.throttle.push(linear_interp(&series.times, &series.throttle, t));
        out.brake.push(linear_interp(&series.times, &series.brake, t));
        out.rpm.push(linear_interp(&series.times, &series.rpm, t));
        out.gear.push(step_sample(&series.times, &series.gear, t));
        out.tyre.push(step_sample(&series.times, &series.tyre, t));
        out.drs.push(step_sample(&series.times, &series.drs, t));
        out.lap_number.push(step_sample(&series.times, &series.lap_number, t));
        out.lap_time_s.push(linear_interp_optional(&series.times, &series.lap_time_s, t));
        out.sector1_s.push(linear_interp_optional(&series.times, &series.sector1_s, t));
        out.sector2_s.push(linear_interp_optional(&series.times, &series.sector2_s, t));
        out.sector3_s.push(linear_interp_optional(&series.times, &series.sector3_s, t));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_interp_midpoint() {
        let times = [0.0, 1.0, 2.0];
        let values = [0.0, 10.0, 10.0];
        assert_eq!(linear_interp(&times, &values, 0.5), Some(5.0));
        assert_eq!(linear_interp(&times, &values, -0.1), None);
        assert_eq!(linear_interp(&times, &values, 2.1), None);
    }

    #[test]
    fn step_sample_picks_nearest_earlier() {
        let times = [0.0, 1.0, 2.0];
        let values = [1, 2, 3];
        assert_eq!(step_sample(&times, &values, 0.5), Some(1));
        assert_eq!(step_sample(&times, &values, 1.999), Some(2));
        assert_eq!(step_sample(&times, &values, -1.0), None);
    }
}
