//! The uniform 25 Hz sample grid and race-start normalization.

use crate::extraction::DriverLapSeries;
use model::{TrackStatusCode, TrackStatusInterval, DT_S};

#[derive(Clone, Copy, Debug)]
pub struct Timeline {
    pub t_min: f64,
    pub n: usize,
}

impl Timeline {
    /// Grid value at index k, relative to t_min (so `rel(0) == 0.0`).
    pub fn rel(&self, k: usize) -> f64 {
        k as f64 * DT_S
    }

    pub fn abs(&self, k: usize) -> f64 {
        self.t_min + self.rel(k)
    }
}

/// Spans the union of every driver's own time span. Returns `None` when no
/// driver has any samples.
pub fn build_timeline(series: &[DriverLapSeries]) -> Option<Timeline> {
    let mut t_min = f64::INFINITY;
    let mut t_max = f64::NEG_INFINITY;
    for s in series {
        if let (Some(first), Some(last)) = (s.first_time(), s.last_time()) {
            t_min = t_min.min(first);
            t_max = t_max.max(last);
        }
    }
    if !t_min.is_finite() || !t_max.is_finite() || t_max <= t_min {
        return None;
    }
    let n = ((t_max - t_min) / DT_S).floor() as usize;
    Some(Timeline { t_min, n })
}

/// First green-flag interval's start time, or 0.0 if the session never shows
/// green (defensive default — the race-start index then stays at 0).
pub fn find_race_start(intervals: &[TrackStatusInterval]) -> f64 {
    intervals
        .iter()
        .find(|i| i.status == TrackStatusCode::Green)
        .map(|i| i.start_s)
        .unwrap_or(0.0)
}

pub fn race_start_index(timeline: &Timeline, race_start_abs_s: f64) -> usize {
    if race_start_abs_s <= timeline.t_min {
        return 0;
    }
    let raw = ((race_start_abs_s - timeline.t_min) / DT_S).round();
    (raw.max(0.0) as usize).min(timeline.n.saturating_sub(1))
}

/// Shifts a per-frame race-progress series so it reads 0 at `race_start_idx`
/// and clamps to 0 before it.
pub fn normalize_race_progress(progress: &mut [f64], race_start_idx: usize) {
    if progress.is_empty() {
        return;
    }
    let origin = progress[race_start_idx.min(progress.len() - 1)];
    for (k, v) in progress.iter_mut().enumerate() {
        *v -= origin;
        if k < race_start_idx {
            *v = v.max(0.0);
        }
    }
    // Monotonicity can be violated by resampling noise right at the seam;
    // clamp so race_progress never goes backwards once the race has started.
    let mut running_max = f64::NEG_INFINITY;
    for v in progress.iter_mut() {
        if *v < running_max {
            *v = running_max;
        } else {
            running_max = *v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeline_spans_union_of_drivers() {
        let mut a = DriverLapSeries::default();
        a.times = vec![0.0, 1.0, 2.0];
        let mut b = DriverLapSeries::default();
        b.times = vec![0.5, 1.5, 3.0];
        let t = build_timeline(&[a, b]).unwrap();
        assert_eq!(t.t_min, 0.0);
        assert_eq!(t.n, (3.0 / DT_S) as usize);
    }

    #[test]
    fn normalize_sets_zero_at_start_and_clamps_before() {
        let mut progress = vec![-5.0, -2.0, 0.0, 10.0, 20.0];
        normalize_race_progress(&mut progress, 2);
        assert_eq!(progress, vec![0.0, 0.0, 0.0, 10.0, 20.0]);
    }
}
