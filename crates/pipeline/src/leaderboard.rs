//! Retirement tracking and the 4-tier leaderboard order.

use model::RETIREMENT_THRESHOLD_S;
use std::collections::HashMap;

#[derive(Default)]
pub struct RetirementTracker {
    zero_speed_duration_s: HashMap<String, f64>,
    retired: HashMap<String, bool>,
}

impl RetirementTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the tracker by `dt` seconds for `driver` at `speed_kph`.
    /// Returns whether the driver is (now, or still) retired. Retirement is
    /// sticky: once set it is never cleared.
    pub fn update(&mut self, driver: &str, speed_kph: f64, dt: f64) -> bool {
        if *self.retired.get(driver).unwrap_or(&false) {
            return true;
        }
        let counter = self.zero_speed_duration_s.entry(driver.to_string()).or_insert(0.0);
        if speed_kph == 0.0 {
            *counter += dt;
        } else {
            *counter = 0.0;
        }
        let retired = *counter >= RETIREMENT_THRESHOLD_S;
        if retired {
            self.retired.insert(driver.to_string(), true);
        }
        retired
    }
}

/// A driver's ordering-relevant state at one frame.
#[derive(Clone, Debug)]
pub struct DriverCandidate {
    pub code: String,
    pub pos_raw: Option<u32>,
    pub interval_to_ahead_smoothed_s: Option<f64>,
    pub race_progress_m: f64,
    pub lap_number: u32,
}

/// Tier 1 / 1.5 / 2: the raw hybrid sort key, ascending.
fn sort_key(c: &DriverCandidate) -> (u32, OrderedF64, OrderedF64) {
    let pos = c.pos_raw.filter(|&p| p > 0).unwrap_or(9999);
    let interval = c.interval_to_ahead_smoothed_s.unwrap_or(9999.0);
    (pos, OrderedF64(interval), OrderedF64(-c.race_progress_m))
}

#[derive(Clone, Copy, PartialEq, PartialOrd)]
struct OrderedF64(f64);
impl Eq for OrderedF64 {}
impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// Tier 3 hysteresis smoother. `previous_order` is the prior frame's
/// accepted order (active drivers only); `last_change_time` tracks, per
/// driver, the time of its last accepted rank change.
pub fn apply_hysteresis(
    candidates: &[DriverCandidate],
    previous_order: &[String],
    last_change_time: &mut HashMap<String, f64>,
    t: f64,
    theta: f64,
) -> Vec<String> {
    let mut raw: Vec<DriverCandidate> = candidates.to_vec();
    raw.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    let candidate_order: Vec<String> = raw.iter().map(|c| c.code.clone()).collect();

    if previous_order.is_empty() {
        for code in &candidate_order {
            last_change_time.entry(code.clone()).or_insert(t);
        }
        return candidate_order;
    }

    let prev_rank: HashMap<&str, usize> =
        previous_order.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
    let candidate_rank: HashMap<&str, usize> =
        candidate_order.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();

    // Drivers missing from previous_order (new arrivals) are always movable.
    let mut movable: Vec<String> = Vec::new();
    let mut fixed: Vec<Option<String>> = previous_order.to_vec().into_iter().map(Some).collect();

    for code in &candidate_order {
        let prev = prev_rank.get(code.as_str()).copied();
        let cur = candidate_rank.get(code.as_str()).copied().unwrap_or(usize::MAX);
        let rank_changed = prev.map(|p| p != cur).unwrap_or(true);
        let elapsed_ok = t - *last_change_time.get(code).unwrap_or(&f64::NEG_INFINITY) >= theta;
        if rank_changed && (prev.is_none() || elapsed_ok) {
            movable.push(code.clone());
            if let Some(p) = prev {
                fixed[p] = None;
            }
        }
    }

    // Drivers dropped from this frame entirely are removed from the fixed
    // skeleton so their slot can be backfilled.
    let candidate_set: std::collections::HashSet<&str> =
        candidate_order.iter().map(|s| s.as_str()).collect();
    for slot in fixed.iter_mut() {
        if let Some(code) = slot {
            if !candidate_set.contains(code.as_str()) {
                *slot = None;
            }
        }
    }

    let mut movable_iter = movable
        .iter()
        .filter(|code| candidate_set.contains(code.as_str()))
        .cloned();
    // Any candidate not already placed as fixed and not yet queued in
    // `movable` (can happen for genuinely new drivers) goes to the back of
    // the movable queue, in candidate order.
    let placed: std::collections::HashSet<&str> =
        fixed.iter().flatten().map(|s| s.as_str()).collect();
    let mut movable_all: Vec<String> = movable_iter.by_ref().collect();
    for code in &candidate_order {
        if !placed.contains(code.as_str()) && !movable_all.contains(code) {
            movable_all.push(code.clone());
        }
    }
    let mut movable_queue = movable_all.into_iter();

    let mut result: Vec<String> = Vec::with_capacity(candidate_order.len());
    for slot in fixed {
        match slot {
            Some(code) => result.push(code),
            None => {
                if let Some(code) = movable_queue.next() {
                    result.push(code);
                }
            }
        }
    }
    for code in movable_queue {
        if !result.contains(&code) {
            result.push(code);
        }
    }

    for code in &result {
        let prev = prev_rank.get(code.as_str()).copied();
        let cur = result.iter().position(|c| c == code);
        if prev != cur {
            last_change_time.insert(code.clone(), t);
        } else {
            last_change_time.entry(code.clone()).or_insert(t);
        }
    }

    result
}

/// Tier 0: snaps any driver with an official finishing position recorded
/// for its current lap to that position, ahead of unanchored drivers.
pub fn apply_lap_anchor(
    order: Vec<String>,
    lap_numbers: &HashMap<String, u32>,
    lap_boundaries: &HashMap<String, HashMap<u32, u32>>,
) -> Vec<String> {
    let mut anchored: Vec<(u32, String)> = Vec::new();
    let mut unanchored: Vec<String> = Vec::new();
    for code in order {
        let anchor = lap_numbers
            .get(&code)
            .and_then(|lap| lap_boundaries.get(&code).and_then(|b| b.get(lap)));
        match anchor {
            Some(&official_pos) => anchored.push((official_pos, code)),
            None => unanchored.push(code),
        }
    }
    anchored.sort_by_key(|(pos, _)| *pos);
    anchored.into_iter().map(|(_, c)| c).chain(unanchored).collect()
}

/// Splits candidates into active (ordered by the full tier hierarchy) and
/// retired (appended after, in retirement order).
pub fn order_frame(
    candidates: &[DriverCandidate],
    retired_codes: &[String],
    previous_order: &[String],
    last_change_time: &mut HashMap<String, f64>,
    t: f64,
    theta: f64,
    lap_numbers: &HashMap<String, u32>,
    lap_boundaries: &HashMap<String, HashMap<u32, u32>>,
) -> Vec<String> {
    let hysteresis_order = apply_hysteresis(candidates, previous_order, last_change_time, t, theta);
    let mut final_order = apply_lap_anchor(hysteresis_order, lap_numbers, lap_boundaries);
    final_order.extend(retired_codes.iter().cloned());
    final_order
}

/// Distance-to-time gap conversion: `max(0, delta_m / speed_ms)`.
pub fn distance_gap_to_time(delta_m: f64, speed_kph: f64) -> f64 {
    let speed_ms = speed_kph / 3.6;
    if delta_m <= 0.0 || speed_ms <= 0.0 {
        0.0
    } else {
        delta_m / speed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, pos: Option<u32>, interval: Option<f64>, progress: f64) -> DriverCandidate {
        DriverCandidate {
            code: code.to_string(),
            pos_raw: pos,
            interval_to_ahead_smoothed_s: interval,
            race_progress_m: progress,
            lap_number: 1,
        }
    }

    #[test]
    fn retirement_is_sticky_after_threshold() {
        let mut tracker = RetirementTracker::new();
        for _ in 0..9 {
            assert!(!tracker.update("VER", 0.0, 1.0));
        }
        assert!(tracker.update("VER", 0.0, 1.0));
        assert!(tracker.update("VER", 300.0, 1.0));
    }

    #[test]
    fn hysteresis_blocks_rapid_rank_swap_under_sc() {
        let mut last_change = HashMap::new();
        let prev = vec!["A".to_string(), "B".to_string()];
        last_change.insert("A".to_string(), 0.0);
        last_change.insert("B".to_string(), 0.0);
        let candidates = vec![candidate("A", Some(2), None, 100.0), candidate("B", Some(1), None, 101.0)];
        let order = apply_hysteresis(&candidates, &prev, &mut last_change, 0.1, 0.3);
        assert_eq!(order, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn hysteresis_allows_swap_after_theta_elapsed() {
        let mut last_change = HashMap::new();
        let prev = vec!["A".to_string(), "B".to_string()];
        last_change.insert("A".to_string(), 0.0);
        last_change.insert("B".to_string(), 0.0);
        let candidates = vec![candidate("A", Some(2), None, 100.0), candidate("B", Some(1), None, 101.0)];
        let order = apply_hysteresis(&candidates, &prev, &mut last_change, 1.5, 0.3);
        assert_eq!(order, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn lap_anchor_snaps_to_official_position() {
        let mut boundaries = HashMap::new();
        let mut ver_b = HashMap::new();
        ver_b.insert(1u32, 1u32);
        boundaries.insert("VER".to_string(), ver_b);
        let mut lap_numbers = HashMap::new();
        lap_numbers.insert("VER".to_string(), 1u32);
        lap_numbers.insert("HAM".to_string(), 1u32);
        let order = apply_lap_anchor(vec!["HAM".to_string(), "VER".to_string()], &lap_numbers, &boundaries);
        assert_eq!(order, vec!["VER".to_string(), "HAM".to_string()]);
    }

    #[test]
    fn gap_math_zero_on_nonpositive_inputs() {
        assert_eq!(distance_gap_to_time(-5.0, 200.0), 0.0);
        assert_eq!(distance_gap_to_time(5.0, 0.0), 0.0);
        assert!(distance_gap_to_time(100.0, 36.0).abs() > 0.0);
    }
}
