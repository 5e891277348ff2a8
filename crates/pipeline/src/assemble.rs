//! Frame assembly: ties extraction, resampling, timing alignment, and
//! leaderboard ordering together into the final `Vec<Frame>`.

use crate::error::PipelineError;
use crate::extraction::{extract_driver, DriverLapSeries};
use crate::leaderboard::{distance_gap_to_time, order_frame, DriverCandidate, RetirementTracker};
use crate::resample::{linear_interp, resample_driver, step_sample, ResampledDriverChannels};
use crate::smoothing::smooth_interval;
use crate::timeline::{build_timeline, find_race_start, normalize_race_progress, race_start_index, Timeline};
use model::{
    DriverFrameRecord, DriverStatus, Frame, RainState, SessionIdentity, TrackStatusCode, TrackStatusInterval,
    WeatherSnapshot, DT_S,
};
use std::collections::HashMap;
use telemetry_adapter::{DriverLapRaw, TimingRow, TrackStatusRow, UpstreamAdapter, WeatherRow};

const CIRCUIT_LENGTH_FALLBACK_M: f64 = 5000.0;

pub struct RaceFrameBuild {
    pub frames: Vec<Frame>,
    pub race_start_time_s: f64,
    pub track_status: Vec<TrackStatusInterval>,
    pub total_laps: u32,
}

struct DriverWork {
    code: String,
    series: DriverLapSeries,
    resampled: ResampledDriverChannels,
}

/// Runs per-driver extraction and resampling across a worker pool, built
/// on the same crossbeam-channel fan-out/fan-in pattern already used by
/// this workspace's telemetry ingest plumbing.
fn extract_and_resample_all(
    laps_by_driver: Vec<(String, Vec<DriverLapRaw>)>,
    timeline: Timeline,
) -> Vec<DriverWork> {
    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(laps_by_driver.len().max(1));
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(String, Vec<DriverLapRaw>)>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<Option<DriverWork>>();

    for (code, laps) in laps_by_driver {
        job_tx.send((code, laps)).ok();
    }
    drop(job_tx);

    let mut handles = Vec::new();
    for _ in 0..worker_count.max(1) {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        handles.push(std::thread::spawn(move || {
            while let Ok((code, laps)) = job_rx.recv() {
                match extract_driver(&code, &laps) {
                    Ok(series) => {
                        if series.is_empty() {
                            result_tx.send(None).ok();
                            continue;
                        }
                        let resampled = resample_driver(&series, &timeline);
                        result_tx.send(Some(DriverWork { code, series, resampled })).ok();
                    }
                    Err(err) => {
                        tracing::warn!(driver = %code, error = %err, "skipping driver with corrupt telemetry");
                        result_tx.send(None).ok();
                    }
                }
            }
        }));
    }
    drop(result_tx);

    let mut out = Vec::new();
    while let Ok(item) = result_rx.recv() {
        if let Some(work) = item {
            out.push(work);
        }
    }
    for h in handles {
        let _ = h.join();
    }
    out
}

fn parse_track_status(rows: &[TrackStatusRow]) -> Vec<TrackStatusInterval> {
    let mut sorted: Vec<&TrackStatusRow> = rows.iter().collect();
    sorted.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap());
    let mut intervals = Vec::new();
    for (i, row) in sorted.iter().enumerate() {
        let status = match TrackStatusCode::from_upstream(&row.status_code) {
            Some(s) => s,
            None => continue,
        };
        let end_s = sorted.get(i + 1).map(|n| n.time_s).unwrap_or(f64::INFINITY);
        intervals.push(TrackStatusInterval { status, start_s: row.time_s, end_s });
    }
    intervals
}

fn status_at(intervals: &[TrackStatusInterval], t: f64) -> Option<TrackStatusCode> {
    intervals
        .iter()
        .find(|i| t >= i.start_s && t < i.end_s)
        .map(|i| i.status)
}

struct TimingAlignment {
    pos_raw: Vec<Option<u32>>,
    gap_to_leader_s: Vec<Option<f64>>,
    interval_smoothed_s: Vec<Option<f64>>,
}

fn align_timing(rows: &[TimingRow], driver: &str, timeline: &Timeline) -> TimingAlignment {
    let mut own: Vec<&TimingRow> = rows.iter().filter(|r| r.driver == driver).collect();
    own.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap());

    let times: Vec<f64> = own.iter().map(|r| r.time_s).collect();
    let positions: Vec<Option<u32>> = own.iter().map(|r| r.position).collect();
    let gaps: Vec<Option<f64>> = own.iter().map(|r| r.gap_to_leader_s).collect();
    let raw_intervals: Vec<Option<f64>> = own.iter().map(|r| r.interval_to_ahead_s).collect();
    let smoothed_intervals = smooth_interval(&raw_intervals, 7);

    let mut pos_raw = Vec::with_capacity(timeline.n);
    let mut gap_to_leader_s = Vec::with_capacity(timeline.n);
    let mut interval_smoothed_s = Vec::with_capacity(timeline.n);
    for k in 0..timeline.n {
        let t = timeline.abs(k);
        pos_raw.push(step_sample(&times, &positions, t).flatten());
        gap_to_leader_s.push(interp_optional(&times, &gaps, t));
        interval_smoothed_s.push(interp_optional(&times, &smoothed_intervals, t));
    }
    TimingAlignment { pos_raw, gap_to_leader_s, interval_smoothed_s }
}

fn interp_optional(times: &[f64], values: &[Option<f64>], query: f64) -> Option<f64> {
    let present: Vec<f64> = times
        .iter()
        .zip(values)
        .filter_map(|(&t, v)| v.map(|_| t))
        .collect();
    let present_vals: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    linear_interp(&present, &present_vals, query)
}

fn resample_weather(rows: &[WeatherRow], timeline: &Timeline) -> Option<Vec<WeatherSnapshot>> {
    if rows.is_empty() {
        return None;
    }
    let mut sorted: Vec<&WeatherRow> = rows.iter().collect();
    sorted.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap());
    let times: Vec<f64> = sorted.iter().map(|r| r.time_s).collect();
    let track_temp: Vec<Option<f64>> = sorted.iter().map(|r| r.track_temp_c).collect();
    let air_temp: Vec<Option<f64>> = sorted.iter().map(|r| r.air_temp_c).collect();
    let humidity: Vec<Option<f64>> = sorted.iter().map(|r| r.humidity_pct).collect();
    let wind_speed: Vec<Option<f64>> = sorted.iter().map(|r| r.wind_speed_ms).collect();
    let wind_dir: Vec<Option<f64>> = sorted.iter().map(|r| r.wind_direction_deg).collect();
    let rainfall: Vec<bool> = sorted.iter().map(|r| r.rainfall).collect();

    let mut out = Vec::with_capacity(timeline.n);
    for k in 0..timeline.n {
        let t = timeline.abs(k);
        let raining = step_sample(&times, &rainfall, t).unwrap_or(false);
        out.push(WeatherSnapshot {
            track_temp_c: interp_optional(&times, &track_temp, t),
            air_temp_c: interp_optional(&times, &air_temp, t),
            humidity_pct: interp_optional(&times, &humidity, t),
            wind_speed_ms: interp_optional(&times, &wind_speed, t),
            wind_direction_deg: interp_optional(&times, &wind_dir, t),
            rain_state: Some(if raining { RainState::Raining } else { RainState::Dry }),
        });
    }
    Some(out)
}

/// Builds the full frame list for a race/sprint session.
pub async fn build_race_frames(
    adapter: &dyn UpstreamAdapter,
    identity: &SessionIdentity,
) -> Result<RaceFrameBuild, PipelineError> {
    let drivers = adapter.list_drivers(identity).await?;
    if drivers.is_empty() {
        return Err(PipelineError::NoDrivers);
    }

    let mut laps_by_driver = Vec::new();
    for d in &drivers {
        let laps = adapter.get_per_driver_laps(identity, &d.code).await?;
        laps_by_driver.push((d.code.clone(), laps));
    }

    let timing = adapter.get_stream_timing(identity).await?;
    let track_status_rows = adapter.get_track_status(identity).await?;
    let weather_rows = adapter.get_weather(identity).await?;
    let track_status = parse_track_status(&track_status_rows);

    // Build a pass over just the series first to size the timeline before
    // spending worker-pool time resampling.
    let mut preview_series = Vec::new();
    for (code, laps) in &laps_by_driver {
        if let Ok(series) = extract_driver(code, laps) {
            if !series.is_empty() {
                preview_series.push(series);
            }
        }
    }
    let timeline = build_timeline(&preview_series).ok_or(PipelineError::NoDrivers)?;

    let works = extract_and_resample_all(laps_by_driver, timeline);
    if works.is_empty() {
        return Err(PipelineError::NoDrivers);
    }

    let race_start_abs = find_race_start(&track_status);
    let race_start_idx = race_start_index(&timeline, race_start_abs);

    let circuit_length_m = works
        .iter()
        .flat_map(|w| w.series.dist.iter().copied())
        .fold(0.0f64, f64::max);
    let circuit_length_m = if circuit_length_m > 0.0 { circuit_length_m } else { CIRCUIT_LENGTH_FALLBACK_M };
    let total_laps = works
        .iter()
        .flat_map(|w| w.series.lap_number.iter().copied())
        .max()
        .unwrap_or(0);
    let total_race_distance = circuit_length_m * total_laps.max(1) as f64;
    let finish_eps = (0.01 * circuit_length_m).min(50.0);

    let mut lap_boundaries = HashMap::new();
    for w in &works {
        lap_boundaries.insert(w.code.clone(), w.series.lap_boundaries.clone());
    }

    let mut timing_by_driver = HashMap::new();
    for w in &works {
        timing_by_driver.insert(w.code.clone(), align_timing(&timing, &w.code, &timeline));
    }

    let mut race_progress_by_driver: HashMap<String, Vec<f64>> = HashMap::new();
    for w in &works {
        let mut progress: Vec<f64> = w
            .resampled
            .cumulative_race_distance
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .collect();
        let mut running_max = f64::NEG_INFINITY;
        for v in progress.iter_mut() {
            if v.is_nan() {
                *v = running_max.max(0.0);
            }
            if *v < running_max {
                *v = running_max;
            }
            running_max = *v;
        }
        normalize_race_progress(&mut progress, race_start_idx);
        race_progress_by_driver.insert(w.code.clone(), progress);
    }

    let weather = resample_weather(&weather_rows, &timeline);

    let mut retirement_trackers: HashMap<String, RetirementTracker> =
        works.iter().map(|w| (w.code.clone(), RetirementTracker::new())).collect();
    let mut finished_set: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut previous_order: Vec<String> = Vec::new();
    let mut last_change_time: HashMap<String, f64> = HashMap::new();

    let mut frames = Vec::with_capacity(timeline.n);
    for k in 0..timeline.n {
        let t_rel = timeline.rel(k);
        let t_abs = timeline.abs(k);
        let status = status_at(&track_status, t_abs);
        let theta = status.map(|s| s.hysteresis_theta_s()).unwrap_or(1.0);

        let mut candidates = Vec::new();
        let mut retired_codes = Vec::new();
        let mut lap_numbers = HashMap::new();
        let mut per_driver_record: HashMap<String, DriverFrameRecord> = HashMap::new();

        for w in &works {
            let speed = w.resampled.speed_kph.get(k).copied().flatten();
            let speed = match speed {
                Some(s) => s,
                None => continue,
            };
            let progress = race_progress_by_driver[&w.code][k];
            let lap = w.resampled.lap_number.get(k).copied().flatten().unwrap_or(0);
            lap_numbers.insert(w.code.clone(), lap);

            let retired = retirement_trackers.get_mut(&w.code).unwrap().update(&w.code, speed, DT_S);
            if progress >= total_race_distance - finish_eps {
                finished_set.insert(w.code.clone());
            }

            let status_enum = if retired {
                retired_codes.push(w.code.clone());
                DriverStatus::Retired
            } else if finished_set.contains(&w.code) {
                DriverStatus::Finished
            } else {
                DriverStatus::Running
            };

            if !retired {
                let alignment = &timing_by_driver[&w.code];
                candidates.push(DriverCandidate {
                    code: w.code.clone(),
                    pos_raw: alignment.pos_raw.get(k).copied().flatten(),
                    interval_to_ahead_smoothed_s: alignment.interval_smoothed_s.get(k).copied().flatten(),
                    race_progress_m: progress,
                    lap_number: lap,
                });
            }

            per_driver_record.insert(
                w.code.clone(),
                DriverFrameRecord {
                    code: w.code.clone(),
                    x: model::sanitize_f64(w.resampled.x.get(k).copied().flatten().unwrap_or(0.0), 0.0),
                    y: model::sanitize_f64(w.resampled.y.get(k).copied().flatten().unwrap_or(0.0), 0.0),
                    speed_kph: model::sanitize_f64(speed, 0.0),
                    gear: w.resampled.gear.get(k).copied().flatten().unwrap_or(0),
                    lap,
                    position: 0,
                    tyre: w.resampled.tyre.get(k).cloned().flatten().unwrap_or_default(),
                    throttle: model::sanitize_f64(w.resampled.throttle.get(k).copied().flatten().unwrap_or(0.0), 0.0),
                    brake: model::sanitize_f64(w.resampled.brake.get(k).copied().flatten().unwrap_or(0.0), 0.0),
                    drs: w.resampled.drs.get(k).copied().flatten().unwrap_or(false),
                    dist_m: model::sanitize_f64(w.resampled.dist.get(k).copied().flatten().unwrap_or(0.0), 0.0),
                    rel_dist: model::sanitize_f64(w.resampled.rel_dist.get(k).copied().flatten().unwrap_or(0.0), 0.0),
                    race_progress_m: model::sanitize_f64(progress, 0.0),
                    gap_to_previous_s: 0.0,
                    gap_to_leader_s: 0.0,
                    lap_time_s: w.resampled.lap_time_s.get(k).copied().flatten(),
                    sector1_s: w.resampled.sector1_s.get(k).copied().flatten(),
                    sector2_s: w.resampled.sector2_s.get(k).copied().flatten(),
                    sector3_s: w.resampled.sector3_s.get(k).copied().flatten(),
                    status: status_enum,
                },
            );
        }

        let order = order_frame(
            &candidates,
            &retired_codes,
            &previous_order,
            &mut last_change_time,
            t_rel,
            theta,
            &lap_numbers,
            &lap_boundaries,
        );
        previous_order = order.iter().take(candidates.len()).cloned().collect();

        let active_count = candidates.len();
        for (idx, code) in order.iter().enumerate() {
            if let Some(rec) = per_driver_record.get_mut(code) {
                rec.position = (idx + 1) as u32;
            }
        }
        for idx in 0..active_count {
            let code = &order[idx];
            let progress_here = per_driver_record[code].race_progress_m;
            let speed_here = per_driver_record[code].speed_kph;
            let leader_progress = per_driver_record[&order[0]].race_progress_m;
            let ahead_progress = if idx == 0 { progress_here } else { per_driver_record[&order[idx - 1]].race_progress_m };
            let gap_to_prev = distance_gap_to_time(ahead_progress - progress_here, speed_here);
            let gap_to_leader = distance_gap_to_time(leader_progress - progress_here, speed_here);
            if let Some(rec) = per_driver_record.get_mut(code) {
                rec.gap_to_previous_s = gap_to_prev;
                rec.gap_to_leader_s = gap_to_leader;
            }
        }

        let leader_lap = order.first().and_then(|c| per_driver_record.get(c)).map(|r| r.lap).unwrap_or(0);
        let drivers_map = per_driver_record.into_iter().collect();

        frames.push(Frame {
            t_s: (t_rel * 1000.0).round() / 1000.0,
            leader_lap,
            track_status: status,
            drivers: drivers_map,
            weather: weather.as_ref().and_then(|w| w.get(k).cloned()),
        });
    }

    Ok(RaceFrameBuild { frames, race_start_time_s: race_start_abs, track_status, total_laps })
}
