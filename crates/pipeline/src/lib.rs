//! Frame construction pipeline: per-driver extraction and resampling,
//! race-start normalization, leaderboard ordering with retirement, frame
//! assembly, and qualifying-lap extraction.

mod assemble;
mod error;
mod extraction;
mod leaderboard;
mod qualifying;
mod resample;
mod smoothing;
mod timeline;

pub use assemble::{build_race_frames, RaceFrameBuild};
pub use error::PipelineError;
pub use extraction::{extract_driver, DriverLapSeries};
pub use leaderboard::{apply_hysteresis, apply_lap_anchor, distance_gap_to_time, DriverCandidate, RetirementTracker};
pub use qualifying::{build_qualifying_session, extract_qualifying_lap};
pub use resample::{linear_interp, resample_driver, step_sample, ResampledDriverChannels};
pub use smoothing::smooth_interval;
pub use timeline::{build_timeline, find_race_start, normalize_race_progress, race_start_index, Timeline};
