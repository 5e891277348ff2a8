//! End-to-end coverage of the two frame-building entry points against an
//! in-memory fixture, matching the source system's own
//! `test_leaderboard_e2e.py`-style scenario tests.

use model::{DriverInfo, SessionIdentity, SessionKind};
use telemetry_adapter::{DriverLapRaw, FixtureAdapter, TelemetrySample, TimingRow, TrackStatusRow, UpstreamAdapter};

fn sample(t: f64, dist: f64, speed_kph: f64) -> TelemetrySample {
    TelemetrySample {
        time_s: t,
        x: dist,
        y: 0.0,
        distance_m: dist,
        rel_distance: (dist % 5000.0) / 5000.0,
        speed_kph,
        gear: 6,
        drs: false,
        throttle: 1.0,
        brake: 0.0,
        rpm: 10000.0,
    }
}

fn race_fixture() -> (FixtureAdapter, SessionIdentity) {
    let identity = SessionIdentity { year: 2024, round: 5, kind: SessionKind::Race };
    let session_id = identity.session_id();
    let mut adapter = FixtureAdapter::new();

    adapter.drivers.insert(
        session_id.clone(),
        vec![
            DriverInfo { code: "VER".into(), number: 1, team: "Red Bull".into(), color_rgb: (30, 60, 255) },
            DriverInfo { code: "HAM".into(), number: 44, team: "Mercedes".into(), color_rgb: (0, 210, 190) },
        ],
    );

    for (code, offset) in [("VER", 0.0), ("HAM", 2.0)] {
        let laps = vec![DriverLapRaw {
            lap_number: 1,
            compound: "SOFT".into(),
            finishing_position: Some(if code == "VER" { 1 } else { 2 }),
            lap_time_s: Some(90.0),
            sector1_s: Some(30.0),
            sector2_s: Some(30.0),
            sector3_s: Some(30.0),
            telemetry: vec![
                sample(offset, 0.0, 300.0),
                sample(offset + 1.0, 300.0, 300.0),
                sample(offset + 2.0, 600.0, 300.0),
                sample(offset + 3.0, 900.0, 300.0),
            ],
        }];
        adapter.laps.insert((session_id.clone(), code.to_string()), laps);
    }

    adapter.timing.insert(
        session_id.clone(),
        vec![
            TimingRow { time_s: 0.0, driver: "VER".into(), position: Some(1), gap_to_leader_s: Some(0.0), interval_to_ahead_s: None },
            TimingRow { time_s: 0.0, driver: "HAM".into(), position: Some(2), gap_to_leader_s: Some(2.0), interval_to_ahead_s: Some(2.0) },
        ],
    );
    adapter.track_status.insert(session_id.clone(), vec![TrackStatusRow { time_s: 0.0, status_code: "1".into() }]);

    (adapter, identity)
}

#[tokio::test]
async fn builds_race_frames_with_ordered_leaderboard() {
    let (adapter, identity) = race_fixture();
    let build = pipeline::build_race_frames(&adapter, &identity).await.expect("race frames build");

    assert!(!build.frames.is_empty());
    assert_eq!(build.total_laps, 1);

    let first = &build.frames[0];
    assert_eq!(first.drivers.len(), 2);
    let ver = &first.drivers["VER"];
    let ham = &first.drivers["HAM"];
    assert_eq!(ver.position, 1);
    assert_eq!(ham.position, 2);
    assert!(ver.race_progress_m.is_finite());
}

#[tokio::test]
async fn missing_drivers_is_an_error() {
    let identity = SessionIdentity { year: 2024, round: 5, kind: SessionKind::Race };
    let adapter = FixtureAdapter::new();
    let result = pipeline::build_race_frames(&adapter, &identity).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn builds_qualifying_session_with_segment_results() {
    let identity = SessionIdentity { year: 2024, round: 5, kind: SessionKind::Qualifying };
    let session_id = identity.session_id();
    let mut adapter = FixtureAdapter::new();
    adapter.drivers.insert(
        session_id.clone(),
        vec![DriverInfo { code: "VER".into(), number: 1, team: "Red Bull".into(), color_rgb: (30, 60, 255) }],
    );
    adapter.qualifying_laps.insert(
        (session_id.clone(), "VER".into()),
        vec![telemetry_adapter::QualifyingSegmentLap {
            segment: "Q3".into(),
            lap_time_s: 78.241,
            telemetry: vec![sample(0.0, 0.0, 280.0), sample(1.0, 280.0, 310.0)],
        }],
    );

    let (catalog, results) = pipeline::build_qualifying_session(&adapter, &identity).await.expect("qualifying build");
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].segment, "Q3");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].q3_s, Some(78.241));
}
