//! Background session loader: fetches from the upstream adapter, runs the
//! frame-construction pipeline, and populates the session's cache artifact.

use cache::SessionArtifact;
use model::{ReplayState, SessionMetadata};
use std::sync::Arc;

use crate::session_manager::{SessionEntry, SessionManager};

pub async fn run_load(manager: Arc<SessionManager>, entry: Arc<SessionEntry>) {
    let identity = entry.identity.clone();
    entry.emit_progress(ReplayState::Loading, 0, None);

    if let Some(artifact) = manager.cache.load(&identity) {
        tracing::info!(session_id = %identity.session_id(), "restored session from cache");
        install_artifact(&entry, artifact);
        entry.emit_progress(ReplayState::Ready, 100, None);
        return;
    }

    if entry.is_cancelled() {
        return;
    }
    entry.emit_progress(ReplayState::Loading, 10, Some("fetching telemetry".to_string()));

    let result = if identity.kind.is_qualifying() {
        load_qualifying(&manager, &entry).await
    } else {
        load_race(&manager, &entry).await
    };

    if entry.is_cancelled() {
        tracing::info!(session_id = %identity.session_id(), "load superseded, discarding result");
        return;
    }

    match result {
        Ok(artifact) => {
            entry.emit_progress(ReplayState::Loading, 90, Some("pre-serializing frames".to_string()));
            if let Err(err) = manager.cache.store(&identity, &artifact) {
                tracing::warn!(%err, "failed to persist session cache artifact");
            }
            install_artifact(&entry, artifact);
            entry.emit_progress(ReplayState::Ready, 100, None);
        }
        Err(err) => {
            tracing::error!(session_id = %identity.session_id(), %err, "session load failed");
            entry.emit_progress(ReplayState::Error, 100, Some(err.to_string()));
        }
    }
}

fn install_artifact(entry: &SessionEntry, artifact: SessionArtifact) {
    let mut serialized = Vec::new();
    let pre_serialize = artifact.frames.len() <= model::PRE_SERIALIZE_FRAME_LIMIT;
    if pre_serialize {
        for frame in &artifact.frames {
            match bincode::serialize(frame) {
                Ok(bytes) => serialized.push(bytes),
                Err(err) => {
                    tracing::warn!(%err, "failed to pre-serialize a frame, falling back to on-demand");
                    serialized.clear();
                    break;
                }
            }
        }
    }
    let mut guard = entry.session.lock();
    guard.metadata = artifact.metadata;
    guard.metadata.total_frames = artifact.frames.len();
    guard.frames = artifact.frames;
    guard.qualifying = artifact.qualifying;
    drop(guard);
    if pre_serialize && !serialized.is_empty() {
        *entry.serialized_frames.lock() = Some(serialized);
    }
}

async fn load_race(
    manager: &Arc<SessionManager>,
    entry: &Arc<SessionEntry>,
) -> Result<SessionArtifact, pipeline::PipelineError> {
    let identity = entry.identity.clone();
    let build = pipeline::build_race_frames(manager.adapter.as_ref(), &identity).await?;
    entry.emit_progress(ReplayState::Loading, 60, Some("frames generated".to_string()));
    if entry.is_cancelled() {
        return Err(pipeline::PipelineError::NoDrivers);
    }
    entry.emit_progress(ReplayState::Loading, 75, Some("attaching track geometry".to_string()));

    let drivers = manager.adapter.list_drivers(&identity).await.unwrap_or_default();
    let mut metadata = SessionMetadata {
        total_laps: build.total_laps,
        track_status: build.track_status,
        race_start_time_s: Some(build.race_start_time_s),
        ..Default::default()
    };
    for d in &drivers {
        metadata.driver_numbers.insert(d.code.clone(), d.number);
        metadata.driver_teams.insert(d.code.clone(), d.team.clone());
        metadata.driver_colors.insert(d.code.clone(), d.color_rgb);
    }

    Ok(SessionArtifact { frames: build.frames, qualifying: Vec::new(), metadata })
}

async fn load_qualifying(
    manager: &Arc<SessionManager>,
    entry: &Arc<SessionEntry>,
) -> Result<SessionArtifact, pipeline::PipelineError> {
    let identity = entry.identity.clone();
    let (catalog, results) = pipeline::build_qualifying_session(manager.adapter.as_ref(), &identity).await?;
    entry.emit_progress(ReplayState::Loading, 60, Some("qualifying telemetry generated".to_string()));

    let drivers = manager.adapter.list_drivers(&identity).await.unwrap_or_default();
    let mut metadata = SessionMetadata { qualifying_results: results, ..Default::default() };
    for d in &drivers {
        metadata.driver_numbers.insert(d.code.clone(), d.number);
        metadata.driver_teams.insert(d.code.clone(), d.team.clone());
        metadata.driver_colors.insert(d.code.clone(), d.color_rgb);
    }

    Ok(SessionArtifact { frames: Vec::new(), qualifying: catalog, metadata })
}
