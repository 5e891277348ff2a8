//! Persisted session cache: one binary artifact per (year, round, kind),
//! targeting a single structured artifact instead of row-oriented files.

use model::{QualifyingLapTelemetry, SessionIdentity, SessionMetadata};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] bincode::Error),
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SessionArtifact {
    pub frames: Vec<model::Frame>,
    pub qualifying: Vec<QualifyingLapTelemetry>,
    pub metadata: SessionMetadata,
}

pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, identity: &SessionIdentity) -> PathBuf {
        self.dir.join(format!("{}.bin", identity.session_id()))
    }

    /// Loads a cached artifact. A missing, truncated, or otherwise corrupt
    /// file is treated identically: logged at `warn` and returned as
    /// `None`, matching the `CacheMiss` handling in the error design (the
    /// caller recomputes as if nothing were cached).
    pub fn load(&self, identity: &SessionIdentity) -> Option<SessionArtifact> {
        let path = self.path_for(identity);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(?path, %err, "failed reading cache artifact");
                return None;
            }
        };
        match bincode::deserialize::<SessionArtifact>(&bytes) {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                tracing::warn!(?path, %err, "cache artifact failed to deserialize, treating as miss");
                None
            }
        }
    }

    pub fn store(&self, identity: &SessionIdentity, artifact: &SessionArtifact) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(identity);
        let tmp_path = path.with_extension("bin.tmp");
        let bytes = bincode::serialize(artifact)?;
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn exists(&self, identity: &SessionIdentity) -> bool {
        self.path_for(identity).exists()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{SessionKind, Frame};
    use std::collections::BTreeMap;

    fn identity() -> SessionIdentity {
        SessionIdentity { year: 2024, round: 5, kind: SessionKind::Race }
    }

    fn artifact() -> SessionArtifact {
        SessionArtifact {
            frames: vec![Frame {
                t_s: 0.0,
                leader_lap: 1,
                track_status: None,
                drivers: BTreeMap::new(),
                weather: None,
            }],
            qualifying: vec![],
            metadata: SessionMetadata::default(),
        }
    }

    #[test]
    fn round_trips_through_store_and_load() {
        let tmp = std::env::temp_dir().join(format!("replay-cache-test-{}", std::process::id()));
        let cache = FileCache::new(&tmp);
        let id = identity();
        let original = artifact();
        cache.store(&id, &original).unwrap();
        let restored = cache.load(&id).unwrap();
        assert_eq!(restored.frames.len(), original.frames.len());
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_file_is_a_clean_miss() {
        let tmp = std::env::temp_dir().join(format!("replay-cache-missing-{}", std::process::id()));
        let cache = FileCache::new(&tmp);
        assert!(cache.load(&identity()).is_none());
    }

    #[test]
    fn corrupt_file_is_treated_as_miss() {
        let tmp = std::env::temp_dir().join(format!("replay-cache-corrupt-{}", std::process::id()));
        fs::create_dir_all(&tmp).unwrap();
        let cache = FileCache::new(&tmp);
        let id = identity();
        fs::write(cache.path_for(&id), b"not a valid artifact").unwrap();
        assert!(cache.load(&id).is_none());
        let _ = fs::remove_dir_all(&tmp);
    }
}
