//! Recovery manifest - JSON record of a run written next to its output.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, Result};
use crate::outcome::{OutcomeCounts, RecoveryOutcome};

/// Default file name inside the destination directory
pub const MANIFEST_FILE_NAME: &str = "salvage-manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryManifest {
    pub version: u32,
    pub tool_version: String,
    /// "carve" or "filesystem"
    pub mode: String,
    pub source: String,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub counts: OutcomeCounts,
    pub outcomes: Vec<RecoveryOutcome>,
}

impl RecoveryManifest {
    pub fn new(
        mode: impl Into<String>,
        source: &Path,
        destination: &Path,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: 1,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: mode.into(),
            source: source.to_string_lossy().to_string(),
            destination: destination.to_string_lossy().to_string(),
            started_at,
            finished_at: started_at,
            cancelled: false,
            counts: OutcomeCounts::default(),
            outcomes: Vec::new(),
        }
    }

    /// Record the final outcome list and close the run
    pub fn finish(mut self, outcomes: &[RecoveryOutcome], cancelled: bool) -> Self {
        self.finished_at = Utc::now();
        self.cancelled = cancelled;
        self.counts = OutcomeCounts::tally(outcomes);
        self.outcomes = outcomes.to_vec();
        self
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            RecoveryError::destination(path, std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        fs::write(path, json).map_err(|e| RecoveryError::destination(path, e))?;
        tracing::info!(path = %path.display(), "Wrote recovery manifest");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RecoveryError::config(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RecoveryError::config(format!("invalid manifest {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SkipReason;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_load() {
        let dir = tempdir().unwrap();
        let outcomes = vec![
            RecoveryOutcome::recovered("/src/a.jpg", PathBuf::from("/out/a.jpg"), 3, "ab".into())
                .with_type("jpg"),
            RecoveryOutcome::skipped("/src/b.txt", SkipReason::NoSignatureMatch),
        ];
        let manifest = RecoveryManifest::new("carve", Path::new("/src"), dir.path(), Utc::now())
            .finish(&outcomes, false);

        let path = dir.path().join(MANIFEST_FILE_NAME);
        manifest.write_to(&path).unwrap();

        let loaded = RecoveryManifest::load(&path).unwrap();
        assert_eq!(loaded.mode, "carve");
        assert_eq!(loaded.counts.recovered, 1);
        assert_eq!(loaded.counts.skipped, 1);
        assert_eq!(loaded.outcomes, outcomes);
        assert!(loaded.finished_at >= loaded.started_at);
    }
}
