//! Per-entry results of a recovery run.
//!
//! Outcomes are append-only: one is created per attempted entry and never
//! revised afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Why an entry was not recovered without that being a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Carve mode: content matched no selected signature
    NoSignatureMatch,
    /// Filesystem mode: entry excluded by the selection policy
    NotSelected,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoSignatureMatch => write!(f, "no signature match"),
            SkipReason::NotSelected => write!(f, "not selected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Recovered,
    Skipped(SkipReason),
    Failed(String),
}

/// Result of one attempted entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Source path or provider path of the entry
    pub source_descriptor: String,
    /// Where the bytes were written, when they were
    pub destination_path: Option<PathBuf>,
    pub status: OutcomeStatus,
    /// Bytes written
    #[serde(default)]
    pub bytes: u64,
    /// Matched signature (carve mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// BLAKE3 digest of the written bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blake3: Option<String>,
}

impl RecoveryOutcome {
    pub fn recovered(
        source_descriptor: impl Into<String>,
        destination_path: PathBuf,
        bytes: u64,
        blake3: String,
    ) -> Self {
        Self {
            source_descriptor: source_descriptor.into(),
            destination_path: Some(destination_path),
            status: OutcomeStatus::Recovered,
            bytes,
            type_name: None,
            blake3: Some(blake3),
        }
    }

    pub fn skipped(source_descriptor: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            source_descriptor: source_descriptor.into(),
            destination_path: None,
            status: OutcomeStatus::Skipped(reason),
            bytes: 0,
            type_name: None,
            blake3: None,
        }
    }

    pub fn failed(
        source_descriptor: impl Into<String>,
        destination_path: Option<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_descriptor: source_descriptor.into(),
            destination_path,
            status: OutcomeStatus::Failed(reason.into()),
            bytes: 0,
            type_name: None,
            blake3: None,
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn is_recovered(&self) -> bool {
        matches!(self.status, OutcomeStatus::Recovered)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed(_))
    }
}

/// Aggregate counts over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub recovered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_recovered: u64,
}

impl OutcomeCounts {
    pub fn tally(outcomes: &[RecoveryOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut counts, o| {
            match o.status {
                OutcomeStatus::Recovered => {
                    counts.recovered += 1;
                    counts.bytes_recovered += o.bytes;
                }
                OutcomeStatus::Skipped(_) => counts.skipped += 1,
                OutcomeStatus::Failed(_) => counts.failed += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.recovered + self.skipped + self.failed
    }
}
