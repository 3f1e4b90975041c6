use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;

use super::RecoveryMode;
use crate::outcome::{OutcomeCounts, OutcomeStatus, RecoveryOutcome};

/// Result of a finished (or cancelled) run
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub mode: RecoveryMode,
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Every attempted entry, sorted by source descriptor
    pub outcomes: Vec<RecoveryOutcome>,
    pub counts: OutcomeCounts,
    pub cancelled: bool,
    pub manifest_path: Option<PathBuf>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RecoveryReport {
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match o.status {
            OutcomeStatus::Failed(ref reason) => {
                Some((o.source_descriptor.as_str(), reason.as_str()))
            }
            _ => None,
        })
    }

    /// True when the run finished without cancellation or failed entries
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.counts.failed == 0
    }

    /// Human-readable summary for the terminal
    pub fn summary(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("\n  {}\n", "Salvage Recovery Summary".bold()));
        out.push_str("  ==========================================\n\n");

        out.push_str(&format!("  Mode:           {}\n", self.mode));
        out.push_str(&format!("  Source:         {}\n", self.source.display()));
        out.push_str(&format!("  Destination:    {}\n", self.destination.display()));
        out.push_str(&format!(
            "  Recovered:      {}\n",
            self.counts.recovered.to_string().green()
        ));
        out.push_str(&format!(
            "  Skipped:        {}\n",
            self.counts.skipped.to_string().yellow()
        ));
        let failed = if self.counts.failed > 0 {
            self.counts.failed.to_string().red().bold()
        } else {
            self.counts.failed.to_string().normal()
        };
        out.push_str(&format!("  Failed:         {}\n", failed));
        out.push_str(&format!(
            "  Bytes written:  {}\n",
            humansize::format_size(self.counts.bytes_recovered, humansize::BINARY)
        ));
        out.push_str(&format!("  Elapsed:        {:.2?}\n", self.elapsed));
        if let Some(ref manifest) = self.manifest_path {
            out.push_str(&format!("  Manifest:       {}\n", manifest.display()));
        }

        if self.cancelled {
            out.push_str(&format!("\n  {}\n", "Run was cancelled before completion".yellow()));
        }

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            out.push_str("\n  Failures:\n");
            for (source, reason) in failures {
                out.push_str(&format!("    [{}] {}\n", "FAILED".red(), source));
                out.push_str(&format!("      {}\n", reason));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SkipReason;

    #[test]
    fn test_summary_lists_failures() {
        colored::control::set_override(false);
        let outcomes = vec![
            RecoveryOutcome::recovered("/a.jpg", PathBuf::from("/out/a.jpg"), 2048, "00".into()),
            RecoveryOutcome::skipped("/b.txt", SkipReason::NoSignatureMatch),
            RecoveryOutcome::failed("/c.pdf", None, "bad sector at 4096"),
        ];
        let report = RecoveryReport {
            mode: RecoveryMode::Filesystem,
            source: PathBuf::from("/dev/sdb"),
            destination: PathBuf::from("/out"),
            counts: OutcomeCounts::tally(&outcomes),
            outcomes,
            cancelled: false,
            manifest_path: None,
            elapsed: Duration::from_millis(12),
        };

        let summary = report.summary();
        assert!(summary.contains("Recovered:      1"));
        assert!(summary.contains("Failed:         1"));
        assert!(summary.contains("2 KiB"));
        assert!(summary.contains("/c.pdf"));
        assert!(summary.contains("bad sector at 4096"));
        assert!(!report.is_clean());
    }
}
