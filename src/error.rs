//! Error taxonomy for a recovery run.
//!
//! Configuration and source-access errors are fatal for the whole run.
//! Entry-level read and write errors are caught per entry and recorded as a
//! failed outcome; only a destination root that cannot be created is fatal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the recovery engine
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// Catalog missing, unparsable, or holding invalid hex; bad job settings
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The device, image, or directory root cannot be opened or enumerated
    #[error("cannot access source {location}: {cause}")]
    SourceAccess {
        location: String,
        #[source]
        cause: io::Error,
    },

    /// A specific entry could not be fully read
    #[error("cannot read entry {entry}: {cause}")]
    EntryRead {
        entry: String,
        #[source]
        cause: io::Error,
    },

    /// Destination directory or file cannot be created or written
    #[error("cannot write {}: {cause}", path.display())]
    Destination {
        path: PathBuf,
        #[source]
        cause: io::Error,
    },

    /// The run-scoped cancellation token was tripped
    #[error("recovery cancelled")]
    Cancelled,
}

impl RecoveryError {
    pub fn config(msg: impl Into<String>) -> Self {
        RecoveryError::Configuration(msg.into())
    }

    pub fn source_access(location: impl Into<String>, cause: io::Error) -> Self {
        RecoveryError::SourceAccess {
            location: location.into(),
            cause,
        }
    }

    pub fn entry_read(entry: impl Into<String>, cause: io::Error) -> Self {
        RecoveryError::EntryRead {
            entry: entry.into(),
            cause,
        }
    }

    pub fn destination(path: impl Into<PathBuf>, cause: io::Error) -> Self {
        RecoveryError::Destination {
            path: path.into(),
            cause,
        }
    }

    /// True for errors that abort the whole run rather than a single entry
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecoveryError::Configuration(_) | RecoveryError::SourceAccess { .. }
        )
    }
}

pub type Result<T, E = RecoveryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(RecoveryError::config("bad hex").is_fatal());
        assert!(RecoveryError::source_access(
            "/dev/nope",
            io::Error::new(io::ErrorKind::NotFound, "missing")
        )
        .is_fatal());
        assert!(!RecoveryError::entry_read(
            "/a.jpg",
            io::Error::new(io::ErrorKind::UnexpectedEof, "short")
        )
        .is_fatal());
        assert!(!RecoveryError::Cancelled.is_fatal());
    }

    #[test]
    fn test_display_keeps_cause() {
        let err = RecoveryError::destination(
            "/out/a.jpg",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/out/a.jpg"));
        assert!(msg.contains("denied"));
    }
}
