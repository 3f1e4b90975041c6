//! Salvage Library
//!
//! File recovery engine with three modes:
//!
//! - **Carve**: walk a mounted directory tree and copy out every file whose
//!   content matches a signature from the [`SignatureCatalog`], whatever
//!   its name or extension
//! - **Filesystem**: open a device or image through an [`ImageDecoder`],
//!   mount it through a [`FilesystemProvider`], and extract entries
//!   (deleted ones included) with bounded random-access reads
//! - **Trash**: copy everything under a trash or recycle-bin folder
//!
//! # Features
//!
//! - **Ordered catalog**: first-match-wins header/footer matching
//! - **Bounded memory**: every copy streams through fixed-size chunks
//! - **Worker pool**: one traversal thread, N copy workers, deterministic
//!   collision names (`photo (1).jpg`)
//! - **Isolation**: a bad entry becomes a failed outcome, never a failed run
//! - **Manifest**: BLAKE3 digest of every recovered file
//!
//! # Example
//!
//! ```no_run
//! use salvage::{RecoveryConfig, RecoveryJob};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = RecoveryConfig::carve("/mnt/usb", "/tmp/recovered").with_types(["jpg", "png"]);
//!     let report = RecoveryJob::new(config).run()?;
//!
//!     println!("Recovered {} files", report.counts.recovered);
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod carve;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod job;
pub mod outcome;
pub mod output;
mod pool;
pub mod recover;
pub mod source;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use carve::Carver;
pub use catalog::{SignatureCatalog, SignatureDefinition};
pub use config::Config;
pub use error::RecoveryError;
pub use job::{RecoveryConfig, RecoveryJob, RecoveryMode, RecoveryReport, SourceKind};
pub use outcome::{OutcomeCounts, OutcomeStatus, RecoveryOutcome, SkipReason};
pub use output::{OutputWriter, RecoveryManifest};
pub use recover::{EntrySelection, FilesystemRecoverer};
pub use source::{
    ByteSource, DeviceEnumerator, Directory, EntryKind, Filesystem, FilesystemProvider, FsEntry,
    ImageDecoder,
};
