//! Recovery job - one full run from an immutable [`RecoveryConfig`].
//!
//! - **Carve mode** walks an accessible directory tree, classifies every
//!   regular file by signature, and copies matches to the destination.
//!   It only finds misnamed files that still exist; it never touches raw
//!   sectors or allocation metadata.
//! - **Filesystem mode** opens a device or image through an
//!   [`ImageDecoder`], mounts it through a [`FilesystemProvider`], and hands
//!   the tree to the [`FilesystemRecoverer`]. This is the only mode that can
//!   bring back deleted files.
//! - **Trash mode** is the quick scan: every regular file under a trash or
//!   recycle-bin folder is copied out as is, with no signature check.
//!
//! The source is opened before the destination is touched, so a bad source
//! leaves no output behind. Source and destination root failures abort the
//! run; everything below them is recorded per entry.

mod report;

pub use report::RecoveryReport;

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::carve::Carver;
use crate::catalog::SignatureCatalog;
use crate::error::{RecoveryError, Result};
use crate::extract::DEFAULT_CHUNK_SIZE;
use crate::outcome::{OutcomeCounts, RecoveryOutcome, SkipReason};
use crate::output::manifest::MANIFEST_FILE_NAME;
use crate::output::{OutputWriter, RecoveryManifest};
use crate::pool::{self, CopyTask, TaskSource, WorkerPool};
use crate::recover::{EntrySelection, FilesystemRecoverer, RecoverOptions};
use crate::source::{FilesystemProvider, ImageDecoder, RawDecoder, RawImage};

/// Default number of copy workers, sized for I/O rather than CPU
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Signature scan of an accessible directory tree
    Carve,
    /// Metadata walk of a device or image, deleted entries included
    Filesystem,
    /// Copy everything under a trash folder
    Trash,
}

impl fmt::Display for RecoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryMode::Carve => write!(f, "carve"),
            RecoveryMode::Filesystem => write!(f, "filesystem"),
            RecoveryMode::Trash => write!(f, "trash"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Mounted directory tree (carve and trash modes)
    Directory,
    /// Live block device
    Device,
    /// Forensic or raw image file
    Image,
}

/// Everything one run needs, fixed before the run starts
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub mode: RecoveryMode,
    pub source: PathBuf,
    pub source_kind: SourceKind,
    pub destination_dir: PathBuf,
    /// Filesystem mode: recover every file instead of deleted ones only
    pub include_unallocated: bool,
    /// Carve mode: catalog types to look for (empty = all)
    pub selected_types: BTreeSet<String>,
    /// Recover one path instead of the whole tree
    pub target_path: Option<String>,
    pub chunk_size: usize,
    pub workers: usize,
    pub write_manifest: bool,
    pub manifest_name: String,
}

impl RecoveryConfig {
    pub fn carve(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: RecoveryMode::Carve,
            source: source.into(),
            source_kind: SourceKind::Directory,
            destination_dir: destination_dir.into(),
            include_unallocated: false,
            selected_types: BTreeSet::new(),
            target_path: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            write_manifest: true,
            manifest_name: MANIFEST_FILE_NAME.to_string(),
        }
    }

    pub fn filesystem(
        source: impl Into<PathBuf>,
        source_kind: SourceKind,
        destination_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mode: RecoveryMode::Filesystem,
            source_kind,
            ..Self::carve(source, destination_dir)
        }
    }

    /// Quick scan of a trash folder
    pub fn trash(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: RecoveryMode::Trash,
            ..Self::carve(source, destination_dir)
        }
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_include_unallocated(mut self, include: bool) -> Self {
        self.include_unallocated = include;
        self
    }

    pub fn with_target_path(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_manifest(mut self, write: bool) -> Self {
        self.write_manifest = write;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RecoveryError::config("chunk size must be greater than zero"));
        }
        if self.workers == 0 {
            return Err(RecoveryError::config("worker count must be greater than zero"));
        }
        match (self.mode, self.source_kind) {
            (RecoveryMode::Carve | RecoveryMode::Trash, SourceKind::Directory) => {}
            (RecoveryMode::Carve | RecoveryMode::Trash, kind) => {
                return Err(RecoveryError::config(format!(
                    "{} mode scans a directory tree, not a {:?} source",
                    self.mode, kind
                )))
            }
            (RecoveryMode::Filesystem, SourceKind::Directory) => {
                return Err(RecoveryError::config(
                    "filesystem mode needs a device or image source",
                ))
            }
            (RecoveryMode::Filesystem, _) => {}
        }
        if self.write_manifest && self.manifest_name.trim().is_empty() {
            return Err(RecoveryError::config("manifest name must not be empty"));
        }
        Ok(())
    }

    pub fn selection(&self) -> EntrySelection {
        EntrySelection::from_include_unallocated(self.include_unallocated)
    }
}

/// Orchestrates one run
pub struct RecoveryJob {
    config: RecoveryConfig,
    catalog: SignatureCatalog,
    decoder: Arc<dyn ImageDecoder>,
    provider: Option<Arc<dyn FilesystemProvider>>,
    cancel: CancelToken,
}

impl RecoveryJob {
    /// Job with the built-in catalog, the raw decoder, and no filesystem
    /// provider
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            catalog: SignatureCatalog::builtin(),
            decoder: Arc::new(RawDecoder),
            provider: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: SignatureCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn FilesystemProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Token that stops this run when tripped
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self) -> Result<RecoveryReport> {
        self.config.validate()?;
        let started_at = Utc::now();
        let clock = Instant::now();

        tracing::info!(
            mode = %self.config.mode,
            source = %self.config.source.display(),
            destination = %self.config.destination_dir.display(),
            workers = self.config.workers,
            "Starting recovery"
        );

        let mut outcomes = match self.config.mode {
            RecoveryMode::Carve | RecoveryMode::Trash => self.run_tree()?,
            RecoveryMode::Filesystem => self.run_filesystem()?,
        };
        outcomes.sort_by(|a, b| a.source_descriptor.cmp(&b.source_descriptor));

        let cancelled = self.cancel.is_cancelled();
        let counts = OutcomeCounts::tally(&outcomes);

        let manifest_path = if self.config.write_manifest {
            let path = self.config.destination_dir.join(&self.config.manifest_name);
            let manifest = RecoveryManifest::new(
                self.config.mode.to_string(),
                &self.config.source,
                &self.config.destination_dir,
                started_at,
            )
            .finish(&outcomes, cancelled);
            match manifest.write_to(&path) {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "Manifest not written");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            recovered = counts.recovered,
            skipped = counts.skipped,
            failed = counts.failed,
            bytes = counts.bytes_recovered,
            cancelled,
            "Recovery finished"
        );

        Ok(RecoveryReport {
            mode: self.config.mode,
            source: self.config.source.clone(),
            destination: self.config.destination_dir.clone(),
            outcomes,
            counts,
            cancelled,
            manifest_path,
            elapsed: clock.elapsed(),
        })
    }

    /// Destination root, with the manifest name claimed up front
    fn open_output(&self) -> Result<OutputWriter> {
        let output = OutputWriter::create(&self.config.destination_dir)?;
        if self.config.write_manifest {
            output.reserve(&self.config.manifest_name);
        }
        Ok(output)
    }

    fn run_filesystem(&self) -> Result<Vec<RecoveryOutcome>> {
        let location = self.config.source.display().to_string();
        let provider = self.provider.as_ref().ok_or_else(|| {
            RecoveryError::config("filesystem mode requires a filesystem provider")
        })?;

        let bytes = self
            .decoder
            .open(&self.config.source)
            .map_err(|e| RecoveryError::source_access(&location, e))?;
        let mounted = provider
            .mount(bytes)
            .map_err(|e| RecoveryError::source_access(&location, e))?;

        let output = self.open_output()?;
        let recoverer = FilesystemRecoverer::new(
            &output,
            &self.cancel,
            RecoverOptions {
                selection: self.config.selection(),
                chunk_size: self.config.chunk_size,
                workers: self.config.workers,
            },
        );

        match self.config.target_path {
            Some(ref path) => recoverer.recover_path(mounted.as_ref(), path),
            None => {
                let root = mounted
                    .root()
                    .map_err(|e| RecoveryError::source_access(&location, e))?;
                recoverer.recover_tree(&location, root)
            }
        }
    }

    /// Carve and trash runs over a mounted directory tree
    fn run_tree(&self) -> Result<Vec<RecoveryOutcome>> {
        let carver = match self.config.mode {
            RecoveryMode::Carve => {
                Some(Carver::with_selection(&self.catalog, &self.config.selected_types)?)
            }
            _ => None,
        };
        let source = &self.config.source;
        let location = source.display().to_string();

        let root =
            fs::canonicalize(source).map_err(|e| RecoveryError::source_access(&location, e))?;
        if !root.is_dir() {
            return Err(RecoveryError::source_access(
                location,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let start = match self.config.target_path {
            Some(ref target) => {
                let joined = root.join(target.trim_start_matches(['/', '\\']));
                let entry = joined.display().to_string();
                let path =
                    fs::canonicalize(&joined).map_err(|e| RecoveryError::entry_read(&entry, e))?;
                if !path.starts_with(&root) {
                    return Err(RecoveryError::entry_read(
                        entry,
                        io::Error::new(io::ErrorKind::InvalidInput, "path leaves the source tree"),
                    ));
                }
                if path.is_dir() {
                    fs::read_dir(&path).map_err(|e| RecoveryError::entry_read(&entry, e))?;
                }
                path
            }
            None => {
                // An unlistable root aborts before any output exists
                fs::read_dir(&root).map_err(|e| RecoveryError::source_access(&location, e))?;
                root
            }
        };

        let output = self.open_output()?;
        // Recovered files must not be rescanned when the destination is inside the source
        let exclude = fs::canonicalize(output.root()).ok();

        let pool = WorkerPool::new(
            &output,
            &self.cancel,
            self.config.chunk_size,
            self.config.workers,
        );
        Ok(pool.run(|tx| self.walk_tree(carver.as_ref(), &output, &start, exclude.as_deref(), tx)))
    }

    /// Walk `start` and queue copies. Without a carver every regular file
    /// is taken.
    fn walk_tree(
        &self,
        carver: Option<&Carver>,
        output: &OutputWriter,
        start: &Path,
        exclude: Option<&Path>,
        tx: &Sender<CopyTask>,
    ) -> Vec<RecoveryOutcome> {
        let mut outcomes = Vec::new();
        let walker = WalkDir::new(start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && Some(e.path()) == exclude));

        for entry in walker {
            if self.cancel.is_cancelled() {
                tracing::info!("Traversal cancelled");
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let descriptor = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| start.display().to_string());
                    tracing::warn!(path = %descriptor, error = %e, "Cannot enumerate");
                    outcomes.push(RecoveryOutcome::failed(descriptor, None, e.to_string()));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let descriptor = path.display().to_string();
            let file = match RawImage::open(path) {
                Ok(file) => file,
                Err(e) => {
                    let err = RecoveryError::entry_read(&descriptor, e);
                    tracing::warn!(error = %err, "Cannot open file");
                    outcomes.push(RecoveryOutcome::failed(descriptor, None, err.to_string()));
                    continue;
                }
            };

            let type_name = match carver.map(|c| c.classify_source(&file)) {
                None => None,
                Some(Ok(Some(def))) => {
                    tracing::debug!(
                        path = %descriptor,
                        type_name = def.type_name(),
                        "Signature match"
                    );
                    Some(def.type_name().to_string())
                }
                Some(Ok(None)) => {
                    outcomes.push(RecoveryOutcome::skipped(
                        descriptor,
                        SkipReason::NoSignatureMatch,
                    ));
                    continue;
                }
                Some(Err(e)) => {
                    let err = RecoveryError::entry_read(&descriptor, e);
                    tracing::warn!(error = %err, "Cannot classify file");
                    outcomes.push(RecoveryOutcome::failed(descriptor, None, err.to_string()));
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy();
            let task = CopyTask {
                destination: output.reserve(&name),
                descriptor,
                source: TaskSource::Bytes(Box::new(file)),
                type_name,
            };
            if !pool::submit(tx, task) {
                tracing::error!("Copy workers stopped; ending traversal");
                break;
            }
        }

        outcomes
    }
}
