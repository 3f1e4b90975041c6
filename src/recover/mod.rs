//! Filesystem-aware recovery over a mounted provider tree.
//!
//! Walks directory handles with an explicit work stack (no call-stack
//! recursion, images are untrusted input), selects file entries according
//! to an [`EntrySelection`] policy, and hands them to the copy pool. Every
//! selected entry is read in bounded chunks through its own random-access
//! read.
//!
//! Failures below the root are isolated: an unreadable subdirectory or file
//! becomes a `Failed` outcome and its siblings are still processed. Only an
//! unreadable root is fatal.

use crossbeam_channel::Sender;

use crate::cancel::CancelToken;
use crate::error::{RecoveryError, Result};
use crate::outcome::{RecoveryOutcome, SkipReason};
use crate::output::OutputWriter;
use crate::pool::{self, CopyTask, TaskSource, WorkerPool};
use crate::source::{path_components, Directory, EntryKind, Filesystem, FsEntry};

/// Which file entries a filesystem walk recovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntrySelection {
    /// Every file, allocated or not
    All,
    /// Only unallocated (deleted) files
    #[default]
    DeletedOnly,
}

impl EntrySelection {
    /// `include_unallocated = true` widens the walk to every file;
    /// `false` restricts it to deleted entries.
    pub fn from_include_unallocated(include_unallocated: bool) -> Self {
        if include_unallocated {
            EntrySelection::All
        } else {
            EntrySelection::DeletedOnly
        }
    }

    pub fn includes(&self, allocated: bool) -> bool {
        match self {
            EntrySelection::All => true,
            EntrySelection::DeletedOnly => !allocated,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecoverOptions {
    pub selection: EntrySelection,
    pub chunk_size: usize,
    pub workers: usize,
}

impl Default for RecoverOptions {
    fn default() -> Self {
        Self {
            selection: EntrySelection::default(),
            chunk_size: crate::extract::DEFAULT_CHUNK_SIZE,
            workers: 4,
        }
    }
}

pub struct FilesystemRecoverer<'a> {
    output: &'a OutputWriter,
    cancel: &'a CancelToken,
    options: RecoverOptions,
}

impl<'a> FilesystemRecoverer<'a> {
    pub fn new(output: &'a OutputWriter, cancel: &'a CancelToken, options: RecoverOptions) -> Self {
        Self {
            output,
            cancel,
            options,
        }
    }

    fn pool(&self) -> WorkerPool<'_> {
        WorkerPool::new(
            self.output,
            self.cancel,
            self.options.chunk_size,
            self.options.workers,
        )
    }

    /// Recover everything below `root`.
    ///
    /// `location` names the source for the error raised when the root itself
    /// cannot be enumerated.
    pub fn recover_tree(
        &self,
        location: &str,
        root: Box<dyn Directory>,
    ) -> Result<Vec<RecoveryOutcome>> {
        let listing = root
            .entries()
            .map_err(|e| RecoveryError::source_access(location, e))?;

        let mut outcomes = self
            .pool()
            .run(|tx| self.walk(String::new(), listing, tx));
        outcomes.sort_by(|a, b| a.source_descriptor.cmp(&b.source_descriptor));
        Ok(outcomes)
    }

    /// Resolve one provider path and recover it without walking the tree.
    ///
    /// A file is recovered regardless of the selection policy since it was
    /// named explicitly. A directory is walked with the policy applied.
    pub fn recover_path(&self, fs: &dyn Filesystem, path: &str) -> Result<Vec<RecoveryOutcome>> {
        let entry = fs
            .open_path(path)
            .map_err(|e| RecoveryError::entry_read(path, e))?;
        let descriptor = normalize(path);

        let mut outcomes = match entry.kind() {
            EntryKind::File => {
                let destination = self.output.reserve(entry.name());
                vec![self.pool().copy(CopyTask {
                    descriptor,
                    destination,
                    source: TaskSource::Entry(entry),
                    type_name: None,
                })]
            }
            EntryKind::Directory => {
                let listing = entry
                    .open_dir()
                    .and_then(|d| d.entries())
                    .map_err(|e| RecoveryError::entry_read(path, e))?;
                let prefix = if descriptor == "/" {
                    String::new()
                } else {
                    descriptor
                };
                self.pool().run(|tx| self.walk(prefix, listing, tx))
            }
        };
        outcomes.sort_by(|a, b| a.source_descriptor.cmp(&b.source_descriptor));
        Ok(outcomes)
    }

    /// Depth-first walk producing copy tasks; runs on the traversal thread.
    fn walk(
        &self,
        root_prefix: String,
        root_listing: Vec<Box<dyn FsEntry>>,
        tx: &Sender<CopyTask>,
    ) -> Vec<RecoveryOutcome> {
        let mut outcomes = Vec::new();
        let mut pending: Vec<(String, Box<dyn FsEntry>)> = Vec::new();
        let mut listing = Some((root_prefix, root_listing));
        let mut files = 0usize;
        let mut directories = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Traversal cancelled");
                break;
            }

            let (prefix, entries) = match listing.take() {
                Some(next) => next,
                None => match pending.pop() {
                    Some((descriptor, dir_entry)) => {
                        match dir_entry.open_dir().and_then(|d| d.entries()) {
                            Ok(entries) => (descriptor, entries),
                            Err(e) => {
                                tracing::warn!(
                                    directory = %descriptor,
                                    error = %e,
                                    "Cannot enumerate directory"
                                );
                                outcomes.push(RecoveryOutcome::failed(
                                    descriptor.clone(),
                                    None,
                                    RecoveryError::entry_read(descriptor, e).to_string(),
                                ));
                                continue;
                            }
                        }
                    }
                    None => break,
                },
            };
            directories += 1;

            let mut subdirs = Vec::new();
            for entry in entries {
                let name = entry.name();
                if name == "." || name == ".." {
                    continue;
                }
                let descriptor = format!("{}/{}", prefix, name);

                match entry.kind() {
                    EntryKind::Directory => subdirs.push((descriptor, entry)),
                    EntryKind::File => {
                        files += 1;
                        if !self.options.selection.includes(entry.allocated()) {
                            outcomes.push(RecoveryOutcome::skipped(
                                descriptor,
                                SkipReason::NotSelected,
                            ));
                            continue;
                        }
                        let destination = self.output.reserve(name);
                        let task = CopyTask {
                            descriptor,
                            destination,
                            source: TaskSource::Entry(entry),
                            type_name: None,
                        };
                        if !pool::submit(tx, task) {
                            tracing::error!("Copy workers stopped; ending traversal");
                            return outcomes;
                        }
                    }
                }
            }

            // Reversed so the first subdirectory is popped first
            pending.extend(subdirs.into_iter().rev());
        }

        tracing::debug!(files, directories, "Traversal finished");
        outcomes
    }
}

/// Canonical `/a/b` form of a provider path
fn normalize(path: &str) -> String {
    let joined: Vec<&str> = path_components(path).collect();
    format!("/{}", joined.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::OutcomeStatus;
    use crate::source::{MemoryDirectory, MemoryFile, MemoryFilesystem};
    use std::io;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn sample_fs() -> MemoryFilesystem {
        MemoryFilesystem::new(
            MemoryDirectory::new("/")
                .file(MemoryFile::new("live.txt", b"still here".to_vec()))
                .file(
                    MemoryFile::new("deleted.jpg", b"\xFF\xD8\xFFjpeg\xFF\xD9".to_vec())
                        .unallocated(),
                )
                .dir(
                    MemoryDirectory::new("docs")
                        .file(
                            MemoryFile::new("report.pdf", b"%PDF-1.7 gone".to_vec())
                                .unallocated(),
                        )
                        .file(MemoryFile::new("notes.txt", b"kept".to_vec())),
                ),
        )
    }

    fn recover_all(
        fs: &MemoryFilesystem,
        selection: EntrySelection,
    ) -> (tempfile::TempDir, Vec<RecoveryOutcome>) {
        let dir = tempdir().unwrap();
        let output = OutputWriter::create(dir.path()).unwrap();
        let cancel = CancelToken::new();
        let recoverer = FilesystemRecoverer::new(
            &output,
            &cancel,
            RecoverOptions {
                selection,
                chunk_size: 4,
                workers: 2,
            },
        );
        let outcomes = recoverer.recover_tree("memory", fs.root().unwrap()).unwrap();
        (dir, outcomes)
    }

    fn status_of<'o>(outcomes: &'o [RecoveryOutcome], descriptor: &str) -> &'o OutcomeStatus {
        &outcomes
            .iter()
            .find(|o| o.source_descriptor == descriptor)
            .unwrap()
            .status
    }

    #[test]
    fn test_selection_policy() {
        assert_eq!(EntrySelection::from_include_unallocated(true), EntrySelection::All);
        assert_eq!(
            EntrySelection::from_include_unallocated(false),
            EntrySelection::DeletedOnly
        );
        assert!(EntrySelection::All.includes(true));
        assert!(EntrySelection::All.includes(false));
        assert!(!EntrySelection::DeletedOnly.includes(true));
        assert!(EntrySelection::DeletedOnly.includes(false));
    }

    #[test]
    fn test_include_unallocated_recovers_everything() {
        let (dir, outcomes) = recover_all(&sample_fs(), EntrySelection::All);
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.is_recovered()));
        assert_eq!(
            std::fs::read(dir.path().join("report.pdf")).unwrap(),
            b"%PDF-1.7 gone"
        );
        assert_eq!(std::fs::read(dir.path().join("live.txt")).unwrap(), b"still here");
    }

    #[test]
    fn test_deleted_only_skips_live_files() {
        let (dir, outcomes) = recover_all(&sample_fs(), EntrySelection::DeletedOnly);
        assert_eq!(*status_of(&outcomes, "/deleted.jpg"), OutcomeStatus::Recovered);
        assert_eq!(*status_of(&outcomes, "/docs/report.pdf"), OutcomeStatus::Recovered);
        assert_eq!(
            *status_of(&outcomes, "/live.txt"),
            OutcomeStatus::Skipped(SkipReason::NotSelected)
        );
        assert!(!dir.path().join("live.txt").exists());
        assert!(!dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_outcomes_sorted_by_descriptor() {
        let (_dir, outcomes) = recover_all(&sample_fs(), EntrySelection::All);
        let descriptors: Vec<_> = outcomes.iter().map(|o| o.source_descriptor.as_str()).collect();
        assert_eq!(
            descriptors,
            vec!["/deleted.jpg", "/docs/notes.txt", "/docs/report.pdf", "/live.txt"]
        );
    }

    #[test]
    fn test_self_references_are_skipped() {
        // A provider that lists "." and ".." as real directories would loop forever
        let fs = MemoryFilesystem::new(
            MemoryDirectory::new("/")
                .dir(MemoryDirectory::new(".").file(MemoryFile::new("trap", b"x".to_vec())))
                .dir(MemoryDirectory::new(".."))
                .file(MemoryFile::new("ok.bin", b"ok".to_vec())),
        );
        let (_dir, outcomes) = recover_all(&fs, EntrySelection::All);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].source_descriptor, "/ok.bin");
    }

    #[test]
    fn test_failing_entry_does_not_stop_siblings() {
        let fs = MemoryFilesystem::new(
            MemoryDirectory::new("/")
                .file(MemoryFile::new("a.bin", b"aaaa".to_vec()))
                .file(MemoryFile::new("bad.bin", b"bbbb".to_vec()).failing())
                .file(MemoryFile::new("c.bin", b"cccc".to_vec())),
        );
        let (dir, outcomes) = recover_all(&fs, EntrySelection::All);
        assert!(outcomes[0].is_recovered());
        assert!(outcomes[1].is_failed());
        assert!(outcomes[2].is_recovered());
        assert!(!dir.path().join("bad.bin").exists());
    }

    #[test]
    fn test_chunked_reads_follow_declared_size() {
        let file = MemoryFile::new("big.bin", vec![9u8; 10]);
        let reads = file.read_counter();
        let fs = MemoryFilesystem::new(MemoryDirectory::new("/").file(file));
        let (dir, outcomes) = recover_all(&fs, EntrySelection::All);
        assert_eq!(outcomes[0].bytes, 10);
        // chunk_size 4: reads at 0, 4, 8
        assert_eq!(reads.load(Ordering::Relaxed), 3);
        assert_eq!(std::fs::read(dir.path().join("big.bin")).unwrap(), vec![9u8; 10]);
    }

    #[test]
    fn test_declared_size_past_data_is_short_read() {
        let fs = MemoryFilesystem::new(
            MemoryDirectory::new("/")
                .file(MemoryFile::new("trunc.bin", b"abc".to_vec()).declared_size(100)),
        );
        let (dir, outcomes) = recover_all(&fs, EntrySelection::All);
        assert!(outcomes[0].is_recovered());
        assert_eq!(std::fs::read(dir.path().join("trunc.bin")).unwrap(), b"abc");
    }

    #[test]
    fn test_colliding_names_get_suffixes_in_traversal_order() {
        let fs = MemoryFilesystem::new(
            MemoryDirectory::new("/")
                .file(MemoryFile::new("img.jpg", b"root".to_vec()))
                .dir(
                    MemoryDirectory::new("a")
                        .file(MemoryFile::new("img.jpg", b"from a".to_vec())),
                )
                .dir(
                    MemoryDirectory::new("b")
                        .file(MemoryFile::new("img.jpg", b"from b".to_vec())),
                ),
        );
        let (dir, _outcomes) = recover_all(&fs, EntrySelection::All);
        assert_eq!(std::fs::read(dir.path().join("img.jpg")).unwrap(), b"root");
        assert_eq!(std::fs::read(dir.path().join("img (1).jpg")).unwrap(), b"from a");
        assert_eq!(std::fs::read(dir.path().join("img (2).jpg")).unwrap(), b"from b");
    }

    #[test]
    fn test_empty_tree_yields_nothing() {
        let fs = MemoryFilesystem::new(MemoryDirectory::new("/"));
        let (_dir, outcomes) = recover_all(&fs, EntrySelection::All);
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_deep_tree_does_not_recurse() {
        let mut dir = MemoryDirectory::new("leaf").file(MemoryFile::new("deep.bin", b"d".to_vec()));
        for depth in 0..300 {
            dir = MemoryDirectory::new(format!("d{}", depth)).dir(dir);
        }
        let fs = MemoryFilesystem::new(MemoryDirectory::new("/").dir(dir));
        let (_dir, outcomes) = recover_all(&fs, EntrySelection::All);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].source_descriptor.ends_with("/leaf/deep.bin"));
    }

    #[test]
    fn test_recover_single_path() {
        let fs = sample_fs();
        let dir = tempdir().unwrap();
        let output = OutputWriter::create(dir.path()).unwrap();
        let cancel = CancelToken::new();
        let recoverer = FilesystemRecoverer::new(&output, &cancel, RecoverOptions::default());

        // Explicit path: recovered even though it is allocated
        let outcomes = recoverer.recover_path(&fs, "docs/notes.txt").unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].source_descriptor, "/docs/notes.txt");
        assert!(outcomes[0].is_recovered());
        assert_eq!(std::fs::read(dir.path().join("notes.txt")).unwrap(), b"kept");

        let err = recoverer.recover_path(&fs, "/docs/missing.doc").unwrap_err();
        assert!(matches!(err, RecoveryError::EntryRead { .. }));
    }

    #[test]
    fn test_recover_single_directory_applies_policy() {
        let fs = sample_fs();
        let dir = tempdir().unwrap();
        let output = OutputWriter::create(dir.path()).unwrap();
        let cancel = CancelToken::new();
        let recoverer = FilesystemRecoverer::new(&output, &cancel, RecoverOptions::default());

        let outcomes = recoverer.recover_path(&fs, "/docs").unwrap();
        assert_eq!(*status_of(&outcomes, "/docs/report.pdf"), OutcomeStatus::Recovered);
        assert_eq!(
            *status_of(&outcomes, "/docs/notes.txt"),
            OutcomeStatus::Skipped(SkipReason::NotSelected)
        );
    }

    struct BrokenRoot;

    impl Directory for BrokenRoot {
        fn entries(&self) -> io::Result<Vec<Box<dyn FsEntry>>> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt root"))
        }
    }

    #[test]
    fn test_unreadable_root_is_source_error() {
        let dir = tempdir().unwrap();
        let output = OutputWriter::create(dir.path()).unwrap();
        let cancel = CancelToken::new();
        let recoverer = FilesystemRecoverer::new(&output, &cancel, RecoverOptions::default());
        let err = recoverer.recover_tree("image.dd", Box::new(BrokenRoot)).unwrap_err();
        assert!(matches!(err, RecoveryError::SourceAccess { .. }));
    }

    #[test]
    fn test_cancelled_before_start_recovers_nothing() {
        let dir = tempdir().unwrap();
        let output = OutputWriter::create(dir.path()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let recoverer = FilesystemRecoverer::new(&output, &cancel, RecoverOptions::default());
        let outcomes = recoverer
            .recover_tree("memory", sample_fs().root().unwrap())
            .unwrap();
        assert!(outcomes.iter().all(|o| !o.is_recovered()));
    }
}
