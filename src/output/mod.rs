//! Output module - persist recovered bytes under the destination directory.
//!
//! Every recovered entry is written as `destination/basename(name)`. Names
//! are reserved up front, in traversal order, so a second entry with the
//! same base name deterministically becomes `stem (1).ext`, the third
//! `stem (2).ext`, and so on. Reservation keys are case-folded so the result
//! is the same on case-insensitive filesystems. Files left by an earlier run
//! under a reserved name are overwritten.
//!
//! Content is streamed through a BLAKE3 hasher while it is written.

pub mod manifest;

pub use manifest::RecoveryManifest;

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{RecoveryError, Result};

/// A finished output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// Hex BLAKE3 digest of the content
    pub blake3: String,
}

/// Destination directory with run-scoped name reservation
#[derive(Debug)]
pub struct OutputWriter {
    root: PathBuf,
    claimed: Mutex<HashSet<String>>,
}

impl OutputWriter {
    /// Create the destination directory if needed.
    /// Failure here aborts the run.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| RecoveryError::destination(root, e))?;
        if !root.is_dir() {
            return Err(RecoveryError::destination(
                root,
                io::Error::new(io::ErrorKind::AlreadyExists, "not a directory"),
            ));
        }
        tracing::debug!(destination = %root.display(), "Destination ready");
        Ok(Self {
            root: root.to_path_buf(),
            claimed: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserve a unique destination path for an entry name
    pub fn reserve(&self, name: &str) -> PathBuf {
        let base = sanitize_basename(name);
        let mut claimed = self.claimed.lock();

        let mut candidate = base.clone();
        let mut index = 0usize;
        while !claimed.insert(candidate.to_lowercase()) {
            index += 1;
            candidate = suffixed(&base, index);
        }
        if index > 0 {
            tracing::debug!(name = %base, renamed = %candidate, "Name collision resolved");
        }
        self.root.join(candidate)
    }

    /// Open a reserved path for streaming writes
    pub fn open(&self, path: &Path) -> Result<OutputFile> {
        let file = File::create(path).map_err(|e| RecoveryError::destination(path, e))?;
        Ok(OutputFile {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            hasher: blake3::Hasher::new(),
            bytes: 0,
        })
    }
}

/// Streaming output file that hashes what it writes
pub struct OutputFile {
    path: PathBuf,
    writer: BufWriter<File>,
    hasher: blake3::Hasher,
    bytes: u64,
}

impl OutputFile {
    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk)?;
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush and return the digest. A flush failure removes the file.
    pub fn finish(mut self) -> Result<WrittenFile> {
        if let Err(e) = self.writer.flush() {
            let path = self.path.clone();
            self.discard();
            return Err(RecoveryError::destination(path, e));
        }
        Ok(WrittenFile {
            blake3: hex::encode(self.hasher.finalize().as_bytes()),
            path: self.path,
            bytes: self.bytes,
        })
    }

    /// Drop the handle and remove the partial file
    pub fn discard(self) {
        let path = self.path;
        drop(self.writer);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}

/// Last component of a provider or host path, safe as a file name
pub fn sanitize_basename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .find(|c| !c.is_empty())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "unnamed".to_string(),
        _ => cleaned,
    }
}

/// `stem (n).ext`, keeping dot-files whole
fn suffixed(base: &str, index: usize) -> String {
    match base.rfind('.') {
        Some(dot) if dot > 0 => format!("{} ({}){}", &base[..dot], index, &base[dot..]),
        _ => format!("{} ({})", base, index),
    }
}
