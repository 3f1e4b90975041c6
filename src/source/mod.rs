//! Interfaces to the external collaborators the recovery engine consumes.
//!
//! The engine never parses an image container or a filesystem itself:
//!
//! - an [`ImageDecoder`] turns a path into a random-access [`ByteSource`]
//! - a [`FilesystemProvider`] mounts a byte source and exposes a navigable
//!   tree of [`FsEntry`] values that carry type, size and allocation status
//! - a [`DeviceEnumerator`] lists attached volumes for presentation only
//!
//! Bundled implementations live in the submodules: [`raw`] for raw images and
//! live devices, [`layout`] for extent maps exported by a metadata tool,
//! [`memory`] for synthetic trees, and [`devices`] for platform enumeration.

pub mod devices;
pub mod layout;
pub mod memory;
pub mod raw;

use std::io;
use std::path::Path;
use std::sync::Arc;

pub use devices::{platform_enumerator, platform_trash_dir, DeviceEnumerator, DeviceInfo};
pub use layout::LayoutProvider;
pub use memory::{MemoryDirectory, MemoryFile, MemoryFilesystem};
pub use raw::{RawDecoder, RawImage};

/// Random-access, read-only byte source (raw image, device, or host file)
pub trait ByteSource: Send + Sync {
    /// Read up to `len` bytes at `offset`. A short or empty result means the
    /// end of the data was reached.
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Total size in bytes
    fn size(&self) -> u64;
}

/// Opens a container path and exposes it as a byte source
pub trait ImageDecoder: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ByteSource>>;
}

/// Type of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a mounted filesystem, possibly unallocated (deleted)
pub trait FsEntry: Send + Sync {
    /// Base name as stored in the directory record
    fn name(&self) -> &str;

    fn kind(&self) -> EntryKind;

    /// Declared size in bytes
    fn size(&self) -> u64;

    /// False when the filesystem no longer considers the entry in use
    fn allocated(&self) -> bool;

    /// Bounded random-access read of the entry's content
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Open the entry as a directory. Fails for regular files.
    fn open_dir(&self) -> io::Result<Box<dyn Directory>>;
}

/// Enumerable directory handle
pub trait Directory: Send {
    fn entries(&self) -> io::Result<Vec<Box<dyn FsEntry>>>;
}

/// A mounted filesystem
pub trait Filesystem: Send + Sync {
    fn root(&self) -> io::Result<Box<dyn Directory>>;

    /// Resolve a single `/`-separated path without walking the whole tree
    fn open_path(&self, path: &str) -> io::Result<Box<dyn FsEntry>>;
}

/// Mounts a byte source as a filesystem
pub trait FilesystemProvider: Send + Sync {
    fn mount(&self, source: Arc<dyn ByteSource>) -> io::Result<Box<dyn Filesystem>>;
}

/// Split a provider path into its non-empty components
pub(crate) fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\'])
        .filter(|c| !c.is_empty() && *c != ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_components() {
        let parts: Vec<_> = path_components("/home//user/./a.jpg").collect();
        assert_eq!(parts, vec!["home", "user", "a.jpg"]);
        assert_eq!(path_components("/").count(), 0);
        let win: Vec<_> = path_components("\\Users\\x.doc").collect();
        assert_eq!(win, vec!["Users", "x.doc"]);
    }
}
