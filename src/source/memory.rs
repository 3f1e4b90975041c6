//! In-memory filesystem for synthetic trees.
//!
//! Useful for exercising recovery policy without an image on disk: entries
//! can be flagged unallocated, given a declared size that differs from the
//! stored bytes, or made to fail on read. Each file counts its reads.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    path_components, ByteSource, Directory, EntryKind, Filesystem, FilesystemProvider, FsEntry,
};

/// A regular file in a [`MemoryFilesystem`]
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: String,
    data: Arc<Vec<u8>>,
    declared_size: u64,
    allocated: bool,
    fail_reads: bool,
    reads: Arc<AtomicUsize>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            declared_size: data.len() as u64,
            data: Arc::new(data),
            allocated: true,
            fail_reads: false,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Mark as deleted
    pub fn unallocated(mut self) -> Self {
        self.allocated = false;
        self
    }

    /// Override the size reported by metadata
    pub fn declared_size(mut self, size: u64) -> Self {
        self.declared_size = size;
        self
    }

    /// Every read returns an I/O error
    pub fn failing(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Shared counter of `read_at` calls on this file
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

/// A directory in a [`MemoryFilesystem`]
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    name: String,
    allocated: bool,
    children: Vec<MemoryNode>,
}

#[derive(Debug, Clone)]
enum MemoryNode {
    File(MemoryFile),
    Dir(MemoryDirectory),
}

impl MemoryDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allocated: true,
            children: Vec::new(),
        }
    }

    pub fn file(mut self, file: MemoryFile) -> Self {
        self.children.push(MemoryNode::File(file));
        self
    }

    pub fn dir(mut self, dir: MemoryDirectory) -> Self {
        self.children.push(MemoryNode::Dir(dir));
        self
    }

    pub fn unallocated(mut self) -> Self {
        self.allocated = false;
        self
    }

    fn child(&self, name: &str) -> Option<&MemoryNode> {
        self.children.iter().find(|c| c.label() == name)
    }
}

impl MemoryNode {
    fn label(&self) -> &str {
        match self {
            MemoryNode::File(f) => &f.name,
            MemoryNode::Dir(d) => &d.name,
        }
    }
}

impl FsEntry for MemoryNode {
    fn name(&self) -> &str {
        self.label()
    }

    fn kind(&self) -> EntryKind {
        match self {
            MemoryNode::File(_) => EntryKind::File,
            MemoryNode::Dir(_) => EntryKind::Directory,
        }
    }

    fn size(&self) -> u64 {
        match self {
            MemoryNode::File(f) => f.declared_size,
            MemoryNode::Dir(_) => 0,
        }
    }

    fn allocated(&self) -> bool {
        match self {
            MemoryNode::File(f) => f.allocated,
            MemoryNode::Dir(d) => d.allocated,
        }
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let file = match self {
            MemoryNode::File(f) => f,
            MemoryNode::Dir(d) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is a directory", d.name),
                ))
            }
        };
        file.reads.fetch_add(1, Ordering::Relaxed);
        if file.fail_reads {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated read failure in {}", file.name),
            ));
        }
        let start = (offset as usize).min(file.data.len());
        let end = start.saturating_add(len).min(file.data.len());
        Ok(file.data[start..end].to_vec())
    }

    fn open_dir(&self) -> io::Result<Box<dyn Directory>> {
        match self {
            MemoryNode::Dir(d) => Ok(Box::new(d.clone())),
            MemoryNode::File(f) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", f.name),
            )),
        }
    }
}

impl Directory for MemoryDirectory {
    fn entries(&self) -> io::Result<Vec<Box<dyn FsEntry>>> {
        Ok(self
            .children
            .iter()
            .cloned()
            .map(|c| Box::new(c) as Box<dyn FsEntry>)
            .collect())
    }
}

/// Tree of [`MemoryDirectory`] / [`MemoryFile`] nodes
#[derive(Debug, Clone)]
pub struct MemoryFilesystem {
    root: MemoryDirectory,
}

impl MemoryFilesystem {
    pub fn new(root: MemoryDirectory) -> Self {
        Self { root }
    }
}

impl Filesystem for MemoryFilesystem {
    fn root(&self) -> io::Result<Box<dyn Directory>> {
        Ok(Box::new(self.root.clone()))
    }

    fn open_path(&self, path: &str) -> io::Result<Box<dyn FsEntry>> {
        let mut node = MemoryNode::Dir(self.root.clone());
        for component in path_components(path) {
            let next = match &node {
                MemoryNode::Dir(d) => d.child(component).cloned(),
                MemoryNode::File(_) => None,
            };
            node = next.ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("no such entry: {}", path))
            })?;
        }
        Ok(Box::new(node))
    }
}

/// Mounting ignores the byte source; the tree is already in memory
impl FilesystemProvider for MemoryFilesystem {
    fn mount(&self, _source: Arc<dyn ByteSource>) -> io::Result<Box<dyn Filesystem>> {
        Ok(Box::new(self.clone()))
    }
}
