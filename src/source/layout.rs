//! Extent-map filesystem provider.
//!
//! Consumes a JSON layout exported by an external metadata tool: the
//! directory tree of a volume, where every file node lists its declared
//! size, allocation status, and the byte runs it occupies on the image.
//!
//! ```json
//! { "root": { "kind": "directory", "name": "/", "children": [
//!     { "kind": "file", "name": "a.jpg", "size": 5000, "allocated": false,
//!       "runs": [ { "offset": 4096, "length": 4096 },
//!                 { "offset": 16384, "length": 904 } ] } ] } }
//! ```
//!
//! Entry content is served from the mounted [`ByteSource`] through the runs.
//! A run that reaches past the end of the source yields a short read.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::{
    path_components, ByteSource, Directory, EntryKind, Filesystem, FilesystemProvider, FsEntry,
};

#[derive(Debug, Clone, Copy, Deserialize)]
struct ByteRun {
    offset: u64,
    length: u64,
}

fn default_allocated() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum LayoutNode {
    File {
        name: String,
        size: u64,
        #[serde(default = "default_allocated")]
        allocated: bool,
        #[serde(default)]
        runs: Vec<ByteRun>,
    },
    Directory {
        name: String,
        #[serde(default = "default_allocated")]
        allocated: bool,
        #[serde(default)]
        children: Vec<LayoutNode>,
    },
}

#[derive(Debug, Deserialize)]
struct LayoutDocument {
    root: LayoutNode,
}

/// Shared, immutable tree built from the document
#[derive(Debug)]
struct Node {
    name: String,
    kind: EntryKind,
    size: u64,
    allocated: bool,
    runs: Vec<ByteRun>,
    children: Vec<Arc<Node>>,
}

impl From<LayoutNode> for Node {
    fn from(node: LayoutNode) -> Self {
        match node {
            LayoutNode::File {
                name,
                size,
                allocated,
                runs,
            } => Node {
                name,
                kind: EntryKind::File,
                size,
                allocated,
                runs,
                children: Vec::new(),
            },
            LayoutNode::Directory {
                name,
                allocated,
                children,
            } => Node {
                name,
                kind: EntryKind::Directory,
                size: 0,
                allocated,
                runs: Vec::new(),
                children: children.into_iter().map(|c| Arc::new(Node::from(c))).collect(),
            },
        }
    }
}

/// Provider that mounts a byte source using a layout document on disk
#[derive(Debug, Clone)]
pub struct LayoutProvider {
    layout_path: PathBuf,
}

impl LayoutProvider {
    pub fn new(layout_path: impl Into<PathBuf>) -> Self {
        Self {
            layout_path: layout_path.into(),
        }
    }
}

impl FilesystemProvider for LayoutProvider {
    fn mount(&self, source: Arc<dyn ByteSource>) -> io::Result<Box<dyn Filesystem>> {
        let content = fs::read_to_string(&self.layout_path)?;
        let fs = LayoutFilesystem::parse(&content, source)?;
        tracing::debug!(
            layout = %self.layout_path.display(),
            "Mounted extent-map layout"
        );
        Ok(Box::new(fs))
    }
}

/// Filesystem view over a byte source described by a layout document
pub struct LayoutFilesystem {
    root: Arc<Node>,
    source: Arc<dyn ByteSource>,
}

impl LayoutFilesystem {
    pub fn parse(content: &str, source: Arc<dyn ByteSource>) -> io::Result<Self> {
        let doc: LayoutDocument = serde_json::from_str(content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let root = Node::from(doc.root);
        if root.kind != EntryKind::Directory {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "layout root must be a directory",
            ));
        }
        Ok(Self {
            root: Arc::new(root),
            source,
        })
    }

    fn entry(&self, node: Arc<Node>) -> LayoutEntry {
        LayoutEntry {
            node,
            source: Arc::clone(&self.source),
        }
    }
}

impl Filesystem for LayoutFilesystem {
    fn root(&self) -> io::Result<Box<dyn Directory>> {
        self.entry(Arc::clone(&self.root)).open_dir()
    }

    fn open_path(&self, path: &str) -> io::Result<Box<dyn FsEntry>> {
        let mut node = Arc::clone(&self.root);
        for component in path_components(path) {
            let next = node
                .children
                .iter()
                .find(|c| c.name == component)
                .cloned()
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("no such entry: {}", path))
                })?;
            node = next;
        }
        Ok(Box::new(self.entry(node)))
    }
}

struct LayoutEntry {
    node: Arc<Node>,
    source: Arc<dyn ByteSource>,
}

struct LayoutDirectory {
    node: Arc<Node>,
    source: Arc<dyn ByteSource>,
}

impl FsEntry for LayoutEntry {
    fn name(&self) -> &str {
        &self.node.name
    }

    fn kind(&self) -> EntryKind {
        self.node.kind
    }

    fn size(&self) -> u64 {
        self.node.size
    }

    fn allocated(&self) -> bool {
        self.node.allocated
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        if self.node.kind != EntryKind::File {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", self.node.name),
            ));
        }
        read_runs(
            self.source.as_ref(),
            &self.node.runs,
            self.node.size,
            offset,
            len,
        )
    }

    fn open_dir(&self) -> io::Result<Box<dyn Directory>> {
        if self.node.kind != EntryKind::Directory {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", self.node.name),
            ));
        }
        Ok(Box::new(LayoutDirectory {
            node: Arc::clone(&self.node),
            source: Arc::clone(&self.source),
        }))
    }
}

impl Directory for LayoutDirectory {
    fn entries(&self) -> io::Result<Vec<Box<dyn FsEntry>>> {
        Ok(self
            .node
            .children
            .iter()
            .map(|child| {
                Box::new(LayoutEntry {
                    node: Arc::clone(child),
                    source: Arc::clone(&self.source),
                }) as Box<dyn FsEntry>
            })
            .collect())
    }
}

fn corrupt_run(run: &ByteRun) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("byte run at {} of length {} overflows", run.offset, run.length),
    )
}

/// Map a logical `[offset, offset + len)` window onto physical runs.
/// Reads never pass the declared size; a short source read ends the window.
/// A run whose bounds overflow fails the read, not the process.
fn read_runs(
    source: &dyn ByteSource,
    runs: &[ByteRun],
    size: u64,
    offset: u64,
    len: usize,
) -> io::Result<Vec<u8>> {
    let end = offset.saturating_add(len as u64).min(size);
    let mut out = Vec::with_capacity(end.saturating_sub(offset) as usize);
    let mut run_start = 0u64;

    for run in runs {
        let pos = offset + out.len() as u64;
        if pos >= end {
            break;
        }
        let run_end = run_start
            .checked_add(run.length)
            .ok_or_else(|| corrupt_run(run))?;
        if pos < run_end {
            let within = pos - run_start;
            let want = (run_end.min(end) - pos) as usize;
            let physical = run
                .offset
                .checked_add(within)
                .ok_or_else(|| corrupt_run(run))?;
            let chunk = source.read_at(physical, want)?;
            let got = chunk.len();
            out.extend_from_slice(&chunk);
            if got < want {
                break;
            }
        }
        run_start = run_end;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource(Vec<u8>);

    impl ByteSource for VecSource {
        fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
            let start = (offset as usize).min(self.0.len());
            let end = start.saturating_add(len).min(self.0.len());
            Ok(self.0[start..end].to_vec())
        }

        fn size(&self) -> u64 {
            self.0.len() as u64
        }
    }

    fn image() -> Arc<dyn ByteSource> {
        // "HELLO!" split across two runs at 8 and 40
        let mut data = vec![b'.'; 64];
        data[8..12].copy_from_slice(b"HELL");
        data[40..43].copy_from_slice(b"O!!");
        Arc::new(VecSource(data))
    }

    const DOC: &str = r#"{
        "root": { "kind": "directory", "name": "/", "children": [
            { "kind": "file", "name": "hello.txt", "size": 6, "allocated": false,
              "runs": [ { "offset": 8, "length": 4 }, { "offset": 40, "length": 4 } ] },
            { "kind": "directory", "name": "sub", "children": [
                { "kind": "file", "name": "tail.bin", "size": 10,
                  "runs": [ { "offset": 60, "length": 10 } ] } ] }
        ] }
    }"#;

    #[test]
    fn test_read_across_runs() {
        let fs = LayoutFilesystem::parse(DOC, image()).unwrap();
        let entry = fs.open_path("/hello.txt").unwrap();
        assert!(!entry.allocated());
        assert_eq!(entry.read_at(0, 100).unwrap(), b"HELLO!");
        assert_eq!(entry.read_at(3, 2).unwrap(), b"LO");
        assert!(entry.read_at(6, 10).unwrap().is_empty());
    }

    #[test]
    fn test_run_past_source_end_is_short() {
        let fs = LayoutFilesystem::parse(DOC, image()).unwrap();
        let entry = fs.open_path("sub/tail.bin").unwrap();
        assert!(entry.allocated());
        assert_eq!(entry.read_at(0, 10).unwrap().len(), 4);
    }

    #[test]
    fn test_listing() {
        let fs = LayoutFilesystem::parse(DOC, image()).unwrap();
        let entries = fs.root().unwrap().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind(), EntryKind::Directory);
        let sub = entries[1].open_dir().unwrap().entries().unwrap();
        assert_eq!(sub[0].name(), "tail.bin");
    }

    #[test]
    fn test_rejects_file_root_and_bad_json() {
        let file_root = r#"{ "root": { "kind": "file", "name": "x", "size": 1 } }"#;
        assert!(LayoutFilesystem::parse(file_root, image()).is_err());
        assert!(LayoutFilesystem::parse("[]", image()).is_err());
    }

    #[test]
    fn test_overflowing_run_fails_read() {
        let doc = r#"{ "root": { "kind": "directory", "name": "/", "children": [
            { "kind": "file", "name": "huge.bin", "size": 100,
              "runs": [ { "offset": 0, "length": 4 },
                        { "offset": 0, "length": 18446744073709551615 } ] },
            { "kind": "file", "name": "far.bin", "size": 100,
              "runs": [ { "offset": 18446744073709551615, "length": 50 } ] }
        ] } }"#;
        let fs = LayoutFilesystem::parse(doc, image()).unwrap();

        let huge = fs.open_path("/huge.bin").unwrap();
        assert_eq!(huge.read_at(0, 4).unwrap(), b"....");
        let err = huge.read_at(0, 100).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let far = fs.open_path("/far.bin").unwrap();
        // offset + 0 fits, offset + 1 does not
        assert!(far.read_at(0, 1).is_ok());
        assert_eq!(far.read_at(1, 1).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_mount_missing_layout() {
        let provider = LayoutProvider::new("/nonexistent/layout.json");
        assert!(provider.mount(image()).is_err());
    }
}
