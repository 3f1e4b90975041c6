//! Raw byte sources: dd-style images, live block devices, and host files.
//!
//! Reads are positioned (seek + read) behind a mutex so one handle can be
//! shared by every worker. The size is taken by seeking to the end, which
//! also works for block devices whose metadata reports zero length.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ByteSource, ImageDecoder};

/// Read-only handle on a raw image, device node, or ordinary file
pub struct RawImage {
    file: Mutex<File>,
    size: u64,
}

impl RawImage {
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        if file.metadata()?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        let size = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            file: Mutex::new(file),
            size,
        })
    }
}

impl ByteSource for RawImage {
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        if offset >= self.size || len == 0 {
            return Ok(Vec::new());
        }
        let len = (self.size - offset).min(len as u64);
        let mut buf = Vec::with_capacity(len as usize);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        (&mut *file).take(len).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Decoder for uncompressed images and device nodes.
///
/// Container formats (E01 and friends) need a dedicated decoder plugged in
/// through [`ImageDecoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl ImageDecoder for RawDecoder {
    fn open(&self, path: &Path) -> io::Result<Arc<dyn ByteSource>> {
        let image = RawImage::open(path)?;
        tracing::debug!(path = %path.display(), size = image.size(), "Opened raw source");
        Ok(Arc::new(image))
    }
}
