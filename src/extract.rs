//! Bounded chunked copy shared by both recovery modes.
//!
//! Content is pulled through a positioned read function in fixed-size
//! chunks and pushed into a sink, so peak memory stays at one chunk no
//! matter how large the entry is. A short or empty read is end-of-data.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::error::RecoveryError;

/// Default chunk size for random-access extraction (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("read failed at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    /// Attach the entry and destination this copy was serving
    pub fn into_recovery(self, entry: &str, destination: &Path) -> RecoveryError {
        match self {
            ExtractError::Read { offset, source } => RecoveryError::entry_read(
                entry,
                io::Error::new(source.kind(), format!("at offset {}: {}", offset, source)),
            ),
            ExtractError::Write(e) => RecoveryError::destination(destination, e),
            ExtractError::Cancelled => RecoveryError::Cancelled,
        }
    }
}

/// Copy up to `total` bytes from `read` into `sink`, `chunk_size` at a time.
///
/// `read(offset, len)` may return fewer than `len` bytes; that ends the copy.
/// The token is checked before every chunk. Returns the number of bytes
/// handed to the sink.
pub fn copy_bounded<R, W>(
    total: u64,
    chunk_size: usize,
    cancel: &CancelToken,
    mut read: R,
    mut sink: W,
) -> Result<u64, ExtractError>
where
    R: FnMut(u64, usize) -> io::Result<Vec<u8>>,
    W: FnMut(&[u8]) -> io::Result<()>,
{
    let chunk_size = chunk_size.max(1) as u64;
    let mut offset = 0u64;

    while offset < total {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let want = (total - offset).min(chunk_size) as usize;
        let chunk = read(offset, want).map_err(|source| ExtractError::Read { offset, source })?;
        if chunk.is_empty() {
            break;
        }

        let got = chunk.len().min(want);
        sink(&chunk[..got]).map_err(ExtractError::Write)?;
        offset += got as u64;

        if got < want {
            tracing::debug!(offset, total, "Short read, treating as end of data");
            break;
        }
    }

    Ok(offset)
}
