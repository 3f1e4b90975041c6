//! File carving module - classify content by header/footer signatures.
//!
//! Works on files that are still reachable on a mounted tree but carry the
//! wrong name or extension. Each buffer is tested against the catalog in
//! insertion order and the first matching definition wins:
//!
//! - the buffer must start with the definition's header
//! - if a footer is defined, the buffer must also end with it; the footer
//!   may overlap the header on very short buffers
//!
//! Two definitions that both match the same buffer are resolved by catalog
//! order, never by match quality.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;

use crate::catalog::{SignatureCatalog, SignatureDefinition};
use crate::error::Result;
use crate::source::ByteSource;

/// True when `buf` satisfies `def`'s header and optional footer
pub fn matches(def: &SignatureDefinition, buf: &[u8]) -> bool {
    if !buf.starts_with(def.header()) {
        return false;
    }
    match def.footer() {
        Some(footer) => buf.ends_with(footer),
        None => true,
    }
}

/// Signature matcher over a (possibly restricted) catalog
#[derive(Debug, Clone)]
pub struct Carver {
    catalog: Arc<SignatureCatalog>,
    max_header: usize,
    max_footer: usize,
}

impl Carver {
    pub fn new(catalog: SignatureCatalog) -> Self {
        let max_header = catalog.iter().map(|d| d.header().len()).max().unwrap_or(0);
        let max_footer = catalog
            .iter()
            .filter_map(|d| d.footer().map(<[u8]>::len))
            .max()
            .unwrap_or(0);
        Self {
            catalog: Arc::new(catalog),
            max_header,
            max_footer,
        }
    }

    /// Carver limited to `selected` type names (empty = whole catalog)
    pub fn with_selection(catalog: &SignatureCatalog, selected: &BTreeSet<String>) -> Result<Self> {
        Ok(Self::new(catalog.restrict(selected)?))
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    /// First definition in catalog order that matches `buf`
    pub fn classify(&self, buf: &[u8]) -> Option<&SignatureDefinition> {
        self.catalog.iter().find(|def| matches(def, buf))
    }

    /// Classify a byte source without reading it in full.
    ///
    /// Only the header window at the start and the footer window at the end
    /// are read; the decision is the same as [`Carver::classify`] on the
    /// whole content.
    pub fn classify_source(
        &self,
        source: &dyn ByteSource,
    ) -> io::Result<Option<&SignatureDefinition>> {
        let size = source.size();
        if self.catalog.is_empty() || size == 0 {
            return Ok(None);
        }

        let prefix = source.read_at(0, self.max_header.min(size as usize))?;
        if !self.catalog.iter().any(|d| prefix.starts_with(d.header())) {
            return Ok(None);
        }

        let tail_len = self.max_footer.min(size as usize);
        let suffix = source.read_at(size - tail_len as u64, tail_len)?;

        Ok(self.catalog.iter().find(|def| {
            prefix.starts_with(def.header())
                && def.footer().map_or(true, |f| suffix.ends_with(f))
        }))
    }
}
