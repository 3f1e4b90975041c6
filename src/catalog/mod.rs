//! Signature catalog - file-type name to header/footer magic bytes.
//!
//! The catalog is loaded once from a JSON table of the form
//!
//! ```json
//! { "jpg": { "header": "FFD8FF", "footer": "FFD9" },
//!   "bmp": { "header": "424D",   "footer": null } }
//! ```
//!
//! Hex strings are decoded to raw bytes at load time. Entry order in the
//! source document is preserved because the carver is first-match-wins.
//! An absent or `null` footer disables the footer check; an empty footer
//! string is rejected.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{RecoveryError, Result};

/// Catalog compiled into the binary, used when no catalog file is given
const BUILTIN_CATALOG: &str = include_str!("signatures.json");

/// Header and optional footer for one file type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDefinition {
    type_name: String,
    header: Vec<u8>,
    footer: Option<Vec<u8>>,
}

impl SignatureDefinition {
    /// Build a definition from raw bytes, enforcing non-empty header and footer
    pub fn new(
        type_name: impl Into<String>,
        header: Vec<u8>,
        footer: Option<Vec<u8>>,
    ) -> Result<Self> {
        let type_name = type_name.into();
        if header.is_empty() {
            return Err(RecoveryError::config(format!(
                "signature '{}' has an empty header",
                type_name
            )));
        }
        if matches!(footer, Some(ref f) if f.is_empty()) {
            return Err(RecoveryError::config(format!(
                "signature '{}' has an empty footer (use null for no footer)",
                type_name
            )));
        }
        Ok(Self {
            type_name,
            header,
            footer,
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn footer(&self) -> Option<&[u8]> {
        self.footer.as_deref()
    }
}

/// Raw catalog entry as it appears in the JSON document
#[derive(Debug, Deserialize)]
struct RawSignature {
    header: String,
    #[serde(default)]
    footer: Option<String>,
}

/// Ordered list of raw entries; serde maps lose order, so collect pairs
struct RawCatalog(Vec<(String, RawSignature)>);

impl<'de> Deserialize<'de> for RawCatalog {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = RawCatalog;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of type name to {header, footer}")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<RawCatalog, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, sig)) = map.next_entry::<String, RawSignature>()? {
                    entries.push((name, sig));
                }
                Ok(RawCatalog(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// Immutable, insertion-ordered set of signature definitions
#[derive(Debug, Clone, Default)]
pub struct SignatureCatalog {
    definitions: Vec<SignatureDefinition>,
}

impl SignatureCatalog {
    /// Load a catalog from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            RecoveryError::config(format!(
                "cannot read signature catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        let catalog = Self::from_json(&content).map_err(|e| match e {
            RecoveryError::Configuration(msg) => {
                RecoveryError::config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        tracing::info!(
            path = %path.display(),
            signatures = catalog.len(),
            "Loaded signature catalog"
        );
        Ok(catalog)
    }

    /// The catalog shipped with the binary
    pub fn builtin() -> Self {
        Self::embedded(BUILTIN_CATALOG)
    }

    /// Parse a table compiled into the binary; a broken table is logged and
    /// yields an empty catalog
    fn embedded(content: &str) -> Self {
        match Self::from_json(content) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!(error = %e, "Built-in signature catalog is invalid");
                Self::default()
            }
        }
    }

    /// Parse and validate a JSON catalog document
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawCatalog = serde_json::from_str(content)
            .map_err(|e| RecoveryError::config(format!("invalid catalog JSON: {}", e)))?;

        let mut seen = HashSet::new();
        let mut definitions = Vec::with_capacity(raw.0.len());
        for (name, sig) in raw.0 {
            if !seen.insert(name.clone()) {
                return Err(RecoveryError::config(format!(
                    "duplicate signature '{}'",
                    name
                )));
            }
            let header = decode_hex(&name, "header", &sig.header)?;
            let footer = match sig.footer {
                Some(ref f) => Some(decode_hex(&name, "footer", f)?),
                None => None,
            };
            definitions.push(SignatureDefinition::new(name, header, footer)?);
        }

        Ok(Self { definitions })
    }

    /// Sub-catalog holding only `selected`, in original catalog order.
    /// An empty selection keeps every definition. Names are compared
    /// exactly first, then ignoring ASCII case.
    pub fn restrict(&self, selected: &BTreeSet<String>) -> Result<Self> {
        if selected.is_empty() {
            return Ok(self.clone());
        }
        let mut keep = HashSet::new();
        for name in selected {
            if let Some(def) = self.get(name) {
                keep.insert(def.type_name());
                continue;
            }
            let before = keep.len();
            keep.extend(self.type_names().filter(|t| t.eq_ignore_ascii_case(name)));
            if keep.len() == before {
                return Err(RecoveryError::config(format!(
                    "unknown file type '{}' (known: {})",
                    name,
                    self.type_names().collect::<Vec<_>>().join(", ")
                )));
            }
        }
        Ok(Self {
            definitions: self
                .definitions
                .iter()
                .filter(|d| keep.contains(d.type_name()))
                .cloned()
                .collect(),
        })
    }

    pub fn get(&self, type_name: &str) -> Option<&SignatureDefinition> {
        self.definitions.iter().find(|d| d.type_name() == type_name)
    }

    /// Definitions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SignatureDefinition> {
        self.definitions.iter()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.type_name())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn decode_hex(type_name: &str, field: &str, value: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(value.trim()).map_err(|e| {
        RecoveryError::config(format!(
            "signature '{}': {} '{}' is not valid hex ({})",
            type_name, field, value, e
        ))
    })?;
    if bytes.is_empty() {
        return Err(RecoveryError::config(format!(
            "signature '{}': {} must not be empty",
            type_name, field
        )));
    }
    Ok(bytes)
}
