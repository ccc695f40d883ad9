use std::collections::HashSet;

use crate::config::{CatalogConfig, TableEntry};
use crate::error::{ExportError, Result};

/// Validated mapping from logical dataset names to physical tables.
///
/// Entries keep their configured order; the first entry is the time-dimension
/// table every other table is joined onto.
#[derive(Debug, Clone)]
pub struct Catalog {
    join_key: String,
    entries: Vec<TableEntry>,
}

impl Catalog {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let CatalogConfig { join_key, tables } = config;

        if tables.is_empty() {
            return Err(ExportError::Config("catalog must list at least one table".into()));
        }
        if !is_plain_identifier(&join_key) {
            return Err(ExportError::Config(format!("join key '{join_key}' is not a plain identifier")));
        }

        let mut logical_names = HashSet::new();
        let mut aliases = HashSet::new();
        for entry in &tables {
            if entry.logical.trim().is_empty() {
                return Err(ExportError::Config(format!(
                    "table '{}' has an empty logical name",
                    entry.physical
                )));
            }
            for (what, value) in [("table", &entry.physical), ("alias", &entry.alias)] {
                if !is_plain_identifier(value) {
                    return Err(ExportError::Config(format!(
                        "{what} '{value}' for dataset '{}' is not a plain identifier",
                        entry.logical
                    )));
                }
            }
            if !logical_names.insert(entry.logical.as_str()) {
                return Err(ExportError::Config(format!("duplicate dataset '{}'", entry.logical)));
            }
            if !aliases.insert(entry.alias.to_ascii_lowercase()) {
                return Err(ExportError::Config(format!("duplicate alias '{}'", entry.alias)));
            }
        }

        Ok(Self {
            join_key,
            entries: tables,
        })
    }

    pub fn physical_name(&self, logical: &str) -> Result<&str> {
        self.entry(logical).map(|entry| entry.physical.as_str())
    }

    pub fn entry(&self, logical: &str) -> Result<&TableEntry> {
        self.entries
            .iter()
            .find(|entry| entry.logical == logical)
            .ok_or_else(|| ExportError::UnknownDataset(logical.to_string()))
    }

    pub fn join_key(&self) -> &str {
        &self.join_key
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    /// The time-dimension table.
    pub fn anchor(&self) -> &TableEntry {
        &self.entries[0]
    }

    /// Tables joined onto the anchor, in canonical order.
    pub fn joined_tables(&self) -> &[TableEntry] {
        &self.entries[1..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let config = CatalogConfig::default();
        Self {
            join_key: config.join_key,
            entries: config.tables,
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_plain_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
