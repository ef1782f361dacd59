use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::journal::JournalError;

/// File carrying a journal's column and partition definitions, stored in the
/// journal directory. Files starting with `_` are never treated as data.
pub(crate) const META_FILE: &str = "_meta.json";

/// How a journal's records are bucketed into partition files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionBy {
    #[default]
    None,
    Day,
    Month,
    Year,
}

/// Storage type of a single column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// 64-bit signed integer
    Long,
    /// 64-bit IEEE float
    Double,
    /// Microseconds since the epoch, 64-bit
    Timestamp,
    /// 32-bit index into the journal's symbol table
    Symbol,
}

impl ColumnKind {
    /// On-disk width of one cell of this kind, in bytes.
    pub fn width(self) -> usize {
        match self {
            ColumnKind::Long | ColumnKind::Double | ColumnKind::Timestamp => 8,
            ColumnKind::Symbol => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

/// Resolved description of a journal: its name, partitioning and columns.
///
/// Persisted as `_meta.json` in the journal directory. Records are fixed
/// width: the cells of each row are laid out in column order with no padding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalMetadata {
    pub name: String,
    #[serde(default)]
    pub partition_by: PartitionBy,
    pub columns: Vec<ColumnMeta>,
    /// Expected record count, used by consumers to size buffers. Zero means
    /// no hint.
    #[serde(default)]
    pub record_hint: u64,
}

impl JournalMetadata {
    /// Byte width of one record.
    pub fn row_width(&self) -> usize {
        self.columns.iter().map(|c| c.kind.width()).sum()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Byte offset of a column's cell within a row.
    pub(crate) fn column_offset(&self, index: usize) -> usize {
        self.columns[..index].iter().map(|c| c.kind.width()).sum()
    }
}

/// Descriptor used to resolve a journal without reading its metadata first.
///
/// Stands in for callers that know a journal by name plus sizing or
/// partitioning hints; [`JournalConfiguration::create_metadata`] overlays the
/// hints onto the on-disk definition.
#[derive(Clone, Debug)]
pub struct JournalKey {
    pub name: String,
    pub partition_by: Option<PartitionBy>,
    pub record_hint: Option<u64>,
}

impl JournalKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_by: None,
            record_hint: None,
        }
    }

    pub fn with_partition_by(mut self, partition_by: PartitionBy) -> Self {
        self.partition_by = Some(partition_by);
        self
    }

    pub fn with_record_hint(mut self, record_hint: u64) -> Self {
        self.record_hint = Some(record_hint);
        self
    }
}

/// Result of probing a journal name on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalExistence {
    Exists,
    DoesNotExist,
    /// The directory is present but carries no journal metadata.
    NotAJournal,
}

/// Resolves journal names to on-disk locations and loads their metadata.
#[derive(Clone, Debug)]
pub struct JournalConfiguration {
    journal_base: PathBuf,
}

impl JournalConfiguration {
    pub fn new(journal_base: impl Into<PathBuf>) -> Self {
        Self {
            journal_base: journal_base.into(),
        }
    }

    /// Root directory under which every journal lives.
    pub fn journal_base(&self) -> &Path {
        &self.journal_base
    }

    /// Directory of the named journal.
    pub fn location(&self, name: &str) -> PathBuf {
        self.journal_base.join(name)
    }

    /// Probe whether the named journal is present on disk.
    pub fn exists(&self, name: &str) -> JournalExistence {
        let dir = self.location(name);
        if !dir.is_dir() {
            JournalExistence::DoesNotExist
        } else if !dir.join(META_FILE).is_file() {
            JournalExistence::NotAJournal
        } else {
            JournalExistence::Exists
        }
    }

    /// Load the named journal's metadata from disk.
    pub fn read_metadata(&self, name: &str) -> Result<JournalMetadata, JournalError> {
        let path = self.location(name).join(META_FILE);
        let raw = fs::read(&path).map_err(|source| JournalError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| JournalError::Metadata { path, source })
    }

    /// Resolve a key to full metadata: the on-disk definition with the key's
    /// hints overlaid.
    pub fn create_metadata(&self, key: &JournalKey) -> Result<Arc<JournalMetadata>, JournalError> {
        let mut metadata = self.read_metadata(&key.name)?;
        if let Some(partition_by) = key.partition_by {
            metadata.partition_by = partition_by;
        }
        if let Some(record_hint) = key.record_hint {
            metadata.record_hint = record_hint;
        }
        Ok(Arc::new(metadata))
    }
}
