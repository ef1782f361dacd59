use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::{ColumnKind, JournalMetadata};

/// Symbol table file, appended to by writers. Shares the journal directory
/// with the partition data files; the `_` prefix keeps it out of data scans.
pub(crate) const SYMBOLS_FILE: &str = "_symbols.dat";

/// Extension of partition data files.
pub(crate) const DATA_EXT: &str = "dat";

/// Cell value of a symbol column with no symbol set.
const NULL_SYMBOL: u32 = u32::MAX;

/// Symbol entries are length-prefixed; anything past this is corruption, not
/// a symbol.
const MAX_SYMBOL_LEN: u32 = 1 << 20;

/// Error type for journal open, refresh and metadata access
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bad metadata at {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("symbol file {path} is corrupt at offset {offset}")]
    CorruptSymbols { path: PathBuf, offset: u64 },
}

fn io_err(path: &Path, source: std::io::Error) -> JournalError {
    JournalError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One memory-mapped partition data file.
#[derive(Debug)]
struct Partition {
    path: PathBuf,
    /// None while the file is empty; mapping a zero-length file fails.
    map: Option<Mmap>,
    mapped_len: u64,
    rows: u64,
}

impl Partition {
    fn open(path: PathBuf, row_width: usize) -> Result<Self, JournalError> {
        let mut partition = Self {
            path,
            map: None,
            mapped_len: 0,
            rows: 0,
        };
        partition.remap(row_width)?;
        Ok(partition)
    }

    /// Map (or re-map) the file, recomputing the visible row count. A
    /// trailing partial row is an append in progress and stays invisible.
    fn remap(&mut self, row_width: usize) -> Result<(), JournalError> {
        let file = File::open(&self.path).map_err(|e| io_err(&self.path, e))?;
        let len = file.metadata().map_err(|e| io_err(&self.path, e))?.len();
        self.map = if len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file) }.map_err(|e| io_err(&self.path, e))?)
        };
        self.mapped_len = len;
        self.rows = if row_width == 0 {
            0
        } else {
            len / row_width as u64
        };
        Ok(())
    }

    /// Refresh the mapping if the file changed size since the last map.
    fn refresh(&mut self, row_width: usize) -> Result<(), JournalError> {
        let len = fs::metadata(&self.path)
            .map_err(|e| io_err(&self.path, e))?
            .len();
        if len != self.mapped_len {
            trace!(path = %self.path.display(), from = self.mapped_len, to = len, "remapping partition");
            self.remap(row_width)?;
        }
        Ok(())
    }

    fn row(&self, index: u64, row_width: usize) -> &[u8] {
        let map = self.map.as_ref().expect("row index out of mapped range");
        let start = index as usize * row_width;
        &map[start..start + row_width]
    }
}

/// String table for symbol columns: the journal-wide mapping from the u32
/// cell values to their string form. Append-only on disk.
#[derive(Debug, Default)]
struct SymbolTable {
    values: Vec<String>,
    /// Byte offset up to which the file has been parsed; reloads resume here.
    consumed: u64,
}

impl SymbolTable {
    /// Parse entries appended since the last load. A missing file is an
    /// empty table; a trailing partial entry is an append in progress and is
    /// left for the next reload.
    fn reload(&mut self, path: &Path) -> Result<(), JournalError> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_err(path, e)),
        };
        file.seek(SeekFrom::Start(self.consumed))
            .map_err(|e| io_err(path, e))?;
        let mut tail = Vec::new();
        file.read_to_end(&mut tail).map_err(|e| io_err(path, e))?;

        let mut at = 0usize;
        while tail.len() - at >= 4 {
            let len = u32::from_le_bytes(tail[at..at + 4].try_into().unwrap());
            if len > MAX_SYMBOL_LEN {
                return Err(JournalError::CorruptSymbols {
                    path: path.to_path_buf(),
                    offset: self.consumed + at as u64,
                });
            }
            let end = at + 4 + len as usize;
            if end > tail.len() {
                break;
            }
            let value = std::str::from_utf8(&tail[at + 4..end])
                .map_err(|_| JournalError::CorruptSymbols {
                    path: path.to_path_buf(),
                    offset: self.consumed + at as u64,
                })?
                .to_string();
            self.values.push(value);
            at = end;
        }
        self.consumed += at as u64;
        Ok(())
    }

    fn get(&self, index: u32) -> Option<&str> {
        self.values.get(index as usize).map(String::as_str)
    }
}

/// A read-only view of an on-disk journal: its metadata, the memory-mapped
/// partition data files and the symbol table.
///
/// The view is a snapshot; [`Journal::refresh`] picks up rows, partitions
/// and symbols appended since the journal was opened or last refreshed.
#[derive(Debug)]
pub struct Journal {
    metadata: Arc<JournalMetadata>,
    location: PathBuf,
    row_width: usize,
    partitions: Vec<Partition>,
    symbols: SymbolTable,
}

impl Journal {
    /// Open a journal at `location`, mapping every partition and loading the
    /// symbol table.
    pub(crate) fn open(
        metadata: Arc<JournalMetadata>,
        location: PathBuf,
    ) -> Result<Self, JournalError> {
        let row_width = metadata.row_width();
        let mut journal = Self {
            metadata,
            location,
            row_width,
            partitions: Vec::new(),
            symbols: SymbolTable::default(),
        };
        journal.refresh()?;
        debug!(
            name = %journal.metadata.name,
            partitions = journal.partitions.len(),
            rows = journal.row_count(),
            "opened journal"
        );
        Ok(journal)
    }

    /// Re-read the on-disk state: remap partitions that grew, map partitions
    /// added since the last refresh, and parse appended symbols.
    pub fn refresh(&mut self) -> Result<(), JournalError> {
        for partition in &mut self.partitions {
            partition.refresh(self.row_width)?;
        }

        let mut names: Vec<PathBuf> = fs::read_dir(&self.location)
            .map_err(|e| io_err(&self.location, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().and_then(|ext| ext.to_str()) == Some(DATA_EXT)
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map_or(false, |n| !n.starts_with('_'))
            })
            .collect();
        names.sort();

        // Partitions are append-only: anything past the known set is new.
        for path in names {
            if !self.partitions.iter().any(|p| p.path == path) {
                self.partitions.push(Partition::open(path, self.row_width)?);
            }
        }
        self.partitions.sort_by(|a, b| a.path.cmp(&b.path));

        self.symbols.reload(&self.location.join(SYMBOLS_FILE))
    }

    pub fn metadata(&self) -> &JournalMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Number of complete records visible across all partitions.
    pub fn row_count(&self) -> u64 {
        self.partitions.iter().map(|p| p.rows).sum()
    }

    /// Number of distinct symbols known to this view.
    pub fn symbol_count(&self) -> usize {
        self.symbols.values.len()
    }

    /// Iterate over all visible records, in partition order.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            journal: self,
            partition: 0,
            row: 0,
        }
    }

    /// Close the view, unmapping every partition.
    pub(crate) fn close(self) {
        debug!(name = %self.metadata.name, "closing journal reader");
    }

    fn cell(&self, data: &[u8], column: &str, expected: ColumnKind) -> (usize, usize) {
        let index = self
            .metadata
            .column_index(column)
            .unwrap_or_else(|| panic!("journal '{}' has no column '{column}'", self.name()));
        let kind = self.metadata.columns[index].kind;
        assert!(
            kind == expected,
            "column '{column}' of journal '{}' is {kind:?}, not {expected:?}",
            self.name()
        );
        let offset = self.metadata.column_offset(index);
        debug_assert!(offset + kind.width() <= data.len());
        (offset, kind.width())
    }
}

/// Iterator over a journal's records.
pub struct Rows<'a> {
    journal: &'a Journal,
    partition: usize,
    row: u64,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row<'a>;

    fn next(&mut self) -> Option<Row<'a>> {
        loop {
            let partition = self.journal.partitions.get(self.partition)?;
            if self.row < partition.rows {
                let data = partition.row(self.row, self.journal.row_width);
                self.row += 1;
                return Some(Row {
                    journal: self.journal,
                    data,
                });
            }
            self.partition += 1;
            self.row = 0;
        }
    }
}

/// One fixed-width record of a journal.
///
/// Typed getters panic on an unknown column name or a kind mismatch; both
/// indicate a caller bug, not a data condition.
pub struct Row<'a> {
    journal: &'a Journal,
    data: &'a [u8],
}

impl Row<'_> {
    pub fn long(&self, column: &str) -> i64 {
        let (offset, width) = self.journal.cell(self.data, column, ColumnKind::Long);
        i64::from_le_bytes(self.data[offset..offset + width].try_into().unwrap())
    }

    pub fn double(&self, column: &str) -> f64 {
        let (offset, width) = self.journal.cell(self.data, column, ColumnKind::Double);
        f64::from_le_bytes(self.data[offset..offset + width].try_into().unwrap())
    }

    /// Microseconds since the epoch.
    pub fn timestamp(&self, column: &str) -> i64 {
        let (offset, width) = self.journal.cell(self.data, column, ColumnKind::Timestamp);
        i64::from_le_bytes(self.data[offset..offset + width].try_into().unwrap())
    }

    /// The symbol string, or None for a null cell or an index the current
    /// view has not yet seen.
    pub fn symbol(&self, column: &str) -> Option<&str> {
        let (offset, width) = self.journal.cell(self.data, column, ColumnKind::Symbol);
        let index = u32::from_le_bytes(self.data[offset..offset + width].try_into().unwrap());
        if index == NULL_SYMBOL {
            None
        } else {
            self.journal.symbols.get(index)
        }
    }
}
