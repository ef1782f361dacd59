// Fixture helpers shared by the integration tests: lay down journals in the
// on-disk layout the pool reads (a `_meta.json`, partition data files, and
// the `_symbols.dat` table).
#![allow(dead_code)]

use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use journal_pool::{ColumnKind, ColumnMeta, JournalMetadata, PartitionBy};

/// Cell value of a symbol column with no symbol set.
pub const NULL_SYMBOL: u32 = u32::MAX;

/// The standard test journal: ts (timestamp), value (double), sym (symbol),
/// with symbols "aa"/"bb"/"cc". Row `i` carries ts = i micros * 1e6,
/// value = i * 0.5, sym = i % 3.
pub fn create_journal(base: &Path, name: &str, rows: usize) {
    let dir = base.join(name);
    fs::create_dir_all(&dir).unwrap();
    let metadata = JournalMetadata {
        name: name.to_string(),
        partition_by: PartitionBy::None,
        columns: vec![
            ColumnMeta {
                name: "ts".to_string(),
                kind: ColumnKind::Timestamp,
            },
            ColumnMeta {
                name: "value".to_string(),
                kind: ColumnKind::Double,
            },
            ColumnMeta {
                name: "sym".to_string(),
                kind: ColumnKind::Symbol,
            },
        ],
        record_hint: rows as u64,
    };
    fs::write(
        dir.join("_meta.json"),
        serde_json::to_vec_pretty(&metadata).unwrap(),
    )
    .unwrap();
    append_symbols(base, name, &["aa", "bb", "cc"]);
    append_rows_to(base, name, "default.dat", 0, rows);
}

/// Append `count` standard rows starting at logical index `start` to a
/// partition file, creating it if needed.
pub fn append_rows_to(base: &Path, name: &str, partition: &str, start: usize, count: usize) {
    let path = base.join(name).join(partition);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    let mut raw = Vec::new();
    for i in start..start + count {
        raw.extend_from_slice(&(i as i64 * 1_000_000).to_le_bytes());
        raw.extend_from_slice(&(i as f64 * 0.5).to_le_bytes());
        raw.extend_from_slice(&((i % 3) as u32).to_le_bytes());
    }
    file.write_all(&raw).unwrap();
}

/// Append one row with an explicit symbol index (for null and out-of-range
/// symbol cases).
pub fn append_raw_row(base: &Path, name: &str, partition: &str, ts: i64, value: f64, sym: u32) {
    let path = base.join(name).join(partition);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    let mut raw = Vec::new();
    raw.extend_from_slice(&ts.to_le_bytes());
    raw.extend_from_slice(&value.to_le_bytes());
    raw.extend_from_slice(&sym.to_le_bytes());
    file.write_all(&raw).unwrap();
}

/// Append entries to the journal's symbol table.
pub fn append_symbols(base: &Path, name: &str, symbols: &[&str]) {
    let path = base.join(name).join("_symbols.dat");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    let mut raw = Vec::new();
    for s in symbols {
        raw.extend_from_slice(&(s.len() as u32).to_le_bytes());
        raw.extend_from_slice(s.as_bytes());
    }
    file.write_all(&raw).unwrap();
}
