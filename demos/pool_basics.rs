//! Walks the pool through its lifecycle against a small journal written on
//! the fly: acquire, read, return, reuse, lock, shutdown.
//!
//! Run with: cargo run --example pool_basics

use std::fs;
use std::path::Path;

use journal_pool::{
    ColumnKind, ColumnMeta, JournalMetadata, PartitionBy, PoolBuilder,
};

fn write_fixture(base: &Path) {
    let dir = base.join("trades");
    fs::create_dir_all(&dir).unwrap();

    let metadata = JournalMetadata {
        name: "trades".to_string(),
        partition_by: PartitionBy::None,
        columns: vec![
            ColumnMeta {
                name: "ts".to_string(),
                kind: ColumnKind::Timestamp,
            },
            ColumnMeta {
                name: "price".to_string(),
                kind: ColumnKind::Double,
            },
            ColumnMeta {
                name: "sym".to_string(),
                kind: ColumnKind::Symbol,
            },
        ],
        record_hint: 3,
    };
    fs::write(
        dir.join("_meta.json"),
        serde_json::to_vec_pretty(&metadata).unwrap(),
    )
    .unwrap();

    let mut symbols = Vec::new();
    for s in ["AAPL", "MSFT"] {
        symbols.extend_from_slice(&(s.len() as u32).to_le_bytes());
        symbols.extend_from_slice(s.as_bytes());
    }
    fs::write(dir.join("_symbols.dat"), symbols).unwrap();

    let mut rows = Vec::new();
    for (i, (price, sym)) in [(182.5f64, 0u32), (415.1, 1), (183.0, 0)].into_iter().enumerate() {
        rows.extend_from_slice(&(i as i64 * 1_000_000).to_le_bytes());
        rows.extend_from_slice(&price.to_le_bytes());
        rows.extend_from_slice(&sym.to_le_bytes());
    }
    fs::write(dir.join("default.dat"), rows).unwrap();
}

fn main() {
    let dir = tempfile::TempDir::new().unwrap();
    write_fixture(dir.path());

    let pool = PoolBuilder::new(dir.path()).max_segments(2).build();
    println!("pool capacity per journal: {} readers", pool.max_entries());

    // First acquisition opens the journal.
    let reader = pool.reader("trades").unwrap();
    println!("opened '{}' with {} rows", reader.name(), reader.row_count());
    for row in reader.rows() {
        println!(
            "  ts={} price={} sym={:?}",
            row.timestamp("ts"),
            row.double("price"),
            row.symbol("sym")
        );
    }
    drop(reader); // returns the reader to its slot

    // Second acquisition reuses the cached reader.
    let reader = pool.reader("trades").unwrap();
    println!(
        "opens={} reuses={}",
        pool.metrics().reader_open.value(),
        pool.metrics().reader_reuse.value()
    );
    drop(reader);

    // Administrative exclusion drains the name...
    pool.lock("trades").unwrap();
    assert!(pool.reader("trades").is_err());
    pool.unlock("trades");

    // ...and a fresh reader comes back afterwards.
    let reader = pool.reader("trades").unwrap();
    println!("reopened after unlock: {} rows", reader.row_count());
    drop(reader);

    pool.close();
    println!(
        "closed: {} readers freed",
        pool.metrics().reader_close.value()
    );
}
