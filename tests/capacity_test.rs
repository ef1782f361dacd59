/// Integration tests for capacity: the 32-slot entries, chain growth under
/// demand, and the hard cap at max_segments.
mod common;

use journal_pool::{PoolBuilder, PoolError};

#[test]
fn full_entry_rejects_the_33rd_acquisition() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 2);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();
    assert_eq!(pool.max_entries(), 32);

    let mut held = Vec::new();
    for _ in 0..32 {
        held.push(pool.reader("trades").unwrap());
    }

    assert!(matches!(
        pool.reader("trades"),
        Err(PoolError::PoolFull { max_entries: 32, .. })
    ));

    // Returning any one reader frees capacity again.
    held.pop();
    let reader = pool.reader("trades").unwrap();
    assert_eq!(reader.home_slot(), (0, 31));
}

#[test]
fn chain_grows_by_one_entry_for_the_33rd_reader() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 2);
    let pool = PoolBuilder::new(dir.path()).max_segments(4).build();

    let mut held = Vec::new();
    for _ in 0..33 {
        held.push(pool.reader("trades").unwrap());
    }

    assert_eq!(pool.metrics().entry_grow.value(), 1);
    assert_eq!(held[31].home_slot(), (0, 31));
    assert_eq!(held[32].home_slot(), (1, 0));
}

#[test]
fn capacity_is_max_segments_times_entry_size() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 2);
    let pool = PoolBuilder::new(dir.path()).max_segments(4).build();
    assert_eq!(pool.max_entries(), 128);

    let mut held = Vec::new();
    for i in 0..128 {
        let reader = pool
            .reader("trades")
            .unwrap_or_else(|e| panic!("acquisition {i} failed: {e}"));
        held.push(reader);
    }
    assert_eq!(pool.metrics().entry_grow.value(), 3);

    assert!(matches!(
        pool.reader("trades"),
        Err(PoolError::PoolFull { max_entries: 128, .. })
    ));
}

#[test]
fn scan_is_first_fit_front_to_back() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 2);
    let pool = PoolBuilder::new(dir.path()).max_segments(2).build();

    let a = pool.reader("trades").unwrap();
    let b = pool.reader("trades").unwrap();
    let c = pool.reader("trades").unwrap();
    assert_eq!(a.home_slot(), (0, 0));
    assert_eq!(b.home_slot(), (0, 1));
    assert_eq!(c.home_slot(), (0, 2));

    // Freeing the leftmost slot makes it the next one claimed.
    drop(a);
    let again = pool.reader("trades").unwrap();
    assert_eq!(again.home_slot(), (0, 0));
}
