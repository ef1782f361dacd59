/// Integration tests for pool shutdown: deterministic closure of cached
/// readers, the fate of outstanding borrows, and idempotence.
mod common;

use journal_pool::{PoolBuilder, PoolError};

#[test]
fn close_frees_cached_readers() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 4);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    drop(pool.reader("trades").unwrap());
    assert_eq!(pool.metrics().readers_cached.value(), 1);

    pool.close();
    assert_eq!(pool.metrics().readers_cached.value(), 0);
    assert_eq!(pool.metrics().reader_close.value(), 1);
}

#[test]
fn outstanding_borrow_survives_close_and_frees_on_drop() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 4);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    let held = pool.reader("trades").unwrap();
    pool.close();

    // The pool is terminal for new acquisitions...
    assert!(matches!(pool.reader("trades"), Err(PoolError::PoolClosed)));

    // ...but the borrowed reader keeps working until returned.
    assert_eq!(held.row_count(), 4);
    assert_eq!(pool.metrics().readers_cached.value(), 1);

    // Returning it now actually frees it instead of recycling.
    drop(held);
    assert_eq!(pool.metrics().readers_cached.value(), 0);
    assert_eq!(pool.metrics().reader_close.value(), 1);
    assert_eq!(pool.metrics().reader_return.value(), 0);
}

#[test]
fn close_twice_is_a_noop() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 4);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    drop(pool.reader("trades").unwrap());
    pool.close();
    let closes = pool.metrics().reader_close.value();
    pool.close();
    assert_eq!(pool.metrics().reader_close.value(), closes);
}

#[test]
fn handle_outlives_a_dropped_pool() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 4);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    let held = pool.reader("trades").unwrap();
    drop(pool);

    // The pool (and its weak back-reference target) is gone; the handle
    // still owns its reader and frees it directly on drop.
    assert_eq!(held.row_count(), 4);
    assert_eq!(held.name(), "trades");
    drop(held);
}
