/// Integration tests for the cache-and-reuse behavior of the pool: a
/// returned reader stays resident and comes back refreshed instead of being
/// reopened.
mod common;

use journal_pool::PoolBuilder;

#[test]
fn single_threaded_reuse_keeps_one_reader() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 8);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    let h1 = pool.reader("trades").unwrap();
    let slot = h1.home_slot();
    assert_eq!(h1.row_count(), 8);
    drop(h1);

    let h2 = pool.reader("trades").unwrap();
    assert_eq!(h2.home_slot(), slot);
    assert_eq!(h2.row_count(), 8);
    drop(h2);

    // Same underlying reader both times: opened once, reused once.
    assert_eq!(pool.metrics().reader_open.value(), 1);
    assert_eq!(pool.metrics().reader_reuse.value(), 1);
    assert_eq!(pool.metrics().readers_cached.value(), 1);
}

#[test]
fn reacquired_reader_sees_appended_data() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 4);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    drop(pool.reader("trades").unwrap());

    // A writer appends rows, a new partition, and new symbols while the
    // reader sits in its slot.
    common::append_rows_to(dir.path(), "trades", "default.dat", 4, 3);
    common::append_rows_to(dir.path(), "trades", "p-0001.dat", 7, 2);
    common::append_symbols(dir.path(), "trades", &["dd"]);
    common::append_raw_row(dir.path(), "trades", "p-0001.dat", 9_000_000, 4.5, 3);

    let reader = pool.reader("trades").unwrap();
    assert_eq!(pool.metrics().reader_open.value(), 1, "no second open");
    assert_eq!(reader.partition_count(), 2);
    assert_eq!(reader.row_count(), 10);

    let last = reader.rows().last().unwrap();
    assert_eq!(last.timestamp("ts"), 9_000_000);
    assert_eq!(last.symbol("sym"), Some("dd"));
}

#[test]
fn reuse_survives_many_cycles() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 2);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    for _ in 0..100 {
        let reader = pool.reader("trades").unwrap();
        assert_eq!(reader.row_count(), 2);
    }

    assert_eq!(pool.metrics().reader_open.value(), 1);
    assert_eq!(pool.metrics().reader_reuse.value(), 99);
    assert_eq!(pool.metrics().reader_return.value(), 100);
}

#[test]
fn distinct_names_get_distinct_chains() {
    let dir = tempfile::TempDir::new().unwrap();
    common::create_journal(dir.path(), "trades", 2);
    common::create_journal(dir.path(), "quotes", 5);
    let pool = PoolBuilder::new(dir.path()).max_segments(1).build();

    let trades = pool.reader("trades").unwrap();
    let quotes = pool.reader("quotes").unwrap();
    assert_eq!(trades.row_count(), 2);
    assert_eq!(quotes.row_count(), 5);
    assert_eq!(trades.name(), "trades");
    assert_eq!(quotes.name(), "quotes");

    drop(trades);
    drop(quotes);
    assert_eq!(pool.metrics().reader_open.value(), 2);
    assert_eq!(pool.metrics().readers_cached.value(), 2);
}
