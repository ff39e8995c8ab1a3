//! Shared SQLite connection tuning for the durable tier

use rusqlite::Connection;
use std::time::Duration;

/// WAL journal, NORMAL sync, in-memory temp tables, 64MB page cache,
/// checkpoint every 1000 pages, 5s busy timeout.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -64000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
    conn.busy_timeout(Duration::from_secs(5))?;

    log::debug!(
        "🔧 Applied SQLite pragmas (journal_mode={}, NORMAL, MEMORY, autocheckpoint=1000)",
        journal_mode
    );
    Ok(())
}
