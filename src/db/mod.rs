pub mod migrations;
pub mod queries;

use std::sync::{Mutex, MutexGuard};

use anyhow::Context;
use rusqlite::Connection;

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}

/// Lock the shared connection. Poisoning is cleared: a turn that panicked
/// rolled back its open `Transaction` while unwinding.
pub fn lock(db: &Mutex<Connection>) -> anyhow::Result<MutexGuard<'_, Connection>> {
    Ok(db.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("recovering poisoned database mutex");
        db.clear_poison();
        poisoned.into_inner()
    }))
}
