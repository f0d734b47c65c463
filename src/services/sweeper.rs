//! Periodic release of expired holds.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use tokio::task::JoinHandle;

use crate::db::{self, queries};

const FIRST_RUN_DELAY: Duration = Duration::from_secs(10);

/// Release every held place whose expiry is before `now`.
pub fn sweep(conn: &Mutex<Connection>, now: NaiveDateTime) -> anyhow::Result<usize> {
    let conn = db::lock(conn)?;
    queries::release_expired_products(&conn, &now)
}

pub fn spawn(conn: Arc<Mutex<Connection>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + FIRST_RUN_DELAY, every);
        loop {
            ticker.tick().await;
            match sweep(&conn, Utc::now().naive_utc()) {
                Ok(0) => {}
                Ok(released) => tracing::info!(released, "released expired places"),
                Err(e) => tracing::error!(error = %e, "sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sender;

    #[test]
    fn test_sweep_releases_only_expired_holds() {
        let conn = Mutex::new(db::init_db(":memory:").unwrap());
        let now = NaiveDateTime::parse_from_str("2025-06-16 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let (expired, pending) = {
            let c = conn.lock().unwrap();
            let user = queries::get_or_create_user(
                &c,
                &Sender {
                    telegram_user_id: "42".to_string(),
                    ..Sender::default()
                },
            )
            .unwrap();
            let cat = queries::insert_category(&c, "Zone A").unwrap();
            let expired = queries::insert_product(&c, &cat.id, "A1", "", 500, None).unwrap();
            let pending = queries::insert_product(&c, &cat.id, "A2", "", 500, None).unwrap();
            let one_second = chrono::Duration::seconds(1);
            queries::reserve_product(&c, &expired.id, &user.id, &(now - one_second)).unwrap();
            queries::reserve_product(&c, &pending.id, &user.id, &(now + one_second)).unwrap();
            (expired, pending)
        };

        assert_eq!(sweep(&conn, now).unwrap(), 1);

        let c = conn.lock().unwrap();
        let released = queries::get_product(&c, &expired.id).unwrap().unwrap();
        assert!(released.is_free);
        assert!(released.lessor_id.is_none());
        assert!(released.expiration_date.is_none());

        let held = queries::get_product(&c, &pending.id).unwrap().unwrap();
        assert!(!held.is_free);
        assert_eq!(held.expiration_date, Some(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_sweep_without_holds_is_noop() {
        let conn = Mutex::new(db::init_db(":memory:").unwrap());
        assert_eq!(sweep(&conn, Utc::now().naive_utc()).unwrap(), 0);
    }
}
