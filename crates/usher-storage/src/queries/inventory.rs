// SPDX-FileCopyrightText: 2026 Usher Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event and ticket inventory reads, plus the inserts used to seed them.
//!
//! Ticket decrements do NOT live here: they run inside the registration
//! submission transaction so inventory and registration rows move together.

use rusqlite::params;

use usher_core::UsherError;

use crate::database::Database;
use crate::models::{parse_iso, to_iso, Event, Ticket};

/// Fetch an event by id.
pub async fn get_event(db: &Database, event_id: i64) -> Result<Option<Event>, UsherError> {
    db.connection()
        .call(move |conn| -> Result<Option<Event>, rusqlite::Error> {
            let result = conn.query_row(
                "SELECT id, name, starts_at FROM events WHERE id = ?1",
                params![event_id],
                |row| {
                    let starts_at: String = row.get(2)?;
                    Ok(Event {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        starts_at: parse_iso(2, &starts_at)?,
                    })
                },
            );
            match result {
                Ok(event) => Ok(Some(event)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List the ticket classes of an event with live availability.
pub async fn list_tickets(db: &Database, event_id: i64) -> Result<Vec<Ticket>, UsherError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Ticket>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, event_id, name, price_cents, available
                 FROM tickets WHERE event_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![event_id], |row| {
                Ok(Ticket {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    name: row.get(2)?,
                    price_cents: row.get(3)?,
                    available: row.get(4)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert an event, returning its id.
pub async fn insert_event(
    db: &Database,
    name: &str,
    starts_at: chrono::DateTime<chrono::Utc>,
) -> Result<i64, UsherError> {
    let name = name.to_string();
    let starts_at = to_iso(starts_at);
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO events (name, starts_at) VALUES (?1, ?2)",
                params![name, starts_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert a ticket class for an event, returning its id.
pub async fn insert_ticket(
    db: &Database,
    event_id: i64,
    name: &str,
    price_cents: i64,
    available: i64,
) -> Result<i64, UsherError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| -> Result<i64, rusqlite::Error> {
            conn.execute(
                "INSERT INTO tickets (event_id, name, price_cents, available)
                 VALUES (?1, ?2, ?3, ?4)",
                params![event_id, name, price_cents, available],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn event_and_tickets_round_trip() {
        let (db, _dir) = setup_db().await;

        let event_id = insert_event(&db, "RustConf Athens", Utc::now()).await.unwrap();
        insert_ticket(&db, event_id, "Standard", 4500, 200).await.unwrap();
        insert_ticket(&db, event_id, "Student", 1500, 50).await.unwrap();

        let event = get_event(&db, event_id).await.unwrap().unwrap();
        assert_eq!(event.name, "RustConf Athens");

        let tickets = list_tickets(&db, event_id).await.unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].name, "Standard");
        assert_eq!(tickets[0].price_cents, 4500);
        assert_eq!(tickets[0].available, 200);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_event_reads_as_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_event(&db, 999).await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
