//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use realmwatch_db::DbError;
use realmwatch_monitor::PopulationStore;
use std::collections::VecDeque;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite;

/// A bound listener and its address. The kernel completes handshakes for
/// it without anyone calling `accept`, which is all a probe needs.
pub fn listening_addr() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

/// An address nothing is listening on.
pub fn closed_addr() -> String {
    let (listener, addr) = listening_addr();
    drop(listener);
    addr
}

/// Write a characters database with `online` and `offline` rows.
pub async fn seed_characters(dir: &TempDir, online: u32, offline: u32) -> PathBuf {
    let path = dir.path().join("characters.db");
    let conn = Connection::open(&path).await.expect("create test database");
    conn.call(move |conn| {
        conn.execute_batch(
            "CREATE TABLE characters (guid INTEGER PRIMARY KEY, name TEXT NOT NULL, online INTEGER NOT NULL DEFAULT 0);",
        )?;
        let tx = conn.transaction()?;
        for i in 0..(online + offline) {
            tx.execute(
                "INSERT INTO characters (name, online) VALUES (?1, ?2)",
                rusqlite::params![format!("char{i}"), i32::from(i < online)],
            )?;
        }
        tx.commit()
    })
    .await
    .expect("seed test database");
    conn.close().await.expect("close test database");
    path
}

/// Replays fixed answers; `None` is a failed query. Runs dry into failures.
pub struct ScriptedStore {
    answers: Mutex<VecDeque<Option<u32>>>,
}

impl ScriptedStore {
    pub fn new(answers: impl IntoIterator<Item = Option<u32>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
        }
    }
}

impl PopulationStore for ScriptedStore {
    async fn online_players(&self) -> realmwatch_db::Result<u32> {
        let next = self.answers.lock().unwrap().pop_front().flatten();
        next.ok_or(DbError::Timeout(Duration::from_secs(3)))
    }
}
