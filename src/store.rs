// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Local scan history, stored as one serialized blob in SQLite

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::generator::{QuizQuestion, StudyMaterial};
use crate::{Result, StudySnapError};

/// Persisted result of one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub id: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "imageUri", skip_serializing_if = "Option::is_none", default)]
    pub image_uri: Option<String>,
    pub explanation: String,
    pub summary: Vec<String>,
    pub quiz: Vec<QuizQuestion>,
}

/// History store: the full record list lives as one JSON array under a
/// single key, newest first. Appends are read-modify-write on the whole
/// blob; the application has a single in-process writer.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
    key: String,
}

impl HistoryStore {
    /// Open or create the store
    pub fn open<P: AsRef<Path>>(path: P, key: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            key: key.to_string(),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn in_memory(key: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            key: key.to_string(),
        };
        store.initialize()?;
        Ok(store)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StudySnapError::Config("Store lock poisoned".to_string()))
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    /// Prepend a record to the history and write the full list back
    pub fn append(&self, record: &StudyRecord) -> Result<()> {
        let mut records = self.list()?;
        records.insert(0, record.clone());

        let json = serde_json::to_string(&records)?;
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![self.key, json],
        )?;
        Ok(())
    }

    /// Read all records, newest first.
    ///
    /// An absent key yields an empty list. A stored value that fails to
    /// parse also degrades to empty (with a warning) so old or corrupt
    /// data never wedges the caller; storage-level failures are returned
    /// as errors and remain distinguishable from legitimate emptiness.
    pub fn list(&self) -> Result<Vec<StudyRecord>> {
        let conn = self.lock_conn()?;
        let result: rusqlite::Result<String> = conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![self.key],
            |row| row.get(0),
        );

        match result {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(records) => Ok(records),
                Err(e) => {
                    warn!("Stored history is unreadable, treating as empty: {}", e);
                    Ok(Vec::new())
                }
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a single record by id
    pub fn get(&self, id: &str) -> Result<Option<StudyRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Delete the whole history
    pub fn clear(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![self.key])?;
        Ok(())
    }
}

/// Stamp generated material into a new record
pub fn create_record(material: StudyMaterial, image_uri: Option<String>) -> StudyRecord {
    StudyRecord {
        id: Uuid::new_v4().to_string(),
        date: Utc::now(),
        image_uri,
        explanation: material.explanation,
        summary: material.summary,
        quiz: material.quiz,
    }
}
