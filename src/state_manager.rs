// src/state_manager.rs

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),
}

/// Durable record storage, grouped into named collections and keyed by string.
///
/// Every value is stored as JSON, so any serde type can be persisted.
#[derive(Clone)]
pub struct StateManager {
    conn: Connection,
}

impl StateManager {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub async fn new(db_path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
        }
        let conn = Connection::open(db_path).await?;
        let manager = Self { conn };
        manager.setup_database().await?;
        Ok(manager)
    }

    /// A private database that lives as long as this handle and its clones.
    pub async fn in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().await?;
        let manager = Self { conn };
        manager.setup_database().await?;
        Ok(manager)
    }

    async fn setup_database(&self) -> Result<(), StateError> {
        self.conn
            .call(|conn| {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS records (
                        collection      TEXT NOT NULL,
                        key             TEXT NOT NULL,
                        data            TEXT NOT NULL,
                        PRIMARY KEY (collection, key)
                    )",
                    [],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<T>, StateError> {
        let collection = collection.to_owned();
        let key = key.to_owned();
        let data: Option<String> = self
            .conn
            .call(move |conn| {
                let data = conn
                    .query_row(
                        "SELECT data FROM records WHERE collection = ?1 AND key = ?2",
                        params![collection, key],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(data)
            })
            .await?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Inserts or replaces the record under `key`.
    pub async fn set<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        value: &T,
    ) -> Result<(), StateError> {
        let data = serde_json::to_string(value)?;
        let collection = collection.to_owned();
        let key = key.to_owned();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO records (collection, key, data) VALUES (?1, ?2, ?3)",
                    params![collection, key, data],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Loads every record of a collection, ordered by key.
    pub async fn list<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StateError> {
        let collection = collection.to_owned();
        let rows: Vec<String> = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT data FROM records WHERE collection = ?1 ORDER BY key")?;
                let rows = stmt
                    .query_map(params![collection], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(rows)
            })
            .await?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(StateError::from))
            .collect()
    }

    /// Removes a record. Returns whether it existed.
    pub async fn delete(&self, collection: &str, key: &str) -> Result<bool, StateError> {
        let collection = collection.to_owned();
        let key = key.to_owned();
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM records WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                )?;
                Ok(n)
            })
            .await?;
        Ok(removed > 0)
    }

    /// Flushes and closes the database. Every clone of this handle fails
    /// with [`StateError::Database`] afterwards.
    pub async fn close(self) -> Result<(), StateError> {
        self.conn.close().await?;
        Ok(())
    }
}
