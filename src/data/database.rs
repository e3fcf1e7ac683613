//! SQLite record store for logged predictions
//!
//! Every operation opens its own connection and drops it on return, so there is no
//! shared connection between request threads; SQLite's file locking orders writers.

use crate::{FeatureVector, PredictionRecord, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log of single-row predictions
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        RecordStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Connection::open(&self.path)?)
    }

    /// Create the predictions table if it does not exist yet
    pub fn init(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                input_data TEXT,
                predicted_price REAL,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;
        Ok(())
    }

    /// Log a prediction, best effort.
    ///
    /// Failures are logged and dropped: the caller's prediction stands either way.
    pub fn save(&self, input: &FeatureVector, predicted_price: f64) {
        match self.try_save(input, predicted_price) {
            Ok(id) => log::debug!("Saved prediction {} to {}", id, self.path.display()),
            Err(e) => log::error!(
                "Failed to save prediction to {}: {}",
                self.path.display(),
                e
            ),
        }
    }

    /// Log a prediction and return its row id
    pub fn try_save(&self, input: &FeatureVector, predicted_price: f64) -> Result<i64> {
        let input_data = serde_json::to_string(input)?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO predictions (input_data, predicted_price) VALUES (?1, ?2)",
            params![input_data, predicted_price],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent predictions, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, input_data, predicted_price, timestamp
             FROM predictions
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Rows we cannot read back faithfully are errors, never placeholder values
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<PredictionRecord> {
        let input_json: String = row.get(1)?;
        let input_data = serde_json::from_str(&input_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
        })?;

        let timestamp_str: String = row.get(3)?;
        let timestamp = NaiveDateTime::parse_from_str(&timestamp_str, TIMESTAMP_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

        Ok(PredictionRecord {
            id: row.get(0)?,
            input_data,
            predicted_price: row.get(2)?,
            timestamp,
        })
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.connect()?;

        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;

        let first: Option<String> = conn
            .query_row("SELECT MIN(timestamp) FROM predictions", [], |row| row.get(0))
            .optional()?
            .flatten();

        let last: Option<String> = conn
            .query_row("SELECT MAX(timestamp) FROM predictions", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(StoreStats {
            record_count: record_count as usize,
            first_prediction: first
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok()),
            last_prediction: last
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok()),
        })
    }
}

/// Record store statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub record_count: usize,
    pub first_prediction: Option<NaiveDateTime>,
    pub last_prediction: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> FeatureVector {
        FeatureVector::from_row([3.0, 2.0, 1800.0, 5000.0, 1.0, 1990.0])
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("db").join("predictions.db"));
        store.init().unwrap();
        store.init().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.record_count, 0);
        assert!(stats.first_prediction.is_none());
    }

    #[test]
    fn test_save_appends_rows() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("predictions.db"));
        store.init().unwrap();

        let first = store.try_save(&sample(), 412345.67).unwrap();
        let second = store.try_save(&sample(), 398000.0).unwrap();
        assert!(second > first);

        let records = store.recent(10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second);
        assert_eq!(records[1].predicted_price, 412345.67);
        assert_eq!(records[1].input_data["sqft_living"], 1800.0);
        assert!(store.stats().unwrap().last_prediction.is_some());
    }

    #[test]
    fn test_recent_respects_limit() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("predictions.db"));
        store.init().unwrap();
        for i in 0..5 {
            store.save(&sample(), i as f64);
        }

        let records = store.recent(3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].predicted_price, 4.0);
    }

    #[test]
    fn test_unreadable_rows_are_errors() {
        let dir = tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("predictions.db"));
        store.init().unwrap();
        let conn = store.connect().unwrap();

        conn.execute(
            "INSERT INTO predictions (input_data, predicted_price, timestamp) VALUES (?1, ?2, ?3)",
            params!["{}", 1.0, "yesterday"],
        )
        .unwrap();
        assert!(matches!(
            store.recent(10),
            Err(crate::PriceError::Database(_))
        ));

        conn.execute("DELETE FROM predictions", []).unwrap();
        conn.execute(
            "INSERT INTO predictions (input_data, predicted_price) VALUES ('{}', NULL)",
            [],
        )
        .unwrap();
        assert!(store.recent(10).is_err());
    }

    #[test]
    fn test_save_swallows_storage_failure() {
        let dir = tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = RecordStore::new(blocker.join("predictions.db"));

        assert!(store.try_save(&sample(), 1.0).is_err());
        store.save(&sample(), 1.0);
    }
}
