//! SQLite-backed implementation of the append-only transcript log.
//!
//! Persistence is treated as an external contract (`TranscriptRepository`),
//! but a concrete backend is useful for integration tests and as a default
//! for anyone wiring up `captionrelay-session` without bringing their own
//! store.

use captionrelay_events::SessionId;
use captionrelay_transcript::{Segment, Transcript, TranscriptRepository};
use rusqlite::{params, Connection};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("segment {source_seq_id} already committed for session {session_id}")]
    AlreadyCommitted {
        session_id: SessionId,
        source_seq_id: u64,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS segments (
                session_id TEXT NOT NULL,
                source_seq_id INTEGER NOT NULL,
                original_text TEXT NOT NULL,
                corrected_text TEXT,
                translations_json TEXT NOT NULL,
                forced INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                candidate_at INTEGER NOT NULL,
                committed_at INTEGER NOT NULL,
                PRIMARY KEY (session_id, source_seq_id)
            );

            CREATE INDEX IF NOT EXISTS idx_segments_session_seq
                ON segments(session_id, source_seq_id);
            "#,
        )?;
        Ok(())
    }
}

impl TranscriptRepository for Database {
    type Error = StorageError;

    fn append(&self, session_id: SessionId, segment: &Segment) -> Result<()> {
        let translations_json = serde_json::to_string(&segment.translations)?;
        let conn = self.conn.lock().expect("database mutex poisoned");

        let result = conn.execute(
            "INSERT INTO segments
                (session_id, source_seq_id, original_text, corrected_text,
                 translations_json, forced, created_at, candidate_at, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session_id.to_string(),
                segment.source_seq_id as i64,
                segment.original_text,
                segment.corrected_text,
                translations_json,
                segment.forced as i64,
                segment.created_at.timestamp_millis(),
                segment.candidate_at.timestamp_millis(),
                segment.committed_at.timestamp_millis(),
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!(
                    %session_id,
                    source_seq_id = segment.source_seq_id,
                    "segment_appended"
                );
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::AlreadyCommitted {
                    session_id,
                    source_seq_id: segment.source_seq_id,
                })
            }
            Err(other) => Err(StorageError::DatabaseError(other)),
        }
    }

    fn read_all(&self, session_id: SessionId) -> Result<Transcript> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        let segments = Self::query_segments(&conn, session_id, 0)?;
        Ok(Transcript { segments })
    }

    fn read_since(&self, session_id: SessionId, after_source_seq_id: u64) -> Result<Vec<Segment>> {
        let conn = self.conn.lock().expect("database mutex poisoned");
        Self::query_segments(&conn, session_id, after_source_seq_id + 1)
    }
}

impl Database {
    fn query_segments(
        conn: &Connection,
        session_id: SessionId,
        from_seq_id: u64,
    ) -> Result<Vec<Segment>> {
        let mut stmt = conn.prepare(
            "SELECT source_seq_id, original_text, corrected_text, translations_json,
                    forced, created_at, candidate_at, committed_at
             FROM segments
             WHERE session_id = ?1 AND source_seq_id >= ?2
             ORDER BY source_seq_id ASC",
        )?;

        let rows = stmt.query_map(
            params![session_id.to_string(), from_seq_id as i64],
            |row| {
                let source_seq_id: i64 = row.get(0)?;
                let original_text: String = row.get(1)?;
                let corrected_text: Option<String> = row.get(2)?;
                let translations_json: String = row.get(3)?;
                let forced: i64 = row.get(4)?;
                let created_at: i64 = row.get(5)?;
                let candidate_at: i64 = row.get(6)?;
                let committed_at: i64 = row.get(7)?;
                Ok((
                    source_seq_id,
                    original_text,
                    corrected_text,
                    translations_json,
                    forced,
                    created_at,
                    candidate_at,
                    committed_at,
                ))
            },
        )?;

        let mut segments = Vec::new();
        for row in rows {
            let (
                source_seq_id,
                original_text,
                corrected_text,
                translations_json,
                forced,
                created_at,
                candidate_at,
                committed_at,
            ) = row?;
            segments.push(Segment {
                source_seq_id: source_seq_id as u64,
                original_text,
                corrected_text,
                translations: serde_json::from_str(&translations_json)?,
                forced: forced != 0,
                created_at: timestamp_millis_to_utc(created_at),
                candidate_at: timestamp_millis_to_utc(candidate_at),
                committed_at: timestamp_millis_to_utc(committed_at),
                words: None,
            });
        }
        Ok(segments)
    }
}

fn timestamp_millis_to_utc(ms: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
