//! SQLite beat database

use super::BeatStore;
use crate::error::StorageError;
use crate::model::{Beat, FileRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS beats (
    id          TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL CHECK (length(title) > 0),
    bpm         REAL NOT NULL CHECK (bpm >= 0),
    musical_key TEXT NOT NULL,
    file_path   TEXT,
    file_blob   BLOB,
    CHECK ((file_path IS NULL) <> (file_blob IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_beats_title ON beats(title);
CREATE INDEX IF NOT EXISTS idx_beats_bpm ON beats(bpm);
CREATE INDEX IF NOT EXISTS idx_beats_key ON beats(musical_key);

CREATE TABLE IF NOT EXISTS beat_tags (
    beat_id  TEXT NOT NULL REFERENCES beats(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    tag      TEXT NOT NULL,
    PRIMARY KEY (beat_id, position)
);
CREATE INDEX IF NOT EXISTS idx_beat_tags_tag ON beat_tags(tag);
";

const SELECT_BEAT: &str =
    "SELECT id, title, bpm, musical_key, file_path, file_blob FROM beats";

/// Beat store backed by a SQLite file
pub struct SqliteBeatStore {
    conn: Connection,
}

impl SqliteBeatStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        log::debug!("Opening beat database at {:?}", path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Look up one beat by id
    pub fn get(&self, id: &str) -> Result<Option<Beat>, StorageError> {
        let beat = self
            .conn
            .query_row(&format!("{} WHERE id = ?1", SELECT_BEAT), [id], beat_from_row)
            .optional()?;

        match beat {
            Some(mut beat) => {
                beat.tags = self.tags_of(&beat.id)?;
                Ok(Some(beat))
            }
            None => Ok(None),
        }
    }

    /// All beats in insertion order
    pub fn list(&self) -> Result<Vec<Beat>, StorageError> {
        self.query_beats(&format!("{} ORDER BY rowid", SELECT_BEAT), [])
    }

    /// Beats carrying `tag`, in insertion order
    pub fn find_by_tag(&self, tag: &str) -> Result<Vec<Beat>, StorageError> {
        self.query_beats(
            &format!(
                "{} WHERE id IN (SELECT beat_id FROM beat_tags WHERE tag = ?1) ORDER BY rowid",
                SELECT_BEAT
            ),
            [tag],
        )
    }

    /// Number of stored beats
    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM beats", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn query_beats<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Beat>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut beats = stmt
            .query_map(params, beat_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for beat in &mut beats {
            beat.tags = self.tags_of(&beat.id)?;
        }
        Ok(beats)
    }

    fn tags_of(&self, id: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT tag FROM beat_tags WHERE beat_id = ?1 ORDER BY position")?;
        let tags = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    }
}

impl BeatStore for SqliteBeatStore {
    fn put(&self, beat: &Beat) -> Result<String, StorageError> {
        let (file_path, file_blob) = match &beat.file {
            FileRef::Handle(path) => (Some(path.to_string_lossy().into_owned()), None),
            FileRef::Blob(bytes) => (None, Some(bytes.as_slice())),
        };

        let tx = self.conn.unchecked_transaction()?;

        let inserted = tx.execute(
            "INSERT INTO beats (id, title, bpm, musical_key, file_path, file_blob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![beat.id, beat.title, beat.bpm, beat.key, file_path, file_blob],
        );
        if let Err(rusqlite::Error::SqliteFailure(e, _)) = &inserted {
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY {
                return Err(StorageError::Duplicate(beat.id.clone()));
            }
        }
        inserted?;

        for (position, tag) in beat.tags.iter().enumerate() {
            tx.execute(
                "INSERT INTO beat_tags (beat_id, position, tag) VALUES (?1, ?2, ?3)",
                params![beat.id, position as i64, tag],
            )?;
        }

        tx.commit()?;
        log::debug!("Stored beat {} ({})", beat.id, beat.title);
        Ok(beat.id.clone())
    }
}

fn beat_from_row(row: &Row<'_>) -> rusqlite::Result<Beat> {
    let file_path: Option<String> = row.get(4)?;
    let file_blob: Option<Vec<u8>> = row.get(5)?;
    let file = match file_path {
        Some(path) => FileRef::Handle(PathBuf::from(path)),
        None => FileRef::Blob(file_blob.unwrap_or_default()),
    };

    Ok(Beat {
        id: row.get(0)?,
        title: row.get(1)?,
        bpm: row.get(2)?,
        key: row.get(3)?,
        tags: Vec::new(),
        file,
    })
}
