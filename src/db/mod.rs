use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

use crate::models::{Dict, MediaEntry, Value};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().with_context(|| "Failed to open in-memory database")?;

        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS media (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                artist TEXT,
                album TEXT,
                duration INTEGER NOT NULL DEFAULT 0,
                added_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_media_artist ON media(artist);
            CREATE INDEX IF NOT EXISTS idx_media_album ON media(album);
            "#,
        ).with_context(|| "Failed to initialize database schema")?;

        Ok(())
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<MediaEntry> {
        Ok(MediaEntry {
            id: row.get(0)?,
            url: row.get(1)?,
            title: row.get(2)?,
            artist: row.get(3)?,
            album: row.get(4)?,
            duration: row.get(5)?,
            added_at: row
                .get::<_, String>(6)?
                .parse::<DateTime<Utc>>()
                .unwrap_or_default(),
        })
    }

    /// Insert `entry` and return its assigned id.
    pub fn insert_entry(&self, entry: &MediaEntry) -> Result<u32> {
        self.conn.execute(
            "INSERT INTO media (url, title, artist, album, duration, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.url,
                entry.title,
                entry.artist,
                entry.album,
                entry.duration,
                entry.added_at.to_rfc3339(),
            ],
        ).with_context(|| "Failed to insert media entry")?;

        let id = u32::try_from(self.conn.last_insert_rowid())
            .with_context(|| "Media id out of range")?;
        Ok(id)
    }

    pub fn get_entry(&self, id: u32) -> Result<Option<MediaEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, title, artist, album, duration, added_at
             FROM media WHERE id = ?1",
        )?;

        let entry = stmt.query_row([id], Self::row_to_entry).optional()?;
        Ok(entry)
    }

    pub fn get_entry_by_url(&self, url: &str) -> Result<Option<MediaEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, title, artist, album, duration, added_at
             FROM media WHERE url = ?1",
        )?;

        let entry = stmt.query_row([url], Self::row_to_entry).optional()?;
        Ok(entry)
    }

    pub fn get_all_entries(&self) -> Result<Vec<MediaEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, url, title, artist, album, duration, added_at
             FROM media ORDER BY id",
        )?;

        let entries = stmt
            .query_map([], Self::row_to_entry)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    pub fn get_entry_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM media", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Run a read-only query and return one dict per row, keyed by column name.
    pub fn select(&self, query: &str) -> Result<Vec<Dict>> {
        let mut stmt = self
            .conn
            .prepare(query)
            .with_context(|| format!("Invalid query: {query}"))?;

        if !stmt.readonly() {
            bail!("Only read-only queries are allowed");
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([])?;
        let mut dicts = Vec::new();
        while let Some(row) = rows.next()? {
            let mut dict = Dict::new();
            for (i, name) in columns.iter().enumerate() {
                if let Some(value) = column_value(row.get_ref(i)?) {
                    dict.insert(name.clone(), value);
                }
            }
            dicts.push(dict);
        }

        Ok(dicts)
    }

    /// Run a read-only query and return the first column of every row.
    /// Rows where that column is NULL or a blob are skipped.
    pub fn select_column(&self, query: &str) -> Result<Vec<Value>> {
        let mut stmt = self
            .conn
            .prepare(query)
            .with_context(|| format!("Invalid query: {query}"))?;

        if !stmt.readonly() {
            bail!("Only read-only queries are allowed");
        }
        if stmt.column_count() == 0 {
            bail!("Query returns no columns");
        }

        let mut rows = stmt.query([])?;
        let mut values = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(value) = column_value(row.get_ref(0)?) {
                values.push(value);
            }
        }

        Ok(values)
    }
}

/// Integers become int32 when they fit, then uint32, then text.
fn column_value(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(v) => Some(if let Ok(v) = i32::try_from(v) {
            Value::Int32(v)
        } else if let Ok(v) = u32::try_from(v) {
            Value::Uint32(v)
        } else {
            Value::String(v.to_string())
        }),
        ValueRef::Real(v) => Some(Value::String(v.to_string())),
        ValueRef::Text(bytes) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}
