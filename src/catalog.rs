//! Local catalog backed by SQLite with an FTS5 index.
//!
//! A `CandidateFetcher` for offline matching and tests. Search text is the
//! normalized title plus artists, indexed with the `unicode61` tokenizer so
//! diacritics fold the same way on both sides.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode};
use tracing::debug;

use crate::errors::FetchError;
use crate::fetch::CandidateFetcher;
use crate::models::Candidate;
use crate::normalize::TextNormalizer;

const WRITE_BATCH_SIZE: usize = 10_000;

/// Default number of rows returned per query
pub const DEFAULT_RESULT_LIMIT: usize = 50;

/// SQLite VM instructions between deadline checks
const PROGRESS_OPS: i32 = 1_000;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS candidates (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL,
        artists TEXT NOT NULL,
        label TEXT,
        release_year INTEGER,
        key TEXT,
        bpm REAL,
        url TEXT NOT NULL UNIQUE,
        search_text TEXT NOT NULL
    );

    CREATE VIRTUAL TABLE IF NOT EXISTS candidates_fts USING fts5(
        search_text,
        content='candidates',
        content_rowid='id',
        tokenize='unicode61 remove_diacritics 2'
    );";

pub struct SqliteCatalog {
    conn: Mutex<Connection>,
    normalizer: TextNormalizer,
    limit: usize,
}

impl SqliteCatalog {
    /// Create (or extend) a catalog database file.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to create catalog {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an existing catalog.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Catalog {} does not exist", path.display());
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog {}", path.display()))?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name IN ('candidates', 'candidates_fts')",
            [],
            |row| row.get(0),
        )?;
        if tables != 2 {
            bail!("{} is not a trackmatch catalog", path.display());
        }
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            normalizer: TextNormalizer::default(),
            limit: DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, FetchError> {
        self.conn
            .lock()
            .map_err(|_| FetchError::Backend("catalog connection lock poisoned".to_string()))
    }

    /// Insert candidates, replacing rows with the same url.
    /// Call `rebuild_index` afterwards to make them searchable.
    pub fn insert(&self, candidates: &[Candidate]) -> Result<usize> {
        let mut conn = self.lock()?;
        let mut written = 0;
        for chunk in candidates.chunks(WRITE_BATCH_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO candidates
                        (title, artists, label, release_year, key, bpm, url, search_text)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for c in chunk {
                    let search_text = self
                        .normalizer
                        .normalize(&format!("{} {}", c.title, c.artists.join(" ")));
                    stmt.execute(params![
                        c.title,
                        serde_json::to_string(&c.artists)?,
                        c.label,
                        c.release_year,
                        c.key,
                        c.bpm,
                        c.url,
                        search_text,
                    ])?;
                    written += 1;
                }
            }
            tx.commit()?;
        }
        Ok(written)
    }

    pub fn rebuild_index(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO candidates_fts(candidates_fts) VALUES('rebuild')", [])?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM candidates", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// FTS5 expression requiring every normalized token, each quoted so
    /// word-internal '-' and '.' stay literal.
    fn match_expression(&self, query: &str) -> Option<String> {
        let tokens: Vec<String> = self
            .normalizer
            .tokenize(query)
            .into_iter()
            .map(|t| format!("\"{}\"", t.replace('"', "")))
            .collect();
        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(" "))
        }
    }

    fn search(&self, expr: &str, timeout: Duration) -> Result<Vec<Candidate>, FetchError> {
        let conn = self.lock()?;
        let started = Instant::now();
        let deadline = started + timeout;
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() > deadline));

        let result = (|| -> rusqlite::Result<Vec<Candidate>> {
            let mut stmt = conn.prepare_cached(
                "SELECT c.title, c.artists, c.label, c.release_year, c.key, c.bpm, c.url
                 FROM candidates_fts
                 JOIN candidates c ON candidates_fts.rowid = c.id
                 WHERE candidates_fts MATCH ?1
                 ORDER BY candidates_fts.rank, c.id
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![expr, self.limit as i64])?;
            let mut found = Vec::new();
            while let Some(row) = rows.next()? {
                let artists: String = row.get(1)?;
                let artists: Vec<String> = serde_json::from_str(&artists).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                })?;
                found.push(Candidate {
                    title: row.get(0)?,
                    artists,
                    label: row.get(2)?,
                    release_year: row.get(3)?,
                    key: row.get(4)?,
                    bpm: row.get(5)?,
                    url: row.get(6)?,
                });
            }
            Ok(found)
        })();

        conn.progress_handler(0, None::<fn() -> bool>);

        result.map_err(|e| {
            if is_interrupted(&e) {
                FetchError::Timeout { elapsed: started.elapsed(), limit: timeout }
            } else {
                FetchError::from(e)
            }
        })
    }
}

impl CandidateFetcher for SqliteCatalog {
    fn fetch(&self, query: &str, timeout: Duration) -> Result<Vec<Candidate>, FetchError> {
        let Some(expr) = self.match_expression(query) else {
            return Ok(Vec::new());
        };
        let found = self.search(&expr, timeout)?;
        debug!(query, expr = %expr, found = found.len(), "catalog search");
        Ok(found)
    }
}

/// True when SQLite aborted a statement through the progress handler.
pub fn is_interrupted(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::OperationInterrupted)
}

// ============================================================================
// TESTS
// ============================================================================
