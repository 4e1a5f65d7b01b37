//! libSQL record store gateway for the lexical entry table.
//!
//! The [`LexiconStore`] issues exactly two statement shapes against a table
//! it does not own: a ranged select over ids and a single-row document update.
//! Every call opens its own connection and drops it before returning, so a
//! store handle carries no connection state between calls.
//!
//! **Access rules:**
//! - Batch workers: read-write via [`LexiconStore::open`]
//! - Inspection commands and dry runs: read-only via [`LexiconStore::open_readonly`]

use std::path::Path;

use libsql::{Connection, Database, params};
use tracing::{debug, warn};

use lexenrich_shared::{LexError, LexicalRecord, Result, StoreConfig, StoreErrorKind, TableSchema};

/// How long a local connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

// SQLite primary result codes (extended codes carry these in the low byte).
const SQLITE_ERROR: i32 = 1;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_READONLY: i32 = 8;
const SQLITE_IOERR: i32 = 10;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_CONSTRAINT: i32 = 19;

/// Handle to the lexical entry table.
pub struct LexiconStore {
    db: Database,
    schema: TableSchema,
    remote: bool,
    readonly: bool,
    fetch_sql: String,
    fetch_one_sql: String,
    count_sql: String,
    update_sql: String,
}

impl LexiconStore {
    /// Open the store described by `config` in read-write mode.
    ///
    /// A configured `url` selects a remote libSQL database, authenticated with
    /// the token in the env var named by `auth_token_env`; otherwise `path` is
    /// opened as a local database file.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let schema = TableSchema::try_from(config)?;
        match &config.url {
            Some(url) => {
                let token = std::env::var(&config.auth_token_env).unwrap_or_default();
                Self::open_remote(url, token, schema).await
            }
            None => Self::open_local(Path::new(&config.path), schema).await,
        }
    }

    /// Open the store described by `config` in read-only mode.
    pub async fn open_readonly(config: &StoreConfig) -> Result<Self> {
        let mut store = Self::open(config).await?;
        store.readonly = true;
        Ok(store)
    }

    /// Open a local database file.
    pub async fn open_local(path: &Path, schema: TableSchema) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| store_error("open", &e))?;
        Ok(Self::with_database(db, schema, false))
    }

    /// Open a remote libSQL database.
    pub async fn open_remote(url: &str, auth_token: String, schema: TableSchema) -> Result<Self> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token)
            .build()
            .await
            .map_err(|e| store_error("open", &e))?;
        Ok(Self::with_database(db, schema, true))
    }

    fn with_database(db: Database, schema: TableSchema, remote: bool) -> Self {
        let TableSchema {
            table,
            id_column: id,
            term_column: term,
            document_column: doc,
        } = &schema;
        Self {
            fetch_sql: format!(
                r#"SELECT "{id}", "{term}", "{doc}" FROM "{table}" WHERE "{id}" > ?1 ORDER BY "{id}""#
            ),
            fetch_one_sql: format!(
                r#"SELECT "{id}", "{term}", "{doc}" FROM "{table}" WHERE "{id}" = ?1"#
            ),
            count_sql: format!(r#"SELECT COUNT(*) FROM "{table}" WHERE "{id}" > ?1"#),
            update_sql: format!(r#"UPDATE "{table}" SET "{doc}" = ?1 WHERE "{id}" = ?2"#),
            db,
            schema,
            remote,
            readonly: false,
        }
    }

    /// The table layout this store was opened with.
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Fresh connection for a single call. Released when dropped.
    async fn connect(&self) -> Result<Connection> {
        let conn = self.db.connect().map_err(|e| store_error("connect", &e))?;
        if !self.remote {
            // PRAGMA busy_timeout reports the new value as a row.
            conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ())
                .await
                .map_err(|e| store_error("connect", &e))?;
        }
        Ok(conn)
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LexError::store(
                StoreErrorKind::Operational,
                "store is opened in read-only mode",
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All records with `id > min_id`, ascending by id.
    pub async fn fetch_candidates(&self, min_id: i64) -> Result<Vec<LexicalRecord>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(&self.fetch_sql, params![min_id])
            .await
            .map_err(|e| store_error("fetch candidates", &e))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| store_error("fetch candidates", &e))?
        {
            records.push(row_to_record(&row)?);
        }
        debug!(min_id, count = records.len(), "fetched candidate records");
        Ok(records)
    }

    /// A single record by id.
    pub async fn fetch_record(&self, id: i64) -> Result<Option<LexicalRecord>> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(&self.fetch_one_sql, params![id])
            .await
            .map_err(|e| store_error("fetch record", &e))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(store_error("fetch record", &e)),
        }
    }

    /// Number of records with `id > min_id`.
    pub async fn count_candidates(&self, min_id: i64) -> Result<u64> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(&self.count_sql, params![min_id])
            .await
            .map_err(|e| store_error("count candidates", &e))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).map_err(|e| store_error("count candidates", &e))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(store_error("count candidates", &e)),
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Replace the document of record `id`. Returns the affected row count.
    ///
    /// Runs in its own transaction: committed on success, rolled back on any
    /// failure before the error is returned.
    pub async fn persist_document(&self, id: i64, document: &str) -> Result<u64> {
        self.check_writable()?;
        let conn = self.connect().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| store_error("begin", &e))?;

        match tx.execute(&self.update_sql, params![document, id]).await {
            Ok(affected) => {
                tx.commit().await.map_err(|e| store_error("commit", &e))?;
                Ok(affected)
            }
            Err(e) => {
                let err = store_error("update", &e);
                if let Err(rollback) = tx.rollback().await {
                    warn!(id, error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Convert a database row to a [`LexicalRecord`].
fn row_to_record(row: &libsql::Row) -> Result<LexicalRecord> {
    Ok(LexicalRecord {
        id: row.get::<i64>(0).map_err(|e| store_error("read row", &e))?,
        term: row
            .get::<Option<String>>(1)
            .map_err(|e| store_error("read row", &e))?
            .unwrap_or_default(),
        document: row
            .get::<Option<String>>(2)
            .map_err(|e| store_error("read row", &e))?
            .unwrap_or_default(),
    })
}

/// Map a driver error to the store taxonomy.
pub fn classify(error: &libsql::Error) -> StoreErrorKind {
    match error {
        libsql::Error::SqliteFailure(code, _) => match *code & 0xff {
            SQLITE_ERROR => StoreErrorKind::Syntax,
            SQLITE_CONSTRAINT => StoreErrorKind::Integrity,
            SQLITE_BUSY | SQLITE_LOCKED | SQLITE_READONLY | SQLITE_IOERR | SQLITE_FULL
            | SQLITE_CANTOPEN => StoreErrorKind::Operational,
            _ => StoreErrorKind::Generic,
        },
        _ => StoreErrorKind::Generic,
    }
}

/// Classify, log, and wrap a driver error.
fn store_error(operation: &str, error: &libsql::Error) -> LexError {
    let kind = classify(error);
    warn!(operation, %kind, error = %error, "store operation failed");
    LexError::store(kind, format!("{operation}: {error}"))
}
