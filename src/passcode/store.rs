//! SQLite storage for passcodes and the request log.
//!
//! The pool is opened once at startup and the schema in `db/sql/passgate.sql`
//! is applied on every open. Query helpers take a bare connection so callers
//! can run them either on a pooled connection or inside a transaction.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Connection, Row, Sqlite, SqliteConnection, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{Instrument, Span, info_span};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/db/sql/passgate.sql"));

/// A stored passcode row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasscodeRecord {
    pub identity: String,
    pub code: String,
    pub issued_at: i64,
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file at `path` and apply the schema.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the file cannot be
    /// opened, or the schema fails to apply.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // Concurrent writers wait instead of failing with "database is locked".
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, used by tests and throwaway runs.
    ///
    /// Every `:memory:` connection is its own database, so the pool is pinned to a
    /// single connection that never expires.
    ///
    /// # Errors
    /// Returns an error if the connection or schema setup fails.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&pool)
            .instrument(query_span("CREATE", "passgate.sql"))
            .await?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction on the pool.
    ///
    /// # Errors
    /// Returns an error if no connection can be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Acquire a connection and ping it.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let acquire_span = info_span!("db.acquire", db.system = "sqlite", db.operation = "ACQUIRE");
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;

        let ping_span = info_span!("db.ping", db.system = "sqlite", db.operation = "PING");
        conn.ping().instrument(ping_span).await
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = operation,
        db.statement = statement
    )
}

/// Drop request-log rows for `identity` older than `cutoff`.
pub(super) async fn delete_identity_requests_before(
    conn: &mut SqliteConnection,
    identity: &str,
    cutoff: i64,
) -> Result<u64, sqlx::Error> {
    let query = "DELETE FROM request_log WHERE identity = ?1 AND at < ?2";
    let result = sqlx::query(query)
        .bind(identity)
        .bind(cutoff)
        .execute(&mut *conn)
        .instrument(query_span("DELETE", query))
        .await?;

    Ok(result.rows_affected())
}

/// Drop request-log rows of every identity older than `cutoff`.
pub(super) async fn delete_requests_before(
    conn: &mut SqliteConnection,
    cutoff: i64,
) -> Result<u64, sqlx::Error> {
    let query = "DELETE FROM request_log WHERE at < ?1";
    let result = sqlx::query(query)
        .bind(cutoff)
        .execute(&mut *conn)
        .instrument(query_span("DELETE", query))
        .await?;

    Ok(result.rows_affected())
}

pub(super) async fn count_requests(
    conn: &mut SqliteConnection,
    identity: &str,
) -> Result<i64, sqlx::Error> {
    let query = "SELECT COUNT(*) FROM request_log WHERE identity = ?1";
    sqlx::query_scalar::<_, i64>(query)
        .bind(identity)
        .fetch_one(&mut *conn)
        .instrument(query_span("SELECT", query))
        .await
}

pub(super) async fn insert_request(
    conn: &mut SqliteConnection,
    identity: &str,
    at: i64,
) -> Result<(), sqlx::Error> {
    let query = "INSERT INTO request_log (identity, at) VALUES (?1, ?2)";
    sqlx::query(query)
        .bind(identity)
        .bind(at)
        .execute(&mut *conn)
        .instrument(query_span("INSERT", query))
        .await?;

    Ok(())
}

pub(super) async fn delete_passcode(
    conn: &mut SqliteConnection,
    identity: &str,
) -> Result<u64, sqlx::Error> {
    let query = "DELETE FROM passcodes WHERE identity = ?1";
    let result = sqlx::query(query)
        .bind(identity)
        .execute(&mut *conn)
        .instrument(query_span("DELETE", query))
        .await?;

    Ok(result.rows_affected())
}

pub(super) async fn insert_passcode(
    conn: &mut SqliteConnection,
    identity: &str,
    code: &str,
    issued_at: i64,
) -> Result<(), sqlx::Error> {
    let query = "INSERT INTO passcodes (identity, code, issued_at) VALUES (?1, ?2, ?3)";
    sqlx::query(query)
        .bind(identity)
        .bind(code)
        .bind(issued_at)
        .execute(&mut *conn)
        .instrument(query_span("INSERT", query))
        .await?;

    Ok(())
}

/// Look up the passcode row matching both `identity` and `code` exactly.
pub(super) async fn find_passcode(
    conn: &mut SqliteConnection,
    identity: &str,
    code: &str,
) -> Result<Option<PasscodeRecord>, sqlx::Error> {
    let query = "SELECT identity, code, issued_at FROM passcodes WHERE identity = ?1 AND code = ?2";
    let row = sqlx::query(query)
        .bind(identity)
        .bind(code)
        .fetch_optional(&mut *conn)
        .instrument(query_span("SELECT", query))
        .await?;

    row.map(|row| record_from_row(&row)).transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<PasscodeRecord, sqlx::Error> {
    Ok(PasscodeRecord {
        identity: row.try_get("identity")?,
        code: row.try_get("code")?,
        issued_at: row.try_get("issued_at")?,
    })
}

#[cfg(test)]
pub(super) async fn passcodes_for(
    conn: &mut SqliteConnection,
    identity: &str,
) -> Result<Vec<PasscodeRecord>, sqlx::Error> {
    let query = "SELECT identity, code, issued_at FROM passcodes WHERE identity = ?1";
    let rows = sqlx::query(query)
        .bind(identity)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(record_from_row).collect()
}
