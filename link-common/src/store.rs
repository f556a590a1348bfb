use std::time;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

/// Enumeration of errors for operations with the link store.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
/// `AlreadyExists` and `EmptyTable` are expected outcomes rather than failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("link already exists")]
    AlreadyExists,
    #[error("no saved links")]
    EmptyTable,
    #[error("link not found")]
    NotFound,
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError {
        command: String,
        error: sqlx::Error,
    },
    #[error("migration failed with: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A saved URL and the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Link {
    pub id: i64,
    #[sqlx(rename = "link")]
    pub url: String,
    pub username: String,
}

#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Store `url` for `username`, returning the id assigned to it.
    async fn save_link(&self, url: &str, username: &str) -> StoreResult<i64>;

    /// Remove and return one random link owned by `username`.
    async fn random_link(&self, username: &str) -> StoreResult<Link>;

    /// Look up the id of `url`.
    async fn exists(&self, url: &str) -> StoreResult<i64>;
}

/// Connection pool tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: time::Duration,
    pub idle_timeout: time::Duration,
    pub max_lifetime: time::Duration,
    /// Applied as the session `statement_timeout` of every pooled connection.
    pub statement_timeout: time::Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: time::Duration::from_secs(5),
            idle_timeout: time::Duration::from_secs(30 * 60),
            max_lifetime: time::Duration::from_secs(60 * 60),
            statement_timeout: time::Duration::from_secs(5),
        }
    }
}

/// Link storage implemented on top of the PostgreSQL `links` table.
pub struct PgLinkStore {
    pool: PgPool,
}

impl PgLinkStore {
    /// Connect a new pool to the database at `url`.
    pub async fn new(url: &str, config: &PoolConfig) -> StoreResult<Self> {
        let statement_timeout_ms = config.statement_timeout.as_millis();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    // SET does not accept bind parameters.
                    sqlx::query(&format!(
                        "SET statement_timeout = '{statement_timeout_ms}ms'"
                    ))
                    .execute(&mut *conn)
                    .await?;

                    Ok(())
                })
            })
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self { pool })
    }

    /// Build a store with an already connected pool.
    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the migrations embedded at build time.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await
    }
}

#[async_trait]
impl LinkRepository for PgLinkStore {
    async fn save_link(&self, url: &str, username: &str) -> StoreResult<i64> {
        sqlx::query_scalar(
            r#"
INSERT INTO links
    (link, username)
VALUES
    ($1, $2)
RETURNING
    id
            "#,
        )
        .bind(url)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                StoreError::AlreadyExists
            } else {
                StoreError::QueryError {
                    command: "INSERT".to_owned(),
                    error,
                }
            }
        })
    }

    async fn random_link(&self, username: &str) -> StoreResult<Link> {
        // Picking and deleting in one statement, with the picked row locked, means two
        // concurrent callers can never receive the same link.
        let link: Option<Link> = sqlx::query_as(
            r#"
WITH picked AS (
    SELECT
        id
    FROM
        links
    WHERE
        username = $1
    ORDER BY
        RANDOM()
    LIMIT 1
    FOR UPDATE SKIP LOCKED
)
DELETE FROM
    links
USING
    picked
WHERE
    links.id = picked.id
RETURNING
    links.id, links.link, links.username
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::QueryError {
            command: "DELETE".to_owned(),
            error,
        })?;

        link.ok_or(StoreError::EmptyTable)
    }

    async fn exists(&self, url: &str) -> StoreResult<i64> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM links WHERE link = $1 LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StoreError::QueryError {
                command: "SELECT".to_owned(),
                error,
            })?;

        id.ok_or(StoreError::NotFound)
    }
}

/// Determines if a sqlx::Error represents a unique constraint violation.
fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        // Class 23: Integrity Constraint Violation; 23505 = unique_violation
        sqlx::Error::Database(db_error) => db_error
            .code()
            .map(|code| code.as_ref() == "23505")
            .unwrap_or(false),
        _ => false,
    }
}
