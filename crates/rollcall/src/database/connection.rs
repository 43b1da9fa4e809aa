/*
 *  Copyright 2025-2026 Rollcall Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Database connection management supporting both PostgreSQL and SQLite.
//!
//! This module provides an async connection pool implementation using
//! `deadpool-diesel`. The backend is detected at runtime from the connection
//! URL, so the same binary can run against a shared PostgreSQL instance or a
//! local SQLite file.
//!
//! # Features
//!
//! - Connection pooling with configurable pool size
//! - URL-based backend detection
//! - File path or `:memory:` configuration for SQLite
//! - Embedded migrations per backend

use tracing::info;

#[cfg(feature = "postgres")]
use deadpool_diesel::postgres::{Manager as PgManager, Pool as PgPool, Runtime as PgRuntime};

#[cfg(feature = "sqlite")]
use deadpool_diesel::sqlite::{
    Manager as SqliteManager, Pool as SqlitePool, Runtime as SqliteRuntime,
};

/// Initialize OpenSSL at program startup, before main() runs.
///
/// This fixes a known issue where libpq internally initializes OpenSSL with an
/// unsafe atexit handler that can race with connection pool worker threads
/// during cleanup, causing SIGSEGV on Linux.
///
/// See: https://github.com/diesel-rs/diesel/issues/3441
///
/// IMPORTANT: The openssl crate must NOT use the "vendored" feature, as that
/// would create a version mismatch with the system OpenSSL that libpq uses.
#[cfg(feature = "postgres")]
#[ctor::ctor]
fn init_openssl_early() {
    openssl::init();
    // Note: Cannot use tracing here as it may not be initialized yet
}

/// Represents the database backend type, detected at runtime from the
/// connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// PostgreSQL backend
    #[cfg(feature = "postgres")]
    Postgres,
    /// SQLite backend
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl BackendType {
    /// Detect the backend type from a connection URL.
    ///
    /// # Panics
    /// Panics if the URL scheme doesn't match any enabled backend.
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            #[cfg(feature = "postgres")]
            return BackendType::Postgres;
            #[cfg(not(feature = "postgres"))]
            panic!(
                "URL '{}' requires the postgres feature, which is not enabled",
                url
            );
        }

        // SQLite URLs can be:
        // - sqlite:// prefix
        // - file: URI format (e.g., file:test?mode=memory&cache=shared)
        // - file paths (relative or absolute)
        // - :memory: for in-memory databases
        if url.starts_with("sqlite://")
            || url.starts_with("file:")
            || url.starts_with("/")
            || url.starts_with("./")
            || url.starts_with("../")
            || url == ":memory:"
            || url.ends_with(".db")
            || url.ends_with(".sqlite")
            || url.ends_with(".sqlite3")
        {
            #[cfg(feature = "sqlite")]
            return BackendType::Sqlite;
            #[cfg(not(feature = "sqlite"))]
            panic!(
                "URL '{}' requires the sqlite feature, which is not enabled",
                url
            );
        }

        panic!(
            "Unable to detect database backend from URL '{}'. \
             Expected postgres://, postgresql://, sqlite://, or a file path.",
            url
        );
    }
}

/// Pool enum that wraps both PostgreSQL and SQLite connection pools.
///
/// This enum enables runtime pool selection based on the detected backend.
#[derive(Clone)]
pub enum AnyPool {
    /// PostgreSQL connection pool
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
    /// SQLite connection pool
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

impl std::fmt::Debug for AnyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(_) => write!(f, "AnyPool::Postgres(...)"),
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(_) => write!(f, "AnyPool::Sqlite(...)"),
        }
    }
}

/// Represents a pool of database connections.
///
/// This struct provides a thread-safe wrapper around a connection pool,
/// allowing multiple parts of the application to share database connections
/// efficiently. Supports runtime backend selection between PostgreSQL and
/// SQLite.
///
/// # Thread Safety
///
/// The `Database` struct is `Clone` and can be safely shared between threads.
/// Each clone references the same underlying connection pool.
#[derive(Clone, Debug)]
pub struct Database {
    /// The connection pool (PostgreSQL or SQLite)
    pool: AnyPool,
    /// The detected backend type
    backend: BackendType,
}

impl Database {
    /// Creates a new database connection pool with automatic backend
    /// detection.
    ///
    /// The backend is detected from the connection string:
    /// - `postgres://` or `postgresql://` -> PostgreSQL
    /// - `sqlite://`, file paths, or `:memory:` -> SQLite
    ///
    /// # Arguments
    ///
    /// * `connection_string` - The database connection URL or path
    /// * `max_size` - Maximum number of connections in the pool (PostgreSQL
    ///   only; SQLite always uses a single connection)
    ///
    /// # Panics
    ///
    /// Panics if the connection pool cannot be created.
    pub fn new(connection_string: &str, max_size: u32) -> Self {
        let backend = BackendType::from_url(connection_string);

        match backend {
            #[cfg(feature = "postgres")]
            BackendType::Postgres => {
                let manager = PgManager::new(connection_string, PgRuntime::Tokio1);
                let pool = PgPool::builder(manager)
                    .max_size(max_size as usize)
                    .build()
                    .expect("Failed to create PostgreSQL connection pool");

                info!("PostgreSQL connection pool initialized (size: {})", max_size);

                Self {
                    pool: AnyPool::Postgres(pool),
                    backend,
                }
            }
            #[cfg(feature = "sqlite")]
            BackendType::Sqlite => {
                let connection_url = Self::build_sqlite_url(connection_string);
                let manager = SqliteManager::new(connection_url, SqliteRuntime::Tokio1);
                // SQLite has limited concurrent write support even with WAL mode.
                // Using a single connection avoids "database is locked" errors.
                let sqlite_pool_size = 1;
                let pool = SqlitePool::builder(manager)
                    .max_size(sqlite_pool_size)
                    .build()
                    .expect("Failed to create SQLite connection pool");

                info!(
                    "SQLite connection pool initialized (size: {})",
                    sqlite_pool_size
                );

                Self {
                    pool: AnyPool::Sqlite(pool),
                    backend,
                }
            }
        }
    }

    /// Returns the detected backend type.
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    /// Builds a SQLite connection URL.
    #[cfg(feature = "sqlite")]
    fn build_sqlite_url(connection_string: &str) -> String {
        // Strip sqlite:// prefix if present
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Runs pending database migrations for the appropriate backend.
    pub async fn run_migrations(&self) -> Result<(), String> {
        use diesel_migrations::MigrationHarness;

        match &self.pool {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(pool) => {
                let conn = pool.get().await.map_err(|e| e.to_string())?;
                conn.interact(|conn| {
                    conn.run_pending_migrations(crate::database::POSTGRES_MIGRATIONS)
                        .map(|_| ())
                        .map_err(|e| format!("Failed to run PostgreSQL migrations: {}", e))
                })
                .await
                .map_err(|e| format!("Failed to run migrations: {}", e))??;
            }
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(pool) => {
                let conn = pool.get().await.map_err(|e| e.to_string())?;
                conn.interact(|conn| {
                    use diesel::prelude::*;

                    // WAL mode allows concurrent reads during writes
                    diesel::sql_query("PRAGMA journal_mode=WAL;")
                        .execute(conn)
                        .map_err(|e| format!("Failed to set WAL mode: {}", e))?;
                    // busy_timeout makes SQLite wait instead of immediately failing on locks
                    diesel::sql_query("PRAGMA busy_timeout=30000;")
                        .execute(conn)
                        .map_err(|e| format!("Failed to set busy_timeout: {}", e))?;

                    conn.run_pending_migrations(crate::database::SQLITE_MIGRATIONS)
                        .map(|_| ())
                        .map_err(|e| format!("Failed to run SQLite migrations: {}", e))
                })
                .await
                .map_err(|e| format!("Failed to run migrations: {}", e))??;
            }
        }
        Ok(())
    }

    /// Gets a PostgreSQL connection.
    ///
    /// # Panics
    /// Panics if this is not a PostgreSQL backend.
    #[cfg(feature = "postgres")]
    pub async fn get_postgres_connection(
        &self,
    ) -> Result<
        deadpool::managed::Object<PgManager>,
        deadpool::managed::PoolError<deadpool_diesel::Error>,
    > {
        let pool = match &self.pool {
            AnyPool::Postgres(pool) => pool,
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(_) => {
                panic!("get_postgres_connection called on SQLite backend");
            }
        };

        pool.get().await
    }

    /// Gets a SQLite connection.
    ///
    /// # Panics
    /// Panics if this is not a SQLite backend.
    #[cfg(feature = "sqlite")]
    pub async fn get_sqlite_connection(
        &self,
    ) -> Result<
        deadpool::managed::Object<SqliteManager>,
        deadpool::managed::PoolError<deadpool_diesel::Error>,
    > {
        let pool = match &self.pool {
            AnyPool::Sqlite(pool) => pool,
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(_) => {
                panic!("get_sqlite_connection called on PostgreSQL backend");
            }
        };

        pool.get().await
    }
}
