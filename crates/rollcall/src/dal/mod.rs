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

//! Data Access Layer with runtime backend selection.
//!
//! Every DAL operation dispatches to a backend-specific implementation
//! based on the connection type detected at pool creation. Domain code only
//! ever sees the universal model types; the PostgreSQL/SQLite row structs
//! and their conversions live in `postgres_models` / `sqlite_models`.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollcall::dal::DAL;
//! use rollcall::database::Database;
//!
//! let db = Database::new("postgres://localhost/rollcall", 10);
//! let dal = DAL::new(db);
//!
//! let pending = dal.source_record().list_by_status(RecordStatus::Pending).await?;
//! ```

use crate::database::{AnyPool, BackendType, Database};

#[cfg(feature = "postgres")]
pub mod postgres_models;

#[cfg(feature = "sqlite")]
pub mod sqlite_models;

pub mod delivery;
pub mod source_record;
pub mod subscription;

pub use delivery::DeliveryDAL;
pub use source_record::SourceRecordDAL;
pub use subscription::SubscriptionDAL;

/// Helper macro for dispatching operations based on backend type.
///
/// Keeps the per-operation dispatch boilerplate down to one expression.
/// Arms for disabled backends are compiled out, so single-feature builds
/// stay exhaustive.
///
/// # Example
///
/// ```rust,ignore
/// dispatch_backend!(self.dal.backend(), {
///     self.create_postgres(record).await
/// }, {
///     self.create_sqlite(record).await
/// })
/// ```
#[macro_export]
macro_rules! dispatch_backend {
    ($backend:expr, $pg_block:block, $sqlite_block:block) => {
        match $backend {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => $pg_block,
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => $sqlite_block,
        }
    };
}

/// The Data Access Layer struct.
///
/// Provides access to all queue storage operations through a single
/// interface that works with both PostgreSQL and SQLite backends.
///
/// # Thread Safety
///
/// `DAL` is `Clone` and can be safely shared between workers. Each clone
/// references the same underlying connection pool.
#[derive(Clone, Debug)]
pub struct DAL {
    /// The database instance with connection pool
    pub database: Database,
}

impl DAL {
    /// Creates a new DAL instance.
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    /// Returns the backend type for this DAL instance.
    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    /// Returns a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Returns the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.database.pool()
    }

    /// Returns a source record DAL for job queue operations.
    pub fn source_record(&self) -> SourceRecordDAL {
        SourceRecordDAL::new(self)
    }

    /// Returns a subscription DAL for match rule operations.
    pub fn subscription(&self) -> SubscriptionDAL {
        SubscriptionDAL::new(self)
    }

    /// Returns a delivery DAL for ledger operations.
    pub fn delivery(&self) -> DeliveryDAL {
        DeliveryDAL::new(self)
    }
}
