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

//! Source record DAL: the job queue operations.
//!
//! Split across three files by concern:
//! - this file: insert and read operations
//! - `claiming`: atomic claim and lease reclaim
//! - `state`: guarded state transitions (done/retry/failed/requeue)

mod claiming;
mod state;

use std::collections::HashMap;

use diesel::prelude::*;

use super::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::dispatch_backend;
use crate::error::StorageError;
use crate::models::source_record::{NewSourceRecord, RecordStatus, SourceRecord};

/// Data access layer for source record operations.
#[derive(Clone)]
pub struct SourceRecordDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SourceRecordDAL<'a> {
    /// Creates a new SourceRecordDAL instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a new source record.
    ///
    /// Records always enter as Pending with zero attempts; a missing
    /// `next_attempt_at` means immediately eligible.
    pub async fn create(&self, new_record: NewSourceRecord) -> Result<SourceRecord, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.create_postgres(new_record).await },
            { self.create_sqlite(new_record).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn create_postgres(
        &self,
        new_record: NewSourceRecord,
    ) -> Result<SourceRecord, StorageError> {
        use crate::dal::postgres_models::{NewPgSourceRecord, PgSourceRecord};
        use crate::database::schema::postgres::source_records;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now = UniversalTimestamp::now();
        let pg_new = NewPgSourceRecord {
            id: UniversalUuid::new_v4().0,
            kind: new_record.kind.as_str().to_string(),
            payload: new_record.payload,
            status: RecordStatus::Pending.as_str().to_string(),
            attempts: 0,
            next_attempt_at: new_record.next_attempt_at.unwrap_or(now).to_naive(),
            created_at: now.to_naive(),
            updated_at: now.to_naive(),
        };

        let pg_record: PgSourceRecord = conn
            .interact(move |conn| {
                diesel::insert_into(source_records::table)
                    .values(&pg_new)
                    .get_result(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_record.try_into()
    }

    #[cfg(feature = "sqlite")]
    async fn create_sqlite(
        &self,
        new_record: NewSourceRecord,
    ) -> Result<SourceRecord, StorageError> {
        use crate::dal::sqlite_models::{uuid_to_blob, NewSqliteSourceRecord, SqliteSourceRecord};
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let id = UniversalUuid::new_v4();
        let now = UniversalTimestamp::now();
        let id_blob = uuid_to_blob(&id.0);

        let sqlite_new = NewSqliteSourceRecord {
            id: id_blob.clone(),
            kind: new_record.kind.as_str().to_string(),
            payload: new_record.payload,
            status: RecordStatus::Pending.as_str().to_string(),
            attempts: 0,
            next_attempt_at: new_record.next_attempt_at.unwrap_or(now).to_rfc3339(),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };

        conn.interact(move |conn| {
            diesel::insert_into(source_records::table)
                .values(&sqlite_new)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        let sqlite_record: SqliteSourceRecord = conn
            .interact(move |conn| source_records::table.find(id_blob).first(conn))
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_record.try_into()
    }

    /// Retrieves a source record by its unique identifier.
    pub async fn get_by_id(&self, id: UniversalUuid) -> Result<SourceRecord, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.get_by_id_postgres(id).await },
            { self.get_by_id_sqlite(id).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn get_by_id_postgres(&self, id: UniversalUuid) -> Result<SourceRecord, StorageError> {
        use crate::dal::postgres_models::PgSourceRecord;
        use crate::database::schema::postgres::source_records;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let uuid = id.0;
        let pg_record: Option<PgSourceRecord> = conn
            .interact(move |conn| source_records::table.find(uuid).first(conn).optional())
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_record
            .ok_or(StorageError::NotFound(id))?
            .try_into()
    }

    #[cfg(feature = "sqlite")]
    async fn get_by_id_sqlite(&self, id: UniversalUuid) -> Result<SourceRecord, StorageError> {
        use crate::dal::sqlite_models::{uuid_to_blob, SqliteSourceRecord};
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let id_blob = uuid_to_blob(&id.0);
        let sqlite_record: Option<SqliteSourceRecord> = conn
            .interact(move |conn| source_records::table.find(id_blob).first(conn).optional())
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_record
            .ok_or(StorageError::NotFound(id))?
            .try_into()
    }

    /// Lists all records in the given status, oldest eligibility first.
    pub async fn list_by_status(
        &self,
        status: RecordStatus,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.list_by_status_postgres(status).await },
            { self.list_by_status_sqlite(status).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn list_by_status_postgres(
        &self,
        status: RecordStatus,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        use crate::dal::postgres_models::PgSourceRecord;
        use crate::database::schema::postgres::source_records;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let status_str = status.as_str().to_string();
        let pg_records: Vec<PgSourceRecord> = conn
            .interact(move |conn| {
                source_records::table
                    .filter(source_records::status.eq(status_str))
                    .order(source_records::next_attempt_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_records.into_iter().map(TryInto::try_into).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn list_by_status_sqlite(
        &self,
        status: RecordStatus,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        use crate::dal::sqlite_models::SqliteSourceRecord;
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let status_str = status.as_str().to_string();
        let sqlite_records: Vec<SqliteSourceRecord> = conn
            .interact(move |conn| {
                source_records::table
                    .filter(source_records::status.eq(status_str))
                    .order(source_records::next_attempt_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_records.into_iter().map(TryInto::try_into).collect()
    }

    /// Returns the number of records in each status.
    ///
    /// Statuses with no rows are absent from the map.
    pub async fn status_counts(&self) -> Result<HashMap<RecordStatus, i64>, StorageError> {
        let raw = dispatch_backend!(
            self.dal.backend(),
            { self.status_counts_postgres().await },
            { self.status_counts_sqlite().await }
        )?;

        let mut counts = HashMap::new();
        for (status_str, count) in raw {
            let status = RecordStatus::parse(&status_str).ok_or_else(|| {
                StorageError::Corrupt(format!("unknown record status '{}'", status_str))
            })?;
            counts.insert(status, count);
        }
        Ok(counts)
    }

    #[cfg(feature = "postgres")]
    async fn status_counts_postgres(&self) -> Result<Vec<(String, i64)>, StorageError> {
        use crate::database::schema::postgres::source_records;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let rows = conn
            .interact(|conn| {
                source_records::table
                    .group_by(source_records::status)
                    .select((source_records::status, diesel::dsl::count_star()))
                    .load::<(String, i64)>(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(rows)
    }

    #[cfg(feature = "sqlite")]
    async fn status_counts_sqlite(&self) -> Result<Vec<(String, i64)>, StorageError> {
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let rows = conn
            .interact(|conn| {
                source_records::table
                    .group_by(source_records::status)
                    .select((source_records::status, diesel::dsl::count_star()))
                    .load::<(String, i64)>(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(rows)
    }
}
