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

//! Atomic claiming and lease reclaim.
//!
//! Claiming is the safety-critical operation: under concurrent workers,
//! each eligible Pending record must be handed to exactly one worker. Both
//! backends re-check `status = 'Pending'` inside the claiming write itself,
//! so a row grabbed by a faster worker between candidate selection and
//! update simply drops out of the result.
//!
//! PostgreSQL does it in one statement with `FOR UPDATE SKIP LOCKED`;
//! SQLite uses an immediate transaction, which takes the single writer
//! lock up front.

use std::time::Duration;

use diesel::prelude::*;

use super::SourceRecordDAL;
use crate::database::universal_types::UniversalTimestamp;
use crate::dispatch_backend;
use crate::error::StorageError;
use crate::models::source_record::SourceRecord;

#[cfg(feature = "postgres")]
const PG_CLAIM_SQL: &str = r#"
    UPDATE source_records
    SET status = 'Processing',
        attempts = attempts + 1,
        lease_owner = $1,
        lease_expires_at = $2,
        updated_at = $3
    WHERE id IN (
        SELECT id FROM source_records
        WHERE status = 'Pending' AND next_attempt_at <= $3
        ORDER BY next_attempt_at ASC
        LIMIT $4
        FOR UPDATE SKIP LOCKED
    )
    AND status = 'Pending'
    RETURNING *
"#;

#[cfg(feature = "postgres")]
const PG_RECLAIM_SQL: &str = r#"
    UPDATE source_records
    SET status = 'Pending',
        lease_owner = NULL,
        lease_expires_at = NULL,
        next_attempt_at = $1,
        updated_at = $1
    WHERE id IN (
        SELECT id FROM source_records
        WHERE status = 'Processing'
          AND lease_expires_at IS NOT NULL
          AND lease_expires_at <= $1
        FOR UPDATE SKIP LOCKED
    )
    AND status = 'Processing'
    RETURNING *
"#;

impl<'a> SourceRecordDAL<'a> {
    /// Atomically claims up to `batch_size` eligible Pending records for
    /// `worker_id`.
    ///
    /// Each claimed record comes back already in Processing with the
    /// attempts counter incremented and a lease expiring `lease_duration`
    /// from now. A record is eligible when its `next_attempt_at` has
    /// passed; records scheduled for a future retry are skipped.
    pub async fn claim(
        &self,
        worker_id: &str,
        batch_size: i64,
        lease_duration: Duration,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        let now = UniversalTimestamp::now();
        let lease_expires = now.plus(lease_duration);

        dispatch_backend!(
            self.dal.backend(),
            {
                self.claim_postgres(worker_id.to_string(), batch_size, now, lease_expires)
                    .await
            },
            {
                self.claim_sqlite(worker_id.to_string(), batch_size, now, lease_expires)
                    .await
            }
        )
    }

    #[cfg(feature = "postgres")]
    async fn claim_postgres(
        &self,
        worker_id: String,
        batch_size: i64,
        now: UniversalTimestamp,
        lease_expires: UniversalTimestamp,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        use crate::dal::postgres_models::PgSourceRecord;
        use diesel::sql_types::{BigInt, Text, Timestamp};

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let claimed: Vec<PgSourceRecord> = conn
            .interact(move |conn| {
                diesel::sql_query(PG_CLAIM_SQL)
                    .bind::<Text, _>(worker_id)
                    .bind::<Timestamp, _>(lease_expires.to_naive())
                    .bind::<Timestamp, _>(now.to_naive())
                    .bind::<BigInt, _>(batch_size)
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        claimed.into_iter().map(TryInto::try_into).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn claim_sqlite(
        &self,
        worker_id: String,
        batch_size: i64,
        now: UniversalTimestamp,
        lease_expires: UniversalTimestamp,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        use crate::dal::sqlite_models::SqliteSourceRecord;
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now_str = now.to_rfc3339();
        let lease_str = lease_expires.to_rfc3339();

        let claimed: Vec<SqliteSourceRecord> = conn
            .interact(move |conn| {
                conn.immediate_transaction(|conn| {
                    let candidate_ids: Vec<Vec<u8>> = source_records::table
                        .filter(source_records::status.eq("Pending"))
                        .filter(source_records::next_attempt_at.le(&now_str))
                        .order(source_records::next_attempt_at.asc())
                        .limit(batch_size)
                        .select(source_records::id)
                        .load(conn)?;

                    let mut rows = Vec::with_capacity(candidate_ids.len());
                    for id in candidate_ids {
                        // Status recheck keeps this safe even if the
                        // immediate lock were ever relaxed.
                        let updated = diesel::update(
                            source_records::table
                                .filter(source_records::id.eq(&id))
                                .filter(source_records::status.eq("Pending")),
                        )
                        .set((
                            source_records::status.eq("Processing"),
                            source_records::attempts.eq(source_records::attempts + 1),
                            source_records::lease_owner.eq(&worker_id),
                            source_records::lease_expires_at.eq(&lease_str),
                            source_records::updated_at.eq(&now_str),
                        ))
                        .execute(conn)?;

                        if updated == 1 {
                            rows.push(source_records::table.find(&id).first(conn)?);
                        }
                    }
                    Ok::<_, diesel::result::Error>(rows)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        claimed.into_iter().map(TryInto::try_into).collect()
    }

    /// Returns every Processing record whose lease has expired to Pending.
    ///
    /// The reaper's half of crash recovery: lease fields are cleared and
    /// `next_attempt_at` is set to now, so the record is immediately
    /// claimable again. The attempts counter is NOT touched; a worker
    /// crash is not the record's fault, and charging it an attempt would
    /// let repeated crashes exhaust the retry budget.
    pub async fn reclaim_expired(&self) -> Result<Vec<SourceRecord>, StorageError> {
        let now = UniversalTimestamp::now();

        dispatch_backend!(
            self.dal.backend(),
            { self.reclaim_expired_postgres(now).await },
            { self.reclaim_expired_sqlite(now).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn reclaim_expired_postgres(
        &self,
        now: UniversalTimestamp,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        use crate::dal::postgres_models::PgSourceRecord;
        use diesel::sql_types::Timestamp;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let reclaimed: Vec<PgSourceRecord> = conn
            .interact(move |conn| {
                diesel::sql_query(PG_RECLAIM_SQL)
                    .bind::<Timestamp, _>(now.to_naive())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        reclaimed.into_iter().map(TryInto::try_into).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn reclaim_expired_sqlite(
        &self,
        now: UniversalTimestamp,
    ) -> Result<Vec<SourceRecord>, StorageError> {
        use crate::dal::sqlite_models::SqliteSourceRecord;
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now_str = now.to_rfc3339();

        let reclaimed: Vec<SqliteSourceRecord> = conn
            .interact(move |conn| {
                conn.immediate_transaction(|conn| {
                    let expired_ids: Vec<Vec<u8>> = source_records::table
                        .filter(source_records::status.eq("Processing"))
                        .filter(source_records::lease_expires_at.is_not_null())
                        .filter(source_records::lease_expires_at.le(&now_str))
                        .select(source_records::id)
                        .load(conn)?;

                    let mut rows = Vec::with_capacity(expired_ids.len());
                    for id in expired_ids {
                        let updated = diesel::update(
                            source_records::table
                                .filter(source_records::id.eq(&id))
                                .filter(source_records::status.eq("Processing")),
                        )
                        .set((
                            source_records::status.eq("Pending"),
                            source_records::lease_owner.eq(None::<String>),
                            source_records::lease_expires_at.eq(None::<String>),
                            source_records::next_attempt_at.eq(&now_str),
                            source_records::updated_at.eq(&now_str),
                        ))
                        .execute(conn)?;

                        if updated == 1 {
                            rows.push(source_records::table.find(&id).first(conn)?);
                        }
                    }
                    Ok::<_, diesel::result::Error>(rows)
                })
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        reclaimed.into_iter().map(TryInto::try_into).collect()
    }
}
