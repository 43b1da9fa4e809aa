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

//! Guarded state transitions for source records.
//!
//! Every worker-side transition is a conditional update filtered on
//! `status = 'Processing' AND lease_owner = <worker>`. When zero rows
//! match, the worker's lease was lost (expired and reclaimed, or the
//! record moved on) and the call returns `InvalidTransition` instead of
//! silently overwriting another worker's state. The operator-side
//! `requeue` is guarded on the terminal statuses instead.

use diesel::prelude::*;

use super::SourceRecordDAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::dispatch_backend;
use crate::error::StorageError;
use crate::models::source_record::RecordStatus;

/// One worker-side completion transition, shared by done/retry/failed.
#[derive(Debug, Clone)]
enum Completion {
    Done,
    Retry {
        error: String,
        next_attempt_at: UniversalTimestamp,
    },
    Failed {
        error: String,
    },
}

impl<'a> SourceRecordDAL<'a> {
    /// Marks a claimed record Done.
    ///
    /// Clears the lease and stamps `processed_at`. Fails with
    /// `InvalidTransition` if `worker_id` no longer holds the lease.
    pub async fn mark_done(
        &self,
        id: UniversalUuid,
        worker_id: &str,
    ) -> Result<(), StorageError> {
        self.complete(id, worker_id, Completion::Done).await
    }

    /// Returns a claimed record to Pending for a later retry.
    ///
    /// Records the error in `last_error` and defers eligibility until
    /// `next_attempt_at`. Fails with `InvalidTransition` if `worker_id`
    /// no longer holds the lease.
    pub async fn schedule_retry(
        &self,
        id: UniversalUuid,
        worker_id: &str,
        error: &str,
        next_attempt_at: UniversalTimestamp,
    ) -> Result<(), StorageError> {
        self.complete(
            id,
            worker_id,
            Completion::Retry {
                error: error.to_string(),
                next_attempt_at,
            },
        )
        .await
    }

    /// Marks a claimed record terminally Failed.
    ///
    /// Used for permanent errors and for exhausted retry budgets. Fails
    /// with `InvalidTransition` if `worker_id` no longer holds the lease.
    pub async fn mark_failed(
        &self,
        id: UniversalUuid,
        worker_id: &str,
        error: &str,
    ) -> Result<(), StorageError> {
        self.complete(
            id,
            worker_id,
            Completion::Failed {
                error: error.to_string(),
            },
        )
        .await
    }

    async fn complete(
        &self,
        id: UniversalUuid,
        worker_id: &str,
        completion: Completion,
    ) -> Result<(), StorageError> {
        let updated = dispatch_backend!(
            self.dal.backend(),
            {
                self.complete_postgres(id, worker_id.to_string(), completion)
                    .await?
            },
            {
                self.complete_sqlite(id, worker_id.to_string(), completion)
                    .await?
            }
        );

        if updated == 0 {
            return Err(StorageError::InvalidTransition {
                id,
                reason: "lease no longer held".to_string(),
            });
        }
        Ok(())
    }

    #[cfg(feature = "postgres")]
    async fn complete_postgres(
        &self,
        id: UniversalUuid,
        worker_id: String,
        completion: Completion,
    ) -> Result<usize, StorageError> {
        use crate::database::schema::postgres::source_records;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now = UniversalTimestamp::now();
        let uuid = id.0;

        let updated = conn
            .interact(move |conn| {
                let target = source_records::table
                    .filter(source_records::id.eq(uuid))
                    .filter(source_records::status.eq("Processing"))
                    .filter(source_records::lease_owner.eq(&worker_id));

                match completion {
                    Completion::Done => diesel::update(target)
                        .set((
                            source_records::status.eq("Done"),
                            source_records::lease_owner.eq(None::<String>),
                            source_records::lease_expires_at.eq(None::<chrono::NaiveDateTime>),
                            source_records::processed_at.eq(Some(now.to_naive())),
                            source_records::updated_at.eq(now.to_naive()),
                        ))
                        .execute(conn),
                    Completion::Retry {
                        error,
                        next_attempt_at,
                    } => diesel::update(target)
                        .set((
                            source_records::status.eq("Pending"),
                            source_records::lease_owner.eq(None::<String>),
                            source_records::lease_expires_at.eq(None::<chrono::NaiveDateTime>),
                            source_records::last_error.eq(Some(error)),
                            source_records::next_attempt_at.eq(next_attempt_at.to_naive()),
                            source_records::updated_at.eq(now.to_naive()),
                        ))
                        .execute(conn),
                    Completion::Failed { error } => diesel::update(target)
                        .set((
                            source_records::status.eq("Failed"),
                            source_records::lease_owner.eq(None::<String>),
                            source_records::lease_expires_at.eq(None::<chrono::NaiveDateTime>),
                            source_records::last_error.eq(Some(error)),
                            source_records::updated_at.eq(now.to_naive()),
                        ))
                        .execute(conn),
                }
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }

    #[cfg(feature = "sqlite")]
    async fn complete_sqlite(
        &self,
        id: UniversalUuid,
        worker_id: String,
        completion: Completion,
    ) -> Result<usize, StorageError> {
        use crate::dal::sqlite_models::uuid_to_blob;
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now_str = UniversalTimestamp::now().to_rfc3339();
        let id_blob = uuid_to_blob(&id.0);

        let updated = conn
            .interact(move |conn| {
                let target = source_records::table
                    .filter(source_records::id.eq(&id_blob))
                    .filter(source_records::status.eq("Processing"))
                    .filter(source_records::lease_owner.eq(&worker_id));

                match completion {
                    Completion::Done => diesel::update(target)
                        .set((
                            source_records::status.eq("Done"),
                            source_records::lease_owner.eq(None::<String>),
                            source_records::lease_expires_at.eq(None::<String>),
                            source_records::processed_at.eq(Some(now_str.clone())),
                            source_records::updated_at.eq(&now_str),
                        ))
                        .execute(conn),
                    Completion::Retry {
                        error,
                        next_attempt_at,
                    } => diesel::update(target)
                        .set((
                            source_records::status.eq("Pending"),
                            source_records::lease_owner.eq(None::<String>),
                            source_records::lease_expires_at.eq(None::<String>),
                            source_records::last_error.eq(Some(error)),
                            source_records::next_attempt_at.eq(next_attempt_at.to_rfc3339()),
                            source_records::updated_at.eq(&now_str),
                        ))
                        .execute(conn),
                    Completion::Failed { error } => diesel::update(target)
                        .set((
                            source_records::status.eq("Failed"),
                            source_records::lease_owner.eq(None::<String>),
                            source_records::lease_expires_at.eq(None::<String>),
                            source_records::last_error.eq(Some(error)),
                            source_records::updated_at.eq(&now_str),
                        ))
                        .execute(conn),
                }
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }

    /// Operator requeue: returns a terminal (Done or Failed) record to
    /// Pending with a fresh retry budget.
    ///
    /// Resets `attempts` to zero and clears `last_error` and
    /// `processed_at`; the record is immediately eligible. A record that
    /// is Pending or Processing is rejected with `InvalidTransition`, so
    /// an operator can never yank a job out from under a live worker.
    pub async fn requeue(&self, id: UniversalUuid) -> Result<(), StorageError> {
        let updated = dispatch_backend!(
            self.dal.backend(),
            { self.requeue_postgres(id).await? },
            { self.requeue_sqlite(id).await? }
        );

        if updated == 0 {
            // Distinguish a missing record from a live one.
            let record = self.get_by_id(id).await?;
            return Err(StorageError::InvalidTransition {
                id,
                reason: format!("cannot requeue from {}", record.status),
            });
        }
        Ok(())
    }

    #[cfg(feature = "postgres")]
    async fn requeue_postgres(&self, id: UniversalUuid) -> Result<usize, StorageError> {
        use crate::database::schema::postgres::source_records;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now = UniversalTimestamp::now();
        let uuid = id.0;
        let terminal: Vec<&str> = vec![
            RecordStatus::Done.as_str(),
            RecordStatus::Failed.as_str(),
        ];

        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    source_records::table
                        .filter(source_records::id.eq(uuid))
                        .filter(source_records::status.eq_any(terminal)),
                )
                .set((
                    source_records::status.eq("Pending"),
                    source_records::attempts.eq(0),
                    source_records::last_error.eq(None::<String>),
                    source_records::processed_at.eq(None::<chrono::NaiveDateTime>),
                    source_records::next_attempt_at.eq(now.to_naive()),
                    source_records::updated_at.eq(now.to_naive()),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }

    #[cfg(feature = "sqlite")]
    async fn requeue_sqlite(&self, id: UniversalUuid) -> Result<usize, StorageError> {
        use crate::dal::sqlite_models::uuid_to_blob;
        use crate::database::schema::sqlite::source_records;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now_str = UniversalTimestamp::now().to_rfc3339();
        let id_blob = uuid_to_blob(&id.0);
        let terminal: Vec<&str> = vec![
            RecordStatus::Done.as_str(),
            RecordStatus::Failed.as_str(),
        ];

        let updated = conn
            .interact(move |conn| {
                diesel::update(
                    source_records::table
                        .filter(source_records::id.eq(&id_blob))
                        .filter(source_records::status.eq_any(terminal)),
                )
                .set((
                    source_records::status.eq("Pending"),
                    source_records::attempts.eq(0),
                    source_records::last_error.eq(None::<String>),
                    source_records::processed_at.eq(None::<String>),
                    source_records::next_attempt_at.eq(&now_str),
                    source_records::updated_at.eq(&now_str),
                ))
                .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        Ok(updated)
    }
}
