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

//! Delivery ledger DAL.
//!
//! `ensure_queued` is the idempotency primitive: an insert with
//! ON CONFLICT DO NOTHING on the (subscription_id, source_record_id)
//! unique pair, followed by a fetch of whichever row now exists. Running
//! it any number of times, from any number of workers, yields the same
//! single ledger row, which is what makes record retries safe against
//! duplicate notifications.

use diesel::prelude::*;

use super::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::dispatch_backend;
use crate::error::StorageError;
use crate::models::delivery::{DeliveryRecord, DeliveryStatus, NewDelivery};

/// Data access layer for delivery ledger operations.
#[derive(Clone)]
pub struct DeliveryDAL<'a> {
    dal: &'a DAL,
}

impl<'a> DeliveryDAL<'a> {
    /// Creates a new DeliveryDAL instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Ensures exactly one ledger row exists for the given pair and
    /// returns it.
    ///
    /// If the pair already has a row (from a previous attempt of the same
    /// record, or a concurrent worker), that row is returned untouched,
    /// whatever its status.
    pub async fn ensure_queued(
        &self,
        new_delivery: NewDelivery,
    ) -> Result<DeliveryRecord, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.ensure_queued_postgres(new_delivery).await },
            { self.ensure_queued_sqlite(new_delivery).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn ensure_queued_postgres(
        &self,
        new_delivery: NewDelivery,
    ) -> Result<DeliveryRecord, StorageError> {
        use crate::dal::postgres_models::{NewPgDelivery, PgDelivery};
        use crate::database::schema::postgres::deliveries;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now = UniversalTimestamp::now();
        let subscription_id = new_delivery.subscription_id.0;
        let source_record_id = new_delivery.source_record_id.0;

        let pg_new = NewPgDelivery {
            id: UniversalUuid::new_v4().0,
            subscription_id,
            source_record_id,
            status: DeliveryStatus::Queued.as_str().to_string(),
            attempts: 0,
            created_at: now.to_naive(),
            updated_at: now.to_naive(),
        };

        let pg_delivery: PgDelivery = conn
            .interact(move |conn| {
                diesel::insert_into(deliveries::table)
                    .values(&pg_new)
                    .on_conflict((deliveries::subscription_id, deliveries::source_record_id))
                    .do_nothing()
                    .execute(conn)?;

                deliveries::table
                    .filter(deliveries::subscription_id.eq(subscription_id))
                    .filter(deliveries::source_record_id.eq(source_record_id))
                    .first(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_delivery.try_into()
    }

    #[cfg(feature = "sqlite")]
    async fn ensure_queued_sqlite(
        &self,
        new_delivery: NewDelivery,
    ) -> Result<DeliveryRecord, StorageError> {
        use crate::dal::sqlite_models::{uuid_to_blob, NewSqliteDelivery, SqliteDelivery};
        use crate::database::schema::sqlite::deliveries;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now = UniversalTimestamp::now();
        let subscription_blob = uuid_to_blob(&new_delivery.subscription_id.0);
        let record_blob = uuid_to_blob(&new_delivery.source_record_id.0);

        let sqlite_new = NewSqliteDelivery {
            id: uuid_to_blob(&UniversalUuid::new_v4().0),
            subscription_id: subscription_blob.clone(),
            source_record_id: record_blob.clone(),
            status: DeliveryStatus::Queued.as_str().to_string(),
            attempts: 0,
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };

        let sqlite_delivery: SqliteDelivery = conn
            .interact(move |conn| {
                diesel::insert_into(deliveries::table)
                    .values(&sqlite_new)
                    .on_conflict((deliveries::subscription_id, deliveries::source_record_id))
                    .do_nothing()
                    .execute(conn)?;

                deliveries::table
                    .filter(deliveries::subscription_id.eq(&subscription_blob))
                    .filter(deliveries::source_record_id.eq(&record_blob))
                    .first(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_delivery.try_into()
    }

    /// Marks a delivery Sent, stamping `sent_at` and charging one attempt.
    pub async fn mark_sent(&self, id: UniversalUuid) -> Result<(), StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.mark_sent_postgres(id).await },
            { self.mark_sent_sqlite(id).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn mark_sent_postgres(&self, id: UniversalUuid) -> Result<(), StorageError> {
        use crate::database::schema::postgres::deliveries;

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
                diesel::update(deliveries::table.find(uuid))
                    .set((
                        deliveries::status.eq("Sent"),
                        deliveries::attempts.eq(deliveries::attempts + 1),
                        deliveries::error.eq(None::<String>),
                        deliveries::sent_at.eq(Some(now.to_naive())),
                        deliveries::updated_at.eq(now.to_naive()),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if updated == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    #[cfg(feature = "sqlite")]
    async fn mark_sent_sqlite(&self, id: UniversalUuid) -> Result<(), StorageError> {
        use crate::dal::sqlite_models::uuid_to_blob;
        use crate::database::schema::sqlite::deliveries;

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
                diesel::update(deliveries::table.find(id_blob))
                    .set((
                        deliveries::status.eq("Sent"),
                        deliveries::attempts.eq(deliveries::attempts + 1),
                        deliveries::error.eq(None::<String>),
                        deliveries::sent_at.eq(Some(now_str.clone())),
                        deliveries::updated_at.eq(&now_str),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if updated == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// Records a failed send attempt: status Failed, the error text, and
    /// the caller-computed attempts value.
    ///
    /// The caller passes `new_attempts` explicitly so a permanently
    /// undeliverable subscriber (invalid address) can be charged its whole
    /// budget at once instead of burning retries that cannot succeed. Only
    /// the lease-holding worker touches a delivery, so the read-then-write
    /// on the counter does not race.
    pub async fn record_failure(
        &self,
        id: UniversalUuid,
        error: &str,
        new_attempts: i32,
    ) -> Result<(), StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            {
                self.record_failure_postgres(id, error.to_string(), new_attempts)
                    .await
            },
            {
                self.record_failure_sqlite(id, error.to_string(), new_attempts)
                    .await
            }
        )
    }

    #[cfg(feature = "postgres")]
    async fn record_failure_postgres(
        &self,
        id: UniversalUuid,
        error: String,
        new_attempts: i32,
    ) -> Result<(), StorageError> {
        use crate::database::schema::postgres::deliveries;

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
                diesel::update(deliveries::table.find(uuid))
                    .set((
                        deliveries::status.eq("Failed"),
                        deliveries::attempts.eq(new_attempts),
                        deliveries::error.eq(Some(error)),
                        deliveries::updated_at.eq(now.to_naive()),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if updated == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    #[cfg(feature = "sqlite")]
    async fn record_failure_sqlite(
        &self,
        id: UniversalUuid,
        error: String,
        new_attempts: i32,
    ) -> Result<(), StorageError> {
        use crate::dal::sqlite_models::uuid_to_blob;
        use crate::database::schema::sqlite::deliveries;

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
                diesel::update(deliveries::table.find(id_blob))
                    .set((
                        deliveries::status.eq("Failed"),
                        deliveries::attempts.eq(new_attempts),
                        deliveries::error.eq(Some(error)),
                        deliveries::updated_at.eq(&now_str),
                    ))
                    .execute(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        if updated == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    /// Lists every ledger row owed for one source record.
    pub async fn list_for_record(
        &self,
        source_record_id: UniversalUuid,
    ) -> Result<Vec<DeliveryRecord>, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.list_for_record_postgres(source_record_id).await },
            { self.list_for_record_sqlite(source_record_id).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn list_for_record_postgres(
        &self,
        source_record_id: UniversalUuid,
    ) -> Result<Vec<DeliveryRecord>, StorageError> {
        use crate::dal::postgres_models::PgDelivery;
        use crate::database::schema::postgres::deliveries;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let uuid = source_record_id.0;
        let pg_deliveries: Vec<PgDelivery> = conn
            .interact(move |conn| {
                deliveries::table
                    .filter(deliveries::source_record_id.eq(uuid))
                    .order(deliveries::created_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_deliveries.into_iter().map(TryInto::try_into).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn list_for_record_sqlite(
        &self,
        source_record_id: UniversalUuid,
    ) -> Result<Vec<DeliveryRecord>, StorageError> {
        use crate::dal::sqlite_models::{uuid_to_blob, SqliteDelivery};
        use crate::database::schema::sqlite::deliveries;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let record_blob = uuid_to_blob(&source_record_id.0);
        let sqlite_deliveries: Vec<SqliteDelivery> = conn
            .interact(move |conn| {
                deliveries::table
                    .filter(deliveries::source_record_id.eq(record_blob))
                    .order(deliveries::created_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_deliveries
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }
}
