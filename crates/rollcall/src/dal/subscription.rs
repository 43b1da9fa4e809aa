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

//! Subscription DAL.
//!
//! The queue only ever reads subscriptions (`list_active` at match time);
//! create and set_active exist for the application's management surface
//! and the test fixtures.

use diesel::prelude::*;

use super::DAL;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::dispatch_backend;
use crate::error::StorageError;
use crate::models::subscription::{Cadence, NewSubscription, Subscription};

/// Data access layer for subscription operations.
#[derive(Clone)]
pub struct SubscriptionDAL<'a> {
    dal: &'a DAL,
}

impl<'a> SubscriptionDAL<'a> {
    /// Creates a new SubscriptionDAL instance.
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Inserts a new subscription. Cadence defaults to immediate; new
    /// subscriptions start active.
    pub async fn create(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<Subscription, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.create_postgres(new_subscription).await },
            { self.create_sqlite(new_subscription).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn create_postgres(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<Subscription, StorageError> {
        use crate::dal::postgres_models::{NewPgSubscription, PgSubscription};
        use crate::database::schema::postgres::subscriptions;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now = UniversalTimestamp::now();
        let pg_new = NewPgSubscription {
            id: UniversalUuid::new_v4().0,
            user_label: new_subscription.user_label,
            bill_id: new_subscription.bill_id,
            chamber: new_subscription.chamber,
            committee: new_subscription.committee,
            subject: new_subscription.subject,
            event_type: new_subscription.event_type,
            channel: new_subscription.channel,
            cadence: new_subscription
                .cadence
                .unwrap_or(Cadence::Immediate)
                .as_str()
                .to_string(),
            active: true,
            created_at: now.to_naive(),
            updated_at: now.to_naive(),
        };

        let pg_subscription: PgSubscription = conn
            .interact(move |conn| {
                diesel::insert_into(subscriptions::table)
                    .values(&pg_new)
                    .get_result(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_subscription.try_into()
    }

    #[cfg(feature = "sqlite")]
    async fn create_sqlite(
        &self,
        new_subscription: NewSubscription,
    ) -> Result<Subscription, StorageError> {
        use crate::dal::sqlite_models::{uuid_to_blob, NewSqliteSubscription, SqliteSubscription};
        use crate::database::schema::sqlite::subscriptions;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let id = UniversalUuid::new_v4();
        let now = UniversalTimestamp::now();
        let id_blob = uuid_to_blob(&id.0);

        let sqlite_new = NewSqliteSubscription {
            id: id_blob.clone(),
            user_label: new_subscription.user_label,
            bill_id: new_subscription.bill_id,
            chamber: new_subscription.chamber,
            committee: new_subscription.committee,
            subject: new_subscription.subject,
            event_type: new_subscription.event_type,
            channel: new_subscription.channel,
            cadence: new_subscription
                .cadence
                .unwrap_or(Cadence::Immediate)
                .as_str()
                .to_string(),
            active: 1,
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
        };

        conn.interact(move |conn| {
            diesel::insert_into(subscriptions::table)
                .values(&sqlite_new)
                .execute(conn)
        })
        .await
        .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        let sqlite_subscription: SqliteSubscription = conn
            .interact(move |conn| subscriptions::table.find(id_blob).first(conn))
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_subscription.try_into()
    }

    /// Retrieves a subscription by its unique identifier.
    pub async fn get_by_id(&self, id: UniversalUuid) -> Result<Subscription, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.get_by_id_postgres(id).await },
            { self.get_by_id_sqlite(id).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn get_by_id_postgres(&self, id: UniversalUuid) -> Result<Subscription, StorageError> {
        use crate::dal::postgres_models::PgSubscription;
        use crate::database::schema::postgres::subscriptions;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let uuid = id.0;
        let pg_subscription: Option<PgSubscription> = conn
            .interact(move |conn| subscriptions::table.find(uuid).first(conn).optional())
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_subscription
            .ok_or(StorageError::NotFound(id))?
            .try_into()
    }

    #[cfg(feature = "sqlite")]
    async fn get_by_id_sqlite(&self, id: UniversalUuid) -> Result<Subscription, StorageError> {
        use crate::dal::sqlite_models::{uuid_to_blob, SqliteSubscription};
        use crate::database::schema::sqlite::subscriptions;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let id_blob = uuid_to_blob(&id.0);
        let sqlite_subscription: Option<SqliteSubscription> = conn
            .interact(move |conn| subscriptions::table.find(id_blob).first(conn).optional())
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_subscription
            .ok_or(StorageError::NotFound(id))?
            .try_into()
    }

    /// Lists all active subscriptions, the matching engine's input set.
    pub async fn list_active(&self) -> Result<Vec<Subscription>, StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.list_active_postgres().await },
            { self.list_active_sqlite().await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn list_active_postgres(&self) -> Result<Vec<Subscription>, StorageError> {
        use crate::dal::postgres_models::PgSubscription;
        use crate::database::schema::postgres::subscriptions;

        let conn = self
            .dal
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let pg_subscriptions: Vec<PgSubscription> = conn
            .interact(|conn| {
                subscriptions::table
                    .filter(subscriptions::active.eq(true))
                    .order(subscriptions::created_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        pg_subscriptions.into_iter().map(TryInto::try_into).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn list_active_sqlite(&self) -> Result<Vec<Subscription>, StorageError> {
        use crate::dal::sqlite_models::SqliteSubscription;
        use crate::database::schema::sqlite::subscriptions;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let sqlite_subscriptions: Vec<SqliteSubscription> = conn
            .interact(|conn| {
                subscriptions::table
                    .filter(subscriptions::active.eq(1))
                    .order(subscriptions::created_at.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))??;

        sqlite_subscriptions
            .into_iter()
            .map(TryInto::try_into)
            .collect()
    }

    /// Activates or deactivates a subscription.
    pub async fn set_active(&self, id: UniversalUuid, active: bool) -> Result<(), StorageError> {
        dispatch_backend!(
            self.dal.backend(),
            { self.set_active_postgres(id, active).await },
            { self.set_active_sqlite(id, active).await }
        )
    }

    #[cfg(feature = "postgres")]
    async fn set_active_postgres(
        &self,
        id: UniversalUuid,
        active: bool,
    ) -> Result<(), StorageError> {
        use crate::database::schema::postgres::subscriptions;

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
                diesel::update(subscriptions::table.find(uuid))
                    .set((
                        subscriptions::active.eq(active),
                        subscriptions::updated_at.eq(now.to_naive()),
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
    async fn set_active_sqlite(
        &self,
        id: UniversalUuid,
        active: bool,
    ) -> Result<(), StorageError> {
        use crate::dal::sqlite_models::uuid_to_blob;
        use crate::database::schema::sqlite::subscriptions;

        let conn = self
            .dal
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StorageError::ConnectionPool(e.to_string()))?;

        let now_str = UniversalTimestamp::now().to_rfc3339();
        let id_blob = uuid_to_blob(&id.0);
        let active_i32 = if active { 1 } else { 0 };

        let updated = conn
            .interact(move |conn| {
                diesel::update(subscriptions::table.find(id_blob))
                    .set((
                        subscriptions::active.eq(active_i32),
                        subscriptions::updated_at.eq(&now_str),
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
}
