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

//! PostgreSQL row structs and their conversions to domain models.
//!
//! These structs use native PostgreSQL types (UUID, TIMESTAMP, BOOLEAN).
//! Conversion into the domain models is fallible because the status and
//! kind columns are free TEXT at the storage level; an unknown value maps
//! to `StorageError::Corrupt` rather than a panic.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::postgres::{deliveries, source_records, subscriptions};
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::delivery::{DeliveryRecord, DeliveryStatus};
use crate::models::source_record::{RecordKind, RecordStatus, SourceRecord};
use crate::models::subscription::{Cadence, Subscription};

#[derive(Debug, Clone, Queryable, QueryableByName, Identifiable)]
#[diesel(table_name = source_records)]
pub struct PgSourceRecord {
    pub id: Uuid,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<NaiveDateTime>,
    pub next_attempt_at: NaiveDateTime,
    pub last_error: Option<String>,
    pub processed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = source_records)]
pub struct NewPgSourceRecord {
    pub id: Uuid,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<PgSourceRecord> for SourceRecord {
    type Error = StorageError;

    fn try_from(row: PgSourceRecord) -> Result<Self, Self::Error> {
        let kind = RecordKind::parse(&row.kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown record kind '{}'", row.kind)))?;
        let status = RecordStatus::parse(&row.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown record status '{}'", row.status))
        })?;

        Ok(SourceRecord {
            id: UniversalUuid(row.id),
            kind,
            payload: row.payload,
            status,
            attempts: row.attempts,
            lease_owner: row.lease_owner,
            lease_expires_at: row.lease_expires_at.map(UniversalTimestamp::from_naive),
            next_attempt_at: UniversalTimestamp::from_naive(row.next_attempt_at),
            last_error: row.last_error,
            processed_at: row.processed_at.map(UniversalTimestamp::from_naive),
            created_at: UniversalTimestamp::from_naive(row.created_at),
            updated_at: UniversalTimestamp::from_naive(row.updated_at),
        })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = subscriptions)]
pub struct PgSubscription {
    pub id: Uuid,
    pub user_label: String,
    pub bill_id: Option<String>,
    pub chamber: Option<String>,
    pub committee: Option<String>,
    pub subject: Option<String>,
    pub event_type: Option<String>,
    pub channel: String,
    pub cadence: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewPgSubscription {
    pub id: Uuid,
    pub user_label: String,
    pub bill_id: Option<String>,
    pub chamber: Option<String>,
    pub committee: Option<String>,
    pub subject: Option<String>,
    pub event_type: Option<String>,
    pub channel: String,
    pub cadence: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<PgSubscription> for Subscription {
    type Error = StorageError;

    fn try_from(row: PgSubscription) -> Result<Self, Self::Error> {
        let cadence = Cadence::parse(&row.cadence)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown cadence '{}'", row.cadence)))?;

        Ok(Subscription {
            id: UniversalUuid(row.id),
            user_label: row.user_label,
            bill_id: row.bill_id,
            chamber: row.chamber,
            committee: row.committee,
            subject: row.subject,
            event_type: row.event_type,
            channel: row.channel,
            cadence,
            active: row.active,
            created_at: UniversalTimestamp::from_naive(row.created_at),
            updated_at: UniversalTimestamp::from_naive(row.updated_at),
        })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = deliveries)]
pub struct PgDelivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub source_record_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub error: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = deliveries)]
pub struct NewPgDelivery {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub source_record_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<PgDelivery> for DeliveryRecord {
    type Error = StorageError;

    fn try_from(row: PgDelivery) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::parse(&row.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown delivery status '{}'", row.status))
        })?;

        Ok(DeliveryRecord {
            id: UniversalUuid(row.id),
            subscription_id: UniversalUuid(row.subscription_id),
            source_record_id: UniversalUuid(row.source_record_id),
            status,
            attempts: row.attempts,
            error: row.error,
            sent_at: row.sent_at.map(UniversalTimestamp::from_naive),
            created_at: UniversalTimestamp::from_naive(row.created_at),
            updated_at: UniversalTimestamp::from_naive(row.updated_at),
        })
    }
}
