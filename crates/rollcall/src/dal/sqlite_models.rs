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

//! SQLite row structs and their conversions to domain models.
//!
//! SQLite has no native UUID/TIMESTAMP/BOOLEAN columns, so UUIDs are BLOB
//! (16 raw bytes), timestamps are UTC RFC3339 TEXT, and booleans are
//! INTEGER. All values are generated client-side; RFC3339 UTC text keeps
//! lexicographic comparison equivalent to chronological comparison, which
//! the claim and reaper queries rely on.

use diesel::prelude::*;
use uuid::Uuid;

use crate::database::schema::sqlite::{deliveries, source_records, subscriptions};
use crate::database::universal_types::{UniversalBool, UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::delivery::{DeliveryRecord, DeliveryStatus};
use crate::models::source_record::{RecordKind, RecordStatus, SourceRecord};
use crate::models::subscription::{Cadence, Subscription};

/// Converts a UUID to its 16-byte BLOB form.
pub fn uuid_to_blob(uuid: &Uuid) -> Vec<u8> {
    uuid.as_bytes().to_vec()
}

fn blob_to_uuid(bytes: &[u8], column: &str) -> Result<UniversalUuid, StorageError> {
    UniversalUuid::from_bytes(bytes)
        .map_err(|e| StorageError::Corrupt(format!("invalid UUID blob in {}: {}", column, e)))
}

fn text_to_timestamp(s: &str, column: &str) -> Result<UniversalTimestamp, StorageError> {
    UniversalTimestamp::from_rfc3339(s)
        .map_err(|e| StorageError::Corrupt(format!("invalid timestamp in {}: {}", column, e)))
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = source_records)]
pub struct SqliteSourceRecord {
    pub id: Vec<u8>,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<String>,
    pub next_attempt_at: String,
    pub last_error: Option<String>,
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = source_records)]
pub struct NewSqliteSourceRecord {
    pub id: Vec<u8>,
    pub kind: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<SqliteSourceRecord> for SourceRecord {
    type Error = StorageError;

    fn try_from(row: SqliteSourceRecord) -> Result<Self, Self::Error> {
        let kind = RecordKind::parse(&row.kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown record kind '{}'", row.kind)))?;
        let status = RecordStatus::parse(&row.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown record status '{}'", row.status))
        })?;

        Ok(SourceRecord {
            id: blob_to_uuid(&row.id, "source_records.id")?,
            kind,
            payload: row.payload,
            status,
            attempts: row.attempts,
            lease_owner: row.lease_owner,
            lease_expires_at: row
                .lease_expires_at
                .as_deref()
                .map(|s| text_to_timestamp(s, "source_records.lease_expires_at"))
                .transpose()?,
            next_attempt_at: text_to_timestamp(
                &row.next_attempt_at,
                "source_records.next_attempt_at",
            )?,
            last_error: row.last_error,
            processed_at: row
                .processed_at
                .as_deref()
                .map(|s| text_to_timestamp(s, "source_records.processed_at"))
                .transpose()?,
            created_at: text_to_timestamp(&row.created_at, "source_records.created_at")?,
            updated_at: text_to_timestamp(&row.updated_at, "source_records.updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = subscriptions)]
pub struct SqliteSubscription {
    pub id: Vec<u8>,
    pub user_label: String,
    pub bill_id: Option<String>,
    pub chamber: Option<String>,
    pub committee: Option<String>,
    pub subject: Option<String>,
    pub event_type: Option<String>,
    pub channel: String,
    pub cadence: String,
    pub active: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewSqliteSubscription {
    pub id: Vec<u8>,
    pub user_label: String,
    pub bill_id: Option<String>,
    pub chamber: Option<String>,
    pub committee: Option<String>,
    pub subject: Option<String>,
    pub event_type: Option<String>,
    pub channel: String,
    pub cadence: String,
    pub active: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<SqliteSubscription> for Subscription {
    type Error = StorageError;

    fn try_from(row: SqliteSubscription) -> Result<Self, Self::Error> {
        let cadence = Cadence::parse(&row.cadence)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown cadence '{}'", row.cadence)))?;

        Ok(Subscription {
            id: blob_to_uuid(&row.id, "subscriptions.id")?,
            user_label: row.user_label,
            bill_id: row.bill_id,
            chamber: row.chamber,
            committee: row.committee,
            subject: row.subject,
            event_type: row.event_type,
            channel: row.channel,
            cadence,
            active: UniversalBool::from_i32(row.active).is_true(),
            created_at: text_to_timestamp(&row.created_at, "subscriptions.created_at")?,
            updated_at: text_to_timestamp(&row.updated_at, "subscriptions.updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = deliveries)]
pub struct SqliteDelivery {
    pub id: Vec<u8>,
    pub subscription_id: Vec<u8>,
    pub source_record_id: Vec<u8>,
    pub status: String,
    pub attempts: i32,
    pub error: Option<String>,
    pub sent_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = deliveries)]
pub struct NewSqliteDelivery {
    pub id: Vec<u8>,
    pub subscription_id: Vec<u8>,
    pub source_record_id: Vec<u8>,
    pub status: String,
    pub attempts: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<SqliteDelivery> for DeliveryRecord {
    type Error = StorageError;

    fn try_from(row: SqliteDelivery) -> Result<Self, Self::Error> {
        let status = DeliveryStatus::parse(&row.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown delivery status '{}'", row.status))
        })?;

        Ok(DeliveryRecord {
            id: blob_to_uuid(&row.id, "deliveries.id")?,
            subscription_id: blob_to_uuid(&row.subscription_id, "deliveries.subscription_id")?,
            source_record_id: blob_to_uuid(&row.source_record_id, "deliveries.source_record_id")?,
            status,
            attempts: row.attempts,
            error: row.error,
            sent_at: row
                .sent_at
                .as_deref()
                .map(|s| text_to_timestamp(s, "deliveries.sent_at"))
                .transpose()?,
            created_at: text_to_timestamp(&row.created_at, "deliveries.created_at")?,
            updated_at: text_to_timestamp(&row.updated_at, "deliveries.updated_at")?,
        })
    }
}
