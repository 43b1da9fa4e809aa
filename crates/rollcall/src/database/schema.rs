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

//! Diesel table definitions, one module per backend.
//!
//! The two schemas are column-for-column mirrors; only the storage types
//! differ. PostgreSQL uses native UUID/TIMESTAMP/BOOLEAN columns, SQLite
//! stores UUIDs as BLOB, timestamps as RFC3339 TEXT, and booleans as
//! INTEGER. Timestamp TEXT comparisons stay correct because every value is
//! written as UTC RFC3339.

#[cfg(feature = "postgres")]
pub mod postgres {
    diesel::table! {
        source_records (id) {
            id -> Uuid,
            kind -> Text,
            payload -> Text,
            status -> Text,
            attempts -> Integer,
            lease_owner -> Nullable<Text>,
            lease_expires_at -> Nullable<Timestamp>,
            next_attempt_at -> Timestamp,
            last_error -> Nullable<Text>,
            processed_at -> Nullable<Timestamp>,
            created_at -> Timestamp,
            updated_at -> Timestamp,
        }
    }

    diesel::table! {
        subscriptions (id) {
            id -> Uuid,
            user_label -> Text,
            bill_id -> Nullable<Text>,
            chamber -> Nullable<Text>,
            committee -> Nullable<Text>,
            subject -> Nullable<Text>,
            event_type -> Nullable<Text>,
            channel -> Text,
            cadence -> Text,
            active -> Bool,
            created_at -> Timestamp,
            updated_at -> Timestamp,
        }
    }

    diesel::table! {
        deliveries (id) {
            id -> Uuid,
            subscription_id -> Uuid,
            source_record_id -> Uuid,
            status -> Text,
            attempts -> Integer,
            error -> Nullable<Text>,
            sent_at -> Nullable<Timestamp>,
            created_at -> Timestamp,
            updated_at -> Timestamp,
        }
    }

    diesel::joinable!(deliveries -> subscriptions (subscription_id));
    diesel::joinable!(deliveries -> source_records (source_record_id));

    diesel::allow_tables_to_appear_in_same_query!(source_records, subscriptions, deliveries);
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    diesel::table! {
        source_records (id) {
            id -> Binary,
            kind -> Text,
            payload -> Text,
            status -> Text,
            attempts -> Integer,
            lease_owner -> Nullable<Text>,
            lease_expires_at -> Nullable<Text>,
            next_attempt_at -> Text,
            last_error -> Nullable<Text>,
            processed_at -> Nullable<Text>,
            created_at -> Text,
            updated_at -> Text,
        }
    }

    diesel::table! {
        subscriptions (id) {
            id -> Binary,
            user_label -> Text,
            bill_id -> Nullable<Text>,
            chamber -> Nullable<Text>,
            committee -> Nullable<Text>,
            subject -> Nullable<Text>,
            event_type -> Nullable<Text>,
            channel -> Text,
            cadence -> Text,
            active -> Integer,
            created_at -> Text,
            updated_at -> Text,
        }
    }

    diesel::table! {
        deliveries (id) {
            id -> Binary,
            subscription_id -> Binary,
            source_record_id -> Binary,
            status -> Text,
            attempts -> Integer,
            error -> Nullable<Text>,
            sent_at -> Nullable<Text>,
            created_at -> Text,
            updated_at -> Text,
        }
    }

    diesel::joinable!(deliveries -> subscriptions (subscription_id));
    diesel::joinable!(deliveries -> source_records (source_record_id));

    diesel::allow_tables_to_appear_in_same_query!(source_records, subscriptions, deliveries);
}
