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

//! Delivery ledger model.
//!
//! One row per (subscription, source record) pair, created at most once per
//! pair for the lifetime of the system. The unique constraint on the pair is
//! the sole de-duplication mechanism across retries; rows are never deleted
//! or duplicated, only advanced Queued -> Sent/Failed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};

/// Lifecycle of a single notification delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Created by the matching pass, not yet sent.
    Queued,
    /// Handed to the notifier successfully.
    Sent,
    /// The last send attempt failed; retryable while attempts remain.
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Queued => "Queued",
            DeliveryStatus::Sent => "Sent",
            DeliveryStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Queued" => Some(DeliveryStatus::Queued),
            "Sent" => Some(DeliveryStatus::Sent),
            "Failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ledger row: a notification owed to one subscriber for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: UniversalUuid,
    pub subscription_id: UniversalUuid,
    pub source_record_id: UniversalUuid,
    pub status: DeliveryStatus,
    /// Send attempts so far. Bounded by the delivery-level retry policy,
    /// independently of the owning record's attempts counter.
    pub attempts: i32,
    pub error: Option<String>,
    pub sent_at: Option<UniversalTimestamp>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

impl DeliveryRecord {
    /// True once this delivery no longer needs work: it was sent, or it
    /// failed with its own retry budget exhausted.
    pub fn is_settled(&self, max_attempts: i32) -> bool {
        match self.status {
            DeliveryStatus::Sent => true,
            DeliveryStatus::Failed => self.attempts >= max_attempts,
            DeliveryStatus::Queued => false,
        }
    }

    /// True if the next processing pass should attempt a send.
    pub fn is_attemptable(&self, max_attempts: i32) -> bool {
        match self.status {
            DeliveryStatus::Queued => true,
            DeliveryStatus::Failed => self.attempts < max_attempts,
            DeliveryStatus::Sent => false,
        }
    }
}

/// Insert payload for the ledger upsert.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub subscription_id: UniversalUuid,
    pub source_record_id: UniversalUuid,
}
