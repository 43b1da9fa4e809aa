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

//! Subscription model: a user's standing match rule.
//!
//! Subscriptions are created and edited through the application's CRUD
//! surface; the queue reads them only. A `None` predicate field is a
//! wildcard, and matching is AND over the fields that are set.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};

/// Delivery cadence preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cadence {
    /// One notification per matching event.
    Immediate,
    /// Batched into a periodic digest by the delivery channel.
    Digest,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Immediate => "immediate",
            Cadence::Digest => "digest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "immediate" => Some(Cadence::Immediate),
            "digest" => Some(Cadence::Digest),
            _ => None,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A standing match rule owned by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: UniversalUuid,
    /// Display label for the owning user (the queue never resolves users).
    pub user_label: String,
    pub bill_id: Option<String>,
    pub chamber: Option<String>,
    pub committee: Option<String>,
    pub subject: Option<String>,
    pub event_type: Option<String>,
    /// Delivery channel descriptor, e.g. `email:jo@example.gov`.
    pub channel: String,
    pub cadence: Cadence,
    pub active: bool,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

/// Insert payload for a new subscription.
#[derive(Debug, Clone, Default)]
pub struct NewSubscription {
    pub user_label: String,
    pub bill_id: Option<String>,
    pub chamber: Option<String>,
    pub committee: Option<String>,
    pub subject: Option<String>,
    pub event_type: Option<String>,
    pub channel: String,
    pub cadence: Option<Cadence>,
}

impl NewSubscription {
    pub fn for_bill(user_label: &str, bill_id: &str, channel: &str) -> Self {
        Self {
            user_label: user_label.to_string(),
            bill_id: Some(bill_id.to_string()),
            channel: channel.to_string(),
            ..Default::default()
        }
    }
}
