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

//! Source record model: one row per unit of asynchronous work.
//!
//! A source record is created by the ingestion side and then driven through
//! the bounded state machine Pending -> Processing -> Done/Failed by the
//! queue. The queue mutates only the job-control fields; `payload` is opaque
//! here and interpreted by the processor matching the record's `kind`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};

/// Discriminates the two job kinds sharing the queue table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// A legislative change event to fan out to matching subscribers.
    ChangeEvent,
    /// A scanned vote sheet awaiting structured extraction.
    ExtractionRequest,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::ChangeEvent => "change_event",
            RecordKind::ExtractionRequest => "extraction_request",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "change_event" => Some(RecordKind::ChangeEvent),
            "extraction_request" => Some(RecordKind::ExtractionRequest),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bounded job lifecycle.
///
/// Pending and Processing are live states; Done and Failed are terminal but
/// operator-requeueable. No other transitions exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Eligible for claiming once `next_attempt_at` has passed.
    Pending,
    /// Leased by a worker; `lease_owner` and `lease_expires_at` are set.
    Processing,
    /// Terminal success; `processed_at` is set.
    Done,
    /// Terminal failure: attempts exhausted or a permanent error.
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "Pending",
            RecordStatus::Processing => "Processing",
            RecordStatus::Done => "Done",
            RecordStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(RecordStatus::Pending),
            "Processing" => Some(RecordStatus::Processing),
            "Done" => Some(RecordStatus::Done),
            "Failed" => Some(RecordStatus::Failed),
            _ => None,
        }
    }

    /// True for the two states an operator may requeue from.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Done | RecordStatus::Failed)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of asynchronous work, as seen by domain code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: UniversalUuid,
    pub kind: RecordKind,
    /// JSON payload, opaque to the queue substrate.
    pub payload: String,
    pub status: RecordStatus,
    /// Number of Processing entries so far. Incremented at claim time, so a
    /// claimed record already reflects the in-flight attempt.
    pub attempts: i32,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<UniversalTimestamp>,
    /// When the record becomes eligible for claiming again.
    pub next_attempt_at: UniversalTimestamp,
    pub last_error: Option<String>,
    pub processed_at: Option<UniversalTimestamp>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

/// Insert payload for the ingestion collaborator.
///
/// New records always start Pending with zero attempts; `next_attempt_at`
/// defaults to now when not given.
#[derive(Debug, Clone)]
pub struct NewSourceRecord {
    pub kind: RecordKind,
    pub payload: String,
    pub next_attempt_at: Option<UniversalTimestamp>,
}

impl NewSourceRecord {
    pub fn new(kind: RecordKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            next_attempt_at: None,
        }
    }
}
