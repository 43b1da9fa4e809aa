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

//! Payload types carried by source records.
//!
//! These are the JSON shapes stored in `source_records.payload`. The queue
//! substrate never inspects them; the processors deserialize them when a
//! record is claimed. A payload that fails to deserialize is a permanent
//! failure, not a retryable one.

use serde::{Deserialize, Serialize};

/// A legislative change event produced by the ingestion side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Bill identity, e.g. `HB-1042`.
    pub bill_id: String,
    /// Event type, e.g. `status_change`, `calendar_published`,
    /// `committee_referral`.
    pub event_type: String,
    #[serde(default)]
    pub chamber: Option<String>,
    #[serde(default)]
    pub committee: Option<String>,
    /// Subject tags attached to the bill.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Human-readable description for the notification body.
    #[serde(default)]
    pub summary: Option<String>,
}

/// A scanned committee document awaiting vote-tally extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// Stable identifier of the scanned document.
    pub document_id: String,
    /// Where the extractor fetches the document from.
    pub source_url: String,
    #[serde(default)]
    pub committee: Option<String>,
}

/// One member's recorded position on a motion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberVote {
    pub member: String,
    /// Recorded position, e.g. `aye`, `nay`, `present`, `absent`.
    pub vote: String,
}

/// Structured tally extracted from a scanned vote sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteTally {
    pub motion: String,
    pub ayes: i32,
    pub nays: i32,
    #[serde(default)]
    pub present: i32,
    #[serde(default)]
    pub absent: i32,
    #[serde(default)]
    pub member_votes: Vec<MemberVote>,
}
