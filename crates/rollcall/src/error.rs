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

//! Error types for the queue substrate.
//!
//! The taxonomy follows the processing contract: collaborator failures are
//! values (`ProcessError`, `DispatchError`) that the worker translates into
//! state transitions, never panics. Only storage errors (`StorageError`)
//! propagate out of the worker loop, where the caller backs off and re-polls.

use thiserror::Error;

use crate::database::universal_types::UniversalUuid;

/// Errors raised by the data access layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to check out a connection from the pool, or the pool's
    /// interact worker died. Retryable from the caller's perspective.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// A query failed inside the database.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A JSON payload column could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No row exists for the given id.
    #[error("Record not found: {0}")]
    NotFound(UniversalUuid),

    /// A guarded state transition matched zero rows, e.g. requeueing a
    /// record that is still Processing.
    #[error("Invalid transition for record {id}: {reason}")]
    InvalidTransition {
        id: UniversalUuid,
        reason: String,
    },

    /// A stored row could not be mapped back into a domain value
    /// (unknown status string, malformed UUID bytes, bad timestamp text).
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Outcome of processing one claimed source record.
///
/// Carries a stable machine-readable code plus human-readable text; the
/// formatted `code: message` form is what lands in `last_error`.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The action failed but may succeed on a later attempt (network or
    /// store timeouts, rate limits, incomplete delivery fan-out).
    #[error("{code}: {message}")]
    Transient { code: String, message: String },

    /// The action can never succeed for this record (malformed payload,
    /// invalid recipient). Fails the record regardless of remaining
    /// attempts.
    #[error("{code}: {message}")]
    Permanent { code: String, message: String },
}

impl ProcessError {
    pub fn transient(code: &str, message: impl Into<String>) -> Self {
        ProcessError::Transient {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn permanent(code: &str, message: impl Into<String>) -> Self {
        ProcessError::Permanent {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessError::Transient { .. })
    }
}

/// Errors surfaced by an external collaborator (notifier or extractor).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The collaborator failed in a way that may resolve on retry.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The collaborator can never succeed for this input.
    #[error("permanent: {0}")]
    Permanent(String),
}

/// Errors that escape the worker's per-record handling.
///
/// Collaborator failures never appear here; they are absorbed into state
/// transitions. Storage failures do, and the outer poll loop is expected
/// to back off and retry the claim call itself.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
