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

//! The extractor collaborator seam.
//!
//! Turns a scanned vote-sheet document into a structured tally. The
//! implementation owns fetching the document and persisting the tally
//! wherever the application keeps vote data; the queue only drives the
//! attempt and records the outcome on the source record.

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::models::event::{ExtractionRequest, VoteTally};

/// Extracts a vote tally from one scanned document.
///
/// A document the service cannot parse at all (unsupported format,
/// unreadable scan) is a `DispatchError::Permanent`; a fetch timeout or
/// service hiccup is `Retryable`.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<VoteTally, DispatchError>;
}
