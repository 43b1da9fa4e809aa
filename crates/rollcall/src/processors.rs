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

//! Per-kind record processors.
//!
//! A processor receives one claimed record and returns a `ProcessError`
//! value on failure; the worker translates the outcome into a state
//! transition. Processors never touch the record's job-control columns
//! themselves.
//!
//! `ChangeEventProcessor` is where the fan-out semantics live: match the
//! event against active subscriptions, make sure a ledger row exists per
//! match, attempt the unsettled ones, and succeed only when every owed
//! delivery has settled. Because `ensure_queued` is idempotent, re-running
//! the whole pass after a partial failure retries only what is still owed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::dal::DAL;
use crate::error::{DispatchError, ProcessError, StorageError};
use crate::extractor::Extractor;
use crate::matcher;
use crate::models::delivery::NewDelivery;
use crate::models::event::{ChangeEvent, ExtractionRequest};
use crate::models::source_record::{RecordKind, SourceRecord};
use crate::notifier::Notifier;

/// Processes one claimed source record.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    async fn process(&self, record: &SourceRecord) -> Result<(), ProcessError>;
}

/// Maps record kinds to their processors.
///
/// A claimed record whose kind has no registered processor is a permanent
/// failure; retrying cannot conjure one up.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<RecordKind, Arc<dyn RecordProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a processor for a kind, replacing any previous one.
    pub fn register(mut self, kind: RecordKind, processor: Arc<dyn RecordProcessor>) -> Self {
        self.processors.insert(kind, processor);
        self
    }

    pub fn get(&self, kind: RecordKind) -> Option<&Arc<dyn RecordProcessor>> {
        self.processors.get(&kind)
    }
}

fn storage_failure(e: StorageError) -> ProcessError {
    ProcessError::transient("storage", e.to_string())
}

/// Fans a change event out to every matching subscriber.
pub struct ChangeEventProcessor {
    dal: DAL,
    notifier: Arc<dyn Notifier>,
    /// Per-delivery send budget, independent of the record's attempts.
    delivery_max_attempts: i32,
}

impl ChangeEventProcessor {
    pub fn new(dal: DAL, notifier: Arc<dyn Notifier>, delivery_max_attempts: i32) -> Self {
        Self {
            dal,
            notifier,
            delivery_max_attempts,
        }
    }
}

#[async_trait]
impl RecordProcessor for ChangeEventProcessor {
    async fn process(&self, record: &SourceRecord) -> Result<(), ProcessError> {
        let event: ChangeEvent = serde_json::from_str(&record.payload)
            .map_err(|e| ProcessError::permanent("malformed_payload", e.to_string()))?;

        let subscriptions = self
            .dal
            .subscription()
            .list_active()
            .await
            .map_err(storage_failure)?;
        let matched = matcher::matching_subscriptions(&subscriptions, &event);

        debug!(
            record_id = %record.id,
            bill_id = %event.bill_id,
            matched = matched.len(),
            "Matched change event against active subscriptions"
        );

        let mut owed = 0usize;
        let mut handled = HashSet::new();
        for subscription in matched {
            let delivery = self
                .dal
                .delivery()
                .ensure_queued(NewDelivery {
                    subscription_id: subscription.id,
                    source_record_id: record.id,
                })
                .await
                .map_err(storage_failure)?;
            handled.insert(delivery.id);

            if delivery.is_settled(self.delivery_max_attempts) {
                continue;
            }

            match self.notifier.notify(subscription, &event).await {
                Ok(()) => {
                    self.dal
                        .delivery()
                        .mark_sent(delivery.id)
                        .await
                        .map_err(storage_failure)?;
                }
                Err(DispatchError::Retryable(msg)) => {
                    let new_attempts = delivery.attempts + 1;
                    self.dal
                        .delivery()
                        .record_failure(delivery.id, &msg, new_attempts)
                        .await
                        .map_err(storage_failure)?;
                    if new_attempts < self.delivery_max_attempts {
                        owed += 1;
                    } else {
                        warn!(
                            delivery_id = %delivery.id,
                            subscription_id = %subscription.id,
                            error = %msg,
                            "Delivery exhausted its attempt budget"
                        );
                    }
                }
                Err(DispatchError::Permanent(msg)) => {
                    // Charge the whole budget; this subscriber can never
                    // receive this notification, and one bad address must
                    // not hold the record open.
                    self.dal
                        .delivery()
                        .record_failure(delivery.id, &msg, self.delivery_max_attempts)
                        .await
                        .map_err(storage_failure)?;
                    warn!(
                        delivery_id = %delivery.id,
                        subscription_id = %subscription.id,
                        error = %msg,
                        "Delivery permanently undeliverable"
                    );
                }
            }
        }

        // The record owns every row in its ledger, not just the rows the
        // current match set re-derives. A subscription that deactivated or
        // stopped matching between passes leaves its unsettled row behind;
        // cancel it explicitly so Done never abandons an open delivery.
        let ledger = self
            .dal
            .delivery()
            .list_for_record(record.id)
            .await
            .map_err(storage_failure)?;
        for delivery in ledger {
            if handled.contains(&delivery.id)
                || delivery.is_settled(self.delivery_max_attempts)
            {
                continue;
            }
            self.dal
                .delivery()
                .record_failure(
                    delivery.id,
                    "delivery cancelled: subscription no longer matches",
                    self.delivery_max_attempts,
                )
                .await
                .map_err(storage_failure)?;
            warn!(
                delivery_id = %delivery.id,
                subscription_id = %delivery.subscription_id,
                "Cancelled delivery whose subscription no longer matches"
            );
        }

        if owed > 0 {
            return Err(ProcessError::transient(
                "delivery_incomplete",
                format!("{} deliveries still owed", owed),
            ));
        }
        Ok(())
    }
}

/// Drives vote-tally extraction for scanned documents.
pub struct ExtractionProcessor {
    extractor: Arc<dyn Extractor>,
}

impl ExtractionProcessor {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl RecordProcessor for ExtractionProcessor {
    async fn process(&self, record: &SourceRecord) -> Result<(), ProcessError> {
        let request: ExtractionRequest = serde_json::from_str(&record.payload)
            .map_err(|e| ProcessError::permanent("malformed_payload", e.to_string()))?;

        let tally = self
            .extractor
            .extract(&request)
            .await
            .map_err(|e| match e {
                DispatchError::Retryable(msg) => ProcessError::transient("extractor", msg),
                DispatchError::Permanent(msg) => ProcessError::permanent("extractor", msg),
            })?;

        info!(
            record_id = %record.id,
            document_id = %request.document_id,
            motion = %tally.motion,
            ayes = tally.ayes,
            nays = tally.nays,
            "Extracted vote tally"
        );
        Ok(())
    }
}
