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

//! The queue worker: claim, process, transition, repeat.
//!
//! `poll_once` is one pass, usable directly from tests; `run` wraps it in
//! a poll loop with graceful shutdown. The worker owns the translation
//! from processor outcomes to state transitions:
//!
//! - `Ok` -> Done
//! - permanent error -> Failed, attempts notwithstanding
//! - transient error with budget left -> Pending, backed off
//! - transient error, budget spent -> Failed with an exhausted marker
//!
//! A lost lease during the transition is logged and swallowed; the record
//! already belongs to someone else and the idempotent ledger makes the
//! overlap harmless.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dal::DAL;
use crate::database::universal_types::UniversalTimestamp;
use crate::error::{ProcessError, StorageError, WorkerError};
use crate::models::source_record::SourceRecord;
use crate::processors::ProcessorRegistry;
use crate::retry::RetryPolicy;

/// Worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Identity written into `lease_owner`; must be unique per worker.
    pub worker_id: String,
    /// Maximum records claimed per poll.
    pub batch_size: i64,
    /// How long a claim is protected before the reaper may reclaim it.
    pub lease_duration: Duration,
    /// Sleep between polls, and the backoff after a storage error.
    pub poll_interval: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4().simple()),
            batch_size: 10,
            lease_duration: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Claims and processes source records until shut down.
pub struct QueueWorker {
    dal: DAL,
    config: WorkerConfig,
    registry: ProcessorRegistry,
}

impl QueueWorker {
    pub fn new(dal: DAL, config: WorkerConfig, registry: ProcessorRegistry) -> Self {
        Self {
            dal,
            config,
            registry,
        }
    }

    /// One claim-and-process pass. Returns how many records were claimed.
    ///
    /// Collaborator failures are absorbed into state transitions; only
    /// storage failures surface, and the caller is expected to back off
    /// and poll again.
    pub async fn poll_once(&self) -> Result<usize, WorkerError> {
        let claimed = self
            .dal
            .source_record()
            .claim(
                &self.config.worker_id,
                self.config.batch_size,
                self.config.lease_duration,
            )
            .await?;

        let count = claimed.len();
        if count > 0 {
            debug!(
                worker_id = %self.config.worker_id,
                count,
                "Claimed records"
            );
        }

        for record in claimed {
            self.handle(record).await?;
        }
        Ok(count)
    }

    async fn handle(&self, record: SourceRecord) -> Result<(), WorkerError> {
        let outcome = match self.registry.get(record.kind) {
            Some(processor) => processor.process(&record).await,
            None => Err(ProcessError::permanent(
                "no_processor",
                format!("no processor registered for kind {}", record.kind),
            )),
        };

        let records = self.dal.source_record();
        let worker_id = &self.config.worker_id;
        let policy = &self.config.retry_policy;

        let transition = match &outcome {
            Ok(()) => {
                debug!(record_id = %record.id, "Record processed");
                records.mark_done(record.id, worker_id).await
            }
            Err(err @ ProcessError::Permanent { .. }) => {
                warn!(record_id = %record.id, error = %err, "Permanent failure");
                records
                    .mark_failed(record.id, worker_id, &err.to_string())
                    .await
            }
            Err(err @ ProcessError::Transient { .. }) => {
                if record.attempts >= policy.max_attempts {
                    warn!(
                        record_id = %record.id,
                        attempts = record.attempts,
                        error = %err,
                        "Retries exhausted"
                    );
                    records
                        .mark_failed(
                            record.id,
                            worker_id,
                            &format!("exhausted after {} attempts: {}", record.attempts, err),
                        )
                        .await
                } else {
                    let delay = policy.calculate_delay(record.attempts);
                    debug!(
                        record_id = %record.id,
                        attempt = record.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Scheduling retry"
                    );
                    records
                        .schedule_retry(
                            record.id,
                            worker_id,
                            &err.to_string(),
                            UniversalTimestamp::now().plus(delay),
                        )
                        .await
                }
            }
        };

        match transition {
            Ok(()) => Ok(()),
            Err(StorageError::InvalidTransition { id, reason }) => {
                // Lease expired mid-processing and the record was handed
                // elsewhere. The new owner's pass redoes any unfinished
                // work, and settled deliveries stay settled.
                warn!(record_id = %id, %reason, "Lease lost, leaving record to its new owner");
                Ok(())
            }
            Err(e) => Err(WorkerError::Storage(e)),
        }
    }

    /// Runs the poll loop until a shutdown signal arrives.
    ///
    /// Storage errors are logged and answered with a `poll_interval`
    /// sleep, then polling resumes; a queue worker should ride out a
    /// database restart rather than die from it.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "Queue worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(worker_id = %self.config.worker_id, "Queue worker shutting down");
                    break;
                }
                result = self.poll_once() => {
                    match result {
                        Ok(0) => {
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                        Ok(_) => {
                            // More work may be waiting; poll again at once.
                        }
                        Err(e) => {
                            error!(worker_id = %self.config.worker_id, error = %e, "Poll failed");
                            tokio::time::sleep(self.config.poll_interval).await;
                        }
                    }
                }
            }
        }
    }
}
