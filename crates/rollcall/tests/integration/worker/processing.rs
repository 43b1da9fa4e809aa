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

//! End-to-end worker tests: claim, process, fan out, recover.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::fixtures::{
    seed_bill_subscription, seed_change_event, seed_extraction_request, TestDatabase,
};
use rollcall::dal::DAL;
use rollcall::error::DispatchError;
use rollcall::extractor::Extractor;
use rollcall::models::{
    ChangeEvent, DeliveryStatus, ExtractionRequest, NewDelivery, NewSourceRecord, RecordKind,
    RecordStatus, Subscription, VoteTally,
};
use rollcall::notifier::Notifier;
use rollcall::processors::{ChangeEventProcessor, ExtractionProcessor, ProcessorRegistry};
use rollcall::reaper::{LeaseReaper, ReaperConfig};
use rollcall::retry::{BackoffStrategy, RetryPolicy};
use rollcall::worker::{QueueWorker, WorkerConfig};

const DELIVERY_BUDGET: i32 = 3;

/// Replays a scripted result per call; once the script runs out, every
/// call succeeds.
struct ScriptedNotifier {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<(), DispatchError>>>,
}

impl ScriptedNotifier {
    fn always_ok() -> Arc<Self> {
        Self::with_script(vec![])
    }

    fn with_script(script: Vec<Result<(), DispatchError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn notify(
        &self,
        _subscription: &Subscription,
        _event: &ChangeEvent,
    ) -> Result<(), DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

struct StaticExtractor;

#[async_trait]
impl Extractor for StaticExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<VoteTally, DispatchError> {
        Ok(VoteTally {
            motion: "Do pass".to_string(),
            ayes: 5,
            nays: 2,
            present: 0,
            absent: 0,
            member_votes: vec![],
        })
    }
}

struct FlakyExtractor;

#[async_trait]
impl Extractor for FlakyExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<VoteTally, DispatchError> {
        Err(DispatchError::Retryable("fetch timeout".to_string()))
    }
}

/// Zero-delay policy so retried records are immediately claimable.
fn fast_policy(max_attempts: i32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_strategy: BackoffStrategy::Fixed,
        jitter: false,
    }
}

fn test_worker(
    dal: &DAL,
    notifier: Arc<dyn Notifier>,
    extractor: Arc<dyn Extractor>,
    policy: RetryPolicy,
) -> QueueWorker {
    let registry = ProcessorRegistry::new()
        .register(
            RecordKind::ChangeEvent,
            Arc::new(ChangeEventProcessor::new(
                dal.clone(),
                notifier,
                DELIVERY_BUDGET,
            )),
        )
        .register(
            RecordKind::ExtractionRequest,
            Arc::new(ExtractionProcessor::new(extractor)),
        );

    QueueWorker::new(
        dal.clone(),
        WorkerConfig {
            worker_id: "test-worker".to_string(),
            batch_size: 10,
            lease_duration: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
            retry_policy: policy,
        },
        registry,
    )
}

#[tokio::test]
async fn test_change_event_fans_out_to_matching_subscribers() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_bill_subscription(&dal, "a", "HB-1").await;
    seed_bill_subscription(&dal, "b", "HB-1").await;
    seed_bill_subscription(&dal, "c", "SB-99").await; // does not match

    let record = seed_change_event(&dal, "HB-1", "status_change").await;

    let notifier = ScriptedNotifier::always_ok();
    let worker = test_worker(&dal, notifier.clone(), Arc::new(StaticExtractor), fast_policy(5));

    assert_eq!(worker.poll_once().await.unwrap(), 1);

    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);

    let deliveries = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries
        .iter()
        .all(|d| d.status == DeliveryStatus::Sent));
    assert_eq!(notifier.call_count(), 2);
}

#[tokio::test]
async fn test_transient_delivery_failure_retries_only_the_owed() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_bill_subscription(&dal, "a", "HB-2").await;
    seed_bill_subscription(&dal, "b", "HB-2").await;
    seed_bill_subscription(&dal, "c", "HB-2").await;

    let record = seed_change_event(&dal, "HB-2", "status_change").await;

    // First send attempt fails transiently; everything after succeeds.
    let notifier = ScriptedNotifier::with_script(vec![Err(DispatchError::Retryable(
        "provider 503".to_string(),
    ))]);
    let worker = test_worker(&dal, notifier.clone(), Arc::new(StaticExtractor), fast_policy(5));

    // Pass 1: two sent, one owed, record backs off.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let record_after = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(record_after.status, RecordStatus::Pending);
    assert!(record_after
        .last_error
        .as_deref()
        .unwrap()
        .contains("delivery_incomplete"));

    // Pass 2: only the owed delivery is attempted again.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);
    assert_eq!(done.attempts, 2);

    let deliveries = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(deliveries.len(), 3, "retry must not duplicate ledger rows");
    assert!(deliveries
        .iter()
        .all(|d| d.status == DeliveryStatus::Sent));
    // 3 attempts in pass 1 + 1 redelivery in pass 2.
    assert_eq!(notifier.call_count(), 4);
}

#[tokio::test]
async fn test_permanent_delivery_error_does_not_hold_record_open() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_bill_subscription(&dal, "gone", "HB-3").await;
    let record = seed_change_event(&dal, "HB-3", "status_change").await;

    let notifier = ScriptedNotifier::with_script(vec![Err(DispatchError::Permanent(
        "mailbox does not exist".to_string(),
    ))]);
    let worker = test_worker(&dal, notifier.clone(), Arc::new(StaticExtractor), fast_policy(5));

    assert_eq!(worker.poll_once().await.unwrap(), 1);

    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);

    let deliveries = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert_eq!(deliveries[0].attempts, DELIVERY_BUDGET);
    assert_eq!(
        deliveries[0].error.as_deref(),
        Some("mailbox does not exist")
    );
    assert_eq!(notifier.call_count(), 1);
}

#[tokio::test]
async fn test_malformed_payload_fails_permanently() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = dal
        .source_record()
        .create(NewSourceRecord::new(
            RecordKind::ChangeEvent,
            "this is not json",
        ))
        .await
        .unwrap();

    let notifier = ScriptedNotifier::always_ok();
    let worker = test_worker(&dal, notifier.clone(), Arc::new(StaticExtractor), fast_policy(5));

    assert_eq!(worker.poll_once().await.unwrap(), 1);

    let failed = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(failed.status, RecordStatus::Failed);
    assert_eq!(failed.attempts, 1, "permanent failures burn no retries");
    assert!(failed
        .last_error
        .as_deref()
        .unwrap()
        .contains("malformed_payload"));
    assert_eq!(notifier.call_count(), 0);
}

#[tokio::test]
async fn test_transient_failures_exhaust_into_failed() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_extraction_request(&dal, "doc-17").await;

    let worker = test_worker(
        &dal,
        ScriptedNotifier::always_ok(),
        Arc::new(FlakyExtractor),
        fast_policy(2),
    );

    // Attempt 1: budget remains, backs off to Pending.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let after_first = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(after_first.status, RecordStatus::Pending);
    assert_eq!(after_first.attempts, 1);

    // Attempt 2: budget spent, terminal.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let failed = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(failed.status, RecordStatus::Failed);
    assert_eq!(failed.attempts, 2);
    let last_error = failed.last_error.unwrap();
    assert!(
        last_error.contains("exhausted after 2 attempts"),
        "unexpected error: {}",
        last_error
    );
    assert!(last_error.contains("fetch timeout"));

    // Terminal records stay put.
    assert_eq!(worker.poll_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_successful_extraction_completes_record() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_extraction_request(&dal, "doc-4").await;
    let worker = test_worker(
        &dal,
        ScriptedNotifier::always_ok(),
        Arc::new(StaticExtractor),
        fast_policy(5),
    );

    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);
}

#[tokio::test]
async fn test_unregistered_kind_fails_permanently() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_extraction_request(&dal, "doc-9").await;

    // Registry with no extraction processor.
    let registry = ProcessorRegistry::new().register(
        RecordKind::ChangeEvent,
        Arc::new(ChangeEventProcessor::new(
            dal.clone(),
            ScriptedNotifier::always_ok(),
            DELIVERY_BUDGET,
        )),
    );
    let worker = QueueWorker::new(
        dal.clone(),
        WorkerConfig {
            worker_id: "test-worker".to_string(),
            retry_policy: fast_policy(5),
            ..WorkerConfig::default()
        },
        registry,
    );

    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let failed = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(failed.status, RecordStatus::Failed);
    assert!(failed
        .last_error
        .as_deref()
        .unwrap()
        .contains("no_processor"));
}

#[tokio::test]
async fn test_crashed_worker_is_recovered_without_duplicate_deliveries() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_bill_subscription(&dal, "a", "HB-7").await;
    seed_bill_subscription(&dal, "b", "HB-7").await;
    let record = seed_change_event(&dal, "HB-7", "status_change").await;

    // A worker claims with an already-elapsed lease and then "crashes".
    let claimed = dal
        .source_record()
        .claim("doomed-worker", 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;

    let reaper = LeaseReaper::new(dal.clone(), ReaperConfig::default());
    assert_eq!(reaper.sweep_once().await.unwrap(), 1);

    // A healthy worker finishes the job.
    let notifier = ScriptedNotifier::always_ok();
    let worker = test_worker(&dal, notifier.clone(), Arc::new(StaticExtractor), fast_policy(5));
    assert_eq!(worker.poll_once().await.unwrap(), 1);

    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);
    assert_eq!(done.attempts, 2, "crash claim plus recovery claim");

    let deliveries = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries
        .iter()
        .all(|d| d.status == DeliveryStatus::Sent));
    assert_eq!(notifier.call_count(), 2);
}

#[tokio::test]
async fn test_crash_recovery_reuses_partial_ledger_rows() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let sub_a = seed_bill_subscription(&dal, "a", "HB-9").await;
    seed_bill_subscription(&dal, "b", "HB-9").await;
    let record = seed_change_event(&dal, "HB-9", "status_change").await;

    // The first worker claims, gets as far as queueing subscriber a's
    // ledger row, and dies before sending anything.
    let claimed = dal
        .source_record()
        .claim("doomed-worker", 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    let partial = dal
        .delivery()
        .ensure_queued(NewDelivery {
            subscription_id: sub_a.id,
            source_record_id: record.id,
        })
        .await
        .unwrap();
    assert_eq!(partial.status, DeliveryStatus::Queued);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let reaper = LeaseReaper::new(dal.clone(), ReaperConfig::default());
    assert_eq!(reaper.sweep_once().await.unwrap(), 1);

    // Reclaim touches only the record; the partial row survives as-is.
    let after_sweep = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(after_sweep.len(), 1);
    assert_eq!(after_sweep[0].id, partial.id);
    assert_eq!(after_sweep[0].status, DeliveryStatus::Queued);
    assert_eq!(after_sweep[0].attempts, 0);

    // The recovery pass re-matches {a, b}, reuses a's row, and creates
    // only b's.
    let notifier = ScriptedNotifier::always_ok();
    let worker = test_worker(&dal, notifier.clone(), Arc::new(StaticExtractor), fast_policy(5));
    assert_eq!(worker.poll_once().await.unwrap(), 1);

    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);

    let deliveries = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries
        .iter()
        .all(|d| d.status == DeliveryStatus::Sent));
    assert!(deliveries.iter().any(|d| d.id == partial.id));
    assert_eq!(notifier.call_count(), 2);
}

#[tokio::test]
async fn test_deactivated_subscription_cancels_owed_delivery() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let sub = seed_bill_subscription(&dal, "quitter", "HB-12").await;
    let record = seed_change_event(&dal, "HB-12", "status_change").await;

    let notifier = ScriptedNotifier::with_script(vec![Err(DispatchError::Retryable(
        "provider 503".to_string(),
    ))]);
    let worker = test_worker(&dal, notifier.clone(), Arc::new(StaticExtractor), fast_policy(5));

    // Pass 1: the only delivery fails transiently, record backs off.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let pending = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(pending.status, RecordStatus::Pending);

    // The subscriber opts out before the retry.
    dal.subscription().set_active(sub.id, false).await.unwrap();

    // Pass 2: nothing matches anymore, but the record still owns an open
    // ledger row; it must be settled by cancellation, not abandoned.
    assert_eq!(worker.poll_once().await.unwrap(), 1);
    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);

    let deliveries = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
    assert!(!deliveries[0].is_attemptable(DELIVERY_BUDGET));
    assert!(deliveries[0]
        .error
        .as_deref()
        .unwrap()
        .contains("no longer matches"));
    // One attempt in pass 1; cancellation sends nothing.
    assert_eq!(notifier.call_count(), 1);
}

#[tokio::test]
async fn test_run_loop_shuts_down_cleanly() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_bill_subscription(&dal, "a", "HB-8").await;
    let record = seed_change_event(&dal, "HB-8", "status_change").await;

    let worker = test_worker(
        &dal,
        ScriptedNotifier::always_ok(),
        Arc::new(StaticExtractor),
        fast_policy(5),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let done = dal.source_record().get_by_id(record.id).await.unwrap();
    assert_eq!(done.status, RecordStatus::Done);
}
