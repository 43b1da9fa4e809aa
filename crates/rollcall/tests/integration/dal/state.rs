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

//! Integration tests for guarded state transitions and operator requeue.

use std::time::Duration;

use crate::fixtures::{seed_change_event, TestDatabase};
use rollcall::database::{UniversalTimestamp, UniversalUuid};
use rollcall::error::StorageError;
use rollcall::models::{RecordStatus, SourceRecord};

const LEASE: Duration = Duration::from_secs(60);

async fn claim_one(dal: &rollcall::dal::DAL, worker: &str) -> SourceRecord {
    let mut claimed = dal.source_record().claim(worker, 1, LEASE).await.unwrap();
    assert_eq!(claimed.len(), 1);
    claimed.remove(0)
}

#[tokio::test]
async fn test_mark_done_stamps_processed_at_and_clears_lease() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_change_event(&dal, "HB-1", "status_change").await;
    let claimed = claim_one(&dal, "worker-1").await;

    dal.source_record()
        .mark_done(claimed.id, "worker-1")
        .await
        .unwrap();

    let record = dal.source_record().get_by_id(claimed.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Done);
    assert!(record.processed_at.is_some());
    assert!(record.lease_owner.is_none());
    assert!(record.lease_expires_at.is_none());
}

#[tokio::test]
async fn test_transition_rejected_for_wrong_worker() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_change_event(&dal, "HB-2", "status_change").await;
    let claimed = claim_one(&dal, "worker-1").await;

    let err = dal
        .source_record()
        .mark_done(claimed.id, "impostor")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));

    // Record untouched.
    let record = dal.source_record().get_by_id(claimed.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Processing);
    assert_eq!(record.lease_owner.as_deref(), Some("worker-1"));
}

#[tokio::test]
async fn test_schedule_retry_defers_eligibility() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_change_event(&dal, "HB-3", "status_change").await;
    let claimed = claim_one(&dal, "worker-1").await;

    let next = UniversalTimestamp::now().plus(Duration::from_secs(120));
    dal.source_record()
        .schedule_retry(claimed.id, "worker-1", "notify: provider timeout", next)
        .await
        .unwrap();

    let record = dal.source_record().get_by_id(claimed.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.last_error.as_deref(), Some("notify: provider timeout"));
    assert!(record.lease_owner.is_none());
    assert_eq!(record.next_attempt_at, next);

    // Backed-off record is not claimable.
    let claimed_again = dal
        .source_record()
        .claim("worker-2", 10, LEASE)
        .await
        .unwrap();
    assert!(claimed_again.is_empty());
}

#[tokio::test]
async fn test_mark_failed_is_terminal_with_error() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_change_event(&dal, "HB-4", "status_change").await;
    let claimed = claim_one(&dal, "worker-1").await;

    dal.source_record()
        .mark_failed(claimed.id, "worker-1", "malformed_payload: bad json")
        .await
        .unwrap();

    let record = dal.source_record().get_by_id(claimed.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(
        record.last_error.as_deref(),
        Some("malformed_payload: bad json")
    );
    assert!(record.lease_owner.is_none());
}

#[tokio::test]
async fn test_requeue_resets_terminal_records() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_change_event(&dal, "HB-5", "status_change").await;
    let claimed = claim_one(&dal, "worker-1").await;
    dal.source_record()
        .mark_failed(claimed.id, "worker-1", "extractor: unreadable scan")
        .await
        .unwrap();

    dal.source_record().requeue(claimed.id).await.unwrap();

    let record = dal.source_record().get_by_id(claimed.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.attempts, 0, "requeue grants a fresh budget");
    assert!(record.last_error.is_none());
    assert!(record.processed_at.is_none());

    // Requeue from Done works the same way.
    let reclaimed = claim_one(&dal, "worker-1").await;
    dal.source_record()
        .mark_done(reclaimed.id, "worker-1")
        .await
        .unwrap();
    dal.source_record().requeue(claimed.id).await.unwrap();
    let record = dal.source_record().get_by_id(claimed.id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
}

#[tokio::test]
async fn test_requeue_rejects_live_records() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let pending = seed_change_event(&dal, "HB-6", "status_change").await;
    let err = dal.source_record().requeue(pending.id).await.unwrap_err();
    match err {
        StorageError::InvalidTransition { reason, .. } => {
            assert!(reason.contains("Pending"), "unexpected reason: {}", reason)
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }

    let claimed = claim_one(&dal, "worker-1").await;
    let err = dal.source_record().requeue(claimed.id).await.unwrap_err();
    match err {
        StorageError::InvalidTransition { reason, .. } => {
            assert!(
                reason.contains("Processing"),
                "unexpected reason: {}",
                reason
            )
        }
        other => panic!("expected InvalidTransition, got {:?}", other),
    }
}

#[tokio::test]
async fn test_requeue_missing_record_is_not_found() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let err = dal
        .source_record()
        .requeue(UniversalUuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn test_status_counts() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    for i in 0..3 {
        seed_change_event(&dal, &format!("HB-{}", i), "status_change").await;
    }
    let claimed = claim_one(&dal, "worker-1").await;
    dal.source_record()
        .mark_done(claimed.id, "worker-1")
        .await
        .unwrap();
    let claimed = claim_one(&dal, "worker-1").await;

    let counts = dal.source_record().status_counts().await.unwrap();
    assert_eq!(counts.get(&RecordStatus::Pending), Some(&1));
    assert_eq!(counts.get(&RecordStatus::Processing), Some(&1));
    assert_eq!(counts.get(&RecordStatus::Done), Some(&1));
    assert_eq!(counts.get(&RecordStatus::Failed), None);
    assert_eq!(claimed.status, RecordStatus::Processing);
}
