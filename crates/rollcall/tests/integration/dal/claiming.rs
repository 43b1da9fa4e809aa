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

//! Integration tests for atomic claiming and lease reclaim.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;

use crate::fixtures::{seed_change_event, TestDatabase};
use rollcall::database::UniversalTimestamp;
use rollcall::models::{NewSourceRecord, RecordKind, RecordStatus};

const LEASE: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_claim_transitions_record_and_sets_lease() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-1", "status_change").await;
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.attempts, 0);

    let claimed = dal
        .source_record()
        .claim("worker-1", 10, LEASE)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    let claimed = &claimed[0];
    assert_eq!(claimed.id, record.id);
    assert_eq!(claimed.status, RecordStatus::Processing);
    assert_eq!(claimed.attempts, 1);
    assert_eq!(claimed.lease_owner.as_deref(), Some("worker-1"));
    let lease_expires = claimed.lease_expires_at.expect("lease should be set");
    assert!(lease_expires > UniversalTimestamp::now());

    // Nothing left to claim.
    let again = dal
        .source_record()
        .claim("worker-2", 10, LEASE)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn test_single_record_claimed_by_exactly_one_racer() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-2", "status_change").await;

    let racers = 8;
    let barrier = Arc::new(Barrier::new(racers));
    let mut handles = Vec::new();
    for i in 0..racers {
        let dal = dal.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            dal.source_record()
                .claim(&format!("racer-{}", i), 10, LEASE)
                .await
                .unwrap()
        }));
    }

    let mut total = 0;
    for handle in handles {
        let claimed = handle.await.unwrap();
        for r in &claimed {
            assert_eq!(r.id, record.id);
        }
        total += claimed.len();
    }
    assert_eq!(total, 1, "exactly one racer may win the record");
}

#[tokio::test]
async fn test_batch_claims_never_overlap() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    for i in 0..6 {
        seed_change_event(&dal, &format!("HB-{}", i), "status_change").await;
    }

    let barrier = Arc::new(Barrier::new(3));
    let mut handles = Vec::new();
    for i in 0..3 {
        let dal = dal.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            dal.source_record()
                .claim(&format!("worker-{}", i), 3, LEASE)
                .await
                .unwrap()
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for record in handle.await.unwrap() {
            assert!(seen.insert(record.id), "record {} claimed twice", record.id);
            total += 1;
        }
    }
    assert_eq!(total, 6);
}

#[tokio::test]
async fn test_future_next_attempt_at_is_skipped() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let deferred = NewSourceRecord {
        kind: RecordKind::ChangeEvent,
        payload: r#"{"bill_id":"HB-9","event_type":"status_change"}"#.to_string(),
        next_attempt_at: Some(UniversalTimestamp::now().plus(Duration::from_secs(3600))),
    };
    dal.source_record().create(deferred).await.unwrap();

    let claimed = dal
        .source_record()
        .claim("worker-1", 10, LEASE)
        .await
        .unwrap();
    assert!(claimed.is_empty(), "deferred record must not be claimable yet");
}

#[tokio::test]
async fn test_claim_takes_oldest_eligible_first() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let newer = NewSourceRecord {
        kind: RecordKind::ChangeEvent,
        payload: r#"{"bill_id":"HB-new","event_type":"status_change"}"#.to_string(),
        next_attempt_at: Some(UniversalTimestamp(
            chrono::Utc::now() - chrono::Duration::seconds(5),
        )),
    };
    let older = NewSourceRecord {
        kind: RecordKind::ChangeEvent,
        payload: r#"{"bill_id":"HB-old","event_type":"status_change"}"#.to_string(),
        next_attempt_at: Some(UniversalTimestamp(
            chrono::Utc::now() - chrono::Duration::seconds(60),
        )),
    };
    dal.source_record().create(newer).await.unwrap();
    let older = dal.source_record().create(older).await.unwrap();

    let claimed = dal
        .source_record()
        .claim("worker-1", 1, LEASE)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, older.id);
}

#[tokio::test]
async fn test_reclaim_returns_expired_lease_without_charging_attempts() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-3", "status_change").await;

    // Claim with an already-elapsed lease to simulate a crashed worker.
    let claimed = dal
        .source_record()
        .claim("doomed-worker", 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].attempts, 1);

    tokio::time::sleep(Duration::from_millis(20)).await;

    let reclaimed = dal.source_record().reclaim_expired().await.unwrap();
    assert_eq!(reclaimed.len(), 1);

    let reclaimed = &reclaimed[0];
    assert_eq!(reclaimed.id, record.id);
    assert_eq!(reclaimed.status, RecordStatus::Pending);
    assert_eq!(reclaimed.attempts, 1, "reclaim must not charge an attempt");
    assert!(reclaimed.lease_owner.is_none());
    assert!(reclaimed.lease_expires_at.is_none());

    // Immediately claimable again.
    let reclaimed_claim = dal
        .source_record()
        .claim("worker-2", 10, LEASE)
        .await
        .unwrap();
    assert_eq!(reclaimed_claim.len(), 1);
    assert_eq!(reclaimed_claim[0].attempts, 2);
}

#[tokio::test]
async fn test_reclaim_leaves_live_leases_alone() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    seed_change_event(&dal, "HB-4", "status_change").await;
    let claimed = dal
        .source_record()
        .claim("healthy-worker", 10, LEASE)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);

    let reclaimed = dal.source_record().reclaim_expired().await.unwrap();
    assert!(reclaimed.is_empty());

    let record = dal.source_record().get_by_id(claimed[0].id).await.unwrap();
    assert_eq!(record.status, RecordStatus::Processing);
    assert_eq!(record.lease_owner.as_deref(), Some("healthy-worker"));
}
