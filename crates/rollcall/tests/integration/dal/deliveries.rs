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

//! Integration tests for the idempotent delivery ledger.

use std::sync::Arc;

use tokio::sync::Barrier;

use crate::fixtures::{seed_bill_subscription, seed_change_event, TestDatabase};
use rollcall::models::{DeliveryStatus, NewDelivery};

#[tokio::test]
async fn test_ensure_queued_is_idempotent() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-1", "status_change").await;
    let subscription = seed_bill_subscription(&dal, "jo", "HB-1").await;

    let pair = NewDelivery {
        subscription_id: subscription.id,
        source_record_id: record.id,
    };

    let first = dal.delivery().ensure_queued(pair.clone()).await.unwrap();
    assert_eq!(first.status, DeliveryStatus::Queued);
    assert_eq!(first.attempts, 0);

    for _ in 0..3 {
        let again = dal.delivery().ensure_queued(pair.clone()).await.unwrap();
        assert_eq!(again.id, first.id);
    }

    let all = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_ensure_queued_concurrent_creates_one_row() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-2", "status_change").await;
    let subscription = seed_bill_subscription(&dal, "jo", "HB-2").await;

    let racers = 8;
    let barrier = Arc::new(Barrier::new(racers));
    let mut handles = Vec::new();
    for _ in 0..racers {
        let dal = dal.clone();
        let barrier = barrier.clone();
        let pair = NewDelivery {
            subscription_id: subscription.id,
            source_record_id: record.id,
        };
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            dal.delivery().ensure_queued(pair).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all racers must land on the same ledger row");

    let all = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_repeated_fanout_yields_one_row_per_subscription() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-3", "status_change").await;
    let subs = vec![
        seed_bill_subscription(&dal, "a", "HB-3").await,
        seed_bill_subscription(&dal, "b", "HB-3").await,
        seed_bill_subscription(&dal, "c", "HB-3").await,
    ];

    // Two full fan-out passes, as if the record were retried.
    for _ in 0..2 {
        for sub in &subs {
            dal.delivery()
                .ensure_queued(NewDelivery {
                    subscription_id: sub.id,
                    source_record_id: record.id,
                })
                .await
                .unwrap();
        }
    }

    let all = dal.delivery().list_for_record(record.id).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_mark_sent_settles_and_survives_requeue() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-4", "status_change").await;
    let subscription = seed_bill_subscription(&dal, "jo", "HB-4").await;

    let pair = NewDelivery {
        subscription_id: subscription.id,
        source_record_id: record.id,
    };
    let delivery = dal.delivery().ensure_queued(pair.clone()).await.unwrap();

    dal.delivery().mark_sent(delivery.id).await.unwrap();

    // A later pass sees the settled row, not a fresh one.
    let again = dal.delivery().ensure_queued(pair).await.unwrap();
    assert_eq!(again.id, delivery.id);
    assert_eq!(again.status, DeliveryStatus::Sent);
    assert_eq!(again.attempts, 1);
    assert!(again.sent_at.is_some());
    assert!(again.is_settled(3));
    assert!(!again.is_attemptable(3));
}

#[tokio::test]
async fn test_record_failure_tracks_budget() {
    let db = TestDatabase::new().await;
    let dal = db.dal();

    let record = seed_change_event(&dal, "HB-5", "status_change").await;
    let subscription = seed_bill_subscription(&dal, "jo", "HB-5").await;

    let delivery = dal
        .delivery()
        .ensure_queued(NewDelivery {
            subscription_id: subscription.id,
            source_record_id: record.id,
        })
        .await
        .unwrap();

    dal.delivery()
        .record_failure(delivery.id, "provider timeout", 1)
        .await
        .unwrap();

    let rows = dal.delivery().list_for_record(record.id).await.unwrap();
    let failed = &rows[0];
    assert_eq!(failed.status, DeliveryStatus::Failed);
    assert_eq!(failed.attempts, 1);
    assert_eq!(failed.error.as_deref(), Some("provider timeout"));
    assert!(failed.is_attemptable(3), "budget left, still retryable");
    assert!(!failed.is_settled(3));

    // Exhaust the budget in one write, as a permanent error would.
    dal.delivery()
        .record_failure(delivery.id, "mailbox does not exist", 3)
        .await
        .unwrap();
    let rows = dal.delivery().list_for_record(record.id).await.unwrap();
    assert!(rows[0].is_settled(3));
    assert!(!rows[0].is_attemptable(3));
}
