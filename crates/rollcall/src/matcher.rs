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

//! The matching engine: pure predicate evaluation, no storage access.
//!
//! A subscription matches an event when every predicate field that is set
//! agrees with the event. An unset field is a wildcard; a subscription
//! with no fields set matches every event. The subject predicate matches
//! if it appears anywhere in the event's subject list. Inactive
//! subscriptions never match.

use crate::models::event::ChangeEvent;
use crate::models::subscription::Subscription;

/// Evaluates one subscription against one event.
pub fn matches(subscription: &Subscription, event: &ChangeEvent) -> bool {
    if !subscription.active {
        return false;
    }

    if let Some(ref bill_id) = subscription.bill_id {
        if *bill_id != event.bill_id {
            return false;
        }
    }

    if let Some(ref chamber) = subscription.chamber {
        if event.chamber.as_deref() != Some(chamber.as_str()) {
            return false;
        }
    }

    if let Some(ref committee) = subscription.committee {
        if event.committee.as_deref() != Some(committee.as_str()) {
            return false;
        }
    }

    if let Some(ref subject) = subscription.subject {
        if !event.subjects.iter().any(|s| s == subject) {
            return false;
        }
    }

    if let Some(ref event_type) = subscription.event_type {
        if *event_type != event.event_type {
            return false;
        }
    }

    true
}

/// Filters a subscription set down to the ones matching `event`,
/// preserving input order.
pub fn matching_subscriptions<'a>(
    subscriptions: &'a [Subscription],
    event: &ChangeEvent,
) -> Vec<&'a Subscription> {
    subscriptions
        .iter()
        .filter(|subscription| matches(subscription, event))
        .collect()
}
