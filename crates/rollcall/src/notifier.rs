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

//! The notifier collaborator seam.
//!
//! The queue never talks to email/SMS providers directly; it hands each
//! owed delivery to a `Notifier` and translates the result into ledger
//! state. Implementations must report failure through the returned
//! `DispatchError`, split by whether a retry could ever help.

use async_trait::async_trait;

use crate::error::DispatchError;
use crate::models::event::ChangeEvent;
use crate::models::subscription::Subscription;

/// Sends one notification to one subscriber.
///
/// Implementations should be idempotent-friendly but are not required to
/// deduplicate; the delivery ledger guarantees each (subscription, event)
/// pair is only ever driven to success once.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        subscription: &Subscription,
        event: &ChangeEvent,
    ) -> Result<(), DispatchError>;
}
