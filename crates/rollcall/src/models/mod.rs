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

//! Domain models shared across the DAL and worker layers.

pub mod delivery;
pub mod event;
pub mod source_record;
pub mod subscription;

pub use delivery::{DeliveryRecord, DeliveryStatus, NewDelivery};
pub use event::{ChangeEvent, ExtractionRequest, MemberVote, VoteTally};
pub use source_record::{NewSourceRecord, RecordKind, RecordStatus, SourceRecord};
pub use subscription::{Cadence, NewSubscription, Subscription};
