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

//! Rollcall: a database-backed job queue for legislative tracking.
//!
//! Rollcall turns a relational table of source records into a safe,
//! retryable work queue. Ingestion inserts rows describing legislative
//! change events and scanned vote sheets; workers claim them atomically,
//! fan change events out to matching subscriptions through an idempotent
//! delivery ledger, and drive vote-tally extraction. Records move through
//! a bounded state machine (Pending, Processing, Done, Failed) with
//! exponential-backoff retries, lease-based crash recovery, and operator
//! requeue from the terminal states.
//!
//! Runs against PostgreSQL for shared deployments or SQLite for local
//! ones; the backend is picked at runtime from the connection URL.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rollcall::dal::DAL;
//! use rollcall::database::Database;
//! use rollcall::models::RecordKind;
//! use rollcall::processors::{ChangeEventProcessor, ExtractionProcessor, ProcessorRegistry};
//! use rollcall::worker::{QueueWorker, WorkerConfig};
//!
//! let db = Database::new("rollcall.db", 10);
//! db.run_migrations().await?;
//! let dal = DAL::new(db);
//!
//! let registry = ProcessorRegistry::new()
//!     .register(
//!         RecordKind::ChangeEvent,
//!         Arc::new(ChangeEventProcessor::new(dal.clone(), notifier, 3)),
//!     )
//!     .register(
//!         RecordKind::ExtractionRequest,
//!         Arc::new(ExtractionProcessor::new(extractor)),
//!     );
//!
//! let worker = QueueWorker::new(dal, WorkerConfig::default(), registry);
//! worker.run(shutdown_rx).await;
//! ```

pub mod dal;
pub mod database;
pub mod error;
pub mod extractor;
pub mod matcher;
pub mod models;
pub mod notifier;
pub mod processors;
pub mod reaper;
pub mod retry;
pub mod worker;

pub use dal::DAL;
pub use database::{Database, UniversalTimestamp, UniversalUuid};
pub use error::{DispatchError, ProcessError, StorageError, WorkerError};
pub use extractor::Extractor;
pub use models::{
    Cadence, ChangeEvent, DeliveryRecord, DeliveryStatus, ExtractionRequest, NewDelivery,
    NewSourceRecord, NewSubscription, RecordKind, RecordStatus, SourceRecord, Subscription,
    VoteTally,
};
pub use notifier::Notifier;
pub use processors::{ChangeEventProcessor, ExtractionProcessor, ProcessorRegistry, RecordProcessor};
pub use reaper::{LeaseReaper, ReaperConfig};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use worker::{QueueWorker, WorkerConfig};
