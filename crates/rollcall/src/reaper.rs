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

//! The lease reaper: crash recovery for abandoned claims.
//!
//! A worker that dies mid-processing leaves its records in Processing
//! with a lease that will expire. The reaper periodically sweeps those
//! back to Pending so another worker can pick them up. It is safe to run
//! multiple reapers; the conditional update means each expired record is
//! reclaimed once.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::dal::DAL;
use crate::error::WorkerError;

/// Reaper loop configuration.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between sweeps.
    pub sweep_interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Returns expired Processing records to the queue.
pub struct LeaseReaper {
    dal: DAL,
    config: ReaperConfig,
}

impl LeaseReaper {
    pub fn new(dal: DAL, config: ReaperConfig) -> Self {
        Self { dal, config }
    }

    /// One sweep. Returns how many records were reclaimed.
    pub async fn sweep_once(&self) -> Result<usize, WorkerError> {
        let reclaimed = self.dal.source_record().reclaim_expired().await?;

        for record in &reclaimed {
            warn!(
                record_id = %record.id,
                attempts = record.attempts,
                "Reclaimed record with expired lease"
            );
        }
        Ok(reclaimed.len())
    }

    /// Runs the sweep loop until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            "Lease reaper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Lease reaper shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "Lease sweep failed");
                    }
                }
            }
        }
    }
}
