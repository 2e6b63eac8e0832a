// Copyright 2025 Tonpool Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exclusive, auto-expiring leases on resource keys.
//!
//! The lock service is the sole arbiter of cross-process mutual exclusion;
//! everything above it only distinguishes "somebody else holds the key"
//! (skip this tick) from "my lease expired mid-task" (cooperative stop,
//! signaled through [`Lease::lost`]).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock on {0} is held by another process")]
    Contended(String),

    #[error("lock backend failure: {0}")]
    Backend(String),
}

/// A held lease. Dropping it releases the key; [`Lease::lost`] fires if the
/// backend expires the lease before release.
#[derive(Debug)]
pub struct Lease {
    key: String,
    lost: CancellationToken,
    release_tx: Option<oneshot::Sender<()>>,
}

impl Lease {
    pub fn new(key: impl Into<String>, lost: CancellationToken, release_tx: oneshot::Sender<()>) -> Self {
        Self { key: key.into(), lost, release_tx: Some(release_tx) }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fires when the backend considers the lease expired while still held.
    pub fn lost(&self) -> &CancellationToken {
        &self.lost
    }

    pub fn release(mut self) {
        if let Some(tx) = self.release_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A single acquisition attempt per call; retry policy lives in the caller.
#[async_trait]
pub trait LockService: Send + Sync {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Lease, LockError>;
}

/// In-process lock table with TTL expiry. Backs tests and single-process
/// deployments; fleet deployments plug a shared backend behind the same
/// trait.
#[derive(Default)]
pub struct LocalLockService {
    held: Arc<Mutex<HashMap<String, u64>>>,
    next_generation: AtomicU64,
}

#[async_trait]
impl LockService for LocalLockService {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Lease, LockError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut held = self.held.lock().unwrap();
            if held.contains_key(key) {
                return Err(LockError::Contended(key.to_string()));
            }
            held.insert(key.to_string(), generation);
        }

        let lost = CancellationToken::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let held = self.held.clone();
        let watchdog_key = key.to_string();
        let watchdog_lost = lost.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(ttl) => {
                    let expired = {
                        let mut held = held.lock().unwrap();
                        if held.get(&watchdog_key) == Some(&generation) {
                            held.remove(&watchdog_key);
                            true
                        } else {
                            false
                        }
                    };
                    if expired {
                        tracing::warn!(key = %watchdog_key, "lease expired before release");
                        watchdog_lost.cancel();
                    }
                }
                // Completes on explicit release and on lease drop alike.
                _ = release_rx => {
                    let mut held = held.lock().unwrap();
                    if held.get(&watchdog_key) == Some(&generation) {
                        held.remove(&watchdog_key);
                    }
                }
            }
        });

        Ok(Lease::new(key, lost, release_tx))
    }
}
