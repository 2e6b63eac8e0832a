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

//! Lock-guarded task execution across a process fleet.
//!
//! One runner instance serves many resource keys. Each `run_once` holds a
//! fleet-wide lease for the duration of the task and threads a cancellation
//! token that fires on lease loss and on runner shutdown. `stop` cancels
//! every in-flight task and waits for all of them to finish.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::lock::{Lease, LockError, LockService};

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct RunOptions<'a> {
    /// Best-effort skip consulted after the lock is held; the lock stays
    /// the actual correctness mechanism.
    pub should_run: Option<BoxFuture<'a, bool>>,
    /// Maximum lease duration; the task is cancelled if it outlives it.
    pub max_duration: Duration,
    /// Lock acquisition attempts before the tick is ceded to whoever holds
    /// the key.
    pub retry_count: u32,
}

impl Default for RunOptions<'_> {
    fn default() -> Self {
        Self { should_run: None, max_duration: Duration::from_secs(300), retry_count: 0 }
    }
}

pub struct DistributedTaskRunner {
    name: String,
    lock: Arc<dyn LockService>,
    shutting_down: AtomicBool,
    running: Mutex<HashMap<String, CancellationToken>>,
    tracker: TaskTracker,
}

impl DistributedTaskRunner {
    pub fn new(name: impl Into<String>, lock: Arc<dyn LockService>) -> Self {
        Self {
            name: name.into(),
            lock,
            shutting_down: AtomicBool::new(false),
            running: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Run `task` under an exclusive fleet-wide lease on `key`.
    ///
    /// Contention after the configured retries is a clean no-op: another
    /// process owns the resource this tick. Errors returned by the task
    /// itself propagate.
    pub async fn run_once<T, Fut>(&self, key: &str, task: T, options: RunOptions<'_>) -> Result<()>
    where
        T: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<()>> + Send,
    {
        let full_key = format!("{}:{}", self.name, key);

        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::debug!(runner = %self.name, key = %full_key, "runner is shutting down, skipping task");
            return Ok(());
        }

        let lease = match self
            .acquire_with_retries(&full_key, options.max_duration, options.retry_count)
            .await
        {
            Ok(lease) => lease,
            Err(LockError::Contended(_)) => {
                tracing::debug!(key = %full_key, "resource locked by another process, skipping this tick");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        // Re-check after the (possibly retried) acquisition: no new work
        // once shutdown started.
        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::debug!(runner = %self.name, key = %full_key, "runner is shutting down, skipping task");
            lease.release();
            return Ok(());
        }

        if let Some(should_run) = options.should_run {
            if !should_run.await {
                tracing::debug!(key = %full_key, "task was done recently, skipping");
                lease.release();
                return Ok(());
            }
        }

        // The task token observes lease loss through its parent and runner
        // shutdown through the bookkeeping map.
        let token = lease.lost().child_token();
        self.running.lock().unwrap().insert(full_key.clone(), token.clone());

        let result = self.tracker.track_future(task(token)).await;

        self.running.lock().unwrap().remove(&full_key);
        lease.release();
        result
    }

    async fn acquire_with_retries(
        &self,
        key: &str,
        ttl: Duration,
        retry_count: u32,
    ) -> Result<Lease, LockError> {
        let mut attempt = 0;
        loop {
            match self.lock.acquire(key, ttl).await {
                Err(LockError::Contended(_)) if attempt < retry_count => {
                    attempt += 1;
                    tokio::time::sleep(LOCK_RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    /// Cancel every tracked task and wait for all of them to finish.
    pub async fn stop(&self) {
        tracing::debug!(runner = %self.name, "start shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);

        for (key, token) in self.running.lock().unwrap().iter() {
            tracing::debug!(key = %key, "cancelling running task for shutdown");
            token.cancel();
        }

        self.tracker.close();
        self.tracker.wait().await;

        tracing::debug!(runner = %self.name, "shutdown complete");
    }
}
