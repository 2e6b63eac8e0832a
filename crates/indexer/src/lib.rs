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

//! Blockchain sync core for TON staking pools.
//!
//! Ingests pool and payout-collection transaction history through a
//! checkpointed backward-pagination loop, turns transactions into typed
//! events ([`tonpool_events`]) and applies them idempotently. A
//! lock-guarded task runner keeps each resource synced by at most one
//! process across a fleet.

pub mod db;
pub mod lock;
pub mod provider;
pub mod runner;
pub mod sync;

pub use db::{StakingSyncDb, SyncDb, SyncDbObj};
pub use lock::{Lease, LocalLockService, LockError, LockService};
pub use provider::{ProviderError, TonApiClient, TonApiConfig, TransactionProvider};
pub use runner::{DistributedTaskRunner, RunOptions};
pub use sync::{CollectionSyncService, PoolSyncService, SyncConfig};
