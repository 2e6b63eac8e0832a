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

//! Domain model and transaction analysis for TON staking pools.
//!
//! This crate is pure: it turns provider transactions into typed domain
//! events and groups them for application, but performs no I/O itself.

pub mod analyze;
pub mod events;
pub mod model;
pub mod ops;

pub use analyze::{
    analyze_collection_batch, analyze_collection_transaction, analyze_pool_batch,
    analyze_pool_transaction, group_collection_events, group_pool_events, AnalyzeError,
};

pub use events::{
    CollectionDiscoveredEvent, CollectionDrainedEvent, CollectionEvent, CollectionPayoutEvent,
    GroupedCollectionEvents, GroupedPoolEvents, PoolEvent, WithdrawalEvent,
};

pub use model::{AccountRef, DecodedBody, Message, NftCollection, StakingPool, Transaction};

pub use ops::{EventKind, PoolOp};
