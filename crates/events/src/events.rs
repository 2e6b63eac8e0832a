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

//! Typed domain events produced by transaction analysis.
//!
//! Events are value objects: derived from a single transaction, immutable,
//! applied to storage once and then dropped. Durability is the store's job.

/// Withdrawal-family event payload. `reward_amount` is zero for requests
/// and aborted withdrawals (the reward is only known once paid out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalEvent {
    pub pool_id: i64,
    pub pool_addr: String,
    pub hash: String,
    pub lt: u64,
    pub created_at: i64,
    pub wallet_addr: Option<String>,
    pub requested_amount: u128,
    pub reward_amount: u128,
}

/// A payout collection address observed in pool traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDiscoveredEvent {
    pub pool_id: i64,
    pub pool_addr: String,
    pub hash: String,
    pub lt: u64,
    pub created_at: i64,
    pub collection_addr: String,
}

/// Events produced by analyzing a pool transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    ImmediateWithdrawal(WithdrawalEvent),
    AbortedWithdrawal(WithdrawalEvent),
    WithdrawalRequest(WithdrawalEvent),
    NftCollectionDiscovered(CollectionDiscoveredEvent),
}

/// A collection fulfilling a deferred withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPayoutEvent {
    pub collection_id: i64,
    pub collection_addr: String,
    pub pool_id: i64,
    pub pool_addr: String,
    pub hash: String,
    pub lt: u64,
    pub created_at: i64,
    pub wallet_addr: Option<String>,
    pub requested_amount: u128,
    pub reward_amount: u128,
}

/// A collection that finished paying out its round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDrainedEvent {
    pub collection_id: i64,
    pub collection_addr: String,
    pub pool_id: i64,
    pub pool_addr: String,
    pub hash: String,
    pub lt: u64,
    pub created_at: i64,
}

/// Events produced by analyzing a collection transaction. A single burn
/// notification may legitimately yield both variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    Payout(CollectionPayoutEvent),
    Drained(CollectionDrainedEvent),
}

/// Pool events bucketed per kind for application. Built in one pass over
/// the flat analysis output; discovery events are already deduplicated by
/// collection address.
///
/// Aborted withdrawals are collected but have no write path yet.
#[derive(Debug, Default)]
pub struct GroupedPoolEvents {
    pub discovered: Vec<CollectionDiscoveredEvent>,
    pub immediate_withdrawals: Vec<WithdrawalEvent>,
    pub withdrawal_requests: Vec<WithdrawalEvent>,
    pub aborted_withdrawals: Vec<WithdrawalEvent>,
}

/// Collection events bucketed per kind for application. At most one drained
/// event survives grouping.
#[derive(Debug, Default)]
pub struct GroupedCollectionEvents {
    pub payouts: Vec<CollectionPayoutEvent>,
    pub drained: Option<CollectionDrainedEvent>,
}
