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

//! Transaction-to-event analysis.
//!
//! Pure and deterministic: a `(resource, transaction)` pair maps to zero or
//! more events, no I/O. Unrecognized transaction shapes are logged and
//! skipped so a single odd transaction never blocks a resource's sync.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::events::{
    CollectionDiscoveredEvent, CollectionDrainedEvent, CollectionEvent, CollectionPayoutEvent,
    GroupedCollectionEvents, GroupedPoolEvents, PoolEvent, WithdrawalEvent,
};
use crate::model::{Message, NftCollection, StakingPool, Transaction};
use crate::ops::PoolOp;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("analyzing non-native (jetton) staking pools is not supported yet, pool_id = {pool_id}")]
    UnsupportedPoolKind { pool_id: i64 },
}

/// Classify a transaction's outbound messages once, keyed by recognized op.
/// First message per op wins, matching provider message order.
fn index_outbound(out_msgs: &[Message]) -> HashMap<PoolOp, &Message> {
    let mut by_op = HashMap::new();
    for msg in out_msgs {
        if let Some(op) = msg.op_code.and_then(PoolOp::from_op_code) {
            by_op.entry(op).or_insert(msg);
        }
    }
    by_op
}

fn inbound_op(msg: &Message) -> Option<PoolOp> {
    msg.op_code.and_then(PoolOp::from_op_code)
}

/// Analyze one staking pool transaction.
///
/// Immediate, delayed and rolled-back withdrawals all arrive with the same
/// inbound op code; the outbound messages decide which case it is:
/// an immediate-withdrawal transfer pays the wallet instantly, a payout
/// mint back to the requester re-mints the burned shares (rollback), and a
/// payout mint anywhere else defers the withdrawal to that round's payout
/// collection.
pub fn analyze_pool_transaction(
    pool: &StakingPool,
    trx: &Transaction,
) -> Result<Vec<PoolEvent>, AnalyzeError> {
    if !pool.is_native {
        return Err(AnalyzeError::UnsupportedPoolKind { pool_id: pool.id });
    }

    let Some(in_msg) = trx.in_msg.as_ref() else {
        return Ok(Vec::new());
    };
    if inbound_op(in_msg) != Some(PoolOp::Withdraw) {
        return Ok(Vec::new());
    }

    if !trx.success {
        // Unsuccessful on-chain execution is a normal terminal outcome.
        tracing::warn!(
            hash = %trx.hash,
            pool_id = pool.id,
            "unsuccessful withdrawal transaction, skipping"
        );
        return Ok(Vec::new());
    }

    let outbound = index_outbound(&trx.out_msgs);
    let requested = in_msg.decoded_body.as_ref().and_then(|b| b.jetton_amount).unwrap_or(0);
    let wallet_addr = in_msg.decoded_body.as_ref().and_then(|b| b.from_address.clone());

    let withdrawal = |reward_amount: u128| WithdrawalEvent {
        pool_id: pool.id,
        pool_addr: pool.contract_addr.clone(),
        hash: trx.hash.clone(),
        lt: trx.lt,
        created_at: in_msg.created_at,
        wallet_addr: wallet_addr.clone(),
        requested_amount: requested,
        reward_amount,
    };

    if let Some(transfer) = outbound.get(&PoolOp::ImmediateWithdrawal) {
        let full = transfer.value as u128;
        return Ok(vec![PoolEvent::ImmediateWithdrawal(withdrawal(full.saturating_sub(requested)))]);
    }

    let Some(payout_mint) = outbound.get(&PoolOp::PayoutMint) else {
        tracing::warn!(
            hash = %trx.hash,
            pool_id = pool.id,
            "withdrawal transaction without payout or transfer message, skipping"
        );
        return Ok(Vec::new());
    };

    let Some(mint_dest) = payout_mint.destination.as_ref() else {
        tracing::warn!(
            hash = %trx.hash,
            pool_id = pool.id,
            "payout mint without destination address, skipping"
        );
        return Ok(Vec::new());
    };

    // The inbound source is the share master that burned the user's shares.
    // A mint addressed back to it re-mints those shares: rollback.
    let is_rollback =
        in_msg.source.as_ref().map(|s| s.address.as_str()) == Some(mint_dest.address.as_str());
    if is_rollback {
        return Ok(vec![PoolEvent::AbortedWithdrawal(withdrawal(0))]);
    }

    Ok(vec![
        PoolEvent::WithdrawalRequest(withdrawal(0)),
        PoolEvent::NftCollectionDiscovered(CollectionDiscoveredEvent {
            pool_id: pool.id,
            pool_addr: pool.contract_addr.clone(),
            hash: trx.hash.clone(),
            lt: trx.lt,
            created_at: in_msg.created_at,
            collection_addr: mint_dest.address.clone(),
        }),
    ])
}

/// Analyze one payout collection transaction. Only burn notifications are
/// of interest: they carry the payout transfer and, once the collection is
/// exhausted, a touch back to the pool.
pub fn analyze_collection_transaction(
    pool: &StakingPool,
    collection: &NftCollection,
    trx: &Transaction,
) -> Result<Vec<CollectionEvent>, AnalyzeError> {
    if !pool.is_native {
        return Err(AnalyzeError::UnsupportedPoolKind { pool_id: pool.id });
    }

    let Some(in_msg) = trx.in_msg.as_ref() else {
        return Ok(Vec::new());
    };
    if inbound_op(in_msg) != Some(PoolOp::BurnNotification) {
        return Ok(Vec::new());
    }

    let outbound = index_outbound(&trx.out_msgs);
    let mut events = Vec::new();

    if let Some(payout) = outbound.get(&PoolOp::NftPayout) {
        let requested = in_msg.decoded_body.as_ref().and_then(|b| b.amount).unwrap_or(0);
        let full = payout.value as u128;
        events.push(CollectionEvent::Payout(CollectionPayoutEvent {
            collection_id: collection.id,
            collection_addr: collection.addr.clone(),
            pool_id: pool.id,
            pool_addr: pool.contract_addr.clone(),
            hash: trx.hash.clone(),
            lt: trx.lt,
            created_at: in_msg.created_at,
            wallet_addr: payout.destination.as_ref().map(|d| d.address.clone()),
            requested_amount: requested,
            reward_amount: full.saturating_sub(requested),
        }));
    } else {
        tracing::warn!(
            hash = %trx.hash,
            collection_id = collection.id,
            pool_id = pool.id,
            "burn notification without outbound payout message, skipping payout"
        );
    }

    if outbound.contains_key(&PoolOp::Touch) {
        events.push(CollectionEvent::Drained(CollectionDrainedEvent {
            collection_id: collection.id,
            collection_addr: collection.addr.clone(),
            pool_id: pool.id,
            pool_addr: pool.contract_addr.clone(),
            hash: trx.hash.clone(),
            lt: trx.lt,
            created_at: in_msg.created_at,
        }));
    }

    Ok(events)
}

/// Analyze a batch of pool transactions, flattening per-transaction results
/// in provider (newest-first) order.
pub fn analyze_pool_batch(
    pool: &StakingPool,
    trxs: &[Transaction],
) -> Result<Vec<PoolEvent>, AnalyzeError> {
    let mut events = Vec::new();
    for trx in trxs {
        events.extend(analyze_pool_transaction(pool, trx)?);
    }
    Ok(events)
}

/// Analyze a batch of collection transactions.
pub fn analyze_collection_batch(
    pool: &StakingPool,
    collection: &NftCollection,
    trxs: &[Transaction],
) -> Result<Vec<CollectionEvent>, AnalyzeError> {
    let mut events = Vec::new();
    for trx in trxs {
        events.extend(analyze_collection_transaction(pool, collection, trx)?);
    }
    Ok(events)
}

/// Bucket pool events per kind in a single pass. Several transactions in one
/// batch routinely discover the same collection; only the first mention per
/// address is kept (the store dedups across batches).
pub fn group_pool_events(events: Vec<PoolEvent>) -> GroupedPoolEvents {
    let mut grouped = GroupedPoolEvents::default();
    let mut seen_collections = HashSet::new();

    for event in events {
        match event {
            PoolEvent::NftCollectionDiscovered(e) => {
                if seen_collections.insert(e.collection_addr.clone()) {
                    grouped.discovered.push(e);
                }
            }
            PoolEvent::ImmediateWithdrawal(e) => grouped.immediate_withdrawals.push(e),
            PoolEvent::WithdrawalRequest(e) => grouped.withdrawal_requests.push(e),
            PoolEvent::AbortedWithdrawal(e) => grouped.aborted_withdrawals.push(e),
        }
    }

    grouped
}

/// Bucket collection events per kind. A collection drains at most once, so
/// extra drained events in one batch are collapsed to the first and logged.
pub fn group_collection_events(events: Vec<CollectionEvent>) -> GroupedCollectionEvents {
    let mut grouped = GroupedCollectionEvents::default();

    for event in events {
        match event {
            CollectionEvent::Payout(e) => grouped.payouts.push(e),
            CollectionEvent::Drained(e) => {
                if let Some(first) = &grouped.drained {
                    tracing::warn!(
                        collection_id = e.collection_id,
                        first_hash = %first.hash,
                        extra_hash = %e.hash,
                        "multiple drained events for one collection in a single batch"
                    );
                } else {
                    grouped.drained = Some(e);
                }
            }
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountRef, DecodedBody};

    const POOL_ADDR: &str = "0:pool";
    const SHARE_MASTER: &str = "0:share-master";
    const WALLET: &str = "0:wallet";

    fn native_pool() -> StakingPool {
        StakingPool {
            id: 1,
            name: "Test Pool".into(),
            symbol: "TP".into(),
            contract_addr: POOL_ADDR.into(),
            is_native: true,
            disabled: false,
        }
    }

    fn collection() -> NftCollection {
        NftCollection {
            id: 7,
            addr: "0:collection".into(),
            pool_id: 1,
            pool_addr: POOL_ADDR.into(),
            drained: false,
        }
    }

    fn msg(op: u32) -> Message {
        Message { op_code: Some(op), ..Default::default() }
    }

    fn withdraw_in_msg(requested: u128) -> Message {
        Message {
            op_code: Some(0x319b0cdc),
            source: Some(AccountRef { address: SHARE_MASTER.into() }),
            created_at: 1_716_910_000,
            decoded_body: Some(DecodedBody {
                from_address: Some(WALLET.into()),
                jetton_amount: Some(requested),
                amount: None,
            }),
            ..Default::default()
        }
    }

    fn trx(hash: &str, lt: u64, success: bool, in_msg: Message, out_msgs: Vec<Message>) -> Transaction {
        Transaction {
            hash: hash.into(),
            lt,
            success,
            utime: 1_716_910_000,
            in_msg: Some(in_msg),
            out_msgs,
        }
    }

    #[test]
    fn uninteresting_op_codes_yield_nothing() {
        let pool = native_pool();
        let deposit = trx("t1", 10, true, msg(0x47d54391), vec![]);
        assert!(analyze_pool_transaction(&pool, &deposit).unwrap().is_empty());

        let no_in_msg = Transaction {
            hash: "t2".into(),
            lt: 11,
            success: true,
            utime: 0,
            in_msg: None,
            out_msgs: vec![],
        };
        assert!(analyze_pool_transaction(&pool, &no_in_msg).unwrap().is_empty());
    }

    #[test]
    fn non_native_pool_is_rejected() {
        let pool = StakingPool { is_native: false, ..native_pool() };
        let t = trx("t1", 10, true, withdraw_in_msg(100), vec![]);
        let err = analyze_pool_transaction(&pool, &t).unwrap_err();
        assert!(matches!(err, AnalyzeError::UnsupportedPoolKind { pool_id: 1 }));
    }

    #[test]
    fn immediate_withdrawal_reward_is_value_minus_requested() {
        let pool = native_pool();
        let transfer = Message {
            op_code: Some(0x0a77535c),
            destination: Some(AccountRef { address: WALLET.into() }),
            value: 110,
            ..Default::default()
        };
        let t = trx("t1", 10, true, withdraw_in_msg(100), vec![transfer]);

        let events = analyze_pool_transaction(&pool, &t).unwrap();
        assert_eq!(events.len(), 1);
        let PoolEvent::ImmediateWithdrawal(e) = &events[0] else {
            panic!("expected immediate withdrawal, got {events:?}");
        };
        assert_eq!(e.requested_amount, 100);
        assert_eq!(e.reward_amount, 10);
        assert_eq!(e.wallet_addr.as_deref(), Some(WALLET));
    }

    #[test]
    fn unsuccessful_withdrawal_is_skipped() {
        let pool = native_pool();
        // Batch of two: successful immediate withdrawal + failed request.
        let transfer = Message {
            op_code: Some(0x0a77535c),
            value: 110,
            ..Default::default()
        };
        let batch = vec![
            trx("a", 20, true, withdraw_in_msg(100), vec![transfer]),
            trx("b", 10, false, withdraw_in_msg(50), vec![]),
        ];

        let events = analyze_pool_batch(&pool, &batch).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            PoolEvent::ImmediateWithdrawal(e) if e.requested_amount == 100 && e.reward_amount == 10
        ));
    }

    #[test]
    fn mint_back_to_source_is_a_rollback() {
        let pool = native_pool();
        let mint = Message {
            op_code: Some(0x1674b0a0),
            destination: Some(AccountRef { address: SHARE_MASTER.into() }),
            ..Default::default()
        };
        let t = trx("t1", 10, true, withdraw_in_msg(100), vec![mint]);

        let events = analyze_pool_transaction(&pool, &t).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], PoolEvent::AbortedWithdrawal(e) if e.requested_amount == 100));
    }

    #[test]
    fn mint_elsewhere_defers_and_discovers_the_collection() {
        let pool = native_pool();
        let mint = Message {
            op_code: Some(0x1674b0a0),
            destination: Some(AccountRef { address: "0:collection".into() }),
            ..Default::default()
        };
        let t = trx("t1", 10, true, withdraw_in_msg(100), vec![mint]);

        let events = analyze_pool_transaction(&pool, &t).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], PoolEvent::WithdrawalRequest(e) if e.reward_amount == 0));
        assert!(matches!(
            &events[1],
            PoolEvent::NftCollectionDiscovered(e) if e.collection_addr == "0:collection"
        ));
    }

    #[test]
    fn withdrawal_without_outbound_messages_is_skipped() {
        let pool = native_pool();
        let t = trx("t1", 10, true, withdraw_in_msg(100), vec![msg(0x4bc7c2df)]);
        assert!(analyze_pool_transaction(&pool, &t).unwrap().is_empty());
    }

    #[test]
    fn mint_without_destination_is_skipped() {
        let pool = native_pool();
        let mint = msg(0x1674b0a0);
        let t = trx("t1", 10, true, withdraw_in_msg(100), vec![mint]);
        assert!(analyze_pool_transaction(&pool, &t).unwrap().is_empty());
    }

    fn burn_in_msg(amount: u128) -> Message {
        Message {
            op_code: Some(0xed58b0b2),
            created_at: 1_716_920_000,
            decoded_body: Some(DecodedBody {
                from_address: None,
                jetton_amount: None,
                amount: Some(amount),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn burn_notification_yields_payout() {
        let pool = native_pool();
        let coll = collection();
        let payout = Message {
            op_code: Some(0xdb3b8abd),
            destination: Some(AccountRef { address: WALLET.into() }),
            value: 230,
            ..Default::default()
        };
        let t = trx("t1", 10, true, burn_in_msg(200), vec![payout]);

        let events = analyze_collection_transaction(&pool, &coll, &t).unwrap();
        assert_eq!(events.len(), 1);
        let CollectionEvent::Payout(e) = &events[0] else {
            panic!("expected payout, got {events:?}");
        };
        assert_eq!(e.requested_amount, 200);
        assert_eq!(e.reward_amount, 30);
        assert_eq!(e.wallet_addr.as_deref(), Some(WALLET));
    }

    #[test]
    fn touch_marks_the_collection_drained() {
        let pool = native_pool();
        let coll = collection();
        let payout = Message {
            op_code: Some(0xdb3b8abd),
            destination: Some(AccountRef { address: WALLET.into() }),
            value: 230,
            ..Default::default()
        };
        let t = trx("t1", 10, true, burn_in_msg(200), vec![payout, msg(0x4bc7c2df)]);

        let events = analyze_collection_transaction(&pool, &coll, &t).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], CollectionEvent::Payout(_)));
        assert!(matches!(&events[1], CollectionEvent::Drained(e) if e.collection_id == 7));
    }

    #[test]
    fn burn_without_payout_still_reports_drain() {
        let pool = native_pool();
        let coll = collection();
        let t = trx("t1", 10, true, burn_in_msg(200), vec![msg(0x4bc7c2df)]);

        let events = analyze_collection_transaction(&pool, &coll, &t).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CollectionEvent::Drained(_)));
    }

    #[test]
    fn grouping_dedups_discoveries_by_address() {
        let discovered = |hash: &str| {
            PoolEvent::NftCollectionDiscovered(CollectionDiscoveredEvent {
                pool_id: 1,
                pool_addr: POOL_ADDR.into(),
                hash: hash.into(),
                lt: 1,
                created_at: 0,
                collection_addr: "0:collection".into(),
            })
        };

        let grouped = group_pool_events(vec![discovered("a"), discovered("b")]);
        assert_eq!(grouped.discovered.len(), 1);
        assert_eq!(grouped.discovered[0].hash, "a");
    }

    #[test]
    fn grouping_keeps_first_drained_event() {
        let drained = |hash: &str| {
            CollectionEvent::Drained(CollectionDrainedEvent {
                collection_id: 7,
                collection_addr: "0:collection".into(),
                pool_id: 1,
                pool_addr: POOL_ADDR.into(),
                hash: hash.into(),
                lt: 1,
                created_at: 0,
            })
        };

        let grouped = group_collection_events(vec![drained("a"), drained("b")]);
        assert_eq!(grouped.drained.unwrap().hash, "a");
    }
}
