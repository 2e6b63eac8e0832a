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

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tonpool_events::{AccountRef, DecodedBody, Message, StakingPool, Transaction};
use tonpool_indexer::{ProviderError, SyncDb, SyncDbObj, TransactionProvider};

pub const POOL_ADDR: &str = "0:pool";
pub const SHARE_MASTER: &str = "0:share-master";
pub const WALLET: &str = "0:wallet";
pub const COLLECTION_ADDR: &str = "0:collection";

/// Temp-file sqlite database; keep the file handle alive for the test's
/// duration.
pub async fn setup_db() -> (SyncDbObj, NamedTempFile) {
    let temp_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_url = format!("sqlite:{}", temp_file.path().display());
    let db: SyncDbObj = Arc::new(SyncDb::new(&db_url).await.expect("Failed to create database"));
    (db, temp_file)
}

pub fn test_pool(id: i64) -> StakingPool {
    StakingPool {
        id,
        name: "Test Pool".into(),
        symbol: "TP".into(),
        contract_addr: POOL_ADDR.into(),
        is_native: true,
        disabled: false,
    }
}

/// Provider scripted with one page per `before_lt` value; unknown pointers
/// return an empty page. Counts fetches for pagination assertions.
pub struct ScriptedProvider {
    pages: Mutex<HashMap<Option<u64>, Vec<Transaction>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self { pages: Mutex::new(HashMap::new()), calls: AtomicUsize::new(0) }
    }

    pub fn add_page(&self, before_lt: Option<u64>, transactions: Vec<Transaction>) {
        self.pages.lock().unwrap().insert(before_lt, transactions);
    }

    pub fn fetch_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionProvider for ScriptedProvider {
    async fn get_transactions(
        &self,
        _account_addr: &str,
        _limit: usize,
        before_lt: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Transaction>, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.lock().unwrap().get(&before_lt).cloned().unwrap_or_default())
    }
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

/// Successful withdrawal satisfied instantly with `value` nanotons.
pub fn immediate_withdrawal_trx(hash: &str, lt: u64, requested: u128, value: u64) -> Transaction {
    Transaction {
        hash: hash.into(),
        lt,
        success: true,
        utime: 1_716_910_000,
        in_msg: Some(withdraw_in_msg(requested)),
        out_msgs: vec![Message {
            op_code: Some(0x0a77535c),
            destination: Some(AccountRef { address: WALLET.into() }),
            value,
            ..Default::default()
        }],
    }
}

/// Withdrawal that failed on-chain; analysis must skip it.
pub fn failed_withdrawal_trx(hash: &str, lt: u64, requested: u128) -> Transaction {
    Transaction {
        hash: hash.into(),
        lt,
        success: false,
        utime: 1_716_910_000,
        in_msg: Some(withdraw_in_msg(requested)),
        out_msgs: vec![],
    }
}

/// Deferred withdrawal minting into `collection_addr`.
pub fn delayed_withdrawal_trx(
    hash: &str,
    lt: u64,
    requested: u128,
    collection_addr: &str,
) -> Transaction {
    Transaction {
        hash: hash.into(),
        lt,
        success: true,
        utime: 1_716_910_000,
        in_msg: Some(withdraw_in_msg(requested)),
        out_msgs: vec![Message {
            op_code: Some(0x1674b0a0),
            destination: Some(AccountRef { address: collection_addr.into() }),
            ..Default::default()
        }],
    }
}

/// Burn notification on a collection: payout of `value` nanotons for a
/// `requested` burn, optionally followed by the touch that drains it.
pub fn burn_trx(hash: &str, lt: u64, requested: u128, value: u64, with_touch: bool) -> Transaction {
    let mut out_msgs = vec![Message {
        op_code: Some(0xdb3b8abd),
        destination: Some(AccountRef { address: WALLET.into() }),
        value,
        ..Default::default()
    }];
    if with_touch {
        out_msgs.push(Message {
            op_code: Some(0x4bc7c2df),
            destination: Some(AccountRef { address: POOL_ADDR.into() }),
            ..Default::default()
        });
    }

    Transaction {
        hash: hash.into(),
        lt,
        success: true,
        utime: 1_716_920_000,
        in_msg: Some(Message {
            op_code: Some(0xed58b0b2),
            created_at: 1_716_920_000,
            decoded_body: Some(DecodedBody {
                from_address: None,
                jetton_amount: None,
                amount: Some(requested),
            }),
            ..Default::default()
        }),
        out_msgs,
    }
}

/// Transaction with an unrelated op code; analysis ignores it.
pub fn deposit_trx(hash: &str, lt: u64) -> Transaction {
    Transaction {
        hash: hash.into(),
        lt,
        success: true,
        utime: 1_716_910_000,
        in_msg: Some(Message { op_code: Some(0x47d54391), ..Default::default() }),
        out_msgs: vec![],
    }
}
