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

//! Operation codes of the staking pool contract family.

/// Operations the sync core recognizes in pool and collection message
/// flows. The pool contracts emit more op codes than these; everything
/// else is not of interest to event analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolOp {
    /// Round bookkeeping poke; a collection sends it back to the pool once
    /// fully paid out.
    Touch,
    Deposit,
    /// Withdrawal request arriving at the pool.
    Withdraw,
    /// Instant transfer of principal + reward back to the requesting wallet.
    ImmediateWithdrawal,
    /// Pool minting payout shares: to the round's payout collection, or
    /// back to the requester when the withdrawal is rolled back.
    PayoutMint,
    /// Burn notification arriving at a payout collection.
    BurnNotification,
    /// Collection transferring a fulfilled withdrawal to the wallet.
    NftPayout,
}

impl PoolOp {
    pub fn from_op_code(code: u32) -> Option<Self> {
        match code {
            0x4bc7c2df => Some(Self::Touch),
            0x47d54391 => Some(Self::Deposit),
            0x319b0cdc => Some(Self::Withdraw),
            0x0a77535c => Some(Self::ImmediateWithdrawal),
            0x1674b0a0 => Some(Self::PayoutMint),
            0xed58b0b2 => Some(Self::BurnNotification),
            0xdb3b8abd => Some(Self::NftPayout),
            _ => None,
        }
    }
}

/// Stable numeric event ids, persisted with withdrawal rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EventKind {
    /// Pool satisfied the request instantly out of free balance.
    ImmediateWithdrawal = 1,
    /// Request carried the rollback flag and the pool re-minted the burned
    /// shares back to the requester.
    AbortedWithdrawal = 2,
    /// Deferred withdrawal; fulfilled by a collection payout when the pool
    /// round ends.
    WithdrawalRequest = 3,
    /// A payout collection observed in pool traffic. One collection is
    /// deployed per round, so duplicates are expected and deduplicated on
    /// apply.
    NftCollectionDiscovered = 4,
    NftCollectionDrained = 5,
    NftCollectionPayout = 6,
}

impl EventKind {
    pub fn type_id(self) -> i32 {
        self as i32
    }
}
