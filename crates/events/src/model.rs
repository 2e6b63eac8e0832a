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

//! Resource descriptors and the wire-level transaction model.
//!
//! Transactions are deserialized straight from the provider's REST
//! responses. Addresses are carried as opaque strings in the provider's
//! canonical form; all comparisons happen between values the provider
//! itself produced.

use serde::{Deserialize, Deserializer};

/// A staking pool tracked for transaction sync.
#[derive(Debug, Clone)]
pub struct StakingPool {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub contract_addr: String,
    /// Pool holds the native asset directly. Jetton-wrapped pools exist
    /// on-chain but are not analyzable yet.
    pub is_native: bool,
    pub disabled: bool,
}

/// A payout NFT collection minted by a pool. One collection is deployed per
/// pool round, so these descriptors accumulate over a pool's lifetime.
#[derive(Debug, Clone)]
pub struct NftCollection {
    pub id: i64,
    pub addr: String,
    pub pool_id: i64,
    pub pool_addr: String,
    pub drained: bool,
}

/// An account transaction as returned by the provider, newest-first within
/// a page.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub lt: u64,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub utime: i64,
    #[serde(default)]
    pub in_msg: Option<Message>,
    #[serde(default)]
    pub out_msgs: Vec<Message>,
}

/// An internal message attached to a transaction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "de_op_code")]
    pub op_code: Option<u32>,
    #[serde(default)]
    pub source: Option<AccountRef>,
    #[serde(default)]
    pub destination: Option<AccountRef>,
    /// Attached value in nanotons.
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub decoded_body: Option<DecodedBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountRef {
    pub address: String,
}

/// Decoded message body fields the analyzer cares about. The provider
/// decodes bodies schemalessly; unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecodedBody {
    #[serde(default)]
    pub from_address: Option<String>,
    /// Burned pool-share amount on withdrawal requests.
    #[serde(default, deserialize_with = "de_amount")]
    pub jetton_amount: Option<u128>,
    /// Requested amount on collection burn notifications.
    #[serde(default, deserialize_with = "de_amount")]
    pub amount: Option<u128>,
}

/// Parse a `0x`-prefixed hex op code as the provider serializes it.
pub fn parse_op_code(raw: &str) -> Option<u32> {
    u32::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

fn de_op_code<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_op_code))
}

/// Amounts arrive either as JSON numbers or as decimal strings depending on
/// magnitude; unparseable values degrade to absent rather than failing the
/// whole page.
fn de_amount<'de, D>(deserializer: D) -> Result<Option<u128>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u128),
        Str(String),
    }

    let raw: Option<Raw> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Str(s)) => s.parse().ok(),
        None => None,
    })
}
