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

//! Checkpointed, backward-paginated sync drivers.
//!
//! A driver walks a resource's transaction history from its checkpoint (or
//! the chain head) toward genesis, one page at a time, applying events and
//! advancing the checkpoint after every non-empty page. Termination is
//! structural: a page shorter than the requested size means there is no
//! earlier history. Cancellation is checked at the top of every iteration.

pub mod collection;
pub mod pool;

pub use collection::CollectionSyncService;
pub use pool::PoolSyncService;

use tonpool_events::Transaction;

/// Sync tuning shared by both drivers.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Page size requested from the provider; a shorter page ends the walk.
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

/// Pages must be newest-first and sit strictly below the pointer. Anything
/// else means the provider reordered history under us; the pass must fail
/// without advancing its checkpoint so the next tick re-fetches the range.
pub(crate) fn check_batch_ordering(
    pointer: Option<u64>,
    batch: &[Transaction],
) -> anyhow::Result<()> {
    let mut bound = pointer;
    for trx in batch {
        if let Some(bound) = bound {
            if trx.lt >= bound {
                anyhow::bail!(
                    "provider returned out-of-order transaction, lt = {} is not below {} (hash = {})",
                    trx.lt,
                    bound,
                    trx.hash
                );
            }
        }
        bound = Some(trx.lt);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trx(lt: u64) -> Transaction {
        Transaction {
            hash: format!("t{lt}"),
            lt,
            success: true,
            utime: 0,
            in_msg: None,
            out_msgs: vec![],
        }
    }

    #[test]
    fn descending_batch_below_pointer_is_accepted() {
        assert!(check_batch_ordering(Some(100), &[trx(90), trx(80), trx(70)]).is_ok());
        assert!(check_batch_ordering(None, &[trx(90), trx(80)]).is_ok());
        assert!(check_batch_ordering(Some(100), &[]).is_ok());
    }

    #[test]
    fn batch_at_or_above_pointer_is_rejected() {
        assert!(check_batch_ordering(Some(100), &[trx(100)]).is_err());
        assert!(check_batch_ordering(Some(100), &[trx(90), trx(95)]).is_err());
    }
}
