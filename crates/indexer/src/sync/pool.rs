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

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tonpool_events::{analyze_pool_batch, group_pool_events, PoolEvent, StakingPool};

use crate::db::SyncDbObj;
use crate::provider::{ProviderError, TransactionProvider};
use crate::sync::{check_batch_ordering, SyncConfig};

/// Syncs withdrawal and collection-discovery events for one staking pool.
pub struct PoolSyncService {
    provider: Arc<dyn TransactionProvider>,
    db: SyncDbObj,
    config: SyncConfig,
}

impl PoolSyncService {
    pub fn new(provider: Arc<dyn TransactionProvider>, db: SyncDbObj, config: SyncConfig) -> Self {
        Self { provider, db, config }
    }

    /// Walk the pool's history backward from its checkpoint (or the chain
    /// head) until a short page or cancellation. Completing the walk and
    /// stopping on cancellation are both non-error outcomes.
    pub async fn sync(&self, pool: &StakingPool, cancel: &CancellationToken) -> Result<()> {
        tracing::debug!(
            pool_id = pool.id,
            symbol = %pool.symbol,
            "staking pool transactions sync started"
        );

        let checkpoint = self.db.last_pool_checkpoint(pool.id).await?;
        let mut pointer: Option<u64> = checkpoint.map(|c| c.lt);

        loop {
            if cancel.is_cancelled() {
                tracing::info!(pool_id = pool.id, "cancellation observed, finishing sync early");
                return Ok(());
            }

            let batch = match self
                .provider
                .get_transactions(&pool.contract_addr, self.config.batch_size, pointer, cancel)
                .await
            {
                Ok(batch) => batch,
                Err(ProviderError::Cancelled) => {
                    tracing::info!(pool_id = pool.id, "fetch cancelled, finishing sync early");
                    return Ok(());
                }
                Err(err) => {
                    return Err(err).context("fetching staking pool transactions");
                }
            };

            tracing::debug!(
                pool_id = pool.id,
                fetched = batch.len(),
                limit = self.config.batch_size,
                pointer,
                newest_lt = batch.first().map(|t| t.lt),
                oldest_lt = batch.last().map(|t| t.lt),
                "staking pool sync iteration"
            );

            check_batch_ordering(pointer, &batch)?;

            let short_page = batch.len() < self.config.batch_size;
            let watermark = batch.last().map(|t| (t.lt, t.hash.clone()));

            let events = analyze_pool_batch(pool, &batch)?;
            self.apply_events(events).await?;

            // The checkpoint only advances after the batch's events are
            // durable; a crash in between merely replays idempotent writes.
            if let Some((lt, hash)) = watermark {
                self.db.save_pool_checkpoint(pool.id, lt, &hash).await?;
                pointer = Some(lt);
            }

            if short_page {
                break;
            }
        }

        tracing::debug!(
            pool_id = pool.id,
            symbol = %pool.symbol,
            "staking pool transactions sync finished"
        );
        Ok(())
    }

    /// Apply one batch of analyzed events. Kinds are written independently
    /// and concurrently; every write is insert-or-ignore on its dedup key,
    /// so re-delivery after a partial failure is harmless.
    pub async fn apply_events(&self, events: Vec<PoolEvent>) -> Result<()> {
        let grouped = group_pool_events(events);

        tokio::try_join!(
            self.db.insert_discovered_collections(&grouped.discovered),
            self.db.insert_immediate_withdrawals(&grouped.immediate_withdrawals),
            self.db.insert_withdrawal_requests(&grouped.withdrawal_requests),
        )?;

        Ok(())
    }
}
