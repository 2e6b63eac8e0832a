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
use tonpool_events::{analyze_collection_batch, group_collection_events, CollectionEvent, NftCollection};

use crate::db::SyncDbObj;
use crate::provider::{ProviderError, TransactionProvider};
use crate::sync::{check_batch_ordering, SyncConfig};

/// Syncs payout and drain events for one payout NFT collection.
pub struct CollectionSyncService {
    provider: Arc<dyn TransactionProvider>,
    db: SyncDbObj,
    config: SyncConfig,
}

impl CollectionSyncService {
    pub fn new(provider: Arc<dyn TransactionProvider>, db: SyncDbObj, config: SyncConfig) -> Self {
        Self { provider, db, config }
    }

    pub async fn sync(&self, collection: &NftCollection, cancel: &CancellationToken) -> Result<()> {
        tracing::debug!(
            collection_id = collection.id,
            addr = %collection.addr,
            "staking pool nft collection sync started"
        );

        let pool = self
            .db
            .get_pool(collection.pool_id)
            .await?
            .with_context(|| {
                format!(
                    "no pool found for nft collection, pool_id = {}, collection_id = {}",
                    collection.pool_id, collection.id
                )
            })?;

        let checkpoint = self.db.last_collection_checkpoint(collection.id).await?;
        let mut pointer: Option<u64> = checkpoint.map(|c| c.lt);

        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    collection_id = collection.id,
                    "cancellation observed, finishing sync early"
                );
                return Ok(());
            }

            let batch = match self
                .provider
                .get_transactions(&collection.addr, self.config.batch_size, pointer, cancel)
                .await
            {
                Ok(batch) => batch,
                Err(ProviderError::Cancelled) => {
                    tracing::info!(
                        collection_id = collection.id,
                        "fetch cancelled, finishing sync early"
                    );
                    return Ok(());
                }
                Err(err) => {
                    return Err(err).context("fetching nft collection transactions");
                }
            };

            tracing::debug!(
                collection_id = collection.id,
                fetched = batch.len(),
                limit = self.config.batch_size,
                pointer,
                newest_lt = batch.first().map(|t| t.lt),
                oldest_lt = batch.last().map(|t| t.lt),
                "staking pool nft collection sync iteration"
            );

            check_batch_ordering(pointer, &batch)?;

            let short_page = batch.len() < self.config.batch_size;
            let watermark = batch.last().map(|t| (t.lt, t.hash.clone()));

            let events = analyze_collection_batch(&pool, collection, &batch)?;
            self.apply_events(events).await?;

            if let Some((lt, hash)) = watermark {
                self.db.save_collection_checkpoint(collection.id, lt, &hash).await?;
                pointer = Some(lt);
            }

            if short_page {
                break;
            }
        }

        tracing::debug!(
            collection_id = collection.id,
            addr = %collection.addr,
            "staking pool nft collection sync finished"
        );
        Ok(())
    }

    /// Apply one batch of analyzed events: payout rows first, then the
    /// drained flag. Both writes are idempotent; the drained update logs
    /// and tolerates unexpected affected-row counts.
    pub async fn apply_events(&self, events: Vec<CollectionEvent>) -> Result<()> {
        let grouped = group_collection_events(events);

        self.db.insert_collection_payouts(&grouped.payouts).await?;
        if let Some(drained) = &grouped.drained {
            self.db.mark_collection_drained(drained).await?;
        }

        Ok(())
    }
}
