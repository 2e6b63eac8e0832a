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

//! Sync store: pools, payout collections, withdrawal events and sync
//! checkpoints.
//!
//! Every event write is insert-or-ignore on its dedup key, so replaying a
//! batch after a crash or a lost lease converges to the same state. There
//! is deliberately no cross-table transaction around one batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{any::AnyPoolOptions, AnyPool, Row};
use tonpool_events::{
    CollectionDiscoveredEvent, CollectionDrainedEvent, CollectionPayoutEvent, EventKind,
    NftCollection, StakingPool, WithdrawalEvent,
};

use super::DbError;

pub type SyncDbObj = Arc<dyn StakingSyncDb + Send + Sync>;

/// Convert a u128 amount to a zero-padded string for proper database
/// sorting. u128 max value has 39 decimal digits.
fn pad_u128(value: u128) -> String {
    format!("{:0>39}", value)
}

/// Convert a zero-padded string back to u128.
fn unpad_u128(s: &str) -> Result<u128, DbError> {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse().map_err(|_| DbError::BadAmount(s.to_string()))
}

/// Persisted watermark: the oldest `(lt, hash)` already processed for a
/// resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCheckpoint {
    pub resource_id: i64,
    pub hash: String,
    pub lt: u64,
    pub creation_time: i64,
}

/// One withdrawal-family event as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRow {
    pub hash: String,
    pub lt: u64,
    pub creation_time: i64,
    pub pool_id: i64,
    pub event_type: i32,
    pub wallet_addr: Option<String>,
    pub requested_amount: u128,
    pub reward_amount: u128,
}

#[async_trait]
pub trait StakingSyncDb {
    /// Register a pool for tracking; ignored when the address is known.
    async fn add_pool(&self, pool: &StakingPool) -> Result<(), DbError>;

    async fn get_pool(&self, pool_id: i64) -> Result<Option<StakingPool>, DbError>;

    /// Pools eligible for sync scheduling.
    async fn get_active_pools(&self) -> Result<Vec<StakingPool>, DbError>;

    /// Collections still paying out, eligible for sync scheduling.
    async fn get_active_collections(&self) -> Result<Vec<NftCollection>, DbError>;

    /// Insert newly discovered payout collections, ignoring addresses that
    /// were discovered before.
    async fn insert_discovered_collections(
        &self,
        events: &[CollectionDiscoveredEvent],
    ) -> Result<(), DbError>;

    /// Flip the drained flag for a collection. Zero affected rows means the
    /// event was applied before; any other count but one is a data-model
    /// violation. Both are logged, neither aborts the pass.
    async fn mark_collection_drained(&self, event: &CollectionDrainedEvent)
        -> Result<(), DbError>;

    async fn insert_immediate_withdrawals(
        &self,
        events: &[WithdrawalEvent],
    ) -> Result<(), DbError>;

    async fn insert_withdrawal_requests(&self, events: &[WithdrawalEvent])
        -> Result<(), DbError>;

    async fn insert_collection_payouts(
        &self,
        events: &[CollectionPayoutEvent],
    ) -> Result<(), DbError>;

    /// All stored withdrawal rows for a pool, oldest first.
    async fn get_withdrawals(&self, pool_id: i64) -> Result<Vec<WithdrawalRow>, DbError>;

    async fn last_pool_checkpoint(&self, pool_id: i64)
        -> Result<Option<SyncCheckpoint>, DbError>;

    async fn save_pool_checkpoint(&self, pool_id: i64, lt: u64, hash: &str)
        -> Result<(), DbError>;

    async fn last_collection_checkpoint(
        &self,
        collection_id: i64,
    ) -> Result<Option<SyncCheckpoint>, DbError>;

    async fn save_collection_checkpoint(
        &self,
        collection_id: i64,
        lt: u64,
        hash: &str,
    ) -> Result<(), DbError>;
}

// Batch insert chunk size to avoid parameter limits
// PostgreSQL: 65535 max params, SQLite: 999-32766 params (configurable)
// Using conservative chunk size that works safely for both databases
const BATCH_INSERT_CHUNK_SIZE: usize = 75;

struct WithdrawalInsert {
    hash: String,
    lt: u64,
    created_at: i64,
    pool_id: i64,
    event_type: i32,
    wallet_addr: Option<String>,
    requested_amount: u128,
    reward_amount: u128,
}

impl WithdrawalInsert {
    fn from_withdrawal(event: &WithdrawalEvent, kind: EventKind) -> Self {
        Self {
            hash: event.hash.clone(),
            lt: event.lt,
            created_at: event.created_at,
            pool_id: event.pool_id,
            event_type: kind.type_id(),
            wallet_addr: event.wallet_addr.clone(),
            requested_amount: event.requested_amount,
            reward_amount: event.reward_amount,
        }
    }

    fn from_payout(event: &CollectionPayoutEvent) -> Self {
        Self {
            hash: event.hash.clone(),
            lt: event.lt,
            created_at: event.created_at,
            pool_id: event.pool_id,
            event_type: EventKind::NftCollectionPayout.type_id(),
            wallet_addr: event.wallet_addr.clone(),
            requested_amount: event.requested_amount,
            reward_amount: event.reward_amount,
        }
    }
}

pub struct SyncDb {
    pool: AnyPool,
}

impl SyncDb {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(20).connect(database_url).await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    async fn insert_withdrawal_rows(&self, rows: &[WithdrawalInsert]) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        // Process in chunks to avoid parameter limits
        for chunk in rows.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let mut values_clauses = Vec::new();
            let mut param_idx = 1;

            for _ in chunk {
                values_clauses.push(format!(
                    "(${},${},${},${},${},${},${},${})",
                    param_idx,
                    param_idx + 1,
                    param_idx + 2,
                    param_idx + 3,
                    param_idx + 4,
                    param_idx + 5,
                    param_idx + 6,
                    param_idx + 7
                ));
                param_idx += 8;
            }

            let query = format!(
                r#"INSERT INTO staking_pool_withdrawals
                (hash, lt, creation_time, pool_id, event_type, wallet_addr, requested_amount, reward_amount)
                VALUES {}
                ON CONFLICT (hash) DO NOTHING"#,
                values_clauses.join(",")
            );

            let mut q = sqlx::query(&query);
            for row in chunk {
                q = q
                    .bind(row.hash.clone())
                    .bind(row.lt as i64)
                    .bind(row.created_at)
                    .bind(row.pool_id)
                    .bind(row.event_type)
                    .bind(row.wallet_addr.clone())
                    .bind(pad_u128(row.requested_amount))
                    .bind(pad_u128(row.reward_amount));
            }
            q.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn pool_from_row(row: &sqlx::any::AnyRow) -> StakingPool {
    StakingPool {
        id: row.get::<i64, _>("id"),
        name: row.get("name"),
        symbol: row.get("symbol"),
        contract_addr: row.get("contract_addr"),
        is_native: row.get::<i32, _>("is_native") != 0,
        disabled: row.get::<i32, _>("disabled") != 0,
    }
}

fn collection_from_row(row: &sqlx::any::AnyRow) -> NftCollection {
    NftCollection {
        id: row.get::<i64, _>("id"),
        addr: row.get("addr"),
        pool_id: row.get::<i64, _>("pool_id"),
        pool_addr: row.get("pool_addr"),
        drained: row.get::<i32, _>("drained") != 0,
    }
}

#[async_trait]
impl StakingSyncDb for SyncDb {
    async fn add_pool(&self, pool: &StakingPool) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO staking_pools (id, name, symbol, contract_addr, is_native, disabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (contract_addr) DO NOTHING
        "#;

        sqlx::query(query)
            .bind(pool.id)
            .bind(pool.name.clone())
            .bind(pool.symbol.clone())
            .bind(pool.contract_addr.clone())
            .bind(if pool.is_native { 1i32 } else { 0i32 })
            .bind(if pool.disabled { 1i32 } else { 0i32 })
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_pool(&self, pool_id: i64) -> Result<Option<StakingPool>, DbError> {
        let query = r#"
            SELECT id, name, symbol, contract_addr, is_native, disabled
            FROM staking_pools
            WHERE id = $1
        "#;

        let row = sqlx::query(query).bind(pool_id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(pool_from_row))
    }

    async fn get_active_pools(&self) -> Result<Vec<StakingPool>, DbError> {
        let query = r#"
            SELECT id, name, symbol, contract_addr, is_native, disabled
            FROM staking_pools
            WHERE disabled = 0
            ORDER BY id
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(pool_from_row).collect())
    }

    async fn get_active_collections(&self) -> Result<Vec<NftCollection>, DbError> {
        let query = r#"
            SELECT id, addr, pool_id, pool_addr, drained
            FROM staking_pool_nft_collections
            WHERE drained = 0
            ORDER BY id
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(collection_from_row).collect())
    }

    async fn insert_discovered_collections(
        &self,
        events: &[CollectionDiscoveredEvent],
    ) -> Result<(), DbError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in events.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let mut values_clauses = Vec::new();
            let mut param_idx = 1;

            for _ in chunk {
                values_clauses.push(format!(
                    "(${},${},${},0)",
                    param_idx,
                    param_idx + 1,
                    param_idx + 2
                ));
                param_idx += 3;
            }

            let query = format!(
                r#"INSERT INTO staking_pool_nft_collections
                (addr, pool_id, pool_addr, drained)
                VALUES {}
                ON CONFLICT (addr) DO NOTHING"#,
                values_clauses.join(",")
            );

            let mut q = sqlx::query(&query);
            for event in chunk {
                q = q
                    .bind(event.collection_addr.clone())
                    .bind(event.pool_id)
                    .bind(event.pool_addr.clone());
            }
            q.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_collection_drained(
        &self,
        event: &CollectionDrainedEvent,
    ) -> Result<(), DbError> {
        let query = r#"
            UPDATE staking_pool_nft_collections
            SET drained = 1
            WHERE id = $1
        "#;

        let result = sqlx::query(query).bind(event.collection_id).execute(&self.pool).await?;

        match result.rows_affected() {
            1 => {}
            0 => tracing::debug!(
                collection_id = event.collection_id,
                hash = %event.hash,
                "drained flag already set, zero rows affected"
            ),
            n => tracing::warn!(
                collection_id = event.collection_id,
                hash = %event.hash,
                rows_affected = n,
                "unexpected affected row count while marking collection drained"
            ),
        }

        Ok(())
    }

    async fn insert_immediate_withdrawals(
        &self,
        events: &[WithdrawalEvent],
    ) -> Result<(), DbError> {
        let rows: Vec<WithdrawalInsert> = events
            .iter()
            .map(|e| WithdrawalInsert::from_withdrawal(e, EventKind::ImmediateWithdrawal))
            .collect();
        self.insert_withdrawal_rows(&rows).await
    }

    async fn insert_withdrawal_requests(
        &self,
        events: &[WithdrawalEvent],
    ) -> Result<(), DbError> {
        let rows: Vec<WithdrawalInsert> = events
            .iter()
            .map(|e| WithdrawalInsert::from_withdrawal(e, EventKind::WithdrawalRequest))
            .collect();
        self.insert_withdrawal_rows(&rows).await
    }

    async fn insert_collection_payouts(
        &self,
        events: &[CollectionPayoutEvent],
    ) -> Result<(), DbError> {
        let rows: Vec<WithdrawalInsert> =
            events.iter().map(WithdrawalInsert::from_payout).collect();
        self.insert_withdrawal_rows(&rows).await
    }

    async fn get_withdrawals(&self, pool_id: i64) -> Result<Vec<WithdrawalRow>, DbError> {
        let query = r#"
            SELECT hash, lt, creation_time, pool_id, event_type, wallet_addr, requested_amount, reward_amount
            FROM staking_pool_withdrawals
            WHERE pool_id = $1
            ORDER BY lt
        "#;

        let rows = sqlx::query(query).bind(pool_id).fetch_all(&self.pool).await?;

        let mut results = Vec::new();
        for row in rows {
            results.push(WithdrawalRow {
                hash: row.get("hash"),
                lt: row.get::<i64, _>("lt") as u64,
                creation_time: row.get("creation_time"),
                pool_id: row.get("pool_id"),
                event_type: row.get("event_type"),
                wallet_addr: row.get("wallet_addr"),
                requested_amount: unpad_u128(&row.get::<String, _>("requested_amount"))?,
                reward_amount: unpad_u128(&row.get::<String, _>("reward_amount"))?,
            });
        }

        Ok(results)
    }

    async fn last_pool_checkpoint(
        &self,
        pool_id: i64,
    ) -> Result<Option<SyncCheckpoint>, DbError> {
        // Ties on creation_time resolve to the smallest lt: the walk moves
        // backward, so the most advanced checkpoint is the oldest point.
        let query = r#"
            SELECT pool_id, hash, lt, creation_time
            FROM staking_pool_sync_checkpoints
            WHERE pool_id = $1
            ORDER BY creation_time DESC, lt ASC
            LIMIT 1
        "#;

        let row = sqlx::query(query).bind(pool_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|row| SyncCheckpoint {
            resource_id: row.get::<i64, _>("pool_id"),
            hash: row.get("hash"),
            lt: row.get::<i64, _>("lt") as u64,
            creation_time: row.get("creation_time"),
        }))
    }

    async fn save_pool_checkpoint(
        &self,
        pool_id: i64,
        lt: u64,
        hash: &str,
    ) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO staking_pool_sync_checkpoints (pool_id, hash, lt, creation_time)
            VALUES ($1, $2, $3, $4)
        "#;

        sqlx::query(query)
            .bind(pool_id)
            .bind(hash.to_string())
            .bind(lt as i64)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn last_collection_checkpoint(
        &self,
        collection_id: i64,
    ) -> Result<Option<SyncCheckpoint>, DbError> {
        let query = r#"
            SELECT collection_id, hash, lt, creation_time
            FROM nft_collection_sync_checkpoints
            WHERE collection_id = $1
            ORDER BY creation_time DESC, lt ASC
            LIMIT 1
        "#;

        let row = sqlx::query(query).bind(collection_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|row| SyncCheckpoint {
            resource_id: row.get::<i64, _>("collection_id"),
            hash: row.get("hash"),
            lt: row.get::<i64, _>("lt") as u64,
            creation_time: row.get("creation_time"),
        }))
    }

    async fn save_collection_checkpoint(
        &self,
        collection_id: i64,
        lt: u64,
        hash: &str,
    ) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO nft_collection_sync_checkpoints (collection_id, hash, lt, creation_time)
            VALUES ($1, $2, $3, $4)
        "#;

        sqlx::query(query)
            .bind(collection_id)
            .bind(hash.to_string())
            .bind(lt as i64)
            .bind(Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
