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
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tonpool_indexer::{
    CollectionSyncService, DistributedTaskRunner, LocalLockService, LockService, PoolSyncService,
    RunOptions, StakingSyncDb, SyncConfig, SyncDb, SyncDbObj, TonApiClient, TonApiConfig,
};
use url::Url;

/// Arguments for the staking indexer.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct StakingIndexerArgs {
    /// Base URL of the transaction provider API.
    #[clap(long, env = "TONAPI_BASE_URL", default_value = "https://tonapi.io")]
    tonapi_url: Url,

    /// Bearer token for the transaction provider API.
    #[clap(long, env = "TONAPI_API_KEY")]
    tonapi_api_key: Option<String>,

    /// Provider request timeout in milliseconds.
    #[clap(long, default_value = "5000")]
    provider_timeout_ms: u64,

    /// DB connection string.
    #[clap(long, env = "DATABASE_URL")]
    db: String,

    /// Transactions fetched per page while syncing a resource.
    #[clap(long, default_value = "100")]
    batch_size: usize,

    /// Seconds between sync ticks.
    #[clap(long, default_value = "6")]
    interval: u64,

    /// Maximum lease duration per resource in seconds.
    #[clap(long, default_value = "300")]
    lock_ttl: u64,

    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = StakingIndexerArgs::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();

    if args.log_json {
        tracing_subscriber::fmt().with_ansi(false).json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_ansi(false).with_env_filter(filter).init();
    }

    let db: SyncDbObj = Arc::new(SyncDb::new(&args.db).await?);
    let provider = Arc::new(TonApiClient::new(TonApiConfig {
        base_url: args.tonapi_url.clone(),
        api_key: args.tonapi_api_key.clone(),
        timeout: Duration::from_millis(args.provider_timeout_ms),
    })?);

    let sync_config = SyncConfig { batch_size: args.batch_size };
    let pool_sync =
        Arc::new(PoolSyncService::new(provider.clone(), db.clone(), sync_config.clone()));
    let collection_sync =
        Arc::new(CollectionSyncService::new(provider, db.clone(), sync_config));

    let lock: Arc<dyn LockService> = Arc::new(LocalLockService::default());
    let runner = Arc::new(DistributedTaskRunner::new("staking-sync", lock));
    let lock_ttl = Duration::from_secs(args.lock_ttl);

    tracing::info!(interval = args.interval, "staking indexer started");

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = tick(&db, &runner, &pool_sync, &collection_sync, lock_ttl).await {
                    tracing::error!("sync tick failed: {:?}", err);
                }
            }
        }
    }

    runner.stop().await;
    tracing::info!("staking indexer stopped");
    Ok(())
}

/// One scheduler tick: fan sync tasks out over every active resource. A
/// failing resource is logged and does not disturb the others.
async fn tick(
    db: &SyncDbObj,
    runner: &Arc<DistributedTaskRunner>,
    pool_sync: &Arc<PoolSyncService>,
    collection_sync: &Arc<CollectionSyncService>,
    lock_ttl: Duration,
) -> Result<()> {
    let pools = db.get_active_pools().await?;
    let collections = db.get_active_collections().await?;

    let pool_tasks = pools.into_iter().map(|pool| {
        let runner = runner.clone();
        let pool_sync = pool_sync.clone();
        async move {
            let key = format!("pool:{}", pool.id);
            let pool_id = pool.id;
            let run = runner
                .run_once(
                    &key,
                    move |token| async move { pool_sync.sync(&pool, &token).await },
                    RunOptions { max_duration: lock_ttl, ..Default::default() },
                )
                .await;
            if let Err(err) = run {
                tracing::error!(pool_id, "staking pool sync failed: {:?}", err);
            }
        }
    });
    futures_util::future::join_all(pool_tasks).await;

    let collection_tasks = collections.into_iter().map(|collection| {
        let runner = runner.clone();
        let collection_sync = collection_sync.clone();
        async move {
            let key = format!("collection:{}", collection.id);
            let collection_id = collection.id;
            let run = runner
                .run_once(
                    &key,
                    move |token| async move { collection_sync.sync(&collection, &token).await },
                    RunOptions { max_duration: lock_ttl, ..Default::default() },
                )
                .await;
            if let Err(err) = run {
                tracing::error!(collection_id, "nft collection sync failed: {:?}", err);
            }
        }
    });
    futures_util::future::join_all(collection_tasks).await;

    Ok(())
}
