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

//! Blockchain transaction provider.
//!
//! The sync drivers only see the [`TransactionProvider`] trait; the bundled
//! implementation talks to a tonapi-compatible REST endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tonpool_events::Transaction;
use url::Url;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transaction fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid provider url: {0}")]
    BadUrl(#[from] url::ParseError),

    #[error("provider returned status {status} for {url}")]
    Status { status: StatusCode, url: String },

    #[error("transaction fetch cancelled")]
    Cancelled,
}

/// Paginated account-transaction source, newest-first. `before_lt` bounds
/// the page strictly from above; `None` starts at the chain head.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn get_transactions(
        &self,
        account_addr: &str,
        limit: usize,
        before_lt: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Transaction>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct TonApiConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    /// Per-request timeout; slow provider responses fail the iteration
    /// rather than stalling the sync loop.
    pub timeout: Duration,
}

pub struct TonApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl TonApiClient {
    pub fn new(config: TonApiConfig) -> Result<Self, ProviderError> {
        let mut headers = header::HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            if let Ok(mut value) = header::HeaderValue::from_str(&format!("Bearer {api_key}")) {
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { http, base_url: config.base_url })
    }
}

#[derive(Deserialize)]
struct TransactionsPage {
    #[serde(default)]
    transactions: Vec<Transaction>,
}

#[async_trait]
impl TransactionProvider for TonApiClient {
    async fn get_transactions(
        &self,
        account_addr: &str,
        limit: usize,
        before_lt: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let mut url = self
            .base_url
            .join(&format!("v2/blockchain/accounts/{account_addr}/transactions"))?;
        url.query_pairs_mut().append_pair("limit", &limit.to_string());
        if let Some(before_lt) = before_lt {
            url.query_pairs_mut().append_pair("before_lt", &before_lt.to_string());
        }

        // The fetch is read-only, so aborting it on cancellation is safe;
        // the cooperative-shutdown rules only forbid interrupting writes.
        let response = tokio::select! {
            response = self.http.get(url.clone()).send() => response?,
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                status: response.status(),
                url: url.to_string(),
            });
        }

        let page: TransactionsPage = response.json().await?;
        Ok(page.transactions)
    }
}
