// Copyright 2025 RISC Zero, Inc.
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


use std::{env, str::FromStr, sync::Arc};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use predictboard::{Pipeline, RetryPolicy, DEFAULT_IDENTITY_API_URL, DEFAULT_RANGE_SIZE};
use predictboard_indexer::{IndexerService, IndexerServiceConfig};
use url::Url;

/// Shared state of every request handler.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Build the pipeline from `RPC_URL`, `MARKET_ADDRESS`, `DB_URL` and the optional tuning
    /// variables.
    pub async fn from_env() -> Result<Self> {
        let rpc_url: Url = required("RPC_URL")?;
        let market_address: Address = required("MARKET_ADDRESS")?;
        let db_url = env::var("DB_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .context("DB_URL environment variable is required")?;

        let config = IndexerServiceConfig {
            start_block: optional("GENESIS_BLOCK")?,
            range_size: optional("RANGE_SIZE")?.unwrap_or(DEFAULT_RANGE_SIZE),
            concurrency: optional("SCAN_CONCURRENCY")?.unwrap_or(2),
            retry: RetryPolicy::default(),
            identity_api_url: optional("IDENTITY_API_URL")?
                .map_or_else(|| Url::parse(DEFAULT_IDENTITY_API_URL), Ok)?,
            identity_api_key: env::var("IDENTITY_API_KEY").ok(),
            watch_addresses: Vec::new(),
        };

        tracing::info!("Market address: {:#x}", market_address);
        let service = IndexerService::new(rpc_url, market_address, &db_url, config).await?;
        Ok(Self::new(service.pipeline()))
    }
}

fn optional<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{name} environment variable is invalid")),
        Err(_) => Ok(None),
    }
}

fn required<T>(name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    optional(name)?.with_context(|| format!("{name} environment variable is required"))
}
