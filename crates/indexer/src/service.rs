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

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use predictboard::{
    HttpIdentityLookup, Pipeline, PipelineConfig, RetryPolicy, RpcChain, StoreObj, VoteQuery,
    DEFAULT_GENESIS_BLOCK,
};
use url::Url;

use crate::db::SqlStore;

#[derive(Clone, Debug)]
pub struct IndexerServiceConfig {
    /// First block to scan when a namespace has no checkpoint.
    pub start_block: Option<u64>,
    pub range_size: u64,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub identity_api_url: Url,
    pub identity_api_key: Option<String>,
    /// Addresses whose vote histories are kept up to date on every run.
    pub watch_addresses: Vec<Address>,
}

impl IndexerServiceConfig {
    pub fn pipeline_config(&self, market_address: Address) -> PipelineConfig {
        PipelineConfig {
            range_size: self.range_size,
            concurrency: self.concurrency,
            retry: self.retry.clone(),
            ..PipelineConfig::new(market_address, self.start_block.unwrap_or(DEFAULT_GENESIS_BLOCK))
        }
    }
}

pub struct IndexerService {
    pipeline: Arc<Pipeline>,
    config: IndexerServiceConfig,
}

impl IndexerService {
    pub async fn new(
        rpc_url: Url,
        market_address: Address,
        db_conn: &str,
        config: IndexerServiceConfig,
    ) -> Result<Self> {
        let lookup = Arc::new(HttpIdentityLookup::new(
            config.identity_api_url.clone(),
            config.identity_api_key.clone(),
        ));
        lookup.ensure_credential().context("IDENTITY_API_KEY is not set")?;

        let chain = Arc::new(RpcChain::connect(rpc_url, market_address));
        let store: StoreObj =
            Arc::new(SqlStore::new(db_conn).await.context("failed to open database")?);
        let pipeline = Pipeline::new(chain, store, lookup, config.pipeline_config(market_address));

        Ok(Self::from_pipeline(Arc::new(pipeline), config))
    }

    pub fn from_pipeline(pipeline: Arc<Pipeline>, config: IndexerServiceConfig) -> Self {
        Self { pipeline, config }
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.clone()
    }

    /// One indexing pass: the leaderboard, then each watched vote history.
    pub async fn run(&self) -> Result<()> {
        let start_time = std::time::Instant::now();
        tracing::info!("Starting predictboard indexer run");

        let leaderboard =
            self.pipeline.refresh_leaderboard().await.context("failed to refresh leaderboard")?;
        if !leaderboard.complete {
            tracing::warn!("Leaderboard was built from an incomplete scan");
        }
        tracing::info!(
            "Leaderboard has {} entries (top: {:?})",
            leaderboard.entries.len(),
            leaderboard.entries.first().map(|entry| &entry.display_name)
        );

        for address in &self.config.watch_addresses {
            let history = self
                .pipeline
                .vote_history(*address, &VoteQuery::default())
                .await
                .with_context(|| format!("failed to index votes of {address:#x}"))?;
            tracing::info!("Indexed {} votes for {:#x}", history.votes.len(), address);
        }

        tracing::info!(
            "Predictboard indexer run completed successfully in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
