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

//! Read-only access to the chain: event logs and market view calls.

use alloy::{
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{BlockNumberOrTag, Log},
};
use anyhow::{ensure, Context};
use async_trait::async_trait;
use url::Url;

use crate::{
    contracts::{IERC20Metadata, IPredictionMarket},
    events::LogQuery,
    markets::{MarketMetadata, TokenInfo},
    scanner::BlockRange,
};

/// Pull-based log source with a provider-enforced maximum range per call.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn block_number(&self) -> anyhow::Result<u64>;

    async fn logs(&self, query: &LogQuery, range: BlockRange) -> anyhow::Result<Vec<Log>>;

    /// Timestamp of a block in seconds, `None` if the block is unknown.
    async fn block_timestamp(&self, number: u64) -> anyhow::Result<Option<u64>>;
}

/// View calls against the market contract and its betting token.
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn token_info(&self) -> anyhow::Result<TokenInfo>;

    /// Metadata for `ids`, in the same order, from a single batched call.
    async fn market_info(&self, ids: &[U256]) -> anyhow::Result<Vec<MarketMetadata>>;
}

pub trait ChainSource: LogSource + MarketSource {}

impl<T: LogSource + MarketSource> ChainSource for T {}

/// [ChainSource] over a JSON-RPC provider.
#[derive(Clone)]
pub struct RpcChain {
    provider: DynProvider,
    market_address: Address,
}

impl RpcChain {
    pub fn new(provider: DynProvider, market_address: Address) -> Self {
        Self { provider, market_address }
    }

    /// Connect over HTTP.
    pub fn connect(rpc_url: Url, market_address: Address) -> Self {
        let provider = ProviderBuilder::new().connect_http(rpc_url).erased();
        Self::new(provider, market_address)
    }

    pub fn market_address(&self) -> Address {
        self.market_address
    }
}

#[async_trait]
impl LogSource for RpcChain {
    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn logs(&self, query: &LogQuery, range: BlockRange) -> anyhow::Result<Vec<Log>> {
        Ok(self.provider.get_logs(&query.filter(range)).await?)
    }

    async fn block_timestamp(&self, number: u64) -> anyhow::Result<Option<u64>> {
        let block = self.provider.get_block_by_number(BlockNumberOrTag::Number(number)).await?;
        Ok(block.map(|block| block.header.timestamp))
    }
}

#[async_trait]
impl MarketSource for RpcChain {
    async fn token_info(&self) -> anyhow::Result<TokenInfo> {
        let market = IPredictionMarket::new(self.market_address, &self.provider);
        let address = market.bettingToken().call().await.context("failed to query bettingToken")?;

        let token = IERC20Metadata::new(address, &self.provider);
        let symbol = token.symbol().call().await.context("failed to query token symbol")?;
        let decimals = token.decimals().call().await.context("failed to query token decimals")?;
        Ok(TokenInfo { address, symbol, decimals })
    }

    async fn market_info(&self, ids: &[U256]) -> anyhow::Result<Vec<MarketMetadata>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let market = IPredictionMarket::new(self.market_address, &self.provider);
        let info = market
            .getMarketInfoBatch(ids.to_vec())
            .call()
            .await
            .context("failed to query getMarketInfoBatch")?;
        ensure!(
            info.questions.len() == ids.len()
                && info.optionAs.len() == ids.len()
                && info.optionBs.len() == ids.len(),
            "getMarketInfoBatch returned {} entries for {} markets",
            info.questions.len(),
            ids.len()
        );

        Ok(ids
            .iter()
            .zip(info.questions)
            .zip(info.optionAs.into_iter().zip(info.optionBs))
            .map(|((market_id, question), (option_a, option_b))| MarketMetadata {
                market_id: *market_id,
                question,
                option_a,
                option_b,
            })
            .collect())
    }
}
