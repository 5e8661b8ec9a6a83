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

use std::collections::HashMap;

use alloy::{
    primitives::{Address, U256},
    rpc::types::Log,
};
use anyhow::bail;
use async_trait::async_trait;
use predictboard::{BlockRange, LogQuery, LogSource, MarketMetadata, MarketSource, TokenInfo};
use tokio::sync::Mutex;

/// Seconds between mock blocks.
pub const BLOCK_TIME: u64 = 2;

/// Timestamp of mock block zero.
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Default)]
struct ChainState {
    head: u64,
    logs: Vec<Log>,
    markets: HashMap<U256, MarketMetadata>,
    token: Option<TokenInfo>,
    /// Remaining scripted failures, keyed by the first block of the sub-range.
    failing_ranges: HashMap<u64, u32>,
    failing_market_calls: u32,
    requested_ranges: Vec<BlockRange>,
    market_calls: Vec<Vec<U256>>,
    timestamp_calls: Vec<u64>,
}

/// In-memory chain serving logs and market view calls, with scripted failures.
#[derive(Debug)]
pub struct MockChain {
    market_address: Address,
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(market_address: Address, head: u64) -> Self {
        let state = ChainState {
            head,
            token: Some(TokenInfo {
                address: Address::repeat_byte(0x70),
                symbol: "USDC".to_string(),
                decimals: 6,
            }),
            ..Default::default()
        };
        Self { market_address, state: Mutex::new(state) }
    }

    pub fn market_address(&self) -> Address {
        self.market_address
    }

    pub async fn set_head(&self, head: u64) {
        self.state.lock().await.head = head;
    }

    pub async fn push_logs(&self, logs: impl IntoIterator<Item = Log>) {
        self.state.lock().await.logs.extend(logs);
    }

    pub async fn add_market(&self, market: MarketMetadata) {
        self.state.lock().await.markets.insert(market.market_id, market);
    }

    pub async fn set_token(&self, token: TokenInfo) {
        self.state.lock().await.token = Some(token);
    }

    /// Fail the next `times` fetches of the sub-range starting at `from_block`.
    pub async fn fail_range(&self, from_block: u64, times: u32) {
        self.state.lock().await.failing_ranges.insert(from_block, times);
    }

    /// Make the betting token unreadable, as if the view call reverted.
    pub async fn clear_token(&self) {
        self.state.lock().await.token = None;
    }

    /// Fail the next `times` calls to `market_info`.
    pub async fn fail_market_calls(&self, times: u32) {
        self.state.lock().await.failing_market_calls = times;
    }

    /// Every sub-range requested so far, in request order.
    pub async fn requested_ranges(&self) -> Vec<BlockRange> {
        self.state.lock().await.requested_ranges.clone()
    }

    /// Ids passed to each `market_info` call so far.
    pub async fn market_calls(&self) -> Vec<Vec<U256>> {
        self.state.lock().await.market_calls.clone()
    }

    /// Blocks passed to `block_timestamp` so far, in request order.
    pub async fn timestamp_calls(&self) -> Vec<u64> {
        self.state.lock().await.timestamp_calls.clone()
    }
}

fn matches_query(log: &Log, query: &LogQuery, range: BlockRange) -> bool {
    let topics = log.topics();
    let in_range = log.block_number.is_some_and(|block| block >= range.from && block <= range.to);
    let participant_matches = match query.participant {
        Some(participant) => topics.get(2) == Some(&participant.into_word()),
        None => true,
    };
    log.address() == query.contract
        && topics.first() == Some(&query.event.signature_hash())
        && in_range
        && participant_matches
}

#[async_trait]
impl LogSource for MockChain {
    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.state.lock().await.head)
    }

    async fn logs(&self, query: &LogQuery, range: BlockRange) -> anyhow::Result<Vec<Log>> {
        let mut state = self.state.lock().await;
        state.requested_ranges.push(range);
        if let Some(remaining) = state.failing_ranges.get_mut(&range.from) {
            if *remaining > 0 {
                *remaining -= 1;
                bail!("connection reset while fetching {range}");
            }
        }
        Ok(state.logs.iter().filter(|log| matches_query(log, query, range)).cloned().collect())
    }

    async fn block_timestamp(&self, number: u64) -> anyhow::Result<Option<u64>> {
        let mut state = self.state.lock().await;
        state.timestamp_calls.push(number);
        Ok((number <= state.head).then_some(GENESIS_TIMESTAMP + number * BLOCK_TIME))
    }
}

#[async_trait]
impl MarketSource for MockChain {
    async fn token_info(&self) -> anyhow::Result<TokenInfo> {
        match self.state.lock().await.token.clone() {
            Some(token) => Ok(token),
            None => bail!("execution reverted: bettingToken"),
        }
    }

    async fn market_info(&self, ids: &[U256]) -> anyhow::Result<Vec<MarketMetadata>> {
        let mut state = self.state.lock().await;
        state.market_calls.push(ids.to_vec());
        if state.failing_market_calls > 0 {
            state.failing_market_calls -= 1;
            bail!("upstream unavailable");
        }
        Ok(ids
            .iter()
            .map(|id| {
                state.markets.get(id).cloned().unwrap_or_else(|| MarketMetadata {
                    market_id: *id,
                    question: String::new(),
                    option_a: String::new(),
                    option_b: String::new(),
                })
            })
            .collect())
    }
}
