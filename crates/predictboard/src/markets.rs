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

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{chain::MarketSource, retry::RetryPolicy, store::StoreObj};

/// Question and option labels of a market. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMetadata {
    pub market_id: U256,
    pub question: String,
    pub option_a: String,
    pub option_b: String,
}

impl MarketMetadata {
    /// Label of the side selected by a purchase.
    pub fn option_label(&self, is_option_a: bool) -> &str {
        if is_option_a {
            &self.option_a
        } else {
            &self.option_b
        }
    }

    /// Unknown market ids come back from the contract with empty strings.
    pub fn is_resolved(&self) -> bool {
        !self.question.is_empty()
    }
}

/// The ERC-20 token markets are denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Write-once market metadata lookup.
#[derive(Clone)]
pub struct MarketCatalog {
    source: Arc<dyn MarketSource>,
    store: StoreObj,
    retry: RetryPolicy,
}

impl MarketCatalog {
    pub fn new(source: Arc<dyn MarketSource>, store: StoreObj, retry: RetryPolicy) -> Self {
        Self { source, store, retry }
    }

    /// Metadata for every id that can be resolved.
    ///
    /// Stored entries are used as-is; the rest are fetched in one batched call and stored.
    /// Ids that cannot be resolved are absent from the result.
    pub async fn ensure(&self, ids: &BTreeSet<U256>) -> HashMap<U256, MarketMetadata> {
        let ids: Vec<U256> = ids.iter().copied().collect();
        let mut markets = match self.store.markets(&ids).await {
            Ok(markets) => markets,
            Err(err) => {
                tracing::warn!("Failed to read stored market metadata: {:#}", err);
                HashMap::new()
            }
        };

        let missing: Vec<U256> = ids.into_iter().filter(|id| !markets.contains_key(id)).collect();
        if missing.is_empty() {
            return markets;
        }

        tracing::debug!("Fetching metadata for {} markets", missing.len());
        let fetched = match self
            .retry
            .execute("getMarketInfoBatch", || self.source.market_info(&missing))
            .await
        {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(
                    "Failed to fetch metadata for {} markets: {:#}",
                    missing.len(),
                    err
                );
                return markets;
            }
        };

        let (resolved, unresolved): (Vec<_>, Vec<_>) =
            fetched.into_iter().partition(MarketMetadata::is_resolved);
        for market in &unresolved {
            tracing::warn!("Market {} has no metadata", market.market_id);
        }
        if !resolved.is_empty() {
            if let Err(err) = self.store.put_markets(&resolved).await {
                tracing::warn!("Failed to store metadata for {} markets: {:#}", resolved.len(), err);
            }
        }

        markets.extend(resolved.into_iter().map(|market| (market.market_id, market)));
        markets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_label() {
        let market = MarketMetadata {
            market_id: U256::from(3),
            question: "Will it rain?".into(),
            option_a: "Yes".into(),
            option_b: "No".into(),
        };
        assert_eq!(market.option_label(true), "Yes");
        assert_eq!(market.option_label(false), "No");
        assert!(market.is_resolved());
        assert!(!MarketMetadata { question: String::new(), ..market }.is_resolved());
    }
}
