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

//! Storage contracts for events, checkpoints, identities, market metadata and block
//! timestamps.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    events::{EventKey, RawEvent},
    identity::Identity,
    markets::MarketMetadata,
};

pub type StoreObj = Arc<dyn IndexerStore>;

/// Outcome of a merge-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveSummary {
    /// Events that were not previously stored.
    pub inserted: usize,
    /// Stored checkpoint after the write.
    pub checkpoint: Option<u64>,
}

/// Durable, append-and-merge event log with a checkpoint per namespace.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// All events stored under `namespace`, ordered by `(block_number, log_index)`.
    async fn load_events(&self, namespace: &str) -> anyhow::Result<Vec<RawEvent>>;

    /// Last fully scanned block for `namespace`.
    async fn checkpoint(&self, namespace: &str) -> anyhow::Result<Option<u64>>;

    /// Merge `events` by identity and, if given, raise the checkpoint to `checkpoint`.
    ///
    /// Already-stored events are left untouched and the checkpoint never decreases.
    async fn save(
        &self,
        namespace: &str,
        events: &[RawEvent],
        checkpoint: Option<u64>,
    ) -> anyhow::Result<SaveSummary>;
}

/// Persistent address to identity map. Only positive results are stored.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn identities(&self, addresses: &[Address]) -> anyhow::Result<HashMap<Address, Identity>>;

    async fn put_identities(&self, identities: &[Identity]) -> anyhow::Result<()>;
}

/// Write-once market metadata.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn markets(&self, ids: &[U256]) -> anyhow::Result<HashMap<U256, MarketMetadata>>;

    /// Insert metadata for markets not yet stored; existing entries are kept.
    async fn put_markets(&self, markets: &[MarketMetadata]) -> anyhow::Result<()>;
}

/// Write-once block timestamps, in unix seconds.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn block_timestamps(&self, blocks: &[u64]) -> anyhow::Result<HashMap<u64, u64>>;

    /// Insert timestamps for blocks not yet stored; existing entries are kept.
    async fn put_block_timestamps(&self, timestamps: &[(u64, u64)]) -> anyhow::Result<()>;
}

pub trait IndexerStore: EventStore + IdentityStore + MarketStore + BlockStore {}

impl<T: EventStore + IdentityStore + MarketStore + BlockStore> IndexerStore for T {}

#[derive(Debug, Default)]
struct Namespace {
    events: BTreeMap<EventKey, RawEvent>,
    checkpoint: Option<u64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    namespaces: HashMap<String, Namespace>,
    identities: HashMap<Address, Identity>,
    markets: HashMap<U256, MarketMetadata>,
    block_timestamps: HashMap<u64, u64>,
}

/// In-process store. State lives as long as the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn load_events(&self, namespace: &str) -> anyhow::Result<Vec<RawEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<RawEvent> = state
            .namespaces
            .get(namespace)
            .map(|ns| ns.events.values().cloned().collect())
            .unwrap_or_default();
        events.sort_by_key(RawEvent::position);
        Ok(events)
    }

    async fn checkpoint(&self, namespace: &str) -> anyhow::Result<Option<u64>> {
        let state = self.state.read().await;
        Ok(state.namespaces.get(namespace).and_then(|ns| ns.checkpoint))
    }

    async fn save(
        &self,
        namespace: &str,
        events: &[RawEvent],
        checkpoint: Option<u64>,
    ) -> anyhow::Result<SaveSummary> {
        let mut state = self.state.write().await;
        let ns = state.namespaces.entry(namespace.to_string()).or_default();

        let mut inserted = 0;
        for event in events {
            if let std::collections::btree_map::Entry::Vacant(entry) = ns.events.entry(event.key())
            {
                entry.insert(event.clone());
                inserted += 1;
            }
        }
        if let Some(block) = checkpoint {
            ns.checkpoint = Some(ns.checkpoint.map_or(block, |current| current.max(block)));
        }

        Ok(SaveSummary { inserted, checkpoint: ns.checkpoint })
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn identities(&self, addresses: &[Address]) -> anyhow::Result<HashMap<Address, Identity>> {
        let state = self.state.read().await;
        Ok(addresses
            .iter()
            .filter_map(|address| state.identities.get(address).map(|id| (*address, id.clone())))
            .collect())
    }

    async fn put_identities(&self, identities: &[Identity]) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        for identity in identities {
            state.identities.insert(identity.address, identity.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn markets(&self, ids: &[U256]) -> anyhow::Result<HashMap<U256, MarketMetadata>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.markets.get(id).map(|market| (*id, market.clone())))
            .collect())
    }

    async fn put_markets(&self, markets: &[MarketMetadata]) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        for market in markets {
            state.markets.entry(market.market_id).or_insert_with(|| market.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn block_timestamps(&self, blocks: &[u64]) -> anyhow::Result<HashMap<u64, u64>> {
        let state = self.state.read().await;
        Ok(blocks
            .iter()
            .filter_map(|block| state.block_timestamps.get(block).map(|ts| (*block, *ts)))
            .collect())
    }

    async fn put_block_timestamps(&self, timestamps: &[(u64, u64)]) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        for (block, timestamp) in timestamps {
            state.block_timestamps.entry(*block).or_insert(*timestamp);
        }
        Ok(())
    }
}
