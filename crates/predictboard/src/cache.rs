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

//! Event cache with checkpointing, and expiring caches for derived data.

use std::{collections::HashMap, hash::Hash, time::Duration};

use anyhow::Context;
use tokio::{sync::RwLock, time::Instant};

use crate::{
    events::RawEvent,
    store::{SaveSummary, StoreObj},
};

/// Events and checkpoint previously stored for a namespace.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub events: Vec<RawEvent>,
    /// Last fully scanned block, if any pass has completed.
    pub checkpoint: Option<u64>,
    pub genesis_block: u64,
}

impl Snapshot {
    /// First block the next pass must scan.
    pub fn next_block(&self) -> u64 {
        match self.checkpoint {
            Some(block) => block.saturating_add(1).max(self.genesis_block),
            None => self.genesis_block,
        }
    }
}

/// How a scan pass ended, as asserted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassCompletion {
    /// Every sub-range through `through` was scanned.
    Complete { through: u64 },
    /// Some sub-ranges failed. Events are merged but the checkpoint stays where it was.
    Partial,
}

impl PassCompletion {
    fn checkpoint(&self) -> Option<u64> {
        match *self {
            PassCompletion::Complete { through } => Some(through),
            PassCompletion::Partial => None,
        }
    }
}

/// Namespaced event log backed by an [IndexerStore](crate::store::IndexerStore).
#[derive(Clone)]
pub struct EventCache {
    store: StoreObj,
    genesis_block: u64,
}

impl EventCache {
    pub fn new(store: StoreObj, genesis_block: u64) -> Self {
        Self { store, genesis_block }
    }

    pub fn genesis_block(&self) -> u64 {
        self.genesis_block
    }

    pub async fn load(&self, namespace: &str) -> anyhow::Result<Snapshot> {
        let events = self
            .store
            .load_events(namespace)
            .await
            .with_context(|| format!("failed to load events for {namespace}"))?;
        let checkpoint = self
            .store
            .checkpoint(namespace)
            .await
            .with_context(|| format!("failed to load checkpoint for {namespace}"))?;
        Ok(Snapshot { events, checkpoint, genesis_block: self.genesis_block })
    }

    pub async fn save(
        &self,
        namespace: &str,
        events: &[RawEvent],
        completion: PassCompletion,
    ) -> anyhow::Result<SaveSummary> {
        let summary = self
            .store
            .save(namespace, events, completion.checkpoint())
            .await
            .with_context(|| format!("failed to save events for {namespace}"))?;
        tracing::debug!(
            "Saved {} new events to {} (checkpoint {:?}, {:?})",
            summary.inserted,
            namespace,
            summary.checkpoint,
            completion
        );
        Ok(summary)
    }
}

/// Keyed cache whose entries expire a fixed interval after insertion.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: RwLock<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached value, if present and not yet expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(inserted, _)| inserted.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value));
    }

    pub async fn invalidate(&self, key: &K) {
        self.entries.write().await.remove(key);
    }
}
