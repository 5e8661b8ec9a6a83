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

//! The indexing pipeline: incremental scans per namespace, folded into derived views.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use alloy::primitives::Address;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::{
    aggregate::{aggregate_votes, aggregate_winnings, purchased_market_ids, VoteEntry},
    cache::{EventCache, PassCompletion, TtlCache},
    chain::{ChainSource, LogSource, MarketSource},
    errors::PipelineError,
    events::{decode_logs, merge_events, EventType, LogQuery, RawEvent},
    flight::SingleFlight,
    identity::{IdentityLookup, IdentityResolver},
    markets::{MarketCatalog, TokenInfo},
    retry::RetryPolicy,
    scanner::{BlockRange, RangeScanner},
    store::StoreObj,
    view::{build_leaderboard, query_votes, rank_winnings, LeaderboardEntry, VoteQuery},
    DEFAULT_DERIVED_TTL, DEFAULT_LEADERBOARD_SIZE, DEFAULT_RANGE_SIZE, VOTES_NAMESPACE_PREFIX,
    WINNINGS_NAMESPACE,
};

/// Namespace of the leaderboard's event log.
pub fn winnings_namespace() -> String {
    WINNINGS_NAMESPACE.to_string()
}

/// Namespace of one user's vote history.
pub fn votes_namespace(user: &Address) -> String {
    format!("{VOTES_NAMESPACE_PREFIX}:{user:#x}")
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub market_address: Address,
    /// Deployment block of the market; scans without a checkpoint start here.
    pub genesis_block: u64,
    pub range_size: u64,
    pub concurrency: usize,
    pub leaderboard_size: usize,
    pub retry: RetryPolicy,
    /// Lifetime of cached leaderboards.
    pub derived_ttl: Duration,
}

impl PipelineConfig {
    pub fn new(market_address: Address, genesis_block: u64) -> Self {
        Self {
            market_address,
            genesis_block,
            range_size: DEFAULT_RANGE_SIZE,
            concurrency: 2,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
            retry: RetryPolicy::default(),
            derived_ttl: DEFAULT_DERIVED_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// The checkpoint was already at the chain head.
    UpToDate,
    /// Every sub-range through `through` was scanned and the checkpoint advanced to it.
    Complete { through: u64 },
    /// Some sub-ranges exhausted their retries. `checkpoint` is the stored checkpoint after
    /// the pass, which never reaches the pass's target block.
    Partial { failed_ranges: Vec<BlockRange>, checkpoint: Option<u64> },
    /// Another pass for the namespace was in flight; nothing was scanned.
    Coalesced,
}

impl SyncStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, SyncStatus::UpToDate | SyncStatus::Complete { .. })
    }
}

/// All events known for a namespace after a sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub events: Vec<RawEvent>,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub token_symbol: String,
    pub last_updated_ms: i64,
    /// False when built from an interrupted or coalesced scan.
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteHistory {
    pub address: Address,
    pub token_symbol: String,
    pub votes: Vec<VoteEntry>,
    pub complete: bool,
}

/// Composes scanning, caching, identity resolution and aggregation.
///
/// Constructed once per process and shared; all state lives in the injected store and in the
/// pipeline's own caches.
pub struct Pipeline {
    logs: Arc<dyn LogSource>,
    market_source: Arc<dyn MarketSource>,
    store: StoreObj,
    events: EventCache,
    scanner: RangeScanner,
    identities: IdentityResolver,
    markets: MarketCatalog,
    flights: SingleFlight,
    token: OnceCell<TokenInfo>,
    leaderboards: TtlCache<String, Leaderboard>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new<C: ChainSource + 'static>(
        chain: Arc<C>,
        store: StoreObj,
        lookup: Arc<dyn IdentityLookup>,
        config: PipelineConfig,
    ) -> Self {
        let logs: Arc<dyn LogSource> = chain.clone();
        let market_source: Arc<dyn MarketSource> = chain;
        Self {
            logs,
            market_source: market_source.clone(),
            store: store.clone(),
            events: EventCache::new(store.clone(), config.genesis_block),
            scanner: RangeScanner {
                range_size: config.range_size,
                concurrency: config.concurrency,
                retry: config.retry.clone(),
            },
            identities: IdentityResolver::new(lookup, store.clone(), config.retry.clone()),
            markets: MarketCatalog::new(market_source, store, config.retry.clone()),
            flights: SingleFlight::new(),
            token: OnceCell::new(),
            leaderboards: TtlCache::new(config.derived_ttl),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Scan `query` from the namespace checkpoint to the chain head and merge the results.
    ///
    /// One pass runs per namespace at a time; a concurrent call is answered from the stored
    /// events. The checkpoint only advances when every sub-range of the pass succeeded.
    pub async fn sync(&self, namespace: &str, query: &LogQuery) -> Result<SyncReport, PipelineError> {
        let Some(_flight) = self.flights.try_acquire(namespace) else {
            tracing::info!("Scan of {} already in flight, serving stored events", namespace);
            let snapshot = self.events.load(namespace).await.map_err(PipelineError::Store)?;
            return Ok(SyncReport { events: snapshot.events, status: SyncStatus::Coalesced });
        };

        let snapshot = self.events.load(namespace).await.map_err(PipelineError::Store)?;
        let from = snapshot.next_block();
        let latest = self
            .config
            .retry
            .execute("eth_blockNumber", || self.logs.block_number())
            .await
            .map_err(PipelineError::Upstream)?;

        if from > latest {
            tracing::debug!("{} is up to date at block {}", namespace, latest);
            return Ok(SyncReport { events: snapshot.events, status: SyncStatus::UpToDate });
        }

        tracing::info!(
            "Scanning {} for {} events from block {} to {}",
            namespace,
            query.event.as_str(),
            from,
            latest
        );
        let logs = &self.logs;
        let outcome = self
            .scanner
            .scan(from, latest, |range| async move {
                let raw = logs.logs(query, range).await?;
                Ok(decode_logs(&raw, query.event))
            })
            .await;

        let complete = outcome.is_complete();
        let completion = if complete {
            PassCompletion::Complete { through: latest }
        } else {
            PassCompletion::Partial
        };
        let summary = self
            .events
            .save(namespace, &outcome.events, completion)
            .await
            .map_err(PipelineError::Store)?;
        let contiguous = outcome.contiguous_through();
        let events = merge_events(snapshot.events, outcome.events);

        let status = if complete {
            tracing::info!(
                "Scanned {} through block {} ({} new events, {} total)",
                namespace,
                latest,
                summary.inserted,
                events.len()
            );
            SyncStatus::Complete { through: latest }
        } else {
            tracing::error!(
                "Scan of {} skipped {} sub-ranges (contiguous through {:?}); checkpoint held at {:?}",
                namespace,
                outcome.failed.len(),
                contiguous,
                summary.checkpoint
            );
            SyncStatus::Partial { failed_ranges: outcome.failed, checkpoint: summary.checkpoint }
        };
        Ok(SyncReport { events, status })
    }

    /// Betting token metadata, fetched on first use.
    pub async fn token_info(&self) -> Result<&TokenInfo, PipelineError> {
        self.token
            .get_or_try_init(|| async {
                self.config
                    .retry
                    .execute("token metadata", || self.market_source.token_info())
                    .await
                    .map_err(PipelineError::Upstream)
            })
            .await
    }

    /// The leaderboard, served from cache while fresh.
    pub async fn leaderboard(&self) -> Result<Leaderboard, PipelineError> {
        if let Some(cached) = self.leaderboards.get(&winnings_namespace()).await {
            return Ok(cached);
        }
        self.refresh_leaderboard().await
    }

    /// Sync winnings and rebuild the leaderboard.
    pub async fn refresh_leaderboard(&self) -> Result<Leaderboard, PipelineError> {
        let namespace = winnings_namespace();
        let query = LogQuery::new(self.config.market_address, EventType::WinningsClaimed);
        let report = self.sync(&namespace, &query).await?;
        let token = self.token_info().await?;

        let winnings = aggregate_winnings(&report.events, token.decimals);
        let ranked = rank_winnings(winnings, self.config.leaderboard_size);
        let addresses: Vec<Address> = ranked.iter().map(|entry| entry.address).collect();
        let identities = self.identities.resolve(&addresses).await?;

        let leaderboard = Leaderboard {
            entries: build_leaderboard(&ranked, &identities),
            token_symbol: token.symbol.clone(),
            last_updated_ms: chrono::Utc::now().timestamp_millis(),
            complete: report.status.is_complete(),
        };
        if leaderboard.complete {
            self.leaderboards.insert(namespace, leaderboard.clone()).await;
        }
        tracing::info!(
            "Built leaderboard with {} entries from {} events",
            leaderboard.entries.len(),
            report.events.len()
        );
        Ok(leaderboard)
    }

    /// Sync a user's purchases and return them joined with market metadata.
    pub async fn vote_history(
        &self,
        user: Address,
        query: &VoteQuery,
    ) -> Result<VoteHistory, PipelineError> {
        let namespace = votes_namespace(&user);
        let log_query = LogQuery::new(self.config.market_address, EventType::SharesPurchased)
            .for_participant(user);
        let report = self.sync(&namespace, &log_query).await?;
        let token = self.token_info().await?;

        let markets = self.markets.ensure(&purchased_market_ids(&report.events)).await;
        let mut votes = aggregate_votes(&report.events, &markets, token.decimals)
            .remove(&user)
            .unwrap_or_default();

        let timestamps =
            self.block_timestamps(votes.iter().map(|vote| vote.block_number).collect()).await;
        for vote in &mut votes {
            vote.timestamp = timestamps.get(&vote.block_number).copied();
        }

        Ok(VoteHistory {
            address: user,
            token_symbol: token.symbol.clone(),
            votes: query_votes(votes, query),
            complete: report.status.is_complete(),
        })
    }

    /// Timestamps for `blocks`; blocks that cannot be fetched are omitted.
    ///
    /// Stored timestamps are used as-is; only missing blocks are fetched, then stored.
    async fn block_timestamps(&self, blocks: BTreeSet<u64>) -> HashMap<u64, u64> {
        let blocks: Vec<u64> = blocks.into_iter().collect();
        let mut timestamps = match self.store.block_timestamps(&blocks).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("Failed to read stored block timestamps: {:#}", err);
                HashMap::new()
            }
        };

        let missing: Vec<u64> =
            blocks.into_iter().filter(|block| !timestamps.contains_key(block)).collect();
        if missing.is_empty() {
            return timestamps;
        }

        tracing::debug!("Fetching timestamps for {} blocks", missing.len());
        let retry = &self.config.retry;
        let logs = &self.logs;
        let fetched: Vec<(u64, u64)> = stream::iter(missing)
            .map(|block| async move {
                let label = format!("eth_getBlockByNumber {block}");
                match retry.execute(&label, || logs.block_timestamp(block)).await {
                    Ok(timestamp) => timestamp.map(|timestamp| (block, timestamp)),
                    Err(err) => {
                        tracing::warn!("Failed to fetch timestamp of block {}: {:#}", block, err);
                        None
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .filter_map(|entry| async move { entry })
            .collect()
            .await;

        if !fetched.is_empty() {
            if let Err(err) = self.store.put_block_timestamps(&fetched).await {
                tracing::warn!("Failed to store {} block timestamps: {:#}", fetched.len(), err);
            }
        }
        timestamps.extend(fetched);
        timestamps
    }
}
