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

//! Incremental indexing of prediction-market events into leaderboards and vote histories.
//!
//! Events are scanned from the chain in provider-sized block ranges, merged into a durable
//! per-namespace log behind a checkpoint, and folded into derived views on demand.

use std::time::Duration;

pub mod aggregate;
pub mod cache;
pub mod chain;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod flight;
pub mod identity;
pub mod markets;
pub mod pipeline;
pub mod retry;
pub mod scanner;
pub mod store;
pub mod view;

pub use aggregate::{aggregate_votes, aggregate_winnings, to_display_amount, VoteEntry, WinningsEntry};
pub use cache::{EventCache, PassCompletion, Snapshot, TtlCache};
pub use chain::{ChainSource, LogSource, MarketSource, RpcChain};
pub use errors::PipelineError;
pub use events::{decode_log, merge_events, EventKey, EventKind, EventType, LogQuery, RawEvent};
pub use flight::SingleFlight;
pub use identity::{
    fallback_display, HttpIdentityLookup, Identity, IdentityLookup, IdentityResolver,
    DEFAULT_IDENTITY_API_URL,
};
pub use markets::{MarketCatalog, MarketMetadata, TokenInfo};
pub use pipeline::{
    votes_namespace, winnings_namespace, Leaderboard, Pipeline, PipelineConfig, SyncReport,
    SyncStatus, VoteHistory,
};
pub use retry::{classify, ErrorClass, RetryPolicy};
pub use scanner::{split_ranges, BlockRange, RangeScanner, ScanOutcome};
pub use store::{
    BlockStore, EventStore, IdentityStore, IndexerStore, MarketStore, MemoryStore, SaveSummary,
    StoreObj,
};
pub use view::{LeaderboardEntry, SortDirection, VoteQuery, VoteSortKey};

/// Maximum block span of a single `eth_getLogs` call.
pub const DEFAULT_RANGE_SIZE: u64 = 500;

/// Block the market contract was deployed at.
pub const DEFAULT_GENESIS_BLOCK: u64 = 0;

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// How long derived views such as the leaderboard are served from cache.
pub const DEFAULT_DERIVED_TTL: Duration = Duration::from_secs(300);

/// Versioned namespace keys; bumping the suffix invalidates previously stored state.
pub const WINNINGS_NAMESPACE: &str = "winnings_v3";
pub const VOTES_NAMESPACE_PREFIX: &str = "votes_v3";
