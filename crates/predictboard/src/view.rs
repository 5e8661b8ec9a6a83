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

//! Externally consumed shapes: the ranked leaderboard and queried vote lists.

use std::{cmp::Ordering, collections::HashMap};

use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{VoteEntry, WinningsEntry},
    identity::{display_name, Identity},
};

/// Order by winnings descending, then address ascending, keeping the first `top_n`.
pub fn rank_winnings(mut entries: Vec<WinningsEntry>, top_n: usize) -> Vec<WinningsEntry> {
    entries.sort_by(|a, b| b.raw_amount.cmp(&a.raw_amount).then_with(|| a.address.cmp(&b.address)));
    entries.truncate(top_n);
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub address: Address,
    /// Resolved username, or the shortened address.
    pub display_name: String,
    pub numeric_id: Option<u64>,
    pub avatar_url: Option<String>,
    pub amount: f64,
    pub raw_amount: U256,
}

/// Attach identities to ranked entries.
pub fn build_leaderboard(
    ranked: &[WinningsEntry],
    identities: &HashMap<Address, Option<Identity>>,
) -> Vec<LeaderboardEntry> {
    ranked
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let identity = identities.get(&entry.address).and_then(Option::as_ref);
            LeaderboardEntry {
                rank: index + 1,
                address: entry.address,
                display_name: display_name(&entry.address, identity),
                numeric_id: identity.map(|identity| identity.numeric_id),
                avatar_url: identity.and_then(|identity| identity.avatar_url.clone()),
                amount: entry.amount,
                raw_amount: entry.raw_amount,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteSortKey {
    MarketId,
    MarketName,
    Option,
    Amount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Client-side vote list query. Without a sort key the list stays chronological.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteQuery {
    pub sort: Option<VoteSortKey>,
    #[serde(default)]
    pub direction: SortDirection,
    /// Case-insensitive substring matched against the market name or option label.
    pub search: Option<String>,
}

fn compare_votes(a: &VoteEntry, b: &VoteEntry, key: VoteSortKey) -> Ordering {
    match key {
        VoteSortKey::MarketId => a.market_id.cmp(&b.market_id),
        VoteSortKey::MarketName => {
            a.market_name.to_lowercase().cmp(&b.market_name.to_lowercase())
        }
        VoteSortKey::Option => a.option.to_lowercase().cmp(&b.option.to_lowercase()),
        VoteSortKey::Amount => a.raw_amount.cmp(&b.raw_amount),
    }
}

/// Filter and sort a vote list. Nothing is truncated.
pub fn query_votes(votes: Vec<VoteEntry>, query: &VoteQuery) -> Vec<VoteEntry> {
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|needle| !needle.is_empty())
        .map(str::to_lowercase);

    let mut votes: Vec<VoteEntry> = match needle {
        Some(needle) => votes
            .into_iter()
            .filter(|vote| {
                vote.market_name.to_lowercase().contains(&needle)
                    || vote.option.to_lowercase().contains(&needle)
            })
            .collect(),
        None => votes,
    };

    if let Some(key) = query.sort {
        // Stable, so equal keys keep their chronological order.
        votes.sort_by(|a, b| {
            let ordering = compare_votes(a, b, key);
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
    votes
}
