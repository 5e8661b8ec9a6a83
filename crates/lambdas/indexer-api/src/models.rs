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


use predictboard::{LeaderboardEntry, SortDirection, VoteEntry, VoteQuery, VoteSortKey};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::utils::format_token;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// Ranked winner
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryResponse {
    /// Rank in the leaderboard (1-based)
    pub rank: u64,

    /// Ethereum address of the winner
    pub address: String,

    /// Username, or a shortened address when no profile exists
    pub display_name: String,

    /// Numeric profile id, if a profile exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<u64>,

    /// Profile picture URL, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Total winnings in display units
    pub amount: f64,

    /// Total winnings in base units
    pub raw_amount: String,

    /// Total winnings (human-readable)
    pub amount_formatted: String,
}

impl LeaderboardEntryResponse {
    pub fn from_entry(entry: &LeaderboardEntry, decimals: u8, symbol: &str) -> Self {
        Self {
            rank: entry.rank as u64,
            address: format!("{:#x}", entry.address),
            display_name: entry.display_name.clone(),
            numeric_id: entry.numeric_id,
            avatar_url: entry.avatar_url.clone(),
            amount: entry.amount,
            raw_amount: entry.raw_amount.to_string(),
            amount_formatted: format_token(entry.raw_amount, decimals, symbol),
        }
    }
}

/// Response for the leaderboard endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntryResponse>,

    /// Symbol of the betting token
    pub token_symbol: String,

    /// When the leaderboard was built (Unix milliseconds)
    pub last_updated_ms: i64,

    /// False when some block ranges could not be scanned
    pub complete: bool,
}

/// A single share purchase
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteEntryResponse {
    pub market_id: String,
    pub market_name: String,

    /// Label of the option the shares were bought for
    pub option: String,

    pub amount: f64,
    pub raw_amount: String,
    pub amount_formatted: String,
    pub block_number: u64,

    /// Block timestamp (Unix seconds), when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    pub transaction_hash: String,
    pub log_index: u64,
}

impl VoteEntryResponse {
    pub fn from_entry(entry: &VoteEntry, decimals: u8, symbol: &str) -> Self {
        Self {
            market_id: entry.market_id.to_string(),
            market_name: entry.market_name.clone(),
            option: entry.option.clone(),
            amount: entry.amount,
            raw_amount: entry.raw_amount.to_string(),
            amount_formatted: format_token(entry.raw_amount, decimals, symbol),
            block_number: entry.block_number,
            timestamp: entry.timestamp,
            transaction_hash: format!("{:#x}", entry.transaction_hash),
            log_index: entry.log_index,
        }
    }
}

/// Response for the vote history endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VotesResponse {
    pub address: String,
    pub token_symbol: String,
    pub votes: Vec<VoteEntryResponse>,

    /// False when some block ranges could not be scanned
    pub complete: bool,
}

/// Column to sort votes by
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoteSort {
    MarketId,
    MarketName,
    Option,
    Amount,
}

impl From<VoteSort> for VoteSortKey {
    fn from(sort: VoteSort) -> Self {
        match sort {
            VoteSort::MarketId => VoteSortKey::MarketId,
            VoteSort::MarketName => VoteSortKey::MarketName,
            VoteSort::Option => VoteSortKey::Option,
            VoteSort::Amount => VoteSortKey::Amount,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Query parameters for the vote history endpoint
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VotesParams {
    /// Sort column; votes are returned in chronological order when absent
    pub sort: Option<VoteSort>,

    /// Sort direction (default: asc)
    pub direction: Option<Direction>,

    /// Case-insensitive filter on market name and option
    pub search: Option<String>,
}

impl VotesParams {
    pub fn into_query(self) -> VoteQuery {
        VoteQuery {
            sort: self.sort.map(VoteSortKey::from),
            direction: match self.direction {
                Some(Direction::Desc) => SortDirection::Desc,
                _ => SortDirection::Asc,
            },
            search: self.search.filter(|term| !term.trim().is_empty()),
        }
    }
}
