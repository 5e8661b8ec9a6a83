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

//! Folding of deduplicated events into winnings totals and vote histories.
//!
//! Everything here is a pure function of the event set: feeding the same events twice, in any
//! order, yields identical output.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use alloy::primitives::{utils::format_units, Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    events::{EventKind, RawEvent},
    markets::MarketMetadata,
};

/// Convert base units to a display amount, `raw / 10^decimals`.
pub fn to_display_amount(raw: U256, decimals: u8) -> f64 {
    match format_units(raw, decimals) {
        Ok(formatted) => formatted.parse().unwrap_or_default(),
        Err(err) => {
            tracing::warn!("Cannot format {} with {} decimals: {}", raw, decimals, err);
            0.0
        }
    }
}

/// Total winnings claimed by one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinningsEntry {
    pub address: Address,
    /// Exact sum in token base units.
    pub raw_amount: U256,
    pub amount: f64,
}

/// One share purchase, joined with its market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteEntry {
    pub market_id: U256,
    pub market_name: String,
    /// Label of the option the shares were bought for.
    pub option: String,
    pub amount: f64,
    pub raw_amount: U256,
    pub block_number: u64,
    /// Block timestamp in seconds, when known.
    pub timestamp: Option<u64>,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// Unique events in chronological order.
fn unique_events(events: &[RawEvent]) -> Vec<&RawEvent> {
    let mut seen = HashSet::new();
    let mut unique: Vec<&RawEvent> = events.iter().filter(|event| seen.insert(event.key())).collect();
    unique.sort_by_key(|event| event.position());
    unique
}

/// Sum claimed winnings per address, ordered by address.
pub fn aggregate_winnings(events: &[RawEvent], decimals: u8) -> Vec<WinningsEntry> {
    let mut totals: BTreeMap<Address, U256> = BTreeMap::new();
    for event in unique_events(events) {
        if let EventKind::WinningsClaimed { user, amount, .. } = &event.kind {
            let total = totals.entry(*user).or_default();
            *total = total.saturating_add(*amount);
        }
    }

    totals
        .into_iter()
        .map(|(address, raw_amount)| WinningsEntry {
            address,
            raw_amount,
            amount: to_display_amount(raw_amount, decimals),
        })
        .collect()
}

/// Market ids referenced by purchase events.
pub fn purchased_market_ids(events: &[RawEvent]) -> BTreeSet<U256> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::SharesPurchased { market_id, .. } => Some(*market_id),
            _ => None,
        })
        .collect()
}

/// Chronological vote history per buyer.
///
/// Purchases of markets missing from `markets` are dropped with a warning.
pub fn aggregate_votes(
    events: &[RawEvent],
    markets: &HashMap<U256, MarketMetadata>,
    decimals: u8,
) -> BTreeMap<Address, Vec<VoteEntry>> {
    let mut votes: BTreeMap<Address, Vec<VoteEntry>> = BTreeMap::new();
    let mut dropped = 0usize;

    for event in unique_events(events) {
        let EventKind::SharesPurchased { market_id, buyer, is_option_a, amount } = &event.kind
        else {
            continue;
        };
        let Some(market) = markets.get(market_id) else {
            tracing::warn!(
                "Dropping purchase {:#x}:{} of market {} without metadata",
                event.transaction_hash,
                event.log_index,
                market_id
            );
            dropped += 1;
            continue;
        };

        votes.entry(*buyer).or_default().push(VoteEntry {
            market_id: *market_id,
            market_name: market.question.clone(),
            option: market.option_label(*is_option_a).to_string(),
            amount: to_display_amount(*amount, decimals),
            raw_amount: *amount,
            block_number: event.block_number,
            timestamp: None,
            transaction_hash: event.transaction_hash,
            log_index: event.log_index,
        });
    }

    if dropped > 0 {
        tracing::warn!("Dropped {} purchases with unresolved markets", dropped);
    }
    votes
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use tracing_test::traced_test;

    use super::*;

    const ALICE: Address = address!("0x00000000000000000000000000000000000000a1");
    const BOB: Address = address!("0x00000000000000000000000000000000000000b2");

    fn claim(block_number: u64, log_index: u64, user: Address, amount: u128) -> RawEvent {
        RawEvent {
            block_number,
            transaction_hash: B256::with_last_byte(block_number as u8),
            log_index,
            kind: EventKind::WinningsClaimed {
                market_id: U256::from(1),
                user,
                amount: U256::from(amount),
            },
        }
    }

    fn purchase(block_number: u64, market_id: u64, is_option_a: bool) -> RawEvent {
        RawEvent {
            block_number,
            transaction_hash: B256::with_last_byte(block_number as u8),
            log_index: 0,
            kind: EventKind::SharesPurchased {
                market_id: U256::from(market_id),
                buyer: ALICE,
                is_option_a,
                amount: U256::from(2_500_000u64),
            },
        }
    }

    #[test]
    fn test_winnings_in_display_units() {
        let winnings = aggregate_winnings(&[claim(10, 0, ALICE, 5_000_000_000_000_000_000)], 18);
        assert_eq!(winnings.len(), 1);
        assert_eq!(winnings[0].address, ALICE);
        assert_eq!(winnings[0].amount, 5.0);
    }

    #[test]
    fn test_winnings_are_idempotent() {
        let events = vec![claim(10, 0, ALICE, 1_500_000), claim(11, 1, BOB, 250_000)];
        let mut doubled = events.clone();
        doubled.extend(events.iter().rev().cloned());

        let once = aggregate_winnings(&events, 6);
        let twice = aggregate_winnings(&doubled, 6);
        assert_eq!(once, twice);
        assert_eq!(once[0].amount, 1.5);
        assert_eq!(once[1].amount, 0.25);
    }

    #[test]
    #[traced_test]
    fn test_votes_join_markets_and_drop_unknown() {
        let markets = HashMap::from([(
            U256::from(1),
            MarketMetadata {
                market_id: U256::from(1),
                question: "Will it rain?".into(),
                option_a: "Yes".into(),
                option_b: "No".into(),
            },
        )]);
        let events = vec![purchase(30, 1, false), purchase(20, 1, true), purchase(25, 9, true)];

        let votes = aggregate_votes(&events, &markets, 6);
        let alice = &votes[&ALICE];
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].block_number, 20);
        assert_eq!(alice[0].option, "Yes");
        assert_eq!(alice[1].option, "No");
        assert_eq!(alice[1].market_name, "Will it rain?");
        assert_eq!(alice[1].amount, 2.5);
        assert!(logs_contain("without metadata"));
    }
}
