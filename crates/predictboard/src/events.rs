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

//! Typed market events and log decoding.

use std::collections::BTreeMap;

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::{BlockNumberOrTag, Filter, Log},
    sol_types::SolEvent,
};
use serde::{Deserialize, Serialize};

use crate::{contracts::IPredictionMarket, scanner::BlockRange};

/// The market events the pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A share purchase, i.e. a vote for one side of a market.
    SharesPurchased,
    /// A payout claimed by a winning participant.
    WinningsClaimed,
}

impl EventType {
    pub fn signature_hash(&self) -> B256 {
        match self {
            EventType::SharesPurchased => IPredictionMarket::SharesPurchased::SIGNATURE_HASH,
            EventType::WinningsClaimed => IPredictionMarket::Claimed::SIGNATURE_HASH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SharesPurchased => "shares_purchased",
            EventType::WinningsClaimed => "winnings_claimed",
        }
    }
}

/// Decoded event payload, validated at ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SharesPurchased { market_id: U256, buyer: Address, is_option_a: bool, amount: U256 },
    WinningsClaimed { market_id: U256, user: Address, amount: U256 },
}

/// Identity of an observed event. Block numbers are never part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// An immutable, decoded on-chain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
    pub kind: EventKind,
}

impl RawEvent {
    pub fn key(&self) -> EventKey {
        EventKey { transaction_hash: self.transaction_hash, log_index: self.log_index }
    }

    pub fn event_type(&self) -> EventType {
        match self.kind {
            EventKind::SharesPurchased { .. } => EventType::SharesPurchased,
            EventKind::WinningsClaimed { .. } => EventType::WinningsClaimed,
        }
    }

    /// Sort key for chronological ordering.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// A log query against the market contract, optionally narrowed to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub contract: Address,
    pub event: EventType,
    /// Matches the indexed `buyer` / `user` argument (second topic).
    pub participant: Option<Address>,
}

impl LogQuery {
    pub fn new(contract: Address, event: EventType) -> Self {
        Self { contract, event, participant: None }
    }

    pub fn for_participant(mut self, participant: Address) -> Self {
        self.participant = Some(participant);
        self
    }

    /// Build the provider filter for a closed block range.
    pub fn filter(&self, range: BlockRange) -> Filter {
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(self.event.signature_hash())
            .from_block(BlockNumberOrTag::Number(range.from))
            .to_block(BlockNumberOrTag::Number(range.to));
        match self.participant {
            Some(participant) => filter.topic2(participant.into_word()),
            None => filter,
        }
    }
}

/// Decode a provider log into a [RawEvent].
///
/// Logs that are not market events, lack positional metadata, or fail ABI decoding are
/// discarded with a warning.
pub fn decode_log(log: &Log) -> Option<RawEvent> {
    let topic0 = *log.topic0()?;

    let (Some(block_number), Some(transaction_hash), Some(log_index)) =
        (log.block_number, log.transaction_hash, log.log_index)
    else {
        tracing::warn!(
            "Discarding log without block/transaction/index metadata: {:?}",
            log.transaction_hash
        );
        return None;
    };

    let kind = if topic0 == IPredictionMarket::SharesPurchased::SIGNATURE_HASH {
        match log.log_decode::<IPredictionMarket::SharesPurchased>() {
            Ok(decoded) => {
                let data = decoded.inner.data;
                EventKind::SharesPurchased {
                    market_id: data.marketId,
                    buyer: data.buyer,
                    is_option_a: data.isOptionA,
                    amount: data.amount,
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Discarding malformed SharesPurchased log {:#x}:{}: {}",
                    transaction_hash,
                    log_index,
                    err
                );
                return None;
            }
        }
    } else if topic0 == IPredictionMarket::Claimed::SIGNATURE_HASH {
        match log.log_decode::<IPredictionMarket::Claimed>() {
            Ok(decoded) => {
                let data = decoded.inner.data;
                EventKind::WinningsClaimed {
                    market_id: data.marketId,
                    user: data.user,
                    amount: data.amount,
                }
            }
            Err(err) => {
                tracing::warn!(
                    "Discarding malformed Claimed log {:#x}:{}: {}",
                    transaction_hash,
                    log_index,
                    err
                );
                return None;
            }
        }
    } else {
        tracing::debug!("Ignoring log with unknown signature {}", topic0);
        return None;
    };

    Some(RawEvent { block_number, transaction_hash, log_index, kind })
}

/// Decode a batch of logs, keeping only events of the expected type.
pub fn decode_logs(logs: &[Log], expected: EventType) -> Vec<RawEvent> {
    logs.iter().filter_map(decode_log).filter(|event| event.event_type() == expected).collect()
}

/// Set-union of two event collections keyed by [EventKey], in chronological order.
///
/// When both sides carry the same key the already-known event wins.
pub fn merge_events(known: Vec<RawEvent>, incoming: Vec<RawEvent>) -> Vec<RawEvent> {
    let mut by_key: BTreeMap<EventKey, RawEvent> = BTreeMap::new();
    for event in known.into_iter().chain(incoming) {
        by_key.entry(event.key()).or_insert(event);
    }
    let mut merged: Vec<RawEvent> = by_key.into_values().collect();
    merged.sort_by_key(RawEvent::position);
    merged
}
