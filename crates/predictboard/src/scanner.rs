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

//! Chunked block-range scanning within provider limits.

use std::{fmt, future::Future};

use futures_util::{stream, StreamExt};

use crate::{events::RawEvent, retry::RetryPolicy};

/// A closed block interval `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Split `[from, to]` into consecutive sub-ranges of at most `size` blocks.
pub fn split_ranges(from: u64, to: u64, size: u64) -> Vec<BlockRange> {
    let size = size.max(1);
    let mut ranges = Vec::new();
    let mut current_from = from;
    while current_from <= to {
        let current_to = current_from.saturating_add(size - 1).min(to);
        ranges.push(BlockRange { from: current_from, to: current_to });
        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }
    ranges
}

/// Result of one scan pass.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub from_block: u64,
    pub to_block: u64,
    /// Events from every successful sub-range, sorted by `(block_number, log_index)`.
    pub events: Vec<RawEvent>,
    /// Sub-ranges that exhausted their retries, in block order.
    pub failed: Vec<BlockRange>,
}

impl ScanOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Highest block up to which every sub-range succeeded, if any.
    pub fn contiguous_through(&self) -> Option<u64> {
        match self.failed.first() {
            None => Some(self.to_block),
            Some(first) if first.from > self.from_block => Some(first.from - 1),
            Some(_) => None,
        }
    }
}

/// Walks a block interval in provider-sized sub-ranges.
#[derive(Debug, Clone)]
pub struct RangeScanner {
    pub range_size: u64,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for RangeScanner {
    fn default() -> Self {
        Self { range_size: crate::DEFAULT_RANGE_SIZE, concurrency: 2, retry: RetryPolicy::default() }
    }
}

impl RangeScanner {
    /// Fetch events for `[from, to]`, one retried call per sub-range.
    ///
    /// Sub-ranges that exhaust their retries are logged and reported in
    /// [ScanOutcome::failed]; the rest of the scan continues.
    pub async fn scan<F, Fut>(&self, from: u64, to: u64, fetch: F) -> ScanOutcome
    where
        F: Fn(BlockRange) -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<RawEvent>>>,
    {
        let ranges = split_ranges(from, to, self.range_size);
        tracing::debug!(
            "Scanning blocks {}..={} in {} sub-ranges (concurrency {})",
            from,
            to,
            ranges.len(),
            self.concurrency
        );

        let fetch = &fetch;
        let retry = &self.retry;
        let mut results: Vec<(BlockRange, anyhow::Result<Vec<RawEvent>>)> =
            stream::iter(ranges)
                .map(|range| async move {
                    let label = format!("eth_getLogs {range}");
                    let result = retry.execute(&label, || fetch(range)).await;
                    (range, result)
                })
                .buffer_unordered(self.concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(range, _)| *range);

        let mut events = Vec::new();
        let mut failed = Vec::new();
        for (range, result) in results {
            match result {
                Ok(mut range_events) => {
                    tracing::debug!("Fetched {} events in {}", range_events.len(), range);
                    events.append(&mut range_events);
                }
                Err(err) => {
                    tracing::error!("Skipping sub-range {} after exhausting retries: {:#}", range, err);
                    failed.push(range);
                }
            }
        }
        events.sort_by_key(RawEvent::position);

        ScanOutcome { from_block: from, to_block: to, events, failed }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use alloy::primitives::{Address, B256, U256};
    use anyhow::anyhow;
    use tracing_test::traced_test;

    use super::*;
    use crate::{events::EventKind, retry::RetryPolicy};

    fn event(block_number: u64, log_index: u64) -> RawEvent {
        RawEvent {
            block_number,
            transaction_hash: B256::with_last_byte(log_index as u8),
            log_index,
            kind: EventKind::WinningsClaimed {
                market_id: U256::from(1),
                user: Address::ZERO,
                amount: U256::from(1),
            },
        }
    }

    fn quick_scanner() -> RangeScanner {
        RangeScanner {
            range_size: 500,
            concurrency: 2,
            retry: RetryPolicy { max_retries: 1, ..RetryPolicy::default() },
        }
    }

    #[test]
    fn test_split_ranges() {
        assert_eq!(
            split_ranges(1000, 2499, 500),
            vec![
                BlockRange { from: 1000, to: 1499 },
                BlockRange { from: 1500, to: 1999 },
                BlockRange { from: 2000, to: 2499 },
            ]
        );
        assert_eq!(split_ranges(42, 42, 500), vec![BlockRange { from: 42, to: 42 }]);
        assert_eq!(
            split_ranges(0, 1200, 500).last(),
            Some(&BlockRange { from: 1000, to: 1200 })
        );
        assert!(split_ranges(100, 99, 500).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_covers_ranges_and_orders_events() {
        let requested = Mutex::new(Vec::new());
        let outcome = quick_scanner()
            .scan(1000, 2499, |range| {
                requested.lock().unwrap().push(range);
                async move {
                    // Later ranges return first and out of order within the range.
                    tokio::time::sleep(std::time::Duration::from_millis(3000 - range.from)).await;
                    Ok(vec![event(range.to, 2), event(range.from, 1)])
                }
            })
            .await;

        let mut requested = requested.into_inner().unwrap();
        requested.sort();
        assert_eq!(requested, split_ranges(1000, 2499, 500));
        assert!(outcome.is_complete());
        assert_eq!(outcome.contiguous_through(), Some(2499));

        let positions: Vec<_> = outcome.events.iter().map(RawEvent::position).collect();
        assert_eq!(
            positions,
            vec![(1000, 1), (1499, 2), (1500, 1), (1999, 2), (2000, 1), (2499, 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_scan_skips_failed_range() {
        let outcome = quick_scanner()
            .scan(1000, 2499, |range| async move {
                if range.from == 1500 {
                    Err(anyhow!("connection reset"))
                } else {
                    Ok(vec![event(range.from, 0)])
                }
            })
            .await;

        assert!(!outcome.is_complete());
        assert_eq!(outcome.failed, vec![BlockRange { from: 1500, to: 1999 }]);
        assert_eq!(outcome.contiguous_through(), Some(1499));
        let blocks: Vec<_> = outcome.events.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![1000, 2000]);
        assert!(logs_contain("Skipping sub-range [1500, 1999]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_first_range_failed_has_no_clean_prefix() {
        let outcome = quick_scanner()
            .scan(1000, 1999, |range| async move {
                if range.from == 1000 {
                    Err(anyhow!("boom"))
                } else {
                    Ok(vec![])
                }
            })
            .await;

        assert_eq!(outcome.contiguous_through(), None);
    }
}
