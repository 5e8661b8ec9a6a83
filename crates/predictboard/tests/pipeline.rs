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

use std::{sync::Arc, time::Duration};

use alloy::primitives::{address, Address, U256};
use predictboard::{
    fallback_display, winnings_namespace, BlockRange, BlockStore, EventStore, EventType, LogQuery,
    MarketMetadata, MemoryStore, Pipeline, PipelineConfig, PipelineError, RetryPolicy, SyncStatus,
    TokenInfo, VoteQuery, WINNINGS_NAMESPACE,
};
use predictboard_test_utils::{
    chain::GENESIS_TIMESTAMP, claim_log, purchase_log, MockChain, MockIdentityLookup,
};
use tracing_test::traced_test;

const MARKET: Address = address!("0x5555555555555555555555555555555555555555");
const ALICE: Address = address!("0x000000000000000000000000000000000000000a");
const BOB: Address = address!("0x000000000000000000000000000000000000000b");
const CAROL: Address = address!("0x000000000000000000000000000000000000000c");
const GENESIS: u64 = 1000;

struct Harness {
    chain: Arc<MockChain>,
    lookup: Arc<MockIdentityLookup>,
    store: Arc<MemoryStore>,
    pipeline: Pipeline,
}

fn harness_with(head: u64, lookup: MockIdentityLookup) -> Harness {
    let chain = Arc::new(MockChain::new(MARKET, head));
    let lookup = Arc::new(lookup);
    let store = Arc::new(MemoryStore::new());
    let config = PipelineConfig {
        range_size: 500,
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            rate_limit_floor: Duration::from_millis(10),
        },
        ..PipelineConfig::new(MARKET, GENESIS)
    };
    let pipeline = Pipeline::new(chain.clone(), store.clone(), lookup.clone(), config);
    Harness { chain, lookup, store, pipeline }
}

fn harness(head: u64) -> Harness {
    harness_with(head, MockIdentityLookup::new())
}

fn winnings_query() -> LogQuery {
    LogQuery::new(MARKET, EventType::WinningsClaimed)
}

fn units(whole: u64) -> U256 {
    U256::from(whole) * U256::from(1_000_000u64)
}

#[tokio::test(start_paused = true)]
async fn test_sync_is_incremental_and_idempotent() {
    let h = harness(2499);
    h.chain
        .push_logs([
            claim_log(MARKET, 1000, 0, ALICE, units(1)),
            claim_log(MARKET, 1600, 3, BOB, units(2)),
            claim_log(MARKET, 2400, 1, ALICE, units(3)),
        ])
        .await;

    let first = h.pipeline.sync(WINNINGS_NAMESPACE, &winnings_query()).await.unwrap();
    assert_eq!(first.status, SyncStatus::Complete { through: 2499 });
    assert_eq!(first.events.len(), 3);
    assert_eq!(
        h.chain.requested_ranges().await,
        vec![
            BlockRange { from: 1000, to: 1499 },
            BlockRange { from: 1500, to: 1999 },
            BlockRange { from: 2000, to: 2499 },
        ]
    );

    let second = h.pipeline.sync(WINNINGS_NAMESPACE, &winnings_query()).await.unwrap();
    assert_eq!(second.status, SyncStatus::UpToDate);
    assert_eq!(second.events, first.events);
    assert_eq!(h.chain.requested_ranges().await.len(), 3);

    h.chain.push_logs([claim_log(MARKET, 2700, 0, CAROL, units(4))]).await;
    h.chain.set_head(2999).await;
    let third = h.pipeline.sync(WINNINGS_NAMESPACE, &winnings_query()).await.unwrap();
    assert_eq!(third.status, SyncStatus::Complete { through: 2999 });
    assert_eq!(third.events.len(), 4);
    assert_eq!(h.chain.requested_ranges().await.last(), Some(&BlockRange { from: 2500, to: 2999 }));

    let leaderboard = h.pipeline.refresh_leaderboard().await.unwrap();
    let again = h.pipeline.refresh_leaderboard().await.unwrap();
    assert_eq!(leaderboard.entries, again.entries);
    assert_eq!(leaderboard.entries[0].address, ALICE);
    assert_eq!(leaderboard.entries[0].amount, 4.0);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_partial_failure_holds_checkpoint() {
    let h = harness(2499);
    h.chain
        .push_logs([
            claim_log(MARKET, 1000, 0, ALICE, units(1)),
            claim_log(MARKET, 1600, 0, BOB, units(2)),
            claim_log(MARKET, 2400, 0, CAROL, units(3)),
        ])
        .await;
    h.chain.fail_range(1500, 2).await;

    let report = h.pipeline.sync(WINNINGS_NAMESPACE, &winnings_query()).await.unwrap();
    assert_eq!(
        report.status,
        SyncStatus::Partial {
            failed_ranges: vec![BlockRange { from: 1500, to: 1999 }],
            checkpoint: None,
        }
    );
    let blocks: Vec<u64> = report.events.iter().map(|e| e.block_number).collect();
    assert_eq!(blocks, vec![1000, 2400]);
    assert_eq!(h.store.checkpoint(WINNINGS_NAMESPACE).await.unwrap(), None);
    assert!(logs_contain("Skipping sub-range [1500, 1999]"));

    let healed = h.pipeline.sync(WINNINGS_NAMESPACE, &winnings_query()).await.unwrap();
    assert_eq!(healed.status, SyncStatus::Complete { through: 2499 });
    let blocks: Vec<u64> = healed.events.iter().map(|e| e.block_number).collect();
    assert_eq!(blocks, vec![1000, 1600, 2400]);
    assert_eq!(h.store.checkpoint(WINNINGS_NAMESPACE).await.unwrap(), Some(2499));
}

#[tokio::test(start_paused = true)]
async fn test_checkpoint_is_monotonic_under_failures() {
    let h = harness(GENESIS);
    let mut expected = Vec::new();
    for (i, block) in (1000..5000).step_by(250).enumerate() {
        let user = Address::with_last_byte(i as u8 + 1);
        expected.push(claim_log(MARKET, block, 0, user, units(1)));
    }
    h.chain.push_logs(expected.clone()).await;

    // (chain head, sub-range to break) per pass.
    let passes = [
        (1499, Some(1000)),
        (2499, Some(1500)),
        (2999, None),
        (3999, Some(3500)),
        (4499, Some(3500)),
        (4999, Some(4500)),
    ];
    let mut previous = None;
    for (head, broken) in passes {
        h.chain.set_head(head).await;
        if let Some(from) = broken {
            h.chain.fail_range(from, 2).await;
        }
        let report = h.pipeline.sync(WINNINGS_NAMESPACE, &winnings_query()).await.unwrap();
        let checkpoint = h.store.checkpoint(WINNINGS_NAMESPACE).await.unwrap();

        assert!(checkpoint >= previous, "checkpoint went from {previous:?} to {checkpoint:?}");
        assert!(checkpoint.unwrap_or_default() <= head);
        match broken {
            Some(_) => assert!(!report.status.is_complete()),
            None => assert_eq!(checkpoint, Some(head)),
        }
        previous = checkpoint;
    }

    let final_report = h.pipeline.sync(WINNINGS_NAMESPACE, &winnings_query()).await.unwrap();
    assert_eq!(final_report.status, SyncStatus::Complete { through: 4999 });
    assert_eq!(final_report.events.len(), expected.len());
}

#[tokio::test(start_paused = true)]
async fn test_leaderboard_ranking_and_identities() {
    let h = harness(2000);
    h.chain
        .set_token(TokenInfo {
            address: Address::repeat_byte(0x77),
            symbol: "WETH".into(),
            decimals: 18,
        })
        .await;
    let eth = |value: u128| U256::from(value) * U256::from(10u128.pow(18));
    h.chain
        .push_logs([
            claim_log(MARKET, 1100, 0, ALICE, eth(3)),
            claim_log(MARKET, 1200, 0, ALICE, eth(2)),
            claim_log(MARKET, 1300, 0, BOB, eth(5)),
            claim_log(MARKET, 1400, 0, CAROL, eth(7)),
        ])
        .await;
    h.lookup.add_profile(ALICE, "alice", 101).await;

    let leaderboard = h.pipeline.refresh_leaderboard().await.unwrap();
    assert_eq!(leaderboard.token_symbol, "WETH");
    assert!(leaderboard.complete);

    let order: Vec<Address> = leaderboard.entries.iter().map(|e| e.address).collect();
    assert_eq!(order, vec![CAROL, ALICE, BOB]);
    assert_eq!(leaderboard.entries[1].amount, 5.0);
    assert_eq!(leaderboard.entries[1].display_name, "alice");
    assert_eq!(leaderboard.entries[1].numeric_id, Some(101));
    assert_eq!(leaderboard.entries[2].display_name, fallback_display(&BOB));
    assert_eq!(leaderboard.entries[2].rank, 3);

    // Alice is now cached; addresses without a profile are looked up again.
    h.pipeline.refresh_leaderboard().await.unwrap();
    let calls = h.lookup.calls().await;
    assert_eq!(calls[0], vec![ALICE, BOB, CAROL]);
    assert_eq!(calls[1], vec![BOB, CAROL]);
}

#[tokio::test(start_paused = true)]
async fn test_leaderboard_is_cached_until_expiry() {
    let h = harness(2000);
    h.chain.push_logs([claim_log(MARKET, 1100, 0, ALICE, units(1))]).await;

    let first = h.pipeline.leaderboard().await.unwrap();
    h.chain.set_head(2100).await;
    h.chain.push_logs([claim_log(MARKET, 2050, 0, BOB, units(9))]).await;

    assert_eq!(h.pipeline.leaderboard().await.unwrap(), first);

    tokio::time::advance(Duration::from_secs(301)).await;
    let refreshed = h.pipeline.leaderboard().await.unwrap();
    assert_eq!(refreshed.entries[0].address, BOB);
    assert_eq!(refreshed.entries[0].amount, 9.0);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_identity_failure_falls_back() {
    let h = harness(2000);
    h.chain.push_logs([claim_log(MARKET, 1100, 0, ALICE, units(1))]).await;
    h.lookup.add_profile(ALICE, "alice", 1).await;
    h.lookup.fail_next(2).await;

    let leaderboard = h.pipeline.refresh_leaderboard().await.unwrap();
    assert_eq!(leaderboard.entries[0].display_name, fallback_display(&ALICE));
    assert!(logs_contain("using fallback names"));

    let leaderboard = h.pipeline.refresh_leaderboard().await.unwrap();
    assert_eq!(leaderboard.entries[0].display_name, "alice");
}

#[tokio::test(start_paused = true)]
async fn test_missing_credential_is_fatal() {
    let h = harness_with(2000, MockIdentityLookup::without_credential());
    h.chain.push_logs([claim_log(MARKET, 1100, 0, ALICE, units(1))]).await;

    let err = h.pipeline.refresh_leaderboard().await.unwrap_err();
    assert!(matches!(err, PipelineError::MissingCredential));
    assert_eq!(h.lookup.calls().await.len(), 1);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_vote_history() {
    let h = harness(2000);
    h.chain
        .add_market(MarketMetadata {
            market_id: U256::from(1),
            question: "Will it rain?".into(),
            option_a: "Yes".into(),
            option_b: "No".into(),
        })
        .await;
    h.chain
        .add_market(MarketMetadata {
            market_id: U256::from(2),
            question: "Election outcome".into(),
            option_a: "Red".into(),
            option_b: "Blue".into(),
        })
        .await;
    h.chain
        .push_logs([
            purchase_log(MARKET, 1100, 0, 1, ALICE, true, units(5)),
            purchase_log(MARKET, 1150, 0, 1, BOB, false, units(1)),
            purchase_log(MARKET, 1200, 0, 2, ALICE, false, units(2)),
            purchase_log(MARKET, 1300, 0, 3, ALICE, true, units(1)),
        ])
        .await;

    let history = h.pipeline.vote_history(ALICE, &VoteQuery::default()).await.unwrap();
    assert_eq!(history.address, ALICE);
    assert_eq!(history.token_symbol, "USDC");
    assert_eq!(history.votes.len(), 2);
    assert_eq!(history.votes[0].market_name, "Will it rain?");
    assert_eq!(history.votes[0].option, "Yes");
    assert_eq!(history.votes[0].amount, 5.0);
    assert_eq!(history.votes[0].timestamp, Some(GENESIS_TIMESTAMP + 1100 * 2));
    assert_eq!(history.votes[1].option, "Blue");
    assert!(logs_contain("without metadata"));

    let query = VoteQuery { search: Some("rain".into()), ..Default::default() };
    let filtered = h.pipeline.vote_history(ALICE, &query).await.unwrap();
    assert_eq!(filtered.votes.len(), 1);
    assert_eq!(filtered.votes[0].market_id, U256::from(1));

    // Resolved markets are fetched once; the unresolved one is retried.
    let calls = h.chain.market_calls().await;
    assert_eq!(calls, vec![vec![U256::from(1), U256::from(2), U256::from(3)], vec![U256::from(3)]]);
}

#[tokio::test(start_paused = true)]
async fn test_vote_history_fetches_each_block_timestamp_once() {
    let h = harness(2000);
    h.chain
        .add_market(MarketMetadata {
            market_id: U256::from(1),
            question: "Will it rain?".into(),
            option_a: "Yes".into(),
            option_b: "No".into(),
        })
        .await;
    h.chain
        .push_logs([
            purchase_log(MARKET, 1100, 0, 1, ALICE, true, units(1)),
            purchase_log(MARKET, 1100, 1, 1, ALICE, false, units(1)),
            purchase_log(MARKET, 1200, 0, 1, ALICE, true, units(2)),
            purchase_log(MARKET, 1300, 0, 1, ALICE, true, units(3)),
        ])
        .await;

    for _ in 0..3 {
        let history = h.pipeline.vote_history(ALICE, &VoteQuery::default()).await.unwrap();
        assert_eq!(history.votes.len(), 4);
        assert!(history.votes.iter().all(|vote| vote.timestamp.is_some()));
    }

    let mut requested = h.chain.timestamp_calls().await;
    requested.sort_unstable();
    assert_eq!(requested, vec![1100, 1200, 1300]);
    let stored = h.store.block_timestamps(&[1100, 1200, 1300]).await.unwrap();
    assert_eq!(stored[&1200], GENESIS_TIMESTAMP + 1200 * 2);

    // A new pipeline over the same store reads the stored timestamps.
    let config = h.pipeline.config().clone();
    let lookup = Arc::new(MockIdentityLookup::new());
    let restarted = Pipeline::new(h.chain.clone(), h.store.clone(), lookup, config);
    restarted.vote_history(ALICE, &VoteQuery::default()).await.unwrap();
    assert_eq!(h.chain.timestamp_calls().await.len(), 3);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_failed_market_batch_drops_only_affected_votes() {
    let h = harness(1500);
    for (id, question) in [(1u64, "Will it rain?"), (2, "Election outcome")] {
        h.chain
            .add_market(MarketMetadata {
                market_id: U256::from(id),
                question: question.into(),
                option_a: "Yes".into(),
                option_b: "No".into(),
            })
            .await;
    }
    h.chain.push_logs([purchase_log(MARKET, 1100, 0, 1, ALICE, true, units(1))]).await;
    let first = h.pipeline.vote_history(ALICE, &VoteQuery::default()).await.unwrap();
    assert_eq!(first.votes.len(), 1);

    h.chain.push_logs([purchase_log(MARKET, 1600, 0, 2, ALICE, false, units(2))]).await;
    h.chain.set_head(2000).await;
    // Both attempts of the next batch fail.
    h.chain.fail_market_calls(2).await;

    let degraded = h.pipeline.vote_history(ALICE, &VoteQuery::default()).await.unwrap();
    assert!(degraded.complete);
    assert_eq!(degraded.votes.len(), 1);
    assert_eq!(degraded.votes[0].market_id, U256::from(1));
    assert!(logs_contain("Failed to fetch metadata for 1 markets"));

    let recovered = h.pipeline.vote_history(ALICE, &VoteQuery::default()).await.unwrap();
    assert_eq!(recovered.votes.len(), 2);
    assert_eq!(
        h.chain.market_calls().await,
        vec![
            vec![U256::from(1)],
            vec![U256::from(2)],
            vec![U256::from(2)],
            vec![U256::from(2)],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sync_is_coalesced() {
    let h = harness(1499);
    h.chain.push_logs([claim_log(MARKET, 1200, 0, ALICE, units(1))]).await;
    // The first pass waits in a retry backoff while holding the namespace.
    h.chain.fail_range(1000, 1).await;

    let namespace = winnings_namespace();
    let query = winnings_query();
    let (first, second) =
        tokio::join!(h.pipeline.sync(&namespace, &query), h.pipeline.sync(&namespace, &query));

    assert_eq!(first.unwrap().status, SyncStatus::Complete { through: 1499 });
    let second = second.unwrap();
    assert_eq!(second.status, SyncStatus::Coalesced);
    assert!(second.events.is_empty());
    assert_eq!(h.chain.requested_ranges().await.len(), 2);
}
