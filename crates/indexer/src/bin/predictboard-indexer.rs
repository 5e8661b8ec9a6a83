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


use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{bail, Result};
use clap::Parser;
use predictboard::{RetryPolicy, DEFAULT_IDENTITY_API_URL, DEFAULT_RANGE_SIZE};
use predictboard_indexer::{IndexerService, IndexerServiceConfig};
use url::Url;

/// Arguments for the predictboard indexer.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct IndexerArgs {
    /// URL of the Ethereum RPC endpoint.
    #[clap(short, long, env)]
    rpc_url: Url,

    /// Address of the prediction market contract.
    #[clap(long, env)]
    market_address: Address,

    /// DB connection string.
    #[clap(long, env = "DATABASE_URL")]
    db: String,

    /// Block the market was deployed at. Namespaces without a checkpoint start here.
    #[clap(long, env = "GENESIS_BLOCK")]
    start_block: Option<u64>,

    /// Maximum number of blocks per log request.
    #[clap(long, env, default_value_t = DEFAULT_RANGE_SIZE)]
    range_size: u64,

    /// Number of log requests in flight at once.
    #[clap(long, env = "SCAN_CONCURRENCY", default_value = "2")]
    concurrency: usize,

    /// Retries per upstream call before the call is given up.
    #[clap(long, default_value = "3")]
    rpc_retries: u32,

    /// Delay before the first retry of an upstream call, in milliseconds.
    #[clap(long, default_value = "1000")]
    retry_base_ms: u64,

    /// Minimum delay after a rate-limited upstream call, in milliseconds.
    #[clap(long, default_value = "5000")]
    rate_limit_floor_ms: u64,

    /// Interval in seconds between indexing passes.
    #[clap(long, default_value = "60")]
    interval: u64,

    /// Number of consecutive failed passes before quitting.
    #[clap(long, default_value = "3")]
    retries: u32,

    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,

    /// Base URL of the identity service.
    #[clap(long, env, default_value = DEFAULT_IDENTITY_API_URL)]
    identity_api_url: Url,

    /// API key of the identity service.
    #[clap(long, env, hide_env_values = true)]
    identity_api_key: Option<String>,

    /// Addresses whose vote histories are refreshed on every pass.
    #[clap(long = "watch-address", value_delimiter = ',')]
    watch_addresses: Vec<Address>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = IndexerArgs::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();

    if args.log_json {
        tracing_subscriber::fmt().with_ansi(false).json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_ansi(false).with_env_filter(filter).init();
    }

    let config = IndexerServiceConfig {
        start_block: args.start_block,
        range_size: args.range_size,
        concurrency: args.concurrency,
        retry: RetryPolicy {
            max_retries: args.rpc_retries,
            base_delay: Duration::from_millis(args.retry_base_ms),
            rate_limit_floor: Duration::from_millis(args.rate_limit_floor_ms),
        },
        identity_api_url: args.identity_api_url,
        identity_api_key: args.identity_api_key,
        watch_addresses: args.watch_addresses,
    };

    let service =
        IndexerService::new(args.rpc_url, args.market_address, &args.db, config).await?;

    let mut failures = 0u32;
    loop {
        match service.run().await {
            Ok(_) => {
                failures = 0;
                tracing::info!("Sleeping for {} seconds", args.interval);
            }
            Err(e) => {
                failures += 1;
                tracing::error!("Error running predictboard indexer: {:?}", e);
                if failures >= args.retries {
                    bail!("Maximum retries reached");
                }
                tracing::info!("Retrying in {} seconds", args.interval);
            }
        }
        tokio::time::sleep(Duration::from_secs(args.interval)).await;
    }
}
