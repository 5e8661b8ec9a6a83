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

use alloy::{
    primitives::{keccak256, Address, B256, U256},
    rpc::types::Log,
    sol_types::SolEvent,
};
use predictboard::contracts::IPredictionMarket;

/// Deterministic transaction hash for a log position.
pub fn tx_hash(block_number: u64, log_index: u64) -> B256 {
    keccak256([block_number.to_be_bytes(), log_index.to_be_bytes()].concat())
}

fn market_log<E: SolEvent>(contract: Address, block_number: u64, log_index: u64, event: &E) -> Log {
    Log {
        inner: alloy::primitives::Log { address: contract, data: event.encode_log_data() },
        block_hash: None,
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(tx_hash(block_number, log_index)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

pub fn purchase_log(
    contract: Address,
    block_number: u64,
    log_index: u64,
    market_id: u64,
    buyer: Address,
    is_option_a: bool,
    amount: U256,
) -> Log {
    let event = IPredictionMarket::SharesPurchased {
        marketId: U256::from(market_id),
        buyer,
        isOptionA: is_option_a,
        amount,
    };
    market_log(contract, block_number, log_index, &event)
}

pub fn claim_log(
    contract: Address,
    block_number: u64,
    log_index: u64,
    user: Address,
    amount: U256,
) -> Log {
    let event = IPredictionMarket::Claimed { marketId: U256::from(1), user, amount };
    market_log(contract, block_number, log_index, &event)
}
