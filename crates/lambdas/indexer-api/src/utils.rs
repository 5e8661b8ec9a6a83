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


use alloy::primitives::{utils::format_units, Address, U256};
use std::str::FromStr;
use thiserror::Error;

/// Request errors detected before the pipeline is consulted.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

pub fn parse_address(raw: &str) -> Result<Address, RequestError> {
    Address::from_str(raw).map_err(|_| RequestError::InvalidAddress(raw.to_string()))
}

/// Format a raw token amount with comma separators and two decimals, e.g. `1,234.50 USDC`.
pub fn format_token(raw: U256, decimals: u8, symbol: &str) -> String {
    let Ok(units) = format_units(raw, decimals) else {
        return format!("0 {symbol}");
    };
    let (whole, fraction) = units.split_once('.').unwrap_or((units.as_str(), ""));
    let cents: String = fraction.chars().chain(std::iter::repeat('0')).take(2).collect();
    format!("{}.{} {}", format_with_commas(whole), cents, symbol)
}

/// Insert comma separators into a string of decimal digits
pub fn format_with_commas(digits: &str) -> String {
    let mut result = String::new();
    let mut count = 0;

    for ch in digits.chars().rev() {
        if count == 3 {
            result.insert(0, ',');
            count = 0;
        }
        result.insert(0, ch);
        count += 1;
    }

    result
}
