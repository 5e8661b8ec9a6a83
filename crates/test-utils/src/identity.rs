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

use std::collections::HashMap;

use alloy::primitives::Address;
use anyhow::bail;
use async_trait::async_trait;
use predictboard::{Identity, IdentityLookup, PipelineError};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct LookupState {
    profiles: HashMap<Address, Identity>,
    remaining_failures: u32,
    missing_credential: bool,
    calls: Vec<Vec<Address>>,
}

/// Identity lookup backed by a fixed profile table.
#[derive(Debug, Default)]
pub struct MockIdentityLookup {
    state: Mutex<LookupState>,
}

impl MockIdentityLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lookup that behaves as if no API key were configured.
    pub fn without_credential() -> Self {
        Self {
            state: Mutex::new(LookupState { missing_credential: true, ..Default::default() }),
        }
    }

    pub async fn add_profile(&self, address: Address, display_name: &str, numeric_id: u64) {
        let identity = Identity {
            address,
            display_name: display_name.to_string(),
            numeric_id,
            avatar_url: Some(format!("https://example.com/avatars/{numeric_id}.png")),
        };
        self.state.lock().await.profiles.insert(address, identity);
    }

    /// Fail the next `times` lookups.
    pub async fn fail_next(&self, times: u32) {
        self.state.lock().await.remaining_failures = times;
    }

    /// Addresses sent in each lookup so far.
    pub async fn calls(&self) -> Vec<Vec<Address>> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl IdentityLookup for MockIdentityLookup {
    async fn lookup(&self, addresses: &[Address]) -> anyhow::Result<HashMap<Address, Vec<Identity>>> {
        let mut state = self.state.lock().await;
        state.calls.push(addresses.to_vec());
        if state.missing_credential {
            return Err(PipelineError::MissingCredential.into());
        }
        if state.remaining_failures > 0 {
            state.remaining_failures -= 1;
            bail!("profile service unavailable");
        }
        Ok(addresses
            .iter()
            .filter_map(|address| {
                state.profiles.get(address).map(|identity| (*address, vec![identity.clone()]))
            })
            .collect())
    }
}
