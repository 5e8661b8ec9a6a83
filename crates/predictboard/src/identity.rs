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

//! Off-chain identity resolution with a persistent positive cache.

use std::{
    collections::{BTreeSet, HashMap},
    str::FromStr,
    sync::Arc,
};

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    errors::PipelineError,
    retry::{classify, ErrorClass, RetryPolicy},
    store::StoreObj,
};

/// Default base URL of the profile lookup service.
pub const DEFAULT_IDENTITY_API_URL: &str = "https://api.neynar.com/";

const BULK_BY_ADDRESS_PATH: &str = "v2/farcaster/user/bulk-by-address";
const ADDRESS_TYPES: &str = "custody_address,verified_address";

/// Display profile for a wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: Address,
    pub display_name: String,
    pub numeric_id: u64,
    pub avatar_url: Option<String>,
}

/// Batched address to identity lookup.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Identities keyed by address. Addresses without a profile are absent from the map.
    async fn lookup(&self, addresses: &[Address]) -> anyhow::Result<HashMap<Address, Vec<Identity>>>;
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    fid: u64,
    username: String,
    #[serde(default)]
    pfp_url: Option<String>,
}

/// [IdentityLookup] over the bulk-by-address profile endpoint.
#[derive(Debug, Clone)]
pub struct HttpIdentityLookup {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpIdentityLookup {
    pub fn new(base_url: Url, api_key: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url, api_key }
    }

    /// Fails when no API key is configured, so the problem surfaces at startup rather than
    /// on the first uncached address.
    pub fn ensure_credential(&self) -> Result<(), PipelineError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(PipelineError::MissingCredential),
        }
    }
}

#[async_trait]
impl IdentityLookup for HttpIdentityLookup {
    async fn lookup(&self, addresses: &[Address]) -> anyhow::Result<HashMap<Address, Vec<Identity>>> {
        self.ensure_credential()?;
        let api_key = self.api_key.as_deref().unwrap_or_default();
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }

        let joined = addresses.iter().map(|a| format!("{a:#x}")).collect::<Vec<_>>().join(",");
        let url = self.base_url.join(BULK_BY_ADDRESS_PATH)?;
        let response = self
            .client
            .get(url)
            .query(&[("addresses", joined.as_str()), ("address_types", ADDRESS_TYPES)])
            .header("x-api-key", api_key)
            .send()
            .await?;

        // The service answers 404 when none of the addresses has a profile.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(HashMap::new());
        }

        let body: HashMap<String, Vec<ProfileUser>> = response.error_for_status()?.json().await?;
        let mut identities = HashMap::new();
        for (key, users) in body {
            let Ok(address) = Address::from_str(&key) else {
                tracing::warn!("Ignoring profile entry with malformed address key {}", key);
                continue;
            };
            let entries = users
                .into_iter()
                .map(|user| Identity {
                    address,
                    display_name: user.username,
                    numeric_id: user.fid,
                    avatar_url: user.pfp_url,
                })
                .collect();
            identities.insert(address, entries);
        }
        Ok(identities)
    }
}

/// `first6...last4` of the lowercase hex address, e.g. `0xabcd...ef01`.
pub fn fallback_display(address: &Address) -> String {
    let hex = format!("{address:#x}");
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}

pub fn display_name(address: &Address, identity: Option<&Identity>) -> String {
    match identity {
        Some(identity) => identity.display_name.clone(),
        None => fallback_display(address),
    }
}

/// Resolves identities, consulting the store before the lookup service.
#[derive(Clone)]
pub struct IdentityResolver {
    lookup: Arc<dyn IdentityLookup>,
    store: StoreObj,
    retry: RetryPolicy,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn IdentityLookup>, store: StoreObj, retry: RetryPolicy) -> Self {
        Self { lookup, store, retry }
    }

    /// Resolve every address, with `None` for addresses without a profile.
    ///
    /// Only uncached addresses are sent, in a single batch. Negative results are not persisted,
    /// so they are looked up again on the next call. Lookup failures degrade to `None`; only
    /// configuration errors are returned.
    pub async fn resolve(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Option<Identity>>, PipelineError> {
        let unique: Vec<Address> =
            addresses.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let mut resolved: HashMap<Address, Option<Identity>> =
            unique.iter().map(|address| (*address, None)).collect();

        match self.store.identities(&unique).await {
            Ok(cached) => {
                for (address, identity) in cached {
                    resolved.insert(address, Some(identity));
                }
            }
            Err(err) => tracing::warn!("Failed to read cached identities: {:#}", err),
        }

        let uncached: Vec<Address> = unique
            .iter()
            .filter(|address| matches!(resolved.get(*address), Some(None)))
            .copied()
            .collect();
        if uncached.is_empty() {
            return Ok(resolved);
        }

        tracing::debug!(
            "Resolving {} identities ({} cached)",
            uncached.len(),
            unique.len() - uncached.len()
        );
        let found = match self.retry.execute("identity lookup", || self.lookup.lookup(&uncached)).await
        {
            Ok(found) => found,
            Err(err) if classify(&err) == ErrorClass::Fatal => {
                return Err(match err.downcast::<PipelineError>() {
                    Ok(pipeline_err) => pipeline_err,
                    Err(other) => PipelineError::Config(format!("{other:#}")),
                });
            }
            Err(err) => {
                tracing::warn!(
                    "Identity lookup failed for {} addresses, using fallback names: {:#}",
                    uncached.len(),
                    err
                );
                return Ok(resolved);
            }
        };

        let mut fresh = Vec::new();
        for address in &uncached {
            if let Some(identity) = found.get(address).and_then(|identities| identities.first()) {
                fresh.push(identity.clone());
                resolved.insert(*address, Some(identity.clone()));
            }
        }
        tracing::debug!("Resolved {} of {} uncached identities", fresh.len(), uncached.len());

        if !fresh.is_empty() {
            if let Err(err) = self.store.put_identities(&fresh).await {
                tracing::warn!("Failed to cache {} identities: {:#}", fresh.len(), err);
            }
        }

        Ok(resolved)
    }
}
