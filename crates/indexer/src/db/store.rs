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

use std::{collections::HashMap, str::FromStr};

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use predictboard::{
    BlockStore, EventKind, EventStore, Identity, IdentityStore, MarketMetadata, MarketStore,
    RawEvent, SaveSummary,
};
use sqlx::{any::AnyPoolOptions, AnyPool, Row};

use super::DbError;

// Batch chunk size to stay below the bind parameter limits of both SQLite and PostgreSQL.
const BATCH_INSERT_CHUNK_SIZE: usize = 75;

/// Convert a U256 to a zero-padded string for proper database sorting
/// U256 max value has 78 decimal digits (2^256 ≈ 1.15 * 10^77)
fn pad_u256(value: U256) -> String {
    format!("{:0>78}", value)
}

/// Convert a zero-padded string back to U256
fn unpad_u256(s: &str) -> Result<U256, DbError> {
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str(trimmed).map_err(|e| DbError::BadRecord(format!("Invalid U256 {s}: {e}")))
}

/// `$start,$start+1,...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count).map(|idx| format!("${idx}")).collect::<Vec<_>>().join(",")
}

fn u64_from_db(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::BadBlockNumb(value.to_string()))
}

/// [IndexerStore](predictboard::IndexerStore) over a SQLite or PostgreSQL database.
#[derive(Clone)]
pub struct SqlStore {
    pool: AnyPool,
}

impl SqlStore {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().max_connections(20).connect(database_url).await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    async fn fetch_events(&self, namespace: &str) -> Result<Vec<RawEvent>, DbError> {
        let query = r#"
            SELECT transaction_hash, log_index, block_number, payload
            FROM event_log
            WHERE namespace = $1
            ORDER BY block_number ASC, log_index ASC
        "#;
        let rows = sqlx::query(query).bind(namespace).fetch_all(&self.pool).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let tx_hash: String = row.get("transaction_hash");
            let kind: EventKind = serde_json::from_str(&row.get::<String, _>("payload"))?;
            events.push(RawEvent {
                block_number: u64_from_db(row.get::<i64, _>("block_number"))?,
                transaction_hash: B256::from_str(&tx_hash)
                    .map_err(|e| DbError::BadRecord(format!("{tx_hash}: {e}")))?,
                log_index: u64_from_db(row.get::<i64, _>("log_index"))?,
                kind,
            });
        }
        Ok(events)
    }

    async fn get_checkpoint(&self, namespace: &str) -> Result<Option<u64>, DbError> {
        let query = "SELECT last_block FROM checkpoints WHERE namespace = $1";
        let result = sqlx::query(query).bind(namespace).fetch_optional(&self.pool).await?;

        match result {
            Some(row) => Ok(Some(u64_from_db(row.get::<i64, _>("last_block"))?)),
            None => Ok(None),
        }
    }

    async fn save_events(
        &self,
        namespace: &str,
        events: &[RawEvent],
        checkpoint: Option<u64>,
    ) -> Result<SaveSummary, DbError> {
        let mut tx = self.pool.begin().await?;

        let mut inserted = 0u64;
        for chunk in events.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let values_clauses: Vec<String> = (0..chunk.len())
                .map(|row| format!("({})", placeholders(row * 6 + 1, 6)))
                .collect();
            let query = format!(
                r#"INSERT INTO event_log
                (namespace, transaction_hash, log_index, block_number, event_type, payload)
                VALUES {}
                ON CONFLICT (namespace, transaction_hash, log_index) DO NOTHING"#,
                values_clauses.join(",")
            );

            let mut q = sqlx::query(&query);
            for event in chunk {
                q = q
                    .bind(namespace)
                    .bind(format!("{:#x}", event.transaction_hash))
                    .bind(event.log_index as i64)
                    .bind(event.block_number as i64)
                    .bind(event.event_type().as_str())
                    .bind(serde_json::to_string(&event.kind)?);
            }
            inserted += q.execute(&mut *tx).await?.rows_affected();
        }

        if let Some(block) = checkpoint {
            let query = r#"
                INSERT INTO checkpoints (namespace, last_block, updated_at)
                VALUES ($1, $2, CURRENT_TIMESTAMP)
                ON CONFLICT (namespace)
                DO UPDATE SET last_block = EXCLUDED.last_block, updated_at = CURRENT_TIMESTAMP
                WHERE checkpoints.last_block < EXCLUDED.last_block
            "#;
            sqlx::query(query).bind(namespace).bind(block as i64).execute(&mut *tx).await?;
        }

        let stored = sqlx::query("SELECT last_block FROM checkpoints WHERE namespace = $1")
            .bind(namespace)
            .fetch_optional(&mut *tx)
            .await?
            .map(|row| u64_from_db(row.get::<i64, _>("last_block")))
            .transpose()?;

        tx.commit().await?;
        Ok(SaveSummary { inserted: inserted as usize, checkpoint: stored })
    }

    async fn get_identities(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, Identity>, DbError> {
        let mut identities = HashMap::new();
        for chunk in addresses.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let query = format!(
                "SELECT address, display_name, numeric_id, avatar_url FROM identities WHERE address IN ({})",
                placeholders(1, chunk.len())
            );
            let mut q = sqlx::query(&query);
            for address in chunk {
                q = q.bind(format!("{address:#x}"));
            }

            for row in q.fetch_all(&self.pool).await? {
                let raw: String = row.get("address");
                let address = Address::from_str(&raw)
                    .map_err(|e| DbError::BadRecord(format!("{raw}: {e}")))?;
                identities.insert(
                    address,
                    Identity {
                        address,
                        display_name: row.get("display_name"),
                        numeric_id: row.get::<i64, _>("numeric_id") as u64,
                        avatar_url: row.get("avatar_url"),
                    },
                );
            }
        }
        Ok(identities)
    }

    async fn upsert_identities(&self, identities: &[Identity]) -> Result<(), DbError> {
        if identities.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in identities.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let values_clauses: Vec<String> = (0..chunk.len())
                .map(|row| format!("({},CURRENT_TIMESTAMP)", placeholders(row * 4 + 1, 4)))
                .collect();
            let query = format!(
                r#"INSERT INTO identities (address, display_name, numeric_id, avatar_url, updated_at)
                VALUES {}
                ON CONFLICT (address)
                DO UPDATE SET
                    display_name = EXCLUDED.display_name,
                    numeric_id = EXCLUDED.numeric_id,
                    avatar_url = EXCLUDED.avatar_url,
                    updated_at = CURRENT_TIMESTAMP"#,
                values_clauses.join(",")
            );

            let mut q = sqlx::query(&query);
            for identity in chunk {
                q = q
                    .bind(format!("{:#x}", identity.address))
                    .bind(identity.display_name.clone())
                    .bind(identity.numeric_id as i64)
                    .bind(identity.avatar_url.clone());
            }
            q.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_markets(&self, ids: &[U256]) -> Result<HashMap<U256, MarketMetadata>, DbError> {
        let mut markets = HashMap::new();
        for chunk in ids.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let query = format!(
                "SELECT market_id, question, option_a, option_b FROM market_metadata WHERE market_id IN ({})",
                placeholders(1, chunk.len())
            );
            let mut q = sqlx::query(&query);
            for id in chunk {
                q = q.bind(pad_u256(*id));
            }

            for row in q.fetch_all(&self.pool).await? {
                let market_id = unpad_u256(&row.get::<String, _>("market_id"))?;
                markets.insert(
                    market_id,
                    MarketMetadata {
                        market_id,
                        question: row.get("question"),
                        option_a: row.get("option_a"),
                        option_b: row.get("option_b"),
                    },
                );
            }
        }
        Ok(markets)
    }

    async fn insert_markets(&self, markets: &[MarketMetadata]) -> Result<(), DbError> {
        if markets.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in markets.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let values_clauses: Vec<String> = (0..chunk.len())
                .map(|row| format!("({})", placeholders(row * 4 + 1, 4)))
                .collect();
            let query = format!(
                r#"INSERT INTO market_metadata (market_id, question, option_a, option_b)
                VALUES {}
                ON CONFLICT (market_id) DO NOTHING"#,
                values_clauses.join(",")
            );

            let mut q = sqlx::query(&query);
            for market in chunk {
                q = q
                    .bind(pad_u256(market.market_id))
                    .bind(market.question.clone())
                    .bind(market.option_a.clone())
                    .bind(market.option_b.clone());
            }
            q.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_block_timestamps(&self, blocks: &[u64]) -> Result<HashMap<u64, u64>, DbError> {
        let mut timestamps = HashMap::new();
        for chunk in blocks.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let query = format!(
                "SELECT block_number, block_timestamp FROM block_timestamps WHERE block_number IN ({})",
                placeholders(1, chunk.len())
            );
            let mut q = sqlx::query(&query);
            for block in chunk {
                q = q.bind(*block as i64);
            }

            for row in q.fetch_all(&self.pool).await? {
                timestamps.insert(
                    u64_from_db(row.get::<i64, _>("block_number"))?,
                    u64_from_db(row.get::<i64, _>("block_timestamp"))?,
                );
            }
        }
        Ok(timestamps)
    }

    async fn insert_block_timestamps(&self, timestamps: &[(u64, u64)]) -> Result<(), DbError> {
        if timestamps.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in timestamps.chunks(BATCH_INSERT_CHUNK_SIZE) {
            let values_clauses: Vec<String> = (0..chunk.len())
                .map(|row| format!("({})", placeholders(row * 2 + 1, 2)))
                .collect();
            let query = format!(
                r#"INSERT INTO block_timestamps (block_number, block_timestamp)
                VALUES {}
                ON CONFLICT (block_number) DO NOTHING"#,
                values_clauses.join(",")
            );

            let mut q = sqlx::query(&query);
            for (block, timestamp) in chunk {
                q = q.bind(*block as i64).bind(*timestamp as i64);
            }
            q.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqlStore {
    async fn load_events(&self, namespace: &str) -> anyhow::Result<Vec<RawEvent>> {
        Ok(self.fetch_events(namespace).await?)
    }

    async fn checkpoint(&self, namespace: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.get_checkpoint(namespace).await?)
    }

    async fn save(
        &self,
        namespace: &str,
        events: &[RawEvent],
        checkpoint: Option<u64>,
    ) -> anyhow::Result<SaveSummary> {
        Ok(self.save_events(namespace, events, checkpoint).await?)
    }
}

#[async_trait]
impl IdentityStore for SqlStore {
    async fn identities(&self, addresses: &[Address]) -> anyhow::Result<HashMap<Address, Identity>> {
        Ok(self.get_identities(addresses).await?)
    }

    async fn put_identities(&self, identities: &[Identity]) -> anyhow::Result<()> {
        Ok(self.upsert_identities(identities).await?)
    }
}

#[async_trait]
impl MarketStore for SqlStore {
    async fn markets(&self, ids: &[U256]) -> anyhow::Result<HashMap<U256, MarketMetadata>> {
        Ok(self.get_markets(ids).await?)
    }

    async fn put_markets(&self, markets: &[MarketMetadata]) -> anyhow::Result<()> {
        Ok(self.insert_markets(markets).await?)
    }
}

#[async_trait]
impl BlockStore for SqlStore {
    async fn block_timestamps(&self, blocks: &[u64]) -> anyhow::Result<HashMap<u64, u64>> {
        Ok(self.get_block_timestamps(blocks).await?)
    }

    async fn put_block_timestamps(&self, timestamps: &[(u64, u64)]) -> anyhow::Result<()> {
        Ok(self.insert_block_timestamps(timestamps).await?)
    }
}
