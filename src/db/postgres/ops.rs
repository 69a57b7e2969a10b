use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use log::error;
use tokio_postgres::{types::ToSql, Row};

use crate::db::{
    models::{OperationRecord, PricePoint, UserLedgerEntry, VaultSnapshot, VaultStatic},
    postgres::PostgresClient,
    store::{
        LedgerStore, OperationSource, PriceStore, RewarderRegistry, VaultMetadataProvider,
        VaultSnapshotSource,
    },
};

/// NUMERIC columns travel as text so decimals stay exact on both sides.
fn parse_decimal(value: &str) -> anyhow::Result<BigDecimal> {
    BigDecimal::from_str(value).with_context(|| format!("invalid numeric value '{}'", value))
}

fn parse_optional_decimal(value: Option<String>) -> anyhow::Result<Option<BigDecimal>> {
    value.as_deref().map(parse_decimal).transpose()
}

fn decimal_text(value: &BigDecimal) -> String {
    value.to_string()
}

fn narrow_u8(value: i16, column: &str) -> anyhow::Result<u8> {
    u8::try_from(value).with_context(|| format!("{} out of range: {}", column, value))
}

fn row_to_operation(row: &Row) -> anyhow::Result<OperationRecord> {
    let block_number: i64 = row.get("block_number");
    let log_index: i32 = row.get("log_index");
    let timestamp: i64 = row.get("timestamp");
    let hypervisor_address: String = row.get("hypervisor_address");

    Ok(OperationRecord {
        id: row.get("id"),
        hypervisor_address: hypervisor_address.to_lowercase(),
        block_number: u64::try_from(block_number)?,
        log_index: u32::try_from(log_index)?,
        timestamp: u64::try_from(timestamp)?,
        topic: row.get("topic"),
        decimals_token0: narrow_u8(row.get("decimals_token0"), "decimals_token0")?,
        decimals_token1: narrow_u8(row.get("decimals_token1"), "decimals_token1")?,
        decimals_contract: narrow_u8(row.get("decimals_contract"), "decimals_contract")?,
        token0_per_share: parse_optional_decimal(row.get("token0_per_share"))?,
        token1_per_share: parse_optional_decimal(row.get("token1_per_share"))?,
        payload: row.get("payload"),
    })
}

fn row_to_vault(row: &Row) -> anyhow::Result<VaultStatic> {
    let fee: i32 = row.get("fee");
    let address: String = row.get("address");
    let pool_address: String = row.get("pool_address");
    let token0: String = row.get("token0");
    let token1: String = row.get("token1");

    Ok(VaultStatic {
        address: address.to_lowercase(),
        network: row.get("network"),
        dex: row.get("dex"),
        fee: u32::try_from(fee).with_context(|| format!("negative vault fee {}", fee))?,
        pool_address: pool_address.to_lowercase(),
        token0: token0.to_lowercase(),
        token1: token1.to_lowercase(),
        decimals_token0: narrow_u8(row.get("decimals_token0"), "decimals_token0")?,
        decimals_token1: narrow_u8(row.get("decimals_token1"), "decimals_token1")?,
        decimals_contract: narrow_u8(row.get("decimals_contract"), "decimals_contract")?,
    })
}

// ==================== OPERATIONS ====================

#[async_trait]
impl OperationSource for PostgresClient {
    async fn fetch_operations(
        &self,
        hypervisor: &str,
        block_ini: u64,
        block_end: Option<u64>,
    ) -> anyhow::Result<Vec<OperationRecord>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                id, hypervisor_address, block_number, log_index, timestamp, topic,
                decimals_token0, decimals_token1, decimals_contract,
                token0_per_share::text AS token0_per_share,
                token1_per_share::text AS token1_per_share,
                payload
            FROM ledger.operations
            WHERE hypervisor_address = $1
              AND block_number >= $2
              AND ($3::BIGINT IS NULL OR block_number <= $3)
            ORDER BY block_number ASC, log_index ASC
        "#;

        let block_ini = i64::try_from(block_ini)?;
        let block_end = block_end.map(i64::try_from).transpose()?;
        let rows = client
            .query(query, &[&hypervisor.to_lowercase(), &block_ini, &block_end])
            .await?;

        rows.iter().map(row_to_operation).collect()
    }
}

// ==================== PRICES ====================

#[async_trait]
impl PriceStore for PostgresClient {
    async fn get_price(
        &self,
        network: &str,
        block: u64,
        token_address: &str,
    ) -> anyhow::Result<Option<PricePoint>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT price, source
            FROM ledger.prices
            WHERE network = $1 AND block = $2 AND token_address = $3
        "#;

        let row = client
            .query_opt(
                query,
                &[&network, &i64::try_from(block)?, &token_address.to_lowercase()],
            )
            .await?;

        Ok(row.map(|row| {
            let price: f64 = row.get("price");
            let source: String = row.get("source");
            PricePoint::new(network, block, token_address, price, &source)
        }))
    }

    async fn set_price(&self, price: &PricePoint) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO ledger.prices (network, block, token_address, price, source, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (network, block, token_address) DO UPDATE SET
                price = EXCLUDED.price,
                source = EXCLUDED.source,
                updated_at = EXCLUDED.updated_at
        "#;

        client
            .execute(
                query,
                &[
                    &price.network,
                    &i64::try_from(price.block)?,
                    &price.token_address,
                    &price.price,
                    &price.source,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to store price of {} at block {}: {:?}",
                    price.token_address, price.block, e
                );
                e
            })?;

        Ok(())
    }
}

// ==================== USER LEDGER ====================

/// Text-encoded decimal columns of one ledger row, kept alive while the
/// parameter slice borrows them.
struct LedgerRowParams {
    block_number: i64,
    log_index: i32,
    topic: &'static str,
    decimals: [String; 8],
    optionals: [Option<String>; 5],
}

impl LedgerRowParams {
    fn new(entry: &UserLedgerEntry) -> anyhow::Result<Self> {
        let optional = |v: &Option<BigDecimal>| v.as_ref().map(decimal_text);
        Ok(Self {
            block_number: i64::try_from(entry.block_number)?,
            log_index: i32::try_from(entry.log_index)?,
            topic: entry.topic.as_str(),
            decimals: [
                decimal_text(&entry.token0_in),
                decimal_text(&entry.token1_in),
                decimal_text(&entry.token0_out),
                decimal_text(&entry.token1_out),
                decimal_text(&entry.shares_in),
                decimal_text(&entry.shares_out),
                decimal_text(&entry.fees_token0_in),
                decimal_text(&entry.fees_token1_in),
            ],
            optionals: [
                optional(&entry.price_usd_token0),
                optional(&entry.price_usd_token1),
                optional(&entry.price_usd_share),
                optional(&entry.underlying_token0_per_share),
                optional(&entry.underlying_token1_per_share),
            ],
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresClient {
    async fn append(&self, entry: &UserLedgerEntry) -> anyhow::Result<()> {
        self.append_bulk(std::slice::from_ref(entry)).await
    }

    /// Batch upsert with multi-row VALUES; replaying an entry overwrites it.
    async fn append_bulk(&self, entries: &[UserLedgerEntry]) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 19;
        // columns 7..=19 are NUMERIC and bound as text
        const FIRST_NUMERIC_COL: usize = 6;
        const BATCH_SIZE: usize = 1000;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for chunk in entries.chunks(BATCH_SIZE) {
            let values_clauses: Vec<String> = (0..chunk.len())
                .map(|i| {
                    let start = i * COLS_PER_ROW + 1;
                    let placeholders: Vec<String> = (0..COLS_PER_ROW)
                        .map(|col| {
                            if col >= FIRST_NUMERIC_COL {
                                format!("${}::text::numeric", start + col)
                            } else {
                                format!("${}", start + col)
                            }
                        })
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();

            let query = format!(
                r#"
                INSERT INTO ledger.user_ledger (
                    user_address, hypervisor_address, block_number, log_index, timestamp, topic,
                    token0_in, token1_in, token0_out, token1_out, shares_in, shares_out,
                    fees_token0_in, fees_token1_in,
                    price_usd_token0, price_usd_token1, price_usd_share,
                    underlying_token0_per_share, underlying_token1_per_share
                ) VALUES {}
                ON CONFLICT (hypervisor_address, block_number, log_index, user_address) DO UPDATE SET
                    timestamp = EXCLUDED.timestamp,
                    topic = EXCLUDED.topic,
                    token0_in = EXCLUDED.token0_in,
                    token1_in = EXCLUDED.token1_in,
                    token0_out = EXCLUDED.token0_out,
                    token1_out = EXCLUDED.token1_out,
                    shares_in = EXCLUDED.shares_in,
                    shares_out = EXCLUDED.shares_out,
                    fees_token0_in = EXCLUDED.fees_token0_in,
                    fees_token1_in = EXCLUDED.fees_token1_in,
                    price_usd_token0 = EXCLUDED.price_usd_token0,
                    price_usd_token1 = EXCLUDED.price_usd_token1,
                    price_usd_share = EXCLUDED.price_usd_share,
                    underlying_token0_per_share = EXCLUDED.underlying_token0_per_share,
                    underlying_token1_per_share = EXCLUDED.underlying_token1_per_share
                "#,
                values_clauses.join(", ")
            );

            let encoded = chunk
                .iter()
                .map(LedgerRowParams::new)
                .collect::<anyhow::Result<Vec<_>>>()?;

            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * COLS_PER_ROW);
            for (entry, row) in chunk.iter().zip(encoded.iter()) {
                params.push(&entry.user_address);
                params.push(&entry.hypervisor_address);
                params.push(&row.block_number);
                params.push(&row.log_index);
                params.push(&entry.timestamp);
                params.push(&row.topic);
                for value in &row.decimals {
                    params.push(value);
                }
                for value in &row.optionals {
                    params.push(value);
                }
            }

            tx.execute(&query, &params).await.map_err(|e| {
                error!("Failed to append {} ledger entries: {:?}", chunk.len(), e);
                e
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn last_blocks(&self, hypervisor: &str, n: usize) -> anyhow::Result<Vec<u64>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT DISTINCT block_number
            FROM ledger.user_ledger
            WHERE hypervisor_address = $1
            ORDER BY block_number DESC
            LIMIT $2
        "#;

        let rows = client
            .query(query, &[&hypervisor.to_lowercase(), &i64::try_from(n)?])
            .await?;

        rows.iter()
            .map(|row| {
                let block: i64 = row.get("block_number");
                Ok(u64::try_from(block)?)
            })
            .collect()
    }

    async fn shares_by_user(
        &self,
        hypervisor: &str,
        before_block: u64,
    ) -> anyhow::Result<Vec<(String, BigDecimal)>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT user_address, SUM(shares_in - shares_out)::text AS shares
            FROM ledger.user_ledger
            WHERE hypervisor_address = $1 AND block_number < $2
            GROUP BY user_address
            HAVING SUM(shares_in - shares_out) <> 0
            ORDER BY user_address
        "#;

        let rows = client
            .query(query, &[&hypervisor.to_lowercase(), &i64::try_from(before_block)?])
            .await?;

        rows.iter()
            .map(|row| {
                let user: String = row.get("user_address");
                let shares: String = row.get("shares");
                Ok((user, parse_decimal(&shares)?))
            })
            .collect()
    }

    async fn total_shares_at(
        &self,
        hypervisor: &str,
        block: u64,
        log_index: u32,
    ) -> anyhow::Result<BigDecimal> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT COALESCE(SUM(shares_in - shares_out), 0)::text AS total
            FROM ledger.user_ledger
            WHERE hypervisor_address = $1
              AND topic IN ('deposit', 'withdraw')
              AND (block_number, log_index) <= ($2, $3)
        "#;

        let row = client
            .query_one(
                query,
                &[
                    &hypervisor.to_lowercase(),
                    &i64::try_from(block)?,
                    &i32::try_from(log_index)?,
                ],
            )
            .await?;
        let total: String = row.get("total");
        parse_decimal(&total)
    }
}

// ==================== VAULTS ====================

#[async_trait]
impl VaultMetadataProvider for PostgresClient {
    async fn static_info(&self, hypervisor: &str) -> anyhow::Result<Option<VaultStatic>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                address, network, dex, fee, pool_address, token0, token1,
                decimals_token0, decimals_token1, decimals_contract
            FROM ledger.vaults
            WHERE address = $1
        "#;

        let row = client.query_opt(query, &[&hypervisor.to_lowercase()]).await?;
        row.as_ref().map(row_to_vault).transpose()
    }
}

#[async_trait]
impl VaultSnapshotSource for PostgresClient {
    async fn snapshot_at(&self, hypervisor: &str, block: u64) -> anyhow::Result<Option<VaultSnapshot>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT snapshot
            FROM ledger.vault_snapshots
            WHERE hypervisor_address = $1 AND block = $2
        "#;

        let row = client
            .query_opt(query, &[&hypervisor.to_lowercase(), &i64::try_from(block)?])
            .await?;

        row.map(|row| {
            let snapshot: serde_json::Value = row.get("snapshot");
            serde_json::from_value(snapshot).with_context(|| {
                format!("malformed snapshot of {} at block {}", hypervisor, block)
            })
        })
        .transpose()
    }
}

#[async_trait]
impl RewarderRegistry for PostgresClient {
    async fn rewarders(&self, network: &str) -> anyhow::Result<Vec<String>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT address FROM ledger.rewarders WHERE network = $1",
                &[&network],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let address: String = row.get("address");
                address.to_lowercase()
            })
            .collect())
    }
}
