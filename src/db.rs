use std::future::Future;

use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

use crate::error::StoreError;
use crate::types::{BlockRow, ContractEventRow, TokenStats, TokenTransferRow, TransactionRow};

pub const SCHEMA: &str = include_str!("../sql/schema.sql");

/// Insert-if-absent storage of normalized entities.
/// Every insert resolves to `true` when a row was written, `false` when the key already existed.
pub trait Store: Send + Sync {
    fn insert_block(&self, block: &BlockRow) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn insert_transaction(&self, tx: &TransactionRow) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn insert_token_transfer(
        &self,
        transfer: &TokenTransferRow,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn insert_contract_event(
        &self,
        event: &ContractEventRow,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Top `limit` tokens by summed transfer volume over the trailing `window_days`,
    /// ties broken by token address ascending
    fn top_tokens_by_volume(
        &self,
        limit: u32,
        window_days: u32,
    ) -> impl Future<Output = Result<Vec<TokenStats>, StoreError>> + Send;
}

pub struct PgStore {
    client: Client,
}

impl PgStore {
    /// Connect and apply the schema, idempotently
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let client = connect_pg(dsn, SCHEMA).await?;
        Ok(Self { client })
    }

    pub async fn test_connection(&self) -> Result<(), StoreError> {
        match self.client.execute("SELECT 1", &[]).await {
            Ok(_) => {
                info!("PostgreSQL connection test successful");
                Ok(())
            }
            Err(e) => {
                error!("PostgreSQL connection test failed: {:?}", e);
                Err(e.into())
            }
        }
    }
}

pub async fn connect_pg(dsn: &str, schema: &str) -> Result<Client, StoreError> {
    let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Postgres connection error: {:?}", e);
        }
    });

    // Create schema if not exists
    client.batch_execute(schema).await?;

    info!("PostgreSQL ready");

    Ok(client)
}

fn to_i64(column: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange { column, value: value.to_string() })
}

fn to_i32(column: &'static str, value: u64) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::OutOfRange { column, value: value.to_string() })
}

fn from_i64(column: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange { column, value: value.to_string() })
}

impl Store for PgStore {
    async fn insert_block(&self, block: &BlockRow) -> Result<bool, StoreError> {
        let query = r#"
            INSERT INTO blocks (
                number,
                hash,
                parent_hash,
                timestamp,
                gas_limit,
                gas_used,
                miner,
                difficulty,
                total_difficulty,
                size_bytes,
                tx_count
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT DO NOTHING
        "#;

        let number = to_i64("blocks.number", block.number)?;
        let gas_limit = to_i64("blocks.gas_limit", block.gas_limit)?;
        let gas_used = to_i64("blocks.gas_used", block.gas_used)?;
        let size_bytes = block.size_bytes.map(|s| to_i64("blocks.size_bytes", s)).transpose()?;
        let tx_count = to_i32("blocks.tx_count", block.tx_count)?;

        let affected = self
            .client
            .execute(
                query,
                &[
                    &number,
                    &block.hash,
                    &block.parent_hash,
                    &block.timestamp,
                    &gas_limit,
                    &gas_used,
                    &block.miner,
                    &block.difficulty,
                    &block.total_difficulty,
                    &size_bytes,
                    &tx_count,
                ],
            )
            .await?;

        Ok(affected > 0)
    }

    async fn insert_transaction(&self, tx: &TransactionRow) -> Result<bool, StoreError> {
        let query = r#"
            INSERT INTO transactions (
                hash,
                from_address,
                to_address,
                value,
                gas_price,
                gas_used,
                block_number,
                timestamp,
                status,
                input_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (hash) DO NOTHING
        "#;

        let gas_used = to_i64("transactions.gas_used", tx.gas_used)?;
        let block_number = to_i64("transactions.block_number", tx.block_number)?;
        let status = i32::from(tx.status);

        let affected = self
            .client
            .execute(
                query,
                &[
                    &tx.hash,
                    &tx.from_address,
                    &tx.to_address,
                    &tx.value,
                    &tx.gas_price,
                    &gas_used,
                    &block_number,
                    &tx.timestamp,
                    &status,
                    &tx.input_data,
                ],
            )
            .await?;

        Ok(affected > 0)
    }

    async fn insert_token_transfer(&self, transfer: &TokenTransferRow) -> Result<bool, StoreError> {
        let query = r#"
            INSERT INTO token_transfers (
                tx_hash,
                log_index,
                from_address,
                to_address,
                value,
                token_address,
                block_number,
                timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tx_hash, log_index) DO NOTHING
        "#;

        let log_index = to_i64("token_transfers.log_index", transfer.log_index)?;
        let block_number = to_i64("token_transfers.block_number", transfer.block_number)?;

        let affected = self
            .client
            .execute(
                query,
                &[
                    &transfer.tx_hash,
                    &log_index,
                    &transfer.from_address,
                    &transfer.to_address,
                    &transfer.value,
                    &transfer.token_address,
                    &block_number,
                    &transfer.timestamp,
                ],
            )
            .await?;

        Ok(affected > 0)
    }

    async fn insert_contract_event(&self, event: &ContractEventRow) -> Result<bool, StoreError> {
        let query = r#"
            INSERT INTO contract_events (
                tx_hash,
                log_index,
                contract_address,
                event_name,
                block_number,
                timestamp,
                event_data
            ) VALUES ($1, $2, $3, $4, $5, $6, $7::jsonb)
            ON CONFLICT (tx_hash, log_index) DO NOTHING
        "#;

        let log_index = to_i64("contract_events.log_index", event.log_index)?;
        let block_number = to_i64("contract_events.block_number", event.block_number)?;
        let event_data = event.event_data_json();

        let affected = self
            .client
            .execute(
                query,
                &[
                    &event.tx_hash,
                    &log_index,
                    &event.contract_address,
                    &event.event_name,
                    &block_number,
                    &event.timestamp,
                    &event_data,
                ],
            )
            .await?;

        Ok(affected > 0)
    }

    async fn top_tokens_by_volume(&self, limit: u32, window_days: u32) -> Result<Vec<TokenStats>, StoreError> {
        let query = r#"
            SELECT
                token_address,
                COUNT(*) AS transfer_count,
                COUNT(DISTINCT from_address) AS unique_senders,
                COUNT(DISTINCT to_address) AS unique_receivers,
                SUM(CAST(value AS NUMERIC))::TEXT AS total_volume
            FROM token_transfers
            WHERE timestamp > NOW() - make_interval(days => $1)
            GROUP BY token_address
            ORDER BY SUM(CAST(value AS NUMERIC)) DESC, token_address ASC
            LIMIT $2
        "#;

        let days = to_i32("window_days", u64::from(window_days))?;
        let limit = i64::from(limit);

        let rows = self.client.query(query, &[&days, &limit]).await?;
        rows.iter().map(token_stats_from_row).collect()
    }
}

fn token_stats_from_row(row: &Row) -> Result<TokenStats, StoreError> {
    Ok(TokenStats {
        token_address: row.try_get("token_address")?,
        transfer_count: from_i64("transfer_count", row.try_get("transfer_count")?)?,
        unique_senders: from_i64("unique_senders", row.try_get("unique_senders")?)?,
        unique_receivers: from_i64("unique_receivers", row.try_get("unique_receivers")?)?,
        total_volume: row.try_get("total_volume")?,
    })
}
