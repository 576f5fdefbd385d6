use std::future::Future;
use std::str::FromStr;

use alloy::primitives::B256;
use alloy::providers::fillers::{BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller};
use alloy::providers::{Identity, Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Block, BlockId, BlockNumberOrTag, Filter, Log, TransactionReceipt};
use tracing::{debug, info};

use crate::config::ChainCfg;
use crate::error::RpcError;

type RPCProvider = FillProvider<JoinFill<Identity, JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>>, RootProvider>;

/// Read-only view of the chain the crawler needs
pub trait ChainSource: Send + Sync {
    /// Block with full transaction objects
    fn block_by_number(&self, number: u64) -> impl Future<Output = Result<Block, RpcError>> + Send;

    fn receipt_by_hash(&self, hash: B256) -> impl Future<Output = Result<TransactionReceipt, RpcError>> + Send;

    fn logs(&self, filter: &Filter) -> impl Future<Output = Result<Vec<Log>, RpcError>> + Send;
}

pub struct RpcChainSource {
    provider: RPCProvider,
    chain_id: u64,
}

impl RpcChainSource {
    /// Connect over HTTP and verify the node serves the expected chain
    pub async fn connect(cfg: &ChainCfg) -> Result<Self, RpcError> {
        let http_rpc = reqwest::Url::from_str(&cfg.rpc_url)
            .map_err(|e| RpcError::Url(format!("{}: {}", cfg.rpc_url, e)))?;
        info!("Connecting to RPC endpoint: http: {:?}", http_rpc);
        let provider = ProviderBuilder::new().connect_http(http_rpc);

        let chain_id = provider.get_chain_id().await?;
        if let Some(expected) = cfg.chain_id {
            if chain_id != expected {
                return Err(RpcError::ChainIdMismatch { expected, actual: chain_id });
            }
        }
        info!("Chain ID: {}", chain_id);

        Ok(Self { provider, chain_id })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl ChainSource for RpcChainSource {
    async fn block_by_number(&self, number: u64) -> Result<Block, RpcError> {
        let block_id = BlockId::Number(BlockNumberOrTag::Number(number));
        let block = self.provider.get_block(block_id).full().await?;
        match block {
            Some(block) => {
                debug!("Fetched block {} with {} transactions", number, block.transactions.len());
                Ok(block)
            }
            None => Err(RpcError::BlockNotFound(number)),
        }
    }

    async fn receipt_by_hash(&self, hash: B256) -> Result<TransactionReceipt, RpcError> {
        self.provider
            .get_transaction_receipt(hash)
            .await?
            .ok_or(RpcError::ReceiptNotFound(hash))
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        let logs = self.provider.get_logs(filter).await?;
        debug!("Received {} logs", logs.len());
        Ok(logs)
    }
}
