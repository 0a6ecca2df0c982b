//! Ethereum RPC client for the rental marketplace contract.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{BlockNumberOrTag, BlockTransactionsKind, Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use alloy_primitives::{Address, B256};

use ensrent_core::error::{ChainError, ChainResult};
use ensrent_core::metrics::record_decode_error;
use ensrent_core::ports::{EventPayload, EventRecord, EventSource, EventStream};

sol! {
    /// A domain was offered for rent.
    #[derive(Debug, PartialEq, Eq)]
    event DomainListed(
        uint256 indexed tokenId,
        address indexed lender,
        uint256 minPricePerSecond,
        uint256 maxEndTimestamp,
        bytes32 nameNode,
        string name
    );

    /// A listed domain was rented.
    #[derive(Debug, PartialEq, Eq)]
    event DomainRented(
        uint256 indexed tokenId,
        address indexed borrower,
        uint256 rentalEnd,
        uint256 pricePerSecond
    );

    /// A listed domain was taken back by its owner.
    #[derive(Debug, PartialEq, Eq)]
    event DomainReclaimed(uint256 indexed tokenId);
}

/// Configuration for the marketplace event client.
#[derive(Debug, Clone)]
pub struct EnsRentClientConfig {
    /// HTTP RPC URL (e.g., "http://localhost:8545").
    pub http_url: String,
    /// Address of the rental marketplace contract.
    pub contract_address: Address,
    /// Blocks behind the head considered safe to read.
    pub confirmations: u64,
    /// Delay between head polls once caught up.
    pub poll_interval: Duration,
    /// Maximum block span per `eth_getLogs` call.
    pub batch_size: u64,
}

impl Default for EnsRentClientConfig {
    fn default() -> Self {
        Self {
            http_url: "http://127.0.0.1:8545".to_string(),
            contract_address: Address::ZERO,
            confirmations: 5,
            poll_interval: Duration::from_secs(12),
            batch_size: 2_000,
        }
    }
}

/// Ethereum client adapter implementing the EventSource port.
pub struct EnsRentClient {
    provider: RootProvider<Http<Client>>,
    config: EnsRentClientConfig,
}

impl EnsRentClient {
    /// Connect to an Ethereum node.
    #[instrument(skip_all, fields(url = %config.http_url, contract = %config.contract_address))]
    pub async fn connect(config: EnsRentClientConfig) -> ChainResult<Self> {
        debug!("Connecting to node");

        let url = config
            .http_url
            .parse()
            .map_err(|e| ChainError::ConnectionFailed(format!("invalid RPC URL: {}", e)))?;
        let provider = ProviderBuilder::new().on_http(url);

        // One round trip up front so a bad URL fails at startup rather
        // than on the first poll.
        provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        debug!("Connected successfully");

        Ok(Self { provider, config })
    }
}

#[async_trait]
impl EventSource for EnsRentClient {
    async fn chain_id(&self) -> ChainResult<String> {
        let id = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        Ok(id.to_string())
    }

    async fn latest_block(&self) -> ChainResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn subscribe(&self, from_block: u64) -> ChainResult<EventStream> {
        let poller = LogPoller {
            provider: self.provider.clone(),
            config: self.config.clone(),
        };

        let state = PollState {
            poller,
            next_block: from_block,
            buffer: VecDeque::new(),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(record) = state.buffer.pop_front() {
                    return Some((Ok(record), state));
                }

                match state.poller.poll_once(state.next_block).await {
                    Ok(Some((records, next_block))) => {
                        state.next_block = next_block;
                        state.buffer = records;
                        // Empty batches just advance the cursor; loop
                        // again until something is deliverable.
                    }
                    Ok(None) => {
                        // Caught up to the safe head.
                        tokio::time::sleep(state.poller.config.poll_interval).await;
                    }
                    Err(e) => return Some((Err(e), state)),
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

// =============================================================================
// Log polling
// =============================================================================

struct PollState {
    poller: LogPoller,
    next_block: u64,
    buffer: VecDeque<EventRecord>,
}

#[derive(Clone)]
struct LogPoller {
    provider: RootProvider<Http<Client>>,
    config: EnsRentClientConfig,
}

impl LogPoller {
    /// Fetch the next batch of logs at or above `from_block`.
    ///
    /// Returns `None` when `from_block` is past the safe head, otherwise
    /// the decoded records and the first block of the following batch.
    async fn poll_once(
        &self,
        from_block: u64,
    ) -> ChainResult<Option<(VecDeque<EventRecord>, u64)>> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        let safe_head = head.saturating_sub(self.config.confirmations);

        if from_block > safe_head {
            trace!(from_block, safe_head, "Caught up, waiting for new blocks");
            return Ok(None);
        }

        let to_block = batch_end(from_block, self.config.batch_size, safe_head);

        let filter = Filter::new()
            .address(self.config.contract_address)
            .event_signature(vec![
                DomainListed::SIGNATURE_HASH,
                DomainRented::SIGNATURE_HASH,
                DomainReclaimed::SIGNATURE_HASH,
            ])
            .from_block(from_block)
            .to_block(to_block);

        let logs: Vec<Log> = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        debug!(
            from_block,
            to_block,
            count = logs.len(),
            "Fetched marketplace logs"
        );

        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        let mut records = VecDeque::with_capacity(logs.len());

        for log in &logs {
            match decode_log(log) {
                Ok(Some(mut record)) => {
                    record.block_timestamp =
                        self.block_timestamp(record.block_number, &mut timestamps).await?;
                    records.push_back(record);
                }
                Ok(None) => {
                    // Filtered by signature, so an unknown topic means a
                    // contract upgrade we do not understand yet.
                    warn!(block = log.block_number, "Skipping log with unknown topic");
                }
                Err(e) => {
                    let block = log.block_number.unwrap_or_default();
                    record_decode_error(block);
                    return Err(e);
                }
            }
        }

        Ok(Some((records, to_block + 1)))
    }

    /// Fetch a block timestamp, memoized per batch.
    async fn block_timestamp(
        &self,
        block_number: u64,
        cache: &mut HashMap<u64, u64>,
    ) -> ChainResult<u64> {
        if let Some(ts) = cache.get(&block_number) {
            return Ok(*ts);
        }

        let block = self
            .provider
            .get_block_by_number(
                BlockNumberOrTag::Number(block_number),
                BlockTransactionsKind::Hashes,
            )
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .ok_or(ChainError::Timeout(block_number))?;

        let ts = block.header.timestamp;
        cache.insert(block_number, ts);
        Ok(ts)
    }
}

/// Last block of a batch starting at `from_block`, clamped to the safe
/// head. A batch size of zero scans a single block instead of panicking
/// on the span arithmetic.
fn batch_end(from_block: u64, batch_size: u64, safe_head: u64) -> u64 {
    safe_head.min(from_block.saturating_add(batch_size.max(1) - 1))
}

// =============================================================================
// Log decoding
// =============================================================================

/// Decode a contract log into an event record.
///
/// The timestamp is filled in by the caller; logs with a topic outside
/// the marketplace set decode to `None`.
fn decode_log(log: &Log) -> ChainResult<Option<EventRecord>> {
    let block_number = log
        .block_number
        .ok_or_else(|| missing_field(log, "block_number"))?;
    let log_index = log.log_index.ok_or_else(|| missing_field(log, "log_index"))?;
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| missing_field(log, "transaction_hash"))?;

    let topic0 = match log.topic0() {
        Some(t) => *t,
        None => return Ok(None),
    };

    let payload = if topic0 == DomainListed::SIGNATURE_HASH {
        let ev = DomainListed::decode_log(log.as_ref(), true)
            .map_err(|e| decode_failure(block_number, "DomainListed", e))?;
        EventPayload::Listed {
            token_id: ev.tokenId,
            lender: ev.lender,
            price: ev.minPricePerSecond,
            max_rental_time: u64_field(block_number, "maxEndTimestamp", ev.maxEndTimestamp)?,
            node: B256::from(ev.nameNode),
            name: ev.name.clone(),
        }
    } else if topic0 == DomainRented::SIGNATURE_HASH {
        let ev = DomainRented::decode_log(log.as_ref(), true)
            .map_err(|e| decode_failure(block_number, "DomainRented", e))?;
        EventPayload::Rented {
            token_id: ev.tokenId,
            borrower: ev.borrower,
            end_time: u64_field(block_number, "rentalEnd", ev.rentalEnd)?,
            price: ev.pricePerSecond,
        }
    } else if topic0 == DomainReclaimed::SIGNATURE_HASH {
        let ev = DomainReclaimed::decode_log(log.as_ref(), true)
            .map_err(|e| decode_failure(block_number, "DomainReclaimed", e))?;
        EventPayload::Reclaimed {
            token_id: ev.tokenId,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(EventRecord {
        block_number,
        log_index,
        tx_hash,
        block_timestamp: 0,
        payload,
    }))
}

fn missing_field(log: &Log, field: &str) -> ChainError {
    ChainError::LogDecodeError {
        block: log.block_number.unwrap_or_default(),
        message: format!("log missing {}", field),
    }
}

fn decode_failure(block: u64, event: &str, e: impl std::fmt::Display) -> ChainError {
    ChainError::LogDecodeError {
        block,
        message: format!("{}: {}", event, e),
    }
}

/// Narrow a uint256 timestamp to u64.
///
/// Contract timestamps are seconds since the epoch and end up in signed
/// 64-bit storage columns, so anything above `i64::MAX` is a corrupt or
/// hostile value and is rejected here instead of being stored wrapped.
fn u64_field(block: u64, field: &str, value: alloy_primitives::U256) -> ChainResult<u64> {
    i64::try_from(value)
        .map(|v| v as u64)
        .map_err(|_| ChainError::LogDecodeError {
            block,
            message: format!("{} out of timestamp range: {}", field, value),
        })
}
