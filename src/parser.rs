// src/parser.rs
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, LogData, B256, U256};
use alloy::sol_types::SolEvent;
use chrono::DateTime;
use thiserror::Error;

use crate::abi::{ISimpleTipJar, ITipJar};
use crate::rpc::{parse_quantity, Log};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid topic {0}")]
    Topic(String),
    #[error("invalid log data")]
    Data,
    #[error("invalid transaction hash {0}")]
    TxHash(String),
    #[error("invalid log position: {0}")]
    Position(String),
    #[error("{event} ABI decode failed: {source}")]
    Abi {
        event: &'static str,
        #[source]
        source: alloy::sol_types::Error,
    },
    #[error("timestamp {0} is outside the representable UTC range")]
    Timestamp(U256),
}

/// Where a log sits in the chain. Tip and withdrawal ids derive from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
}

impl EventMeta {
    pub fn entity_id(&self) -> String {
        format!("{}-{}", self.tx_hash, self.log_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipSent {
    pub tipper: Address,
    pub creator: Address,
    pub token: Address,
    pub amount: U256,
    pub fee: U256,
    pub message: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatorWithdrawal {
    pub creator: Address,
    pub token: Address,
    pub amount: U256,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipJarEvent {
    TipSent(TipSent),
    CreatorWithdrawal(CreatorWithdrawal),
    TokenAdded { token: Address, min_tip_amount: U256 },
    TokenRemoved { token: Address },
    PlatformFeeUpdated { old_fee: U256, new_fee: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLog {
    pub meta: EventMeta,
    pub event: TipJarEvent,
}

/// topic0 of every event the indexer understands.
pub fn known_topics() -> Vec<B256> {
    vec![
        ITipJar::TipSent::SIGNATURE_HASH,
        ITipJar::CreatorWithdrawal::SIGNATURE_HASH,
        ITipJar::TokenAdded::SIGNATURE_HASH,
        ITipJar::TokenRemoved::SIGNATURE_HASH,
        ITipJar::PlatformFeeUpdated::SIGNATURE_HASH,
        ISimpleTipJar::TipSent::SIGNATURE_HASH,
        ISimpleTipJar::Withdrawal::SIGNATURE_HASH,
    ]
}

/// Seconds since the epoch, limited to what the day and month buckets can format.
fn timestamp(value: U256) -> Result<u64, DecodeError> {
    i64::try_from(value)
        .ok()
        .filter(|secs| *secs >= 0 && DateTime::from_timestamp(*secs, 0).is_some())
        .map(|secs| secs as u64)
        .ok_or(DecodeError::Timestamp(value))
}

fn decode<E: SolEvent>(data: &LogData) -> Result<E, DecodeError> {
    E::decode_log_data(data).map_err(|source| DecodeError::Abi {
        event: E::SIGNATURE,
        source,
    })
}

fn log_data(log: &Log) -> Result<LogData, DecodeError> {
    let topics = log
        .topics
        .iter()
        .map(|t| B256::from_str(t).map_err(|_| DecodeError::Topic(t.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    let data = Bytes::from_str(&log.data).map_err(|_| DecodeError::Data)?;
    Ok(LogData::new_unchecked(topics, data))
}

fn event_meta(log: &Log) -> Result<EventMeta, DecodeError> {
    let tx_hash =
        B256::from_str(&log.tx_hash).map_err(|_| DecodeError::TxHash(log.tx_hash.clone()))?;
    let block_number = parse_quantity(&log.block_number_hex)
        .map_err(|_| DecodeError::Position(log.block_number_hex.clone()))?;
    let log_index = parse_quantity(&log.log_index_hex)
        .map_err(|_| DecodeError::Position(log.log_index_hex.clone()))?;

    Ok(EventMeta {
        tx_hash: format!("{:#x}", tx_hash),
        block_number,
        log_index,
    })
}

/// Decode a TipJar log. `Ok(None)` for removed logs and unknown events.
pub fn decode_log(log: &Log) -> Result<Option<DecodedLog>, DecodeError> {
    if log.removed {
        return Ok(None);
    }

    let data = log_data(log)?;
    let Some(topic0) = data.topics().first().copied() else {
        return Ok(None);
    };

    let event = if topic0 == ITipJar::TipSent::SIGNATURE_HASH {
        let ev: ITipJar::TipSent = decode(&data)?;
        TipJarEvent::TipSent(TipSent {
            tipper: ev.tipper,
            creator: ev.creator,
            token: ev.token,
            amount: ev.amount,
            fee: ev.fee,
            message: ev.message,
            timestamp: timestamp(ev.timestamp)?,
        })
    } else if topic0 == ISimpleTipJar::TipSent::SIGNATURE_HASH {
        let ev: ISimpleTipJar::TipSent = decode(&data)?;
        TipJarEvent::TipSent(TipSent {
            tipper: ev.tipper,
            creator: ev.creator,
            token: ev.token,
            amount: ev.amount,
            fee: U256::ZERO,
            message: ev.message,
            timestamp: timestamp(ev.timestamp)?,
        })
    } else if topic0 == ITipJar::CreatorWithdrawal::SIGNATURE_HASH {
        let ev: ITipJar::CreatorWithdrawal = decode(&data)?;
        TipJarEvent::CreatorWithdrawal(CreatorWithdrawal {
            creator: ev.creator,
            token: ev.token,
            amount: ev.amount,
            timestamp: timestamp(ev.timestamp)?,
        })
    } else if topic0 == ISimpleTipJar::Withdrawal::SIGNATURE_HASH {
        let ev: ISimpleTipJar::Withdrawal = decode(&data)?;
        TipJarEvent::CreatorWithdrawal(CreatorWithdrawal {
            creator: ev.creator,
            token: ev.token,
            amount: ev.amount,
            timestamp: timestamp(ev.timestamp)?,
        })
    } else if topic0 == ITipJar::TokenAdded::SIGNATURE_HASH {
        let ev: ITipJar::TokenAdded = decode(&data)?;
        TipJarEvent::TokenAdded {
            token: ev.token,
            min_tip_amount: ev.minTipAmount,
        }
    } else if topic0 == ITipJar::TokenRemoved::SIGNATURE_HASH {
        let ev: ITipJar::TokenRemoved = decode(&data)?;
        TipJarEvent::TokenRemoved { token: ev.token }
    } else if topic0 == ITipJar::PlatformFeeUpdated::SIGNATURE_HASH {
        let ev: ITipJar::PlatformFeeUpdated = decode(&data)?;
        TipJarEvent::PlatformFeeUpdated {
            old_fee: ev.oldFee,
            new_fee: ev.newFee,
        }
    } else {
        return Ok(None);
    };

    Ok(Some(DecodedLog {
        meta: event_meta(log)?,
        event,
    }))
}

/// Turn an ABI event into the JSON-RPC log shape. Used by tests and the `tip_logs` binary.
pub fn encode_log<E: SolEvent>(
    event: &E,
    contract: Address,
    tx_hash: B256,
    block_number: u64,
    log_index: u64,
) -> Log {
    let data = event.encode_log_data();
    Log {
        address: format!("{:#x}", contract),
        topics: data.topics().iter().map(|t| format!("{:#x}", t)).collect(),
        data: alloy::primitives::hex::encode_prefixed(&data.data),
        block_number_hex: format!("0x{:x}", block_number),
        tx_hash: format!("{:#x}", tx_hash),
        log_index_hex: format!("0x{:x}", log_index),
        removed: false,
    }
}
