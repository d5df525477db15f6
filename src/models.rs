// src/models.rs
use alloy::primitives::{Address, I256, U256};
use serde::{Serialize, Serializer};
use std::fmt::Display;

pub const PLATFORM_STATS_ID: &str = "platform";

/// Big integers go over the wire as decimal strings.
fn as_string<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Lowercase `0x` hex, the key used for every address-keyed entity.
pub fn address_id(address: &Address) -> String {
    format!("{:#x}", address)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub id: String,
    #[serde(serialize_with = "as_string")]
    pub total_tips_eth: U256,
    #[serde(serialize_with = "as_string")]
    pub total_tips_usdc: U256,
    pub tip_count: u64,
    pub unique_tippers: u64,
    /// Not clamped at zero; a withdrawal the indexer never saw tipped in goes negative.
    #[serde(serialize_with = "as_string")]
    pub balance_eth: I256,
    #[serde(serialize_with = "as_string")]
    pub balance_usdc: I256,
    #[serde(serialize_with = "as_string")]
    pub withdrawn_eth: U256,
    #[serde(serialize_with = "as_string")]
    pub withdrawn_usdc: U256,
    pub first_tip_at: Option<u64>,
    pub last_tip_at: Option<u64>,
}

impl Creator {
    pub fn new(id: String) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tipper {
    pub id: String,
    #[serde(serialize_with = "as_string")]
    pub total_tipped_eth: U256,
    #[serde(serialize_with = "as_string")]
    pub total_tipped_usdc: U256,
    pub tip_count: u64,
    pub unique_creators: u64,
    pub first_tip_at: Option<u64>,
    pub last_tip_at: Option<u64>,
}

impl Tipper {
    pub fn new(id: String) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tip {
    pub id: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub log_index: u64,
    pub tipper: String,
    pub creator: String,
    pub token: String,
    pub token_symbol: String,
    #[serde(serialize_with = "as_string")]
    pub amount: U256,
    #[serde(serialize_with = "as_string")]
    pub fee: U256,
    #[serde(serialize_with = "as_string")]
    pub net_amount: U256,
    pub message: String,
    #[serde(serialize_with = "as_string")]
    pub usd_value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub log_index: u64,
    pub creator: String,
    pub token: String,
    pub token_symbol: String,
    #[serde(serialize_with = "as_string")]
    pub amount: U256,
    #[serde(serialize_with = "as_string")]
    pub usd_value: U256,
}

/// Daily (`YYYY-MM-DD`) or monthly (`YYYY-MM`) rollup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub id: String,
    /// Day start for daily buckets, first tip timestamp for monthly ones.
    pub period_start: u64,
    #[serde(serialize_with = "as_string")]
    pub total_tips_eth: U256,
    #[serde(serialize_with = "as_string")]
    pub total_tips_usdc: U256,
    pub tip_count: u64,
    pub unique_tippers: u64,
    pub unique_creators: u64,
    #[serde(serialize_with = "as_string")]
    pub total_usd_volume: U256,
    #[serde(serialize_with = "as_string")]
    pub avg_tip_usd: U256,
}

impl PeriodStats {
    pub fn new(id: String, period_start: u64) -> Self {
        Self {
            id,
            period_start,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub id: String,
    #[serde(serialize_with = "as_string")]
    pub total_tips_eth: U256,
    #[serde(serialize_with = "as_string")]
    pub total_tips_usdc: U256,
    pub total_tip_count: u64,
    pub total_tippers: u64,
    pub total_creators: u64,
    #[serde(serialize_with = "as_string")]
    pub total_fees_eth: U256,
    #[serde(serialize_with = "as_string")]
    pub total_fees_usdc: U256,
    #[serde(serialize_with = "as_string")]
    pub total_usd_volume: U256,
    pub last_updated: u64,
}

impl Default for PlatformStats {
    fn default() -> Self {
        Self {
            id: PLATFORM_STATS_ID.to_string(),
            total_tips_eth: U256::ZERO,
            total_tips_usdc: U256::ZERO,
            total_tip_count: 0,
            total_tippers: 0,
            total_creators: 0,
            total_fees_eth: U256::ZERO,
            total_fees_usdc: U256::ZERO,
            total_usd_volume: U256::ZERO,
            last_updated: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStats {
    pub id: String,
    pub symbol: String,
    #[serde(serialize_with = "as_string")]
    pub total_tips: U256,
    pub tip_count: u64,
    #[serde(serialize_with = "as_string")]
    pub total_fees: U256,
    #[serde(serialize_with = "as_string")]
    pub total_withdrawals: U256,
    #[serde(serialize_with = "as_string")]
    pub last_price_usd: U256,
    pub last_updated: u64,
}

impl TokenStats {
    pub fn new(id: String, symbol: &str) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn amounts_serialize_as_decimal_strings() {
        let mut creator = Creator::new("0xbb".to_string());
        creator.total_tips_eth = U256::from(10u64).pow(U256::from(18));
        creator.balance_eth = I256::try_from(-5i64).unwrap();

        let json = serde_json::to_value(&creator).unwrap();
        assert_eq!(json["totalTipsEth"], "1000000000000000000");
        assert_eq!(json["balanceEth"], "-5");
        assert_eq!(json["tipCount"], 0);
        assert!(json["firstTipAt"].is_null());
    }

    #[test]
    fn address_ids_are_lowercase_hex() {
        let addr = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
        assert_eq!(address_id(&addr), "0x2791bca1f2de4661ed88a30c99a7a9449aa84174");
    }
}
