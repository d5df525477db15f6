// src/tip.rs
//! Builds the transactions a wallet sends to tip a creator.
use alloy::primitives::utils::{parse_units, ParseUnits, UnitsError};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;
use thiserror::Error;

use crate::abi::{IERC20, ITipJar};
use crate::mapping::{ETH_DECIMALS, USDC_DECIMALS};
use crate::networks::{
    contract_address, Contract, NetworkError, MAX_ETH_TIP, MAX_USDC_TIP, MIN_ETH_TIP,
    MIN_USDC_TIP,
};

#[derive(Debug, Error)]
pub enum TipError {
    #[error("Invalid amount: {0}")]
    Amount(#[from] UnitsError),
    #[error("Tip amount must be positive")]
    NotPositive,
    #[error("Tip of {amount} is below the minimum of {min}")]
    BelowMinimum { amount: U256, min: U256 },
    #[error("Tip of {amount} is above the maximum of {max}")]
    AboveMaximum { amount: U256, max: U256 },
    #[error("TipJar is not deployed on chain ID {0}")]
    NotDeployed(u64),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TipToken {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "USDC")]
    Usdc,
}

impl TipToken {
    pub fn decimals(self) -> u8 {
        match self {
            TipToken::Eth => ETH_DECIMALS,
            TipToken::Usdc => USDC_DECIMALS,
        }
    }

    fn bounds(self) -> (U256, U256) {
        match self {
            TipToken::Eth => (MIN_ETH_TIP, MAX_ETH_TIP),
            TipToken::Usdc => (MIN_USDC_TIP, MAX_USDC_TIP),
        }
    }
}

/// A validated tip, amount in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipRequest {
    pub creator: Address,
    pub token: TipToken,
    pub amount: U256,
    pub message: String,
}

/// One transaction for the wallet to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipCall {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

impl TipRequest {
    /// Parse a human amount (`"0.05"` ETH, `"12.5"` USDC) and check it against the tip limits.
    pub fn parse(
        creator: Address,
        token: TipToken,
        amount: &str,
        message: impl Into<String>,
    ) -> Result<Self, TipError> {
        let amount = match parse_units(amount.trim(), token.decimals())? {
            ParseUnits::U256(v) => v,
            ParseUnits::I256(_) => return Err(TipError::NotPositive),
        };
        if amount.is_zero() {
            return Err(TipError::NotPositive);
        }

        let (min, max) = token.bounds();
        if amount < min {
            return Err(TipError::BelowMinimum { amount, min });
        }
        if amount > max {
            return Err(TipError::AboveMaximum { amount, max });
        }

        Ok(Self {
            creator,
            token,
            amount,
            message: message.into(),
        })
    }

    /// ABI-encoded `tipETH` or `tipToken` call.
    pub fn calldata(&self, usdc: Address) -> Bytes {
        let encoded = match self.token {
            TipToken::Eth => ITipJar::tipETHCall {
                creator: self.creator,
                message: self.message.clone(),
            }
            .abi_encode(),
            TipToken::Usdc => ITipJar::tipTokenCall {
                creator: self.creator,
                token: usdc,
                amount: self.amount,
                message: self.message.clone(),
            }
            .abi_encode(),
        };
        encoded.into()
    }

    /// The tip transaction against the TipJar deployed on `chain_id`.
    pub fn call(&self, chain_id: u64) -> Result<TipCall, TipError> {
        let tip_jar = contract_address(chain_id, Contract::TipJar)?;
        if tip_jar.is_zero() {
            return Err(TipError::NotDeployed(chain_id));
        }

        let (usdc, value) = match self.token {
            TipToken::Eth => (Address::ZERO, self.amount),
            TipToken::Usdc => (contract_address(chain_id, Contract::Usdc)?, U256::ZERO),
        };

        Ok(TipCall {
            to: tip_jar,
            value,
            input: self.calldata(usdc),
        })
    }

    /// USDC tips need an allowance first; ETH tips need nothing.
    pub fn approval(&self, chain_id: u64) -> Result<Option<TipCall>, TipError> {
        if self.token == TipToken::Eth {
            return Ok(None);
        }
        let tip_jar = contract_address(chain_id, Contract::TipJar)?;
        if tip_jar.is_zero() {
            return Err(TipError::NotDeployed(chain_id));
        }
        let usdc = contract_address(chain_id, Contract::Usdc)?;

        let input = IERC20::approveCall {
            spender: tip_jar,
            amount: self.amount,
        }
        .abi_encode();

        Ok(Some(TipCall {
            to: usdc,
            value: U256::ZERO,
            input: input.into(),
        }))
    }
}
