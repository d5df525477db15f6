use alloy::primitives::Address;
use dotenvy::dotenv;
use eyre::{eyre, Result, WrapErr};
use std::env;
use std::str::FromStr;
use tracing::info;

use crate::networks::{self, Contract, DEFAULT_CHAIN_ID};

#[derive(Debug, Clone)]
pub struct Config {
    pub chain_id: u64,
    pub rpc_http_url: String,
    pub tip_jar: Address,
    pub db_path: String,
    pub confirmations: u64,
    /// First block to index on an empty database.
    pub start_block: Option<u64>,
    pub backfill_blocks: u64,
    pub log_chunk_size: u64,
    pub poll_interval_secs: u64,
    pub port: u16,
    pub pyth_endpoint: String,
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| eyre!("Invalid {}={:?}: {}", key, raw, e)),
        _ => Ok(default),
    }
}

impl Config {
    /// Build a config from any key lookup; `load` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let chain_id = parse_or(&lookup, "CHAIN_ID", DEFAULT_CHAIN_ID)?;
        let network = networks::network_config(chain_id)?;

        // ✅ RPC URL (fallback to the network's public endpoint)
        let rpc_http_url = lookup("RPC_HTTP_URL")
            .or_else(|| lookup("POLYGON_RPC"))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| network.rpc_url.to_string());

        // ✅ TipJar address: env wins, registry otherwise
        let tip_jar = match lookup("TIPJAR_ADDRESS").filter(|s| !s.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse::<Address>()
                .wrap_err_with(|| format!("Invalid TIPJAR_ADDRESS={:?}", raw))?,
            None => networks::contract_address(chain_id, Contract::TipJar)?,
        };
        if tip_jar.is_zero() {
            return Err(eyre!(
                "TipJar is not deployed on {} ({}); set TIPJAR_ADDRESS",
                network.name,
                chain_id
            ));
        }

        let db_path = lookup("DATABASE_URL").unwrap_or_else(|| "tipjar.db".to_string());

        let start_block = match lookup("START_BLOCK").filter(|s| !s.trim().is_empty()) {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .map_err(|e| eyre!("Invalid START_BLOCK={:?}: {}", raw, e))?,
            ),
            None => None,
        };

        let log_chunk_size: u64 = parse_or(&lookup, "LOG_CHUNK_SIZE", 2000)?;
        if log_chunk_size == 0 {
            return Err(eyre!("LOG_CHUNK_SIZE must be at least 1"));
        }

        let pyth_endpoint = lookup("PYTH_ENDPOINT")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| networks::pyth_endpoint(chain_id).to_string());

        Ok(Config {
            chain_id,
            rpc_http_url,
            tip_jar,
            db_path,
            confirmations: parse_or(&lookup, "CONFIRMATIONS", 2)?,
            start_block,
            backfill_blocks: parse_or(&lookup, "BACKFILL_BLOCKS", 5000)?,
            log_chunk_size,
            poll_interval_secs: parse_or(&lookup, "POLL_INTERVAL_SECS", 10)?,
            port: parse_or(&lookup, "PORT", 8080)?,
            pyth_endpoint,
        })
    }
}

pub fn load() -> Result<Config> {
    dotenv().ok(); // ✅ Load from .env file

    let cfg = Config::from_lookup(|key| env::var(key).ok())?;

    // ✅ Log loaded config for debugging
    info!("Loaded config: {:?}", cfg);

    Ok(cfg)
}
