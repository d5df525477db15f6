//! Prints the most recent TipJar events straight from a node, without touching the database.
//!
//! Usage: `tip_logs [blocks]` with `RPC_HTTP_URL` and `TIPJAR_ADDRESS` set (or in `.env`).
use anyhow::Context;
use alloy::primitives::Address;
use tipjar_indexer::indexer::decode_batch;
use tipjar_indexer::mapping::token_symbol;
use tipjar_indexer::parser::{known_topics, TipJarEvent};
use tipjar_indexer::rpc::RpcClient;

const DEFAULT_RANGE: u64 = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let rpc_url =
        std::env::var("RPC_HTTP_URL").unwrap_or_else(|_| "https://polygon-rpc.com".to_string());
    let tip_jar: Address = std::env::var("TIPJAR_ADDRESS")
        .context("TIPJAR_ADDRESS is not set")?
        .parse()
        .context("TIPJAR_ADDRESS is not an address")?;
    let range: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse().context("block range must be a number")?,
        None => DEFAULT_RANGE,
    };

    let rpc = RpcClient::new(&rpc_url)?;
    println!("Fetching TipJar events from {}...", rpc.url());

    let latest = rpc.block_number().await?;
    println!("Latest block: {}", latest);

    let from = latest.saturating_sub(range);
    let raw = rpc.get_logs(tip_jar, &known_topics(), from, latest).await?;
    let events = decode_batch(&raw);
    println!("Fetched {} logs, {} decoded", raw.len(), events.len());

    for log in events.iter().rev().take(10) {
        let meta = &log.meta;
        match &log.event {
            TipJarEvent::TipSent(tip) => println!(
                "Tip | Block: {} | Tx: {} | {:#x} → {:#x} | {} {} (fee {}) | {:?}",
                meta.block_number,
                meta.tx_hash,
                tip.tipper,
                tip.creator,
                tip.amount,
                token_symbol(&tip.token),
                tip.fee,
                tip.message
            ),
            TipJarEvent::CreatorWithdrawal(w) => println!(
                "Withdrawal | Block: {} | Tx: {} | {:#x} | {} {}",
                meta.block_number,
                meta.tx_hash,
                w.creator,
                w.amount,
                token_symbol(&w.token)
            ),
            other => println!("Admin | Block: {} | {:?}", meta.block_number, other),
        }
    }

    Ok(())
}
