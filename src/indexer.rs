use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use eyre::{eyre, Result};
use futures_util::future::try_join_all;
use rusqlite::Connection;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::address_id;
use crate::parser::{self, DecodedLog, TipJarEvent};
use crate::rpc::{Log, RpcClient};
use crate::{db, mapping};

/// Longest wait between polls after repeated failures.
pub const MAX_RETRY_DELAY_SECS: u64 = 120;

/// Wait before the next poll: the base interval after success, doubled after each failure.
pub fn next_delay(current: u64, base: u64, failed: bool) -> u64 {
    if failed {
        (current * 2).clamp(base, MAX_RETRY_DELAY_SECS.max(base))
    } else {
        base
    }
}

/// First block to scan. Resume after the cursor, else honour `START_BLOCK`,
/// else backfill a fixed window behind the target.
pub fn first_block(
    cursor: Option<u64>,
    start_block: Option<u64>,
    target: u64,
    backfill: u64,
) -> u64 {
    match (cursor, start_block) {
        (Some(last), _) => last + 1,
        (None, Some(start)) => start,
        (None, None) => target.saturating_sub(backfill),
    }
}

/// Decode raw logs in chain order. Undecodable logs are logged and skipped.
pub fn decode_batch(logs: &[Log]) -> Vec<DecodedLog> {
    let mut decoded: Vec<DecodedLog> = logs
        .iter()
        .filter_map(|log| match parser::decode_log(log) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Skipping undecodable log in tx {}: {}", log.tx_hash, e);
                None
            }
        })
        .collect();
    decoded.sort_by_key(|l| (l.meta.block_number, l.meta.log_index));
    decoded
}

/// Apply a decoded chunk and advance the cursor to `to_block`, all in one transaction.
/// Returns how many events changed state.
pub fn apply_batch(
    conn: &mut Connection,
    chain_id: u64,
    contract: &str,
    logs: &[DecodedLog],
    to_block: u64,
    block_timestamps: &HashMap<u64, u64>,
) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut applied = 0;

    for log in logs {
        let timestamp = block_timestamps
            .get(&log.meta.block_number)
            .copied()
            .unwrap_or_default();
        if mapping::apply(&tx, log, timestamp)? {
            applied += 1;
        }
    }

    db::save_cursor(&tx, chain_id, contract, to_block)?;
    tx.commit()?;
    Ok(applied)
}

/// Only TokenAdded carries no timestamp of its own.
async fn block_timestamps(rpc: &RpcClient, logs: &[DecodedLog]) -> Result<HashMap<u64, u64>> {
    let blocks: BTreeSet<u64> = logs
        .iter()
        .filter(|l| matches!(l.event, TipJarEvent::TokenAdded { .. }))
        .map(|l| l.meta.block_number)
        .collect();

    let timestamps = try_join_all(blocks.iter().map(|&block| async move {
        rpc.block_timestamp(block).await.map(|ts| (block, ts))
    }))
    .await?;

    Ok(timestamps.into_iter().collect())
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| eyre!("database mutex poisoned"))
}

/// Scan everything between the cursor and the confirmed head. Returns the number of applied events.
pub async fn sync_once(cfg: &Config, rpc: &RpcClient, conn: &Mutex<Connection>) -> Result<usize> {
    let contract = address_id(&cfg.tip_jar);
    let topics = parser::known_topics();

    let latest = rpc.block_number().await?;
    let target = latest.saturating_sub(cfg.confirmations);

    let cursor = db::load_cursor(&*lock(conn)?, cfg.chain_id, &contract)?;
    let from = first_block(cursor, cfg.start_block, target, cfg.backfill_blocks);
    if from > target {
        debug!("Up to date at block {} (head {})", target, latest);
        return Ok(0);
    }

    info!("Live: block {} (scanning {} → {})", latest, from, target);

    let mut total = 0;
    let mut chunk_start = from;
    while chunk_start <= target {
        let chunk_end = chunk_start
            .saturating_add(cfg.log_chunk_size - 1)
            .min(target);

        let raw = rpc
            .get_logs(cfg.tip_jar, &topics, chunk_start, chunk_end)
            .await?;
        let logs = decode_batch(&raw);
        let timestamps = block_timestamps(rpc, &logs).await?;

        let applied = {
            let mut db = lock(conn)?;
            apply_batch(
                &mut db,
                cfg.chain_id,
                &contract,
                &logs,
                chunk_end,
                &timestamps,
            )?
        };

        info!(
            "Indexed blocks {} → {}: {} logs, {} applied",
            chunk_start,
            chunk_end,
            logs.len(),
            applied
        );
        total += applied;
        chunk_start = chunk_end + 1;
    }

    Ok(total)
}

pub async fn run(cfg: Config, conn: Arc<Mutex<Connection>>) -> Result<()> {
    let rpc = RpcClient::new(&cfg.rpc_http_url)?;
    let base_delay = cfg.poll_interval_secs.max(1);
    let mut retry_delay = base_delay;

    info!(
        "Indexer started for TipJar {:#x} on chain {} (chunk = {} blocks)",
        cfg.tip_jar, cfg.chain_id, cfg.log_chunk_size
    );

    loop {
        match sync_once(&cfg, &rpc, &conn).await {
            Ok(applied) => {
                if applied > 0 {
                    info!("✅ Applied {} events this round", applied);
                }
                retry_delay = next_delay(retry_delay, base_delay, false);
            }
            Err(e) => {
                retry_delay = next_delay(retry_delay, base_delay, true);
                error!("Sync failed: {:?}. Retrying in {}s", e, retry_delay);
            }
        }

        sleep(Duration::from_secs(retry_delay)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ITipJar;
    use crate::db::memory;
    use crate::parser::encode_log;
    use alloy::primitives::{address, Address, B256, U256};
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    const TIP_JAR: Address = address!("00000000000000000000000000000000000000c0");
    const TIPPER: Address = address!("00000000000000000000000000000000000000aa");
    const CREATOR: Address = address!("00000000000000000000000000000000000000bb");
    const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

    fn tip_log(block: u64, index: u64, amount: u64) -> Log {
        let ev = ITipJar::TipSent {
            tipper: TIPPER,
            creator: CREATOR,
            token: Address::ZERO,
            amount: U256::from(amount),
            fee: U256::ZERO,
            message: "gm".to_string(),
            timestamp: U256::from(1_700_000_000u64 + block),
        };
        encode_log(&ev, TIP_JAR, B256::repeat_byte(block as u8), block, index)
    }

    fn withdrawal_log(block: u64, amount: u64) -> Log {
        let ev = ITipJar::CreatorWithdrawal {
            creator: CREATOR,
            token: Address::ZERO,
            amount: U256::from(amount),
            timestamp: U256::from(1_700_000_000u64 + block),
        };
        encode_log(&ev, TIP_JAR, B256::repeat_byte(block as u8), block, 0)
    }

    fn contract() -> String {
        address_id(&TIP_JAR)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(next_delay(10, 10, true), 20);
        assert_eq!(next_delay(80, 10, true), 120);
        assert_eq!(next_delay(120, 10, true), 120);
        assert_eq!(next_delay(120, 10, false), 10);
    }

    #[test]
    fn first_block_prefers_cursor_then_start_block() {
        assert_eq!(first_block(Some(99), Some(5), 1_000, 50), 100);
        assert_eq!(first_block(None, Some(5), 1_000, 50), 5);
        assert_eq!(first_block(None, None, 1_000, 50), 950);
        assert_eq!(first_block(None, None, 10, 50), 0);
    }

    #[test]
    fn decode_batch_orders_by_block_and_index() {
        let mut garbage = tip_log(1, 0, 1);
        garbage.data = "0xdead".to_string();

        let logs = vec![tip_log(7, 2, 1), tip_log(3, 0, 1), tip_log(7, 0, 1), garbage];
        let decoded = decode_batch(&logs);

        let order: Vec<(u64, u64)> = decoded
            .iter()
            .map(|l| (l.meta.block_number, l.meta.log_index))
            .collect();
        assert_eq!(order, vec![(3, 0), (7, 0), (7, 2)]);
    }

    #[test]
    fn batch_advances_cursor_and_replays_cleanly() {
        let mut conn = memory();
        let logs = decode_batch(&[tip_log(10, 0, 500), withdrawal_log(11, 200)]);

        let applied = apply_batch(&mut conn, 137, &contract(), &logs, 20, &HashMap::new()).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(db::load_cursor(&conn, 137, &contract()).unwrap(), Some(20));

        let applied = apply_batch(&mut conn, 137, &contract(), &logs, 20, &HashMap::new()).unwrap();
        assert_eq!(applied, 0);

        let creator = db::load_creator(&conn, &address_id(&CREATOR)).unwrap().unwrap();
        assert_eq!(creator.tip_count, 1);
        assert_eq!(creator.withdrawn_eth, U256::from(200u64));
    }

    #[test]
    fn failed_batch_rolls_back_entirely() {
        let mut conn = memory();
        conn.execute("DROP TABLE withdrawals", []).unwrap();
        let logs = decode_batch(&[tip_log(10, 0, 500), withdrawal_log(11, 200)]);

        assert!(apply_batch(&mut conn, 137, &contract(), &logs, 20, &HashMap::new()).is_err());
        assert_eq!(db::load_cursor(&conn, 137, &contract()).unwrap(), None);
        assert!(db::load_creator(&conn, &address_id(&CREATOR)).unwrap().is_none());
    }

    #[test]
    fn token_added_uses_block_timestamp() {
        let mut conn = memory();
        let ev = ITipJar::TokenAdded {
            token: USDC,
            minTipAmount: U256::from(1_000_000u64),
        };
        let logs = decode_batch(&[encode_log(&ev, TIP_JAR, B256::repeat_byte(9), 42, 0)]);
        let timestamps = HashMap::from([(42u64, 1_650_000_000u64)]);

        apply_batch(&mut conn, 137, &contract(), &logs, 42, &timestamps).unwrap();
        let stats = db::load_token_stats(&conn, &address_id(&USDC)).unwrap().unwrap();
        assert_eq!(stats.last_updated, 1_650_000_000);
        assert_eq!(stats.symbol, "USDC");
    }

    async fn mock_node(head: u64, logs: Vec<Log>) -> String {
        let logs: Vec<Value> = logs
            .iter()
            .map(|l| {
                json!({
                    "address": l.address,
                    "topics": l.topics,
                    "data": l.data,
                    "blockNumber": l.block_number_hex,
                    "transactionHash": l.tx_hash,
                    "logIndex": l.log_index_hex,
                })
            })
            .collect();

        let app = Router::new().route(
            "/",
            post(move |Json(body): Json<Value>| {
                let logs = logs.clone();
                async move {
                    let result = match body["method"].as_str() {
                        Some("eth_blockNumber") => json!(format!("0x{:x}", head)),
                        Some("eth_getLogs") => {
                            let filter = &body["params"][0];
                            let from = quantity(&filter["fromBlock"]);
                            let to = quantity(&filter["toBlock"]);
                            let in_range: Vec<Value> = logs
                                .into_iter()
                                .filter(|l| {
                                    let b = quantity(&l["blockNumber"]);
                                    b >= from && b <= to
                                })
                                .collect();
                            json!(in_range)
                        }
                        _ => Value::Null,
                    };
                    Json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn quantity(value: &Value) -> u64 {
        crate::rpc::parse_quantity(value.as_str().unwrap()).unwrap()
    }

    fn test_config(rpc_url: &str) -> Config {
        Config {
            chain_id: 137,
            rpc_http_url: rpc_url.to_string(),
            tip_jar: TIP_JAR,
            db_path: ":memory:".to_string(),
            confirmations: 2,
            start_block: Some(1),
            backfill_blocks: 5000,
            log_chunk_size: 4,
            poll_interval_secs: 10,
            port: 0,
            pyth_endpoint: String::new(),
        }
    }

    #[tokio::test]
    async fn sync_once_walks_chunks_up_to_confirmed_head() {
        // head 20, 2 confirmations: block 19 is not final yet
        let logs = vec![tip_log(3, 0, 100), tip_log(9, 1, 100), tip_log(19, 0, 100)];
        let url = mock_node(20, logs).await;
        let cfg = test_config(&url);
        let rpc = RpcClient::new(&url).unwrap();
        let conn = Mutex::new(memory());

        assert_eq!(sync_once(&cfg, &rpc, &conn).await.unwrap(), 2);
        {
            let db = conn.lock().unwrap();
            assert_eq!(db::load_cursor(&db, 137, &contract()).unwrap(), Some(18));
            let creator = db::load_creator(&db, &address_id(&CREATOR)).unwrap().unwrap();
            assert_eq!(creator.tip_count, 2);
        }

        // nothing new below the confirmed head
        assert_eq!(sync_once(&cfg, &rpc, &conn).await.unwrap(), 0);
    }
}
