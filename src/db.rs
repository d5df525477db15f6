// src/db.rs
use std::str::FromStr;

use alloy::primitives::{I256, U256};
use eyre::Result;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};

use crate::models::{
    Creator, PeriodStats, PlatformStats, Tip, Tipper, TokenStats, Withdrawal, PLATFORM_STATS_ID,
};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS creators (
  id              TEXT PRIMARY KEY,
  total_tips_eth  TEXT NOT NULL, -- U256 stored as decimal string
  total_tips_usdc TEXT NOT NULL,
  tip_count       INTEGER NOT NULL,
  unique_tippers  INTEGER NOT NULL,
  balance_eth     TEXT NOT NULL, -- I256, may be negative
  balance_usdc    TEXT NOT NULL,
  withdrawn_eth   TEXT NOT NULL,
  withdrawn_usdc  TEXT NOT NULL,
  first_tip_at    INTEGER,
  last_tip_at     INTEGER
);

CREATE TABLE IF NOT EXISTS tippers (
  id                TEXT PRIMARY KEY,
  total_tipped_eth  TEXT NOT NULL,
  total_tipped_usdc TEXT NOT NULL,
  tip_count         INTEGER NOT NULL,
  unique_creators   INTEGER NOT NULL,
  first_tip_at      INTEGER,
  last_tip_at       INTEGER
);

CREATE TABLE IF NOT EXISTS tips (
  id               TEXT PRIMARY KEY, -- <tx_hash>-<log_index>
  transaction_hash TEXT NOT NULL,
  block_number     INTEGER NOT NULL,
  timestamp        INTEGER NOT NULL,
  log_index        INTEGER NOT NULL,
  tipper           TEXT NOT NULL REFERENCES tippers(id),
  creator          TEXT NOT NULL REFERENCES creators(id),
  token            TEXT NOT NULL,
  token_symbol     TEXT NOT NULL,
  amount           TEXT NOT NULL,
  fee              TEXT NOT NULL,
  net_amount       TEXT NOT NULL,
  message          TEXT NOT NULL,
  usd_value        TEXT NOT NULL,
  day_id           TEXT NOT NULL,
  month_id         TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tips_creator ON tips(creator, block_number);
CREATE INDEX IF NOT EXISTS idx_tips_tipper ON tips(tipper, creator);
CREATE INDEX IF NOT EXISTS idx_tips_day ON tips(day_id);
CREATE INDEX IF NOT EXISTS idx_tips_month ON tips(month_id);

CREATE TABLE IF NOT EXISTS withdrawals (
  id               TEXT PRIMARY KEY,
  transaction_hash TEXT NOT NULL,
  block_number     INTEGER NOT NULL,
  timestamp        INTEGER NOT NULL,
  log_index        INTEGER NOT NULL,
  creator          TEXT NOT NULL REFERENCES creators(id),
  token            TEXT NOT NULL,
  token_symbol     TEXT NOT NULL,
  amount           TEXT NOT NULL,
  usd_value        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_withdrawals_creator ON withdrawals(creator, block_number);

CREATE TABLE IF NOT EXISTS daily_stats (
  id               TEXT PRIMARY KEY, -- YYYY-MM-DD
  period_start     INTEGER NOT NULL,
  total_tips_eth   TEXT NOT NULL,
  total_tips_usdc  TEXT NOT NULL,
  tip_count        INTEGER NOT NULL,
  unique_tippers   INTEGER NOT NULL,
  unique_creators  INTEGER NOT NULL,
  total_usd_volume TEXT NOT NULL,
  avg_tip_usd      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS monthly_stats (
  id               TEXT PRIMARY KEY, -- YYYY-MM
  period_start     INTEGER NOT NULL,
  total_tips_eth   TEXT NOT NULL,
  total_tips_usdc  TEXT NOT NULL,
  tip_count        INTEGER NOT NULL,
  unique_tippers   INTEGER NOT NULL,
  unique_creators  INTEGER NOT NULL,
  total_usd_volume TEXT NOT NULL,
  avg_tip_usd      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS platform_stats (
  id               TEXT PRIMARY KEY,
  total_tips_eth   TEXT NOT NULL,
  total_tips_usdc  TEXT NOT NULL,
  total_tip_count  INTEGER NOT NULL,
  total_tippers    INTEGER NOT NULL,
  total_creators   INTEGER NOT NULL,
  total_fees_eth   TEXT NOT NULL,
  total_fees_usdc  TEXT NOT NULL,
  total_usd_volume TEXT NOT NULL,
  last_updated     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS token_stats (
  id                TEXT PRIMARY KEY,
  symbol            TEXT NOT NULL,
  total_tips        TEXT NOT NULL,
  tip_count         INTEGER NOT NULL,
  total_fees        TEXT NOT NULL,
  total_withdrawals TEXT NOT NULL,
  last_price_usd    TEXT NOT NULL,
  last_updated      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_state (
  chain_id   INTEGER NOT NULL,
  contract   TEXT NOT NULL,
  last_block INTEGER NOT NULL,
  updated_at TEXT NOT NULL DEFAULT (datetime('now')),
  PRIMARY KEY (chain_id, contract)
);
"#;

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn u256_at(row: &Row, idx: usize) -> rusqlite::Result<U256> {
    parse_column(row, idx)
}

fn i256_at(row: &Row, idx: usize) -> rusqlite::Result<I256> {
    parse_column(row, idx)
}

fn u64_at(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    let v: i64 = row.get(idx)?;
    Ok(v as u64)
}

fn opt_u64_at(row: &Row, idx: usize) -> rusqlite::Result<Option<u64>> {
    let v: Option<i64> = row.get(idx)?;
    Ok(v.map(|v| v as u64))
}

// ---------- sync cursor ----------

pub fn load_cursor(conn: &Connection, chain_id: u64, contract: &str) -> Result<Option<u64>> {
    let last = conn
        .query_row(
            "SELECT last_block FROM sync_state WHERE chain_id = ?1 AND contract = ?2",
            params![chain_id as i64, contract],
            |r| u64_at(r, 0),
        )
        .optional()?;
    Ok(last)
}

pub fn save_cursor(
    conn: &Connection,
    chain_id: u64,
    contract: &str,
    last_block: u64,
) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sync_state (chain_id, contract, last_block, updated_at)
        VALUES (?1, ?2, ?3, datetime('now'))
        ON CONFLICT(chain_id, contract) DO UPDATE SET
            last_block = excluded.last_block,
            updated_at = excluded.updated_at
        "#,
        params![chain_id as i64, contract, last_block as i64],
    )?;
    Ok(())
}

// ---------- creators ----------

const CREATOR_COLUMNS: &str = "id, total_tips_eth, total_tips_usdc, tip_count, unique_tippers, \
     balance_eth, balance_usdc, withdrawn_eth, withdrawn_usdc, first_tip_at, last_tip_at";

fn creator_from_row(r: &Row) -> rusqlite::Result<Creator> {
    Ok(Creator {
        id: r.get(0)?,
        total_tips_eth: u256_at(r, 1)?,
        total_tips_usdc: u256_at(r, 2)?,
        tip_count: u64_at(r, 3)?,
        unique_tippers: u64_at(r, 4)?,
        balance_eth: i256_at(r, 5)?,
        balance_usdc: i256_at(r, 6)?,
        withdrawn_eth: u256_at(r, 7)?,
        withdrawn_usdc: u256_at(r, 8)?,
        first_tip_at: opt_u64_at(r, 9)?,
        last_tip_at: opt_u64_at(r, 10)?,
    })
}

pub fn load_creator(conn: &Connection, id: &str) -> Result<Option<Creator>> {
    let sql = format!("SELECT {CREATOR_COLUMNS} FROM creators WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], creator_from_row).optional()?)
}

pub fn list_creators(conn: &Connection) -> Result<Vec<Creator>> {
    let sql = format!("SELECT {CREATOR_COLUMNS} FROM creators ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], creator_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn save_creator(conn: &Connection, c: &Creator) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO creators (
            id, total_tips_eth, total_tips_usdc, tip_count, unique_tippers,
            balance_eth, balance_usdc, withdrawn_eth, withdrawn_usdc,
            first_tip_at, last_tip_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            total_tips_eth  = excluded.total_tips_eth,
            total_tips_usdc = excluded.total_tips_usdc,
            tip_count       = excluded.tip_count,
            unique_tippers  = excluded.unique_tippers,
            balance_eth     = excluded.balance_eth,
            balance_usdc    = excluded.balance_usdc,
            withdrawn_eth   = excluded.withdrawn_eth,
            withdrawn_usdc  = excluded.withdrawn_usdc,
            first_tip_at    = excluded.first_tip_at,
            last_tip_at     = excluded.last_tip_at
        "#,
        params![
            c.id,
            c.total_tips_eth.to_string(),
            c.total_tips_usdc.to_string(),
            c.tip_count as i64,
            c.unique_tippers as i64,
            c.balance_eth.to_string(),
            c.balance_usdc.to_string(),
            c.withdrawn_eth.to_string(),
            c.withdrawn_usdc.to_string(),
            c.first_tip_at.map(|t| t as i64),
            c.last_tip_at.map(|t| t as i64),
        ],
    )?;
    Ok(())
}

// ---------- tippers ----------

pub fn load_tipper(conn: &Connection, id: &str) -> Result<Option<Tipper>> {
    let tipper = conn
        .query_row(
            "SELECT id, total_tipped_eth, total_tipped_usdc, tip_count, unique_creators,
                    first_tip_at, last_tip_at
             FROM tippers WHERE id = ?1",
            [id],
            |r| {
                Ok(Tipper {
                    id: r.get(0)?,
                    total_tipped_eth: u256_at(r, 1)?,
                    total_tipped_usdc: u256_at(r, 2)?,
                    tip_count: u64_at(r, 3)?,
                    unique_creators: u64_at(r, 4)?,
                    first_tip_at: opt_u64_at(r, 5)?,
                    last_tip_at: opt_u64_at(r, 6)?,
                })
            },
        )
        .optional()?;
    Ok(tipper)
}

pub fn save_tipper(conn: &Connection, t: &Tipper) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO tippers (
            id, total_tipped_eth, total_tipped_usdc, tip_count, unique_creators,
            first_tip_at, last_tip_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            total_tipped_eth  = excluded.total_tipped_eth,
            total_tipped_usdc = excluded.total_tipped_usdc,
            tip_count         = excluded.tip_count,
            unique_creators   = excluded.unique_creators,
            first_tip_at      = excluded.first_tip_at,
            last_tip_at       = excluded.last_tip_at
        "#,
        params![
            t.id,
            t.total_tipped_eth.to_string(),
            t.total_tipped_usdc.to_string(),
            t.tip_count as i64,
            t.unique_creators as i64,
            t.first_tip_at.map(|v| v as i64),
            t.last_tip_at.map(|v| v as i64),
        ],
    )?;
    Ok(())
}

// ---------- tips ----------

const TIP_COLUMNS: &str = "id, transaction_hash, block_number, timestamp, log_index, tipper, \
     creator, token, token_symbol, amount, fee, net_amount, message, usd_value";

fn tip_from_row(r: &Row) -> rusqlite::Result<Tip> {
    Ok(Tip {
        id: r.get(0)?,
        transaction_hash: r.get(1)?,
        block_number: u64_at(r, 2)?,
        timestamp: u64_at(r, 3)?,
        log_index: u64_at(r, 4)?,
        tipper: r.get(5)?,
        creator: r.get(6)?,
        token: r.get(7)?,
        token_symbol: r.get(8)?,
        amount: u256_at(r, 9)?,
        fee: u256_at(r, 10)?,
        net_amount: u256_at(r, 11)?,
        message: r.get(12)?,
        usd_value: u256_at(r, 13)?,
    })
}

pub fn tip_exists(conn: &Connection, id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tips WHERE id = ?1)",
        [id],
        |r| r.get(0),
    )?;
    Ok(exists)
}

/// Whether `tipper` has tipped `creator` before.
pub fn pair_seen(conn: &Connection, tipper: &str, creator: &str) -> Result<bool> {
    let seen: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM tips WHERE tipper = ?1 AND creator = ?2)",
        [tipper, creator],
        |r| r.get(0),
    )?;
    Ok(seen)
}

/// Which of (tipper, creator) already appear in tips for a day or month bucket.
pub fn seen_in_period(
    conn: &Connection,
    period: Period,
    period_id: &str,
    tipper: &str,
    creator: &str,
) -> Result<(bool, bool)> {
    let column = match period {
        Period::Day => "day_id",
        Period::Month => "month_id",
    };
    let sql = format!(
        "SELECT
            EXISTS(SELECT 1 FROM tips WHERE {column} = ?1 AND tipper = ?2),
            EXISTS(SELECT 1 FROM tips WHERE {column} = ?1 AND creator = ?3)"
    );
    let seen = conn.query_row(&sql, [period_id, tipper, creator], |r| {
        Ok((r.get(0)?, r.get(1)?))
    })?;
    Ok(seen)
}

pub fn insert_tip(conn: &Connection, tip: &Tip, day_id: &str, month_id: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO tips (
            id, transaction_hash, block_number, timestamp, log_index,
            tipper, creator, token, token_symbol,
            amount, fee, net_amount, message, usd_value,
            day_id, month_id
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        "#,
        params![
            tip.id,
            tip.transaction_hash,
            tip.block_number as i64,
            tip.timestamp as i64,
            tip.log_index as i64,
            tip.tipper,
            tip.creator,
            tip.token,
            tip.token_symbol,
            tip.amount.to_string(),
            tip.fee.to_string(),
            tip.net_amount.to_string(),
            tip.message,
            tip.usd_value.to_string(),
            day_id,
            month_id,
        ],
    )?;
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct TipFilter {
    pub creator: Option<String>,
    pub tipper: Option<String>,
}

/// Most recent tips first.
pub fn list_tips(conn: &Connection, filter: &TipFilter, limit: u32) -> Result<Vec<Tip>> {
    let sql = format!(
        "SELECT {TIP_COLUMNS} FROM tips
         WHERE (?1 IS NULL OR creator = ?1)
           AND (?2 IS NULL OR tipper = ?2)
         ORDER BY block_number DESC, log_index DESC
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![filter.creator, filter.tipper, limit as i64],
        tip_from_row,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Every tip in delivery order.
pub fn all_tips(conn: &Connection) -> Result<Vec<Tip>> {
    let sql = format!("SELECT {TIP_COLUMNS} FROM tips ORDER BY block_number, log_index");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], tip_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---------- withdrawals ----------

const WITHDRAWAL_COLUMNS: &str = "id, transaction_hash, block_number, timestamp, log_index, \
     creator, token, token_symbol, amount, usd_value";

fn withdrawal_from_row(r: &Row) -> rusqlite::Result<Withdrawal> {
    Ok(Withdrawal {
        id: r.get(0)?,
        transaction_hash: r.get(1)?,
        block_number: u64_at(r, 2)?,
        timestamp: u64_at(r, 3)?,
        log_index: u64_at(r, 4)?,
        creator: r.get(5)?,
        token: r.get(6)?,
        token_symbol: r.get(7)?,
        amount: u256_at(r, 8)?,
        usd_value: u256_at(r, 9)?,
    })
}

pub fn withdrawal_exists(conn: &Connection, id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM withdrawals WHERE id = ?1)",
        [id],
        |r| r.get(0),
    )?;
    Ok(exists)
}

pub fn insert_withdrawal(conn: &Connection, w: &Withdrawal) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO withdrawals (
            id, transaction_hash, block_number, timestamp, log_index,
            creator, token, token_symbol, amount, usd_value
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            w.id,
            w.transaction_hash,
            w.block_number as i64,
            w.timestamp as i64,
            w.log_index as i64,
            w.creator,
            w.token,
            w.token_symbol,
            w.amount.to_string(),
            w.usd_value.to_string(),
        ],
    )?;
    Ok(())
}

pub fn list_withdrawals(
    conn: &Connection,
    creator: Option<&str>,
    limit: u32,
) -> Result<Vec<Withdrawal>> {
    let sql = format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals
         WHERE (?1 IS NULL OR creator = ?1)
         ORDER BY block_number DESC, log_index DESC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![creator, limit as i64], withdrawal_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn all_withdrawals(conn: &Connection) -> Result<Vec<Withdrawal>> {
    let sql =
        format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals ORDER BY block_number, log_index");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], withdrawal_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---------- daily / monthly stats ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Month,
}

impl Period {
    fn table(self) -> &'static str {
        match self {
            Period::Day => "daily_stats",
            Period::Month => "monthly_stats",
        }
    }
}

const PERIOD_COLUMNS: &str = "id, period_start, total_tips_eth, total_tips_usdc, tip_count, \
     unique_tippers, unique_creators, total_usd_volume, avg_tip_usd";

fn period_from_row(r: &Row) -> rusqlite::Result<PeriodStats> {
    Ok(PeriodStats {
        id: r.get(0)?,
        period_start: u64_at(r, 1)?,
        total_tips_eth: u256_at(r, 2)?,
        total_tips_usdc: u256_at(r, 3)?,
        tip_count: u64_at(r, 4)?,
        unique_tippers: u64_at(r, 5)?,
        unique_creators: u64_at(r, 6)?,
        total_usd_volume: u256_at(r, 7)?,
        avg_tip_usd: u256_at(r, 8)?,
    })
}

pub fn load_period_stats(
    conn: &Connection,
    period: Period,
    id: &str,
) -> Result<Option<PeriodStats>> {
    let sql = format!("SELECT {PERIOD_COLUMNS} FROM {} WHERE id = ?1", period.table());
    Ok(conn.query_row(&sql, [id], period_from_row).optional()?)
}

pub fn save_period_stats(conn: &Connection, period: Period, s: &PeriodStats) -> Result<()> {
    let sql = format!(
        r#"
        INSERT INTO {} (
            id, period_start, total_tips_eth, total_tips_usdc, tip_count,
            unique_tippers, unique_creators, total_usd_volume, avg_tip_usd
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            total_tips_eth   = excluded.total_tips_eth,
            total_tips_usdc  = excluded.total_tips_usdc,
            tip_count        = excluded.tip_count,
            unique_tippers   = excluded.unique_tippers,
            unique_creators  = excluded.unique_creators,
            total_usd_volume = excluded.total_usd_volume,
            avg_tip_usd      = excluded.avg_tip_usd
        "#,
        period.table()
    );
    conn.execute(
        &sql,
        params![
            s.id,
            s.period_start as i64,
            s.total_tips_eth.to_string(),
            s.total_tips_usdc.to_string(),
            s.tip_count as i64,
            s.unique_tippers as i64,
            s.unique_creators as i64,
            s.total_usd_volume.to_string(),
            s.avg_tip_usd.to_string(),
        ],
    )?;
    Ok(())
}

/// Latest buckets first.
pub fn list_period_stats(
    conn: &Connection,
    period: Period,
    limit: u32,
) -> Result<Vec<PeriodStats>> {
    let sql = format!(
        "SELECT {PERIOD_COLUMNS} FROM {} ORDER BY id DESC LIMIT ?1",
        period.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([limit as i64], period_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ---------- platform stats ----------

pub fn load_platform_stats(conn: &Connection) -> Result<Option<PlatformStats>> {
    let stats = conn
        .query_row(
            "SELECT id, total_tips_eth, total_tips_usdc, total_tip_count, total_tippers,
                    total_creators, total_fees_eth, total_fees_usdc, total_usd_volume, last_updated
             FROM platform_stats WHERE id = ?1",
            [PLATFORM_STATS_ID],
            |r| {
                Ok(PlatformStats {
                    id: r.get(0)?,
                    total_tips_eth: u256_at(r, 1)?,
                    total_tips_usdc: u256_at(r, 2)?,
                    total_tip_count: u64_at(r, 3)?,
                    total_tippers: u64_at(r, 4)?,
                    total_creators: u64_at(r, 5)?,
                    total_fees_eth: u256_at(r, 6)?,
                    total_fees_usdc: u256_at(r, 7)?,
                    total_usd_volume: u256_at(r, 8)?,
                    last_updated: u64_at(r, 9)?,
                })
            },
        )
        .optional()?;
    Ok(stats)
}

pub fn save_platform_stats(conn: &Connection, s: &PlatformStats) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO platform_stats (
            id, total_tips_eth, total_tips_usdc, total_tip_count, total_tippers,
            total_creators, total_fees_eth, total_fees_usdc, total_usd_volume, last_updated
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            total_tips_eth   = excluded.total_tips_eth,
            total_tips_usdc  = excluded.total_tips_usdc,
            total_tip_count  = excluded.total_tip_count,
            total_tippers    = excluded.total_tippers,
            total_creators   = excluded.total_creators,
            total_fees_eth   = excluded.total_fees_eth,
            total_fees_usdc  = excluded.total_fees_usdc,
            total_usd_volume = excluded.total_usd_volume,
            last_updated     = excluded.last_updated
        "#,
        params![
            s.id,
            s.total_tips_eth.to_string(),
            s.total_tips_usdc.to_string(),
            s.total_tip_count as i64,
            s.total_tippers as i64,
            s.total_creators as i64,
            s.total_fees_eth.to_string(),
            s.total_fees_usdc.to_string(),
            s.total_usd_volume.to_string(),
            s.last_updated as i64,
        ],
    )?;
    Ok(())
}

// ---------- token stats ----------

const TOKEN_COLUMNS: &str = "id, symbol, total_tips, tip_count, total_fees, total_withdrawals, \
     last_price_usd, last_updated";

fn token_from_row(r: &Row) -> rusqlite::Result<TokenStats> {
    Ok(TokenStats {
        id: r.get(0)?,
        symbol: r.get(1)?,
        total_tips: u256_at(r, 2)?,
        tip_count: u64_at(r, 3)?,
        total_fees: u256_at(r, 4)?,
        total_withdrawals: u256_at(r, 5)?,
        last_price_usd: u256_at(r, 6)?,
        last_updated: u64_at(r, 7)?,
    })
}

pub fn load_token_stats(conn: &Connection, id: &str) -> Result<Option<TokenStats>> {
    let sql = format!("SELECT {TOKEN_COLUMNS} FROM token_stats WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], token_from_row).optional()?)
}

pub fn list_token_stats(conn: &Connection) -> Result<Vec<TokenStats>> {
    let sql = format!("SELECT {TOKEN_COLUMNS} FROM token_stats ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], token_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn save_token_stats(conn: &Connection, s: &TokenStats) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO token_stats (
            id, symbol, total_tips, tip_count, total_fees,
            total_withdrawals, last_price_usd, last_updated
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            symbol            = excluded.symbol,
            total_tips        = excluded.total_tips,
            tip_count         = excluded.tip_count,
            total_fees        = excluded.total_fees,
            total_withdrawals = excluded.total_withdrawals,
            last_price_usd    = excluded.last_price_usd,
            last_updated      = excluded.last_updated
        "#,
        params![
            s.id,
            s.symbol,
            s.total_tips.to_string(),
            s.tip_count as i64,
            s.total_fees.to_string(),
            s.total_withdrawals.to_string(),
            s.last_price_usd.to_string(),
            s.last_updated as i64,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    run_migrations(&conn).unwrap();
    conn
}
