// src/mapping.rs
//! Folds TipJar events into the aggregate entities.
//!
//! Every handler follows the same shape: load or lazily create each affected
//! entity, add the event's deltas, save. The indexer runs a whole batch of
//! handlers inside one SQLite transaction, so a failure part-way through a
//! block range leaves no partial aggregates behind.
use alloy::primitives::{Address, I256, U256};
use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::{self, Period};
use crate::models::{
    address_id, Creator, PeriodStats, PlatformStats, Tip, Tipper, TokenStats, Withdrawal,
};
use crate::parser::{CreatorWithdrawal, DecodedLog, EventMeta, TipJarEvent, TipSent};

pub const ETH_DECIMALS: u8 = 18;
pub const USDC_DECIMALS: u8 = 6;
pub const USD_DECIMALS: u8 = 6;

/// Placeholder ETH price used for `usdValue` until an oracle feeds the mapping.
pub const PLACEHOLDER_ETH_USD: u64 = 2000;

const SECONDS_PER_DAY: u64 = 86_400;

fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

pub fn is_native(token: &Address) -> bool {
    token.is_zero()
}

pub fn token_symbol(token: &Address) -> &'static str {
    if is_native(token) {
        "ETH"
    } else {
        "USDC"
    }
}

/// ETH: whole dollars at the placeholder price, floored. Anything else is treated
/// as USDC and returned unchanged, since USDC and USD share six decimals.
pub fn estimate_usd_value(amount: U256, token: &Address) -> U256 {
    if is_native(token) {
        // split on the wei boundary so `amount * price` never has to fit in 256 bits
        let unit = pow10(ETH_DECIMALS);
        let price = U256::from(PLACEHOLDER_ETH_USD);
        (amount / unit) * price + (amount % unit) * price / unit
    } else {
        amount / pow10(USDC_DECIMALS - USD_DECIMALS)
    }
}

fn utc(timestamp: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_default()
}

pub fn day_start(timestamp: u64) -> u64 {
    timestamp / SECONDS_PER_DAY * SECONDS_PER_DAY
}

/// `YYYY-MM-DD` (UTC)
pub fn day_id(timestamp: u64) -> String {
    utc(day_start(timestamp)).format("%Y-%m-%d").to_string()
}

/// `YYYY-MM` (UTC)
pub fn month_id(timestamp: u64) -> String {
    utc(timestamp).format("%Y-%m").to_string()
}

fn signed(amount: U256) -> Result<I256> {
    I256::try_from(amount)
        .map_err(|_| eyre!("amount {} exceeds the signed balance range", amount))
}

fn credit(balance: I256, amount: U256) -> Result<I256> {
    balance
        .checked_add(signed(amount)?)
        .ok_or_else(|| eyre!("balance overflow crediting {}", amount))
}

fn debit(balance: I256, amount: U256) -> Result<I256> {
    balance
        .checked_sub(signed(amount)?)
        .ok_or_else(|| eyre!("balance overflow debiting {}", amount))
}

fn accumulate(total: U256, amount: U256) -> Result<U256> {
    total
        .checked_add(amount)
        .ok_or_else(|| eyre!("creator total overflow adding {}", amount))
}

fn get_or_create_creator(
    conn: &Connection,
    address: &Address,
    platform: &mut PlatformStats,
) -> Result<Creator> {
    let id = address_id(address);
    match db::load_creator(conn, &id)? {
        Some(creator) => Ok(creator),
        None => {
            platform.total_creators += 1;
            debug!("New creator {}", id);
            Ok(Creator::new(id))
        }
    }
}

fn get_or_create_tipper(
    conn: &Connection,
    address: &Address,
    platform: &mut PlatformStats,
) -> Result<Tipper> {
    let id = address_id(address);
    match db::load_tipper(conn, &id)? {
        Some(tipper) => Ok(tipper),
        None => {
            platform.total_tippers += 1;
            debug!("New tipper {}", id);
            Ok(Tipper::new(id))
        }
    }
}

fn get_or_create_platform_stats(conn: &Connection) -> Result<PlatformStats> {
    Ok(db::load_platform_stats(conn)?.unwrap_or_default())
}

fn get_or_create_token_stats(conn: &Connection, token: &Address) -> Result<TokenStats> {
    let id = address_id(token);
    Ok(db::load_token_stats(conn, &id)?
        .unwrap_or_else(|| TokenStats::new(id, token_symbol(token))))
}

fn get_or_create_period_stats(
    conn: &Connection,
    period: Period,
    timestamp: u64,
) -> Result<PeriodStats> {
    let (id, start) = match period {
        Period::Day => (day_id(timestamp), day_start(timestamp)),
        Period::Month => (month_id(timestamp), timestamp),
    };
    Ok(db::load_period_stats(conn, period, &id)?
        .unwrap_or_else(|| PeriodStats::new(id, start)))
}

fn add_tip_to_period(
    conn: &Connection,
    period: Period,
    event: &TipSent,
    usd_value: U256,
    tipper_id: &str,
    creator_id: &str,
) -> Result<PeriodStats> {
    let mut stats = get_or_create_period_stats(conn, period, event.timestamp)?;
    let (tipper_seen, creator_seen) =
        db::seen_in_period(conn, period, &stats.id, tipper_id, creator_id)?;

    if is_native(&event.token) {
        stats.total_tips_eth = stats.total_tips_eth.saturating_add(event.amount);
    } else {
        stats.total_tips_usdc = stats.total_tips_usdc.saturating_add(event.amount);
    }
    stats.tip_count += 1;
    if !tipper_seen {
        stats.unique_tippers += 1;
    }
    if !creator_seen {
        stats.unique_creators += 1;
    }
    stats.total_usd_volume = stats.total_usd_volume.saturating_add(usd_value);
    stats.avg_tip_usd = stats.total_usd_volume / U256::from(stats.tip_count);
    Ok(stats)
}

/// Apply a `TipSent`. Returns `false` when the tip was already indexed.
pub fn handle_tip_sent(conn: &Connection, meta: &EventMeta, event: &TipSent) -> Result<bool> {
    let tip_id = meta.entity_id();
    if db::tip_exists(conn, &tip_id)? {
        debug!("Tip {} already indexed, skipping", tip_id);
        return Ok(false);
    }

    let native = is_native(&event.token);
    let usd_value = estimate_usd_value(event.amount, &event.token);

    let mut platform = get_or_create_platform_stats(conn)?;
    let mut tipper = get_or_create_tipper(conn, &event.tipper, &mut platform)?;
    let mut creator = get_or_create_creator(conn, &event.creator, &mut platform)?;

    let tip = Tip {
        id: tip_id,
        transaction_hash: meta.tx_hash.clone(),
        block_number: meta.block_number,
        timestamp: event.timestamp,
        log_index: meta.log_index,
        tipper: tipper.id.clone(),
        creator: creator.id.clone(),
        token: address_id(&event.token),
        token_symbol: token_symbol(&event.token).to_string(),
        amount: event.amount,
        fee: event.fee,
        net_amount: event.amount,
        message: event.message.clone(),
        usd_value,
    };

    // uniqueness is judged against tips stored before this one
    if !db::pair_seen(conn, &tipper.id, &creator.id)? {
        tipper.unique_creators += 1;
        creator.unique_tippers += 1;
    }
    let daily = add_tip_to_period(conn, Period::Day, event, usd_value, &tipper.id, &creator.id)?;
    let monthly =
        add_tip_to_period(conn, Period::Month, event, usd_value, &tipper.id, &creator.id)?;

    if native {
        tipper.total_tipped_eth = tipper.total_tipped_eth.saturating_add(event.amount);
    } else {
        tipper.total_tipped_usdc = tipper.total_tipped_usdc.saturating_add(event.amount);
    }
    tipper.tip_count += 1;
    tipper.first_tip_at.get_or_insert(event.timestamp);
    tipper.last_tip_at = Some(event.timestamp);

    if native {
        creator.total_tips_eth = accumulate(creator.total_tips_eth, event.amount)?;
        creator.balance_eth = credit(creator.balance_eth, event.amount)?;
    } else {
        creator.total_tips_usdc = accumulate(creator.total_tips_usdc, event.amount)?;
        creator.balance_usdc = credit(creator.balance_usdc, event.amount)?;
    }
    creator.tip_count += 1;
    creator.first_tip_at.get_or_insert(event.timestamp);
    creator.last_tip_at = Some(event.timestamp);

    let mut token_stats = get_or_create_token_stats(conn, &event.token)?;
    token_stats.total_tips = token_stats.total_tips.saturating_add(event.amount);
    token_stats.tip_count += 1;
    token_stats.total_fees = token_stats.total_fees.saturating_add(event.fee);
    token_stats.last_updated = event.timestamp;

    if native {
        platform.total_tips_eth = platform.total_tips_eth.saturating_add(event.amount);
        platform.total_fees_eth = platform.total_fees_eth.saturating_add(event.fee);
    } else {
        platform.total_tips_usdc = platform.total_tips_usdc.saturating_add(event.amount);
        platform.total_fees_usdc = platform.total_fees_usdc.saturating_add(event.fee);
    }
    platform.total_tip_count += 1;
    platform.total_usd_volume = platform.total_usd_volume.saturating_add(usd_value);
    platform.last_updated = event.timestamp;

    db::save_tipper(conn, &tipper)?;
    db::save_creator(conn, &creator)?;
    db::insert_tip(conn, &tip, &daily.id, &monthly.id)?;
    db::save_token_stats(conn, &token_stats)?;
    db::save_period_stats(conn, Period::Day, &daily)?;
    db::save_period_stats(conn, Period::Month, &monthly)?;
    db::save_platform_stats(conn, &platform)?;

    info!(
        "💸 Tip processed: {} {} from {} to {}",
        tip.amount, tip.token_symbol, tip.tipper, tip.creator
    );
    Ok(true)
}

/// Apply a `CreatorWithdrawal`. Returns `false` when it was already indexed.
pub fn handle_creator_withdrawal(
    conn: &Connection,
    meta: &EventMeta,
    event: &CreatorWithdrawal,
) -> Result<bool> {
    let withdrawal_id = meta.entity_id();
    if db::withdrawal_exists(conn, &withdrawal_id)? {
        debug!("Withdrawal {} already indexed, skipping", withdrawal_id);
        return Ok(false);
    }

    let mut platform = get_or_create_platform_stats(conn)?;
    let creators_before = platform.total_creators;
    let mut creator = get_or_create_creator(conn, &event.creator, &mut platform)?;

    let withdrawal = Withdrawal {
        id: withdrawal_id,
        transaction_hash: meta.tx_hash.clone(),
        block_number: meta.block_number,
        timestamp: event.timestamp,
        log_index: meta.log_index,
        creator: creator.id.clone(),
        token: address_id(&event.token),
        token_symbol: token_symbol(&event.token).to_string(),
        amount: event.amount,
        usd_value: estimate_usd_value(event.amount, &event.token),
    };

    if is_native(&event.token) {
        creator.balance_eth = debit(creator.balance_eth, event.amount)?;
        creator.withdrawn_eth = accumulate(creator.withdrawn_eth, event.amount)?;
    } else {
        creator.balance_usdc = debit(creator.balance_usdc, event.amount)?;
        creator.withdrawn_usdc = accumulate(creator.withdrawn_usdc, event.amount)?;
    }

    let mut token_stats = get_or_create_token_stats(conn, &event.token)?;
    token_stats.total_withdrawals = token_stats.total_withdrawals.saturating_add(event.amount);
    token_stats.last_updated = event.timestamp;

    db::save_creator(conn, &creator)?;
    db::insert_withdrawal(conn, &withdrawal)?;
    db::save_token_stats(conn, &token_stats)?;
    if platform.total_creators != creators_before {
        db::save_platform_stats(conn, &platform)?;
    }

    info!(
        "🏧 Withdrawal processed: {} {} by {}",
        withdrawal.amount, withdrawal.token_symbol, withdrawal.creator
    );
    Ok(true)
}

pub fn handle_token_added(conn: &Connection, token: &Address, timestamp: u64) -> Result<()> {
    let mut stats = get_or_create_token_stats(conn, token)?;
    stats.last_updated = timestamp;
    db::save_token_stats(conn, &stats)?;
    info!("Token added: {}", stats.id);
    Ok(())
}

/// Route a decoded log to its handler. Returns whether any entity changed.
pub fn apply(conn: &Connection, log: &DecodedLog, block_timestamp: u64) -> Result<bool> {
    match &log.event {
        TipJarEvent::TipSent(tip) => handle_tip_sent(conn, &log.meta, tip),
        TipJarEvent::CreatorWithdrawal(w) => handle_creator_withdrawal(conn, &log.meta, w),
        TipJarEvent::TokenAdded {
            token,
            min_tip_amount,
        } => {
            debug!("Token {:#x} min tip {}", token, min_tip_amount);
            handle_token_added(conn, token, block_timestamp)?;
            Ok(true)
        }
        TipJarEvent::TokenRemoved { token } => {
            info!("Token removed: {:#x}", token);
            Ok(false)
        }
        TipJarEvent::PlatformFeeUpdated { old_fee, new_fee } => {
            info!("Platform fee updated: {} -> {}", old_fee, new_fee);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory;
    use alloy::primitives::{address, U512};

    const A: Address = address!("000000000000000000000000000000000000000a");
    const B: Address = address!("000000000000000000000000000000000000000b");
    const C: Address = address!("000000000000000000000000000000000000000c");
    const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

    const T: u64 = 1_700_000_000; // 2023-11-14T22:13:20Z

    fn eth(n: u64) -> U256 {
        U256::from(n) * pow10(18)
    }

    fn meta(n: u64) -> EventMeta {
        EventMeta {
            tx_hash: format!("0x{:064x}", n),
            block_number: n,
            log_index: 0,
        }
    }

    fn tip(tipper: Address, creator: Address, token: Address, amount: U256, ts: u64) -> TipSent {
        TipSent {
            tipper,
            creator,
            token,
            amount,
            fee: U256::ZERO,
            message: String::new(),
            timestamp: ts,
        }
    }

    fn creator(conn: &Connection, addr: &Address) -> Creator {
        db::load_creator(conn, &address_id(addr)).unwrap().unwrap()
    }

    fn platform(conn: &Connection) -> PlatformStats {
        db::load_platform_stats(conn).unwrap().unwrap()
    }

    #[test]
    fn usd_estimate_is_pure() {
        assert_eq!(estimate_usd_value(eth(1), &Address::ZERO), U256::from(2000u64));
        assert_eq!(
            estimate_usd_value(U256::from(5u64) * pow10(17), &Address::ZERO),
            U256::from(1000u64)
        );
        assert_eq!(estimate_usd_value(U256::from(123u64), &Address::ZERO), U256::ZERO);
        assert_eq!(
            estimate_usd_value(U256::from(1_500_000u64), &USDC),
            U256::from(1_500_000u64)
        );
    }

    #[test]
    fn bucket_ids() {
        assert_eq!(day_id(T), "2023-11-14");
        assert_eq!(day_start(T), 1_699_920_000);
        assert_eq!(month_id(T), "2023-11");
        assert_eq!(day_id(0), "1970-01-01");
        assert_eq!(token_symbol(&Address::ZERO), "ETH");
        assert_eq!(token_symbol(&USDC), "USDC");
    }

    #[test]
    fn tip_then_withdrawal_scenario() {
        let conn = memory();
        let mut sent = tip(A, B, Address::ZERO, eth(1), T);
        sent.message = "hi".to_string();
        assert!(handle_tip_sent(&conn, &meta(1), &sent).unwrap());

        let w = CreatorWithdrawal {
            creator: B,
            token: Address::ZERO,
            amount: U256::from(5u64) * pow10(17),
            timestamp: T + 1,
        };
        assert!(handle_creator_withdrawal(&conn, &meta(2), &w).unwrap());

        let b = creator(&conn, &B);
        assert_eq!(b.balance_eth, signed(U256::from(5u64) * pow10(17)).unwrap());
        assert_eq!(b.withdrawn_eth, U256::from(5u64) * pow10(17));
        assert_eq!(b.tip_count, 1);
        assert_eq!(b.first_tip_at, Some(T));

        let p = platform(&conn);
        assert_eq!(p.total_tip_count, 1);
        assert_eq!(p.total_creators, 1);
        assert_eq!(p.total_tippers, 1);
        assert_eq!(p.total_usd_volume, U256::from(2000u64));

        let tips = db::list_tips(&conn, &db::TipFilter::default(), 10).unwrap();
        assert_eq!(tips.len(), 1);
        assert_eq!(tips[0].message, "hi");
        assert_eq!(tips[0].net_amount, eth(1));

        let token = db::load_token_stats(&conn, &address_id(&Address::ZERO))
            .unwrap()
            .unwrap();
        assert_eq!(token.symbol, "ETH");
        assert_eq!(token.total_withdrawals, U256::from(5u64) * pow10(17));
        assert_eq!(token.last_updated, T + 1);
    }

    #[test]
    fn replayed_events_do_not_double_count() {
        let conn = memory();
        let sent = tip(A, B, USDC, U256::from(1_000_000u64), T);
        assert!(handle_tip_sent(&conn, &meta(1), &sent).unwrap());
        assert!(!handle_tip_sent(&conn, &meta(1), &sent).unwrap());

        let w = CreatorWithdrawal {
            creator: B,
            token: USDC,
            amount: U256::from(1u64),
            timestamp: T,
        };
        assert!(handle_creator_withdrawal(&conn, &meta(2), &w).unwrap());
        assert!(!handle_creator_withdrawal(&conn, &meta(2), &w).unwrap());

        assert_eq!(
            creator(&conn, &B).balance_usdc,
            signed(U256::from(999_999u64)).unwrap()
        );
        assert_eq!(platform(&conn).total_tip_count, 1);
    }

    #[test]
    fn withdrawal_for_unknown_creator_goes_negative() {
        let conn = memory();
        let w = CreatorWithdrawal {
            creator: C,
            token: Address::ZERO,
            amount: U256::from(7u64),
            timestamp: T,
        };
        handle_creator_withdrawal(&conn, &meta(1), &w).unwrap();

        let c = creator(&conn, &C);
        assert!(c.balance_eth.is_negative());
        assert_eq!(c.tip_count, 0);
        assert_eq!(c.first_tip_at, None);
        assert_eq!(platform(&conn).total_creators, 1);
        assert_eq!(platform(&conn).total_tip_count, 0);
    }

    #[test]
    fn first_and_last_tip_follow_arrival_order() {
        let conn = memory();
        handle_tip_sent(&conn, &meta(1), &tip(A, B, Address::ZERO, eth(1), T + 100)).unwrap();
        handle_tip_sent(&conn, &meta(2), &tip(A, B, Address::ZERO, eth(1), T)).unwrap();

        let b = creator(&conn, &B);
        assert_eq!(b.first_tip_at, Some(T + 100));
        assert_eq!(b.last_tip_at, Some(T));
    }

    #[test]
    fn unique_counters_track_pairs_and_buckets() {
        let conn = memory();
        handle_tip_sent(&conn, &meta(1), &tip(A, B, Address::ZERO, eth(1), T)).unwrap();
        handle_tip_sent(&conn, &meta(2), &tip(A, B, Address::ZERO, eth(1), T + 10)).unwrap();
        handle_tip_sent(&conn, &meta(3), &tip(C, B, USDC, U256::from(3_000_000u64), T + 20))
            .unwrap();
        handle_tip_sent(&conn, &meta(4), &tip(A, C, USDC, U256::from(1_000_000u64), T + 30))
            .unwrap();
        // next day, same month
        handle_tip_sent(
            &conn,
            &meta(5),
            &tip(A, B, Address::ZERO, eth(2), T + SECONDS_PER_DAY),
        )
        .unwrap();

        let b = creator(&conn, &B);
        assert_eq!(b.unique_tippers, 2);
        assert_eq!(b.tip_count, 4);

        let a = db::load_tipper(&conn, &address_id(&A)).unwrap().unwrap();
        assert_eq!(a.unique_creators, 2);
        assert_eq!(a.tip_count, 4);
        assert_eq!(a.total_tipped_eth, eth(4));
        assert_eq!(a.total_tipped_usdc, U256::from(1_000_000u64));

        let day = db::load_period_stats(&conn, Period::Day, &day_id(T)).unwrap().unwrap();
        assert_eq!(day.tip_count, 4);
        assert_eq!(day.unique_tippers, 2);
        assert_eq!(day.unique_creators, 2);
        assert_eq!(day.period_start, day_start(T));
        assert_eq!(day.total_usd_volume, U256::from(2000u64 + 2000 + 3_000_000 + 1_000_000));
        assert_eq!(day.avg_tip_usd, day.total_usd_volume / U256::from(4u64));

        let next = db::load_period_stats(&conn, Period::Day, &day_id(T + SECONDS_PER_DAY))
            .unwrap()
            .unwrap();
        assert_eq!(next.tip_count, 1);
        assert_eq!(next.unique_tippers, 1);

        let month = db::load_period_stats(&conn, Period::Month, &month_id(T))
            .unwrap()
            .unwrap();
        assert_eq!(month.tip_count, 5);
        assert_eq!(month.unique_tippers, 2);
        assert_eq!(month.unique_creators, 2);
        assert_eq!(month.period_start, T);

        let p = platform(&conn);
        assert_eq!(p.total_tippers, 2);
        assert_eq!(p.total_creators, 2);
    }

    #[test]
    fn fees_are_tracked_per_token() {
        let conn = memory();
        let mut sent = tip(A, B, USDC, U256::from(10_000_000u64), T);
        sent.fee = U256::from(250_000u64);
        handle_tip_sent(&conn, &meta(1), &sent).unwrap();

        let p = platform(&conn);
        assert_eq!(p.total_fees_usdc, U256::from(250_000u64));
        assert_eq!(p.total_fees_eth, U256::ZERO);

        let token = db::load_token_stats(&conn, &address_id(&USDC)).unwrap().unwrap();
        assert_eq!(token.total_fees, U256::from(250_000u64));
        assert_eq!(token.symbol, "USDC");
    }

    #[test]
    fn usd_estimate_is_exact_for_huge_amounts() {
        // the old `amount * 2000` product overflowed well below this
        let amount = U256::MAX / U256::from(1000u64);
        let wide = U512::from(amount) * U512::from(PLACEHOLDER_ETH_USD) / U512::from(pow10(18));
        assert_eq!(U512::from(estimate_usd_value(amount, &Address::ZERO)), wide);

        let amount = U256::MAX;
        let wide = U512::from(amount) * U512::from(PLACEHOLDER_ETH_USD) / U512::from(pow10(18));
        assert_eq!(U512::from(estimate_usd_value(amount, &Address::ZERO)), wide);
        assert_eq!(
            estimate_usd_value(eth(1) + U256::from(499_999_999_999_999u64), &Address::ZERO),
            U256::from(2000u64)
        );
    }

    #[test]
    fn tip_beyond_signed_range_is_rejected_without_writes() {
        let conn = memory();
        let huge = U256::from(1u64) << 255;
        let err = handle_tip_sent(&conn, &meta(1), &tip(A, B, Address::ZERO, huge, T)).unwrap_err();
        assert!(err.to_string().contains("signed balance range"));

        assert!(db::load_creator(&conn, &address_id(&B)).unwrap().is_none());
        assert!(db::load_platform_stats(&conn).unwrap().is_none());
        assert!(!db::tip_exists(&conn, &meta(1).entity_id()).unwrap());

        // the largest representable tip still lands
        let max = I256::MAX.into_raw();
        assert!(handle_tip_sent(&conn, &meta(2), &tip(A, B, Address::ZERO, max, T)).unwrap());
        assert_eq!(creator(&conn, &B).balance_eth, I256::MAX);

        // one more wei would push the balance past the range
        let err = handle_tip_sent(&conn, &meta(3), &tip(A, B, Address::ZERO, U256::from(1u64), T))
            .unwrap_err();
        assert!(err.to_string().contains("balance overflow"));
        assert_eq!(creator(&conn, &B).balance_eth, I256::MAX);
        assert_eq!(creator(&conn, &B).tip_count, 1);
    }

    #[test]
    fn withdrawal_can_reach_the_signed_minimum() {
        let conn = memory();
        let half = I256::MAX.into_raw();
        let w = |amount| CreatorWithdrawal {
            creator: C,
            token: USDC,
            amount,
            timestamp: T,
        };
        handle_creator_withdrawal(&conn, &meta(1), &w(half)).unwrap();
        handle_creator_withdrawal(&conn, &meta(2), &w(U256::from(1u64))).unwrap();
        assert_eq!(creator(&conn, &C).balance_usdc, I256::MIN);

        assert!(handle_creator_withdrawal(&conn, &meta(3), &w(U256::from(1u64))).is_err());
        assert_eq!(creator(&conn, &C).balance_usdc, I256::MIN);
        assert!(!db::withdrawal_exists(&conn, &meta(3).entity_id()).unwrap());
    }

    #[test]
    fn tip_timestamps_come_from_the_event() {
        let conn = memory();
        handle_tip_sent(&conn, &meta(1), &tip(A, B, USDC, U256::from(1u64), T + 5)).unwrap();
        let tips = db::list_tips(&conn, &db::TipFilter::default(), 1).unwrap();
        assert_eq!(tips[0].timestamp, T + 5);
        assert_eq!(platform(&conn).last_updated, T + 5);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        #[derive(Debug, Clone)]
        enum Step {
            Tip { from: usize, to: usize, token: usize, amount: U256 },
            Withdraw { who: usize, token: usize, amount: U256 },
        }

        fn amount() -> impl Strategy<Value = U256> {
            let half = I256::MAX.into_raw();
            prop_oneof![
                6 => (1u64..1_000_000).prop_map(|n| U256::from(n)),
                2 => any::<u64>().prop_map(|n| U256::from(n) * pow10(18)),
                1 => (0u64..4).prop_map(move |d| half - U256::from(d)),
                1 => (0u64..4).prop_map(|d| U256::MAX - U256::from(d)),
            ]
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                2 => (0..3usize, 0..3usize, 0..2usize, amount())
                    .prop_map(|(from, to, token, amount)| Step::Tip { from, to, token, amount }),
                1 => (0..3usize, 0..2usize, amount())
                    .prop_map(|(who, token, amount)| Step::Withdraw { who, token, amount }),
            ]
        }

        /// `tipped - withdrawn` as an I256, if it fits.
        fn expected_balance(tipped: U512, withdrawn: U512) -> Option<I256> {
            let max = U512::from(I256::MAX.into_raw());
            if tipped >= withdrawn {
                let diff = tipped - withdrawn;
                (diff <= max).then(|| I256::from_raw(U256::from(diff)))
            } else {
                let diff = withdrawn - tipped;
                (diff <= max + U512::from(1u64))
                    .then(|| I256::ZERO.wrapping_sub(I256::from_raw(U256::from(diff))))
            }
        }

        fn accepts(total: U512, tipped: U512, withdrawn: U512, amount: U256) -> bool {
            amount <= I256::MAX.into_raw()
                && total <= U512::from(U256::MAX)
                && expected_balance(tipped, withdrawn).is_some()
        }

        proptest! {
            #[test]
            fn prop_balances_track_tips_minus_withdrawals(
                steps in prop::collection::vec(step(), 1..40)
            ) {
                let parties = [A, B, C];
                let tokens = [Address::ZERO, USDC];
                let conn = memory();
                let mut tipped: HashMap<(usize, usize), U512> = HashMap::new();
                let mut withdrawn: HashMap<(usize, usize), U512> = HashMap::new();
                let mut tip_events = 0u64;

                for (n, step) in steps.iter().enumerate() {
                    let n = n as u64;
                    let ts = T + n * 3_600;
                    match *step {
                        Step::Tip { from, to, token, amount } => {
                            let key = (to, token);
                            let t = tipped.get(&key).copied().unwrap_or_default()
                                + U512::from(amount);
                            let w = withdrawn.get(&key).copied().unwrap_or_default();
                            let sent = tip(parties[from], parties[to], tokens[token], amount, ts);
                            let result = handle_tip_sent(&conn, &meta(n), &sent);
                            prop_assert_eq!(result.is_ok(), accepts(t, t, w, amount));
                            if result.is_ok() {
                                tipped.insert(key, t);
                                tip_events += 1;
                            }
                        }
                        Step::Withdraw { who, token, amount } => {
                            let key = (who, token);
                            let t = tipped.get(&key).copied().unwrap_or_default();
                            let w = withdrawn.get(&key).copied().unwrap_or_default()
                                + U512::from(amount);
                            let out = CreatorWithdrawal {
                                creator: parties[who],
                                token: tokens[token],
                                amount,
                                timestamp: ts,
                            };
                            let result = handle_creator_withdrawal(&conn, &meta(n), &out);
                            prop_assert_eq!(result.is_ok(), accepts(w, t, w, amount));
                            if result.is_ok() {
                                withdrawn.insert(key, w);
                            }
                        }
                    }
                }

                let creators = db::list_creators(&conn).unwrap();
                for (i, party) in parties.iter().enumerate() {
                    let Some(c) = creators.iter().find(|c| c.id == address_id(party)) else {
                        continue;
                    };
                    for token in 0..2 {
                        let t = tipped.get(&(i, token)).copied().unwrap_or_default();
                        let w = withdrawn.get(&(i, token)).copied().unwrap_or_default();
                        let (balance, total, out) = if token == 0 {
                            (c.balance_eth, c.total_tips_eth, c.withdrawn_eth)
                        } else {
                            (c.balance_usdc, c.total_tips_usdc, c.withdrawn_usdc)
                        };
                        prop_assert_eq!(U512::from(total), t);
                        prop_assert_eq!(U512::from(out), w);
                        prop_assert_eq!(Some(balance), expected_balance(t, w));
                    }
                }

                let p = platform_or_default(&conn);
                prop_assert_eq!(p.total_tip_count, tip_events);
                prop_assert_eq!(
                    p.total_tip_count,
                    creators.iter().map(|c| c.tip_count).sum::<u64>()
                );
            }
        }
    }

    fn platform_or_default(conn: &Connection) -> PlatformStats {
        db::load_platform_stats(conn).unwrap().unwrap_or_default()
    }
}
