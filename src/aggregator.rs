// src/aggregator.rs
use std::collections::HashMap;

use alloy::primitives::{I256, U256};
use eyre::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::db;
use crate::models::address_id;

#[derive(Debug, Default)]
struct Recomputed {
    tips_eth: U256,
    tips_usdc: U256,
    withdrawn_eth: U256,
    withdrawn_usdc: U256,
    tip_count: u64,
}

/// One running counter that disagrees with the raw tip/withdrawal rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Drift {
    pub entity: String,
    pub field: &'static str,
    pub stored: String,
    pub recomputed: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub creators_checked: usize,
    pub tips_seen: u64,
    pub drifts: Vec<Drift>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// `tips - withdrawn` as a signed balance, or `None` when it cannot be one.
fn net_balance(tips: U256, withdrawn: U256) -> Option<I256> {
    let tips = I256::try_from(tips).ok()?;
    let withdrawn = I256::try_from(withdrawn).ok()?;
    tips.checked_sub(withdrawn)
}

fn balance_text(balance: Option<I256>) -> String {
    balance.map_or_else(|| "out of range".to_string(), |b| b.to_string())
}

fn check<T: PartialEq + ToString>(
    drifts: &mut Vec<Drift>,
    entity: &str,
    field: &'static str,
    stored: T,
    recomputed: T,
) {
    if stored != recomputed {
        drifts.push(Drift {
            entity: entity.to_string(),
            field,
            stored: stored.to_string(),
            recomputed: recomputed.to_string(),
        });
    }
}

/// Rebuild creator and platform totals from the stored tips and withdrawals
/// and compare them with the incrementally maintained aggregates.
pub fn check_consistency(conn: &Connection) -> Result<ConsistencyReport> {
    let native = address_id(&alloy::primitives::Address::ZERO);
    let mut per_creator: HashMap<String, Recomputed> = HashMap::new();
    let mut tips_seen = 0u64;

    for tip in db::all_tips(conn)? {
        let entry = per_creator.entry(tip.creator).or_default();
        if tip.token == native {
            entry.tips_eth = entry.tips_eth.saturating_add(tip.amount);
        } else {
            entry.tips_usdc = entry.tips_usdc.saturating_add(tip.amount);
        }
        entry.tip_count += 1;
        tips_seen += 1;
    }

    for w in db::all_withdrawals(conn)? {
        let entry = per_creator.entry(w.creator).or_default();
        if w.token == native {
            entry.withdrawn_eth = entry.withdrawn_eth.saturating_add(w.amount);
        } else {
            entry.withdrawn_usdc = entry.withdrawn_usdc.saturating_add(w.amount);
        }
    }

    let mut drifts = Vec::new();
    let creators = db::list_creators(conn)?;
    for creator in &creators {
        let expected = per_creator.remove(&creator.id).unwrap_or_default();
        let id = creator.id.as_str();

        check(&mut drifts, id, "totalTipsEth", creator.total_tips_eth, expected.tips_eth);
        check(&mut drifts, id, "totalTipsUsdc", creator.total_tips_usdc, expected.tips_usdc);
        check(&mut drifts, id, "withdrawnEth", creator.withdrawn_eth, expected.withdrawn_eth);
        check(&mut drifts, id, "withdrawnUsdc", creator.withdrawn_usdc, expected.withdrawn_usdc);
        check(&mut drifts, id, "tipCount", creator.tip_count, expected.tip_count);
        check(
            &mut drifts,
            id,
            "balanceEth",
            creator.balance_eth.to_string(),
            balance_text(net_balance(expected.tips_eth, expected.withdrawn_eth)),
        );
        check(
            &mut drifts,
            id,
            "balanceUsdc",
            creator.balance_usdc.to_string(),
            balance_text(net_balance(expected.tips_usdc, expected.withdrawn_usdc)),
        );
    }

    // rows that reference a creator the aggregates never saved
    for orphan in per_creator.keys() {
        check(&mut drifts, orphan, "exists", "false", "true");
    }

    let platform = db::load_platform_stats(conn)?.unwrap_or_default();
    check(
        &mut drifts,
        &platform.id,
        "totalTipCount",
        platform.total_tip_count,
        tips_seen,
    );
    check(
        &mut drifts,
        &platform.id,
        "totalCreators",
        platform.total_creators,
        creators.len() as u64,
    );

    let report = ConsistencyReport {
        creators_checked: creators.len(),
        tips_seen,
        drifts,
    };

    if report.is_consistent() {
        info!(
            "💾 Aggregates consistent: {} creators, {} tips",
            report.creators_checked, report.tips_seen
        );
    } else {
        for d in &report.drifts {
            warn!(
                "Aggregate drift on {}.{}: stored {} vs recomputed {}",
                d.entity, d.field, d.stored, d.recomputed
            );
        }
    }

    Ok(report)
}
