//! Per-wallet metric tables computed from the row store.
//!
//! Every function groups rows by wallet (ascending address, original row
//! order inside a group) and is deterministic for identical input. Undefined
//! arithmetic is left as NaN or ±inf here; only [`sharpe_ratio`] clamps.

use std::collections::BTreeMap;

use common::types::TransactionRecord;

use crate::row_store::{RowStore, SchemaError, Table};

#[derive(Debug, Clone, PartialEq)]
pub struct RoiMetric {
    pub wallet_address: String,
    pub initial_investment: f64,
    pub final_portfolio_value: f64,
    pub roi: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradingFrequencyMetric {
    pub wallet_address: String,
    pub total_transactions: u64,
    pub days_active: i64,
    pub trading_frequency: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityScoreMetric {
    pub wallet_address: String,
    pub activity_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityMetric {
    pub wallet_address: String,
    pub portfolio_volatility: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LossRatioMetric {
    pub wallet_address: String,
    pub losing_trades: u64,
    pub total_trades: u64,
    pub loss_ratio: f64,
}

/// Logs and counts a schema violation. Callers return an empty table.
fn report_schema_error(metric: &'static str, table: &'static str, err: &SchemaError) {
    metrics::counter!("ranker_schema_errors_total", "metric" => metric).increment(1);
    tracing::error!(metric, table, error = %err, "metric skipped: input lacks a required column");
}

fn check<R>(metric: &'static str, table: &Table<R>, required: &[&'static str]) -> bool {
    match table.require(required) {
        Ok(()) => true,
        Err(err) => {
            report_schema_error(metric, table.name(), &err);
            false
        }
    }
}

fn group_by_wallet<'a, R>(
    rows: &'a [R],
    wallet: impl Fn(&R) -> &str,
) -> BTreeMap<&'a str, Vec<&'a R>> {
    let mut groups: BTreeMap<&'a str, Vec<&'a R>> = BTreeMap::new();
    for row in rows {
        groups.entry(wallet(row)).or_default().push(row);
    }
    groups
}

fn tx_groups(store: &RowStore) -> BTreeMap<&str, Vec<&TransactionRecord>> {
    group_by_wallet(store.transactions.rows(), |r| r.wallet_address.as_str())
}

/// ((final - initial) / initial) * 100.
///
/// `initial_investment` is the amount of the wallet's first row in input
/// order, not the earliest timestamp. Wallets missing from either table are
/// dropped (inner join). A zero initial investment yields ±inf or NaN.
pub fn compute_roi(store: &RowStore) -> Vec<RoiMetric> {
    if !check("roi", &store.transactions, &["amount"])
        || !check("roi", &store.balances, &["amount"])
    {
        return Vec::new();
    }

    let portfolio_values: BTreeMap<&str, f64> =
        group_by_wallet(store.balances.rows(), |r| r.wallet_address.as_str())
            .into_iter()
            .map(|(wallet, rows)| (wallet, rows.iter().map(|r| r.amount).sum()))
            .collect();

    tx_groups(store)
        .into_iter()
        .filter_map(|(wallet, rows)| {
            let initial_investment = rows.first()?.amount;
            let final_portfolio_value = *portfolio_values.get(wallet)?;
            Some(RoiMetric {
                wallet_address: wallet.to_string(),
                initial_investment,
                final_portfolio_value,
                roi: (final_portfolio_value - initial_investment) / initial_investment * 100.0,
            })
        })
        .collect()
}

/// Transfer-leg count, active-day span (floored at one) and legs per active day.
///
/// Trading frequency and activity score both use this today. Whether activity
/// score should diverge from trading frequency is undecided; the two columns
/// are kept separate so either definition can change on its own.
fn legs_per_active_day(rows: &[&TransactionRecord]) -> (u64, i64, f64) {
    let count = rows.len() as u64;
    let first = rows.iter().map(|r| r.timestamp).min();
    let last = rows.iter().map(|r| r.timestamp).max();
    let days_active = match (first, last) {
        (Some(first), Some(last)) => ((last - first).num_days() + 1).max(1),
        _ => 1,
    };
    #[allow(clippy::cast_precision_loss)]
    let rate = count as f64 / days_active as f64;
    (count, days_active, rate)
}

pub fn compute_trading_frequency(store: &RowStore) -> Vec<TradingFrequencyMetric> {
    if !check(
        "trading_frequency",
        &store.transactions,
        &["tx_hash", "timestamp"],
    ) {
        return Vec::new();
    }

    tx_groups(store)
        .into_iter()
        .map(|(wallet, rows)| {
            let (total_transactions, days_active, trading_frequency) = legs_per_active_day(&rows);
            TradingFrequencyMetric {
                wallet_address: wallet.to_string(),
                total_transactions,
                days_active,
                trading_frequency,
            }
        })
        .collect()
}

pub fn compute_activity_score(store: &RowStore) -> Vec<ActivityScoreMetric> {
    if !check(
        "activity_score",
        &store.transactions,
        &["tx_hash", "timestamp"],
    ) {
        return Vec::new();
    }

    tx_groups(store)
        .into_iter()
        .map(|(wallet, rows)| ActivityScoreMetric {
            wallet_address: wallet.to_string(),
            activity_score: legs_per_active_day(&rows).2,
        })
        .collect()
}

/// Sample (n-1) standard deviation; NaN below two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt()
}

/// Std dev of period-over-period fractional changes of the running balance.
///
/// NaN when there are fewer than three rows (at most one change) or when a
/// running balance used as a denominator is exactly zero.
fn running_balance_volatility(rows: &[&TransactionRecord]) -> f64 {
    if rows.len() < 2 {
        return f64::NAN;
    }
    let mut sorted = rows.to_vec();
    sorted.sort_by_key(|r| r.timestamp);

    let mut changes = Vec::with_capacity(sorted.len() - 1);
    let mut balance = 0.0;
    let mut previous: Option<f64> = None;
    for row in sorted {
        balance += row.amount;
        if let Some(prev) = previous {
            if prev == 0.0 {
                return f64::NAN;
            }
            changes.push((balance - prev) / prev);
        }
        previous = Some(balance);
    }
    sample_std_dev(&changes)
}

pub fn compute_portfolio_volatility(store: &RowStore) -> Vec<VolatilityMetric> {
    if !check(
        "portfolio_volatility",
        &store.transactions,
        &["timestamp", "amount"],
    ) {
        return Vec::new();
    }

    tx_groups(store)
        .into_iter()
        .map(|(wallet, rows)| VolatilityMetric {
            wallet_address: wallet.to_string(),
            portfolio_volatility: running_balance_volatility(&rows),
        })
        .collect()
}

/// Percentage of a wallet's rows with a negative amount.
pub fn compute_loss_ratio(store: &RowStore) -> Vec<LossRatioMetric> {
    if !check("loss_ratio", &store.transactions, &["amount"]) {
        return Vec::new();
    }

    tx_groups(store)
        .into_iter()
        .map(|(wallet, rows)| {
            let total_trades = rows.len() as u64;
            let losing_trades = rows.iter().filter(|r| r.amount < 0.0).count() as u64;
            #[allow(clippy::cast_precision_loss)]
            let loss_ratio = losing_trades as f64 / total_trades as f64 * 100.0;
            LossRatioMetric {
                wallet_address: wallet.to_string(),
                losing_trades,
                total_trades,
                loss_ratio,
            }
        })
        .collect()
}

/// ROI over volatility with a zero risk-free rate.
///
/// The one place undefined arithmetic is clamped: a missing input, zero
/// volatility, or any non-finite result yields exactly 0.
pub fn sharpe_ratio(roi: Option<f64>, portfolio_volatility: Option<f64>) -> f64 {
    const RISK_FREE_RATE: f64 = 0.0;
    match (roi, portfolio_volatility) {
        (Some(roi), Some(vol)) => {
            let ratio = (roi - RISK_FREE_RATE) / vol;
            if ratio.is_finite() {
                ratio
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{balance, tx};
    use super::*;

    #[test]
    fn test_loss_ratio_counts_negative_rows() {
        let store = RowStore::new(
            vec![tx("A", 0, 100.0), tx("A", 1, -20.0), tx("A", 2, 50.0)],
            vec![],
        );
        let loss = compute_loss_ratio(&store);
        assert_eq!(loss.len(), 1);
        assert_eq!(loss[0].losing_trades, 1);
        assert_eq!(loss[0].total_trades, 3);
        assert!((loss[0].loss_ratio - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_loss_ratio_zero_losses_is_zero_not_missing() {
        let store = RowStore::new(vec![tx("A", 0, 1.0)], vec![]);
        let loss = compute_loss_ratio(&store);
        assert_eq!(loss[0].losing_trades, 0);
        assert!(loss[0].loss_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_row_wallet() {
        let store = RowStore::new(vec![tx("B", 0, 10.0)], vec![]);

        let freq = compute_trading_frequency(&store);
        assert_eq!(freq[0].days_active, 1);
        assert_eq!(freq[0].total_transactions, 1);
        assert!((freq[0].trading_frequency - 1.0).abs() < f64::EPSILON);

        let vol = compute_portfolio_volatility(&store);
        assert!(vol[0].portfolio_volatility.is_nan());
        assert!(sharpe_ratio(Some(25.0), Some(vol[0].portfolio_volatility)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_day_activity_floors_days_active_at_one() {
        let store = RowStore::new(
            vec![tx("A", 0, 1.0), tx("A", 5, 1.0), tx("A", 23, 1.0)],
            vec![],
        );
        let freq = compute_trading_frequency(&store);
        assert_eq!(freq[0].days_active, 1);
        assert!((freq[0].trading_frequency - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_days_active_counts_whole_days_plus_one() {
        // 49 hours apart: two whole days, so three active days.
        let store = RowStore::new(
            vec![tx("A", 0, 1.0), tx("A", 49, 1.0), tx("A", 10, 1.0)],
            vec![],
        );
        let freq = compute_trading_frequency(&store);
        assert_eq!(freq[0].days_active, 3);
        assert!((freq[0].trading_frequency - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_activity_score_matches_trading_frequency_as_separate_table() {
        let store = RowStore::new(
            vec![tx("A", 0, 1.0), tx("A", 30, 1.0), tx("B", 0, 2.0)],
            vec![],
        );
        let freq = compute_trading_frequency(&store);
        let activity = compute_activity_score(&store);
        assert_eq!(freq.len(), activity.len());
        for (f, a) in freq.iter().zip(&activity) {
            assert_eq!(f.wallet_address, a.wallet_address);
            assert!((f.trading_frequency - a.activity_score).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_roi_uses_first_row_in_input_order() {
        // The later-timestamped row comes first in input order.
        let store = RowStore::new(
            vec![tx("A", 10, 200.0), tx("A", 0, 100.0)],
            vec![balance("A", 300.0), balance("A", 100.0)],
        );
        let roi = compute_roi(&store);
        assert_eq!(roi.len(), 1);
        assert!((roi[0].initial_investment - 200.0).abs() < f64::EPSILON);
        assert!((roi[0].final_portfolio_value - 400.0).abs() < f64::EPSILON);
        assert!((roi[0].roi - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_roi_inner_joins_transactions_and_balances() {
        let store = RowStore::new(
            vec![tx("A", 0, 100.0), tx("T", 0, 5.0)],
            vec![balance("A", 50.0), balance("P", 10.0)],
        );
        let roi = compute_roi(&store);
        assert_eq!(roi.len(), 1);
        assert_eq!(roi[0].wallet_address, "A");
        assert!((roi[0].roi + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_initial_investment_is_infinite_roi() {
        let store = RowStore::new(vec![tx("C", 0, 0.0)], vec![balance("C", 500.0)]);
        let roi = compute_roi(&store);
        assert!(roi[0].roi.is_infinite() && roi[0].roi > 0.0);
    }

    #[test]
    fn test_volatility_of_running_balance() {
        // Balances 100, 150, 120 -> changes +0.5, -0.2.
        let store = RowStore::new(
            vec![tx("A", 2, -30.0), tx("A", 0, 100.0), tx("A", 1, 50.0)],
            vec![],
        );
        let vol = compute_portfolio_volatility(&store);
        let expected = sample_std_dev(&[0.5, -0.2]);
        assert!((vol[0].portfolio_volatility - expected).abs() < 1e-12);
        assert!((expected - 0.494_974_746_830_583_2).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_nan_when_running_balance_hits_zero() {
        let store = RowStore::new(
            vec![
                tx("A", 0, 10.0),
                tx("A", 1, -10.0),
                tx("A", 2, 5.0),
                tx("A", 3, 5.0),
            ],
            vec![],
        );
        let vol = compute_portfolio_volatility(&store);
        assert!(vol[0].portfolio_volatility.is_nan());
    }

    #[test]
    fn test_sharpe_clamps_undefined_to_zero() {
        assert!(sharpe_ratio(Some(10.0), Some(0.0)).abs() < f64::EPSILON);
        assert!(sharpe_ratio(Some(10.0), Some(f64::NAN)).abs() < f64::EPSILON);
        assert!(sharpe_ratio(None, Some(2.0)).abs() < f64::EPSILON);
        assert!(sharpe_ratio(Some(10.0), None).abs() < f64::EPSILON);
        assert!(sharpe_ratio(Some(f64::INFINITY), Some(0.3)).abs() < f64::EPSILON);
        assert!((sharpe_ratio(Some(10.0), Some(4.0)) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_column_yields_empty_table() {
        let mut store = RowStore::new(vec![tx("A", 0, 1.0)], vec![balance("A", 1.0)]);
        store.transactions = store.transactions.without_column("timestamp");

        assert!(compute_trading_frequency(&store).is_empty());
        assert!(compute_activity_score(&store).is_empty());
        assert!(compute_portfolio_volatility(&store).is_empty());
        // Metrics that do not need timestamps still compute.
        assert_eq!(compute_loss_ratio(&store).len(), 1);
        assert_eq!(compute_roi(&store).len(), 1);
    }

    #[test]
    fn test_missing_column_counts_schema_error() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let mut store = RowStore::new(vec![tx("A", 0, 1.0)], vec![balance("A", 1.0)]);
        store.transactions = store.transactions.without_column("timestamp");

        let freq = metrics::with_local_recorder(&recorder, || compute_trading_frequency(&store));
        assert!(freq.is_empty());

        let rendered = handle.render();
        assert!(rendered.contains("ranker_schema_errors_total{metric=\"trading_frequency\"} 1"));
    }

    #[test]
    fn test_schema_error_message_names_table_and_column() {
        let store = RowStore::new(vec![tx("A", 0, 1.0)], vec![]);
        let table = store.transactions.without_column("timestamp");
        let err = table.require(&["amount", "timestamp"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{}: missing required column `timestamp`", table.name())
        );
    }

    #[test]
    fn test_groups_sorted_by_wallet() {
        let store = RowStore::new(
            vec![tx("b", 0, 1.0), tx("a", 0, 1.0), tx("c", 0, 1.0)],
            vec![],
        );
        let wallets: Vec<_> = compute_loss_ratio(&store)
            .into_iter()
            .map(|m| m.wallet_address)
            .collect();
        assert_eq!(wallets, vec!["a", "b", "c"]);
    }
}
