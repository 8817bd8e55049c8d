use std::collections::BTreeMap;

use crate::metric_engine::{
    self, ActivityScoreMetric, LossRatioMetric, RoiMetric, TradingFrequencyMetric,
    VolatilityMetric,
};
use crate::row_store::RowStore;

pub const FEATURE_COUNT: usize = 10;

/// Numeric columns of the wide table, in output order.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "total_transactions",
    "days_active",
    "trading_frequency",
    "initial_investment",
    "final_portfolio_value",
    "roi",
    "activity_score",
    "portfolio_volatility",
    "loss_ratio",
    "sharpe_ratio",
];

/// One wallet of the wide feature table.
///
/// `None` means the wallet was absent from the metric table that supplies
/// the column. `Some(NaN)` / `Some(±inf)` are values the metric itself
/// produced. `sharpe_ratio` is always defined.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletFeatureRow {
    pub wallet_address: String,
    pub total_transactions: Option<u64>,
    pub days_active: Option<i64>,
    pub trading_frequency: Option<f64>,
    pub initial_investment: Option<f64>,
    pub final_portfolio_value: Option<f64>,
    pub roi: Option<f64>,
    pub activity_score: Option<f64>,
    pub portfolio_volatility: Option<f64>,
    pub loss_ratio: Option<f64>,
    pub sharpe_ratio: f64,
}

impl WalletFeatureRow {
    fn empty(wallet_address: &str) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            total_transactions: None,
            days_active: None,
            trading_frequency: None,
            initial_investment: None,
            final_portfolio_value: None,
            roi: None,
            activity_score: None,
            portfolio_volatility: None,
            loss_ratio: None,
            sharpe_ratio: 0.0,
        }
    }

    /// Values in [`FEATURE_COLUMNS`] order.
    #[allow(clippy::cast_precision_loss)]
    pub fn feature_values(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.total_transactions.map(|v| v as f64),
            self.days_active.map(|v| v as f64),
            self.trading_frequency,
            self.initial_investment,
            self.final_portfolio_value,
            self.roi,
            self.activity_score,
            self.portfolio_volatility,
            self.loss_ratio,
            Some(self.sharpe_ratio),
        ]
    }
}

/// Outer join of every metric table, one row per wallet, ascending address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideFeatureTable {
    rows: Vec<WalletFeatureRow>,
}

impl WideFeatureTable {
    pub fn rows(&self) -> &[WalletFeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, wallet_address: &str) -> Option<&WalletFeatureRow> {
        self.rows
            .binary_search_by(|r| r.wallet_address.as_str().cmp(wallet_address))
            .ok()
            .map(|i| &self.rows[i])
    }
}

fn row_for<'a, 'm>(
    joined: &'m mut BTreeMap<&'a str, WalletFeatureRow>,
    wallet: &'a str,
) -> &'m mut WalletFeatureRow {
    joined
        .entry(wallet)
        .or_insert_with(|| WalletFeatureRow::empty(wallet))
}

/// Full outer join on wallet address, then Sharpe ratio over the joined rows.
pub fn assemble(
    trading: &[TradingFrequencyMetric],
    roi: &[RoiMetric],
    activity: &[ActivityScoreMetric],
    volatility: &[VolatilityMetric],
    loss: &[LossRatioMetric],
) -> WideFeatureTable {
    let mut joined: BTreeMap<&str, WalletFeatureRow> = BTreeMap::new();

    for m in trading {
        let r = row_for(&mut joined, &m.wallet_address);
        r.total_transactions = Some(m.total_transactions);
        r.days_active = Some(m.days_active);
        r.trading_frequency = Some(m.trading_frequency);
    }
    for m in roi {
        let r = row_for(&mut joined, &m.wallet_address);
        r.initial_investment = Some(m.initial_investment);
        r.final_portfolio_value = Some(m.final_portfolio_value);
        r.roi = Some(m.roi);
    }
    for m in activity {
        row_for(&mut joined, &m.wallet_address).activity_score = Some(m.activity_score);
    }
    for m in volatility {
        row_for(&mut joined, &m.wallet_address).portfolio_volatility =
            Some(m.portfolio_volatility);
    }
    for m in loss {
        row_for(&mut joined, &m.wallet_address).loss_ratio = Some(m.loss_ratio);
    }

    let rows = joined
        .into_values()
        .map(|mut r| {
            r.sharpe_ratio = metric_engine::sharpe_ratio(r.roi, r.portfolio_volatility);
            r
        })
        .collect();

    WideFeatureTable { rows }
}

/// Run every metric over the row store and join the results.
pub fn compute_features(store: &RowStore) -> WideFeatureTable {
    let table = assemble(
        &metric_engine::compute_trading_frequency(store),
        &metric_engine::compute_roi(store),
        &metric_engine::compute_activity_score(store),
        &metric_engine::compute_portfolio_volatility(store),
        &metric_engine::compute_loss_ratio(store),
    );
    tracing::info!(wallets = table.len(), "wallet features computed");
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric_engine::fixtures::{balance, tx};

    #[test]
    fn test_outer_join_keeps_wallets_from_any_metric() {
        let trading = vec![TradingFrequencyMetric {
            wallet_address: "A".to_string(),
            total_transactions: 2,
            days_active: 1,
            trading_frequency: 2.0,
        }];
        let roi = vec![RoiMetric {
            wallet_address: "B".to_string(),
            initial_investment: 10.0,
            final_portfolio_value: 20.0,
            roi: 100.0,
        }];
        let table = assemble(&trading, &roi, &[], &[], &[]);

        assert_eq!(table.len(), 2);
        let a = table.get("A").unwrap();
        assert_eq!(a.total_transactions, Some(2));
        assert!(a.roi.is_none());
        let b = table.get("B").unwrap();
        assert!(b.trading_frequency.is_none());
        assert_eq!(b.roi, Some(100.0));
        assert!(b.sharpe_ratio.abs() < f64::EPSILON);
        assert!(table.get("C").is_none());
    }

    #[test]
    fn test_wallet_only_in_transactions_has_no_roi_cells() {
        let store = RowStore::new(
            vec![tx("A", 0, 100.0), tx("A", 30, -20.0), tx("T", 0, 5.0)],
            vec![balance("A", 150.0)],
        );
        let table = compute_features(&store);
        let t = table.get("T").unwrap();
        assert!(t.roi.is_none());
        assert!(t.initial_investment.is_none());
        assert!(t.final_portfolio_value.is_none());
        assert_eq!(t.total_transactions, Some(1));
        assert_eq!(t.loss_ratio, Some(0.0));
    }

    #[test]
    fn test_sharpe_stays_zero_while_roi_stays_infinite() {
        // The zero-amount row is first in input order (initial investment) but
        // last by time, so the running balance never divides by zero.
        let store = RowStore::new(
            vec![
                tx("C", 3, 0.0),
                tx("C", 0, 10.0),
                tx("C", 1, 10.0),
                tx("C", 2, 20.0),
            ],
            vec![balance("C", 500.0)],
        );
        let table = compute_features(&store);
        let c = table.get("C").unwrap();
        assert!(c.roi.unwrap().is_infinite());
        let vol = c.portfolio_volatility.unwrap();
        assert!(vol.is_finite() && vol > 0.0);
        assert!(c.sharpe_ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn test_feature_values_follow_column_order() {
        let store = RowStore::new(vec![tx("A", 0, 10.0)], vec![balance("A", 20.0)]);
        let table = compute_features(&store);
        let values = table.rows()[0].feature_values();
        let by_name = |name: &str| values[FEATURE_COLUMNS.iter().position(|c| *c == name).unwrap()];
        assert_eq!(by_name("total_transactions"), Some(1.0));
        assert_eq!(by_name("roi"), Some(100.0));
        assert!(by_name("portfolio_volatility").unwrap().is_nan());
        assert_eq!(by_name("sharpe_ratio"), Some(0.0));
    }

    #[test]
    fn test_join_completeness_and_unique_wallets() {
        let store = RowStore::new(
            vec![tx("b", 0, 1.0), tx("a", 0, 1.0), tx("b", 5, 2.0)],
            vec![balance("z", 1.0)],
        );
        let table = compute_features(&store);
        let wallets: Vec<&str> = table
            .rows()
            .iter()
            .map(|r| r.wallet_address.as_str())
            .collect();
        // "z" has balances only, so it appears in no metric table.
        assert_eq!(wallets, vec!["a", "b"]);
    }

    #[test]
    fn test_recomputation_is_identical() {
        let store = RowStore::new(
            vec![tx("A", 0, 100.0), tx("A", 26, -20.0), tx("A", 50, 50.0)],
            vec![balance("A", 90.0)],
        );
        let first = compute_features(&store);
        let second = compute_features(&store);
        // NaN-free input, so PartialEq is a faithful comparison.
        assert_eq!(first, second);
    }
}
