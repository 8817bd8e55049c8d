use std::cmp::Ordering;

use crate::features::{WalletFeatureRow, WideFeatureTable};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub roi: f64,
    pub trading_frequency: f64,
    pub sharpe_ratio: f64,
    /// Negative: a higher loss ratio lowers the score.
    pub loss_ratio: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            roi: 0.4,
            trading_frequency: 0.3,
            sharpe_ratio: 0.2,
            loss_ratio: -0.1,
        }
    }
}

impl From<&common::config::WeightedRanking> for RankingWeights {
    fn from(cfg: &common::config::WeightedRanking) -> Self {
        Self {
            roi: cfg.roi_weight,
            trading_frequency: cfg.trading_frequency_weight,
            sharpe_ratio: cfg.sharpe_ratio_weight,
            loss_ratio: cfg.loss_ratio_weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedRanking {
    pub features: WalletFeatureRow,
    pub score: f64,
    /// 1 = best; a permutation of 1..=N.
    pub rank: usize,
}

/// Missing or NaN counts as 0 here, independent of the preprocessor's median fill.
fn zero_fill(v: Option<f64>) -> f64 {
    match v {
        Some(x) if !x.is_nan() => x,
        _ => 0.0,
    }
}

pub fn composite_score(row: &WalletFeatureRow, w: &RankingWeights) -> f64 {
    w.roi * zero_fill(row.roi)
        + w.trading_frequency * zero_fill(row.trading_frequency)
        + w.sharpe_ratio * zero_fill(Some(row.sharpe_ratio))
        + w.loss_ratio * zero_fill(row.loss_ratio)
}

/// Descending, NaN last.
fn best_first(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Score every wallet on the raw feature table and rank by sorted position.
///
/// The sort is stable, so tied scores keep table order and still get distinct ranks.
pub fn rank_wallets(table: &WideFeatureTable, weights: &RankingWeights) -> Vec<WeightedRanking> {
    let mut scored: Vec<(f64, &WalletFeatureRow)> = table
        .rows()
        .iter()
        .map(|row| (composite_score(row, weights), row))
        .collect();
    scored.sort_by(|a, b| best_first(a.0, b.0));

    metrics::counter!("ranker_wallets_scored_total", "ranker" => "weighted")
        .increment(scored.len() as u64);

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, row))| WeightedRanking {
            features: row.clone(),
            score,
            rank: i + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_features;
    use crate::metric_engine::fixtures::{balance, tx};
    use crate::row_store::RowStore;

    fn row(wallet: &str, roi: Option<f64>, freq: Option<f64>, loss: Option<f64>) -> WalletFeatureRow {
        WalletFeatureRow {
            wallet_address: wallet.to_string(),
            total_transactions: None,
            days_active: None,
            trading_frequency: freq,
            initial_investment: None,
            final_portfolio_value: None,
            roi,
            activity_score: None,
            portfolio_volatility: None,
            loss_ratio: loss,
            sharpe_ratio: 0.0,
        }
    }

    #[test]
    fn test_composite_score_default_weights() {
        let mut r = row("A", Some(10.0), Some(2.0), Some(50.0));
        r.sharpe_ratio = 1.5;
        let s = composite_score(&r, &RankingWeights::default());
        // 0.4*10 + 0.3*2 + 0.2*1.5 - 0.1*50 = 4 + 0.6 + 0.3 - 5
        assert!((s - (-0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_missing_and_nan_inputs_count_as_zero() {
        let r = row("A", None, Some(f64::NAN), None);
        assert!(composite_score(&r, &RankingWeights::default()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_alternate_weights_change_order() {
        let table_rows = [
            row("high_roi", Some(100.0), Some(0.0), Some(0.0)),
            row("busy", Some(0.0), Some(50.0), Some(0.0)),
        ];
        let only_frequency = RankingWeights {
            roi: 0.0,
            trading_frequency: 1.0,
            sharpe_ratio: 0.0,
            loss_ratio: 0.0,
        };
        assert!(
            composite_score(&table_rows[1], &only_frequency)
                > composite_score(&table_rows[0], &only_frequency)
        );
        assert!(
            composite_score(&table_rows[0], &RankingWeights::default())
                > composite_score(&table_rows[1], &RankingWeights::default())
        );
    }

    #[test]
    fn test_rank_wallets_is_permutation_sorted_by_score() {
        let store = RowStore::new(
            vec![
                tx("A", 0, 100.0),
                tx("A", 1, -10.0),
                tx("B", 0, 50.0),
                tx("C", 0, 10.0),
                tx("C", 2, 10.0),
            ],
            vec![balance("A", 300.0), balance("B", 40.0), balance("C", 10.0)],
        );
        let ranked = rank_wallets(&compute_features(&store), &RankingWeights::default());

        let mut ranks: Vec<usize> = ranked.iter().map(|r| r.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(ranked[0].features.wallet_address, "A");
    }

    #[test]
    fn test_ties_keep_table_order_with_distinct_ranks() {
        let store = RowStore::new(
            vec![tx("x", 0, 1.0), tx("y", 0, 1.0), tx("z", 0, 1.0)],
            vec![],
        );
        let ranked = rank_wallets(&compute_features(&store), &RankingWeights::default());
        let order: Vec<(&str, usize)> = ranked
            .iter()
            .map(|r| (r.features.wallet_address.as_str(), r.rank))
            .collect();
        assert_eq!(order, vec![("x", 1), ("y", 2), ("z", 3)]);
    }

    #[test]
    fn test_nan_scores_rank_last() {
        assert_eq!(best_first(f64::NAN, 1.0), Ordering::Greater);
        assert_eq!(best_first(2.0, 1.0), Ordering::Less);
        assert_eq!(best_first(f64::INFINITY, 1e300), Ordering::Less);
    }
}
