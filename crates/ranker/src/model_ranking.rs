//! Learned ranking: fit a random forest to a label derived per wallet, score
//! every wallet and dense-rank the predictions.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::features::FEATURE_COUNT;
use crate::forest::{ForestParams, RandomForestRegressor};
use crate::preprocess::NormalizedFeatureTable;

/// Source of the regression target for each wallet.
pub trait LabelStrategy {
    fn name(&self) -> &'static str;

    fn label(&self, wallet_address: &str, features: &[f64; FEATURE_COUNT]) -> f64;
}

/// Proxy label: arithmetic mean of the normalized feature values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanOfFeatures;

impl LabelStrategy for MeanOfFeatures {
    fn name(&self) -> &'static str {
        "mean_of_features"
    }

    #[allow(clippy::cast_precision_loss)]
    fn label(&self, _wallet_address: &str, features: &[f64; FEATURE_COUNT]) -> f64 {
        features.iter().sum::<f64>() / FEATURE_COUNT as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
    pub n_trees: usize,
    /// Share of wallets held out for the MAE diagnostic.
    pub test_fraction: f64,
    pub seed: u64,
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            test_fraction: 0.2,
            seed: 42,
            min_samples_split: 2,
            max_depth: None,
        }
    }
}

impl From<&common::config::Model> for ModelConfig {
    fn from(cfg: &common::config::Model) -> Self {
        Self {
            n_trees: cfg.n_trees,
            test_fraction: cfg.test_fraction,
            seed: cfg.seed,
            min_samples_split: cfg.min_samples_split,
            max_depth: cfg.max_depth,
        }
    }
}

impl ModelConfig {
    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.n_trees,
            min_samples_split: self.min_samples_split,
            max_depth: self.max_depth,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    forest: RandomForestRegressor,
    /// `None` when the table was too small to hold anything out.
    pub holdout_mae: Option<f64>,
    pub train_size: usize,
    pub test_size: usize,
}

/// Seeded shuffle of `0..n`, split into (train, test).
///
/// The test side gets `ceil(n * test_fraction)` rows. If either side would be
/// empty, everything is used for training and the test side is empty.
fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let n_test = (n as f64 * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return (order, Vec::new());
    }
    let train = order.split_off(n_test);
    (train, order)
}

fn mean_absolute_error(predicted: &[f64], actual: &[f64]) -> Option<f64> {
    if predicted.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = predicted.len() as f64;
    Some(
        predicted
            .iter()
            .zip(actual)
            .map(|(p, a)| (p - a).abs())
            .sum::<f64>()
            / n,
    )
}

/// Fit on the training split and measure MAE on the held-out split.
///
/// The MAE is informational only; it never blocks scoring.
pub fn train<L: LabelStrategy>(
    table: &NormalizedFeatureTable,
    labels: &L,
    config: &ModelConfig,
) -> Result<TrainedModel> {
    let y: Vec<f64> = table
        .wallet_addresses
        .iter()
        .zip(&table.rows)
        .map(|(wallet, row)| labels.label(wallet, row))
        .collect();

    let (train_idx, test_idx) = train_test_split(table.len(), config.test_fraction, config.seed);
    let train_x: Vec<[f64; FEATURE_COUNT]> = train_idx.iter().map(|&i| table.rows[i]).collect();
    let train_y: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();

    let forest = RandomForestRegressor::fit(&train_x, &train_y, &config.forest_params())?;

    let test_pred: Vec<f64> = test_idx
        .iter()
        .map(|&i| forest.predict(&table.rows[i]))
        .collect();
    let test_y: Vec<f64> = test_idx.iter().map(|&i| y[i]).collect();
    let holdout_mae = mean_absolute_error(&test_pred, &test_y);

    match holdout_mae {
        Some(mae) => {
            metrics::gauge!("ranker_model_holdout_mae").set(mae);
            tracing::info!(
                label = labels.name(),
                train = train_idx.len(),
                test = test_idx.len(),
                mae,
                "model trained"
            );
        }
        None if table.is_empty() => tracing::warn!("no wallets to train on"),
        None => tracing::warn!(
            label = labels.name(),
            wallets = table.len(),
            "too few wallets for a held-out split; trained on all rows"
        ),
    }

    Ok(TrainedModel {
        forest,
        holdout_mae,
        train_size: train_idx.len(),
        test_size: test_idx.len(),
    })
}

impl TrainedModel {
    /// Predicted score for every row, in table order.
    pub fn score(&self, table: &NormalizedFeatureTable) -> Vec<f64> {
        table.rows.iter().map(|r| self.forest.predict(r)).collect()
    }
}

/// Dense descending rank: equal scores share a rank, the next distinct
/// score takes the following integer.
pub fn dense_rank(scores: &[f64]) -> Vec<usize> {
    let mut distinct: Vec<f64> = scores.to_vec();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup_by(|a, b| a.total_cmp(b).is_eq());

    scores
        .iter()
        .map(|s| distinct.partition_point(|d| d.total_cmp(s).is_gt()) + 1)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictedRanking {
    pub wallet_address: String,
    pub features: [f64; FEATURE_COUNT],
    pub predicted_score: f64,
    pub predicted_rank: usize,
}

/// Train, score every wallet (training rows included) and dense-rank.
/// Output keeps table order.
pub fn rank_with_model<L: LabelStrategy>(
    table: &NormalizedFeatureTable,
    labels: &L,
    config: &ModelConfig,
) -> Result<(TrainedModel, Vec<PredictedRanking>)> {
    let model = train(table, labels, config)?;
    let scores = model.score(table);
    let ranks = dense_rank(&scores);

    metrics::counter!("ranker_wallets_scored_total", "ranker" => "model")
        .increment(scores.len() as u64);

    let rankings = table
        .wallet_addresses
        .iter()
        .zip(&table.rows)
        .zip(scores.into_iter().zip(ranks))
        .map(|((wallet, features), (predicted_score, predicted_rank))| PredictedRanking {
            wallet_address: wallet.clone(),
            features: *features,
            predicted_score,
            predicted_rank,
        })
        .collect();

    Ok((model, rankings))
}
