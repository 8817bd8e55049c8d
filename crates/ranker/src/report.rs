//! CSV reports for the feature tables and both rankings.
//!
//! Missing and NaN cells are written empty; infinities as `inf` / `-inf`.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::features::{WalletFeatureRow, WideFeatureTable, FEATURE_COLUMNS};
use crate::model_ranking::PredictedRanking;
use crate::preprocess::NormalizedFeatureTable;
use crate::weighted_ranking::WeightedRanking;

fn float_cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else if v.is_infinite() {
        let sign = if v.is_sign_negative() { "-" } else { "" };
        format!("{sign}inf")
    } else {
        v.to_string()
    }
}

fn optional_cell(v: Option<f64>) -> String {
    v.map(float_cell).unwrap_or_default()
}

fn header<'a>(extra: &[&'a str]) -> Vec<&'a str> {
    std::iter::once("wallet_address")
        .chain(FEATURE_COLUMNS)
        .chain(extra.iter().copied())
        .collect()
}

fn feature_cells(row: &WalletFeatureRow) -> Vec<String> {
    let mut cells = Vec::with_capacity(FEATURE_COLUMNS.len() + 3);
    cells.push(row.wallet_address.clone());
    cells.push(row.total_transactions.map(|v| v.to_string()).unwrap_or_default());
    cells.push(row.days_active.map(|v| v.to_string()).unwrap_or_default());
    cells.push(optional_cell(row.trading_frequency));
    cells.push(optional_cell(row.initial_investment));
    cells.push(optional_cell(row.final_portfolio_value));
    cells.push(optional_cell(row.roi));
    cells.push(optional_cell(row.activity_score));
    cells.push(optional_cell(row.portfolio_volatility));
    cells.push(optional_cell(row.loss_ratio));
    cells.push(float_cell(row.sharpe_ratio));
    cells
}

fn dense_cells(wallet: &str, values: &[f64]) -> Vec<String> {
    std::iter::once(wallet.to_string())
        .chain(values.iter().map(|v| float_cell(*v)))
        .collect()
}

/// `wallet_features.csv`: the raw wide table.
pub fn write_features<W: Write>(out: W, table: &WideFeatureTable) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(header(&[]))?;
    for row in table.rows() {
        w.write_record(feature_cells(row))?;
    }
    w.flush()?;
    Ok(())
}

/// `wallet_features_clean.csv`: the filled and scaled table.
pub fn write_normalized<W: Write>(out: W, table: &NormalizedFeatureTable) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(header(&[]))?;
    for (wallet, row) in table.wallet_addresses.iter().zip(&table.rows) {
        w.write_record(dense_cells(wallet, row))?;
    }
    w.flush()?;
    Ok(())
}

/// `wallet_rankings.csv`: raw features plus `score` and `rank`, best first.
pub fn write_weighted_rankings<W: Write>(out: W, rankings: &[WeightedRanking]) -> Result<()> {
    let mut sorted: Vec<&WeightedRanking> = rankings.iter().collect();
    sorted.sort_by_key(|r| r.rank);

    let mut w = csv::Writer::from_writer(out);
    w.write_record(header(&["score", "rank"]))?;
    for r in sorted {
        let mut cells = feature_cells(&r.features);
        cells.push(float_cell(r.score));
        cells.push(r.rank.to_string());
        w.write_record(cells)?;
    }
    w.flush()?;
    Ok(())
}

/// `wallet_predictions.csv`: normalized features plus `predicted_score` and
/// `predicted_rank`, in table order.
pub fn write_predictions<W: Write>(out: W, predictions: &[PredictedRanking]) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(header(&["predicted_score", "predicted_rank"]))?;
    for p in predictions {
        let mut cells = dense_cells(&p.wallet_address, &p.features);
        cells.push(float_cell(p.predicted_score));
        cells.push(p.predicted_rank.to_string());
        w.write_record(cells)?;
    }
    w.flush()?;
    Ok(())
}

/// Create `path` and hand the open file to `write`.
pub fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Result<()>,
{
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write(file).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
