//! Median imputation and min-max scaling of the wide feature table.

use crate::features::{WideFeatureTable, FEATURE_COUNT};

/// Wide feature table with every cell filled and scaled into [0, 1].
///
/// Same wallets in the same order as the input table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedFeatureTable {
    pub wallet_addresses: Vec<String>,
    pub rows: Vec<[f64; FEATURE_COUNT]>,
}

impl NormalizedFeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Median of the finite values; `None` when there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Rescale in place to `(x - min) / (max - min)`; a zero-range column becomes all zeros.
pub fn min_max_scale(column: &mut [f64]) {
    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    for v in column.iter_mut() {
        *v = if range > 0.0 {
            ((*v - min) / range).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

/// Fill each column's missing or non-finite cells with the column median,
/// then min-max scale every column independently.
///
/// A column with no finite value at all is filled with 0.
pub fn preprocess(table: &WideFeatureTable) -> NormalizedFeatureTable {
    let raw: Vec<[Option<f64>; FEATURE_COUNT]> =
        table.rows().iter().map(|r| r.feature_values()).collect();

    let mut columns: Vec<Vec<f64>> = (0..FEATURE_COUNT)
        .map(|c| {
            let present: Vec<f64> = raw.iter().filter_map(|row| row[c]).collect();
            let fill = median(&present).unwrap_or(0.0);
            raw.iter()
                .map(|row| match row[c] {
                    Some(v) if v.is_finite() => v,
                    _ => fill,
                })
                .collect()
        })
        .collect();

    for column in &mut columns {
        min_max_scale(column);
    }

    let rows = (0..raw.len())
        .map(|i| std::array::from_fn(|c| columns[c][i]))
        .collect();

    NormalizedFeatureTable {
        wallet_addresses: table
            .rows()
            .iter()
            .map(|r| r.wallet_address.clone())
            .collect(),
        rows,
    }
}
