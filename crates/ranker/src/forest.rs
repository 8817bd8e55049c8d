//! Bagged regression trees (random forest) over dense `f64` feature rows.

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Nodes with fewer samples than this become leaves.
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            min_samples_split: 2,
            max_depth: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(v) => return *v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    sse: f64,
}

struct TreeBuilder<'a, R> {
    x: &'a [R],
    y: &'a [f64],
    n_features: usize,
    params: &'a ForestParams,
}

fn mean(y: &[f64], idx: &[usize]) -> f64 {
    if idx.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = idx.len() as f64;
    idx.iter().map(|&i| y[i]).sum::<f64>() / n
}

/// Sum of squared errors from running sums: `sq - s^2 / n`.
fn sse(sum: f64, sum_sq: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;
    (sum_sq - sum * sum / n).max(0.0)
}

/// Midpoint between two sorted neighbours, kept strictly below `hi`.
fn threshold_between(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi {
        lo
    } else {
        mid
    }
}

impl<R: AsRef<[f64]>> TreeBuilder<'_, R> {
    fn value(&self, sample: usize, feature: usize) -> f64 {
        self.x[sample].as_ref()[feature]
    }

    fn build(&self, idx: &mut [usize], depth: usize, rng: &mut StdRng) -> Node {
        let leaf_value = mean(self.y, idx);
        let too_small = idx.len() < self.params.min_samples_split.max(2);
        let too_deep = self.params.max_depth.is_some_and(|d| depth >= d);
        let pure = idx
            .iter()
            .all(|&i| (self.y[i] - leaf_value).abs() <= f64::EPSILON * leaf_value.abs().max(1.0));
        if too_small || too_deep || pure {
            return Node::Leaf(leaf_value);
        }

        let Some(best) = self.best_split(idx, rng) else {
            return Node::Leaf(leaf_value);
        };

        let (mut left, mut right): (Vec<usize>, Vec<usize>) = idx
            .iter()
            .copied()
            .partition(|&i| self.value(i, best.feature) <= best.threshold);
        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(&mut left, depth + 1, rng)),
            right: Box::new(self.build(&mut right, depth + 1, rng)),
        }
    }

    /// Lowest combined child SSE over every feature, visited in random order.
    fn best_split(&self, idx: &mut [usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);

        let total_sum: f64 = idx.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = idx.iter().map(|&i| self.y[i] * self.y[i]).sum();

        let mut best: Option<SplitCandidate> = None;
        for feature in features {
            idx.sort_by(|&a, &b| self.value(a, feature).total_cmp(&self.value(b, feature)));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 1..idx.len() {
                let y = self.y[idx[k - 1]];
                left_sum += y;
                left_sq += y * y;

                let lo = self.value(idx[k - 1], feature);
                let hi = self.value(idx[k], feature);
                if lo >= hi {
                    continue;
                }
                let split_sse = sse(left_sum, left_sq, k)
                    + sse(total_sum - left_sum, total_sq - left_sq, idx.len() - k);
                let improves = match &best {
                    Some(b) => split_sse < b.sse,
                    None => true,
                };
                if improves {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: threshold_between(lo, hi),
                        sse: split_sse,
                    });
                }
            }
        }
        best
    }
}

/// Mean prediction of independently bootstrapped regression trees.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    trees: Vec<Node>,
}

impl RandomForestRegressor {
    /// Fit on `x` (one row per sample) against `y`.
    ///
    /// Each tree trains on a bootstrap resample and gets its own RNG stream
    /// derived from `params.seed`, so a fixed seed reproduces the forest.
    pub fn fit<R: AsRef<[f64]>>(x: &[R], y: &[f64], params: &ForestParams) -> Result<Self> {
        if params.n_trees == 0 {
            bail!("random forest needs at least one tree");
        }
        if x.len() != y.len() {
            bail!("feature rows ({}) and labels ({}) differ in length", x.len(), y.len());
        }
        let n_features = x.first().map_or(0, |r| r.as_ref().len());
        if x.iter().any(|r| r.as_ref().len() != n_features) {
            bail!("feature rows have inconsistent widths");
        }

        let builder = TreeBuilder {
            x,
            y,
            n_features,
            params,
        };
        let mut master = StdRng::seed_from_u64(params.seed);
        let trees = (0..params.n_trees)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(master.gen());
                let mut sample: Vec<usize> = if x.is_empty() {
                    Vec::new()
                } else {
                    (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect()
                };
                builder.build(&mut sample, 0, &mut rng)
            })
            .collect();

        Ok(Self { trees })
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}
