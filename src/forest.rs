//! Class-weighted random forest.
//!
//! An ensemble of CART trees grown on bootstrap samples. Split quality is
//! Gini impurity computed over class-weighted counts, so a minority class
//! with a large weight pulls splits and leaf distributions toward itself.
//!
//! Prediction averages the per-tree leaf class distributions and takes
//! the argmax; ties resolve to the lowest class index.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::ModelError;

/// Values closer than this are treated as equal when placing thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Candidate features per split; `None` means `sqrt(n_features)`.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            bootstrap: true,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        distribution: Vec<f64>,
    },
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    root: Node,
}

impl DecisionTree {
    /// Class distribution of the leaf `row` lands in.
    pub fn predict_proba(&self, row: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    importances: Vec<f64>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Sum over children of `child_weight * child_gini`.
    child_impurity: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    class_weights: &'a [f64],
    n_features: usize,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    importances: Vec<f64>,
    rng: StdRng,
}

fn gini(counts: impl Iterator<Item = f64>, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.map(|c| (c / total).powi(2)).sum::<f64>()
}

fn partition_in_place(idx: &mut [usize], mut goes_left: impl FnMut(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..idx.len() {
        if goes_left(idx[i]) {
            idx.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

impl TreeBuilder<'_> {
    fn class_totals(&self, idx: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.class_weights.len()];
        for &i in idx {
            totals[self.y[i]] += self.class_weights[self.y[i]];
        }
        totals
    }

    fn build(&mut self, idx: &mut [usize], depth: usize) -> Node {
        let totals = self.class_totals(idx);
        let weight: f64 = totals.iter().sum();
        let impurity = gini(totals.iter().copied(), weight);

        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if impurity <= 0.0 || idx.len() < self.min_samples_split || depth_reached {
            return leaf(totals, weight);
        }

        let Some(split) = self.best_split(idx, &totals, weight) else {
            return leaf(totals, weight);
        };
        self.importances[split.feature] += weight * impurity - split.child_impurity;

        let x = self.x;
        let mid = partition_in_place(idx, |i| x[i][split.feature] <= split.threshold);
        let (left_idx, right_idx) = idx.split_at_mut(mid);
        let left = self.build(left_idx, depth + 1);
        let right = self.build(right_idx, depth + 1);

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn best_split(&mut self, idx: &[usize], totals: &[f64], weight: f64) -> Option<SplitCandidate> {
        let x = self.x;
        let n_classes = totals.len();
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(&mut self.rng);

        let mut order = idx.to_vec();
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for f in features {
            if visited >= self.max_features {
                break;
            }
            order.sort_by(|&a, &b| x[a][f].total_cmp(&x[b][f]));
            let lo = x[order[0]][f];
            let hi = x[order[order.len() - 1]][f];
            if hi - lo <= FEATURE_THRESHOLD {
                // Constant here; draw another feature without counting this one.
                continue;
            }
            visited += 1;

            let mut left = vec![0.0; n_classes];
            let mut left_weight = 0.0;
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                let w = self.class_weights[self.y[i]];
                left[self.y[i]] += w;
                left_weight += w;

                let value = x[i][f];
                let next = x[order[pos + 1]][f];
                if next <= value + FEATURE_THRESHOLD {
                    continue;
                }

                let right_weight = weight - left_weight;
                let child_impurity = left_weight * gini(left.iter().copied(), left_weight)
                    + right_weight
                        * gini(
                            totals.iter().zip(&left).map(|(t, l)| t - l),
                            right_weight,
                        );

                if best.as_ref().map_or(true, |b| child_impurity < b.child_impurity) {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(SplitCandidate {
                        feature: f,
                        threshold,
                        child_impurity,
                    });
                }
            }
        }
        best
    }
}

fn leaf(totals: Vec<f64>, weight: f64) -> Node {
    let distribution = if weight > 0.0 {
        totals.into_iter().map(|t| t / weight).collect()
    } else {
        totals
    };
    Node::Leaf { distribution }
}

impl RandomForest {
    /// Fits the forest.
    ///
    /// `y` holds class indices in `0..class_weights.len()`; `class_weights`
    /// scales each sample's contribution to impurity and leaf distributions.
    ///
    /// # Errors
    ///
    /// [`ModelError::EmptyCorpus`] on empty input and
    /// [`ModelError::InvalidParameter`] on inconsistent shapes or params.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        class_weights: &[f64],
        params: &ForestParams,
    ) -> Result<Self, ModelError> {
        if x.is_empty() {
            return Err(ModelError::EmptyCorpus);
        }
        if x.len() != y.len() {
            return Err(ModelError::InvalidParameter {
                param: "y",
                constraint: "one label per row",
            });
        }
        if params.n_estimators == 0 {
            return Err(ModelError::InvalidParameter {
                param: "n_estimators",
                constraint: "must be at least 1",
            });
        }
        if params.min_samples_split < 2 {
            return Err(ModelError::InvalidParameter {
                param: "min_samples_split",
                constraint: "must be at least 2",
            });
        }
        let n_classes = class_weights.len();
        if y.iter().any(|&c| c >= n_classes) {
            return Err(ModelError::InvalidParameter {
                param: "class_weights",
                constraint: "one weight per class label",
            });
        }
        if class_weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(ModelError::InvalidParameter {
                param: "class_weights",
                constraint: "weights must be positive and finite",
            });
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(ModelError::InvalidParameter {
                param: "x",
                constraint: "rows must share one feature count",
            });
        }
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features.max(1));

        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; n_features];
        let draw = Uniform::from(0..n_samples);

        for t in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(params.random_state.wrapping_add(t as u64));
            let mut idx: Vec<usize> = if params.bootstrap {
                (0..n_samples).map(|_| draw.sample(&mut rng)).collect()
            } else {
                (0..n_samples).collect()
            };

            let mut builder = TreeBuilder {
                x,
                y,
                class_weights,
                n_features,
                max_features,
                max_depth: params.max_depth,
                min_samples_split: params.min_samples_split,
                importances: vec![0.0; n_features],
                rng,
            };
            let root = builder.build(&mut idx, 0);

            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&builder.importances) {
                    *acc += v / tree_total;
                }
            }
            trees.push(DecisionTree { root });
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            trees,
            n_classes,
            importances,
        })
    }

    /// Mean of the per-tree leaf distributions.
    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *p += v;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }

    pub fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba(row))
    }

    /// Normalised mean impurity decrease per feature.
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn avg_depth(&self) -> f64 {
        self.trees.iter().map(DecisionTree::depth).sum::<usize>() as f64 / self.trees.len() as f64
    }
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
