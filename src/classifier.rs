//! Potability classifier.
//!
//! Wraps [`RandomForest`] with the dataset conventions: a seeded 80/20
//! split, balanced class weights computed over the training partition, and
//! evaluation against the retained test rows. A trained model is never
//! mutated; share it behind an `Arc`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::corpus::{LabeledSample, TrainingCorpus};
use crate::error::ModelError;
use crate::forest::{argmax, ForestParams, RandomForest};
use crate::types::{Feature, Potability, Sample, Verdict};

const N_CLASSES: usize = 2;
const LABELS: [Potability; N_CLASSES] = [Potability::NotPotable, Potability::Potable];

#[derive(Debug, Clone)]
pub struct TrainingParams {
    pub test_fraction: f64,
    pub split_seed: u64,
    pub forest: ForestParams,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            split_seed: 42,
            forest: ForestParams::default(),
        }
    }
}

/// Label plus the per-class probability vector, indexed by
/// [`Potability::class_index`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities {
    pub label: Potability,
    pub probabilities: [f64; N_CLASSES],
}

impl ClassProbabilities {
    pub fn verdict(&self) -> Verdict {
        self.label.into()
    }

    /// Probability assigned to the predicted label.
    pub fn confidence(&self) -> f64 {
        self.probabilities[self.label.class_index()]
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMetrics {
    pub label: Potability,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub classes: Vec<ClassMetrics>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureImportance {
    pub feature: Feature,
    pub importance: f64,
}

#[derive(Debug, Clone)]
pub struct PotabilityModel {
    forest: RandomForest,
    held_out: Vec<LabeledSample>,
    train_size: usize,
    class_weights: [f64; N_CLASSES],
}

/// `n / (n_classes * count_c)` for each class.
pub fn balanced_class_weights(labels: &[Potability]) -> Result<[f64; N_CLASSES], ModelError> {
    let n = labels.len() as f64;
    let mut weights = [0.0; N_CLASSES];
    for class in LABELS {
        let count = labels.iter().filter(|l| **l == class).count();
        if count == 0 {
            return Err(ModelError::ClassMissingFromTraining(class));
        }
        weights[class.class_index()] = n / (N_CLASSES as f64 * count as f64);
    }
    Ok(weights)
}

impl PotabilityModel {
    /// Trains once over a shuffled split of the corpus.
    ///
    /// # Errors
    ///
    /// Fails when the corpus is empty, when either label has fewer than two
    /// examples, or when the split leaves a label out of the training rows.
    pub fn train(corpus: &TrainingCorpus, params: &TrainingParams) -> Result<Self, ModelError> {
        if corpus.is_empty() {
            return Err(ModelError::EmptyCorpus);
        }
        if !(0.0..1.0).contains(&params.test_fraction) {
            return Err(ModelError::InvalidParameter {
                param: "test_fraction",
                constraint: "must be in [0, 1)",
            });
        }
        for label in LABELS {
            let count = corpus.count_label(label);
            if count < 2 {
                return Err(ModelError::InsufficientClass { label, count });
            }
        }

        let mut order: Vec<usize> = (0..corpus.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(params.split_seed));
        let n_test = (params.test_fraction * corpus.len() as f64).ceil() as usize;
        let (test_idx, train_idx) = order.split_at(n_test.min(corpus.len() - 1));

        let rows = corpus.rows();
        let held_out: Vec<LabeledSample> = test_idx.iter().map(|&i| rows[i]).collect();
        let train: Vec<LabeledSample> = train_idx.iter().map(|&i| rows[i]).collect();

        let labels: Vec<Potability> = train.iter().map(|r| r.label).collect();
        let class_weights = balanced_class_weights(&labels)?;

        let x: Vec<Vec<f64>> = train.iter().map(|r| r.sample.as_slice().to_vec()).collect();
        let y: Vec<usize> = labels.iter().map(|l| l.class_index()).collect();
        let forest = RandomForest::fit(&x, &y, &class_weights, &params.forest)?;

        tracing::info!(
            train = train.len(),
            test = held_out.len(),
            trees = forest.n_trees(),
            weight_not_potable = class_weights[0],
            weight_potable = class_weights[1],
            "model.trained"
        );

        Ok(Self {
            forest,
            held_out,
            train_size: train.len(),
            class_weights,
        })
    }

    pub fn predict(&self, sample: &Sample) -> ClassProbabilities {
        let proba = self.forest.predict_proba(sample.as_slice());
        let probabilities = [proba[0], proba[1]];
        let label = Potability::from_class_index(argmax(&probabilities)).unwrap_or(Potability::NotPotable);
        ClassProbabilities { label, probabilities }
    }

    /// Fraction of `rows` whose label is predicted correctly.
    pub fn evaluate(&self, rows: &[LabeledSample]) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let correct = rows
            .iter()
            .filter(|r| self.predict(&r.sample).label == r.label)
            .count();
        correct as f64 / rows.len() as f64
    }

    /// Per-class precision, recall and F1 on the held-out rows.
    pub fn report(&self) -> ClassificationReport {
        let predicted: Vec<Potability> = self.held_out.iter().map(|r| self.predict(&r.sample).label).collect();
        let classes = LABELS
            .into_iter()
            .map(|class| {
                let tp = self
                    .held_out
                    .iter()
                    .zip(&predicted)
                    .filter(|(r, p)| r.label == class && **p == class)
                    .count();
                let predicted_pos = predicted.iter().filter(|p| **p == class).count();
                let support = self.held_out.iter().filter(|r| r.label == class).count();
                let precision = ratio(tp, predicted_pos);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: class,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();
        ClassificationReport {
            accuracy: self.evaluate(&self.held_out),
            classes,
        }
    }

    /// Importances sorted from most to least influential.
    pub fn feature_importances(&self) -> Vec<FeatureImportance> {
        let mut out: Vec<FeatureImportance> = Feature::ALL
            .into_iter()
            .zip(self.forest.feature_importances())
            .map(|(feature, &importance)| FeatureImportance { feature, importance })
            .collect();
        out.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        out
    }

    pub fn held_out(&self) -> &[LabeledSample] {
        &self.held_out
    }

    pub fn train_size(&self) -> usize {
        self.train_size
    }

    pub fn class_weights(&self) -> [f64; N_CLASSES] {
        self.class_weights
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
