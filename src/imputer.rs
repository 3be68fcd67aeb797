use crate::corpus::TrainingCorpus;
use crate::error::ModelError;
use crate::types::{Feature, PartialSample, Sample, FEATURE_COUNT};

/// Fills unknown fields with per-column training means.
///
/// The means are computed once from the corpus and never change; build a
/// new imputer if the corpus changes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImputer {
    means: Sample,
}

impl FeatureImputer {
    /// Computes column means over every feature (the label is ignored).
    ///
    /// # Errors
    ///
    /// [`ModelError::EmptyCorpus`] when there are no rows, and
    /// [`ModelError::NonFiniteMean`] if a column overflows.
    pub fn fit(corpus: &TrainingCorpus) -> Result<Self, ModelError> {
        if corpus.is_empty() {
            return Err(ModelError::EmptyCorpus);
        }
        let mut sums = [0.0; FEATURE_COUNT];
        for row in corpus.rows() {
            for (sum, v) in sums.iter_mut().zip(row.sample.as_slice()) {
                *sum += v;
            }
        }
        let n = corpus.len() as f64;
        let means = Sample::new(sums.map(|s| s / n));
        if let Some(f) = Feature::ALL.into_iter().find(|f| !means.get(*f).is_finite()) {
            return Err(ModelError::NonFiniteMean(f.column()));
        }
        Ok(Self { means })
    }

    pub fn from_means(means: Sample) -> Self {
        Self { means }
    }

    pub fn means(&self) -> &Sample {
        &self.means
    }

    /// Densifies a partial sample. Known fields pass through unchanged.
    pub fn impute(&self, partial: &PartialSample) -> Sample {
        let mut out = self.means;
        for f in Feature::ALL {
            if let Some(v) = partial.get(f) {
                out.set(f, v);
            }
        }
        out
    }
}
