use serde::Serialize;

use crate::classifier::{PotabilityModel, TrainingParams};
use crate::corpus::TrainingCorpus;
use crate::error::ModelError;
use crate::explain::{explain, Explanation, Reason};
use crate::imputer::FeatureImputer;
use crate::types::{KnownFields, PartialSample, Sample, Verdict};

/// Read-only prediction pipeline: impute, classify, explain.
///
/// Built once at start-up and shared; nothing here mutates after
/// construction.
#[derive(Debug, Clone)]
pub struct Predictor {
    imputer: FeatureImputer,
    model: PotabilityModel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub label: Verdict,
    /// Confidence in the label, as a percentage.
    pub confidence: f64,
    pub probabilities: Probabilities,
    /// The densified sample the model saw.
    pub sample: Sample,
    pub known_fields: KnownFields,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
    /// Display string for the explanation; set only for unsafe verdicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Probabilities {
    pub not_potable: f64,
    pub potable: f64,
}

impl Predictor {
    pub fn new(imputer: FeatureImputer, model: PotabilityModel) -> Self {
        Self { imputer, model }
    }

    /// Computes imputation means and trains the model.
    ///
    /// # Errors
    ///
    /// Any [`ModelError`]; these are start-up configuration failures.
    pub fn train(corpus: &TrainingCorpus, params: &TrainingParams) -> Result<Self, ModelError> {
        let imputer = FeatureImputer::fit(corpus)?;
        let model = PotabilityModel::train(corpus, params)?;
        Ok(Self::new(imputer, model))
    }

    pub fn imputer(&self) -> &FeatureImputer {
        &self.imputer
    }

    pub fn model(&self) -> &PotabilityModel {
        &self.model
    }

    pub fn predict(&self, input: &PartialSample) -> PredictionResult {
        let known = input.known();
        let sample = self.imputer.impute(input);
        let output = self.model.predict(&sample);
        let label = output.verdict();

        let (reasons, explanation) = match explain(&sample, label, &known) {
            Some((reasons, explanation)) => (reasons, Some(explanation)),
            None => (Vec::new(), None),
        };

        tracing::debug!(
            known = known.len(),
            label = ?label,
            confidence = output.confidence(),
            "prediction.made"
        );

        let primary_reason = explanation.as_ref().map(|e| e.summary().to_string());
        PredictionResult {
            label,
            confidence: output.confidence() * 100.0,
            probabilities: Probabilities {
                not_potable: output.probabilities[0],
                potable: output.probabilities[1],
            },
            sample,
            known_fields: known,
            reasons,
            explanation,
            primary_reason,
        }
    }
}
