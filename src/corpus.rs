//! Training corpus loading.
//!
//! Reads the potability dataset (nine feature columns plus `Potability`).
//! Rows with any missing feature are dropped, so the corpus handed to the
//! imputer and the classifier is always complete.

use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::CorpusError;
use crate::types::{Feature, Potability, Sample, FEATURE_COUNT};

pub const LABEL_COLUMN: &str = "Potability";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledSample {
    pub sample: Sample,
    pub label: Potability,
}

/// Immutable, complete training rows.
#[derive(Debug, Clone, Default)]
pub struct TrainingCorpus {
    rows: Vec<LabeledSample>,
    dropped: usize,
}

/// One row of the corpus summary table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    pub feature: Feature,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl TrainingCorpus {
    pub fn from_rows(rows: Vec<LabeledSample>) -> Self {
        Self { rows, dropped: 0 }
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let corpus = Self::from_reader(file)?;
        tracing::info!(
            path = %path.display(),
            rows = corpus.len(),
            dropped = corpus.dropped(),
            "corpus.loaded"
        );
        Ok(corpus)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CorpusError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let column_of = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

        let mut feature_cols = [0usize; FEATURE_COUNT];
        for f in Feature::ALL {
            feature_cols[f.index()] = column_of(f.column()).ok_or(CorpusError::MissingColumn(f.column()))?;
        }
        let label_col = column_of(LABEL_COLUMN).ok_or(CorpusError::MissingColumn(LABEL_COLUMN))?;

        let mut rows = Vec::new();
        let mut dropped = 0;
        for record in rdr.records() {
            let record = record?;
            let line = record.position().map_or(0, |p| p.line());

            let raw_label = record.get(label_col).unwrap_or("");
            if raw_label.is_empty() {
                dropped += 1;
                continue;
            }
            let label = parse_label(raw_label).ok_or_else(|| CorpusError::InvalidLabel {
                line,
                value: raw_label.to_string(),
            })?;

            let mut values = [0.0; FEATURE_COUNT];
            let mut complete = true;
            for (slot, col) in values.iter_mut().zip(feature_cols) {
                match record.get(col).and_then(|v| v.parse::<f64>().ok()) {
                    Some(v) if v.is_finite() => *slot = v,
                    _ => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                dropped += 1;
                continue;
            }
            rows.push(LabeledSample {
                sample: Sample::new(values),
                label,
            });
        }

        Ok(Self { rows, dropped })
    }

    pub fn rows(&self) -> &[LabeledSample] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows discarded at load time because a value was missing.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn count_label(&self, label: Potability) -> usize {
        self.rows.iter().filter(|r| r.label == label).count()
    }

    /// Per-feature count, mean, sample standard deviation, min and max.
    pub fn describe(&self) -> Vec<FeatureSummary> {
        Feature::ALL
            .into_iter()
            .map(|feature| {
                let values = self.rows.iter().map(|r| r.sample.get(feature));
                let count = self.rows.len();
                let (sum, min, max) = values.fold((0.0, f64::INFINITY, f64::NEG_INFINITY), |(s, lo, hi), v| {
                    (s + v, lo.min(v), hi.max(v))
                });
                let mean = if count == 0 { f64::NAN } else { sum / count as f64 };
                let std = if count < 2 {
                    f64::NAN
                } else {
                    let ss: f64 = self
                        .rows
                        .iter()
                        .map(|r| (r.sample.get(feature) - mean).powi(2))
                        .sum();
                    (ss / (count - 1) as f64).sqrt()
                };
                FeatureSummary {
                    feature,
                    count,
                    mean,
                    std,
                    min,
                    max,
                }
            })
            .collect()
    }
}

fn parse_label(raw: &str) -> Option<Potability> {
    let v: f64 = raw.parse().ok()?;
    if v == 0.0 {
        Some(Potability::NotPotable)
    } else if v == 1.0 {
        Some(Potability::Potable)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "ph,Hardness,Solids,Chloramines,Sulfate,Conductivity,Organic_carbon,Trihalomethanes,Turbidity,Potability\n";

    #[test]
    fn drops_rows_with_missing_values() {
        let csv = format!(
            "{HEADER}\
             7.0,200,20000,7,330,420,14,66,4,1\n\
             ,180,15000,6,300,400,12,60,3,0\n\
             8.1,190,18000,7.5,,410,13,70,4.2,0\n\
             6.9,210,21000,7.1,340,430,15,67,3.9,0\n"
        );
        let corpus = TrainingCorpus::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.dropped(), 2);
        assert_eq!(corpus.count_label(Potability::Potable), 1);
        assert_eq!(corpus.rows()[1].sample.get(Feature::Hardness), 210.0);
    }

    #[test]
    fn column_order_follows_the_header() {
        let csv = "Potability,Turbidity,Trihalomethanes,Organic_carbon,Conductivity,Sulfate,Chloramines,Solids,Hardness,pH\n\
                   1,4,66,14,420,330,7,20000,200,7.2\n";
        let corpus = TrainingCorpus::from_reader(csv.as_bytes()).unwrap();
        let s = corpus.rows()[0].sample;
        assert_eq!(s.get(Feature::Ph), 7.2);
        assert_eq!(s.get(Feature::Turbidity), 4.0);
        assert_eq!(corpus.rows()[0].label, Potability::Potable);
    }

    #[test]
    fn rejects_missing_column_and_bad_label() {
        let err = TrainingCorpus::from_reader("ph,Potability\n7,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CorpusError::MissingColumn("Hardness")));

        let csv = format!("{HEADER}7.0,200,20000,7,330,420,14,66,4,2\n");
        let err = TrainingCorpus::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidLabel { .. }));
    }

    #[test]
    fn describe_reports_mean_and_spread() {
        let csv = format!(
            "{HEADER}\
             6.0,100,1000,1,100,100,1,10,1,0\n\
             8.0,300,3000,3,300,300,3,30,3,1\n"
        );
        let corpus = TrainingCorpus::from_reader(csv.as_bytes()).unwrap();
        let table = corpus.describe();
        let ph = &table[Feature::Ph.index()];
        assert_eq!(ph.count, 2);
        assert!((ph.mean - 7.0).abs() < 1e-12);
        assert!((ph.std - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(ph.min, 6.0);
        assert_eq!(ph.max, 8.0);
    }
}
