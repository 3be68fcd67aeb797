//! Explanations for unsafe predictions.
//!
//! A fixed, ordered list of domain rules is evaluated against the fields
//! the caller actually measured. Imputed values are never cited. List
//! position is the priority: the first rule that fires is the primary
//! reason, regardless of how far each value is out of range.

use serde::Serialize;

use crate::types::{Feature, KnownFields, Sample, Verdict};

pub const PH_SAFE_MIN: f64 = 6.5;
pub const PH_SAFE_MAX: f64 = 8.5;
pub const SOLIDS_MAX: f64 = 1000.0;
pub const SULFATE_MAX: f64 = 250.0;
pub const TURBIDITY_MAX: f64 = 5.0;

pub struct Rule {
    pub feature: Feature,
    pub bound: &'static str,
    violated: fn(f64) -> bool,
    describe: fn(f64) -> String,
}

pub static RULES: [Rule; 4] = [
    Rule {
        feature: Feature::Ph,
        bound: "6.5 to 8.5",
        violated: |v| !(PH_SAFE_MIN..=PH_SAFE_MAX).contains(&v),
        describe: |v| format!("the user-provided pH level ({v:.2}) is outside the safe range of 6.5 to 8.5"),
    },
    Rule {
        feature: Feature::Solids,
        bound: "at most 1000 ppm",
        violated: |v| v > SOLIDS_MAX,
        describe: |v| format!("the user-provided Total Dissolved Solids ({v:.0} ppm) are above 1000 ppm"),
    },
    Rule {
        feature: Feature::Sulfate,
        bound: "at most 250 mg/L",
        violated: |v| v > SULFATE_MAX,
        describe: |v| format!("the user-provided Sulfate level ({v:.2} mg/L) is above 250 mg/L"),
    },
    Rule {
        feature: Feature::Turbidity,
        bound: "at most 5 NTU",
        violated: |v| v > TURBIDITY_MAX,
        describe: |v| format!("the user-provided Turbidity ({v:.2} NTU) is above 5 NTU"),
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reason {
    pub field: Feature,
    pub value: f64,
    pub bound: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Explanation {
    /// The first rule, in list order, that a known field violates.
    Rule { reason: Reason, summary: String },
    /// No known field violates a rule.
    MultipleFactors { summary: String },
}

impl Explanation {
    pub fn summary(&self) -> &str {
        match self {
            Explanation::Rule { summary, .. } | Explanation::MultipleFactors { summary } => summary,
        }
    }

    pub fn primary_reason(&self) -> Option<&Reason> {
        match self {
            Explanation::Rule { reason, .. } => Some(reason),
            Explanation::MultipleFactors { .. } => None,
        }
    }
}

/// Every rule that fires on a known field, in priority order.
pub fn candidate_reasons(sample: &Sample, known: &KnownFields) -> Vec<Reason> {
    RULES
        .iter()
        .filter(|rule| known.contains(rule.feature))
        .filter_map(|rule| {
            let value = sample.get(rule.feature);
            (rule.violated)(value).then(|| Reason {
                field: rule.feature,
                value,
                bound: rule.bound,
                message: (rule.describe)(value),
            })
        })
        .collect()
}

/// Picks the primary explanation from already-ranked candidates.
pub fn primary(candidates: &[Reason]) -> Explanation {
    match candidates.first() {
        Some(reason) => Explanation::Rule {
            summary: format!("The water is likely unsafe because {}.", reason.message),
            reason: reason.clone(),
        },
        None => Explanation::MultipleFactors {
            summary: "Based on the provided data, a combination of factors indicates the water is unsafe.".to_string(),
        },
    }
}

/// Explains an unsafe verdict; safe verdicts need no explanation.
pub fn explain(sample: &Sample, verdict: Verdict, known: &KnownFields) -> Option<(Vec<Reason>, Explanation)> {
    if verdict == Verdict::Safe {
        return None;
    }
    let candidates = candidate_reasons(sample, known);
    let explanation = primary(&candidates);
    Some((candidates, explanation))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ph: f64, solids: f64, sulfate: f64, turbidity: f64) -> Sample {
        Sample::new([ph, 200.0, solids, 7.0, sulfate, 420.0, 14.0, 66.0, turbidity])
    }

    fn known(fields: &[Feature]) -> KnownFields {
        fields.iter().copied().collect()
    }

    #[test]
    fn list_position_beats_magnitude() {
        let s = sample(9.0, 2000.0, 100.0, 1.0);
        let (reasons, explanation) =
            explain(&s, Verdict::Unsafe, &known(&[Feature::Ph, Feature::Solids])).unwrap();
        assert_eq!(reasons.len(), 2);
        assert_eq!(explanation.primary_reason().unwrap().field, Feature::Ph);
        assert!(explanation.summary().contains("9.00"));
    }

    #[test]
    fn unknown_fields_never_fire() {
        let s = sample(9.0, 2000.0, 100.0, 1.0);
        let (reasons, explanation) = explain(&s, Verdict::Unsafe, &known(&[Feature::Solids])).unwrap();
        assert_eq!(reasons.len(), 1);
        assert_eq!(explanation.primary_reason().unwrap().field, Feature::Solids);
    }

    #[test]
    fn falls_back_to_multiple_factors() {
        let s = sample(7.0, 500.0, 100.0, 1.0);
        let (reasons, explanation) = explain(&s, Verdict::Unsafe, &known(&Feature::ALL)).unwrap();
        assert!(reasons.is_empty());
        assert!(matches!(explanation, Explanation::MultipleFactors { .. }));

        // Out-of-range values that were imputed do not count.
        let s = sample(3.0, 5000.0, 400.0, 9.0);
        let (_, explanation) = explain(&s, Verdict::Unsafe, &KnownFields::default()).unwrap();
        assert!(explanation.primary_reason().is_none());
    }

    #[test]
    fn boundaries_are_inside_the_safe_range() {
        let all = known(&Feature::ALL);
        for ph in [6.5, 8.5] {
            assert!(candidate_reasons(&sample(ph, 500.0, 100.0, 1.0), &all).is_empty());
        }
        assert!(candidate_reasons(&sample(7.0, 1000.0, 250.0, 5.0), &all).is_empty());

        let fired = candidate_reasons(&sample(6.49, 1000.01, 250.01, 5.01), &all);
        let fields: Vec<Feature> = fired.iter().map(|r| r.field).collect();
        assert_eq!(
            fields,
            vec![Feature::Ph, Feature::Solids, Feature::Sulfate, Feature::Turbidity]
        );
    }

    #[test]
    fn safe_verdicts_are_not_explained() {
        let s = sample(9.0, 2000.0, 100.0, 1.0);
        assert!(explain(&s, Verdict::Safe, &known(&Feature::ALL)).is_none());
    }
}
