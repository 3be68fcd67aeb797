use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::InputError;

pub const FEATURE_COUNT: usize = 9;

/// The nine water-quality parameters, in training-column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    Ph,
    Hardness,
    Solids,
    Chloramines,
    Sulfate,
    Conductivity,
    OrganicCarbon,
    Trihalomethanes,
    Turbidity,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::Ph,
        Feature::Hardness,
        Feature::Solids,
        Feature::Chloramines,
        Feature::Sulfate,
        Feature::Conductivity,
        Feature::OrganicCarbon,
        Feature::Trihalomethanes,
        Feature::Turbidity,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Column name used by the dataset and the JSON API.
    pub const fn column(self) -> &'static str {
        match self {
            Feature::Ph => "ph",
            Feature::Hardness => "Hardness",
            Feature::Solids => "Solids",
            Feature::Chloramines => "Chloramines",
            Feature::Sulfate => "Sulfate",
            Feature::Conductivity => "Conductivity",
            Feature::OrganicCarbon => "Organic_carbon",
            Feature::Trihalomethanes => "Trihalomethanes",
            Feature::Turbidity => "Turbidity",
        }
    }

    /// Physically meaningful range accepted from callers.
    pub const fn accepted_range(self) -> (f64, f64) {
        match self {
            Feature::Ph => (0.0, 14.0),
            _ => (0.0, f64::MAX),
        }
    }

    /// Case-insensitive lookup by column name.
    pub fn from_column(name: &str) -> Option<Feature> {
        Feature::ALL
            .into_iter()
            .find(|f| f.column().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.column())
    }
}

/// A fully populated feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    values: [f64; FEATURE_COUNT],
}

impl Sample {
    pub const fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub fn set(&mut self, feature: Feature, value: f64) {
        self.values[feature.index()] = value;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(FEATURE_COUNT))?;
        for f in Feature::ALL {
            map.serialize_entry(f.column(), &self.get(f))?;
        }
        map.end()
    }
}

/// A sample where any subset of fields may be unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialSample {
    values: [Option<f64>; FEATURE_COUNT],
}

impl PartialSample {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        self.values[feature.index()] = Some(value);
        self
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values[feature.index()]
    }

    /// The fields the caller actually supplied.
    pub fn known(&self) -> KnownFields {
        KnownFields(
            Feature::ALL
                .into_iter()
                .filter(|f| self.get(*f).is_some())
                .collect(),
        )
    }

    /// Builds a partial sample from named fields, validating every value.
    /// `None` marks a field as explicitly unknown.
    pub fn from_fields<'a, I>(fields: I) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = (&'a str, Option<f64>)>,
    {
        let mut out = Self::default();
        let mut seen = BTreeSet::new();
        for (name, value) in fields {
            let feature =
                Feature::from_column(name).ok_or_else(|| InputError::UnknownField(name.to_string()))?;
            if !seen.insert(feature) {
                return Err(InputError::DuplicateField(feature.column()));
            }
            let Some(value) = value else { continue };
            if !value.is_finite() {
                return Err(InputError::NotFinite(feature.column()));
            }
            let (min, max) = feature.accepted_range();
            if value < min || value > max {
                return Err(InputError::OutOfRange {
                    field: feature.column(),
                    value,
                    min,
                    max,
                });
            }
            out.values[feature.index()] = Some(value);
        }
        Ok(out)
    }
}

impl From<Sample> for PartialSample {
    fn from(sample: Sample) -> Self {
        let mut out = Self::default();
        for f in Feature::ALL {
            out.values[f.index()] = Some(sample.get(f));
        }
        out
    }
}

/// Names of the fields a caller measured, as opposed to imputed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KnownFields(BTreeSet<Feature>);

impl KnownFields {
    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Feature> for KnownFields {
    fn from_iter<T: IntoIterator<Item = Feature>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Dataset label. Class index 1 is potable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Potability {
    NotPotable = 0,
    Potable = 1,
}

impl Potability {
    pub const fn class_index(self) -> usize {
        self as usize
    }

    pub fn from_class_index(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Potability::NotPotable),
            1 => Some(Potability::Potable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Safe,
    Unsafe,
}

impl From<Potability> for Verdict {
    fn from(p: Potability) -> Self {
        match p {
            Potability::Potable => Verdict::Safe,
            Potability::NotPotable => Verdict::Unsafe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lookup_is_case_insensitive() {
        assert_eq!(Feature::from_column("pH"), Some(Feature::Ph));
        assert_eq!(Feature::from_column("organic_carbon"), Some(Feature::OrganicCarbon));
        assert_eq!(Feature::from_column("lead"), None);
    }

    #[test]
    fn from_fields_tracks_known_and_skips_nulls() {
        let p = PartialSample::from_fields([("Hardness", Some(200.0)), ("ph", None)]).unwrap();
        assert_eq!(p.get(Feature::Hardness), Some(200.0));
        assert_eq!(p.get(Feature::Ph), None);
        let known = p.known();
        assert_eq!(known.len(), 1);
        assert!(known.contains(Feature::Hardness));
    }

    #[test]
    fn from_fields_names_the_offending_field() {
        let err = PartialSample::from_fields([("ph", Some(15.0))]).unwrap_err();
        assert!(err.to_string().contains("ph"));

        let err = PartialSample::from_fields([("Solids", Some(-1.0))]).unwrap_err();
        assert!(err.to_string().contains("Solids"));

        let err = PartialSample::from_fields([("Nitrate", Some(1.0))]).unwrap_err();
        assert!(err.to_string().contains("Nitrate"));

        let err = PartialSample::from_fields([("ph", Some(7.0)), ("PH", Some(7.1))]).unwrap_err();
        assert!(matches!(err, InputError::DuplicateField("ph")));
    }

    #[test]
    fn sample_serializes_as_named_map() {
        let s = Sample::new([7.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.5, 8.0]);
        let v = serde_json::to_value(s).unwrap();
        assert_eq!(v["ph"], 7.0);
        assert_eq!(v["Turbidity"], 8.0);
        assert_eq!(v.as_object().unwrap().len(), FEATURE_COUNT);
    }
}
