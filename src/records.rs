//! Monitoring records: sensor readings, satellite scans, health reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InputError;
use crate::explain::{PH_SAFE_MAX, PH_SAFE_MIN, TURBIDITY_MAX};

pub type RecordId = u64;

/// A reading is anomalous when pH leaves [6.5, 8.5] or turbidity is
/// strictly above 5.0.
pub fn reading_is_anomalous(ph: f64, turbidity: f64) -> bool {
    ph < PH_SAFE_MIN || ph > PH_SAFE_MAX || turbidity > TURBIDITY_MAX
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorStatus {
    Critical,
    Safe,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSensorReading {
    pub sensor_id: String,
    pub ph: f64,
    pub turbidity: f64,
    pub temperature: f64,
    pub dissolved_oxygen: f64,
    pub conductivity: f64,
}

const PH_RANGE: (f64, f64) = (0.0, 14.0);
const NON_NEGATIVE: (f64, f64) = (0.0, f64::MAX);
/// Liquid water, in degrees Celsius.
const TEMPERATURE_RANGE: (f64, f64) = (-5.0, 100.0);

impl NewSensorReading {
    pub fn validate(&self) -> Result<(), InputError> {
        let id = self.sensor_id.trim();
        if id.is_empty() || id.len() > 50 {
            return Err(InputError::Invalid("sensorId must be 1 to 50 characters".into()));
        }
        for (field, value, (min, max)) in [
            ("ph", self.ph, PH_RANGE),
            ("turbidity", self.turbidity, NON_NEGATIVE),
            ("temperature", self.temperature, TEMPERATURE_RANGE),
            ("dissolvedOxygen", self.dissolved_oxygen, NON_NEGATIVE),
            ("conductivity", self.conductivity, NON_NEGATIVE),
        ] {
            if !value.is_finite() {
                return Err(InputError::NotFinite(field));
            }
            if value < min || value > max {
                return Err(InputError::OutOfRange { field, value, min, max });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub id: RecordId,
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub ph: f64,
    pub turbidity: f64,
    pub temperature: f64,
    pub dissolved_oxygen: f64,
    pub conductivity: f64,
    pub status: SensorStatus,
}

impl SensorReading {
    pub fn from_new(id: RecordId, timestamp: DateTime<Utc>, new: NewSensorReading) -> Self {
        let status = if reading_is_anomalous(new.ph, new.turbidity) {
            SensorStatus::Critical
        } else {
            SensorStatus::Safe
        };
        Self {
            id,
            sensor_id: new.sensor_id,
            timestamp,
            ph: new.ph,
            turbidity: new.turbidity,
            temperature: new.temperature,
            dissolved_oxygen: new.dissolved_oxygen,
            conductivity: new.conductivity,
            status,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        reading_is_anomalous(self.ph, self.turbidity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SymptomType {
    Gi,
    Neuro,
    Derm,
    Other,
}

impl SymptomType {
    pub const fn display_name(self) -> &'static str {
        match self {
            SymptomType::Gi => "Gastrointestinal (Diarrhea, Vomiting)",
            SymptomType::Neuro => "Neurological (Dizziness, Seizures)",
            SymptomType::Derm => "Dermatological (Rashes, Itching)",
            SymptomType::Other => "Other",
        }
    }
}

impl fmt::Display for SymptomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

fn default_severity() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHealthReport {
    pub symptom_type: SymptomType,
    #[serde(default = "default_severity")]
    pub severity: u8,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewHealthReport {
    pub fn validate(&self) -> Result<(), InputError> {
        if !(1..=10).contains(&self.severity) {
            return Err(InputError::Invalid(format!(
                "severity must be between 1 and 10, got {}",
                self.severity
            )));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(InputError::Invalid("latitude must be within [-90, 90]".into()));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(InputError::Invalid("longitude must be within [-180, 180]".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub id: RecordId,
    pub submitted_at: DateTime<Utc>,
    pub symptom_type: SymptomType,
    pub severity: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub notes: Option<String>,
}

impl HealthReport {
    pub fn from_new(id: RecordId, submitted_at: DateTime<Utc>, new: NewHealthReport) -> Self {
        Self {
            id,
            submitted_at,
            symptom_type: new.symptom_type,
            severity: new.severity,
            latitude: new.latitude,
            longitude: new.longitude,
            notes: new.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

pub const DEFAULT_LOCATION: &str = "Unknown Location";

#[derive(Debug, Clone, PartialEq)]
pub struct NewSatelliteScan {
    /// Path of the stored image, relative to the media root.
    pub image: String,
    pub chlorophyll_index: f64,
    pub turbidity_index: f64,
    pub risk_score: f64,
    pub location_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SatelliteScan {
    pub id: RecordId,
    pub image: String,
    pub captured_at: DateTime<Utc>,
    pub chlorophyll_index: f64,
    pub turbidity_index: f64,
    pub risk_score: f64,
    pub location_name: String,
}

impl SatelliteScan {
    pub fn from_new(id: RecordId, captured_at: DateTime<Utc>, new: NewSatelliteScan) -> Self {
        Self {
            id,
            image: new.image,
            captured_at,
            chlorophyll_index: new.chlorophyll_index,
            turbidity_index: new.turbidity_index,
            risk_score: new.risk_score,
            location_name: new.location_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(ph: f64, turbidity: f64) -> NewSensorReading {
        NewSensorReading {
            sensor_id: "SENSOR-001".into(),
            ph,
            turbidity,
            temperature: 24.0,
            dissolved_oxygen: 7.5,
            conductivity: 450.0,
        }
    }

    #[test]
    fn status_uses_strict_turbidity_and_inclusive_ph() {
        let at = Utc::now();
        assert_eq!(SensorReading::from_new(1, at, reading(6.5, 5.0)).status, SensorStatus::Safe);
        assert_eq!(SensorReading::from_new(2, at, reading(8.5, 1.0)).status, SensorStatus::Safe);
        assert_eq!(SensorReading::from_new(3, at, reading(7.0, 5.01)).status, SensorStatus::Critical);
        assert_eq!(SensorReading::from_new(4, at, reading(6.49, 1.0)).status, SensorStatus::Critical);
    }

    #[test]
    fn sensor_status_serializes_uppercase() {
        let r = SensorReading::from_new(1, Utc::now(), reading(9.0, 1.0));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "CRITICAL");
        assert_eq!(v["sensorId"], "SENSOR-001");
    }

    #[test]
    fn sensor_validation_names_out_of_range_fields() {
        assert!(reading(7.0, 0.0).validate().is_ok());

        let err = reading(40.0, 1.0).validate().unwrap_err();
        assert!(matches!(err, InputError::OutOfRange { field: "ph", .. }));
        let err = reading(7.0, -0.5).validate().unwrap_err();
        assert!(matches!(err, InputError::OutOfRange { field: "turbidity", .. }));
        let err = reading(7.0, f64::NAN).validate().unwrap_err();
        assert_eq!(err, InputError::NotFinite("turbidity"));

        let mut r = reading(7.0, 1.0);
        r.conductivity = -10.0;
        assert!(r.validate().unwrap_err().to_string().contains("`conductivity`"));
    }

    #[test]
    fn health_report_validation() {
        let mut report: NewHealthReport =
            serde_json::from_str(r#"{"symptomType":"GI","latitude":12.9,"longitude":77.6}"#).unwrap();
        assert_eq!(report.severity, 1);
        assert!(report.validate().is_ok());

        report.severity = 11;
        assert!(report.validate().is_err());
        report.severity = 5;
        report.latitude = 91.0;
        assert!(report.validate().is_err());
    }

    #[test]
    fn symptom_types_use_short_codes() {
        let t: SymptomType = serde_json::from_str(r#""NEURO""#).unwrap();
        assert_eq!(t, SymptomType::Neuro);
        assert_eq!(serde_json::to_value(SymptomType::Derm).unwrap(), "DERM");
    }
}
