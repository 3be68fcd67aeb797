//! Overall risk status for the dashboard.
//!
//! A stateless reduction over the latest satellite scan and the most
//! recent sensor and health windows. Nothing is smoothed or remembered
//! between calls.

use serde::Serialize;

use crate::records::{HealthReport, SensorReading};

/// How many recent sensor readings and health reports are considered.
pub const RECENT_WINDOW: usize = 10;

pub const SEVERE_HEALTH_REPORT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    Critical,
}

impl RiskLevel {
    pub const fn message(self) -> &'static str {
        match self {
            RiskLevel::Low => "Systems Nominal",
            RiskLevel::Moderate => "Elevated Risk Detected",
            RiskLevel::Critical => "Immediate Action Required",
        }
    }

    pub const fn color(self) -> &'static str {
        match self {
            RiskLevel::Low => "text-green-400",
            RiskLevel::Moderate => "text-yellow-400",
            RiskLevel::Critical => "text-red-500",
        }
    }
}

/// Maps the three signals to a level.
pub fn classify(satellite_risk: f64, sensor_issues: usize, health_issues: usize) -> RiskLevel {
    if satellite_risk > 70.0 || sensor_issues > 2 || health_issues > 2 {
        RiskLevel::Critical
    } else if satellite_risk > 40.0 || sensor_issues > 0 || health_issues > 0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSummary {
    pub overall: RiskLevel,
    pub satellite_risk: f64,
    pub satellite_scan_available: bool,
    pub sensor_issues: usize,
    pub health_issues: usize,
}

/// Aggregates the recent windows. A missing satellite scan counts as risk 0.
pub fn aggregate(satellite_risk: Option<f64>, sensors: &[SensorReading], reports: &[HealthReport]) -> StatusSummary {
    let sensor_issues = sensors.iter().filter(|s| s.is_anomalous()).count();
    let health_issues = reports
        .iter()
        .filter(|r| r.severity > SEVERE_HEALTH_REPORT)
        .count();
    let risk = satellite_risk.unwrap_or(0.0);
    StatusSummary {
        overall: classify(risk, sensor_issues, health_issues),
        satellite_risk: risk,
        satellite_scan_available: satellite_risk.is_some(),
        sensor_issues,
        health_issues,
    }
}

/// Payload of the dashboard status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub overall_risk: RiskLevel,
    pub status_message: &'static str,
    pub status_color: &'static str,
    pub satellite_alerts: u32,
    pub sensor_anomalies: usize,
    pub health_reports: usize,
    pub satellite_risk: f64,
    pub satellite_scan_available: bool,
}

impl DashboardStats {
    pub fn new(summary: &StatusSummary, total_health_reports: usize) -> Self {
        Self {
            overall_risk: summary.overall,
            status_message: summary.overall.message(),
            status_color: summary.overall.color(),
            satellite_alerts: u32::from(summary.satellite_risk > 50.0),
            sensor_anomalies: summary.sensor_issues,
            health_reports: total_health_reports,
            satellite_risk: summary.satellite_risk,
            satellite_scan_available: summary.satellite_scan_available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{NewHealthReport, NewSensorReading, SymptomType};
    use chrono::Utc;

    fn sensor(ph: f64, turbidity: f64) -> SensorReading {
        SensorReading::from_new(
            1,
            Utc::now(),
            NewSensorReading {
                sensor_id: "S".into(),
                ph,
                turbidity,
                temperature: 25.0,
                dissolved_oxygen: 7.0,
                conductivity: 400.0,
            },
        )
    }

    fn report(severity: u8) -> HealthReport {
        HealthReport::from_new(
            1,
            Utc::now(),
            NewHealthReport {
                symptom_type: SymptomType::Gi,
                severity,
                latitude: 0.0,
                longitude: 0.0,
                notes: None,
            },
        )
    }

    #[test]
    fn satellite_alone_can_be_critical() {
        let s = aggregate(Some(80.0), &[], &[]);
        assert_eq!(s.overall, RiskLevel::Critical);
        assert_eq!((s.sensor_issues, s.health_issues), (0, 0));
    }

    #[test]
    fn one_sensor_issue_is_moderate() {
        let s = aggregate(None, &[sensor(9.0, 1.0), sensor(7.0, 1.0)], &[]);
        assert_eq!(s.sensor_issues, 1);
        assert_eq!(s.overall, RiskLevel::Moderate);
        assert!(!s.satellite_scan_available);
        assert_eq!(classify(0.0, 1, 0), RiskLevel::Moderate);
    }

    #[test]
    fn thresholds_are_strict() {
        assert_eq!(classify(70.0, 2, 2), RiskLevel::Moderate);
        assert_eq!(classify(70.1, 0, 0), RiskLevel::Critical);
        assert_eq!(classify(40.0, 0, 0), RiskLevel::Low);
        assert_eq!(classify(40.1, 0, 0), RiskLevel::Moderate);
        assert_eq!(classify(0.0, 3, 0), RiskLevel::Critical);
        assert_eq!(classify(0.0, 0, 3), RiskLevel::Critical);
    }

    #[test]
    fn turbidity_five_is_not_an_issue() {
        let s = aggregate(Some(0.0), &[sensor(6.5, 5.0), sensor(8.5, 5.0)], &[]);
        assert_eq!(s.sensor_issues, 0);
        assert_eq!(s.overall, RiskLevel::Low);

        let s = aggregate(Some(0.0), &[sensor(7.0, 5.000_1)], &[]);
        assert_eq!(s.sensor_issues, 1);
    }

    #[test]
    fn only_severity_above_five_counts() {
        let s = aggregate(None, &[], &[report(5), report(6), report(10)]);
        assert_eq!(s.health_issues, 2);
        assert_eq!(s.overall, RiskLevel::Moderate);
    }

    #[test]
    fn dashboard_payload_shape() {
        let s = aggregate(Some(55.0), &[], &[]);
        let stats = DashboardStats::new(&s, 4);
        let v = serde_json::to_value(&stats).unwrap();
        assert_eq!(v["overallRisk"], "MODERATE");
        assert_eq!(v["statusMessage"], "Elevated Risk Detected");
        assert_eq!(v["statusColor"], "text-yellow-400");
        assert_eq!(v["satelliteAlerts"], 1);
        assert_eq!(v["sensorAnomalies"], 0);
        assert_eq!(v["healthReports"], 4);
    }
}
