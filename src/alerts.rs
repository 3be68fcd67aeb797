//! Health-report alerting.
//!
//! Dispatch is fire-and-forget: the alert is sent on a detached task and
//! its outcome is only logged. Submitting a report never waits on it.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::records::HealthReport;

pub const DEFAULT_MIN_SEVERITY: u8 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct HealthAlert {
    pub subject: String,
    pub body: String,
    pub report: HealthReport,
}

impl HealthAlert {
    pub fn for_report(report: &HealthReport) -> Self {
        let category = report.symptom_type.display_name();
        let subject = format!("URGENT: High Severity Health Alert - {category}");
        let body = format!(
            "CRITICAL HEALTH ALERT\n\
             --------------------------------------------------\n\
             A high-severity health issue has been reported in the monitoring system.\n\n\
             Category: {category}\n\
             Severity: {severity}/10\n\
             Location: Lat {lat}, Lon {lon}\n\
             Timestamp: {at}\n\n\
             Notes:\n{notes}\n\n\
             --------------------------------------------------\n\
             Please investigate immediately.\n\
             Sent via AquaSentry.\n",
            severity = report.severity,
            lat = report.latitude,
            lon = report.longitude,
            at = report.submitted_at.to_rfc3339(),
            notes = report.notes.as_deref().unwrap_or("(none)"),
        );
        Self {
            subject,
            body,
            report: report.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &HealthAlert) -> Result<()>;
}

/// Records alerts in the log instead of delivering them.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, alert: &HealthAlert) -> Result<()> {
        tracing::warn!(
            report = alert.report.id,
            severity = alert.report.severity,
            subject = %alert.subject,
            "alert.simulated (no webhook configured)\n{}",
            alert.body
        );
        Ok(())
    }
}

/// POSTs the alert as JSON to a webhook.
pub struct WebhookNotifier {
    http: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout_ms: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("building webhook HTTP client")?;
        Ok(Self { http, url })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, alert: &HealthAlert) -> Result<()> {
        self.http
            .post(&self.url)
            .json(alert)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    min_severity: u8,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, min_severity: u8) -> Self {
        Self {
            notifier,
            min_severity,
        }
    }

    pub fn min_severity(&self) -> u8 {
        self.min_severity
    }

    /// Spawns a detached send when the report is severe enough. Returns
    /// whether an alert was dispatched. Must run inside a tokio runtime.
    pub fn dispatch(&self, report: &HealthReport) -> bool {
        if report.severity < self.min_severity {
            tracing::debug!(report = report.id, severity = report.severity, "alert.below_threshold");
            return false;
        }
        let alert = HealthAlert::for_report(report);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            match notifier.send(&alert).await {
                Ok(()) => tracing::info!(report = alert.report.id, "alert.sent"),
                Err(e) => tracing::error!(report = alert.report.id, error = %e, "alert.failed"),
            }
        });
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::records::{NewHealthReport, SymptomType};
    use chrono::Utc;
    use tokio::sync::mpsc;

    pub(crate) struct ChannelNotifier(pub mpsc::UnboundedSender<HealthAlert>);

    #[async_trait::async_trait]
    impl Notifier for ChannelNotifier {
        async fn send(&self, alert: &HealthAlert) -> Result<()> {
            self.0.send(alert.clone())?;
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait::async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _alert: &HealthAlert) -> Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    fn report(severity: u8) -> HealthReport {
        HealthReport::from_new(
            3,
            Utc::now(),
            NewHealthReport {
                symptom_type: SymptomType::Neuro,
                severity,
                latitude: 19.07,
                longitude: 72.87,
                notes: Some("dizziness after drinking tap water".into()),
            },
        )
    }

    #[tokio::test]
    async fn severe_reports_are_sent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = AlertDispatcher::new(Arc::new(ChannelNotifier(tx)), DEFAULT_MIN_SEVERITY);
        assert!(dispatcher.dispatch(&report(8)));
        let alert = rx.recv().await.unwrap();
        assert!(alert.subject.contains("Neurological"));
        assert!(alert.body.contains("Severity: 8/10"));
        assert!(alert.body.contains("dizziness"));
    }

    #[tokio::test]
    async fn mild_reports_are_not_sent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = AlertDispatcher::new(Arc::new(ChannelNotifier(tx)), DEFAULT_MIN_SEVERITY);
        assert!(!dispatcher.dispatch(&report(6)));
        drop(dispatcher);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let dispatcher = AlertDispatcher::new(Arc::new(FailingNotifier), 1);
        assert!(dispatcher.dispatch(&report(2)));
        tokio::task::yield_now().await;
    }
}
