//! HTTP surface.
//!
//! `AppState` is assembled once at start-up and shared by every handler
//! through `Arc`. The predictor and model summary are immutable; only the
//! record store changes after boot.

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;

use crate::alerts::{AlertDispatcher, LogNotifier, Notifier, WebhookNotifier};
use crate::classifier::{ClassificationReport, FeatureImportance};
use crate::config::ServeArgs;
use crate::corpus::{FeatureSummary, TrainingCorpus};
use crate::handlers;
use crate::predictor::Predictor;
use crate::sentinel::{ImageSource, SentinelClient};
use crate::simulator;
use crate::store::{MediaDir, MemoryStore};
use crate::types::Sample;

/// Largest accepted satellite upload.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassWeights {
    pub not_potable: f64,
    pub potable: f64,
}

/// Training summary served by `GET /api/model`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub accuracy: f64,
    pub report: ClassificationReport,
    pub feature_importances: Vec<FeatureImportance>,
    pub feature_means: Sample,
    pub class_weights: ClassWeights,
    pub train_size: usize,
    pub test_size: usize,
    pub trees: usize,
    pub corpus_rows: usize,
    pub dropped_rows: usize,
}

impl ModelInfo {
    pub fn new(predictor: &Predictor, corpus: &TrainingCorpus) -> Self {
        let model = predictor.model();
        let report = model.report();
        let [not_potable, potable] = model.class_weights();
        Self {
            accuracy: report.accuracy,
            report,
            feature_importances: model.feature_importances(),
            feature_means: *predictor.imputer().means(),
            class_weights: ClassWeights { not_potable, potable },
            train_size: model.train_size(),
            test_size: model.held_out().len(),
            trees: model.forest().n_trees(),
            corpus_rows: corpus.len(),
            dropped_rows: corpus.dropped(),
        }
    }
}

pub struct AppState {
    pub predictor: Predictor,
    pub model_info: ModelInfo,
    pub corpus_summary: Vec<FeatureSummary>,
    pub store: Arc<MemoryStore>,
    pub media: MediaDir,
    pub alerts: AlertDispatcher,
    pub satellite: Arc<dyn ImageSource>,
}

impl AppState {
    pub fn new(
        predictor: Predictor,
        corpus: &TrainingCorpus,
        store: Arc<MemoryStore>,
        media: MediaDir,
        alerts: AlertDispatcher,
        satellite: Arc<dyn ImageSource>,
    ) -> Self {
        Self {
            model_info: ModelInfo::new(&predictor, corpus),
            corpus_summary: corpus.describe(),
            predictor,
            store,
            media,
            alerts,
            satellite,
        }
    }
}

/// Loads the corpus, trains the model and wires the collaborators.
///
/// Any corpus or model problem aborts start-up.
pub fn bootstrap(args: &ServeArgs) -> Result<Arc<AppState>> {
    let corpus = TrainingCorpus::from_csv_path(&args.training.data)?;
    let predictor = Predictor::train(&corpus, &args.training.params()).context("training potability model")?;

    let notifier: Arc<dyn Notifier> = match &args.alert_webhook {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone(), args.alert_timeout_ms)?),
        None => {
            tracing::warn!("no alert webhook configured; alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let alerts = AlertDispatcher::new(notifier, args.alert_min_severity);
    tracing::info!(min_severity = alerts.min_severity(), "alerts.configured");

    let satellite = Arc::new(SentinelClient::new(
        args.sentinel_credentials(),
        args.sentinel_qps,
        args.sentinel_timeout_ms,
    )?);

    let state = AppState::new(
        predictor,
        &corpus,
        Arc::new(MemoryStore::new()),
        MediaDir::new(&args.media_dir),
        alerts,
        satellite,
    );
    tracing::info!(
        accuracy = state.model_info.accuracy,
        test_size = state.model_info.test_size,
        "model.evaluated"
    );
    Ok(Arc::new(state))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/predict", post(handlers::predict))
        .route("/api/model", get(handlers::model_info))
        .route("/api/model/corpus", get(handlers::corpus_summary))
        .route("/api/dashboard-stats", get(handlers::dashboard_stats))
        .route("/api/sensors", get(handlers::list_sensors).post(handlers::create_sensor))
        .route(
            "/api/sensors/:id",
            get(handlers::get_sensor)
                .put(handlers::update_sensor)
                .delete(handlers::delete_sensor),
        )
        .route(
            "/api/health-reports",
            get(handlers::list_reports).post(handlers::create_report),
        )
        .route(
            "/api/health-reports/:id",
            get(handlers::get_report)
                .put(handlers::update_report)
                .delete(handlers::delete_report),
        )
        .route(
            "/api/satellite",
            get(handlers::list_scans)
                .post(handlers::upload_scan)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/api/satellite/fetch_live", post(handlers::fetch_live))
        .route(
            "/api/satellite/:id",
            get(handlers::get_scan).delete(handlers::delete_scan),
        )
        .route("/api/satellite/:id/image", get(handlers::scan_image))
        .with_state(state)
}

pub async fn run_server(args: ServeArgs) -> Result<()> {
    let state = bootstrap(&args)?;
    if args.simulate {
        simulator::spawn(Arc::clone(&state.store), args.simulator_config());
    }
    tracing::info!(media = %state.media.root().display(), "media.ready");
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    tracing::info!(addr = %args.bind, "server.listening");
    axum::serve(listener, app).await?;
    Ok(())
}
