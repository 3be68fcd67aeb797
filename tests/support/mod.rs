#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use http::{header, Request, StatusCode};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt; // for `oneshot`

use aquasentry::alerts::{AlertDispatcher, HealthAlert, Notifier, DEFAULT_MIN_SEVERITY};
use aquasentry::classifier::TrainingParams;
use aquasentry::corpus::{LabeledSample, TrainingCorpus};
use aquasentry::forest::ForestParams;
use aquasentry::predictor::Predictor;
use aquasentry::sentinel::{encode_png, BoundingBox, FetchedImage, ImageSource};
use aquasentry::server::{self, AppState};
use aquasentry::store::{MediaDir, MemoryStore};
use aquasentry::types::{Potability, Sample};

/// Potable rows sit at neutral pH with low solids; the rest are acidic and
/// heavily mineralised.
pub fn corpus() -> TrainingCorpus {
    let rows = (0..80)
        .map(|i| {
            let t = i as f64;
            let potable = i % 4 == 0;
            let ph = if potable { 6.8 + (t % 10.0) * 0.12 } else { 4.0 + (t % 10.0) * 0.2 };
            let solids = if potable { 400.0 + t * 3.0 } else { 15000.0 + t * 50.0 };
            LabeledSample {
                sample: Sample::new([ph, 190.0 + t, solids, 7.0, 320.0, 420.0, 14.0, 66.0, 3.5 + (t % 5.0) * 0.3]),
                label: if potable { Potability::Potable } else { Potability::NotPotable },
            }
        })
        .collect();
    TrainingCorpus::from_rows(rows)
}

pub struct ChannelNotifier(pub mpsc::UnboundedSender<HealthAlert>);

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, alert: &HealthAlert) -> Result<()> {
        self.0.send(alert.clone())?;
        Ok(())
    }
}

/// Accepts the alert and never finishes sending it.
pub struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    async fn send(&self, _alert: &HealthAlert) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _alert: &HealthAlert) -> Result<()> {
        anyhow::bail!("webhook returned 502")
    }
}

/// Returns a fixed all-green scene tagged with the requested location.
pub struct FakeSatellite;

#[async_trait]
impl ImageSource for FakeSatellite {
    async fn fetch(&self, _bbox: BoundingBox, location_name: &str) -> Result<FetchedImage> {
        Ok(FetchedImage {
            png: green_png(),
            location_name: location_name.to_string(),
            simulated: true,
        })
    }
}

pub struct DownSatellite;

#[async_trait]
impl ImageSource for DownSatellite {
    async fn fetch(&self, _bbox: BoundingBox, _location_name: &str) -> Result<FetchedImage> {
        anyhow::bail!("token request rejected")
    }
}

pub fn solid_png(color: [u8; 3]) -> Vec<u8> {
    encode_png(&RgbImage::from_pixel(16, 16, Rgb(color))).unwrap()
}

pub fn green_png() -> Vec<u8> {
    solid_png([20, 160, 30])
}

pub fn blue_png() -> Vec<u8> {
    solid_png([0, 100, 200])
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub alerts: mpsc::UnboundedReceiver<HealthAlert>,
    pub media: tempfile::TempDir,
}

pub fn app_with(satellite: Arc<dyn ImageSource>) -> TestApp {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut app = build(satellite, Arc::new(ChannelNotifier(tx)));
    app.alerts = rx;
    app
}

/// Alerts go to `notifier`; the `alerts` receiver stays empty.
pub fn app_with_notifier(notifier: Arc<dyn Notifier>) -> TestApp {
    build(Arc::new(FakeSatellite), notifier)
}

fn build(satellite: Arc<dyn ImageSource>, notifier: Arc<dyn Notifier>) -> TestApp {
    let corpus = corpus();
    let params = TrainingParams {
        forest: ForestParams {
            n_estimators: 25,
            ..ForestParams::default()
        },
        ..TrainingParams::default()
    };
    let predictor = Predictor::train(&corpus, &params).unwrap();
    let (_, rx) = mpsc::unbounded_channel();
    let media = tempfile::tempdir().unwrap();
    let state = Arc::new(AppState::new(
        predictor,
        &corpus,
        Arc::new(MemoryStore::new()),
        MediaDir::new(media.path()),
        AlertDispatcher::new(notifier, DEFAULT_MIN_SEVERITY),
        satellite,
    ));
    TestApp {
        router: server::router(Arc::clone(&state)),
        state,
        alerts: rx,
        media,
    }
}

pub fn app() -> TestApp {
    app_with(Arc::new(FakeSatellite))
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    pub async fn json(&self, method: &str, uri: &str, payload: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match payload {
            Some(p) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&p).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, body) = self.send(req).await;
        let value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }
}
