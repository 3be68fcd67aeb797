use axum::body::Bytes;
use axum::async_trait;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::corpus::FeatureSummary;
use crate::error::{ApiError, InputError};
use crate::imagery::{analyze_bytes, WaterAnalysis};
use crate::predictor::PredictionResult;
use crate::records::{
    HealthReport, NewHealthReport, NewSatelliteScan, NewSensorReading, RecordId, SatelliteScan, SensorReading,
    DEFAULT_LOCATION,
};
use crate::sentinel::BoundingBox;
use crate::server::{AppState, ModelInfo};
use crate::status::{aggregate, DashboardStats, RECENT_WINDOW};
use crate::types::PartialSample;

type ApiResult<T> = Result<T, ApiError>;

/// `Json` whose rejections render as `400 {"error": ...}`.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

// Prediction

/// Body: any subset of the nine parameters; `null` or absent means unknown.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> ApiResult<Json<PredictionResult>> {
    let mut fields = Vec::with_capacity(body.len());
    for (name, value) in &body {
        let value = match value {
            Value::Null => None,
            Value::Number(n) => Some(n.as_f64().ok_or_else(|| InputError::NotNumeric(name.clone()))?),
            _ => return Err(InputError::NotNumeric(name.clone()).into()),
        };
        fields.push((name.as_str(), value));
    }
    let input = PartialSample::from_fields(fields)?;
    Ok(Json(state.predictor.predict(&input)))
}

pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    Json(state.model_info.clone())
}

pub async fn corpus_summary(State(state): State<Arc<AppState>>) -> Json<Vec<FeatureSummary>> {
    Json(state.corpus_summary.clone())
}

// Dashboard

pub async fn dashboard_stats(State(state): State<Arc<AppState>>) -> Json<DashboardStats> {
    let store = &state.store;
    let satellite_risk = store.latest_scan().await.map(|s| s.risk_score);
    if satellite_risk.is_none() {
        tracing::debug!("dashboard.no_satellite_scan; treating risk as 0");
    }
    let sensors = store.recent_sensors(RECENT_WINDOW).await;
    let reports = store.recent_reports(RECENT_WINDOW).await;
    let summary = aggregate(satellite_risk, &sensors, &reports);
    Json(DashboardStats::new(&summary, store.count_reports().await))
}

// Sensors

pub async fn list_sensors(State(state): State<Arc<AppState>>) -> Json<Vec<SensorReading>> {
    Json(state.store.list_sensors().await)
}

pub async fn create_sensor(
    State(state): State<Arc<AppState>>,
    ApiJson(new): ApiJson<NewSensorReading>,
) -> ApiResult<(StatusCode, Json<SensorReading>)> {
    new.validate()?;
    let reading = state.store.insert_sensor(new).await;
    tracing::debug!(id = reading.id, sensor = %reading.sensor_id, status = ?reading.status, "sensor.created");
    Ok((StatusCode::CREATED, Json(reading)))
}

pub async fn get_sensor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<SensorReading>> {
    state
        .store
        .get_sensor(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("sensor reading"))
}

pub async fn update_sensor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
    ApiJson(new): ApiJson<NewSensorReading>,
) -> ApiResult<Json<SensorReading>> {
    new.validate()?;
    state
        .store
        .update_sensor(id, new)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("sensor reading"))
}

pub async fn delete_sensor(State(state): State<Arc<AppState>>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    if state.store.delete_sensor(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("sensor reading"))
    }
}

// Health reports

pub async fn list_reports(State(state): State<Arc<AppState>>) -> Json<Vec<HealthReport>> {
    Json(state.store.list_reports().await)
}

/// Stores the report, then hands severe ones to the alert dispatcher
/// without waiting for delivery.
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    ApiJson(new): ApiJson<NewHealthReport>,
) -> ApiResult<(StatusCode, Json<HealthReport>)> {
    new.validate()?;
    let report = state.store.insert_report(new).await;
    let alerted = state.alerts.dispatch(&report);
    tracing::info!(id = report.id, severity = report.severity, alerted, "health_report.created");
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<HealthReport>> {
    state
        .store
        .get_report(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("health report"))
}

pub async fn update_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
    ApiJson(new): ApiJson<NewHealthReport>,
) -> ApiResult<Json<HealthReport>> {
    new.validate()?;
    state
        .store
        .update_report(id, new)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("health report"))
}

pub async fn delete_report(State(state): State<Arc<AppState>>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    if state.store.delete_report(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("health report"))
    }
}

// Satellite scans

pub async fn list_scans(State(state): State<Arc<AppState>>) -> Json<Vec<SatelliteScan>> {
    Json(state.store.list_scans().await)
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    location_name: Option<String>,
    file_name: Option<String>,
}

fn location_or_default(name: Option<String>) -> String {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string())
}

async fn store_scan(
    state: &AppState,
    file_name: &str,
    png: &[u8],
    analysis: WaterAnalysis,
    location_name: String,
) -> ApiResult<SatelliteScan> {
    let image = state.media.save_satellite_image(file_name, png).await?;
    let scan = state
        .store
        .insert_scan(NewSatelliteScan {
            image,
            chlorophyll_index: analysis.chlorophyll_index,
            turbidity_index: analysis.turbidity_index,
            risk_score: analysis.risk_score,
            location_name,
        })
        .await;
    tracing::info!(
        id = scan.id,
        location = %scan.location_name,
        risk = scan.risk_score,
        "satellite.scan_stored"
    );
    Ok(scan)
}

/// Raw image body; the scan is analysed before it is stored.
pub async fn upload_scan(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SatelliteScan>)> {
    if body.is_empty() {
        return Err(InputError::Invalid("image body is empty".into()).into());
    }
    let analysis =
        analyze_bytes(&body).map_err(|e| InputError::Invalid(format!("image could not be decoded: {e}")))?;
    let file_name = params
        .file_name
        .unwrap_or_else(|| format!("upload_{}.png", chrono::Utc::now().timestamp_millis()));
    let scan = store_scan(&state, &file_name, &body, analysis, location_or_default(params.location_name)).await?;
    Ok((StatusCode::CREATED, Json(scan)))
}

#[derive(Debug, Deserialize)]
pub struct FetchLiveRequest {
    lat: Option<f64>,
    lon: Option<f64>,
    location_name: Option<String>,
}

pub async fn fetch_live(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<FetchLiveRequest>,
) -> ApiResult<(StatusCode, Json<SatelliteScan>)> {
    let (lat, lon) = match (req.lat, req.lon) {
        (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 && lat.is_finite() && lon.is_finite() => (lat, lon),
        _ => return Err(InputError::Invalid("Latitude and Longitude required".into()).into()),
    };
    let location = req
        .location_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Unknown Region".to_string());

    let fetched = state
        .satellite
        .fetch(BoundingBox::around(lat, lon), &location)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, location = %location, "sentinel.fetch_failed");
            ApiError::Unavailable("Failed to fetch from Sentinel Hub (check API keys)".into())
        })?;

    let analysis = analyze_bytes(&fetched.png).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "satellite.analysis_failed; scoring as 0");
        WaterAnalysis::default()
    });

    let prefix = if fetched.simulated { "simulated_sentinel" } else { "sentinel" };
    let file_name = format!(
        "{prefix}_{}_{}.png",
        location.replace(' ', "_"),
        chrono::Utc::now().timestamp()
    );
    let scan = store_scan(&state, &file_name, &fetched.png, analysis, fetched.location_name).await?;
    Ok((StatusCode::CREATED, Json(scan)))
}

pub async fn get_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<SatelliteScan>> {
    state
        .store
        .get_scan(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound("satellite scan"))
}

pub async fn scan_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> ApiResult<impl IntoResponse> {
    let scan = state
        .store
        .get_scan(id)
        .await
        .ok_or(ApiError::NotFound("satellite scan"))?;
    let bytes = state.media.read(&scan.image).await?;
    let content_type = match image::guess_format(&bytes) {
        Ok(fmt) => fmt.to_mime_type(),
        Err(_) => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

pub async fn delete_scan(State(state): State<Arc<AppState>>, Path(id): Path<RecordId>) -> ApiResult<StatusCode> {
    let scan = state
        .store
        .delete_scan(id)
        .await
        .ok_or(ApiError::NotFound("satellite scan"))?;
    if let Err(e) = state.media.remove(&scan.image).await {
        tracing::warn!(error = %e, id, "satellite.image_remove_failed");
    }
    Ok(StatusCode::NO_CONTENT)
}
