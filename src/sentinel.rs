//! Satellite imagery source.
//!
//! Fetches true-colour Sentinel-2 tiles from the Sentinel Hub process API.
//! Without usable credentials the client synthesises a water scene instead,
//! so the rest of the pipeline still runs.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use governor::DefaultDirectRateLimiter;
use governor::{Quota, RateLimiter};
use image::{ImageFormat, Rgb, RgbImage};
use nonzero_ext::nonzero;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use std::num::NonZeroU32;
use std::time::Duration;

const TOKEN_URL: &str = "https://services.sentinel-hub.com/oauth/token";
const PROCESS_URL: &str = "https://services.sentinel-hub.com/api/v1/process";

pub const SCENE_SIZE: u32 = 512;
/// Half-width of the bounding box around a requested point, in degrees.
pub const BBOX_DELTA: f64 = 0.05;

const EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: ["B04", "B03", "B02"],
    output: { bands: 3 }
  };
}

function evaluatePixel(sample) {
  return [2.5 * sample.B04, 2.5 * sample.B03, 2.5 * sample.B02];
}
"#;

/// `[min_lon, min_lat, max_lon, max_lat]` in EPSG:4326.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox(pub [f64; 4]);

impl BoundingBox {
    pub fn around(lat: f64, lon: f64) -> Self {
        Self([lon - BBOX_DELTA, lat - BBOX_DELTA, lon + BBOX_DELTA, lat + BBOX_DELTA])
    }
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub png: Vec<u8>,
    pub location_name: String,
    pub simulated: bool,
}

#[async_trait::async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, bbox: BoundingBox, location_name: &str) -> Result<FetchedImage>;
}

#[derive(Debug, Clone)]
pub struct SentinelCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct TokenResp {
    access_token: String,
}

pub struct SentinelClient {
    http: Client,
    credentials: Option<SentinelCredentials>,
    limiter: DefaultDirectRateLimiter,
}

impl SentinelClient {
    pub fn new(credentials: Option<SentinelCredentials>, qps: u32, timeout_ms: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("building Sentinel HTTP client")?;
        let qps = NonZeroU32::new(qps).unwrap_or(nonzero!(1u32));
        let limiter = RateLimiter::direct(Quota::per_second(qps));
        Ok(Self {
            http,
            credentials,
            limiter,
        })
    }

    async fn token(&self, creds: &SentinelCredentials) -> Result<String> {
        self.limiter.until_ready().await;
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<TokenResp>()
            .await?;
        Ok(resp.access_token)
    }

    async fn process(&self, token: &str, bbox: BoundingBox) -> Result<Vec<u8>> {
        let to = Utc::now();
        let from = to - ChronoDuration::days(45);
        let payload = serde_json::json!({
            "input": {
                "bounds": {
                    "bbox": bbox.0,
                    "properties": { "crs": "http://www.opengis.net/def/crs/EPSG/0/4326" }
                },
                "data": [{
                    "type": "sentinel-2-l2a",
                    "dataFilter": {
                        "timeRange": {
                            "from": from.to_rfc3339_opts(SecondsFormat::Secs, true),
                            "to": to.to_rfc3339_opts(SecondsFormat::Secs, true)
                        },
                        "mosaickingOrder": "leastCC"
                    }
                }]
            },
            "output": {
                "width": SCENE_SIZE,
                "height": SCENE_SIZE,
                "responses": [{ "identifier": "default", "format": { "type": "image/png" } }]
            },
            "evalscript": EVALSCRIPT
        });

        self.limiter.until_ready().await;
        let bytes = self
            .http
            .post(PROCESS_URL)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "image/png")
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait::async_trait]
impl ImageSource for SentinelClient {
    async fn fetch(&self, bbox: BoundingBox, location_name: &str) -> Result<FetchedImage> {
        let token = match &self.credentials {
            None => {
                tracing::warn!("sentinel.credentials_missing; simulating scene");
                None
            }
            Some(creds) => match self.token(creds).await {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!(error = %e, "sentinel.token_failed; simulating scene");
                    None
                }
            },
        };

        let Some(token) = token else {
            let scene = simulate_scene(&mut rand::thread_rng());
            return Ok(FetchedImage {
                png: encode_png(&scene)?,
                location_name: format!("[SIM] {location_name}"),
                simulated: true,
            });
        };

        let png = self
            .process(&token, bbox)
            .await
            .context("fetching Sentinel-2 scene")?;
        tracing::info!(location = %location_name, bytes = png.len(), "sentinel.fetched");
        Ok(FetchedImage {
            png,
            location_name: location_name.to_string(),
            simulated: false,
        })
    }
}

fn paint_disc(img: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
    let (w, h) = (i64::from(img.width()), i64::from(img.height()));
    for y in (cy - radius).max(0)..(cy + radius + 1).min(h) {
        for x in (cx - radius).max(0)..(cx + radius + 1).min(w) {
            let (dx, dy) = (x - cx, y - cy);
            if dx * dx + dy * dy <= radius * radius {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// A blue water body with ten algae blooms and five sediment plumes.
pub fn simulate_scene<R: Rng + ?Sized>(rng: &mut R) -> RgbImage {
    let size = i64::from(SCENE_SIZE);
    let mut img = RgbImage::from_pixel(SCENE_SIZE, SCENE_SIZE, Rgb([0, 100, 200]));
    for _ in 0..10 {
        let (cx, cy, r) = (rng.gen_range(0..size), rng.gen_range(0..size), rng.gen_range(20..100));
        paint_disc(&mut img, cx, cy, r, Rgb([34, 139, 34]));
    }
    for _ in 0..5 {
        let (cx, cy, r) = (rng.gen_range(0..size), rng.gen_range(0..size), rng.gen_range(20..80));
        paint_disc(&mut img, cx, cy, r, Rgb([139, 69, 19]));
    }
    img
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .context("encoding PNG")?;
    Ok(buf.into_inner())
}
