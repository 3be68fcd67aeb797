//! Command-line and environment configuration.

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::alerts::DEFAULT_MIN_SEVERITY;
use crate::classifier::TrainingParams;
use crate::forest::ForestParams;
use crate::sentinel::SentinelCredentials;
use crate::simulator::SimulatorConfig;

#[derive(Args, Debug, Clone)]
pub struct TrainingArgs {
    /// Training CSV (nine feature columns plus `Potability`)
    #[arg(long, env = "AQUASENTRY_DATA", default_value = "data/water_potability.csv")]
    pub data: PathBuf,
    /// Trees in the forest
    #[arg(long, default_value_t = 100)]
    pub n_estimators: usize,
    /// Seed for the train/test split and the forest
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Share of rows held out for evaluation
    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,
}

impl TrainingArgs {
    pub fn params(&self) -> TrainingParams {
        TrainingParams {
            test_fraction: self.test_fraction,
            split_seed: self.seed,
            forest: ForestParams {
                n_estimators: self.n_estimators,
                random_state: self.seed,
                ..ForestParams::default()
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub training: TrainingArgs,

    /// Address to listen on
    #[arg(long, env = "AQUASENTRY_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Where satellite images are written
    #[arg(long, env = "AQUASENTRY_MEDIA_DIR", default_value = "./media")]
    pub media_dir: PathBuf,

    /// Health reports at or above this severity raise an alert
    #[arg(long, default_value_t = DEFAULT_MIN_SEVERITY, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub alert_min_severity: u8,

    /// Webhook receiving alerts as JSON; alerts are only logged when unset
    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    pub alert_webhook: Option<String>,

    #[arg(long, default_value_t = 5_000)]
    pub alert_timeout_ms: u64,

    #[arg(long, env = "SENTINEL_CLIENT_ID", hide_env_values = true)]
    pub sentinel_client_id: Option<String>,

    #[arg(long, env = "SENTINEL_CLIENT_SECRET", hide_env_values = true)]
    pub sentinel_client_secret: Option<String>,

    #[arg(long, default_value_t = 5)]
    pub sentinel_qps: u32,

    #[arg(long, default_value_t = 30_000)]
    pub sentinel_timeout_ms: u64,

    /// Generate simulated sensor readings in the background
    #[arg(long)]
    pub simulate: bool,

    #[arg(long, default_value_t = 5)]
    pub simulate_interval_secs: u64,

    /// Sensor readings kept before the simulator prunes the oldest
    #[arg(long, default_value_t = 1000)]
    pub sensor_cap: usize,
}

impl ServeArgs {
    /// Both halves must be present; placeholders count as missing.
    pub fn sentinel_credentials(&self) -> Option<SentinelCredentials> {
        let usable = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.starts_with("YOUR_"))
                .map(str::to_string)
        };
        Some(SentinelCredentials {
            client_id: usable(&self.sentinel_client_id)?,
            client_secret: usable(&self.sentinel_client_secret)?,
        })
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            interval: Duration::from_secs(self.simulate_interval_secs.max(1)),
            cap: self.sensor_cap,
            ..SimulatorConfig::default()
        }
    }
}
