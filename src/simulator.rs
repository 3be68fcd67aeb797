use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::records::NewSensorReading;
use crate::store::MemoryStore;

pub const DEFAULT_SENSOR_IDS: [&str; 3] = ["SENSOR-001", "SENSOR-002", "SENSOR-003"];

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub sensor_ids: Vec<String>,
    pub interval: Duration,
    /// Prune once the store holds more readings than this.
    pub cap: usize,
    pub prune_batch: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sensor_ids: DEFAULT_SENSOR_IDS.iter().map(|s| s.to_string()).collect(),
            interval: Duration::from_secs(5),
            cap: 1000,
            prune_batch: 100,
        }
    }
}

fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}

/// A plausible, in-range reading.
pub fn generate_reading<R: Rng + ?Sized>(rng: &mut R, sensor_id: &str) -> NewSensorReading {
    NewSensorReading {
        sensor_id: sensor_id.to_string(),
        ph: round_to(rng.gen_range(6.5..=8.5), 2),
        turbidity: round_to(rng.gen_range(0.5..=5.0), 2),
        temperature: round_to(rng.gen_range(20.0..=30.0), 1),
        dissolved_oxygen: round_to(rng.gen_range(6.0..=9.0), 2),
        conductivity: round_to(rng.gen_range(300.0..=600.0), 0),
    }
}

/// Emits one reading per sensor, then enforces the cap.
pub async fn tick<R: Rng + ?Sized>(store: &MemoryStore, config: &SimulatorConfig, rng: &mut R) {
    for id in &config.sensor_ids {
        let reading = generate_reading(rng, id);
        let (ph, turbidity) = (reading.ph, reading.turbidity);
        store.insert_sensor(reading).await;
        tracing::debug!(sensor = %id, ph, turbidity, "simulator.reading");
    }
    let pruned = store.prune_sensors(config.cap, config.prune_batch).await;
    if pruned > 0 {
        tracing::info!(pruned, "simulator.pruned");
    }
}

/// Runs the simulator on a background task until the runtime shuts down.
pub fn spawn(store: Arc<MemoryStore>, config: SimulatorConfig) -> JoinHandle<()> {
    tracing::info!(
        sensors = config.sensor_ids.len(),
        interval_secs = config.interval.as_secs_f64(),
        "simulator.started"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        loop {
            ticker.tick().await;
            let mut rng = StdRng::from_entropy();
            tick(&store, &config, &mut rng).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_readings_are_never_anomalous() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..500 {
            let r = generate_reading(&mut rng, "SENSOR-001");
            assert!((6.5..=8.5).contains(&r.ph));
            assert!((0.5..=5.0).contains(&r.turbidity));
            assert!(!crate::records::reading_is_anomalous(r.ph, r.turbidity));
            assert_eq!(r.conductivity, r.conductivity.round());
        }
    }

    #[tokio::test]
    async fn tick_inserts_per_sensor_and_prunes() {
        let store = MemoryStore::new();
        let config = SimulatorConfig {
            cap: 4,
            prune_batch: 2,
            ..SimulatorConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        tick(&store, &config, &mut rng).await;
        assert_eq!(store.list_sensors().await.len(), 3);
        tick(&store, &config, &mut rng).await;
        assert_eq!(store.list_sensors().await.len(), 4);
    }
}
