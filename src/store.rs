//! In-process record store and media directory.
//!
//! Each record kind lives in its own table with auto-increment ids.
//! Records are stamped on insert, so listing by descending id is listing
//! newest first.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::records::{
    HealthReport, NewHealthReport, NewSatelliteScan, NewSensorReading, RecordId, SatelliteScan, SensorReading,
};

#[derive(Debug)]
struct Table<T> {
    next_id: RecordId,
    rows: BTreeMap<RecordId, T>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }

    fn insert_with(&mut self, build: impl FnOnce(RecordId) -> T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        let row = build(id);
        self.rows.insert(id, row.clone());
        row
    }

    fn newest(&self, limit: usize) -> Vec<T> {
        self.rows.values().rev().take(limit).cloned().collect()
    }

    fn get(&self, id: RecordId) -> Option<T> {
        self.rows.get(&id).cloned()
    }

    fn replace_with(&mut self, id: RecordId, build: impl FnOnce(&T) -> T) -> Option<T> {
        let slot = self.rows.get_mut(&id)?;
        *slot = build(slot);
        Some(slot.clone())
    }

    fn remove(&mut self, id: RecordId) -> Option<T> {
        self.rows.remove(&id)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    /// Drops the `count` oldest rows.
    fn prune_oldest(&mut self, count: usize) -> usize {
        let doomed: Vec<RecordId> = self.rows.keys().take(count).copied().collect();
        for id in &doomed {
            self.rows.remove(id);
        }
        doomed.len()
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    sensors: RwLock<Table<SensorReading>>,
    reports: RwLock<Table<HealthReport>>,
    scans: RwLock<Table<SatelliteScan>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sensors: RwLock::new(Table::new()),
            reports: RwLock::new(Table::new()),
            scans: RwLock::new(Table::new()),
        }
    }

    // Sensor readings

    pub async fn insert_sensor(&self, new: NewSensorReading) -> SensorReading {
        self.insert_sensor_at(new, Utc::now()).await
    }

    pub async fn insert_sensor_at(&self, new: NewSensorReading, at: DateTime<Utc>) -> SensorReading {
        self.sensors
            .write()
            .await
            .insert_with(|id| SensorReading::from_new(id, at, new))
    }

    pub async fn recent_sensors(&self, limit: usize) -> Vec<SensorReading> {
        self.sensors.read().await.newest(limit)
    }

    pub async fn list_sensors(&self) -> Vec<SensorReading> {
        self.recent_sensors(usize::MAX).await
    }

    pub async fn get_sensor(&self, id: RecordId) -> Option<SensorReading> {
        self.sensors.read().await.get(id)
    }

    /// Replaces the measured values and keeps the insertion timestamp.
    pub async fn update_sensor(&self, id: RecordId, new: NewSensorReading) -> Option<SensorReading> {
        self.sensors
            .write()
            .await
            .replace_with(id, |old| SensorReading::from_new(id, old.timestamp, new))
    }

    pub async fn delete_sensor(&self, id: RecordId) -> bool {
        self.sensors.write().await.remove(id).is_some()
    }

    /// Once more than `cap` readings exist, removes the `batch` oldest.
    pub async fn prune_sensors(&self, cap: usize, batch: usize) -> usize {
        let mut table = self.sensors.write().await;
        if table.len() <= cap {
            return 0;
        }
        table.prune_oldest(batch)
    }

    // Health reports

    pub async fn insert_report(&self, new: NewHealthReport) -> HealthReport {
        let at = Utc::now();
        self.reports
            .write()
            .await
            .insert_with(|id| HealthReport::from_new(id, at, new))
    }

    pub async fn recent_reports(&self, limit: usize) -> Vec<HealthReport> {
        self.reports.read().await.newest(limit)
    }

    pub async fn list_reports(&self) -> Vec<HealthReport> {
        self.recent_reports(usize::MAX).await
    }

    pub async fn get_report(&self, id: RecordId) -> Option<HealthReport> {
        self.reports.read().await.get(id)
    }

    pub async fn update_report(&self, id: RecordId, new: NewHealthReport) -> Option<HealthReport> {
        self.reports
            .write()
            .await
            .replace_with(id, |old| HealthReport::from_new(id, old.submitted_at, new))
    }

    pub async fn delete_report(&self, id: RecordId) -> bool {
        self.reports.write().await.remove(id).is_some()
    }

    pub async fn count_reports(&self) -> usize {
        self.reports.read().await.len()
    }

    // Satellite scans

    pub async fn insert_scan(&self, new: NewSatelliteScan) -> SatelliteScan {
        let at = Utc::now();
        self.scans
            .write()
            .await
            .insert_with(|id| SatelliteScan::from_new(id, at, new))
    }

    pub async fn latest_scan(&self) -> Option<SatelliteScan> {
        self.scans.read().await.newest(1).pop()
    }

    pub async fn list_scans(&self) -> Vec<SatelliteScan> {
        self.scans.read().await.newest(usize::MAX)
    }

    pub async fn get_scan(&self, id: RecordId) -> Option<SatelliteScan> {
        self.scans.read().await.get(id)
    }

    pub async fn delete_scan(&self, id: RecordId) -> Option<SatelliteScan> {
        self.scans.write().await.remove(id)
    }
}

/// Directory holding uploaded and fetched satellite images.
#[derive(Debug, Clone)]
pub struct MediaDir {
    root: PathBuf,
}

pub const SATELLITE_SUBDIR: &str = "satellite_images";

const MAX_NAME_ATTEMPTS: usize = 1000;

impl MediaDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under the satellite subdirectory and returns the path
    /// relative to the media root. Existing files are never overwritten; a
    /// taken name gets a numeric suffix (`scan.png`, `scan-1.png`, ...).
    pub async fn save_satellite_image(&self, file_name: &str, bytes: &[u8]) -> Result<String> {
        let dir = self.root.join(SATELLITE_SUBDIR);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        let name = sanitize_file_name(file_name);
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name.as_str(), None),
        };

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = match (attempt, ext) {
                (0, _) => name.clone(),
                (n, Some(ext)) => format!("{stem}-{n}.{ext}"),
                (n, None) => format!("{stem}-{n}"),
            };
            let path = dir.join(&candidate);
            let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e).with_context(|| format!("creating {}", path.display())),
            };
            file.write_all(bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            file.flush().await?;
            return Ok(format!("{SATELLITE_SUBDIR}/{candidate}"));
        }
        anyhow::bail!("no free file name for {name} after {MAX_NAME_ATTEMPTS} attempts")
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let rel = Path::new(relative);
        anyhow::ensure!(
            rel.components().all(|c| matches!(c, Component::Normal(_))),
            "refusing media path {relative}"
        );
        let path = self.root.join(rel);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }

    pub async fn remove(&self, relative: &str) -> Result<()> {
        let path = self.root.join(relative);
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("removing {}", path.display()))
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image.png".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::SymptomType;

    fn reading(ph: f64) -> NewSensorReading {
        NewSensorReading {
            sensor_id: "SENSOR-002".into(),
            ph,
            turbidity: 1.0,
            temperature: 22.0,
            dissolved_oxygen: 8.0,
            conductivity: 500.0,
        }
    }

    #[tokio::test]
    async fn lists_newest_first_and_windows() {
        let store = MemoryStore::new();
        for i in 0..15 {
            store.insert_sensor(reading(7.0 + i as f64 * 0.01)).await;
        }
        let recent = store.recent_sensors(10).await;
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].id, 15);
        assert_eq!(recent[9].id, 6);
        assert_eq!(store.list_sensors().await.len(), 15);
    }

    #[tokio::test]
    async fn update_keeps_timestamp_and_rederives_status() {
        let store = MemoryStore::new();
        let first = store.insert_sensor(reading(7.0)).await;
        let updated = store.update_sensor(first.id, reading(9.5)).await.unwrap();
        assert_eq!(updated.timestamp, first.timestamp);
        assert!(updated.is_anomalous());
        assert!(store.update_sensor(99, reading(7.0)).await.is_none());
    }

    #[tokio::test]
    async fn prune_removes_oldest_past_cap() {
        let store = MemoryStore::new();
        for _ in 0..12 {
            store.insert_sensor(reading(7.0)).await;
        }
        assert_eq!(store.prune_sensors(20, 5).await, 0);
        assert_eq!(store.prune_sensors(10, 5).await, 5);
        let left = store.list_sensors().await;
        assert_eq!(left.len(), 7);
        assert_eq!(left.last().unwrap().id, 6);
    }

    #[tokio::test]
    async fn reports_count_and_delete() {
        let store = MemoryStore::new();
        let r = store
            .insert_report(NewHealthReport {
                symptom_type: SymptomType::Derm,
                severity: 7,
                latitude: 1.0,
                longitude: 2.0,
                notes: Some("  ".into()),
            })
            .await;
        assert_eq!(r.notes, None);
        assert_eq!(store.count_reports().await, 1);
        assert!(store.delete_report(r.id).await);
        assert!(!store.delete_report(r.id).await);
        assert_eq!(store.count_reports().await, 0);
    }

    #[tokio::test]
    async fn media_round_trip_and_traversal_guard() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaDir::new(dir.path());
        let rel = media.save_satellite_image("../scan 1.png", b"png").await.unwrap();
        assert_eq!(rel, "satellite_images/_scan_1.png");
        assert_eq!(media.read(&rel).await.unwrap(), b"png");
        assert!(media.read("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn same_name_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaDir::new(dir.path());
        let first = media.save_satellite_image("res.png", b"green").await.unwrap();
        let second = media.save_satellite_image("res.png", b"blue").await.unwrap();
        let third = media.save_satellite_image("res.png", b"brown").await.unwrap();
        assert_eq!(first, "satellite_images/res.png");
        assert_eq!(second, "satellite_images/res-1.png");
        assert_eq!(third, "satellite_images/res-2.png");

        media.remove(&second).await.unwrap();
        assert_eq!(media.read(&first).await.unwrap(), b"green");
        assert_eq!(media.read(&third).await.unwrap(), b"brown");
    }
}
