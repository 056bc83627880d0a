//! User-tunable posture settings.
//!
//! Persisted as a small JSON record:
//! `{"angle_threshold": 160, "distance_threshold_ratio": 0.05,
//!   "alert_method": "GUI", "timeout": 3}`.
//! Each key is read independently; a missing or invalid key falls back to its
//! default and an unreadable file falls back to all defaults.
//!
//! While running, settings are shared through `SettingsHandle`, which hands
//! the detection loop one immutable snapshot per frame.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::alert::AlertMethod;
use crate::debounce::DEFAULT_TIMEOUT;
use crate::posture::{
    PostureThresholds, DEFAULT_ANGLE_THRESHOLD_DEGREES, DEFAULT_DISTANCE_THRESHOLD_RATIO,
};

pub const ANGLE_THRESHOLD_RANGE: RangeInclusive<f32> = 90.0..=180.0;
pub const DISTANCE_RATIO_RANGE: RangeInclusive<f32> = 0.01..=0.5;
pub const TIMEOUT_SECS_RANGE: RangeInclusive<f64> = 0.0..=10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct PostureSettings {
    pub angle_threshold: f32,
    pub distance_threshold_ratio: f32,
    pub alert_method: AlertMethod,
    pub timeout: Duration,
    /// Log the per-frame metric (not persisted).
    pub camera_feed_visible: bool,
}

impl Default for PostureSettings {
    fn default() -> Self {
        Self {
            angle_threshold: DEFAULT_ANGLE_THRESHOLD_DEGREES,
            distance_threshold_ratio: DEFAULT_DISTANCE_THRESHOLD_RATIO,
            alert_method: AlertMethod::default(),
            timeout: DEFAULT_TIMEOUT,
            camera_feed_visible: false,
        }
    }
}

#[derive(Serialize)]
struct SettingsRecord<'a> {
    angle_threshold: f32,
    distance_threshold_ratio: f32,
    alert_method: &'a str,
    timeout: Value,
}

impl PostureSettings {
    pub fn thresholds(&self) -> PostureThresholds {
        PostureThresholds {
            angle_threshold_degrees: self.angle_threshold,
            distance_threshold_ratio: self.distance_threshold_ratio,
        }
    }

    pub fn set_angle_threshold(&mut self, degrees: f32) -> Result<()> {
        if !ANGLE_THRESHOLD_RANGE.contains(&degrees) {
            return Err(anyhow!(
                "angle threshold must be within {}..={} degrees",
                ANGLE_THRESHOLD_RANGE.start(),
                ANGLE_THRESHOLD_RANGE.end()
            ));
        }
        self.angle_threshold = degrees;
        Ok(())
    }

    pub fn set_distance_threshold_ratio(&mut self, ratio: f32) -> Result<()> {
        if !DISTANCE_RATIO_RANGE.contains(&ratio) {
            return Err(anyhow!(
                "distance threshold ratio must be within {}..={}",
                DISTANCE_RATIO_RANGE.start(),
                DISTANCE_RATIO_RANGE.end()
            ));
        }
        self.distance_threshold_ratio = ratio;
        Ok(())
    }

    pub fn set_timeout_secs(&mut self, secs: f64) -> Result<()> {
        if !TIMEOUT_SECS_RANGE.contains(&secs) {
            return Err(anyhow!(
                "timeout must be within {}..={} seconds",
                TIMEOUT_SECS_RANGE.start(),
                TIMEOUT_SECS_RANGE.end()
            ));
        }
        self.timeout = Duration::from_secs_f64(secs);
        Ok(())
    }

    /// Load settings from `path`. Never fails: problems are logged and the
    /// affected keys take their defaults.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no settings at {}, using defaults", path.display());
                return Self::default();
            }
            Err(err) => {
                log::warn!(
                    "failed to read settings {}: {}; using defaults",
                    path.display(),
                    err
                );
                return Self::default();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Self::from_map(&map),
            Ok(_) => {
                log::warn!(
                    "settings {} is not a JSON object; using defaults",
                    path.display()
                );
                Self::default()
            }
            Err(err) => {
                log::warn!(
                    "settings {} are corrupted ({}); using defaults",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let mut settings = Self::default();

        if let Some(value) = map.get("angle_threshold") {
            let applied = value
                .as_f64()
                .ok_or_else(|| anyhow!("not a number"))
                .and_then(|v| settings.set_angle_threshold(v as f32));
            warn_key("angle_threshold", value, applied);
        }
        if let Some(value) = map.get("distance_threshold_ratio") {
            let applied = value
                .as_f64()
                .ok_or_else(|| anyhow!("not a number"))
                .and_then(|v| settings.set_distance_threshold_ratio(v as f32));
            warn_key("distance_threshold_ratio", value, applied);
        }
        if let Some(value) = map.get("alert_method") {
            let applied = value
                .as_str()
                .ok_or_else(|| anyhow!("not a string"))
                .and_then(|v| v.parse::<AlertMethod>())
                .map(|method| settings.alert_method = method);
            warn_key("alert_method", value, applied);
        }
        if let Some(value) = map.get("timeout") {
            let applied = value
                .as_f64()
                .ok_or_else(|| anyhow!("not a number"))
                .and_then(|v| settings.set_timeout_secs(v));
            warn_key("timeout", value, applied);
        }
        settings
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let record = SettingsRecord {
            angle_threshold: self.angle_threshold,
            distance_threshold_ratio: self.distance_threshold_ratio,
            alert_method: stored_method_name(self.alert_method),
            timeout: stored_timeout(self.timeout),
        };
        let json = serde_json::to_string_pretty(&record)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write settings {}", path.display()))?;
        Ok(())
    }
}

/// Name written to the settings file. The external device keeps its
/// `StreamDeck` name on disk.
fn stored_method_name(method: AlertMethod) -> &'static str {
    match method {
        AlertMethod::ExternalDevice => "StreamDeck",
        other => other.as_str(),
    }
}

/// Whole seconds are written as an integer.
fn stored_timeout(timeout: Duration) -> Value {
    if timeout.subsec_nanos() == 0 {
        Value::from(timeout.as_secs())
    } else {
        Value::from(timeout.as_secs_f64())
    }
}

fn warn_key(key: &str, value: &Value, applied: Result<()>) {
    if let Err(err) = applied {
        log::warn!("ignoring settings key {}={}: {:#}", key, value, err);
    }
}

/// Thread-safe publisher of immutable settings snapshots.
///
/// Readers get an `Arc` to a complete settings value; writers replace the
/// whole value, so a reader never sees a half-applied change.
#[derive(Clone, Debug, Default)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<PostureSettings>>>,
}

impl SettingsHandle {
    pub fn new(settings: PostureSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    pub fn snapshot(&self) -> Arc<PostureSettings> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Apply `change` to a copy of the current settings and publish it. If
    /// `change` fails nothing is published.
    pub fn update<F>(&self, change: F) -> Result<Arc<PostureSettings>>
    where
        F: FnOnce(&mut PostureSettings) -> Result<()>,
    {
        let mut guard = self
            .current
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        let mut next = PostureSettings::clone(&guard);
        change(&mut next)?;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = PostureSettings::load(&dir.path().join("settings.json"));
        assert_eq!(settings, PostureSettings::default());
        Ok(())
    }

    #[test]
    fn corrupted_file_uses_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json")?;
        assert_eq!(PostureSettings::load(&path), PostureSettings::default());
        Ok(())
    }

    #[test]
    fn keys_default_independently() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"angle_threshold": 150, "distance_threshold_ratio": 3.0,
                "alert_method": "StreamDeck"}"#,
        )?;
        let settings = PostureSettings::load(&path);
        assert_eq!(settings.angle_threshold, 150.0);
        assert_eq!(
            settings.distance_threshold_ratio,
            DEFAULT_DISTANCE_THRESHOLD_RATIO
        );
        assert_eq!(settings.alert_method, AlertMethod::ExternalDevice);
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        Ok(())
    }

    #[test]
    fn saved_settings_load_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = PostureSettings::default();
        settings.set_angle_threshold(145.0)?;
        settings.set_timeout_secs(1.5)?;
        settings.alert_method = AlertMethod::Sound;
        settings.save(&path)?;

        let loaded = PostureSettings::load(&path);
        assert_eq!(loaded.angle_threshold, 145.0);
        assert_eq!(loaded.timeout, Duration::from_millis(1500));
        assert_eq!(loaded.alert_method, AlertMethod::Sound);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw["alert_method"], "Sound");
        assert_eq!(raw["timeout"], 1.5);
        Ok(())
    }

    #[test]
    fn external_device_is_stored_under_legacy_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        let settings = PostureSettings {
            alert_method: AlertMethod::ExternalDevice,
            ..PostureSettings::default()
        };
        settings.save(&path)?;

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw["alert_method"], "StreamDeck");
        assert!(raw["timeout"].is_u64());
        assert_eq!(raw["timeout"], 3);

        let loaded = PostureSettings::load(&path);
        assert_eq!(loaded.alert_method, AlertMethod::ExternalDevice);
        assert_eq!(loaded.timeout, Duration::from_secs(3));
        Ok(())
    }

    #[test]
    fn setters_enforce_ranges() {
        let mut settings = PostureSettings::default();
        assert!(settings.set_angle_threshold(80.0).is_err());
        assert!(settings.set_distance_threshold_ratio(0.6).is_err());
        assert!(settings.set_timeout_secs(11.0).is_err());
        assert!(settings.set_timeout_secs(-1.0).is_err());
        assert_eq!(settings, PostureSettings::default());
    }

    #[test]
    fn snapshots_are_immutable_and_updates_atomic() -> Result<()> {
        let handle = SettingsHandle::new(PostureSettings::default());
        let before = handle.snapshot();

        handle.update(|s| {
            s.alert_method = AlertMethod::Sound;
            s.set_angle_threshold(150.0)
        })?;
        assert_eq!(before.alert_method, AlertMethod::Gui);
        assert_eq!(handle.snapshot().alert_method, AlertMethod::Sound);
        assert_eq!(handle.snapshot().angle_threshold, 150.0);

        // A failed change publishes nothing, including its earlier edits.
        let failed = handle.update(|s| {
            s.alert_method = AlertMethod::Gui;
            s.set_timeout_secs(60.0)
        });
        assert!(failed.is_err());
        assert_eq!(handle.snapshot().alert_method, AlertMethod::Sound);
        Ok(())
    }

    #[test]
    fn handle_is_shared_across_threads() -> Result<()> {
        let handle = SettingsHandle::new(PostureSettings::default());
        let writer = handle.clone();
        std::thread::spawn(move || writer.update(|s| s.set_timeout_secs(5.0)))
            .join()
            .map_err(|_| anyhow!("writer panicked"))??;
        assert_eq!(handle.snapshot().timeout, Duration::from_secs(5));
        Ok(())
    }
}
