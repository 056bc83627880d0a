use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alert::Tone;
use crate::pose::BodySide;

const DEFAULT_CAMERA_DEVICE: &str = "stub://webcam";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_POSE_BACKEND: &str = "scripted";
const DEFAULT_POSE_INPUT_SIZE: u32 = 256;
const DEFAULT_TONE_FREQUENCY_HZ: u32 = 1000;
const DEFAULT_TONE_DURATION_MS: u64 = 500;
const DEFAULT_TONE_PLAYER: &str = "beep";
const DEFAULT_DEVICE_CLIENT_ID: &str = "posture-guard";
const DEFAULT_SETTINGS_PATH: &str = "settings.json";

// Range accepted by the PC speaker driver behind `beep`.
const MIN_TONE_FREQUENCY_HZ: u32 = 37;
const MAX_TONE_FREQUENCY_HZ: u32 = 32767;

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    camera: Option<CameraConfigFile>,
    pose: Option<PoseConfigFile>,
    alert: Option<AlertConfigFile>,
    device: Option<DeviceConfigFile>,
    settings_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PoseConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    side: Option<BodySide>,
    jitter: Option<f32>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    tone_frequency_hz: Option<u32>,
    tone_duration_ms: Option<u64>,
    tone_player: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    endpoint: Option<String>,
    allow_remote: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
}

/// Static process configuration. User-tunable posture settings live in
/// `crate::settings` and can change while running; this does not.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub camera: CameraSettings,
    pub pose: PoseSettings,
    pub alert: AlertSettings,
    pub device: DeviceSettings,
    pub settings_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct PoseSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub side: BodySide,
    /// Landmark noise for the scripted backend (normalized units).
    pub jitter: f32,
    pub input_width: u32,
    pub input_height: u32,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub tone_frequency_hz: u32,
    pub tone_duration_ms: u64,
    pub tone_player: String,
}

#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// `mqtt://host:port/topic`, `stub://name` or a device path. `None` means
    /// no external device is attached.
    pub endpoint: Option<String>,
    pub allow_remote: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        // An empty file cannot fail to convert.
        Self::from_file(SentinelConfigFile::default())
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            allow_remote: false,
            username: None,
            password: None,
            client_id: DEFAULT_DEVICE_CLIENT_ID.to_string(),
        }
    }
}

impl AlertSettings {
    pub fn tone(&self) -> Tone {
        Tone {
            frequency_hz: self.tone_frequency_hz,
            duration: Duration::from_millis(self.tone_duration_ms),
        }
    }
}

impl SentinelConfig {
    /// Load from the file named by `POSTURE_CONFIG` (if any).
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POSTURE_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from `path` (if any), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Self {
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        let pose_file = file.pose.unwrap_or_default();
        let pose = PoseSettings {
            backend: pose_file
                .backend
                .unwrap_or_else(|| DEFAULT_POSE_BACKEND.to_string()),
            model_path: pose_file.model_path,
            side: pose_file.side.unwrap_or_default(),
            jitter: pose_file.jitter.unwrap_or(0.0),
            input_width: pose_file.input_width.unwrap_or(DEFAULT_POSE_INPUT_SIZE),
            input_height: pose_file.input_height.unwrap_or(DEFAULT_POSE_INPUT_SIZE),
        };

        let alert_file = file.alert.unwrap_or_default();
        let alert = AlertSettings {
            tone_frequency_hz: alert_file
                .tone_frequency_hz
                .unwrap_or(DEFAULT_TONE_FREQUENCY_HZ),
            tone_duration_ms: alert_file
                .tone_duration_ms
                .unwrap_or(DEFAULT_TONE_DURATION_MS),
            tone_player: alert_file
                .tone_player
                .unwrap_or_else(|| DEFAULT_TONE_PLAYER.to_string()),
        };

        let device_file = file.device.unwrap_or_default();
        let device = DeviceSettings {
            endpoint: device_file.endpoint.filter(|e| !e.trim().is_empty()),
            allow_remote: device_file.allow_remote.unwrap_or(false),
            username: device_file.username,
            password: device_file.password,
            client_id: device_file
                .client_id
                .unwrap_or_else(|| DEFAULT_DEVICE_CLIENT_ID.to_string()),
        };

        Self {
            camera,
            pose,
            alert,
            device,
            settings_path: file
                .settings_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH)),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("POSTURE_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(fps) = std::env::var("POSTURE_FPS") {
            self.camera.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("POSTURE_FPS must be an integer frame rate"))?;
        }
        if let Ok(endpoint) = std::env::var("POSTURE_DEVICE") {
            if !endpoint.trim().is_empty() {
                self.device.endpoint = Some(endpoint);
            }
        }
        if let Ok(backend) = std::env::var("POSTURE_POSE_BACKEND") {
            if !backend.trim().is_empty() {
                self.pose.backend = backend;
            }
        }
        if let Ok(path) = std::env::var("POSTURE_SETTINGS_PATH") {
            if !path.trim().is_empty() {
                self.settings_path = PathBuf::from(path);
            }
        }
        Ok(())
    }

    /// Inputs that are simulated rather than observed: a `stub://` camera or
    /// the scripted pose backend. Alerts raised on them are not real.
    pub fn synthetic_inputs(&self) -> Vec<String> {
        let mut inputs = Vec::new();
        if self.camera.device.starts_with("stub://") {
            inputs.push(format!("camera {}", self.camera.device));
        }
        if self.pose.backend == "scripted" {
            inputs.push("pose backend scripted".to_string());
        }
        inputs
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera.target_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera dimensions must be non-zero"));
        }
        if self.pose.input_width == 0 || self.pose.input_height == 0 {
            return Err(anyhow!("pose input dimensions must be non-zero"));
        }
        if !(MIN_TONE_FREQUENCY_HZ..=MAX_TONE_FREQUENCY_HZ).contains(&self.alert.tone_frequency_hz)
        {
            return Err(anyhow!(
                "alert.tone_frequency_hz must be within {}..={} Hz",
                MIN_TONE_FREQUENCY_HZ,
                MAX_TONE_FREQUENCY_HZ
            ));
        }
        if self.alert.tone_duration_ms == 0 {
            return Err(anyhow!("alert.tone_duration_ms must be greater than zero"));
        }
        self.pose.backend = self.pose.backend.trim().to_lowercase();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_camera_and_tone() {
        let cfg = SentinelConfig::default();
        assert_eq!(cfg.camera.target_fps, 10);
        assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
        assert_eq!(cfg.pose.backend, "scripted");
        assert_eq!(cfg.pose.side, BodySide::Left);
        assert_eq!(cfg.alert.tone(), Tone::default());
        assert_eq!(cfg.device.endpoint, None);
        assert_eq!(cfg.device.client_id, "posture-guard");
        assert_eq!(cfg.settings_path, PathBuf::from("settings.json"));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = SentinelConfig::default();
        cfg.camera.target_fps = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.alert.tone_frequency_hz = 20;
        assert!(cfg.validate().is_err());

        let mut cfg = SentinelConfig::default();
        cfg.camera.height = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_normalizes_backend_name() -> Result<()> {
        let mut cfg = SentinelConfig::default();
        cfg.pose.backend = " Scripted ".to_string();
        cfg.validate()?;
        assert_eq!(cfg.pose.backend, "scripted");
        Ok(())
    }

    #[test]
    fn default_inputs_are_synthetic() {
        let cfg = SentinelConfig::default();
        assert_eq!(
            cfg.synthetic_inputs(),
            vec!["camera stub://webcam", "pose backend scripted"]
        );

        let mut cfg = SentinelConfig::default();
        cfg.camera.device = "/dev/video0".to_string();
        cfg.pose.backend = "tract".to_string();
        assert!(cfg.synthetic_inputs().is_empty());
    }

    #[test]
    fn blank_device_endpoint_means_no_device() -> Result<()> {
        let file: SentinelConfigFile =
            serde_json::from_str(r#"{"device": {"endpoint": "  "}}"#)?;
        let cfg = SentinelConfig::from_file(file);
        assert!(cfg.device.endpoint.is_none());
        Ok(())
    }

    #[test]
    fn toml_files_are_accepted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("posture.toml");
        std::fs::write(
            &path,
            concat!(
                "[camera]\ntarget_fps = 15\n\n",
                "[pose]\nside = \"right\"\n\n",
                "[device]\nendpoint = \"stub://desk\"\n",
            ),
        )?;
        let cfg = SentinelConfig::from_file(read_config_file(&path)?);
        assert_eq!(cfg.camera.target_fps, 15);
        assert_eq!(cfg.pose.side, BodySide::Right);
        assert_eq!(cfg.device.endpoint.as_deref(), Some("stub://desk"));
        Ok(())
    }
}
