//! External indicator devices.
//!
//! A device is opened once at startup, driven with fire-and-forget color
//! commands, and released exactly once at shutdown. Endpoints:
//! - `mqtt://host:port/topic` (or `mqtts://`): MQTT-controlled light or key pad
//! - `stub://name`: in-memory device that records commands
//! - anything else: an existing file, FIFO or LED node that accepts `#rrggbb` lines
//!
//! Opening fails if the device is not there; there is no silent fallback.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::mqtt::MqttIndicatorDevice;
use crate::config::DeviceSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const OFF: Rgb = Rgb(0, 0, 0);

    pub fn for_alert(alerting: bool) -> Self {
        if alerting {
            Rgb::RED
        } else {
            Rgb::GREEN
        }
    }

    /// `#rrggbb`
    pub fn to_hex(self) -> String {
        format!("#{}", hex::encode([self.0, self.1, self.2]))
    }
}

/// An externally addressed indicator (every key/LED is set to one color).
pub trait IndicatorDevice: Send {
    fn name(&self) -> &str;

    fn set_color(&mut self, color: Rgb) -> Result<()>;

    fn reset(&mut self) -> Result<()> {
        self.set_color(Rgb::OFF)
    }

    fn close(&mut self) -> Result<()>;
}

/// Open the device named by `settings.endpoint`.
pub fn open_device(settings: &DeviceSettings) -> Result<Box<dyn IndicatorDevice>> {
    let endpoint = settings
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|endpoint| !endpoint.is_empty())
        .ok_or_else(|| anyhow!("no indicator device endpoint configured"))?;

    if let Some(name) = endpoint.strip_prefix("stub://") {
        return Ok(Box::new(MemoryIndicatorDevice::new(name)));
    }
    if endpoint.contains("://") {
        return Ok(Box::new(MqttIndicatorDevice::connect(endpoint, settings)?));
    }
    Ok(Box::new(FileIndicatorDevice::open(endpoint)?))
}

// ----------------------------------------------------------------------------
// DeviceChannel
// ----------------------------------------------------------------------------

/// External-device channel: red while alerting, green otherwise.
///
/// Only color changes are sent to the device.
pub struct DeviceChannel {
    device: Box<dyn IndicatorDevice>,
    shown: Option<Rgb>,
    closed: bool,
}

impl DeviceChannel {
    /// Take ownership of an opened device, reset it and show green.
    pub fn new(mut device: Box<dyn IndicatorDevice>) -> Result<Self> {
        device
            .reset()
            .with_context(|| format!("failed to reset indicator device {}", device.name()))?;
        device.set_color(Rgb::GREEN)?;
        log::info!("indicator device {} ready", device.name());
        Ok(Self {
            device,
            shown: Some(Rgb::GREEN),
            closed: false,
        })
    }

    pub fn update(&mut self, alerting: bool) -> Result<()> {
        if self.closed {
            return Err(anyhow!("indicator device {} is closed", self.device.name()));
        }
        let color = Rgb::for_alert(alerting);
        if self.shown == Some(color) {
            return Ok(());
        }
        // Fire-and-forget: a failed command is not resent.
        self.shown = Some(color);
        log::debug!("indicator device {} -> {}", self.device.name(), color.to_hex());
        self.device.set_color(color)
    }

    pub fn deactivate(&mut self) -> Result<()> {
        self.update(false)
    }

    /// Reset and release the device. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let reset = self.device.reset();
        let close = self.device.close();
        log::info!("indicator device {} closed", self.device.name());
        reset.and(close)
    }

    pub fn shown(&self) -> Option<Rgb> {
        self.shown
    }
}

impl Drop for DeviceChannel {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("failed to close indicator device: {:#}", err);
        }
    }
}

// ----------------------------------------------------------------------------
// Stub device
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    SetColor(Rgb),
    Close,
}

/// Commands received by a `MemoryIndicatorDevice`. Clones share the record.
#[derive(Clone, Debug, Default)]
pub struct DeviceLog {
    commands: Arc<Mutex<Vec<DeviceCommand>>>,
}

impl DeviceLog {
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, command: DeviceCommand) -> Result<()> {
        self.commands
            .lock()
            .map_err(|_| anyhow!("device log lock poisoned"))?
            .push(command);
        Ok(())
    }
}

/// In-memory device for `stub://` endpoints, demos and tests.
pub struct MemoryIndicatorDevice {
    name: String,
    log: DeviceLog,
}

impl MemoryIndicatorDevice {
    pub fn new(name: &str) -> Self {
        Self {
            name: format!("stub://{}", name),
            log: DeviceLog::default(),
        }
    }

    pub fn log(&self) -> DeviceLog {
        self.log.clone()
    }
}

impl IndicatorDevice for MemoryIndicatorDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_color(&mut self, color: Rgb) -> Result<()> {
        self.log.push(DeviceCommand::SetColor(color))
    }

    fn close(&mut self) -> Result<()> {
        self.log.push(DeviceCommand::Close)
    }
}

// ----------------------------------------------------------------------------
// File device
// ----------------------------------------------------------------------------

/// Writes one `#rrggbb` line per command to an existing file or FIFO.
pub struct FileIndicatorDevice {
    name: String,
    path: PathBuf,
    file: Option<File>,
}

impl FileIndicatorDevice {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(anyhow!("indicator device {} not found", path.display()));
        }
        let file = OpenOptions::new()
            .write(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open indicator device {}", path.display()))?;
        Ok(Self {
            name: path.display().to_string(),
            path: path.to_path_buf(),
            file: Some(file),
        })
    }
}

impl IndicatorDevice for FileIndicatorDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_color(&mut self, color: Rgb) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| anyhow!("indicator device {} is closed", self.path.display()))?;
        writeln!(file, "{}", color.to_hex())?;
        file.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}
