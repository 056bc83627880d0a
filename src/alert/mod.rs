//! Alert channels and dispatch.
//!
//! Three interchangeable channels share one contract (`update`, `deactivate`,
//! `close`) and are selected at runtime through `AlertMethod`:
//! - GUI: on-screen indicator (red / green / gray)
//! - Sound: one tone per alert onset
//! - ExternalDevice: indicator device set to red / green
//!
//! `AlertDispatcher` routes the single debounced signal to the active channel
//! and holds every other channel in its neutral state.

use anyhow::{anyhow, bail, Result};
use std::fmt;
use std::str::FromStr;

pub mod device;
pub mod gui;
pub(crate) mod mqtt;
pub mod sound;

pub use device::{
    open_device, DeviceChannel, DeviceCommand, DeviceLog, FileIndicatorDevice, IndicatorDevice,
    MemoryIndicatorDevice, Rgb,
};
pub use gui::{GuiChannel, IndicatorColor, IndicatorSink, SharedIndicator};
pub use mqtt::MqttIndicatorDevice;
pub use sound::{
    tone_player, BeepCommand, MemoryTonePlayer, SoundChannel, TerminalBell, Tone, TonePlayer,
};

/// User-selected alert channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlertMethod {
    #[default]
    Gui,
    Sound,
    ExternalDevice,
}

impl AlertMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertMethod::Gui => "GUI",
            AlertMethod::Sound => "Sound",
            AlertMethod::ExternalDevice => "ExternalDevice",
        }
    }
}

impl fmt::Display for AlertMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AlertMethod {
    /// Fails unless a channel for this method is among `available`.
    pub fn ensure_available(self, available: &[AlertMethod]) -> Result<()> {
        if available.contains(&self) {
            return Ok(());
        }
        if self == AlertMethod::ExternalDevice {
            bail!("alert method ExternalDevice needs an indicator device (device.endpoint)");
        }
        bail!("no {} alert channel is available", self)
    }
}

impl FromStr for AlertMethod {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gui" | "screen" => Ok(AlertMethod::Gui),
            "sound" | "beep" => Ok(AlertMethod::Sound),
            "externaldevice" | "external" | "device" | "streamdeck" => {
                Ok(AlertMethod::ExternalDevice)
            }
            other => Err(anyhow!(
                "unknown alert method '{}' (expected gui, sound or device)",
                other
            )),
        }
    }
}

/// One alert output, selected by `AlertMethod`.
pub enum AlertChannel {
    Gui(GuiChannel),
    Sound(SoundChannel),
    Device(DeviceChannel),
}

impl AlertChannel {
    pub fn method(&self) -> AlertMethod {
        match self {
            AlertChannel::Gui(_) => AlertMethod::Gui,
            AlertChannel::Sound(_) => AlertMethod::Sound,
            AlertChannel::Device(_) => AlertMethod::ExternalDevice,
        }
    }

    /// Apply the debounced signal while this channel is active.
    pub fn update(&mut self, alerting: bool) -> Result<()> {
        match self {
            AlertChannel::Gui(channel) => channel.update(alerting),
            AlertChannel::Sound(channel) => channel.update(alerting),
            AlertChannel::Device(channel) => channel.update(alerting),
        }
    }

    /// Put the channel in its neutral state while another channel is active.
    pub fn deactivate(&mut self) -> Result<()> {
        match self {
            AlertChannel::Gui(channel) => channel.deactivate(),
            AlertChannel::Sound(channel) => channel.deactivate(),
            AlertChannel::Device(channel) => channel.deactivate(),
        }
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            AlertChannel::Gui(channel) => channel.close(),
            AlertChannel::Sound(channel) => channel.close(),
            AlertChannel::Device(channel) => channel.close(),
        }
    }
}

/// Routes the debounced alert signal to exactly one channel.
#[derive(Default)]
pub struct AlertDispatcher {
    channels: Vec<AlertChannel>,
    missing_reported: Option<AlertMethod>,
    closed: bool,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel, replacing any channel of the same method.
    pub fn add(&mut self, channel: AlertChannel) {
        let method = channel.method();
        self.channels.retain(|existing| existing.method() != method);
        self.channels.push(channel);
    }

    pub fn with_channel(mut self, channel: AlertChannel) -> Self {
        self.add(channel);
        self
    }

    pub fn has_channel(&self, method: AlertMethod) -> bool {
        self.channels.iter().any(|channel| channel.method() == method)
    }

    pub fn methods(&self) -> Vec<AlertMethod> {
        self.channels.iter().map(AlertChannel::method).collect()
    }

    /// Startup check that the selected method can actually be shown.
    pub fn require_channel(&self, method: AlertMethod) -> Result<()> {
        method.ensure_available(&self.methods())
    }

    /// Update the channel matching `method` with `alerting`; every other
    /// channel is deactivated. Channel failures are logged and skipped.
    pub fn dispatch(&mut self, method: AlertMethod, alerting: bool) {
        if self.closed {
            return;
        }
        let mut delivered = false;
        for channel in &mut self.channels {
            let active = channel.method() == method;
            let result = if active {
                delivered = true;
                channel.update(alerting)
            } else {
                channel.deactivate()
            };
            if let Err(err) = result {
                log::warn!("{} alert channel command failed: {:#}", channel.method(), err);
            }
        }

        if delivered {
            self.missing_reported = None;
        } else if self.missing_reported != Some(method) {
            log::warn!(
                "alert method {} selected but no such channel is available; alerts are not shown",
                method
            );
            self.missing_reported = Some(method);
        }
    }

    /// Close every channel exactly once. Returns the first failure.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_err = None;
        for channel in &mut self.channels {
            if let Err(err) = channel.close() {
                log::warn!("failed to close {} alert channel: {:#}", channel.method(), err);
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        dispatcher: AlertDispatcher,
        indicator: SharedIndicator,
        tones: MemoryTonePlayer,
        device: DeviceLog,
    }

    fn harness() -> Result<Harness> {
        let indicator = SharedIndicator::new();
        let tones = MemoryTonePlayer::new();
        let device = MemoryIndicatorDevice::new("dispatch");
        let device_log = device.log();
        let dispatcher = AlertDispatcher::new()
            .with_channel(AlertChannel::Gui(GuiChannel::new(Box::new(
                indicator.clone(),
            ))))
            .with_channel(AlertChannel::Sound(SoundChannel::new(
                Box::new(tones.clone()),
                Tone::default(),
            )))
            .with_channel(AlertChannel::Device(DeviceChannel::new(Box::new(device))?));
        Ok(Harness {
            dispatcher,
            indicator,
            tones,
            device: device_log,
        })
    }

    #[test]
    fn alert_method_parsing() -> Result<()> {
        assert_eq!("GUI".parse::<AlertMethod>()?, AlertMethod::Gui);
        assert_eq!("sound".parse::<AlertMethod>()?, AlertMethod::Sound);
        assert_eq!("StreamDeck".parse::<AlertMethod>()?, AlertMethod::ExternalDevice);
        assert_eq!("device".parse::<AlertMethod>()?, AlertMethod::ExternalDevice);
        assert!("pager".parse::<AlertMethod>().is_err());
        for method in [AlertMethod::Gui, AlertMethod::Sound, AlertMethod::ExternalDevice] {
            assert_eq!(method.as_str().parse::<AlertMethod>()?, method);
        }
        Ok(())
    }

    #[test]
    fn gui_selection_drives_indicator_only() -> Result<()> {
        let mut h = harness()?;
        let device_commands = h.device.len();

        h.dispatcher.dispatch(AlertMethod::Gui, true);
        assert_eq!(h.indicator.color(), IndicatorColor::Red);
        assert_eq!(h.tones.count(), 0);
        assert_eq!(h.device.len(), device_commands);

        h.dispatcher.dispatch(AlertMethod::Gui, false);
        assert_eq!(h.indicator.color(), IndicatorColor::Green);
        Ok(())
    }

    #[test]
    fn sound_selection_grays_gui_and_leaves_device_alone() -> Result<()> {
        let mut h = harness()?;
        let device_commands = h.device.len();

        for _ in 0..10 {
            h.dispatcher.dispatch(AlertMethod::Sound, true);
        }
        assert_eq!(h.indicator.color(), IndicatorColor::Gray);
        assert_eq!(h.tones.count(), 1);
        assert_eq!(h.device.len(), device_commands);
        Ok(())
    }

    #[test]
    fn device_selection_sets_device_red_then_green() -> Result<()> {
        let mut h = harness()?;

        h.dispatcher.dispatch(AlertMethod::ExternalDevice, true);
        assert_eq!(
            h.device.commands().last(),
            Some(&DeviceCommand::SetColor(Rgb::RED))
        );
        assert_eq!(h.indicator.color(), IndicatorColor::Gray);

        // Switching away returns the device to green exactly once.
        h.dispatcher.dispatch(AlertMethod::Sound, true);
        h.dispatcher.dispatch(AlertMethod::Sound, true);
        let greens = h
            .device
            .commands()
            .iter()
            .filter(|command| **command == DeviceCommand::SetColor(Rgb::GREEN))
            .count();
        assert_eq!(greens, 2); // one at open, one on switch
        Ok(())
    }

    #[test]
    fn repeated_good_dispatch_has_no_side_effects() -> Result<()> {
        let mut h = harness()?;
        let device_commands = h.device.len();

        for method in [AlertMethod::Sound, AlertMethod::ExternalDevice] {
            for _ in 0..20 {
                h.dispatcher.dispatch(method, false);
            }
        }
        assert_eq!(h.tones.count(), 0);
        assert_eq!(h.device.len(), device_commands);
        Ok(())
    }

    #[test]
    fn missing_channel_does_not_disturb_others() {
        let indicator = SharedIndicator::new();
        let mut dispatcher = AlertDispatcher::new().with_channel(AlertChannel::Gui(
            GuiChannel::new(Box::new(indicator.clone())),
        ));
        assert!(!dispatcher.has_channel(AlertMethod::ExternalDevice));

        dispatcher.dispatch(AlertMethod::ExternalDevice, true);
        assert_eq!(indicator.color(), IndicatorColor::Gray);
        assert_eq!(dispatcher.methods(), vec![AlertMethod::Gui]);
    }

    #[test]
    fn device_method_without_device_channel_is_rejected() -> Result<()> {
        let dispatcher = AlertDispatcher::new()
            .with_channel(AlertChannel::Gui(GuiChannel::new(Box::new(
                SharedIndicator::new(),
            ))))
            .with_channel(AlertChannel::Sound(SoundChannel::new(
                Box::new(MemoryTonePlayer::new()),
                Tone::default(),
            )));
        dispatcher.require_channel(AlertMethod::Gui)?;
        dispatcher.require_channel(AlertMethod::Sound)?;

        let err = dispatcher
            .require_channel(AlertMethod::ExternalDevice)
            .expect_err("no device channel");
        assert!(err.to_string().contains("indicator device"));

        harness()?.dispatcher.require_channel(AlertMethod::ExternalDevice)?;
        Ok(())
    }

    #[test]
    fn close_is_idempotent_and_stops_dispatch() -> Result<()> {
        let mut h = harness()?;
        h.dispatcher.close()?;
        h.dispatcher.close()?;
        let after_close = h.device.len();

        h.dispatcher.dispatch(AlertMethod::ExternalDevice, true);
        assert_eq!(h.device.len(), after_close);
        assert_eq!(h.device.commands().last(), Some(&DeviceCommand::Close));
        Ok(())
    }
}
