//! Line-oriented control commands (the settings panel of the terminal build).
//!
//! ```text
//! angle 150        ratio 0.08       timeout 2.5
//! method sound     feed on          show        quit
//! ```

use anyhow::{anyhow, bail, Context, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::alert::AlertMethod;
use crate::settings::{PostureSettings, SettingsHandle};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlCommand {
    AngleThreshold(f32),
    DistanceRatio(f32),
    Method(AlertMethod),
    TimeoutSecs(f64),
    CameraFeed(bool),
    Show,
    Quit,
}

/// What the caller should do after a command was applied.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlReply {
    Updated(Arc<PostureSettings>),
    Show(Arc<PostureSettings>),
    Quit,
}

impl ControlCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = words
            .next()
            .ok_or_else(|| anyhow!("empty command"))?
            .to_ascii_lowercase();
        let argument = words.next();
        if words.next().is_some() {
            bail!("too many arguments for '{}'", command);
        }
        let value = || argument.ok_or_else(|| anyhow!("'{}' needs a value", command));

        let parsed = match command.as_str() {
            "angle" => ControlCommand::AngleThreshold(
                value()?.parse().context("angle must be a number of degrees")?,
            ),
            "ratio" => ControlCommand::DistanceRatio(
                value()?.parse().context("ratio must be a number")?,
            ),
            "timeout" => ControlCommand::TimeoutSecs(
                value()?.parse().context("timeout must be a number of seconds")?,
            ),
            "method" => ControlCommand::Method(value()?.parse()?),
            "feed" => ControlCommand::CameraFeed(match value()?.to_ascii_lowercase().as_str() {
                "on" | "show" | "true" => true,
                "off" | "hide" | "false" => false,
                other => bail!("feed expects on or off, got '{}'", other),
            }),
            "show" if argument.is_none() => ControlCommand::Show,
            "quit" | "exit" if argument.is_none() => ControlCommand::Quit,
            "show" | "quit" | "exit" => bail!("'{}' takes no value", command),
            other => bail!("unknown command '{}'", other),
        };
        Ok(parsed)
    }

    /// Validate and publish the change. Invalid values, and methods with no
    /// channel in `available`, leave the current settings untouched.
    pub fn apply(
        self,
        settings: &SettingsHandle,
        available: &[AlertMethod],
    ) -> Result<ControlReply> {
        let updated = match self {
            ControlCommand::AngleThreshold(degrees) => {
                settings.update(|s| s.set_angle_threshold(degrees))?
            }
            ControlCommand::DistanceRatio(ratio) => {
                settings.update(|s| s.set_distance_threshold_ratio(ratio))?
            }
            ControlCommand::TimeoutSecs(secs) => settings.update(|s| s.set_timeout_secs(secs))?,
            ControlCommand::Method(method) => {
                method.ensure_available(available)?;
                settings.update(|s| {
                    s.alert_method = method;
                    Ok(())
                })?
            }
            ControlCommand::CameraFeed(visible) => settings.update(|s| {
                s.camera_feed_visible = visible;
                Ok(())
            })?,
            ControlCommand::Show => return Ok(ControlReply::Show(settings.snapshot())),
            ControlCommand::Quit => return Ok(ControlReply::Quit),
        };
        Ok(ControlReply::Updated(updated))
    }
}

pub fn describe(settings: &PostureSettings) -> String {
    format!(
        "angle {:.0} deg, ratio {:.2}, method {}, timeout {:.1}s, feed {}",
        settings.angle_threshold,
        settings.distance_threshold_ratio,
        settings.alert_method,
        settings.timeout.as_secs_f64(),
        if settings.camera_feed_visible { "on" } else { "off" }
    )
}

/// Read commands from `input` until `quit`, end of input or shutdown. `quit`
/// sets `shutdown`; end of input only stops reading. `available` lists the
/// alert methods that have a channel.
pub fn run_control<R: BufRead>(
    input: R,
    settings: &SettingsHandle,
    available: &[AlertMethod],
    shutdown: &AtomicBool,
) {
    for line in input.lines() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                log::warn!("control input failed: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match ControlCommand::parse(&line).and_then(|command| command.apply(settings, available)) {
            Ok(ControlReply::Updated(current)) => log::info!("settings: {}", describe(&current)),
            Ok(ControlReply::Show(current)) => eprintln!("{}", describe(&current)),
            Ok(ControlReply::Quit) => {
                log::info!("quit requested");
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(err) => log::warn!("ignored command '{}': {:#}", line.trim(), err),
        }
    }
}

/// Read control commands from stdin on a background thread.
pub fn spawn_stdin_control(
    settings: SettingsHandle,
    available: Vec<AlertMethod>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("control".to_string())
        .spawn(move || {
            run_control(std::io::stdin().lock(), &settings, &available, &shutdown)
        })
        .context("failed to start control thread")
}
