//! postured - webcam posture monitor
//!
//! This daemon:
//! 1. Loads the process configuration and the persisted user settings
//! 2. Opens the pose estimator, the alert channels and the camera
//! 3. Runs the detection loop until Ctrl-C, `quit` or camera loss
//! 4. Releases the camera, closes the channels and saves the settings

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use posture_guard::alert::{
    open_device, tone_player, AlertChannel, AlertDispatcher, AlertMethod, DeviceChannel,
    GuiChannel, SoundChannel,
};
use posture_guard::control;
use posture_guard::ui::{Ui, UiMode};
use posture_guard::{
    Camera, CameraConfig, EstimatorRegistry, PostureSession, PostureSettings, SentinelConfig,
    SettingsHandle,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Webcam posture monitor")]
struct Args {
    /// Configuration file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "POSTURE_CONFIG")]
    config: Option<PathBuf>,

    /// Alert channel: gui, sound or device. Overrides the saved settings.
    #[arg(long)]
    alert_method: Option<AlertMethod>,

    /// Seconds of bad posture before alerting. Overrides the saved settings.
    #[arg(long)]
    timeout: Option<f64>,

    /// Indicator device endpoint (mqtt://host:port/topic, stub://name or a path).
    #[arg(long)]
    device: Option<String>,

    /// Log the per-frame posture metric.
    #[arg(long)]
    show_feed: bool,

    /// Do not read control commands from stdin.
    #[arg(long)]
    no_control: bool,

    /// Output mode for progress stages and the indicator.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::new(args.ui, is_tty, !stdout_is_tty);

    let mut config = {
        let _stage = ui.stage("Load configuration");
        SentinelConfig::load_from(args.config.as_deref())?
    };
    if let Some(device) = args.device.clone() {
        config.device.endpoint = Some(device);
    }

    let mut settings = PostureSettings::load(&config.settings_path);
    if let Some(method) = args.alert_method {
        settings.alert_method = method;
    }
    if let Some(timeout) = args.timeout {
        settings.set_timeout_secs(timeout)?;
    }
    settings.camera_feed_visible = args.show_feed;

    let estimator = {
        let _stage = ui.stage("Load pose estimator");
        EstimatorRegistry::with_builtin().build(&config)?
    };
    let dispatcher = {
        let _stage = ui.stage("Open alert channels");
        build_dispatcher(&config, &ui)?
    };
    dispatcher
        .require_channel(settings.alert_method)
        .context("selected alert method cannot be shown")?;
    let mut camera = {
        let _stage = ui.stage("Open camera");
        Camera::open(CameraConfig::from(&config.camera))?
    };

    let synthetic = config.synthetic_inputs();
    if !synthetic.is_empty() {
        log::warn!(
            "SIMULATED INPUT ({}): posture alerts are scripted, not observed",
            synthetic.join(", ")
        );
    }
    log::info!("settings: {}", control::describe(&settings));

    let handle = SettingsHandle::new(settings);
    let shutdown = Arc::new(AtomicBool::new(false));
    let signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        signal.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    if !args.no_control {
        // Detached: the reader stays blocked on stdin after shutdown.
        control::spawn_stdin_control(handle.clone(), dispatcher.methods(), Arc::clone(&shutdown))?;
        log::info!(
            "control: angle <deg> | ratio <r> | method <gui|sound|device> | timeout <s> | \
             feed <on|off> | show | quit"
        );
    }

    let mut session = PostureSession::new(estimator, dispatcher);
    let result = session.run(&mut camera, &handle, &shutdown);

    let final_settings = handle.snapshot();
    match final_settings.save(&config.settings_path) {
        Ok(()) => log::info!("settings saved to {}", config.settings_path.display()),
        Err(err) => log::warn!("failed to save settings: {:#}", err),
    }

    let stats = result?;
    log::info!(
        "postured stopped: frames={} with_pose={} alerts={}",
        stats.frames_processed,
        stats.frames_with_pose,
        stats.alerts_raised
    );
    Ok(())
}

fn build_dispatcher(config: &SentinelConfig, ui: &Ui) -> Result<AlertDispatcher> {
    let mut dispatcher = AlertDispatcher::new()
        .with_channel(AlertChannel::Gui(GuiChannel::new(Box::new(ui.indicator()))))
        .with_channel(AlertChannel::Sound(SoundChannel::new(
            tone_player(&config.alert.tone_player)?,
            config.alert.tone(),
        )));

    if config.device.endpoint.is_some() {
        let device = open_device(&config.device).context("indicator device unavailable")?;
        dispatcher.add(AlertChannel::Device(DeviceChannel::new(device)?));
    }
    Ok(dispatcher)
}
