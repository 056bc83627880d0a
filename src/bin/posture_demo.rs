//! posture_demo - deterministic end-to-end synthetic run
//!
//! Plays the scripted slouch cycle (upright, slouching, empty chair) through
//! the full pipeline on simulated time, with in-memory alert channels, and
//! prints what each channel would have done.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::{Duration, Instant};

use posture_guard::alert::{
    AlertChannel, AlertDispatcher, AlertMethod, DeviceChannel, DeviceCommand, GuiChannel,
    MemoryIndicatorDevice, MemoryTonePlayer, Rgb, SharedIndicator, SoundChannel, Tone,
};
use posture_guard::pose::ScriptedEstimator;
use posture_guard::{PostureSession, PostureSettings, RawFrame};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Simulated duration in seconds.
    #[arg(long, default_value_t = 24)]
    seconds: u64,
    /// Simulated frames per second.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Seconds of bad posture before alerting.
    #[arg(long, default_value_t = 3.0)]
    timeout: f64,
    /// Alert channel: gui, sound or device.
    #[arg(long, default_value = "gui")]
    method: AlertMethod,
    /// Landmark noise (normalized units).
    #[arg(long, default_value_t = 0.0)]
    jitter: f32,
    /// Frame width.
    #[arg(long, default_value_t = 640)]
    width: u32,
    /// Frame height.
    #[arg(long, default_value_t = 480)]
    height: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    let mut settings = PostureSettings {
        alert_method: args.method,
        ..PostureSettings::default()
    };
    settings.set_timeout_secs(args.timeout)?;

    let indicator = SharedIndicator::new();
    let tones = MemoryTonePlayer::new();
    let device = MemoryIndicatorDevice::new("demo");
    let device_log = device.log();
    let dispatcher = AlertDispatcher::new()
        .with_channel(AlertChannel::Gui(GuiChannel::new(Box::new(indicator.clone()))))
        .with_channel(AlertChannel::Sound(SoundChannel::new(
            Box::new(tones.clone()),
            Tone::default(),
        )))
        .with_channel(AlertChannel::Device(DeviceChannel::new(Box::new(device))?));

    let estimator = ScriptedEstimator::slouch_cycle(args.fps, args.width, args.height)
        .with_jitter(args.jitter);
    let mut session = PostureSession::new(Box::new(estimator), dispatcher);

    let frame_interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    let total_frames = args.seconds * args.fps as u64;
    let start = Instant::now();
    let mut last_phase = session.phase();

    println!(
        "simulating {}s at {} fps, method {}, timeout {:.1}s",
        args.seconds,
        args.fps,
        settings.alert_method,
        settings.timeout.as_secs_f64()
    );
    for index in 0..total_frames {
        let frame = RawFrame::synthetic(args.width, args.height, index + 1);
        let offset = frame_interval.mul_f64(index as f64);
        let outcome = session.process_frame(&frame, &settings, start + offset);
        if outcome.phase != last_phase {
            let metric = outcome
                .metric
                .map(|m| {
                    format!(
                        "angle {:.1} deg, offset {:.1} px",
                        m.angle_degrees, m.horizontal_offset_px
                    )
                })
                .unwrap_or_else(|| "no pose".to_string());
            println!(
                "t={:>6.1}s  {:?} -> {:?}  ({})",
                offset.as_secs_f64(),
                last_phase,
                outcome.phase,
                metric
            );
            last_phase = outcome.phase;
        }
    }

    session.close()?;
    let stats = session.stats();
    let red_commands = device_log
        .commands()
        .iter()
        .filter(|command| **command == DeviceCommand::SetColor(Rgb::RED))
        .count();

    println!();
    println!("frames processed : {}", stats.frames_processed);
    println!("frames with pose : {}", stats.frames_with_pose);
    println!("alerts raised    : {}", stats.alerts_raised);
    println!("gui indicator    : {} ({} updates)", indicator.color(), indicator.updates());
    println!("tones played     : {}", tones.count());
    println!("device commands  : {} ({} red)", device_log.len(), red_commands);
    Ok(())
}
