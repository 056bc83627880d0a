use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use posture_guard::alert::{
    AlertChannel, AlertDispatcher, AlertMethod, DeviceChannel, DeviceCommand, DeviceLog,
    GuiChannel, IndicatorColor, MemoryIndicatorDevice, MemoryTonePlayer, Rgb, SharedIndicator,
    SoundChannel, Tone,
};
use posture_guard::pose::{PoseLandmarks, ScriptedEstimator};
use posture_guard::{
    AlertPhase, Camera, CameraConfig, PostureSession, PostureSettings, RawFrame, SettingsHandle,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Ear straight above the shoulder (zero horizontal offset) with the hip
/// placed so the shoulder angle is `angle_degrees`.
fn pose_at(angle_degrees: f32) -> PoseLandmarks {
    let (w, h) = (WIDTH as f32, HEIGHT as f32);
    let shoulder = (320.0, 240.0);
    let ear = (320.0, 140.0);
    let theta = angle_degrees.to_radians();
    let hip = (
        shoulder.0 + 150.0 * theta.sin(),
        shoulder.1 - 150.0 * theta.cos(),
    );
    PoseLandmarks::new(
        (ear.0 / w, ear.1 / h),
        (shoulder.0 / w, shoulder.1 / h),
        (hip.0 / w, hip.1 / h),
    )
}

struct Rig {
    session: PostureSession,
    indicator: SharedIndicator,
    tones: MemoryTonePlayer,
    device: DeviceLog,
}

fn rig(script: Vec<Option<PoseLandmarks>>) -> Result<Rig> {
    let indicator = SharedIndicator::new();
    let tones = MemoryTonePlayer::new();
    let device = MemoryIndicatorDevice::new("desk");
    let device_log = device.log();
    let dispatcher = AlertDispatcher::new()
        .with_channel(AlertChannel::Gui(GuiChannel::new(Box::new(indicator.clone()))))
        .with_channel(AlertChannel::Sound(SoundChannel::new(
            Box::new(tones.clone()),
            Tone::default(),
        )))
        .with_channel(AlertChannel::Device(DeviceChannel::new(Box::new(device))?));
    Ok(Rig {
        session: PostureSession::new(Box::new(ScriptedEstimator::new(script)), dispatcher),
        indicator,
        tones,
        device: device_log,
    })
}

fn settings(method: AlertMethod) -> PostureSettings {
    PostureSettings {
        alert_method: method,
        timeout: Duration::from_secs(3),
        ..PostureSettings::default()
    }
}

fn at(start: Instant, millis: u64) -> Instant {
    start + Duration::from_millis(millis)
}

#[test]
fn slouch_alerts_only_after_timeout() -> Result<()> {
    let mut rig = rig(vec![Some(pose_at(150.0))])?;
    let settings = settings(AlertMethod::Gui);
    let start = Instant::now();

    let mut sequence = 0;
    for millis in (0..3000).step_by(100) {
        sequence += 1;
        let frame = RawFrame::synthetic(WIDTH, HEIGHT, sequence);
        let outcome = rig.session.process_frame(&frame, &settings, at(start, millis));
        assert!(outcome.is_bad);
        let metric = outcome.metric.expect("pose found");
        assert!(metric.horizontal_offset_px.abs() < 0.01);
        assert!(!outcome.alerting(), "alerted early at {} ms", millis);
        assert_eq!(rig.indicator.color(), IndicatorColor::Green);
    }

    let frame = RawFrame::synthetic(WIDTH, HEIGHT, sequence + 1);
    let outcome = rig.session.process_frame(&frame, &settings, at(start, 3000));
    assert_eq!(outcome.phase, AlertPhase::Alerting);
    assert_eq!(rig.indicator.color(), IndicatorColor::Red);
    assert_eq!(rig.session.stats().alerts_raised, 1);
    Ok(())
}

#[test]
fn good_frame_resets_the_streak() -> Result<()> {
    let mut script = vec![Some(pose_at(150.0)); 15];
    script.push(Some(pose_at(170.0)));
    script.push(Some(pose_at(150.0)));
    let mut rig = rig(script)?;
    let settings = settings(AlertMethod::Gui);
    let start = Instant::now();

    // Bad from 0.0 s to 1.4 s, good at 1.5 s, bad again from 1.6 s.
    let mut phases = Vec::new();
    for (index, millis) in (0..=4500).step_by(100).enumerate() {
        let frame = RawFrame::synthetic(WIDTH, HEIGHT, index as u64 + 1);
        let outcome = rig.session.process_frame(&frame, &settings, at(start, millis));
        phases.push((millis, outcome.is_bad, outcome.phase));
    }

    assert!(phases
        .iter()
        .any(|&(millis, is_bad, phase)| millis == 1500 && !is_bad && phase == AlertPhase::Idle));
    for &(millis, _, phase) in &phases {
        if millis < 4600 {
            assert_ne!(phase, AlertPhase::Alerting, "alerted at {} ms", millis);
        }
    }
    assert_eq!(rig.session.phase(), AlertPhase::Pending);

    let frame = RawFrame::synthetic(WIDTH, HEIGHT, 100);
    let outcome = rig.session.process_frame(&frame, &settings, at(start, 4600));
    assert!(outcome.alerting());
    Ok(())
}

#[test]
fn sound_method_leaves_gui_gray_and_device_untouched() -> Result<()> {
    let mut rig = rig(vec![Some(pose_at(120.0))])?;
    let settings = settings(AlertMethod::Sound);
    let startup_commands = rig.device.len();
    let start = Instant::now();

    for i in 0..60u64 {
        let frame = RawFrame::synthetic(WIDTH, HEIGHT, i + 1);
        rig.session.process_frame(&frame, &settings, at(start, i * 100));
    }

    assert_eq!(rig.session.phase(), AlertPhase::Alerting);
    assert_eq!(rig.indicator.color(), IndicatorColor::Gray);
    assert_eq!(rig.tones.count(), 1);
    assert_eq!(rig.device.len(), startup_commands);
    Ok(())
}

#[test]
fn device_method_turns_device_red_then_green_on_recovery() -> Result<()> {
    let mut script = vec![Some(pose_at(120.0)); 40];
    script.push(Some(pose_at(175.0)));
    let mut rig = rig(script)?;
    let settings = settings(AlertMethod::ExternalDevice);
    let start = Instant::now();

    for i in 0..45u64 {
        let frame = RawFrame::synthetic(WIDTH, HEIGHT, i + 1);
        rig.session.process_frame(&frame, &settings, at(start, i * 100));
    }
    rig.session.close()?;

    let colors: Vec<Rgb> = rig
        .device
        .commands()
        .into_iter()
        .filter_map(|command| match command {
            DeviceCommand::SetColor(color) => Some(color),
            DeviceCommand::Close => None,
        })
        .collect();
    assert_eq!(
        colors,
        vec![Rgb::OFF, Rgb::GREEN, Rgb::RED, Rgb::GREEN, Rgb::OFF]
    );
    assert_eq!(rig.device.commands().last(), Some(&DeviceCommand::Close));
    assert_eq!(rig.tones.count(), 0);
    Ok(())
}

#[test]
fn run_loop_follows_settings_and_stops_on_shutdown() -> Result<()> {
    let mut rig = rig(vec![Some(pose_at(120.0))])?;
    let mut camera = Camera::open(CameraConfig {
        device: "stub://integration".to_string(),
        target_fps: 50,
        width: 64,
        height: 48,
    })?;
    let handle = SettingsHandle::new(PostureSettings {
        timeout: Duration::ZERO,
        ..PostureSettings::default()
    });
    let shutdown = Arc::new(AtomicBool::new(false));

    let stopper = {
        let shutdown = Arc::clone(&shutdown);
        let handle = handle.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            let _ = handle.update(|s| {
                s.alert_method = AlertMethod::Sound;
                Ok(())
            });
            std::thread::sleep(Duration::from_millis(200));
            shutdown.store(true, Ordering::SeqCst);
        })
    };

    let stats = rig.session.run(&mut camera, &handle, &shutdown)?;
    stopper.join().expect("stopper thread");

    assert!(stats.frames_processed > 0);
    assert!(!camera.is_opened());
    assert_eq!(rig.indicator.color(), IndicatorColor::Gray);
    assert_eq!(rig.tones.count(), 1);
    assert_eq!(rig.device.commands().last(), Some(&DeviceCommand::Close));
    Ok(())
}
