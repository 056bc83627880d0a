//! The detection loop.
//!
//! Per frame: settings snapshot -> pose estimate -> posture metric ->
//! evaluation -> debounce -> alert dispatch. The loop runs on the calling
//! thread until the camera closes or shutdown is requested, then releases the
//! camera and closes every alert channel exactly once.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::alert::{AlertDispatcher, AlertMethod};
use crate::debounce::{AlertDebouncer, AlertPhase};
use crate::frame::RawFrame;
use crate::ingest::Camera;
use crate::pose::PoseEstimator;
use crate::posture::PostureMetric;
use crate::settings::{PostureSettings, SettingsHandle};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// What one frame did to the session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOutcome {
    pub sequence: u64,
    /// `None` when no pose was found in the frame.
    pub metric: Option<PostureMetric>,
    pub is_bad: bool,
    pub phase: AlertPhase,
    pub method: AlertMethod,
}

impl FrameOutcome {
    pub fn alerting(&self) -> bool {
        self.phase.is_alerting()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub frames_with_pose: u64,
    pub estimator_errors: u64,
    /// Number of Idle/Pending -> Alerting transitions.
    pub alerts_raised: u64,
}

pub struct PostureSession {
    estimator: Box<dyn PoseEstimator>,
    debouncer: AlertDebouncer,
    dispatcher: AlertDispatcher,
    phase: AlertPhase,
    stats: SessionStats,
}

impl PostureSession {
    pub fn new(estimator: Box<dyn PoseEstimator>, dispatcher: AlertDispatcher) -> Self {
        Self {
            estimator,
            debouncer: AlertDebouncer::default(),
            dispatcher,
            phase: AlertPhase::Idle,
            stats: SessionStats::default(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Run one frame through the pipeline as of `now`.
    pub fn process_frame(
        &mut self,
        frame: &RawFrame,
        settings: &PostureSettings,
        now: Instant,
    ) -> FrameOutcome {
        self.stats.frames_processed += 1;
        self.debouncer.set_timeout(settings.timeout);

        let landmarks = match frame.inference_view().run_estimator(self.estimator.as_mut()) {
            Ok(landmarks) => landmarks,
            Err(err) => {
                self.stats.estimator_errors += 1;
                log::debug!(
                    "{} estimator failed on frame {}: {:#}",
                    self.estimator.name(),
                    frame.sequence(),
                    err
                );
                None
            }
        };
        let metric = landmarks.and_then(|landmarks| {
            PostureMetric::from_landmarks(&landmarks, frame.width, frame.height)
        });
        if metric.is_some() {
            self.stats.frames_with_pose += 1;
        }

        let thresholds = settings.thresholds();
        let is_bad = metric
            .map(|metric| thresholds.evaluate(&metric))
            .unwrap_or(false);
        let phase = self.debouncer.observe(is_bad, now);
        self.note_transition(phase);

        if settings.camera_feed_visible {
            match &metric {
                Some(metric) => log::info!(
                    "frame {}: angle {:.1} deg (min {:.0}), offset {:.1} px (max {:.1}) -> {}",
                    frame.sequence(),
                    metric.angle_degrees,
                    thresholds.angle_threshold_degrees,
                    metric.horizontal_offset_px,
                    thresholds.distance_threshold_px(metric.frame_width_px),
                    if is_bad { "bad" } else { "good" }
                ),
                None => log::info!("frame {}: no pose", frame.sequence()),
            }
        }

        self.dispatcher
            .dispatch(settings.alert_method, phase.is_alerting());

        FrameOutcome {
            sequence: frame.sequence(),
            metric,
            is_bad,
            phase,
            method: settings.alert_method,
        }
    }

    fn note_transition(&mut self, phase: AlertPhase) {
        let previous = std::mem::replace(&mut self.phase, phase);
        if previous == phase {
            return;
        }
        match (previous, phase) {
            (_, AlertPhase::Alerting) => {
                self.stats.alerts_raised += 1;
                log::info!(
                    "bad posture for {:.1}s, alerting",
                    self.debouncer.timeout().as_secs_f32()
                );
            }
            (AlertPhase::Alerting, _) => log::info!("posture recovered"),
            (previous, phase) => log::debug!("posture phase {:?} -> {:?}", previous, phase),
        }
    }

    /// Poll `camera` until it closes or `shutdown` is set. The camera is
    /// released and the alert channels closed before returning.
    pub fn run(
        &mut self,
        camera: &mut Camera,
        settings: &SettingsHandle,
        shutdown: &AtomicBool,
    ) -> Result<SessionStats> {
        log::info!(
            "{} estimator running on {}",
            self.estimator.name(),
            camera.stats().device
        );
        let mut last_health_log = Instant::now();

        while camera.is_opened() && !shutdown.load(Ordering::SeqCst) {
            if let Some(frame) = camera.get_frame() {
                let snapshot = settings.snapshot();
                self.process_frame(&frame, &snapshot, Instant::now());
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let camera_stats = camera.stats();
                log::info!(
                    "camera={} frames={} read_failures={} with_pose={} alerts={} phase={:?}",
                    camera_stats.device,
                    camera_stats.frames_captured,
                    camera_stats.read_failures,
                    self.stats.frames_with_pose,
                    self.stats.alerts_raised,
                    self.phase
                );
                last_health_log = Instant::now();
            }
        }

        if !camera.is_opened() {
            log::warn!("camera {} closed, stopping", camera.stats().device);
        }
        camera.release();
        self.dispatcher.close()?;
        Ok(self.stats)
    }

    /// Close the alert channels without running the loop.
    pub fn close(&mut self) -> Result<()> {
        self.dispatcher.close()
    }
}
