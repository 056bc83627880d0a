use anyhow::Result;
use rand::Rng;

use crate::config::SentinelConfig;
use crate::pose::backend::PoseEstimator;
use crate::pose::landmark::{Landmark, PoseLandmarks};

const UPRIGHT_ANGLE_DEGREES: f32 = 172.0;
const SLOUCH_ANGLE_DEGREES: f32 = 140.0;
const UPRIGHT_SECS: u32 = 5;
const SLOUCH_SECS: u32 = 6;
const ABSENT_SECS: u32 = 1;

/// Scripted backend for demos and tests. Ignores pixels and plays back a
/// fixed sequence of per-frame results.
///
/// Non-looping scripts hold their last entry once exhausted; an empty script
/// never reports a pose.
pub struct ScriptedEstimator {
    script: Vec<Option<PoseLandmarks>>,
    cursor: usize,
    looping: bool,
    jitter: f32,
    calls: u64,
}

impl ScriptedEstimator {
    pub fn new(script: Vec<Option<PoseLandmarks>>) -> Self {
        Self {
            script,
            cursor: 0,
            looping: false,
            jitter: 0.0,
            calls: 0,
        }
    }

    pub fn looping(script: Vec<Option<PoseLandmarks>>) -> Self {
        Self {
            looping: true,
            ..Self::new(script)
        }
    }

    /// Add uniform noise of +/- `amount` (normalized units) to every landmark.
    pub fn with_jitter(mut self, amount: f32) -> Self {
        self.jitter = amount.abs();
        self
    }

    /// Looping script: upright, then slouching long enough to trip the default
    /// timeout, then an empty chair.
    pub fn slouch_cycle(fps: u32, width: u32, height: u32) -> Self {
        let upright = PoseLandmarks::seated(UPRIGHT_ANGLE_DEGREES, width, height);
        let slouch = PoseLandmarks::seated(SLOUCH_ANGLE_DEGREES, width, height);
        let mut script = Vec::new();
        script.extend(std::iter::repeat(Some(upright)).take((UPRIGHT_SECS * fps) as usize));
        script.extend(std::iter::repeat(Some(slouch)).take((SLOUCH_SECS * fps) as usize));
        script.extend(std::iter::repeat(None).take((ABSENT_SECS * fps) as usize));
        Self::looping(script)
    }

    pub fn from_config(config: &SentinelConfig) -> Result<Box<dyn PoseEstimator>> {
        let estimator = Self::slouch_cycle(
            config.camera.target_fps,
            config.camera.width,
            config.camera.height,
        )
        .with_jitter(config.pose.jitter);
        Ok(Box::new(estimator))
    }

    /// Number of frames estimated so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn next_entry(&mut self) -> Option<PoseLandmarks> {
        if self.script.is_empty() {
            return None;
        }
        let entry = self.script[self.cursor.min(self.script.len() - 1)];
        self.cursor += 1;
        if self.looping && self.cursor >= self.script.len() {
            self.cursor = 0;
        }
        entry
    }

    fn apply_jitter(&self, pose: PoseLandmarks) -> PoseLandmarks {
        if self.jitter <= 0.0 {
            return pose;
        }
        let mut rng = rand::thread_rng();
        let mut shake = |landmark: Landmark| Landmark {
            x: landmark.x + rng.gen_range(-self.jitter..=self.jitter),
            y: landmark.y + rng.gen_range(-self.jitter..=self.jitter),
            ..landmark
        };
        PoseLandmarks {
            ear: shake(pose.ear),
            shoulder: shake(pose.shoulder),
            hip: shake(pose.hip),
        }
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn estimate(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Option<PoseLandmarks>> {
        self.calls += 1;
        Ok(self.next_entry().map(|pose| self.apply_jitter(pose)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_looping_script_holds_last_entry() -> Result<()> {
        let pose = PoseLandmarks::seated(150.0, 640, 480);
        let mut estimator = ScriptedEstimator::new(vec![None, Some(pose)]);

        assert!(estimator.estimate(b"", 640, 480)?.is_none());
        assert_eq!(estimator.estimate(b"", 640, 480)?, Some(pose));
        assert_eq!(estimator.estimate(b"", 640, 480)?, Some(pose));
        assert_eq!(estimator.calls(), 3);
        Ok(())
    }

    #[test]
    fn looping_script_wraps_around() -> Result<()> {
        let pose = PoseLandmarks::seated(150.0, 640, 480);
        let mut estimator = ScriptedEstimator::looping(vec![Some(pose), None]);

        assert!(estimator.estimate(b"", 640, 480)?.is_some());
        assert!(estimator.estimate(b"", 640, 480)?.is_none());
        assert!(estimator.estimate(b"", 640, 480)?.is_some());
        Ok(())
    }

    #[test]
    fn empty_script_reports_no_pose() -> Result<()> {
        let mut estimator = ScriptedEstimator::new(Vec::new());
        assert!(estimator.estimate(b"", 640, 480)?.is_none());
        Ok(())
    }

    #[test]
    fn slouch_cycle_covers_all_phases() -> Result<()> {
        let fps = 2;
        let mut estimator = ScriptedEstimator::slouch_cycle(fps, 640, 480);
        let cycle = (UPRIGHT_SECS + SLOUCH_SECS + ABSENT_SECS) * fps;

        let mut present = 0;
        let mut absent = 0;
        for _ in 0..cycle {
            match estimator.estimate(b"", 640, 480)? {
                Some(_) => present += 1,
                None => absent += 1,
            }
        }
        assert_eq!(present, (UPRIGHT_SECS + SLOUCH_SECS) * fps);
        assert_eq!(absent, ABSENT_SECS * fps);
        Ok(())
    }

    #[test]
    fn jitter_stays_within_bounds() -> Result<()> {
        let pose = PoseLandmarks::seated(170.0, 640, 480);
        let mut estimator = ScriptedEstimator::new(vec![Some(pose)]).with_jitter(0.01);

        for _ in 0..20 {
            let shaken = estimator.estimate(b"", 640, 480)?.expect("pose");
            assert!((shaken.ear.x - pose.ear.x).abs() <= 0.01 + f32::EPSILON);
            assert!((shaken.hip.y - pose.hip.y).abs() <= 0.01 + f32::EPSILON);
        }
        Ok(())
    }
}
