use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_TONE_FREQUENCY_HZ: u32 = 1000;
pub const DEFAULT_TONE_DURATION: Duration = Duration::from_millis(500);

/// A fixed-frequency beep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration: Duration,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_TONE_FREQUENCY_HZ,
            duration: DEFAULT_TONE_DURATION,
        }
    }
}

/// Something that can emit a tone. Must not block the detection loop for the
/// duration of the tone.
pub trait TonePlayer: Send {
    fn name(&self) -> &'static str;

    fn play(&mut self, tone: Tone) -> Result<()>;
}

/// Runs the `beep` utility (`beep -f <hz> -l <ms>`) in the background.
pub struct BeepCommand {
    program: String,
}

impl BeepCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(tone: Tone) -> [String; 4] {
        [
            "-f".to_string(),
            tone.frequency_hz.to_string(),
            "-l".to_string(),
            tone.duration.as_millis().to_string(),
        ]
    }
}

impl TonePlayer for BeepCommand {
    fn name(&self) -> &'static str {
        "beep"
    }

    fn play(&mut self, tone: Tone) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(Self::args(tone))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to run {}", self.program))?;
        // Reap in the background so the loop never waits on the tone.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

/// Writes the terminal bell character to stderr. Frequency and duration are
/// up to the terminal.
pub struct TerminalBell;

impl TonePlayer for TerminalBell {
    fn name(&self) -> &'static str {
        "bell"
    }

    fn play(&mut self, _tone: Tone) -> Result<()> {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Stub player that records tones instead of playing them.
///
/// Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct MemoryTonePlayer {
    played: Arc<Mutex<Vec<Tone>>>,
}

impl MemoryTonePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<Tone> {
        self.played
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.played
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl TonePlayer for MemoryTonePlayer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn play(&mut self, tone: Tone) -> Result<()> {
        self.played
            .lock()
            .map_err(|_| anyhow!("tone record lock poisoned"))?
            .push(tone);
        Ok(())
    }
}

/// Build the tone player named in the configuration.
pub fn tone_player(kind: &str) -> Result<Box<dyn TonePlayer>> {
    match kind {
        "beep" => Ok(Box::new(BeepCommand::new("beep"))),
        "bell" => Ok(Box::new(TerminalBell)),
        "stub" => Ok(Box::new(MemoryTonePlayer::new())),
        other => Err(anyhow!(
            "unknown tone player '{}' (expected beep, bell or stub)",
            other
        )),
    }
}

/// Audible channel: one tone on entering the alert state, nothing while it
/// persists, re-armed on recovery or when another channel takes over.
pub struct SoundChannel {
    player: Box<dyn TonePlayer>,
    tone: Tone,
    alerting: bool,
}

impl SoundChannel {
    pub fn new(player: Box<dyn TonePlayer>, tone: Tone) -> Self {
        Self {
            player,
            tone,
            alerting: false,
        }
    }

    pub fn update(&mut self, alerting: bool) -> Result<()> {
        let rising = alerting && !self.alerting;
        self.alerting = alerting;
        if rising {
            log::debug!(
                "sound alert: {} Hz for {} ms via {}",
                self.tone.frequency_hz,
                self.tone.duration.as_millis(),
                self.player.name()
            );
            self.player.play(self.tone)?;
        }
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<()> {
        self.alerting = false;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.deactivate()
    }
}
