use anyhow::Result;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Color of the on-screen posture indicator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IndicatorColor {
    Red,
    Green,
    /// The GUI channel is not the active alert method.
    #[default]
    Gray,
}

impl IndicatorColor {
    pub fn for_alert(alerting: bool) -> Self {
        if alerting {
            IndicatorColor::Red
        } else {
            IndicatorColor::Green
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorColor::Red => "red",
            IndicatorColor::Green => "green",
            IndicatorColor::Gray => "gray",
        }
    }
}

impl fmt::Display for IndicatorColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whatever renders the indicator (a window widget, a terminal status line).
pub trait IndicatorSink: Send {
    fn set_indicator(&mut self, color: IndicatorColor);
}

/// Indicator state shared with another thread (e.g. a UI event loop).
///
/// Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct SharedIndicator {
    color: Arc<Mutex<IndicatorColor>>,
    updates: Arc<AtomicU64>,
}

impl SharedIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(&self) -> IndicatorColor {
        *self.color.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of times the indicator was set.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

impl IndicatorSink for SharedIndicator {
    fn set_indicator(&mut self, color: IndicatorColor) {
        *self.color.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = color;
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// On-screen indicator channel: red while alerting, green otherwise, gray
/// while another channel is active.
pub struct GuiChannel {
    sink: Box<dyn IndicatorSink>,
    shown: Option<IndicatorColor>,
}

impl GuiChannel {
    pub fn new(sink: Box<dyn IndicatorSink>) -> Self {
        Self { sink, shown: None }
    }

    pub fn update(&mut self, alerting: bool) -> Result<()> {
        self.show(IndicatorColor::for_alert(alerting));
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<()> {
        self.show(IndicatorColor::Gray);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.deactivate()
    }

    /// Last color pushed to the sink.
    pub fn shown(&self) -> Option<IndicatorColor> {
        self.shown
    }

    fn show(&mut self, color: IndicatorColor) {
        if self.shown == Some(color) {
            return;
        }
        log::debug!("gui indicator -> {}", color);
        self.sink.set_indicator(color);
        self.shown = Some(color);
    }
}
