//! Per-window view state driven from the application menu.

use std::sync::Mutex;

const ZOOM_STEP: f64 = 0.1;
const ZOOM_MIN: f64 = 0.5;

/// Webview zoom factor; `1.0` is actual size. Zooming out stops at 50%.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zoom(f64);

impl Default for Zoom {
    fn default() -> Self {
        Self(1.0)
    }
}

impl Zoom {
    pub fn factor(self) -> f64 {
        self.0
    }

    pub fn zoom_in(&mut self) -> f64 {
        self.set(self.0 + ZOOM_STEP)
    }

    pub fn zoom_out(&mut self) -> f64 {
        self.set((self.0 - ZOOM_STEP).max(ZOOM_MIN))
    }

    pub fn reset(&mut self) -> f64 {
        self.set(1.0)
    }

    // Rounded to whole percents so repeated steps don't drift.
    fn set(&mut self, factor: f64) -> f64 {
        self.0 = (factor * 100.0).round() / 100.0;
        self.0
    }
}

#[derive(Debug, Default)]
pub struct ViewState {
    pub zoom: Mutex<Zoom>,
}
