//! Shared viewport position.
//!
//! Written by scroll requests, read by every queued lookup's anchor when
//! the scheduler re-sorts its queue.

use flagline_engine::ViewportAnchor;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Viewport {
    scroll_y: AtomicU64,
    height: AtomicU64,
}

impl Viewport {
    pub fn update(&self, scroll_y: f64, height: Option<f64>) {
        self.scroll_y.store(scroll_y.to_bits(), Ordering::Relaxed);
        if let Some(height) = height {
            self.height.store(height.max(0.0).to_bits(), Ordering::Relaxed);
        }
    }

    /// Vertical center of the viewport in document coordinates.
    pub fn center(&self) -> f64 {
        let y = f64::from_bits(self.scroll_y.load(Ordering::Relaxed));
        let height = f64::from_bits(self.height.load(Ordering::Relaxed));
        y + height / 2.0
    }
}

/// Position of one element on the page.
#[derive(Debug)]
pub struct PageAnchor {
    viewport: Arc<Viewport>,
    top: f64,
    height: f64,
}

impl PageAnchor {
    pub fn new(viewport: Arc<Viewport>, top: f64, height: f64) -> Self {
        Self { viewport, top, height }
    }
}

impl ViewportAnchor for PageAnchor {
    fn distance_to_center(&self) -> f64 {
        (self.top + self.height / 2.0 - self.viewport.center()).abs()
    }
}
