//! Purchase-count badge.
//!
//! One-shot per page view: find the add-to-cart control, drop a hidden badge
//! after it, and the first time the host reports it sufficiently visible,
//! count up from 0 to the target with an ease-out curve. The visibility
//! observer is disconnected at that moment, so the animation never replays.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::EngineOptions;
use crate::engine::EngineTask;
use crate::error::{EngineError, Result};
use crate::render::BadgeView;
use crate::selector::{default_anchor_probes, AnchorProbe};
use crate::surface::{ElementId, Surface};
use crate::timer::{TimerId, TimerQueue};
use crate::types::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeTask {
    Frame,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BadgePhase {
    /// Not started yet.
    Pending,
    /// Not applicable to this page, or no anchor found.
    Skipped,
    /// Mounted at zero, waiting for visibility.
    Armed,
    Animating { started_at: Duration },
    Done,
    TornDown,
}

/// `1 - (1 - t)^3`, clamped to `[0, 1]`.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

pub struct BadgeController {
    phase: BadgePhase,
    enabled: bool,
    on_product_page: bool,
    target: Option<u64>,
    view: BadgeView,
    probes: Vec<AnchorProbe>,
    element: Option<ElementId>,
    displayed: u64,
    observer_armed: bool,
    frame_timer: Option<TimerId>,
    duration: Duration,
    frame_interval: Duration,
    visibility_threshold: f64,
    runs: u32,
}

impl BadgeController {
    pub fn new(settings: &Settings, purchase_count: Option<u64>, options: &EngineOptions) -> Self {
        let label = settings
            .counter_label
            .as_deref()
            .unwrap_or(options.counter_label.as_str());
        Self {
            phase: BadgePhase::Pending,
            enabled: settings.counter_enabled,
            on_product_page: settings.page.is_product_page() && settings.page.product_id.is_some(),
            target: purchase_count,
            view: BadgeView::new(label),
            probes: default_anchor_probes(),
            element: None,
            displayed: 0,
            observer_armed: false,
            frame_timer: None,
            duration: options.count_up_duration(),
            frame_interval: options.frame_interval(),
            visibility_threshold: options.visibility_threshold,
            runs: 0,
        }
    }

    /// Replaces the anchor probe order.
    pub fn with_probes(mut self, probes: Vec<AnchorProbe>) -> Self {
        self.probes = probes;
        self
    }

    pub fn phase(&self) -> BadgePhase {
        self.phase
    }

    pub fn element(&self) -> Option<ElementId> {
        self.element
    }

    pub fn target(&self) -> u64 {
        self.target.unwrap_or(0)
    }

    pub fn displayed_value(&self) -> u64 {
        self.displayed
    }

    pub fn observer_armed(&self) -> bool {
        self.observer_armed
    }

    /// Count-up animations started so far. At most 1.
    pub fn animation_runs(&self) -> u32 {
        self.runs
    }

    /// Mounts the badge if this page qualifies. Runs once; later calls are
    /// no-ops. `AnchorNotFound` is returned for the caller to log.
    pub fn start<S: Surface>(&mut self, surface: &mut S) -> Result<()> {
        if self.phase != BadgePhase::Pending {
            return Ok(());
        }
        self.phase = BadgePhase::Skipped;

        if !self.enabled {
            debug!("Counter badge disabled");
            return Ok(());
        }
        if !self.on_product_page {
            debug!("Counter badge skipped: not a product page");
            return Ok(());
        }
        let target = match self.target {
            Some(target) if target > 0 => target,
            _ => {
                debug!("Counter badge skipped: no purchases to show");
                return Ok(());
            }
        };

        let Some((anchor, probe)) = self
            .probes
            .iter()
            .find_map(|probe| surface.find_element(probe).map(|anchor| (anchor, probe)))
        else {
            return Err(EngineError::AnchorNotFound);
        };

        let element = surface.insert_badge_after(anchor, &self.view, 0);
        self.element = Some(element);
        self.displayed = 0;
        self.observer_armed = true;
        self.phase = BadgePhase::Armed;
        info!(anchor = %probe.describe(), count = target, "Counter badge mounted");
        Ok(())
    }

    /// Visibility-observer callback. Starts the count-up the first time the
    /// badge is at least `visibility_threshold` visible; ignored afterwards.
    pub fn on_visibility<S: Surface>(
        &mut self,
        ratio: f64,
        timers: &mut TimerQueue<EngineTask>,
        surface: &mut S,
    ) -> bool {
        if !self.observer_armed || ratio < self.visibility_threshold {
            return false;
        }
        let Some(element) = self.element else {
            return false;
        };

        self.observer_armed = false;
        self.runs += 1;
        surface.set_badge_visible(element, true);
        self.phase = BadgePhase::Animating {
            started_at: timers.now(),
        };
        self.frame_timer = Some(timers.schedule(self.frame_interval, EngineTask::Badge(BadgeTask::Frame)));
        debug!(count = self.target(), "Counter badge animation started");
        true
    }

    pub fn on_task<S: Surface>(
        &mut self,
        task: BadgeTask,
        timers: &mut TimerQueue<EngineTask>,
        surface: &mut S,
    ) {
        match task {
            BadgeTask::Frame => self.on_frame(timers, surface),
        }
    }

    fn on_frame<S: Surface>(&mut self, timers: &mut TimerQueue<EngineTask>, surface: &mut S) {
        self.frame_timer = None;
        let BadgePhase::Animating { started_at } = self.phase else {
            return;
        };
        let Some(element) = self.element else {
            return;
        };

        let elapsed = timers.now().saturating_sub(started_at);
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        };
        let target = self.target();
        let value = if progress >= 1.0 {
            target
        } else {
            ((ease_out_cubic(progress) * target as f64).floor() as u64).min(target)
        };

        if value != self.displayed {
            self.displayed = value;
            surface.set_badge_text(element, &self.view.text(value));
        }

        if progress >= 1.0 {
            self.phase = BadgePhase::Done;
            debug!(value, "Counter badge animation finished");
        } else {
            self.frame_timer =
                Some(timers.schedule(self.frame_interval, EngineTask::Badge(BadgeTask::Frame)));
        }
    }

    /// Disconnects the observer, cancels any frame, removes the badge.
    pub fn teardown<S: Surface>(&mut self, timers: &mut TimerQueue<EngineTask>, surface: &mut S) {
        if let Some(id) = self.frame_timer.take() {
            timers.cancel(id);
        }
        self.observer_armed = false;
        if let Some(element) = self.element.take() {
            surface.remove_element(element);
        }
        self.phase = BadgePhase::TornDown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_out_cubic_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(-3.0), 0.0);
        assert_eq!(ease_out_cubic(4.0), 1.0);
    }

    #[test]
    fn ease_out_cubic_front_loads_progress() {
        assert!((ease_out_cubic(0.5) - 0.875).abs() < 1e-12);
        assert!(ease_out_cubic(0.25) > 0.25);
    }

    #[test]
    fn ease_out_cubic_is_monotonic() {
        let mut last = 0.0;
        for step in 0..=100 {
            let value = ease_out_cubic(step as f64 / 100.0);
            assert!(value >= last);
            last = value;
        }
    }
}
