//! PopupEngine - the storefront entry point.
//!
//! Owns the host surface, the dismissal store, one timer queue, and the two
//! independent flows that share it: the popup scheduler loop and the one-shot
//! counter badge. The engine is:
//! - **Single-threaded**: no locks; the host drives it from its event loop.
//! - **Clock-agnostic**: time is virtual. The host calls [`PopupEngine::advance`]
//!   (or sleeps until [`PopupEngine::next_deadline`]) and the engine runs
//!   whatever is due, in deadline order.
//! - **Quiet on failure**: startup problems are logged and leave the feature
//!   off. Nothing here panics into the host page.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use popup_core::{EngineOptions, MemoryStore, PopupEngine, VirtualPage};
//!
//! let mut engine = PopupEngine::boot(payload, VirtualPage::blank(), MemoryStore::new(), &EngineOptions::default())
//!     .expect("valid payload");
//! engine.advance(std::time::Duration::from_secs(5));
//! engine.dismiss();
//! engine.destroy();
//! ```

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::badge::{BadgeController, BadgeTask};
use crate::config::{load_config, EngineOptions, LoadedConfig};
use crate::dismissal::DismissalTracker;
use crate::error::EngineError;
use crate::scheduler::{PopupInstance, PopupScheduler, SchedulerTask};
use crate::selector::AnchorProbe;
use crate::storage::KeyValueStore;
use crate::surface::Surface;
use crate::timer::TimerQueue;
use crate::types::{SchedulerState, Settings};

/// Everything that can sit in the engine's timer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTask {
    Scheduler(SchedulerTask),
    Badge(BadgeTask),
}

pub struct PopupEngine<S, K> {
    settings: Settings,
    surface: S,
    timers: TimerQueue<EngineTask>,
    scheduler: PopupScheduler<K>,
    badge: BadgeController,
    started: bool,
    destroyed: bool,
}

impl<S: Surface, K: KeyValueStore> PopupEngine<S, K> {
    /// Builds an engine from validated config. Nothing runs until
    /// [`start`](Self::start).
    pub fn init(config: LoadedConfig, surface: S, store: K, options: &EngineOptions) -> Self {
        let dismissals =
            DismissalTracker::with_key(store, &options.storage_key, options.dismissal_threshold);
        let scheduler =
            PopupScheduler::new(&config.settings, config.activities, dismissals, options);
        let badge = BadgeController::new(&config.settings, config.purchase_count, options);

        Self {
            settings: config.settings,
            surface,
            timers: TimerQueue::new(),
            scheduler,
            badge,
            started: false,
            destroyed: false,
        }
    }

    /// Loads the raw payload and starts the engine. Returns `None` (after
    /// logging) when the payload is unusable.
    pub fn boot(raw: &str, surface: S, store: K, options: &EngineOptions) -> Option<Self> {
        match load_config(raw) {
            Ok(config) => {
                let mut engine = Self::init(config, surface, store, options);
                engine.start();
                Some(engine)
            }
            Err(err) => {
                warn!(error = %err, "Popup engine not started");
                None
            }
        }
    }

    /// Replaces the badge anchor probe order. Call before `start`.
    pub fn with_anchor_probes(mut self, probes: Vec<AnchorProbe>) -> Self {
        self.badge = self.badge.with_probes(probes);
        self
    }

    /// Starts both flows. Idempotent; a destroyed engine stays down.
    pub fn start(&mut self) {
        if self.started || self.destroyed {
            return;
        }
        self.started = true;

        match self.scheduler.start(&mut self.timers, &self.surface) {
            Ok(()) => {}
            Err(err @ EngineError::ContainerMissing) => {
                warn!(error = %err, "Popup scheduler not started");
            }
            Err(err) => {
                info!(error = %err, "Popup scheduler not started");
            }
        }

        if let Err(err) = self.badge.start(&mut self.surface) {
            warn!(error = %err, "Counter badge skipped");
        }
    }

    /// Advances virtual time by `by`, running every task that comes due.
    pub fn advance(&mut self, by: Duration) {
        let target = self.timers.now().saturating_add(by);
        self.advance_to(target);
    }

    /// Runs every task due at or before `target`, then parks the clock there.
    pub fn advance_to(&mut self, target: Duration) {
        while let Some((_, task)) = self.timers.pop_due(target) {
            self.dispatch(task);
        }
        self.timers.set_now(target);
    }

    fn dispatch(&mut self, task: EngineTask) {
        match task {
            EngineTask::Scheduler(task) => {
                self.scheduler
                    .on_task(task, &mut self.timers, &mut self.surface)
            }
            EngineTask::Badge(task) => self.badge.on_task(task, &mut self.timers, &mut self.surface),
        }
    }

    /// Shopper clicked close. Returns whether it did anything.
    pub fn dismiss(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.scheduler.dismiss(&mut self.timers, &mut self.surface)
    }

    /// Forces a display cycle now, replacing any popup on screen.
    pub fn trigger_display(&mut self) -> bool {
        if self.destroyed || !self.started {
            return false;
        }
        self.scheduler
            .trigger_display(&mut self.timers, &mut self.surface)
    }

    /// Visibility-observer callback for the badge (`ratio` in `[0, 1]`).
    pub fn on_badge_visibility(&mut self, ratio: f64) -> bool {
        if self.destroyed {
            return false;
        }
        self.badge
            .on_visibility(ratio, &mut self.timers, &mut self.surface)
    }

    /// Tears everything down: cancels every timer, removes popup and badge,
    /// disconnects the observer. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.scheduler.teardown(&mut self.timers, &mut self.surface);
        self.badge.teardown(&mut self.timers, &mut self.surface);
        self.timers.clear();
        if !self.destroyed {
            debug!("Popup engine destroyed");
        }
        self.destroyed = true;
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn current_popup(&self) -> Option<&PopupInstance> {
        self.scheduler.current()
    }

    pub fn scheduler(&self) -> &PopupScheduler<K> {
        &self.scheduler
    }

    pub fn dismissals(&self) -> &DismissalTracker<K> {
        self.scheduler.dismissals()
    }

    pub fn badge(&self) -> &BadgeController {
        &self.badge
    }

    pub fn observer_armed(&self) -> bool {
        self.badge.observer_armed()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Hands back the host surface and store, e.g. to simulate a reload.
    pub fn into_parts(self) -> (S, K) {
        (self.surface, self.scheduler.into_dismissals().into_store())
    }
}
