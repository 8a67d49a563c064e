//! Popup scheduling state machine.
//!
//! ```text
//!            start (allowed)             delay elapsed
//!   Idle ───────────────────▶ Waiting ───────────────────▶ Showing
//!    ▲ │                                                     │  ▲
//!    │ │ start (gated / disabled / no container / no feed)   │  │ trigger
//!    │ ▼                                                     │  │ (replaces)
//!   Stopped ◀──── exit finished (gated) ──── Idle ◀──────────┘──┘
//!                                             │   hide (timeout or dismiss)
//!                                             └──▶ Waiting (exit finished, allowed)
//! ```
//!
//! [`next_state`] is the pure transition table. [`PopupScheduler`] owns the
//! side effects: timers, mounting, and the dismissal counter.
//!
//! Two invariants matter more than the rest:
//! - At most one popup element exists. Any mount first removes whatever is
//!   still on the page, including one mid exit animation.
//! - Auto-hide and dismissal race for the same hide. Whichever runs first
//!   cancels the other, and only a dismissal touches the counter.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EngineOptions;
use crate::cycler::ActivityCycler;
use crate::dismissal::DismissalTracker;
use crate::engine::EngineTask;
use crate::error::{EngineError, Result};
use crate::render::PopupView;
use crate::storage::KeyValueStore;
use crate::surface::{ElementId, Surface};
use crate::timer::{TimerId, TimerQueue};
use crate::types::{Activity, PopupPosition, SchedulerState, Settings, VisualState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Start { allowed: bool },
    DelayElapsed { has_activity: bool },
    DisplayTriggered { has_activity: bool },
    Hidden,
    ExitFinished { allowed: bool },
    Stop,
}

pub fn next_state(current: SchedulerState, event: SchedulerEvent) -> SchedulerState {
    use SchedulerState::*;

    match (current, event) {
        (Stopped, _) => Stopped,
        (_, SchedulerEvent::Stop) => Stopped,
        (Idle, SchedulerEvent::Start { allowed: true }) => Waiting,
        (Idle, SchedulerEvent::Start { allowed: false }) => Stopped,
        (Waiting, SchedulerEvent::DelayElapsed { has_activity: true }) => Showing,
        (Waiting, SchedulerEvent::DelayElapsed { has_activity: false }) => Stopped,
        (_, SchedulerEvent::DisplayTriggered { has_activity: true }) => Showing,
        (_, SchedulerEvent::DisplayTriggered { has_activity: false }) => Stopped,
        (Showing, SchedulerEvent::Hidden) => Idle,
        (Idle, SchedulerEvent::ExitFinished { allowed: true }) => Waiting,
        (Idle, SchedulerEvent::ExitFinished { allowed: false }) => Stopped,
        (state, _) => state,
    }
}

/// Deferred scheduler steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerTask {
    ShowNext,
    Reveal { popup: ElementId },
    AutoHide { popup: ElementId },
    FinishExit { popup: ElementId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideCause {
    Timeout,
    Dismissed,
}

/// The popup currently on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupInstance {
    pub element: ElementId,
    pub activity: Activity,
    pub visual: VisualState,
}

pub struct PopupScheduler<K> {
    state: SchedulerState,
    enabled: bool,
    position: PopupPosition,
    popup_delay: Duration,
    display_duration: Duration,
    exit_animation: Duration,
    frame_interval: Duration,
    cycler: ActivityCycler,
    dismissals: DismissalTracker<K>,
    current: Option<PopupInstance>,
    exiting: Option<PopupInstance>,
    wait_timer: Option<TimerId>,
    reveal_timer: Option<TimerId>,
    auto_hide_timer: Option<TimerId>,
    exit_timer: Option<TimerId>,
    hide_started_at: Option<Duration>,
    displayed: u64,
}

impl<K: KeyValueStore> PopupScheduler<K> {
    pub fn new(
        settings: &Settings,
        activities: Vec<Activity>,
        dismissals: DismissalTracker<K>,
        options: &EngineOptions,
    ) -> Self {
        Self {
            state: SchedulerState::Idle,
            enabled: settings.popup_enabled,
            position: settings.popup_position,
            popup_delay: settings.popup_delay,
            display_duration: settings.display_duration,
            exit_animation: options.exit_animation(),
            frame_interval: options.frame_interval(),
            cycler: ActivityCycler::new(activities),
            dismissals,
            current: None,
            exiting: None,
            wait_timer: None,
            reveal_timer: None,
            auto_hide_timer: None,
            exit_timer: None,
            hide_started_at: None,
            displayed: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn current(&self) -> Option<&PopupInstance> {
        self.current.as_ref()
    }

    pub fn exiting(&self) -> Option<&PopupInstance> {
        self.exiting.as_ref()
    }

    pub fn dismissals(&self) -> &DismissalTracker<K> {
        &self.dismissals
    }

    pub fn into_dismissals(self) -> DismissalTracker<K> {
        self.dismissals
    }

    /// Display cycles run so far in this page view.
    pub fn displayed_count(&self) -> u64 {
        self.displayed
    }

    fn apply(&mut self, event: SchedulerEvent) -> SchedulerState {
        let next = next_state(self.state, event);
        if next != self.state {
            debug!(from = %self.state, to = %next, ?event, "Popup scheduler transition");
        }
        self.state = next;
        next
    }

    /// Enters the loop. Only meaningful from `Idle`; later calls are ignored.
    ///
    /// A disabled or throttled scheduler stops quietly. A missing container
    /// or an empty feed also stops it, and the reason is returned for the
    /// caller to log.
    pub fn start<S: Surface>(
        &mut self,
        timers: &mut TimerQueue<EngineTask>,
        surface: &S,
    ) -> Result<()> {
        if self.state != SchedulerState::Idle {
            return Ok(());
        }

        if !self.enabled {
            info!("Popups disabled for this shop");
            self.apply(SchedulerEvent::Stop);
            return Ok(());
        }
        if !surface.has_popup_container() {
            self.apply(SchedulerEvent::Stop);
            return Err(EngineError::ContainerMissing);
        }
        if self.cycler.is_empty() {
            self.apply(SchedulerEvent::Stop);
            return Err(EngineError::FeedExhausted);
        }

        let allowed = self.dismissals.popups_allowed();
        match self.apply(SchedulerEvent::Start { allowed }) {
            SchedulerState::Waiting => {
                self.schedule_show(timers, self.popup_delay);
                info!(
                    activities = self.cycler.len(),
                    delay_ms = self.popup_delay.as_millis() as u64,
                    position = %self.position,
                    "Popup scheduler started"
                );
            }
            _ => {
                info!(
                    dismissals = self.dismissals.current_count(),
                    threshold = self.dismissals.threshold(),
                    "Popups throttled for this browser"
                );
            }
        }
        Ok(())
    }

    pub fn on_task<S: Surface>(
        &mut self,
        task: SchedulerTask,
        timers: &mut TimerQueue<EngineTask>,
        surface: &mut S,
    ) {
        match task {
            SchedulerTask::ShowNext => {
                self.wait_timer = None;
                if self.state == SchedulerState::Waiting {
                    self.display(timers, surface, false);
                }
            }
            SchedulerTask::Reveal { popup } => {
                self.reveal_timer = None;
                if let Some(instance) = self.current.as_mut() {
                    if instance.element == popup && instance.visual == VisualState::Entering {
                        instance.visual = VisualState::Visible;
                        surface.set_popup_state(popup, VisualState::Visible);
                    }
                }
            }
            SchedulerTask::AutoHide { popup } => {
                self.auto_hide_timer = None;
                if self.current.as_ref().map(|c| c.element) == Some(popup) {
                    self.begin_hide(timers, surface, HideCause::Timeout);
                }
            }
            SchedulerTask::FinishExit { popup } => {
                self.exit_timer = None;
                if self.exiting.as_ref().map(|e| e.element) == Some(popup) {
                    self.finish_exit(timers, surface);
                }
            }
        }
    }

    /// Explicit close by the shopper. Records the dismissal, then hides.
    /// Inert when nothing is showing or the popup is already on its way out.
    pub fn dismiss<S: Surface>(
        &mut self,
        timers: &mut TimerQueue<EngineTask>,
        surface: &mut S,
    ) -> bool {
        if self.state != SchedulerState::Showing || self.current.is_none() {
            return false;
        }
        let count = self.dismissals.record_dismissal();
        info!(dismissals = count, "Popup dismissed");
        self.begin_hide(timers, surface, HideCause::Dismissed);
        true
    }

    /// Runs a display cycle immediately, replacing anything on screen.
    /// Refused once stopped or while the dismissal gate is closed.
    pub fn trigger_display<S: Surface>(
        &mut self,
        timers: &mut TimerQueue<EngineTask>,
        surface: &mut S,
    ) -> bool {
        if self.state == SchedulerState::Stopped || !self.dismissals.popups_allowed() {
            return false;
        }
        if let Some(id) = self.wait_timer.take() {
            timers.cancel(id);
        }
        self.display(timers, surface, true);
        self.state == SchedulerState::Showing
    }

    /// Cancels every scheduler timer and removes any popup. Safe to repeat.
    pub fn teardown<S: Surface>(&mut self, timers: &mut TimerQueue<EngineTask>, surface: &mut S) {
        for id in [
            self.wait_timer.take(),
            self.reveal_timer.take(),
            self.auto_hide_timer.take(),
            self.exit_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timers.cancel(id);
        }
        self.remove_all(surface);
        self.hide_started_at = None;
        self.apply(SchedulerEvent::Stop);
    }

    fn display<S: Surface>(
        &mut self,
        timers: &mut TimerQueue<EngineTask>,
        surface: &mut S,
        triggered: bool,
    ) {
        let activity = self.cycler.next().cloned();
        let has_activity = activity.is_some();
        let event = if triggered {
            SchedulerEvent::DisplayTriggered { has_activity }
        } else {
            SchedulerEvent::DelayElapsed { has_activity }
        };

        // Anything still on the page goes first, whatever happens next.
        self.cancel_instance_timers(timers);
        self.remove_all(surface);

        if self.apply(event) != SchedulerState::Showing {
            debug!(error = %EngineError::FeedExhausted, "Popup scheduler stopped");
            return;
        }
        let Some(activity) = activity else {
            return;
        };

        let view = PopupView::from_activity(&activity, self.position);
        let element = surface.mount_popup(&view, VisualState::Entering);
        self.reveal_timer = Some(timers.schedule(
            self.frame_interval,
            EngineTask::Scheduler(SchedulerTask::Reveal { popup: element }),
        ));
        self.auto_hide_timer = Some(timers.schedule(
            self.display_duration,
            EngineTask::Scheduler(SchedulerTask::AutoHide { popup: element }),
        ));
        self.displayed += 1;
        debug!(
            product = %activity.product_title,
            cycle = self.displayed,
            "Popup shown"
        );
        self.current = Some(PopupInstance {
            element,
            activity,
            visual: VisualState::Entering,
        });
    }

    fn begin_hide<S: Surface>(
        &mut self,
        timers: &mut TimerQueue<EngineTask>,
        surface: &mut S,
        cause: HideCause,
    ) {
        for id in [self.auto_hide_timer.take(), self.reveal_timer.take()]
            .into_iter()
            .flatten()
        {
            timers.cancel(id);
        }
        let Some(mut instance) = self.current.take() else {
            return;
        };

        instance.visual = VisualState::Exiting;
        surface.set_popup_state(instance.element, VisualState::Exiting);
        self.exit_timer = Some(timers.schedule(
            self.exit_animation,
            EngineTask::Scheduler(SchedulerTask::FinishExit {
                popup: instance.element,
            }),
        ));
        self.exiting = Some(instance);
        self.hide_started_at = Some(timers.now());
        debug!(?cause, "Popup hiding");
        self.apply(SchedulerEvent::Hidden);
    }

    fn finish_exit<S: Surface>(&mut self, timers: &mut TimerQueue<EngineTask>, surface: &mut S) {
        if let Some(instance) = self.exiting.take() {
            retire(surface, instance);
        }

        let allowed = self.dismissals.popups_allowed();
        match self.apply(SchedulerEvent::ExitFinished { allowed }) {
            SchedulerState::Waiting => {
                // The delay runs from when the hide began, not from removal.
                let elapsed = self
                    .hide_started_at
                    .map(|started| timers.now().saturating_sub(started))
                    .unwrap_or_default();
                self.schedule_show(timers, self.popup_delay.saturating_sub(elapsed));
            }
            SchedulerState::Stopped => {
                info!(
                    dismissals = self.dismissals.current_count(),
                    "Dismissal threshold reached; popups stopped"
                );
            }
            state => {
                warn!(%state, "Exit finished in unexpected scheduler state");
            }
        }
        self.hide_started_at = None;
    }

    fn schedule_show(&mut self, timers: &mut TimerQueue<EngineTask>, delay: Duration) {
        if let Some(id) = self.wait_timer.take() {
            timers.cancel(id);
        }
        self.wait_timer = Some(timers.schedule(delay, EngineTask::Scheduler(SchedulerTask::ShowNext)));
    }

    fn cancel_instance_timers(&mut self, timers: &mut TimerQueue<EngineTask>) {
        for id in [
            self.reveal_timer.take(),
            self.auto_hide_timer.take(),
            self.exit_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            timers.cancel(id);
        }
    }

    fn remove_all<S: Surface>(&mut self, surface: &mut S) {
        for instance in [self.current.take(), self.exiting.take()].into_iter().flatten() {
            retire(surface, instance);
        }
    }
}

/// Final visual state, then off the page.
fn retire<S: Surface>(surface: &mut S, mut instance: PopupInstance) {
    instance.visual = VisualState::Removed;
    surface.set_popup_state(instance.element, instance.visual);
    surface.remove_element(instance.element);
}

#[cfg(test)]
mod tests {
    use super::*;
    use SchedulerState::*;

    #[test]
    fn start_enters_waiting_when_allowed() {
        assert_eq!(next_state(Idle, SchedulerEvent::Start { allowed: true }), Waiting);
    }

    #[test]
    fn start_stops_when_gated() {
        assert_eq!(next_state(Idle, SchedulerEvent::Start { allowed: false }), Stopped);
    }

    #[test]
    fn delay_elapsed_shows_next_activity() {
        assert_eq!(
            next_state(Waiting, SchedulerEvent::DelayElapsed { has_activity: true }),
            Showing
        );
    }

    #[test]
    fn delay_elapsed_without_activity_stops() {
        assert_eq!(
            next_state(Waiting, SchedulerEvent::DelayElapsed { has_activity: false }),
            Stopped
        );
    }

    #[test]
    fn trigger_while_showing_stays_showing() {
        assert_eq!(
            next_state(Showing, SchedulerEvent::DisplayTriggered { has_activity: true }),
            Showing
        );
    }

    #[test]
    fn hidden_returns_to_idle() {
        assert_eq!(next_state(Showing, SchedulerEvent::Hidden), Idle);
    }

    #[test]
    fn second_hidden_is_inert() {
        assert_eq!(next_state(Idle, SchedulerEvent::Hidden), Idle);
    }

    #[test]
    fn exit_finished_regates() {
        assert_eq!(
            next_state(Idle, SchedulerEvent::ExitFinished { allowed: true }),
            Waiting
        );
        assert_eq!(
            next_state(Idle, SchedulerEvent::ExitFinished { allowed: false }),
            Stopped
        );
    }

    #[test]
    fn stopped_is_terminal() {
        for event in [
            SchedulerEvent::Start { allowed: true },
            SchedulerEvent::DelayElapsed { has_activity: true },
            SchedulerEvent::DisplayTriggered { has_activity: true },
            SchedulerEvent::Hidden,
            SchedulerEvent::ExitFinished { allowed: true },
        ] {
            assert_eq!(next_state(Stopped, event), Stopped, "{:?}", event);
        }
    }

    #[test]
    fn stop_from_any_state() {
        for state in [Idle, Waiting, Showing] {
            assert_eq!(next_state(state, SchedulerEvent::Stop), Stopped);
        }
    }

    #[test]
    fn delay_elapsed_outside_waiting_is_ignored() {
        assert_eq!(
            next_state(Idle, SchedulerEvent::DelayElapsed { has_activity: true }),
            Idle
        );
    }

    #[test]
    fn start_is_only_honored_from_idle() {
        assert_eq!(next_state(Showing, SchedulerEvent::Start { allowed: true }), Showing);
    }
}
