//! Session lifecycle engine.
//!
//! Owns the one live session and drives it through
//! `Idle → Running ⇄ Paused`, `Running → AwaitingCheckIn → Running`, and back
//! to `Idle`. Every operation is a safe no-op when the store is not ready or
//! the transition is invalid (see [`transition::next_state`]); double taps and
//! tick/foreground races are expected and only logged at debug level.
//!
//! Every transition also reissues notification scheduling, so an alert never
//! outlives the interval it was scheduled for.

pub mod transition;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::notify::{NotificationScheduler, Notifier};
use crate::store::Store;
use crate::timer::{Countdown, CountdownSync};
use crate::types::{
    NewSession, Project, ProjectSnapshot, Session, SessionStatus, Settings, SettingsPatch,
    FALLBACK_SESSION_LABEL,
};

use transition::{next_state, Action};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum EngineState {
    Idle,
    Running,
    Paused,
    AwaitingCheckIn,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Paused => "paused",
            EngineState::AwaitingCheckIn => "awaiting check-in",
        }
    }
}

/// Side effects for the host to perform (chime, haptics, prompts).
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum EngineEvent {
    SessionStarted {
        session_id: String,
    },
    IntervalCompleted {
        session_id: String,
        intervals_completed: u32,
        /// Selected chime, or `None` when sound is off.
        chime: Option<String>,
        haptic: bool,
    },
    CheckInSubmitted {
        session_id: String,
        note_saved: bool,
    },
    SessionEnded {
        session_id: String,
        total_seconds: u64,
    },
    SessionDiscarded {
        session_id: String,
    },
    /// Emitted at most once per engine.
    NotificationPermissionDenied,
}

/// What a tick or foreground recompute observed.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum TickOutcome {
    Idle,
    Counting {
        remaining_seconds: u64,
    },
    Frozen,
    IntervalCompleted {
        session_id: String,
        intervals_completed: u32,
    },
}

/// Point-in-time view of the engine for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub state: EngineState,
    pub session: Option<Session>,
    pub remaining_seconds: u64,
    pub elapsed_seconds: u64,
    pub interval_seconds: u64,
    pub next_chime_at: Option<DateTime<Utc>>,
}

struct ActiveSession {
    session_id: String,
    countdown: Countdown,
}

pub struct LifecycleEngine {
    store: Store,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    state: EngineState,
    active: Option<ActiveSession>,
    events: Vec<EngineEvent>,
    recovery_scanned: bool,
}

impl LifecycleEngine {
    pub fn new(
        store: Store,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn NotificationScheduler>,
    ) -> Self {
        Self {
            store,
            clock,
            notifier: Notifier::new(scheduler),
            state: EngineState::Idle,
            active: None,
            events: Vec::new(),
            recovery_scanned: false,
        }
    }

    pub fn hydrate(&mut self) -> Result<()> {
        self.store.hydrate()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Direct store access for project CRUD and history edits. Session
    /// lifecycle and settings changes go through the engine.
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.session_id.as_str())
    }

    /// Live project for a session, falling back to its start-time snapshot.
    pub fn display_project(&self, session: &Session) -> Option<ProjectSnapshot> {
        session.display_project(self.store.project(&session.project_id))
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    fn permit(&self, action: Action) -> Option<EngineState> {
        if !self.store.is_ready() {
            debug!(?action, "Ignoring action; store not ready");
            return None;
        }
        let next = next_state(self.state, action);
        if next.is_none() {
            debug!(?action, state = self.state.as_str(), "Ignoring invalid transition");
        }
        next
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn start_session(&mut self, project_id: &str) -> Option<Session> {
        let next = self.permit(Action::Start)?;
        if let Some(open) = self.store.open_session() {
            debug!(session_id = %open.id, "Ignoring start; a session is already open");
            return None;
        }

        let now = self.clock.now();
        let project = self.store.project(project_id);
        let initial = NewSession {
            label: project
                .map(|p| p.name.clone())
                .unwrap_or_else(|| FALLBACK_SESSION_LABEL.to_string()),
            project_id: project_id.to_string(),
            project_snapshot: project.map(Project::snapshot),
            interval_minutes: self.store.settings().interval_minutes,
            started_at: now,
        };

        let session = match self.store.create_session(initial) {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "Failed to create session");
                return None;
            }
        };

        self.active = Some(ActiveSession {
            session_id: session.id.clone(),
            countdown: Countdown::start(session.interval_seconds(), now),
        });
        self.state = next;
        self.reschedule_notification();
        self.events.push(EngineEvent::SessionStarted {
            session_id: session.id.clone(),
        });
        info!(
            session_id = %session.id,
            project_id,
            interval_minutes = session.interval_minutes,
            "Session started"
        );
        Some(session)
    }

    pub fn pause_session(&mut self) -> bool {
        let Some(next) = self.permit(Action::Pause) else {
            return false;
        };
        let now = self.clock.now();
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        // A zero that has not been ticked yet completes instead of pausing.
        if active.countdown.sync(now) == CountdownSync::Expired {
            self.finish_interval(now);
            return false;
        }

        active.countdown.freeze(now);
        let session_id = active.session_id.clone();
        let remaining = active.countdown.remaining(now);

        self.notifier.cancel_pending();
        if let Err(err) = self.store.set_session_status(&session_id, SessionStatus::Paused) {
            warn!(session_id = %session_id, error = %err, "Failed to mark session paused");
        }
        self.state = next;
        info!(session_id = %session_id, remaining_seconds = remaining, "Session paused");
        true
    }

    pub fn resume_session(&mut self) -> bool {
        let Some(next) = self.permit(Action::Resume) else {
            return false;
        };
        let now = self.clock.now();
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        active.countdown.resume(now);
        let session_id = active.session_id.clone();
        let remaining = active.countdown.remaining(now);

        if let Err(err) = self.store.set_session_status(&session_id, SessionStatus::Active) {
            warn!(session_id = %session_id, error = %err, "Failed to mark session active");
        }
        self.state = next;
        self.reschedule_notification();
        info!(session_id = %session_id, remaining_seconds = remaining, "Session resumed");
        true
    }

    /// Ends the current interval. Normally driven by [`Self::tick`]; hosts
    /// may also call it directly ("skip to check-in").
    pub fn complete_interval(&mut self) -> bool {
        let now = self.clock.now();
        self.finish_interval(now).is_some()
    }

    fn finish_interval(&mut self, now: DateTime<Utc>) -> Option<(String, u32)> {
        let next = self.permit(Action::Expire)?;
        let active = self.active.as_mut()?;
        active.countdown.expire(now);
        let session_id = active.session_id.clone();

        self.notifier.cancel_pending();
        let intervals_completed = match self.store.increment_intervals(&session_id) {
            Ok(session) => session.intervals_completed,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Failed to count interval");
                self.store
                    .session(&session_id)
                    .map(|s| s.intervals_completed)
                    .unwrap_or(0)
            }
        };
        self.state = next;

        let settings = self.store.settings();
        self.events.push(EngineEvent::IntervalCompleted {
            session_id: session_id.clone(),
            intervals_completed,
            chime: settings
                .sound_enabled
                .then(|| settings.selected_sound.clone()),
            haptic: settings.haptic_enabled,
        });
        info!(session_id = %session_id, intervals_completed, "Interval complete");
        Some((session_id, intervals_completed))
    }

    /// Check-in "continue": saves a non-blank note and starts the next
    /// interval at the *current* settings length.
    pub fn submit_check_in(&mut self, note: &str) -> bool {
        let Some(next) = self.permit(Action::CheckIn) else {
            return false;
        };
        let now = self.clock.now();
        let Some(session_id) = self.active.as_ref().map(|a| a.session_id.clone()) else {
            return false;
        };

        let note_saved = self.record_note(&session_id, note, now);
        let interval = self.store.settings().interval_seconds();
        if let Some(active) = self.active.as_mut() {
            active.countdown.restart(interval, now);
        }
        self.state = next;
        self.reschedule_notification();
        self.events.push(EngineEvent::CheckInSubmitted {
            session_id: session_id.clone(),
            note_saved,
        });
        info!(session_id = %session_id, note_saved, interval_seconds = interval, "Check-in submitted");
        true
    }

    /// Check-in "end": saves a non-blank note, then ends the session.
    pub fn finish_check_in(&mut self, note: &str) -> bool {
        if !self.store.is_ready() || self.state != EngineState::AwaitingCheckIn {
            debug!(state = self.state.as_str(), "Ignoring finish check-in");
            return false;
        }
        let Some(session_id) = self.active.as_ref().map(|a| a.session_id.clone()) else {
            return false;
        };

        let note_saved = self.record_note(&session_id, note, self.clock.now());
        self.events.push(EngineEvent::CheckInSubmitted {
            session_id,
            note_saved,
        });
        self.end_session()
    }

    fn record_note(&mut self, session_id: &str, note: &str, now: DateTime<Utc>) -> bool {
        let text = note.trim();
        if text.is_empty() {
            return false;
        }
        match self.store.append_note(session_id, text, now) {
            Ok(_) => true,
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Failed to save note");
                false
            }
        }
    }

    pub fn end_session(&mut self) -> bool {
        let Some(next) = self.permit(Action::End) else {
            return false;
        };
        let Some(active) = self.active.take() else {
            return false;
        };
        let now = self.clock.now();
        let total_seconds = active.countdown.session_elapsed(now);

        self.notifier.cancel_pending();
        if let Err(err) = self
            .store
            .complete_session(&active.session_id, now, total_seconds)
        {
            warn!(session_id = %active.session_id, error = %err, "Failed to complete session");
        }
        self.state = next;
        self.events.push(EngineEvent::SessionEnded {
            session_id: active.session_id.clone(),
            total_seconds,
        });
        info!(session_id = %active.session_id, total_seconds, "Session ended");
        true
    }

    /// Deletes a session and its notes from history. The live session is
    /// never discarded; end it instead.
    pub fn discard_session(&mut self, session_id: &str) -> bool {
        if !self.store.is_ready() {
            debug!("Ignoring discard; store not ready");
            return false;
        }
        if self.active_session_id() == Some(session_id) {
            debug!(session_id = %session_id, "Refusing to discard the live session");
            return false;
        }
        match self.store.remove_session(session_id) {
            Ok(_) => {
                self.events.push(EngineEvent::SessionDiscarded {
                    session_id: session_id.to_string(),
                });
                info!(session_id = %session_id, "Session discarded");
                true
            }
            Err(err) => {
                debug!(session_id = %session_id, error = %err, "Ignoring discard");
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Synchronizer entry points
    // ─────────────────────────────────────────────────────────────────────────────

    /// 1 Hz display tick.
    pub fn tick(&mut self) -> TickOutcome {
        self.sync()
    }

    /// Recompute after the host returns from suspension. A running interval
    /// without an alert (denied or failed earlier) gets another attempt.
    pub fn app_foregrounded(&mut self) -> TickOutcome {
        debug!(state = self.state.as_str(), "App foregrounded");
        self.notifier.recheck_permission();
        let outcome = self.sync();
        if self.state == EngineState::Running && self.notifier.pending().is_none() {
            self.reschedule_notification();
        }
        outcome
    }

    fn sync(&mut self) -> TickOutcome {
        match self.state {
            EngineState::Idle => TickOutcome::Idle,
            EngineState::Paused | EngineState::AwaitingCheckIn => TickOutcome::Frozen,
            EngineState::Running => {
                let now = self.clock.now();
                let Some(active) = self.active.as_mut() else {
                    return TickOutcome::Idle;
                };
                match active.countdown.sync(now) {
                    CountdownSync::Counting { remaining_seconds } => {
                        TickOutcome::Counting { remaining_seconds }
                    }
                    CountdownSync::Stopped => TickOutcome::Frozen,
                    CountdownSync::Expired => match self.finish_interval(now) {
                        Some((session_id, intervals_completed)) => TickOutcome::IntervalCompleted {
                            session_id,
                            intervals_completed,
                        },
                        None => TickOutcome::Frozen,
                    },
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Settings and views
    // ─────────────────────────────────────────────────────────────────────────────

    /// Merge-updates settings. Toggling notifications reissues scheduling for
    /// the running interval; a new interval length applies at the next
    /// check-in.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<Settings> {
        let notifications_before = self.store.settings().notifications_enabled;
        let settings = self.store.update_settings(patch)?;
        if settings.notifications_enabled != notifications_before {
            if settings.notifications_enabled {
                self.notifier.recheck_permission();
            }
            self.reschedule_notification();
        }
        Ok(settings)
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let now = self.clock.now();
        match &self.active {
            None => {
                let interval_seconds = self.store.settings().interval_seconds();
                TimerSnapshot {
                    state: self.state,
                    session: None,
                    remaining_seconds: interval_seconds,
                    elapsed_seconds: 0,
                    interval_seconds,
                    next_chime_at: None,
                }
            }
            Some(active) => TimerSnapshot {
                state: self.state,
                session: self.store.session(&active.session_id).cloned(),
                remaining_seconds: active.countdown.remaining(now),
                elapsed_seconds: active.countdown.session_elapsed(now),
                interval_seconds: active.countdown.interval_seconds(),
                next_chime_at: if self.state == EngineState::Running {
                    active.countdown.expires_at()
                } else {
                    None
                },
            },
        }
    }

    fn reschedule_notification(&mut self) {
        let Some(active) = &self.active else {
            self.notifier.cancel_pending();
            return;
        };
        if self.state != EngineState::Running {
            self.notifier.cancel_pending();
            return;
        }

        let remaining = active.countdown.remaining(self.clock.now());
        let label = self
            .store
            .session(&active.session_id)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| FALLBACK_SESSION_LABEL.to_string());
        let enabled = self.store.settings().notifications_enabled;

        self.notifier.reschedule(remaining, &label, enabled);
        if self.notifier.take_denial() {
            self.events.push(EngineEvent::NotificationPermissionDenied);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Recovery hooks
    // ─────────────────────────────────────────────────────────────────────────────

    /// Returns whether a recovery scan already ran, marking it as run.
    pub(crate) fn mark_recovery_scanned(&mut self) -> bool {
        std::mem::replace(&mut self.recovery_scanned, true)
    }

    pub(crate) fn cancel_all_notifications(&mut self) {
        self.notifier.cancel_all();
    }

    pub(crate) fn push_event(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    /// Takes ownership of an orphaned session and resumes its countdown from
    /// the session's age.
    pub(crate) fn adopt_orphan(&mut self, session: &Session, age_seconds: u64) -> bool {
        if self.active.is_some() || self.state != EngineState::Idle {
            return false;
        }
        if session.status == SessionStatus::Paused {
            if let Err(err) = self.store.set_session_status(&session.id, SessionStatus::Active) {
                warn!(session_id = %session.id, error = %err, "Failed to reactivate orphan");
                return false;
            }
        }

        let now = self.clock.now();
        self.active = Some(ActiveSession {
            session_id: session.id.clone(),
            countdown: Countdown::recovered(session.interval_seconds(), age_seconds, now),
        });
        self.state = EngineState::Running;
        self.reschedule_notification();
        true
    }
}
