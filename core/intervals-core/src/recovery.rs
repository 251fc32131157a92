//! Orphaned-session recovery.
//!
//! A clean shutdown always drives the open session to `completed`, so an
//! `active` or `paused` record found at cold start belongs to a process that
//! died mid-session. [`RecoveryResolver::scan`] finds it once per engine;
//! stale orphans are discarded silently, fresh ones are handed back for the
//! user to resume, save or discard.
//!
//! Pause history is not reconstructable from timestamps, so every path treats
//! the wall-clock age as focused time.

use chrono::Duration;
use tracing::info;

use crate::error::{IntervalsError, Result};
use crate::lifecycle::{EngineEvent, LifecycleEngine};
use crate::types::{ProjectSnapshot, Session};

pub const DEFAULT_STALE_AFTER_HOURS: i64 = 24;

/// User choice for a pending orphan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum Resolution {
    Resume,
    SaveAndEnd,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Orphan {
    pub session: Session,
    pub age_seconds: u64,
    /// Countdown the resume path would start from.
    pub remaining_seconds: u64,
    pub project: Option<ProjectSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryScan {
    Clean,
    AutoDiscarded { session_id: String },
    Pending(Orphan),
}

/// `interval - (age mod interval)`: the countdown continues as though the
/// session had kept running through whole intervals.
pub fn resume_remaining(interval_seconds: u64, age_seconds: u64) -> u64 {
    if interval_seconds == 0 {
        return 0;
    }
    interval_seconds - age_seconds % interval_seconds
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryResolver {
    stale_after: Duration,
}

impl Default for RecoveryResolver {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_STALE_AFTER_HOURS))
    }
}

impl RecoveryResolver {
    pub fn new(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    fn stale_after_seconds(&self) -> u64 {
        u64::try_from(self.stale_after.num_seconds()).unwrap_or(0)
    }

    /// Looks for an orphan. Runs once per engine; later scans, and scans
    /// while the engine owns a live session, are `Clean`.
    pub fn scan(&self, engine: &mut LifecycleEngine) -> Result<RecoveryScan> {
        if !engine.store().is_ready() {
            return Err(IntervalsError::StoreNotReady);
        }
        if engine.mark_recovery_scanned() || engine.active_session_id().is_some() {
            return Ok(RecoveryScan::Clean);
        }
        let Some(session) = engine.store().open_session().cloned() else {
            return Ok(RecoveryScan::Clean);
        };

        let age_seconds = session.age_seconds(engine.now());
        if age_seconds > self.stale_after_seconds() {
            engine.cancel_all_notifications();
            engine.store_mut().remove_session(&session.id)?;
            engine.push_event(EngineEvent::SessionDiscarded {
                session_id: session.id.clone(),
            });
            info!(session_id = %session.id, age_seconds, "Auto-discarded stale orphaned session");
            return Ok(RecoveryScan::AutoDiscarded {
                session_id: session.id,
            });
        }

        info!(session_id = %session.id, age_seconds, "Found orphaned session");
        Ok(RecoveryScan::Pending(Orphan {
            remaining_seconds: resume_remaining(session.interval_seconds(), age_seconds),
            project: engine.display_project(&session),
            age_seconds,
            session,
        }))
    }

    /// Applies the user's choice. Age is re-measured at resolve time since
    /// the prompt may have been open for a while.
    pub fn resolve(
        &self,
        engine: &mut LifecycleEngine,
        orphan: &Orphan,
        resolution: Resolution,
    ) -> Result<()> {
        if let Some(live) = engine.active_session_id() {
            return Err(IntervalsError::SessionAlreadyOpen(live.to_string()));
        }
        let session = engine
            .store()
            .session(&orphan.session.id)
            .filter(|s| s.status.is_open())
            .cloned()
            .ok_or_else(|| IntervalsError::SessionNotFound(orphan.session.id.clone()))?;

        // Handles from the dead process are unknown; clear everything.
        engine.cancel_all_notifications();

        let now = engine.now();
        let age_seconds = session.age_seconds(now);
        match resolution {
            Resolution::Resume => {
                if !engine.adopt_orphan(&session, age_seconds) {
                    return Err(IntervalsError::SessionAlreadyOpen(session.id));
                }
                info!(session_id = %session.id, age_seconds, "Resumed orphaned session");
            }
            Resolution::SaveAndEnd => {
                engine
                    .store_mut()
                    .complete_session(&session.id, now, age_seconds)?;
                engine.push_event(EngineEvent::SessionEnded {
                    session_id: session.id.clone(),
                    total_seconds: age_seconds,
                });
                info!(session_id = %session.id, total_seconds = age_seconds, "Saved orphaned session");
            }
            Resolution::Discard => {
                engine.store_mut().remove_session(&session.id)?;
                engine.push_event(EngineEvent::SessionDiscarded {
                    session_id: session.id.clone(),
                });
                info!(session_id = %session.id, "Discarded orphaned session");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::EngineState;
    use crate::notify::{RecordingScheduler, SchedulerCall};
    use crate::store::persist::{FlushMode, MemoryBackend};
    use crate::store::Store;
    use crate::types::SessionStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    /// Starts a session with one engine, drops it without ending, and returns
    /// a fresh engine over the same backend `age` later.
    fn relaunch_after(age: Duration) -> (LifecycleEngine, RecordingScheduler, String, ManualClock) {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(now() - age);
        let session_id = {
            let mut store = Store::open(Arc::new(backend.clone()), FlushMode::Inline);
            store.hydrate().unwrap();
            let mut engine = LifecycleEngine::new(
                store,
                Arc::new(clock.clone()),
                Arc::new(RecordingScheduler::new()),
            );
            let session = engine.start_session("work").unwrap();
            session.id
        };

        clock.set(now());
        let scheduler = RecordingScheduler::new();
        let mut store = Store::open(Arc::new(backend), FlushMode::Inline);
        store.hydrate().unwrap();
        let engine = LifecycleEngine::new(store, Arc::new(clock.clone()), Arc::new(scheduler.clone()));
        (engine, scheduler, session_id, clock)
    }

    fn pending(scan: RecoveryScan) -> Orphan {
        match scan {
            RecoveryScan::Pending(orphan) => orphan,
            other => panic!("expected a pending orphan, got {:?}", other),
        }
    }

    #[test]
    fn test_resume_remaining_formula() {
        assert_eq!(resume_remaining(1500, 300), 1200);
        assert_eq!(resume_remaining(1500, 1500), 1500);
        assert_eq!(resume_remaining(1500, 1600), 1400);
        assert_eq!(resume_remaining(0, 10), 0);
    }

    #[test]
    fn test_scan_requires_hydrated_store() {
        let store = Store::open(Arc::new(MemoryBackend::new()), FlushMode::Inline);
        let mut engine = LifecycleEngine::new(
            store,
            Arc::new(ManualClock::new(now())),
            Arc::new(RecordingScheduler::new()),
        );
        assert!(matches!(
            RecoveryResolver::default().scan(&mut engine),
            Err(IntervalsError::StoreNotReady)
        ));

        engine.hydrate().unwrap();
        assert_eq!(
            RecoveryResolver::default().scan(&mut engine).unwrap(),
            RecoveryScan::Clean
        );
    }

    #[test]
    fn test_two_hour_orphan_is_offered() {
        let (mut engine, _, session_id, _) = relaunch_after(Duration::hours(2));
        let orphan = pending(RecoveryResolver::default().scan(&mut engine).unwrap());

        assert_eq!(orphan.session.id, session_id);
        assert_eq!(orphan.age_seconds, 7200);
        assert_eq!(orphan.remaining_seconds, 1500 - 7200 % 1500);
        assert_eq!(orphan.project.unwrap().name, "Work");
        assert!(engine.store().session(&session_id).is_some());
    }

    #[test]
    fn test_twenty_five_hour_orphan_is_auto_discarded() {
        let (mut engine, scheduler, session_id, _) = relaunch_after(Duration::hours(25));
        let scan = RecoveryResolver::default().scan(&mut engine).unwrap();

        assert_eq!(
            scan,
            RecoveryScan::AutoDiscarded {
                session_id: session_id.clone()
            }
        );
        assert!(engine.store().session(&session_id).is_none());
        assert!(scheduler.calls().contains(&SchedulerCall::CancelAll));
    }

    #[test]
    fn test_exactly_24h_orphan_is_offered() {
        let (mut engine, scheduler, session_id, _) = relaunch_after(Duration::hours(24));
        let orphan = pending(RecoveryResolver::default().scan(&mut engine).unwrap());

        assert_eq!(orphan.session.id, session_id);
        assert_eq!(orphan.age_seconds, 86_400);
        assert!(engine.store().session(&session_id).is_some());
        assert!(!scheduler.calls().contains(&SchedulerCall::CancelAll));
    }

    #[test]
    fn test_scan_with_live_session_is_clean() {
        let clock = ManualClock::new(now());
        let mut engine = LifecycleEngine::new(
            Store::in_memory(),
            Arc::new(clock.clone()),
            Arc::new(RecordingScheduler::new()),
        );
        let session = engine.start_session("work").unwrap();
        clock.advance(600);

        assert_eq!(
            RecoveryResolver::default().scan(&mut engine).unwrap(),
            RecoveryScan::Clean
        );
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(
            engine.store().session(&session.id).unwrap().status,
            SessionStatus::Active
        );
    }

    #[test]
    fn test_scan_runs_once() {
        let (mut engine, _, _, _) = relaunch_after(Duration::minutes(5));
        let resolver = RecoveryResolver::default();
        assert!(matches!(resolver.scan(&mut engine).unwrap(), RecoveryScan::Pending(_)));
        assert_eq!(resolver.scan(&mut engine).unwrap(), RecoveryScan::Clean);
    }

    #[test]
    fn test_resume_recomputes_remaining() {
        let (mut engine, scheduler, session_id, clock) = relaunch_after(Duration::minutes(5));
        let resolver = RecoveryResolver::default();
        let orphan = pending(resolver.scan(&mut engine).unwrap());
        assert_eq!(orphan.remaining_seconds, 1200);

        resolver
            .resolve(&mut engine, &orphan, Resolution::Resume)
            .unwrap();

        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.active_session_id(), Some(session_id.as_str()));
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.remaining_seconds, 1200);
        assert_eq!(snapshot.elapsed_seconds, 300);
        assert_eq!(scheduler.calls()[0], SchedulerCall::CancelAll);
        assert_eq!(scheduler.scheduled_delays(), vec![1200]);

        clock.advance(1200);
        engine.tick();
        assert_eq!(engine.state(), EngineState::AwaitingCheckIn);
    }

    #[test]
    fn test_resume_paused_orphan_reactivates() {
        let backend = MemoryBackend::new();
        let clock = ManualClock::new(now() - Duration::minutes(10));
        {
            let mut store = Store::open(Arc::new(backend.clone()), FlushMode::Inline);
            store.hydrate().unwrap();
            let mut engine =
                LifecycleEngine::new(store, Arc::new(clock.clone()), Arc::new(RecordingScheduler::new()));
            engine.start_session("work");
            clock.advance(60);
            engine.pause_session();
        }
        clock.set(now());
        let mut store = Store::open(Arc::new(backend), FlushMode::Inline);
        store.hydrate().unwrap();
        let mut engine =
            LifecycleEngine::new(store, Arc::new(clock), Arc::new(RecordingScheduler::new()));

        let resolver = RecoveryResolver::default();
        let orphan = pending(resolver.scan(&mut engine).unwrap());
        assert_eq!(orphan.session.status, SessionStatus::Paused);
        resolver.resolve(&mut engine, &orphan, Resolution::Resume).unwrap();

        let open = engine.store().open_session().unwrap();
        assert_eq!(open.status, SessionStatus::Active);
        assert!(engine.pause_session());
    }

    #[test]
    fn test_save_and_end_uses_wall_clock_age() {
        let (mut engine, _, session_id, _) = relaunch_after(Duration::hours(2));
        let resolver = RecoveryResolver::default();
        let orphan = pending(resolver.scan(&mut engine).unwrap());

        resolver
            .resolve(&mut engine, &orphan, Resolution::SaveAndEnd)
            .unwrap();

        let stored = engine.store().session(&session_id).unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(stored.total_seconds, 7200);
        assert_eq!(stored.ended_at, Some(now()));
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.start_session("learning").is_some());
    }

    #[test]
    fn test_discard_removes_orphan_and_notes() {
        let (mut engine, _, session_id, _) = relaunch_after(Duration::hours(1));
        engine
            .store_mut()
            .append_note(&session_id, "before crash", now())
            .unwrap();
        let resolver = RecoveryResolver::default();
        let orphan = pending(resolver.scan(&mut engine).unwrap());

        resolver
            .resolve(&mut engine, &orphan, Resolution::Discard)
            .unwrap();

        assert!(engine.store().session(&session_id).is_none());
        assert_eq!(engine.store().note_count(), 0);
        assert!(engine.take_events().contains(&EngineEvent::SessionDiscarded {
            session_id: session_id.clone()
        }));
    }

    #[test]
    fn test_resolve_twice_fails() {
        let (mut engine, _, _, _) = relaunch_after(Duration::hours(1));
        let resolver = RecoveryResolver::default();
        let orphan = pending(resolver.scan(&mut engine).unwrap());

        resolver
            .resolve(&mut engine, &orphan, Resolution::SaveAndEnd)
            .unwrap();
        assert!(matches!(
            resolver.resolve(&mut engine, &orphan, Resolution::Resume),
            Err(IntervalsError::SessionNotFound(_))
        ));
    }
}
