//! IntervalsEngine - the mobile entry point.
//!
//! Wraps one [`LifecycleEngine`] behind a mutex so Swift/Kotlin can call it
//! from any thread. The host is expected to call, in order:
//!
//! 1. [`IntervalsEngine::hydrate`]
//! 2. [`IntervalsEngine::scan_recovery`] (and `resolve_recovery` if pending)
//! 3. lifecycle operations, `tick()` at 1 Hz and `app_foregrounded()` on resume
//!
//! Timestamps cross the boundary as RFC 3339 strings.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};
use tracing::warn;

use crate::clock::SystemClock;
use crate::error::{IntervalsError, IntervalsFfiError};
use crate::insights::{history, FocusStats};
use crate::lifecycle::{EngineEvent, EngineState, LifecycleEngine, TickOutcome};
use crate::notify::NotificationScheduler;
use crate::recovery::{Orphan, RecoveryResolver, RecoveryScan, Resolution};
use crate::storage::StorageConfig;
use crate::store::persist::{FlushMode, JsonFileBackend};
use crate::store::Store;
use crate::types::{
    IntervalNote, NewProject, Project, ProjectPatch, ProjectSnapshot, Session, SessionStatus,
    Settings, SettingsPatch, DEFAULT_PROJECT_COLOR, INTERVAL_OPTIONS,
};

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct SessionInfo {
    pub id: String,
    pub label: String,
    pub project_id: String,
    /// Live project, or the snapshot taken at start.
    pub project: Option<ProjectSnapshot>,
    pub interval_minutes: u32,
    pub status: SessionStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub total_seconds: u64,
    pub intervals_completed: u32,
}

impl SessionInfo {
    fn new(session: &Session, project: Option<ProjectSnapshot>) -> Self {
        Self {
            id: session.id.clone(),
            label: session.label.clone(),
            project_id: session.project_id.clone(),
            project,
            interval_minutes: session.interval_minutes,
            status: session.status,
            started_at: rfc3339(session.started_at),
            ended_at: session.ended_at.map(rfc3339),
            total_seconds: session.total_seconds,
            intervals_completed: session.intervals_completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct NoteInfo {
    pub id: String,
    pub session_id: String,
    pub note: String,
    pub created_at: String,
}

impl From<&IntervalNote> for NoteInfo {
    fn from(note: &IntervalNote) -> Self {
        Self {
            id: note.id.clone(),
            session_id: note.session_id.clone(),
            note: note.note.clone(),
            created_at: rfc3339(note.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct TimerInfo {
    pub state: EngineState,
    pub session: Option<SessionInfo>,
    pub remaining_seconds: u64,
    pub elapsed_seconds: u64,
    pub interval_seconds: u64,
    pub next_chime_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct OrphanInfo {
    pub session: SessionInfo,
    pub age_seconds: u64,
    pub remaining_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum RecoveryStatus {
    Clean,
    AutoDiscarded { session_id: String },
    Pending { orphan: OrphanInfo },
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct HistoryItem {
    pub session: SessionInfo,
    pub notes: Vec<NoteInfo>,
}

#[derive(uniffi::Object)]
pub struct IntervalsEngine {
    engine: Mutex<LifecycleEngine>,
    resolver: RecoveryResolver,
    /// Orphan returned by the last scan, awaiting the user's choice.
    orphan: Mutex<Option<Orphan>>,
}

impl IntervalsEngine {
    /// Wraps an existing engine. Not exposed to FFI; used by tests and
    /// Rust hosts that pick their own clock or backend.
    pub fn with_engine(engine: LifecycleEngine) -> Self {
        Self {
            engine: Mutex::new(engine),
            resolver: RecoveryResolver::default(),
            orphan: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleEngine> {
        match self.engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("IntervalsEngine: engine mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_orphan(&self) -> MutexGuard<'_, Option<Orphan>> {
        self.orphan.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn session_info(engine: &LifecycleEngine, session: &Session) -> SessionInfo {
        SessionInfo::new(session, engine.display_project(session))
    }
}

#[uniffi::export]
impl IntervalsEngine {
    /// Opens the store under `data_dir` (the app's documents directory).
    /// Call [`Self::hydrate`] before anything else.
    #[uniffi::constructor]
    pub fn new(
        data_dir: String,
        scheduler: Arc<dyn NotificationScheduler>,
    ) -> Result<Self, IntervalsFfiError> {
        let storage = StorageConfig::with_root(data_dir);
        storage.ensure_root()?;
        let backend = Arc::new(JsonFileBackend::new(storage.store_file()));
        let store = Store::open(backend, FlushMode::Background);
        let engine = LifecycleEngine::new(store, Arc::new(SystemClock), scheduler);
        Ok(Self::with_engine(engine))
    }

    pub fn hydrate(&self) -> Result<(), IntervalsFfiError> {
        self.lock().hydrate().map_err(IntervalsFfiError::from)
    }

    pub fn is_ready(&self) -> bool {
        self.lock().store().is_ready()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn start_session(&self, project_id: String) -> Option<SessionInfo> {
        let mut engine = self.lock();
        let session = engine.start_session(&project_id)?;
        Some(Self::session_info(&engine, &session))
    }

    pub fn pause_session(&self) -> bool {
        self.lock().pause_session()
    }

    pub fn resume_session(&self) -> bool {
        self.lock().resume_session()
    }

    pub fn complete_interval(&self) -> bool {
        self.lock().complete_interval()
    }

    pub fn submit_check_in(&self, note: String) -> bool {
        self.lock().submit_check_in(&note)
    }

    pub fn finish_check_in(&self, note: String) -> bool {
        self.lock().finish_check_in(&note)
    }

    pub fn end_session(&self) -> bool {
        self.lock().end_session()
    }

    pub fn discard_session(&self, session_id: String) -> bool {
        self.lock().discard_session(&session_id)
    }

    pub fn tick(&self) -> TickOutcome {
        self.lock().tick()
    }

    pub fn app_foregrounded(&self) -> TickOutcome {
        self.lock().app_foregrounded()
    }

    pub fn snapshot(&self) -> TimerInfo {
        let engine = self.lock();
        let snapshot = engine.snapshot();
        TimerInfo {
            state: snapshot.state,
            session: snapshot
                .session
                .as_ref()
                .map(|s| Self::session_info(&engine, s)),
            remaining_seconds: snapshot.remaining_seconds,
            elapsed_seconds: snapshot.elapsed_seconds,
            interval_seconds: snapshot.interval_seconds,
            next_chime_at: snapshot.next_chime_at.map(rfc3339),
        }
    }

    pub fn take_events(&self) -> Vec<EngineEvent> {
        self.lock().take_events()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Recovery API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn scan_recovery(&self) -> Result<RecoveryStatus, IntervalsFfiError> {
        let mut engine = self.lock();
        let status = match self.resolver.scan(&mut engine)? {
            RecoveryScan::Clean => RecoveryStatus::Clean,
            RecoveryScan::AutoDiscarded { session_id } => {
                RecoveryStatus::AutoDiscarded { session_id }
            }
            RecoveryScan::Pending(orphan) => {
                let info = OrphanInfo {
                    session: SessionInfo::new(&orphan.session, orphan.project.clone()),
                    age_seconds: orphan.age_seconds,
                    remaining_seconds: orphan.remaining_seconds,
                };
                *self.lock_orphan() = Some(orphan);
                RecoveryStatus::Pending { orphan: info }
            }
        };
        Ok(status)
    }

    /// Applies the user's choice to the orphan from the last scan. On a
    /// retryable failure the orphan stays pending.
    pub fn resolve_recovery(&self, resolution: Resolution) -> Result<(), IntervalsFfiError> {
        let mut engine = self.lock();
        let mut pending = self.lock_orphan();
        let orphan = pending
            .take()
            .ok_or_else(|| IntervalsFfiError::from("No orphaned session awaiting resolution"))?;
        match self.resolver.resolve(&mut engine, &orphan, resolution) {
            Ok(()) => Ok(()),
            Err(err @ IntervalsError::SessionNotFound(_)) => Err(err.into()),
            Err(err) => {
                warn!(session_id = %orphan.session.id, error = %err, "Recovery failed; orphan kept");
                *pending = Some(orphan);
                Err(err.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Projects API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn list_projects(&self) -> Vec<Project> {
        self.lock().store().projects().into_iter().cloned().collect()
    }

    pub fn create_project(
        &self,
        name: String,
        icon: String,
        color: Option<String>,
    ) -> Result<Project, IntervalsFfiError> {
        let data = NewProject {
            name,
            color: color.unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
            icon,
        };
        self.lock()
            .store_mut()
            .create_project(data)
            .map_err(IntervalsFfiError::from)
    }

    pub fn update_project(
        &self,
        project_id: String,
        patch: ProjectPatch,
    ) -> Result<Project, IntervalsFfiError> {
        self.lock()
            .store_mut()
            .update_project(&project_id, patch)
            .map_err(IntervalsFfiError::from)
    }

    pub fn delete_project(&self, project_id: String) -> Result<(), IntervalsFfiError> {
        self.lock()
            .store_mut()
            .delete_project(&project_id)
            .map_err(IntervalsFfiError::from)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Settings API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn get_settings(&self) -> Settings {
        self.lock().store().settings().clone()
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<Settings, IntervalsFfiError> {
        self.lock()
            .update_settings(&patch)
            .map_err(IntervalsFfiError::from)
    }

    pub fn interval_options(&self) -> Vec<u32> {
        INTERVAL_OPTIONS.to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // History API
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn history(&self) -> Vec<HistoryItem> {
        let engine = self.lock();
        history(engine.store())
            .into_iter()
            .map(|entry| HistoryItem {
                session: SessionInfo::new(&entry.session, entry.project),
                notes: entry.notes.iter().map(NoteInfo::from).collect(),
            })
            .collect()
    }

    pub fn notes_for_session(&self, session_id: String) -> Vec<NoteInfo> {
        self.lock()
            .store()
            .notes_for_session(&session_id)
            .iter()
            .map(NoteInfo::from)
            .collect()
    }

    /// Stats with day boundaries at the host's UTC offset.
    pub fn stats(&self, utc_offset_seconds: i32) -> FocusStats {
        let engine = self.lock();
        let offset = FixedOffset::east_opt(utc_offset_seconds).unwrap_or_else(|| {
            warn!(utc_offset_seconds, "Invalid UTC offset, using UTC");
            Utc.fix()
        });
        FocusStats::compute(engine.store(), engine.now().with_timezone(&offset))
    }
}
