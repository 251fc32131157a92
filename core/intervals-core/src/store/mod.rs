//! Durable store for projects, sessions, interval notes and settings.
//!
//! Reads are synchronous against in-memory maps keyed by id. Every mutation is
//! applied to memory first and then flushed through [`persist::Persistence`];
//! a flush failure is logged and never reaches the caller.
//!
//! # Readiness
//!
//! A store created with [`Store::open`] is *not ready* until [`Store::hydrate`]
//! has loaded the persisted blob once. Mutators refuse to run before that
//! (`IntervalsError::StoreNotReady`), so nothing can overwrite data that has
//! not been read yet.
//!
//! # Invariant
//!
//! At most one session is open (`active` or `paused`). `create_session`
//! refuses a second one and hydration repairs blobs that violate it.

pub mod persist;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{IntervalsError, Result};
use crate::types::{
    default_projects, IntervalNote, NewProject, NewSession, Project, ProjectPatch, Session,
    SessionPatch, SessionStatus, Settings, SettingsPatch,
};

use persist::{FlushMode, PersistedState, Persistence, StoreBackend};

fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

pub struct Store {
    projects: HashMap<String, Project>,
    /// Display order of projects (seed order, then creation order).
    project_order: Vec<String>,
    sessions: HashMap<String, Session>,
    /// Notes grouped by owning session, in creation order.
    notes: HashMap<String, Vec<IntervalNote>>,
    settings: Settings,
    open_session_id: Option<String>,
    ready: bool,
    persistence: Option<Persistence>,
}

impl Store {
    /// Creates a not-ready store backed by `backend`. Call [`Store::hydrate`]
    /// before use.
    pub fn open(backend: Arc<dyn StoreBackend>, mode: FlushMode) -> Self {
        let mut store = Self::empty();
        store.persistence = Some(Persistence::new(backend, mode));
        store
    }

    /// Ready, seeded store without persistence.
    pub fn in_memory() -> Self {
        let mut store = Self::empty();
        store.load_state(PersistedState::default());
        store.ready = true;
        store
    }

    fn empty() -> Self {
        Store {
            projects: HashMap::new(),
            project_order: Vec::new(),
            sessions: HashMap::new(),
            notes: HashMap::new(),
            settings: Settings::default(),
            open_session_id: None,
            ready: false,
            persistence: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// One-time load from durable storage. Later calls are no-ops.
    ///
    /// An empty or corrupt blob hydrates to defaults. A blob from a newer app
    /// version fails and leaves the store not ready.
    pub fn hydrate(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        let loaded = match &self.persistence {
            Some(persistence) => persistence.load()?,
            None => None,
        };

        let state = match loaded {
            None => {
                info!("No persisted store found, seeding defaults");
                PersistedState::default()
            }
            Some(blob) if blob.trim().is_empty() => {
                warn!("Empty store blob, seeding defaults");
                PersistedState::default()
            }
            Some(blob) => match persist::decode(&blob) {
                Ok(state) => state,
                Err(err @ IntervalsError::UnsupportedSchemaVersion { .. }) => return Err(err),
                Err(err) => {
                    warn!(error = %err, "Failed to parse store blob, seeding defaults");
                    PersistedState::default()
                }
            },
        };

        self.load_state(state);
        self.ready = true;
        self.repair_open_sessions();
        info!(
            sessions = self.sessions.len(),
            projects = self.projects.len(),
            "Store hydrated"
        );
        Ok(())
    }

    fn load_state(&mut self, state: PersistedState) {
        self.project_order = state.projects.iter().map(|p| p.id.clone()).collect();
        self.projects = state
            .projects
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        self.sessions = state
            .sessions
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        self.notes.clear();
        for note in state.notes {
            self.notes.entry(note.session_id.clone()).or_default().push(note);
        }
        for notes in self.notes.values_mut() {
            notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        }
        self.settings = state.settings;
        self.open_session_id = None;
    }

    /// Keeps only the most recently started open session open.
    fn repair_open_sessions(&mut self) {
        let mut open: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| s.status.is_open())
            .collect();
        open.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));

        let newest = open.first().map(|s| s.id.clone());
        let extra: Vec<String> = open.iter().skip(1).map(|s| s.id.clone()).collect();

        for id in &extra {
            warn!(session_id = %id, "Multiple open sessions in store, closing older one");
            if let Some(session) = self.sessions.get_mut(id) {
                session.status = SessionStatus::Completed;
                session.ended_at = session.ended_at.or(Some(session.started_at));
            }
        }
        self.open_session_id = newest;
        if !extra.is_empty() {
            self.flush();
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(IntervalsError::StoreNotReady)
        }
    }

    /// Snapshot of everything persisted.
    pub fn to_persisted(&self) -> PersistedState {
        let mut sessions: Vec<Session> = self.sessions().into_iter().cloned().collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        let mut notes: Vec<IntervalNote> = self.notes.values().flatten().cloned().collect();
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        PersistedState {
            version: persist::SCHEMA_VERSION,
            sessions,
            notes,
            settings: self.settings.clone(),
            projects: self.projects().into_iter().cloned().collect(),
        }
    }

    fn flush(&mut self) {
        if !self.ready || self.persistence.is_none() {
            return;
        }
        let blob = match persist::encode(&self.to_persisted()) {
            Ok(blob) => blob,
            Err(err) => {
                warn!(error = %err, "Failed to serialize store");
                return;
            }
        };
        if let Some(persistence) = self.persistence.as_mut() {
            persistence.write(blob);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn projects(&self) -> Vec<&Project> {
        self.project_order
            .iter()
            .filter_map(|id| self.projects.get(id))
            .collect()
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    pub fn create_project(&mut self, data: NewProject) -> Result<Project> {
        self.ensure_ready()?;
        let name = data.name.trim();
        if name.is_empty() {
            return Err(IntervalsError::InvalidProjectName);
        }

        let project = Project {
            id: new_id(),
            name: name.to_string(),
            color: data.color,
            icon: data.icon,
            is_default: false,
        };
        self.project_order.push(project.id.clone());
        self.projects.insert(project.id.clone(), project.clone());
        self.flush();
        Ok(project)
    }

    pub fn update_project(&mut self, id: &str, patch: ProjectPatch) -> Result<Project> {
        self.ensure_ready()?;
        let name = match &patch.name {
            Some(name) if name.trim().is_empty() => return Err(IntervalsError::InvalidProjectName),
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        let project = self
            .projects
            .get_mut(id)
            .ok_or_else(|| IntervalsError::ProjectNotFound(id.to_string()))?;

        if let Some(name) = name {
            project.name = name;
        }
        if let Some(color) = patch.color {
            project.color = color;
        }
        if let Some(icon) = patch.icon {
            project.icon = icon;
        }
        let updated = project.clone();
        self.flush();
        Ok(updated)
    }

    /// Deletes a user project. Sessions keep their snapshot, so history is
    /// unaffected even for the open session.
    pub fn delete_project(&mut self, id: &str) -> Result<()> {
        self.ensure_ready()?;
        match self.projects.get(id) {
            None => return Err(IntervalsError::ProjectNotFound(id.to_string())),
            Some(project) if project.is_default => {
                return Err(IntervalsError::ProjectProtected(id.to_string()))
            }
            Some(_) => {}
        }
        self.projects.remove(id);
        self.project_order.retain(|p| p != id);
        self.flush();
        Ok(())
    }

    /// Restores the seed projects that are missing (e.g. after a legacy blob).
    pub fn reseed_default_projects(&mut self) -> Result<usize> {
        self.ensure_ready()?;
        let mut added = 0;
        for project in default_projects() {
            if !self.projects.contains_key(&project.id) {
                self.project_order.push(project.id.clone());
                self.projects.insert(project.id.clone(), project);
                added += 1;
            }
        }
        if added > 0 {
            self.flush();
        }
        Ok(added)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────────

    /// Session history, newest first.
    pub fn sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        sessions
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// The single open (active or paused) session, if any.
    pub fn open_session(&self) -> Option<&Session> {
        self.open_session_id
            .as_deref()
            .and_then(|id| self.sessions.get(id))
    }

    pub fn create_session(&mut self, initial: NewSession) -> Result<Session> {
        self.ensure_ready()?;
        if let Some(open) = &self.open_session_id {
            return Err(IntervalsError::SessionAlreadyOpen(open.clone()));
        }

        let session = Session {
            id: new_id(),
            label: initial.label,
            project_id: initial.project_id,
            project_snapshot: initial.project_snapshot,
            interval_minutes: initial.interval_minutes,
            status: SessionStatus::Active,
            started_at: initial.started_at,
            ended_at: None,
            total_seconds: 0,
            intervals_completed: 0,
        };
        self.open_session_id = Some(session.id.clone());
        self.sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session created");
        self.flush();
        Ok(session)
    }

    pub fn update_session(&mut self, id: &str, patch: SessionPatch) -> Result<Session> {
        self.ensure_ready()?;
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| IntervalsError::SessionNotFound(id.to_string()))?;

        if session.status == SessionStatus::Completed {
            return Err(IntervalsError::SessionCompleted(id.to_string()));
        }
        if let Some(next) = patch.status {
            if !session.status.can_become(next) {
                return Err(IntervalsError::InvalidStatusTransition {
                    id: id.to_string(),
                    from: session.status.as_str(),
                    to: next.as_str(),
                });
            }
        }

        if let Some(label) = patch.label {
            session.label = label;
        }
        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(ended_at) = patch.ended_at {
            session.ended_at = Some(ended_at);
        }
        if let Some(total) = patch.total_seconds {
            session.total_seconds = total;
        }
        if let Some(count) = patch.intervals_completed {
            session.intervals_completed = count;
        }

        let updated = session.clone();
        if !updated.status.is_open() && self.open_session_id.as_deref() == Some(id) {
            self.open_session_id = None;
        }
        self.flush();
        Ok(updated)
    }

    /// Removes a session and its notes. Returns the removed record.
    pub fn remove_session(&mut self, id: &str) -> Result<Session> {
        self.ensure_ready()?;
        let session = self
            .sessions
            .remove(id)
            .ok_or_else(|| IntervalsError::SessionNotFound(id.to_string()))?;
        self.notes.remove(id);
        if self.open_session_id.as_deref() == Some(id) {
            self.open_session_id = None;
        }
        self.flush();
        Ok(session)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Atomic lifecycle mutators
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn set_session_status(&mut self, id: &str, status: SessionStatus) -> Result<Session> {
        self.update_session(
            id,
            SessionPatch {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    pub fn increment_intervals(&mut self, id: &str) -> Result<Session> {
        let current = self
            .sessions
            .get(id)
            .map(|s| s.intervals_completed)
            .ok_or_else(|| IntervalsError::SessionNotFound(id.to_string()))?;
        self.update_session(
            id,
            SessionPatch {
                intervals_completed: Some(current.saturating_add(1)),
                ..Default::default()
            },
        )
    }

    /// Marks a session completed with its final focused total.
    pub fn complete_session(
        &mut self,
        id: &str,
        ended_at: DateTime<Utc>,
        total_seconds: u64,
    ) -> Result<Session> {
        self.update_session(
            id,
            SessionPatch {
                status: Some(SessionStatus::Completed),
                ended_at: Some(ended_at),
                total_seconds: Some(total_seconds),
                ..Default::default()
            },
        )
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Notes
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn append_note(
        &mut self,
        session_id: &str,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<IntervalNote> {
        self.ensure_ready()?;
        if !self.sessions.contains_key(session_id) {
            return Err(IntervalsError::SessionNotFound(session_id.to_string()));
        }
        let note = IntervalNote {
            id: new_id(),
            session_id: session_id.to_string(),
            note: text.to_string(),
            created_at,
        };
        self.notes
            .entry(session_id.to_string())
            .or_default()
            .push(note.clone());
        self.flush();
        Ok(note)
    }

    /// Notes for a session in creation order.
    pub fn notes_for_session(&self, session_id: &str) -> &[IntervalNote] {
        self.notes
            .get(session_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn note_count(&self) -> usize {
        self.notes.values().map(Vec::len).sum()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Settings
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<Settings> {
        self.ensure_ready()?;
        self.settings = patch.apply_to(&self.settings)?;
        self.flush();
        Ok(self.settings.clone())
    }
}
