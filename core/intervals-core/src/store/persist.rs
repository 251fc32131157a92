//! Persisted blob format, schema migrations and storage backends.
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "sessions": [ ... ],
//!   "notes": [ ... ],
//!   "settings": { ... },
//!   "projects": [ ... ]
//! }
//! ```
//!
//! Blobs without a `version` field are version 0: the envelope written by the
//! previous app generation, `{ "state": { ... }, "version": 0 }`, or a bare
//! state object. Migrations run in order until [`SCHEMA_VERSION`].
//!
//! # Atomic Writes
//!
//! [`JsonFileBackend`] writes to a temp file in the same directory and renames
//! it over the target so a crash mid-write never leaves a truncated store.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{IntervalsError, Result};
use crate::types::{IntervalNote, Project, Session, Settings};

pub const SCHEMA_VERSION: u32 = 1;

/// `MIGRATIONS[n]` upgrades a version-`n` blob to version `n + 1`.
const MIGRATIONS: [fn(Value) -> Value; SCHEMA_VERSION as usize] = [migrate_v0_to_v1];

/// The on-disk JSON structure for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub version: u32,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub notes: Vec<IntervalNote>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default = "crate::types::default_projects")]
    pub projects: Vec<Project>,
}

impl Default for PersistedState {
    fn default() -> Self {
        PersistedState {
            version: SCHEMA_VERSION,
            sessions: Vec::new(),
            notes: Vec::new(),
            settings: Settings::default(),
            projects: crate::types::default_projects(),
        }
    }
}

pub fn encode(state: &PersistedState) -> Result<String> {
    serde_json::to_string_pretty(state).map_err(|source| IntervalsError::Json {
        context: "serializing store".to_string(),
        source,
    })
}

/// Parses a blob, migrating older layouts forward.
pub fn decode(blob: &str) -> Result<PersistedState> {
    let mut value: Value = serde_json::from_str(blob).map_err(|source| IntervalsError::Json {
        context: "parsing store".to_string(),
        source,
    })?;

    let mut version = read_version(&value);
    if version > SCHEMA_VERSION {
        return Err(IntervalsError::UnsupportedSchemaVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    for migrate in &MIGRATIONS[version as usize..] {
        value = migrate(value);
        version += 1;
        debug!(version, "Migrated store blob");
    }

    serde_json::from_value(value).map_err(|source| IntervalsError::Json {
        context: format!("decoding store v{}", SCHEMA_VERSION),
        source,
    })
}

fn read_version(value: &Value) -> u32 {
    value
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0)
}

/// v0 → v1: unwrap the `state` envelope and stamp the version.
fn migrate_v0_to_v1(value: Value) -> Value {
    let mut inner = match value {
        Value::Object(mut map) => match map.remove("state") {
            Some(Value::Object(state)) => state,
            _ => map,
        },
        _ => serde_json::Map::new(),
    };
    inner.insert("version".to_string(), Value::from(1u32));
    Value::Object(inner)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backends
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the serialized store lives.
pub trait StoreBackend: Send + Sync {
    /// Returns `None` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, blob: &str) -> Result<()>;
}

/// Single JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(context: &'static str) -> impl FnOnce(std::io::Error) -> IntervalsError {
    move |source| IntervalsError::Io {
        context: context.to_string(),
        source,
    }
}

impl StoreBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs_err::read_to_string(&self.path)
            .map(Some)
            .map_err(io_error("reading store file"))
    }

    fn save(&self, blob: &str) -> Result<()> {
        let parent_dir = self
            .path
            .parent()
            .ok_or_else(|| IntervalsError::DataDirNotFound(self.path.clone()))?;
        fs_err::create_dir_all(parent_dir).map_err(io_error("creating store directory"))?;

        let mut temp_file =
            NamedTempFile::new_in(parent_dir).map_err(io_error("creating temp store file"))?;
        temp_file
            .write_all(blob.as_bytes())
            .map_err(io_error("writing temp store file"))?;
        temp_file
            .flush()
            .map_err(io_error("flushing temp store file"))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| IntervalsError::Io {
                context: "replacing store file".to_string(),
                source: e.error,
            })?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryBackend;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::StoreBackend;
    use crate::error::{IntervalsError, Result};

    /// In-memory blob; clones share storage, so a test can drop a store and
    /// "relaunch" against the same backend.
    #[derive(Debug, Clone, Default)]
    pub struct MemoryBackend {
        blob: Arc<Mutex<Option<String>>>,
        fail_writes: Arc<AtomicBool>,
    }

    impl MemoryBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_blob(blob: impl Into<String>) -> Self {
            let backend = Self::default();
            *backend.blob.lock().unwrap_or_else(|p| p.into_inner()) = Some(blob.into());
            backend
        }

        pub fn contents(&self) -> Option<String> {
            self.blob.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    impl StoreBackend for MemoryBackend {
        fn load(&self) -> Result<Option<String>> {
            Ok(self.contents())
        }

        fn save(&self, blob: &str) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(IntervalsError::Io {
                    context: "writing memory store".to_string(),
                    source: std::io::Error::other("writes disabled"),
                });
            }
            *self.blob.lock().unwrap_or_else(|p| p.into_inner()) = Some(blob.to_string());
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Flushing
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Write on the caller's thread before the mutator returns.
    Inline,
    /// Hand blobs to a writer thread; order of issue is preserved.
    #[default]
    Background,
}

struct BackgroundWriter {
    tx: Option<Sender<String>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWriter {
    fn spawn(backend: Arc<dyn StoreBackend>) -> Self {
        let (tx, rx) = mpsc::channel::<String>();
        let handle = thread::spawn(move || {
            while let Ok(mut blob) = rx.recv() {
                // Only the newest pending snapshot matters.
                while let Ok(newer) = rx.try_recv() {
                    blob = newer;
                }
                if let Err(err) = backend.save(&blob) {
                    warn!(error = %err, "Store flush failed");
                }
            }
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }
}

impl Drop for BackgroundWriter {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Store writer thread panicked");
            }
        }
    }
}

/// Fire-and-forget persistence for the store. Failures are logged, never
/// returned.
pub(crate) struct Persistence {
    backend: Arc<dyn StoreBackend>,
    mode: FlushMode,
    writer: Option<BackgroundWriter>,
}

impl Persistence {
    pub(crate) fn new(backend: Arc<dyn StoreBackend>, mode: FlushMode) -> Self {
        Self {
            backend,
            mode,
            writer: None,
        }
    }

    pub(crate) fn load(&self) -> Result<Option<String>> {
        self.backend.load()
    }

    pub(crate) fn write(&mut self, blob: String) {
        match self.mode {
            FlushMode::Inline => {
                if let Err(err) = self.backend.save(&blob) {
                    warn!(error = %err, "Store flush failed");
                }
            }
            FlushMode::Background => {
                let backend = Arc::clone(&self.backend);
                let writer = self
                    .writer
                    .get_or_insert_with(|| BackgroundWriter::spawn(backend));
                let sent = writer.tx.as_ref().map(|tx| tx.send(blob));
                if !matches!(sent, Some(Ok(()))) {
                    warn!("Store writer thread is gone; flush dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SessionStatus, DEFAULT_INTERVAL_MINUTES};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample_state() -> PersistedState {
        let started = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();
        let mut state = PersistedState::default();
        state.sessions.push(Session {
            id: "01HZX".to_string(),
            label: "Work".to_string(),
            project_id: "work".to_string(),
            project_snapshot: Some(state.projects[0].snapshot()),
            interval_minutes: 25,
            status: SessionStatus::Completed,
            started_at: started,
            ended_at: Some(started + chrono::Duration::minutes(50)),
            total_seconds: 3000,
            intervals_completed: 2,
        });
        state.notes.push(IntervalNote {
            id: "01HZY".to_string(),
            session_id: "01HZX".to_string(),
            note: "drafted outline".to_string(),
            created_at: started + chrono::Duration::minutes(25),
        });
        state.settings.interval_minutes = 30;
        state
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let state = sample_state();
        let decoded = decode(&encode(&state).unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_encoded_blob_uses_camel_case_layout() {
        let blob = encode(&sample_state()).unwrap();
        let value: Value = serde_json::from_str(&blob).unwrap();
        assert_eq!(value["version"], 1);
        let session = &value["sessions"][0];
        assert_eq!(session["projectId"], "work");
        assert_eq!(session["intervalsCompleted"], 2);
        assert_eq!(session["status"], "completed");
        assert_eq!(value["notes"][0]["sessionId"], "01HZX");
        assert_eq!(value["projects"][0]["isDefault"], true);
    }

    #[test]
    fn test_decode_legacy_envelope() {
        let blob = r##"{
            "state": {
                "sessions": [{
                    "id": "lx1-abc",
                    "label": "Reading",
                    "projectId": "learning",
                    "intervalMinutes": 25,
                    "status": "active",
                    "startedAt": "2026-01-05T08:00:00.000Z",
                    "totalSeconds": 0,
                    "intervalsCompleted": 1
                }],
                "notes": [],
                "settings": { "intervalMinutes": 45, "soundEnabled": false },
                "projects": [{ "id": "work", "name": "Work", "color": "#52525B", "icon": "briefcase-outline", "isDefault": true }]
            },
            "version": 0
        }"##;

        let state = decode(blob).unwrap();
        assert_eq!(state.version, SCHEMA_VERSION);
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.sessions[0].status, SessionStatus::Active);
        assert!(state.sessions[0].project_snapshot.is_none());
        assert_eq!(state.settings.interval_minutes, 45);
        assert!(!state.settings.sound_enabled);
        assert!(state.settings.haptic_enabled);
        assert_eq!(state.projects.len(), 1);
    }

    #[test]
    fn test_decode_bare_unversioned_state() {
        let state = decode(r#"{"sessions":[],"notes":[]}"#).unwrap();
        assert_eq!(state.settings.interval_minutes, DEFAULT_INTERVAL_MINUTES);
        assert_eq!(state.projects.len(), 4);
    }

    #[test]
    fn test_decode_rejects_newer_version() {
        let err = decode(r#"{"version":7,"sessions":[]}"#).unwrap_err();
        assert!(matches!(
            err,
            IntervalsError::UnsupportedSchemaVersion { found: 7, supported: 1 }
        ));
    }

    #[test]
    fn test_decode_corrupt_json_is_error() {
        assert!(matches!(decode("{invalid"), Err(IntervalsError::Json { .. })));
    }

    #[test]
    fn test_file_backend_round_trip() {
        let temp = tempdir().unwrap();
        let backend = JsonFileBackend::new(temp.path().join("nested").join("store.json"));

        assert_eq!(backend.load().unwrap(), None);
        backend.save("{\"version\":1}").unwrap();
        assert_eq!(backend.load().unwrap().as_deref(), Some("{\"version\":1}"));

        backend.save("{\"version\":1,\"sessions\":[]}").unwrap();
        assert_eq!(
            backend.load().unwrap().as_deref(),
            Some("{\"version\":1,\"sessions\":[]}")
        );
    }

    #[test]
    fn test_memory_backend_clones_share_blob() {
        let backend = MemoryBackend::new();
        let other = backend.clone();
        backend.save("x").unwrap();
        assert_eq!(other.contents().as_deref(), Some("x"));
    }

    #[test]
    fn test_failed_inline_write_is_swallowed() {
        let backend = MemoryBackend::with_blob("old");
        backend.set_fail_writes(true);
        let mut persistence = Persistence::new(Arc::new(backend.clone()), FlushMode::Inline);

        persistence.write("new".to_string());

        assert_eq!(backend.contents().as_deref(), Some("old"));
    }

    #[test]
    fn test_background_writer_drains_on_drop() {
        let backend = MemoryBackend::new();
        {
            let mut persistence =
                Persistence::new(Arc::new(backend.clone()), FlushMode::Background);
            persistence.write("first".to_string());
            persistence.write("second".to_string());
        }
        assert_eq!(backend.contents().as_deref(), Some("second"));
    }
}
