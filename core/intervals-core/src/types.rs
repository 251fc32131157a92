//! Durable entity types: projects, sessions, interval notes and settings.
//!
//! These serialize with camelCase field names so the persisted blob keeps the
//! layout written by earlier app generations (see [`crate::store::persist`]).
//!
//! **FFI Support:** types without timestamps are exported through UniFFI
//! directly; `Session` and `IntervalNote` cross the boundary as the string-
//! stamped records in [`crate::ffi`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IntervalsError, Result};

/// Default interval length in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 25;

/// Interval lengths offered as presets by the hosts.
pub const INTERVAL_OPTIONS: [u32; 6] = [15, 20, 25, 30, 45, 60];

/// Upper bound accepted for `interval_minutes`.
pub const MAX_INTERVAL_MINUTES: u32 = 240;

/// Color given to seed and newly created projects.
pub const DEFAULT_PROJECT_COLOR: &str = "#52525B";

/// Label used when a session starts against an unknown project id.
pub const FALLBACK_SESSION_LABEL: &str = "Focus Session";

// ═══════════════════════════════════════════════════════════════════════════════
// Projects
// ═══════════════════════════════════════════════════════════════════════════════

/// A focus category sessions are filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    /// Seed projects are protected from deletion.
    #[serde(default)]
    pub is_default: bool,
}

impl Project {
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            name: self.name.clone(),
            icon: self.icon.clone(),
            color: self.color.clone(),
        }
    }
}

/// Project display data frozen into a session when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct ProjectSnapshot {
    pub name: String,
    pub icon: String,
    pub color: String,
}

/// Input for creating a project. The id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub color: String,
    pub icon: String,
}

impl NewProject {
    pub fn named(name: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: DEFAULT_PROJECT_COLOR.to_string(),
            icon: icon.into(),
        }
    }
}

/// Partial update for a project; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

pub fn default_projects() -> Vec<Project> {
    [
        ("work", "Work", "briefcase-outline"),
        ("learning", "Learning", "book-outline"),
        ("personal", "Personal", "person-outline"),
        ("creative", "Creative", "brush-outline"),
    ]
    .into_iter()
    .map(|(id, name, icon)| Project {
        id: id.to_string(),
        name: name.to_string(),
        color: DEFAULT_PROJECT_COLOR.to_string(),
        icon: icon.to_string(),
        is_default: true,
    })
    .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════════════════════════

/// Persisted lifecycle status of a session.
///
/// `Active` and `Paused` are "open"; at most one session is open at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }

    /// Status only moves active↔paused or forward to completed.
    pub fn can_become(self, next: SessionStatus) -> bool {
        match (self, next) {
            (SessionStatus::Completed, _) => false,
            (_, SessionStatus::Completed) => true,
            (SessionStatus::Active, SessionStatus::Paused)
            | (SessionStatus::Paused, SessionStatus::Active) => true,
            (current, next) => current == next,
        }
    }
}

/// One focus-ritual instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub label: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_snapshot: Option<ProjectSnapshot>,
    /// Captured at start; settings changes never alter it.
    pub interval_minutes: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds actually focused, written when the session ends.
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default)]
    pub intervals_completed: u32,
}

impl Session {
    pub fn interval_seconds(&self) -> u64 {
        u64::from(self.interval_minutes) * 60
    }

    /// Wall-clock seconds since the session started (0 if `now` is earlier).
    pub fn age_seconds(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from(now.signed_duration_since(self.started_at).num_seconds()).unwrap_or(0)
    }

    /// Project display data: the live project when it still exists, otherwise
    /// the snapshot captured at start.
    pub fn display_project(&self, live: Option<&Project>) -> Option<ProjectSnapshot> {
        live.map(Project::snapshot)
            .or_else(|| self.project_snapshot.clone())
    }
}

/// Input for creating a session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub label: String,
    pub project_id: String,
    pub project_snapshot: Option<ProjectSnapshot>,
    pub interval_minutes: u32,
    pub started_at: DateTime<Utc>,
}

/// Partial update for a session record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub label: Option<String>,
    pub status: Option<SessionStatus>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_seconds: Option<u64>,
    pub intervals_completed: Option<u32>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Notes
// ═══════════════════════════════════════════════════════════════════════════════

/// Reflection captured at a check-in. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalNote {
    pub id: String,
    pub session_id: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-wide configuration, persisted with the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub interval_minutes: u32,
    pub sound_enabled: bool,
    pub haptic_enabled: bool,
    pub notifications_enabled: bool,
    pub selected_sound: String,
    pub onboarding_completed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            sound_enabled: true,
            haptic_enabled: true,
            notifications_enabled: true,
            selected_sound: "glass".to_string(),
            onboarding_completed: false,
        }
    }
}

impl Settings {
    pub fn interval_seconds(&self) -> u64 {
        u64::from(self.interval_minutes) * 60
    }
}

/// Merge-update for [`Settings`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct SettingsPatch {
    pub interval_minutes: Option<u32>,
    pub sound_enabled: Option<bool>,
    pub haptic_enabled: Option<bool>,
    pub notifications_enabled: Option<bool>,
    pub selected_sound: Option<String>,
    pub onboarding_completed: Option<bool>,
}

impl SettingsPatch {
    /// Validates the whole patch, then merges it. Nothing changes on error.
    pub fn apply_to(&self, settings: &Settings) -> Result<Settings> {
        if let Some(minutes) = self.interval_minutes {
            if minutes == 0 || minutes > MAX_INTERVAL_MINUTES {
                return Err(IntervalsError::InvalidSetting {
                    field: "interval_minutes",
                    reason: format!("{} is outside 1..={}", minutes, MAX_INTERVAL_MINUTES),
                });
            }
        }
        if let Some(sound) = &self.selected_sound {
            if sound.trim().is_empty() {
                return Err(IntervalsError::InvalidSetting {
                    field: "selected_sound",
                    reason: "must not be empty".to_string(),
                });
            }
        }

        let mut next = settings.clone();
        if let Some(minutes) = self.interval_minutes {
            next.interval_minutes = minutes;
        }
        if let Some(value) = self.sound_enabled {
            next.sound_enabled = value;
        }
        if let Some(value) = self.haptic_enabled {
            next.haptic_enabled = value;
        }
        if let Some(value) = self.notifications_enabled {
            next.notifications_enabled = value;
        }
        if let Some(sound) = &self.selected_sound {
            next.selected_sound = sound.trim().to_string();
        }
        if let Some(value) = self.onboarding_completed {
            next.onboarding_completed = value;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_session(started_at: DateTime<Utc>) -> Session {
        Session {
            id: "s1".to_string(),
            label: "Work".to_string(),
            project_id: "work".to_string(),
            project_snapshot: Some(ProjectSnapshot {
                name: "Work".to_string(),
                icon: "briefcase-outline".to_string(),
                color: DEFAULT_PROJECT_COLOR.to_string(),
            }),
            interval_minutes: 25,
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
            total_seconds: 0,
            intervals_completed: 0,
        }
    }

    #[test]
    fn test_status_transitions() {
        use SessionStatus::*;
        assert!(Active.can_become(Paused));
        assert!(Paused.can_become(Active));
        assert!(Active.can_become(Completed));
        assert!(Paused.can_become(Completed));
        assert!(!Completed.can_become(Active));
        assert!(!Completed.can_become(Completed));
    }

    #[test]
    fn test_age_seconds_clamps_future_start() {
        let now = Utc::now();
        let session = make_session(now + Duration::seconds(30));
        assert_eq!(session.age_seconds(now), 0);

        let session = make_session(now - Duration::seconds(90));
        assert_eq!(session.age_seconds(now), 90);
    }

    #[test]
    fn test_display_project_prefers_live_then_snapshot() {
        let session = make_session(Utc::now());
        let renamed = Project {
            id: "work".to_string(),
            name: "Day Job".to_string(),
            color: DEFAULT_PROJECT_COLOR.to_string(),
            icon: "briefcase-outline".to_string(),
            is_default: true,
        };

        assert_eq!(
            session.display_project(Some(&renamed)).unwrap().name,
            "Day Job"
        );
        assert_eq!(session.display_project(None).unwrap().name, "Work");
    }

    #[test]
    fn test_settings_patch_merges_only_given_fields() {
        let settings = Settings::default();
        let patch = SettingsPatch {
            interval_minutes: Some(45),
            sound_enabled: Some(false),
            ..Default::default()
        };

        let next = patch.apply_to(&settings).unwrap();
        assert_eq!(next.interval_minutes, 45);
        assert!(!next.sound_enabled);
        assert!(next.haptic_enabled);
        assert_eq!(next.selected_sound, "glass");
    }

    #[test]
    fn test_settings_patch_rejects_zero_interval() {
        let patch = SettingsPatch {
            interval_minutes: Some(0),
            sound_enabled: Some(false),
            ..Default::default()
        };
        assert!(matches!(
            patch.apply_to(&Settings::default()),
            Err(IntervalsError::InvalidSetting { field: "interval_minutes", .. })
        ));
    }

    #[test]
    fn test_settings_missing_fields_take_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"intervalMinutes":30}"#).unwrap();
        assert_eq!(settings.interval_minutes, 30);
        assert!(settings.notifications_enabled);
        assert_eq!(settings.selected_sound, "glass");
    }

    #[test]
    fn test_default_projects_are_protected() {
        let projects = default_projects();
        assert_eq!(projects.len(), 4);
        assert!(projects.iter().all(|p| p.is_default));
        assert_eq!(projects[0].id, "work");
    }
}
