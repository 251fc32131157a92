//! History and focus statistics over completed sessions.
//!
//! Day boundaries follow the caller's time zone: pass `Local::now()` from a
//! desktop host or a fixed offset from a mobile host.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, NaiveDate, TimeZone};

use crate::store::Store;
use crate::types::{IntervalNote, ProjectSnapshot, Session, SessionStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub session: Session,
    pub project: Option<ProjectSnapshot>,
    pub notes: Vec<IntervalNote>,
}

/// Completed sessions, newest first, with their notes.
pub fn history(store: &Store) -> Vec<HistoryEntry> {
    store
        .sessions()
        .into_iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .map(|session| HistoryEntry {
            project: session.display_project(store.project(&session.project_id)),
            notes: store.notes_for_session(&session.id).to_vec(),
            session: session.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ProjectTime {
    pub project_id: String,
    pub name: String,
    pub seconds: u64,
    pub sessions: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, uniffi::Record)]
pub struct FocusStats {
    pub total_sessions: u32,
    pub total_seconds: u64,
    pub total_intervals: u32,
    pub total_notes: u64,
    pub today_seconds: u64,
    pub today_intervals: u32,
    pub week_seconds: u64,
    pub week_sessions: u32,
    /// Last seven days per project, most focused first.
    pub week_by_project: Vec<ProjectTime>,
    pub streak_days: u32,
}

impl FocusStats {
    pub fn compute<Tz: TimeZone>(store: &Store, now: DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let today = now.date_naive();
        let week_start = today - Duration::days(6);
        let local_day = |session: &Session| session.started_at.with_timezone(&tz).date_naive();

        let mut stats = FocusStats::default();
        let mut by_project: HashMap<String, ProjectTime> = HashMap::new();
        let mut active_days: BTreeSet<NaiveDate> = BTreeSet::new();

        for session in store.sessions() {
            if session.status != SessionStatus::Completed {
                continue;
            }
            let day = local_day(session);
            active_days.insert(day);

            stats.total_sessions += 1;
            stats.total_seconds += session.total_seconds;
            stats.total_intervals += session.intervals_completed;
            let notes = store.notes_for_session(&session.id).len();
            stats.total_notes += u64::try_from(notes).unwrap_or(u64::MAX);

            if day == today {
                stats.today_seconds += session.total_seconds;
                stats.today_intervals += session.intervals_completed;
            }
            if day >= week_start && day <= today {
                stats.week_seconds += session.total_seconds;
                stats.week_sessions += 1;

                let entry = by_project
                    .entry(session.project_id.clone())
                    .or_insert_with(|| ProjectTime {
                        project_id: session.project_id.clone(),
                        name: session
                            .display_project(store.project(&session.project_id))
                            .map(|p| p.name)
                            .unwrap_or_else(|| session.label.clone()),
                        seconds: 0,
                        sessions: 0,
                    });
                entry.seconds += session.total_seconds;
                entry.sessions += 1;
            }
        }

        let mut week_by_project: Vec<ProjectTime> = by_project
            .into_values()
            .filter(|p| p.seconds > 0)
            .collect();
        week_by_project.sort_by(|a, b| b.seconds.cmp(&a.seconds).then(a.name.cmp(&b.name)));
        stats.week_by_project = week_by_project;
        stats.streak_days = streak(&active_days, today);
        stats
    }
}

/// Consecutive active days ending today, or yesterday if today is empty.
fn streak(active_days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut day = if active_days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let mut count = 0;
    while active_days.contains(&day) {
        count += 1;
        day -= Duration::days(1);
    }
    count
}

/// `"42m"`, `"1h 5m"`, `"2h"`.
pub fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let (hours, minutes) = (minutes / 60, minutes % 60);
    match (hours, minutes) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewProject, NewSession, Project};
    use chrono::{FixedOffset, Utc};

    fn record(
        store: &mut Store,
        project_id: &str,
        started_at: DateTime<Utc>,
        seconds: u64,
        intervals: u32,
    ) -> Session {
        let project = store.project(project_id);
        let initial = NewSession {
            label: project.map(|p| p.name.clone()).unwrap_or_default(),
            project_id: project_id.to_string(),
            project_snapshot: project.map(Project::snapshot),
            interval_minutes: 25,
            started_at,
        };
        let session = store.create_session(initial).unwrap();
        store
            .update_session(
                &session.id,
                crate::types::SessionPatch {
                    intervals_completed: Some(intervals),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .complete_session(&session.id, started_at + Duration::seconds(seconds as i64), seconds)
            .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 18, 0, 0).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0m");
        assert_eq!(format_duration(42 * 60 + 30), "42m");
        assert_eq!(format_duration(65 * 60), "1h 5m");
        assert_eq!(format_duration(7200), "2h");
    }

    #[test]
    fn test_history_skips_open_sessions() {
        let mut store = Store::in_memory();
        let done = record(&mut store, "work", now() - Duration::hours(3), 1500, 1);
        store
            .append_note(&done.id, "shipped", now() - Duration::hours(2))
            .unwrap();
        let open = NewSession {
            label: "Work".to_string(),
            project_id: "work".to_string(),
            project_snapshot: None,
            interval_minutes: 25,
            started_at: now(),
        };
        store.create_session(open).unwrap();

        let entries = history(&store);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].session.id, done.id);
        assert_eq!(entries[0].notes[0].note, "shipped");
        assert_eq!(entries[0].project.as_ref().unwrap().name, "Work");
    }

    #[test]
    fn test_stats_totals_today_and_week() {
        let mut store = Store::in_memory();
        let today = record(&mut store, "work", now() - Duration::hours(2), 3000, 2);
        store.append_note(&today.id, "a", now()).unwrap();
        record(&mut store, "learning", now() - Duration::days(2), 1500, 1);
        record(&mut store, "work", now() - Duration::days(10), 600, 0);

        let stats = FocusStats::compute(&store, now());

        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.total_seconds, 5100);
        assert_eq!(stats.total_intervals, 3);
        assert_eq!(stats.total_notes, 1);
        assert_eq!(stats.today_seconds, 3000);
        assert_eq!(stats.today_intervals, 2);
        assert_eq!(stats.week_seconds, 4500);
        assert_eq!(stats.week_sessions, 2);
        let names: Vec<_> = stats.week_by_project.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Work", "Learning"]);
    }

    #[test]
    fn test_total_notes_sums_completed_sessions() {
        let mut store = Store::in_memory();
        let first = record(&mut store, "work", now() - Duration::days(30), 1500, 1);
        let second = record(&mut store, "learning", now() - Duration::hours(5), 3000, 2);
        for i in 0..3 {
            store.append_note(&first.id, &format!("first {}", i), now()).unwrap();
        }
        for i in 0..4 {
            store.append_note(&second.id, &format!("second {}", i), now()).unwrap();
        }
        let open = NewSession {
            label: "Work".to_string(),
            project_id: "work".to_string(),
            project_snapshot: None,
            interval_minutes: 25,
            started_at: now(),
        };
        let open = store.create_session(open).unwrap();
        store.append_note(&open.id, "in progress", now()).unwrap();

        let stats = FocusStats::compute(&store, now());
        assert_eq!(stats.total_notes, 7u64);
    }

    #[test]
    fn test_week_breakdown_omits_zero_time_and_uses_snapshot() {
        let mut store = Store::in_memory();
        let garden = store
            .create_project(NewProject::named("Garden", "leaf-outline"))
            .unwrap();
        record(&mut store, &garden.id, now() - Duration::hours(1), 900, 0);
        record(&mut store, "creative", now() - Duration::hours(4), 0, 0);
        store.delete_project(&garden.id).unwrap();

        let stats = FocusStats::compute(&store, now());
        assert_eq!(stats.week_by_project.len(), 1);
        assert_eq!(stats.week_by_project[0].name, "Garden");
        assert_eq!(stats.week_by_project[0].seconds, 900);
    }

    #[test]
    fn test_streak_counts_back_from_yesterday_when_today_empty() {
        let mut store = Store::in_memory();
        for days_ago in [1, 2, 3, 5] {
            record(&mut store, "work", now() - Duration::days(days_ago), 600, 0);
        }
        assert_eq!(FocusStats::compute(&store, now()).streak_days, 3);

        record(&mut store, "work", now() - Duration::hours(1), 600, 0);
        assert_eq!(FocusStats::compute(&store, now()).streak_days, 4);
    }

    #[test]
    fn test_day_boundaries_follow_time_zone() {
        let mut store = Store::in_memory();
        // 23:30 UTC on May 9 is already May 10 in UTC+2.
        let late = Utc.with_ymd_and_hms(2026, 5, 9, 23, 30, 0).unwrap();
        record(&mut store, "work", late, 1200, 1);

        let utc_stats = FocusStats::compute(&store, now());
        assert_eq!(utc_stats.today_seconds, 0);

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_stats = FocusStats::compute(&store, now().with_timezone(&plus_two));
        assert_eq!(local_stats.today_seconds, 1200);
    }
}
