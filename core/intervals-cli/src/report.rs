//! Plain-text rendering for the CLI.

use std::fmt::Write;

use chrono::Local;
use intervals_core::{
    format_duration, EngineState, FocusStats, HistoryEntry, Project, Settings, TimerSnapshot,
};

fn clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn status(snapshot: &TimerSnapshot) -> String {
    let Some(session) = &snapshot.session else {
        return format!(
            "Idle. Next interval: {} min\n",
            snapshot.interval_seconds / 60
        );
    };
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} [{}] {} left, {} focused, {} interval(s) done",
        session.label,
        snapshot.state.as_str(),
        clock(snapshot.remaining_seconds),
        format_duration(snapshot.elapsed_seconds),
        session.intervals_completed,
    );
    if let Some(at) = snapshot.next_chime_at {
        let _ = writeln!(out, "Chime at {}", at.with_timezone(&Local).format("%H:%M:%S"));
    }
    if snapshot.state == EngineState::AwaitingCheckIn {
        out.push_str("Check in: `continue [note]` or `break [note]`\n");
    }
    out
}

pub fn history(entries: &[HistoryEntry], limit: usize) -> String {
    if entries.is_empty() {
        return "No completed sessions yet.\n".to_string();
    }
    let mut out = String::new();
    for entry in entries.iter().take(limit) {
        let session = &entry.session;
        let name = entry
            .project
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or(session.label.as_str());
        let _ = writeln!(
            out,
            "{}  {:<14} {:>7}  {} interval(s)",
            session.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            name,
            format_duration(session.total_seconds),
            session.intervals_completed,
        );
        for note in &entry.notes {
            let _ = writeln!(out, "    - {}", note.note);
        }
    }
    out
}

pub fn stats(stats: &FocusStats) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Today:     {} ({} intervals)",
        format_duration(stats.today_seconds),
        stats.today_intervals
    );
    let _ = writeln!(
        out,
        "This week: {} over {} sessions",
        format_duration(stats.week_seconds),
        stats.week_sessions
    );
    for project in &stats.week_by_project {
        let _ = writeln!(out, "  {:<14} {:>7}", project.name, format_duration(project.seconds));
    }
    let _ = writeln!(
        out,
        "All time:  {} over {} sessions, {} intervals, {} notes",
        format_duration(stats.total_seconds),
        stats.total_sessions,
        stats.total_intervals,
        stats.total_notes
    );
    let _ = writeln!(out, "Streak:    {} day(s)", stats.streak_days);
    out
}

pub fn projects(projects: &[&Project]) -> String {
    let mut out = String::new();
    for project in projects {
        let marker = if project.is_default { " (default)" } else { "" };
        let _ = writeln!(out, "{:<28} {}{}", project.id, project.name, marker);
    }
    out
}

pub fn settings(settings: &Settings) -> String {
    let on_off = |value: bool| if value { "on" } else { "off" };
    let mut out = String::new();
    let _ = writeln!(out, "interval:      {} min", settings.interval_minutes);
    let _ = writeln!(out, "sound:         {}", on_off(settings.sound_enabled));
    let _ = writeln!(out, "haptics:       {}", on_off(settings.haptic_enabled));
    let _ = writeln!(out, "notifications: {}", on_off(settings.notifications_enabled));
    let _ = writeln!(out, "chime:         {}", settings.selected_sound);
    out
}
