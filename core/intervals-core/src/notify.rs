//! Local-notification seam.
//!
//! Hosts implement [`NotificationScheduler`] (Swift/Kotlin through UniFFI, or
//! Rust for the CLI). The engine never talks to it directly: every call goes
//! through [`Notifier`], which owns the single handle tied to the current
//! interval and swallows every failure.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::NotificationError;

pub const NOTIFICATION_TITLE: &str = "Interval Complete";

pub fn notification_body(label: &str) -> String {
    format!("Time to check in on \"{}\"", label)
}

/// Host-side scheduler for one-shot, time-delayed local alerts.
#[uniffi::export(with_foreign)]
pub trait NotificationScheduler: Send + Sync {
    /// Asks the OS for permission to post alerts.
    fn request_permission(&self) -> bool;

    /// Schedules an alert `seconds` from now and returns a handle for
    /// cancellation.
    fn schedule_after(
        &self,
        seconds: u64,
        title: String,
        body: String,
    ) -> Result<String, NotificationError>;

    fn cancel(&self, handle: String) -> Result<(), NotificationError>;

    fn cancel_all(&self) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permission {
    Unknown,
    Granted,
    Denied,
}

/// Cancel-before-reschedule wrapper around a [`NotificationScheduler`].
pub struct Notifier {
    scheduler: Arc<dyn NotificationScheduler>,
    pending: Option<String>,
    permission: Permission,
    denial_reported: bool,
}

impl Notifier {
    pub fn new(scheduler: Arc<dyn NotificationScheduler>) -> Self {
        Self {
            scheduler,
            pending: None,
            permission: Permission::Unknown,
            denial_reported: false,
        }
    }

    /// Handle of the alert scheduled for the current interval.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Cancels the current alert, then schedules a new one `seconds` out.
    ///
    /// Returns `None` when disabled, when `seconds` is zero, when permission
    /// is denied, or when the host fails to schedule.
    pub fn reschedule(&mut self, seconds: u64, label: &str, enabled: bool) -> Option<String> {
        self.cancel_pending();

        if !enabled || seconds == 0 {
            return None;
        }
        if !self.ensure_permission() {
            return None;
        }

        match self.scheduler.schedule_after(
            seconds,
            NOTIFICATION_TITLE.to_string(),
            notification_body(label),
        ) {
            Ok(handle) => {
                debug!(handle = %handle, seconds, "Scheduled interval notification");
                self.pending = Some(handle.clone());
                Some(handle)
            }
            Err(err) => {
                warn!(error = %err, "Failed to schedule notification");
                None
            }
        }
    }

    pub fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            if let Err(err) = self.scheduler.cancel(handle.clone()) {
                warn!(handle = %handle, error = %err, "Failed to cancel notification");
            }
        }
    }

    /// Cancels every alert the host knows about, including ones scheduled by
    /// a previous process.
    pub fn cancel_all(&mut self) {
        self.pending = None;
        if let Err(err) = self.scheduler.cancel_all() {
            warn!(error = %err, "Failed to cancel all notifications");
        }
    }

    /// Forgets a cached denial so the next schedule asks the host again.
    /// The user may have granted permission in system settings meanwhile.
    pub fn recheck_permission(&mut self) {
        if self.permission == Permission::Denied {
            self.permission = Permission::Unknown;
        }
    }

    /// True exactly once, after the first permission denial.
    pub fn take_denial(&mut self) -> bool {
        if self.permission == Permission::Denied && !self.denial_reported {
            self.denial_reported = true;
            return true;
        }
        false
    }

    fn ensure_permission(&mut self) -> bool {
        match self.permission {
            Permission::Granted => true,
            Permission::Denied => false,
            Permission::Unknown => {
                let granted = self.scheduler.request_permission();
                if granted {
                    self.permission = Permission::Granted;
                } else {
                    info!("Notification permission denied; countdown continues in-app");
                    self.permission = Permission::Denied;
                }
                granted
            }
        }
    }
}

/// Scheduler that never posts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl NotificationScheduler for NoopScheduler {
    fn request_permission(&self) -> bool {
        true
    }

    fn schedule_after(
        &self,
        _seconds: u64,
        _title: String,
        _body: String,
    ) -> Result<String, NotificationError> {
        Ok("noop".to_string())
    }

    fn cancel(&self, _handle: String) -> Result<(), NotificationError> {
        Ok(())
    }

    fn cancel_all(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use recording::{RecordingScheduler, SchedulerCall};

/// Scheduler doubles for tests and previews.
#[cfg(any(test, feature = "test-helpers"))]
mod recording {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use super::NotificationScheduler;
    use crate::error::NotificationError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SchedulerCall {
        RequestPermission,
        Schedule {
            handle: String,
            seconds: u64,
            title: String,
            body: String,
        },
        Cancel(String),
        CancelAll,
    }

    /// Scheduler double that records every call. Clones share the log.
    #[derive(Debug, Clone)]
    pub struct RecordingScheduler {
        calls: Arc<Mutex<Vec<SchedulerCall>>>,
        next_handle: Arc<AtomicU64>,
        grant: Arc<AtomicBool>,
        fail: Arc<AtomicBool>,
    }

    impl Default for RecordingScheduler {
        fn default() -> Self {
            Self {
                calls: Arc::default(),
                next_handle: Arc::default(),
                grant: Arc::new(AtomicBool::new(true)),
                fail: Arc::default(),
            }
        }
    }

    impl RecordingScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// A scheduler whose permission prompt is always declined.
        pub fn denying() -> Self {
            let scheduler = Self::default();
            scheduler.grant.store(false, Ordering::SeqCst);
            scheduler
        }

        pub fn set_grant(&self, grant: bool) {
            self.grant.store(grant, Ordering::SeqCst);
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn calls(&self) -> Vec<SchedulerCall> {
            self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap_or_else(|p| p.into_inner()).clear();
        }

        /// Delays of every successful `schedule_after`, in call order.
        pub fn scheduled_delays(&self) -> Vec<u64> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SchedulerCall::Schedule { seconds, .. } => Some(seconds),
                    _ => None,
                })
                .collect()
        }

        /// Handles scheduled and not yet cancelled.
        pub fn live_handles(&self) -> Vec<String> {
            let mut live = Vec::new();
            for call in self.calls() {
                match call {
                    SchedulerCall::Schedule { handle, .. } => live.push(handle),
                    SchedulerCall::Cancel(handle) => live.retain(|h| h != &handle),
                    SchedulerCall::CancelAll => live.clear(),
                    SchedulerCall::RequestPermission => {}
                }
            }
            live
        }

        fn record(&self, call: SchedulerCall) {
            self.calls
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(call);
        }
    }

    impl NotificationScheduler for RecordingScheduler {
        fn request_permission(&self) -> bool {
            self.record(SchedulerCall::RequestPermission);
            self.grant.load(Ordering::SeqCst)
        }

        fn schedule_after(
            &self,
            seconds: u64,
            title: String,
            body: String,
        ) -> Result<String, NotificationError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NotificationError::Failed {
                    message: "scheduler unavailable".to_string(),
                });
            }
            let handle = format!("n-{}", self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
            self.record(SchedulerCall::Schedule {
                handle: handle.clone(),
                seconds,
                title,
                body,
            });
            Ok(handle)
        }

        fn cancel(&self, handle: String) -> Result<(), NotificationError> {
            self.record(SchedulerCall::Cancel(handle));
            Ok(())
        }

        fn cancel_all(&self) -> Result<(), NotificationError> {
            self.record(SchedulerCall::CancelAll);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(scheduler: &RecordingScheduler) -> Notifier {
        Notifier::new(Arc::new(scheduler.clone()))
    }

    #[test]
    fn test_reschedule_cancels_previous_handle() {
        let scheduler = RecordingScheduler::new();
        let mut notifier = notifier(&scheduler);

        let first = notifier.reschedule(1500, "Work", true).unwrap();
        let second = notifier.reschedule(900, "Work", true).unwrap();

        assert_ne!(first, second);
        assert_eq!(scheduler.live_handles(), vec![second.clone()]);
        assert_eq!(notifier.pending(), Some(second.as_str()));
    }

    #[test]
    fn test_notification_text() {
        let scheduler = RecordingScheduler::new();
        let mut notifier = notifier(&scheduler);
        notifier.reschedule(60, "Learning", true);

        let scheduled = scheduler
            .calls()
            .into_iter()
            .find(|c| matches!(c, SchedulerCall::Schedule { .. }));
        match scheduled {
            Some(SchedulerCall::Schedule { title, body, .. }) => {
                assert_eq!(title, "Interval Complete");
                assert_eq!(body, "Time to check in on \"Learning\"");
            }
            other => panic!("expected a schedule call, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_seconds_or_disabled_schedules_nothing() {
        let scheduler = RecordingScheduler::new();
        let mut notifier = notifier(&scheduler);

        assert!(notifier.reschedule(0, "Work", true).is_none());
        assert!(notifier.reschedule(60, "Work", false).is_none());
        assert!(scheduler.scheduled_delays().is_empty());
    }

    #[test]
    fn test_permission_requested_once() {
        let scheduler = RecordingScheduler::new();
        let mut notifier = notifier(&scheduler);

        notifier.reschedule(60, "Work", true);
        notifier.reschedule(60, "Work", true);

        let requests = scheduler
            .calls()
            .iter()
            .filter(|c| **c == SchedulerCall::RequestPermission)
            .count();
        assert_eq!(requests, 1);
    }

    #[test]
    fn test_denial_reported_once() {
        let scheduler = RecordingScheduler::denying();
        let mut notifier = notifier(&scheduler);

        assert!(notifier.reschedule(60, "Work", true).is_none());
        assert!(notifier.take_denial());
        assert!(notifier.reschedule(60, "Work", true).is_none());
        assert!(!notifier.take_denial());
    }

    #[test]
    fn test_recheck_after_grant_schedules() {
        let scheduler = RecordingScheduler::denying();
        let mut notifier = notifier(&scheduler);
        assert!(notifier.reschedule(60, "Work", true).is_none());
        assert!(notifier.take_denial());

        scheduler.set_grant(true);
        notifier.recheck_permission();

        assert!(notifier.reschedule(60, "Work", true).is_some());
        assert_eq!(scheduler.scheduled_delays(), vec![60]);
        assert!(!notifier.take_denial());
    }

    #[test]
    fn test_recheck_keeps_granted_permission() {
        let scheduler = RecordingScheduler::new();
        let mut notifier = notifier(&scheduler);
        notifier.reschedule(60, "Work", true);

        notifier.recheck_permission();
        notifier.reschedule(60, "Work", true);

        let requests = scheduler
            .calls()
            .iter()
            .filter(|c| **c == SchedulerCall::RequestPermission)
            .count();
        assert_eq!(requests, 1);
    }

    #[test]
    fn test_schedule_failure_is_swallowed() {
        let scheduler = RecordingScheduler::new();
        scheduler.set_fail(true);
        let mut notifier = notifier(&scheduler);

        assert!(notifier.reschedule(60, "Work", true).is_none());
        assert!(notifier.pending().is_none());
        assert!(!notifier.take_denial());
    }

    #[test]
    fn test_cancel_all_clears_pending() {
        let scheduler = RecordingScheduler::new();
        let mut notifier = notifier(&scheduler);
        notifier.reschedule(60, "Work", true);

        notifier.cancel_all();

        assert!(notifier.pending().is_none());
        assert!(scheduler.live_handles().is_empty());
    }
}
