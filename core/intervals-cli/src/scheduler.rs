//! Notification scheduler for the terminal: rings the bell after the delay
//! unless the alert was cancelled first.
//!
//! One worker thread owns every pending alert and sleeps on its request
//! channel until the earliest deadline, so cancelled alerts cost nothing.

use std::collections::HashMap;
use std::io::Write;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use intervals_core::{NotificationError, NotificationScheduler};
use tracing::{debug, warn};

enum Request {
    Schedule { handle: String, alert: Alert },
    Cancel(String),
    CancelAll,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Alert {
    due: Instant,
    title: String,
    body: String,
}

/// Pending alerts keyed by handle.
#[derive(Default)]
struct AlertQueue {
    pending: HashMap<String, Alert>,
}

impl AlertQueue {
    fn apply(&mut self, request: Request) {
        match request {
            Request::Schedule { handle, alert } => {
                self.pending.insert(handle, alert);
            }
            Request::Cancel(handle) => {
                if self.pending.remove(&handle).is_none() {
                    debug!(handle = %handle, "Cancel for an alert that already fired");
                }
            }
            Request::CancelAll => self.pending.clear(),
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.pending.values().map(|a| a.due).min()
    }

    /// Removes and returns alerts due at `now`, earliest first.
    fn take_due(&mut self, now: Instant) -> Vec<Alert> {
        let due: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, alert)| alert.due <= now)
            .map(|(handle, _)| handle.clone())
            .collect();
        let mut fired: Vec<Alert> = due
            .iter()
            .filter_map(|handle| self.pending.remove(handle))
            .collect();
        fired.sort_by_key(|a| a.due);
        fired
    }
}

fn ring(alert: &Alert) {
    print!("\x07\n[{}] {}\n> ", alert.title, alert.body);
    let _ = std::io::stdout().flush();
}

/// Runs until every sender is dropped.
fn run_worker(rx: Receiver<Request>) {
    let mut queue = AlertQueue::default();
    loop {
        let received = match queue.next_due() {
            Some(due) => match rx.recv_timeout(due.saturating_duration_since(Instant::now())) {
                Ok(request) => Some(request),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(request) => Some(request),
                Err(_) => break,
            },
        };
        if let Some(request) = received {
            queue.apply(request);
        }
        for alert in queue.take_due(Instant::now()) {
            ring(&alert);
        }
    }
    debug!(dropped = queue.pending.len(), "Alert worker stopped");
}

pub struct TerminalScheduler {
    requests: Sender<Request>,
}

impl TerminalScheduler {
    pub fn new() -> Self {
        let (requests, rx) = mpsc::channel();
        if let Err(err) = thread::Builder::new()
            .name("intervals-alerts".to_string())
            .spawn(move || run_worker(rx))
        {
            // The receiver is gone with the closure; every send reports failure.
            warn!(error = %err, "Failed to start alert worker");
        }
        Self { requests }
    }

    fn send(&self, request: Request) -> Result<(), NotificationError> {
        self.requests
            .send(request)
            .map_err(|_| NotificationError::Failed {
                message: "alert worker is not running".to_string(),
            })
    }
}

impl Default for TerminalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationScheduler for TerminalScheduler {
    fn request_permission(&self) -> bool {
        true
    }

    fn schedule_after(
        &self,
        seconds: u64,
        title: String,
        body: String,
    ) -> Result<String, NotificationError> {
        let handle = ulid::Ulid::new().to_string();
        let alert = Alert {
            due: Instant::now() + Duration::from_secs(seconds),
            title,
            body,
        };
        self.send(Request::Schedule {
            handle: handle.clone(),
            alert,
        })?;
        Ok(handle)
    }

    fn cancel(&self, handle: String) -> Result<(), NotificationError> {
        self.send(Request::Cancel(handle))
    }

    fn cancel_all(&self) -> Result<(), NotificationError> {
        self.send(Request::CancelAll)
    }
}
