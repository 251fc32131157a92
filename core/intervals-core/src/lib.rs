//! # intervals-core
//!
//! Core library for Intervals, a focus timer built around a check-in ritual:
//! a labeled session counts down one interval at a time, and each time the
//! countdown reaches zero the user logs a short note before continuing or
//! ending.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Hosts drive the engine from
//!   their own event loop (UI thread, CLI loop).
//! - **Wall clock is truth**: the countdown is recomputed from timestamps, so
//!   suspension and missed ticks never skew it.
//! - **Side effects never block**: storage flushes and notification calls are
//!   logged on failure and otherwise ignored.
//! - **FFI-ready**: UniFFI annotations enable Swift and Kotlin bindings via
//!   [`IntervalsEngine`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use intervals_core::*;
//!
//! let mut engine = LifecycleEngine::new(
//!     Store::in_memory(),
//!     Arc::new(SystemClock),
//!     Arc::new(NoopScheduler),
//! );
//! engine.start_session("work");
//! let snapshot = engine.snapshot();
//! ```

// UniFFI scaffolding for Swift/Kotlin bindings
uniffi::setup_scaffolding!();

pub mod clock;
pub mod error;
pub mod ffi;
pub mod insights;
pub mod lifecycle;
pub mod notify;
pub mod recovery;
pub mod storage;
pub mod store;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{IntervalsError, IntervalsFfiError, NotificationError, Result};
pub use ffi::*;
pub use insights::{format_duration, history, FocusStats, HistoryEntry, ProjectTime};
pub use lifecycle::{EngineEvent, EngineState, LifecycleEngine, TickOutcome, TimerSnapshot};
pub use notify::{NoopScheduler, NotificationScheduler, Notifier};
#[cfg(any(test, feature = "test-helpers"))]
pub use notify::{RecordingScheduler, SchedulerCall};
pub use recovery::{Orphan, RecoveryResolver, RecoveryScan, Resolution};
pub use storage::*;
#[cfg(any(test, feature = "test-helpers"))]
pub use store::persist::MemoryBackend;
pub use store::persist::{FlushMode, JsonFileBackend, StoreBackend};
pub use store::Store;
pub use timer::{Countdown, CountdownSync};
pub use types::*;
