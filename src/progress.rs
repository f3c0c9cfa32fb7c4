//! Progress reporting and cooperative cancellation.
//!
//! Long-running phases (traversal, metadata extraction, fingerprinting,
//! execution) report through an optional callback and poll a shared
//! cancellation flag. The callback is rate-limited so callers can wire it
//! straight to a terminal progress bar without being flooded from worker
//! threads.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pipeline phase a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Walking the directory tree and applying filters.
    Discover,
    /// Reading file signatures and metadata.
    Extract,
    /// Hashing duplicate candidates.
    Fingerprint,
    /// Applying planned actions.
    Execute,
}

impl Phase {
    /// Short human-readable label, suitable for progress bar messages.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Discover => "discovering",
            Phase::Extract => "extracting",
            Phase::Fingerprint => "fingerprinting",
            Phase::Execute => "executing",
        }
    }
}

/// A single progress event.
///
/// `total` is the number of items the phase expects to process, or 0 when
/// the total is not yet known (directory discovery). `current` is the path
/// being worked on when the event fired; it may be empty for terminal
/// events.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub phase: Phase,
    pub processed: u64,
    pub total: u64,
    pub current: &'a Path,
}

/// Callback invoked with throttled progress events.
///
/// The callback must be `Sync` because extraction and fingerprinting invoke
/// it from worker threads.
pub type ProgressFn<'a> = &'a (dyn Fn(&Progress<'_>) + Sync);

/// Shared flag for cancelling a scan or an execution in flight.
///
/// Cloning the token shares the underlying flag, so one clone can be handed
/// to another thread (for example a ctrl-c handler) while the engine polls
/// the original. Cancellation is cooperative: phases check the flag between
/// files and between actions, finish the item in progress, and return with
/// whatever was completed so far.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

const NEVER_EMITTED: u64 = u64::MAX;

/// Rate-limiting wrapper around an optional progress callback.
///
/// `report` drops events that arrive within the minimum interval of the
/// previous one; the first event of a run and everything sent through
/// `complete` always go out. With no callback configured every call is a
/// no-op.
pub struct ProgressReporter<'a> {
    callback: Option<ProgressFn<'a>>,
    started: Instant,
    min_interval_ms: u64,
    last_emit_ms: AtomicU64,
}

impl<'a> ProgressReporter<'a> {
    /// Creates a reporter with the default 100 ms minimum interval.
    pub fn new(callback: Option<ProgressFn<'a>>) -> Self {
        Self::with_interval(callback, Duration::from_millis(100))
    }

    /// Creates a reporter with a custom minimum interval between events.
    pub fn with_interval(callback: Option<ProgressFn<'a>>, min_interval: Duration) -> Self {
        Self {
            callback,
            started: Instant::now(),
            min_interval_ms: min_interval.as_millis() as u64,
            last_emit_ms: AtomicU64::new(NEVER_EMITTED),
        }
    }

    /// Reports progress, subject to rate limiting.
    pub fn report(&self, phase: Phase, processed: u64, total: u64, current: &Path) {
        let Some(callback) = self.callback else {
            return;
        };
        let now = self.started.elapsed().as_millis() as u64;
        let last = self.last_emit_ms.load(Ordering::Relaxed);
        if last != NEVER_EMITTED && now.saturating_sub(last) < self.min_interval_ms {
            return;
        }
        // Concurrent reporters may race here; losing the exchange just means
        // another thread emitted an equally fresh event.
        if self
            .last_emit_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            callback(&Progress {
                phase,
                processed,
                total,
                current,
            });
        }
    }

    /// Emits a terminal event for a phase, bypassing rate limiting.
    pub fn complete(&self, phase: Phase, processed: u64, total: u64) {
        if let Some(callback) = self.callback {
            let now = self.started.elapsed().as_millis() as u64;
            self.last_emit_ms.store(now, Ordering::Relaxed);
            callback(&Progress {
                phase,
                processed,
                total,
                current: Path::new(""),
            });
        }
    }
}
