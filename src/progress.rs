//! Progress reporting.
//!
//! This module provides [`ProgressCallback`] for monitoring a restore and
//! [`ProgressInfo`] for detailed progress snapshots.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use reframe::{ProgressCallback, ProgressInfo, RestoreOptions, Restorer};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {} messages", info.operation, info.current);
//!     }
//! }
//!
//! let options = RestoreOptions::new().with_progress(Arc::new(PrintProgress));
//! Restorer::new("drive.mcap")?.with_options(options).run()?;
//! # Ok::<(), reframe::ReframeError>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// The restore phase currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// First pass: splitting video channels into bitstreams.
    Demux,
    /// Decoding channel bitstreams into still images.
    Decode,
    /// Second pass: writing the restored log.
    Rewrite,
}

/// A snapshot of restore progress.
///
/// Delivered to [`ProgressCallback::on_progress`] every
/// [`RestoreOptions::batch_size`](crate::RestoreOptions) items.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// Items (messages or channels) processed so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Wall-clock time elapsed since the phase started.
    pub elapsed: Duration,
    /// Log time of the message currently being processed.
    pub log_time: Option<u64>,
}

/// Trait for receiving progress updates during a restore.
///
/// Implementations must be [`Send`] and [`Sync`] because decode progress
/// may be reported from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a restore phase.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks progress timing for one phase and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// A tracker that reports nowhere.
    pub(crate) fn silent(operation: OperationType) -> Self {
        Self::new(Arc::new(NoOpProgress), operation, None, u64::MAX)
    }

    /// Record one completed item and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, log_time: Option<u64>) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(log_time);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    pub(crate) fn current(&self) -> u64 {
        self.current
    }

    fn report(&self, log_time: Option<u64>) {
        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            elapsed: self.start_time.elapsed(),
            log_time,
        };

        self.callback.on_progress(&info);
    }
}
