//! Run status: cancellation, failure policy, progress and messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// The caller's view of a running synchronization.
pub trait SyncStatus {
    /// Polled before each item or batch. Returning `false` stops the run.
    fn continue_processing(&self) -> bool;

    /// Whether a write error aborts the run instead of being logged.
    fn fail_on_error(&self) -> bool;

    /// Items processed so far out of the current phase's total.
    fn progress(&mut self, total: usize, processed: usize);

    fn log_message(&mut self, message: &str);
}

/// A cloneable handle that requests cancellation of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A [`SyncStatus`] that records what the engine reported.
#[derive(Debug, Clone, Default)]
pub struct RunStatus {
    cancel: CancelHandle,
    fail_on_error: bool,
    progress: Vec<(usize, usize)>,
    messages: Vec<String>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to set the failure policy.
    pub fn with_fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    /// A handle that cancels this run from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Every `(total, processed)` report, in order.
    pub fn progress_history(&self) -> &[(usize, usize)] {
        &self.progress
    }

    /// The most recent `(total, processed)` report.
    pub fn last_progress(&self) -> Option<(usize, usize)> {
        self.progress.last().copied()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

impl SyncStatus for RunStatus {
    fn continue_processing(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn fail_on_error(&self) -> bool {
        self.fail_on_error
    }

    fn progress(&mut self, total: usize, processed: usize) {
        self.progress.push((total, processed));
    }

    fn log_message(&mut self, message: &str) {
        info!(target: "docsync_engine::sync", "{}", message);
        self.messages.push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_from_a_clone() {
        let status = RunStatus::new();
        let handle = status.cancel_handle();
        assert!(status.continue_processing());

        handle.cancel();
        assert!(!status.continue_processing());
    }

    #[test]
    fn records_progress_and_messages() {
        let mut status = RunStatus::new().with_fail_on_error(true);
        assert!(status.fail_on_error());

        status.progress(3, 1);
        status.progress(3, 2);
        status.log_message("delete failed");

        assert_eq!(status.progress_history(), &[(3, 1), (3, 2)]);
        assert_eq!(status.last_progress(), Some((3, 2)));
        assert_eq!(status.messages(), &["delete failed".to_string()]);
    }
}
