//! Progress reporting and cooperative cancellation.
//!
//! The only way to stop a running generation is for the observer to return
//! `true`. Observers run synchronously between polling attempts, never while
//! a request is in flight.

use chrono::{DateTime, Utc};

/// What the client knows at the time it reports progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressContext {
    /// Iframe wrapping the content page, reported once before polling starts.
    pub content_iframe: Option<String>,
    /// When the current polling run started.
    pub polling_started_at: Option<DateTime<Utc>>,
}

/// Receives progress and decides whether to cancel.
pub trait ProgressObserver: Send {
    /// Return `true` to cancel the generation.
    fn on_progress(&mut self, context: &ProgressContext) -> bool;
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressContext) -> bool + Send,
{
    fn on_progress(&mut self, context: &ProgressContext) -> bool {
        self(context)
    }
}

/// Observer that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _context: &ProgressContext) -> bool {
        false
    }
}
