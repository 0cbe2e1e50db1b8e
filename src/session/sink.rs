//! Session Sink
//!
//! Receives the "session ended" notification after a failed refresh.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Observer of session termination.
///
/// Invoked at most once per failed refresh episode, after the credential
/// store was cleared and every waiting request was rejected.
pub trait SessionSink: Send + Sync {
    /// The session ended and the user must sign in again.
    fn on_session_ended(&self);
}

impl<F> SessionSink for F
where
    F: Fn() + Send + Sync,
{
    fn on_session_ended(&self) {
        self()
    }
}

/// Sink that ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSessionSink;

impl SessionSink for NoOpSessionSink {
    fn on_session_ended(&self) {}
}

/// Mock session sink for testing.
#[derive(Debug, Default)]
pub struct MockSessionSink {
    calls: AtomicUsize,
}

impl MockSessionSink {
    /// Create new mock sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SessionSink for MockSessionSink {
    fn on_session_ended(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_closure_sink() {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink: Arc<dyn SessionSink> = {
            let hits = hits.clone();
            Arc::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        sink.on_session_ended();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mock_sink_counts() {
        let sink = MockSessionSink::new();
        sink.on_session_ended();
        sink.on_session_ended();
        assert_eq!(sink.call_count(), 2);
    }
}
