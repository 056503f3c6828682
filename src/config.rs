//! Tunables for the request transmission layer.

use std::time::Duration;

/// Tunable parameters, analogous to `batcher::daemon::DaemonConfig`.
///
/// There is deliberately no file- or environment-based loader here: the
/// design doc's Non-goals exclude "user-space configuration files" as a
/// feature. Construct this programmatically, or start from [`Default`].
#[derive(Debug, Clone)]
pub struct RtlConfig {
    /// How long a pending request may go unanswered before it times out.
    pub request_timeout: Duration,
    /// Resolution floor for timeout-reaper wakeups: the reaper never runs
    /// more often than this, even if a request expires sooner than it would
    /// otherwise have been scheduled to check.
    pub timeout_resolution: Duration,
    /// Maximum number of requests the pending set may hold at once.
    pub max_pending: usize,
    /// Maximum number of requests the transmitter moves from queue to
    /// pending in one scheduling pass before yielding back to the runtime.
    pub tx_loop_budget: usize,
}

impl Default for RtlConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(3000),
            timeout_resolution: Duration::from_millis(50),
            max_pending: 3,
            tx_loop_budget: 10,
        }
    }
}
