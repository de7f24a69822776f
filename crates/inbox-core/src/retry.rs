use std::time::Duration;

/// Default push reconnect delay.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

/// Fixed-delay reconnect policy for the push channel.
///
/// Every attempt waits the same delay and attempts never run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay_ms: u64,
}

impl ReconnectPolicy {
    /// Create a policy; a zero delay is raised to 1 ms so reconnects never spin.
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms: delay_ms.max(1),
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Delay before reconnect attempt `attempt` (1-based). Independent of the attempt.
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY_MS)
    }
}
