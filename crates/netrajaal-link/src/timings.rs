use core::time::Duration;

/// Configurable timing constants driving the unit sender's retry backoff
/// and the scheduler's periodic tasks, so timing constants are a
/// compile-time choice rather than a scattered set of magic numbers.
pub trait NodeTimings {
    /// Minimum sleep granularity for unacked sends.
    const MIN_SLEEP: Duration;
    /// Sleep between a send and its first ack probe, and the base unit of
    /// the progressive per-probe backoff.
    const ACK_SLEEP: Duration;
    /// Period of the broadcast neighbor scan task.
    const SCAN_INTERVAL: Duration;
    /// Period of the heartbeat task.
    const HEARTBEAT_INTERVAL: Duration;
    /// Period of the shortest-path advertisement task.
    const PATH_INTERVAL: Duration;
}

pub struct DefaultNodeTimings;

impl NodeTimings for DefaultNodeTimings {
    const MIN_SLEEP: Duration = Duration::from_millis(100);
    const ACK_SLEEP: Duration = Duration::from_millis(300);
    const SCAN_INTERVAL: Duration = Duration::from_secs(10);
    const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
    const PATH_INTERVAL: Duration = Duration::from_secs(300);
}
