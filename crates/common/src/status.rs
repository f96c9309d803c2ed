//! Per-relay telemetry for a single fan-out operation
//!
//! A [`StatusTracker`] is handed to every worker of one fetch, publish or
//! listen. Workers report transitions, the caller finalizes once all workers
//! are done and renders the result. A disabled tracker ignores every call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::relay::RelayEndpoint;

pub const REASON_CANCELLED_BY_FIRST: &str = "cancelled by first result";
pub const REASON_TIMEOUT: &str = "timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Pending,
    Success,
    Cancelled,
    Error,
}

impl RelayStatus {
    fn glyph(&self) -> &'static str {
        match self {
            RelayStatus::Pending => "⟳",
            RelayStatus::Success => "✓",
            RelayStatus::Cancelled | RelayStatus::Error => "✗",
        }
    }
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayStatus::Pending => "pending",
            RelayStatus::Success => "success",
            RelayStatus::Cancelled => "cancelled",
            RelayStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of one relay within a tracked operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub endpoint: String,
    pub status: RelayStatus,
    pub reason: Option<String>,
    /// Time from registration to the last status transition
    pub elapsed: Duration,
}

#[derive(Debug)]
struct TrackerInner {
    operation_start: Instant,
    // registration order, kept for deterministic rendering
    relays: Vec<(RelayOutcome, Instant)>,
    first_success: Option<Duration>,
}

/// Thread-safe, cloneable status tracker
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    enabled: bool,
    inner: Arc<Mutex<TrackerInner>>,
}

impl StatusTracker {
    /// Create a tracker, starting the operation clock now
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Arc::new(Mutex::new(TrackerInner {
                operation_start: Instant::now(),
                relays: Vec::new(),
                first_success: None,
            })),
        }
    }

    /// A tracker that records nothing
    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Add an endpoint as pending
    pub fn register(&self, endpoint: &RelayEndpoint) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let name = endpoint.to_string();
        let outcome = RelayOutcome {
            endpoint: name.clone(),
            status: RelayStatus::Pending,
            reason: None,
            elapsed: Duration::ZERO,
        };
        match inner.relays.iter().position(|(o, _)| o.endpoint == name) {
            Some(index) => inner.relays[index] = (outcome, now),
            None => inner.relays.push((outcome, now)),
        }
    }

    /// Transition an endpoint to `status`
    ///
    /// The first transition to `Success` across the whole operation latches
    /// the time-to-first-success. Unregistered endpoints are ignored.
    pub fn update(&self, endpoint: &RelayEndpoint, status: RelayStatus, reason: Option<&str>) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let name = endpoint.to_string();
        let Some((outcome, started)) = inner.relays.iter_mut().find(|(o, _)| o.endpoint == name)
        else {
            return;
        };

        outcome.status = status;
        outcome.reason = reason.map(str::to_string);
        outcome.elapsed = now.duration_since(*started);

        if status == RelayStatus::Success && inner.first_success.is_none() {
            inner.first_success = Some(now.duration_since(inner.operation_start));
        }
    }

    /// Give every endpoint that is not a success and has no reason a reason
    ///
    /// Call once, after every worker of the operation has stopped.
    pub fn finalize(&self) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock();
        let reason = if inner.first_success.is_some() {
            REASON_CANCELLED_BY_FIRST
        } else {
            REASON_TIMEOUT
        };
        for (outcome, _) in inner.relays.iter_mut() {
            if outcome.status != RelayStatus::Success && outcome.reason.is_none() {
                outcome.reason = Some(reason.to_string());
            }
        }
    }

    /// Snapshot of all outcomes in registration order
    pub fn outcomes(&self) -> Vec<RelayOutcome> {
        self.inner
            .lock()
            .relays
            .iter()
            .map(|(o, _)| o.clone())
            .collect()
    }

    /// Outcome for a single endpoint
    pub fn outcome(&self, endpoint: &RelayEndpoint) -> Option<RelayOutcome> {
        let name = endpoint.to_string();
        self.inner
            .lock()
            .relays
            .iter()
            .find(|(o, _)| o.endpoint == name)
            .map(|(o, _)| o.clone())
    }

    /// Render one line per endpoint, `[glyph] endpoint elapsed (reason)`
    pub fn render(&self) -> String {
        if !self.enabled {
            return String::new();
        }
        self.outcomes()
            .iter()
            .map(|o| {
                let mut line = format!(
                    "[{}] {:<30} {}ms",
                    o.status.glyph(),
                    o.endpoint,
                    o.elapsed.as_millis()
                );
                if let Some(reason) = &o.reason {
                    line.push_str(&format!(" ({})", reason));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Time to the first success, or the longest endpoint wait if nothing
    /// succeeded. Zero when disabled.
    pub fn first_success_latency(&self) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let inner = self.inner.lock();
        if let Some(latency) = inner.first_success {
            return latency;
        }
        inner
            .relays
            .iter()
            .map(|(o, _)| o.elapsed)
            .max()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn endpoint(name: &str) -> RelayEndpoint {
        format!("wss://{}.test", name).parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_tracker_records_nothing() {
        let tracker = StatusTracker::disabled();
        tracker.register(&endpoint("a"));
        tracker.update(&endpoint("a"), RelayStatus::Success, None);
        tracker.finalize();

        assert!(tracker.outcomes().is_empty());
        assert_eq!(tracker.render(), "");
        assert_eq!(tracker.first_success_latency(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_is_latched() {
        let tracker = StatusTracker::new(true);
        tracker.register(&endpoint("a"));
        tracker.register(&endpoint("b"));

        tokio::time::sleep(Duration::from_millis(120)).await;
        tracker.update(&endpoint("a"), RelayStatus::Success, None);
        tokio::time::sleep(Duration::from_millis(300)).await;
        tracker.update(&endpoint("b"), RelayStatus::Success, None);

        assert_eq!(tracker.first_success_latency(), Duration::from_millis(120));
        let b = tracker.outcome(&endpoint("b")).unwrap();
        assert_eq!(b.elapsed, Duration::from_millis(420));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_after_success() {
        let tracker = StatusTracker::new(true);
        for name in ["a", "b", "c"] {
            tracker.register(&endpoint(name));
        }
        tracker.update(&endpoint("a"), RelayStatus::Success, None);
        tracker.update(&endpoint("b"), RelayStatus::Error, Some("connection refused"));
        tracker.finalize();

        let outcomes = tracker.outcomes();
        assert_eq!(outcomes[0].reason, None);
        assert_eq!(outcomes[1].reason.as_deref(), Some("connection refused"));
        assert_eq!(outcomes[2].status, RelayStatus::Pending);
        assert_eq!(outcomes[2].reason.as_deref(), Some(REASON_CANCELLED_BY_FIRST));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_without_success() {
        let tracker = StatusTracker::new(true);
        tracker.register(&endpoint("a"));
        tracker.register(&endpoint("b"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker.update(&endpoint("a"), RelayStatus::Cancelled, None);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker.update(&endpoint("b"), RelayStatus::Cancelled, None);
        tracker.finalize();

        for outcome in tracker.outcomes() {
            assert_eq!(outcome.reason.as_deref(), Some(REASON_TIMEOUT));
        }
        // nothing succeeded: fall back to the longest wait
        assert_eq!(tracker.first_success_latency(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_is_in_registration_order() {
        let tracker = StatusTracker::new(true);
        tracker.register(&endpoint("zeta"));
        tracker.register(&endpoint("alpha"));
        tracker.update(&endpoint("alpha"), RelayStatus::Success, None);
        tracker.update(&endpoint("zeta"), RelayStatus::Error, Some("refused"));

        let rendered = tracker.render();
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[✗] wss://zeta.test"));
        assert!(lines[0].ends_with("0ms (refused)"));
        assert!(lines[1].starts_with("[✓] wss://alpha.test"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_from_many_tasks() {
        let tracker = StatusTracker::new(true);
        let endpoints: Vec<_> = (0..16).map(|i| endpoint(&format!("r{}", i))).collect();
        for e in &endpoints {
            tracker.register(e);
        }

        let handles: Vec<_> = endpoints
            .iter()
            .cloned()
            .map(|e| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    tracker.update(&e, RelayStatus::Success, None);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(tracker
            .outcomes()
            .iter()
            .all(|o| o.status == RelayStatus::Success));
    }
}
