//! Health Tracker: periodic liveness and load sampling of reactors,
//! feeding the Router's candidate filter.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::HealthTrackerConfig;
use crate::router::Router;
use crate::time_provider::SharedTimeProvider;

/// Outcome of pinging a single reactor endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingOutcome {
    /// The reactor's self-reported load factor.
    pub load_factor: f64,
}

/// Dials a reactor endpoint with a `ping` atom and reports the outcome.
/// Kept behind a trait so the Health Tracker's scheduling logic is
/// testable without a real transport.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Ping `endpoint`, failing if no reply arrives within `deadline`.
    async fn ping(&self, endpoint: &str, deadline: Duration) -> Result<PingOutcome, String>;
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Runs the periodic ping protocol against every descriptor known to a
/// `Router`.
pub struct HealthTracker {
    router: Arc<Router>,
    pinger: Arc<dyn Pinger>,
    config: HealthTrackerConfig,
    time: SharedTimeProvider,
}

impl HealthTracker {
    /// Build a tracker over `router`, dialing through `pinger`.
    #[must_use]
    pub fn new(
        router: Arc<Router>,
        pinger: Arc<dyn Pinger>,
        config: HealthTrackerConfig,
        time: SharedTimeProvider,
    ) -> Self {
        HealthTracker {
            router,
            pinger,
            config,
            time,
        }
    }

    /// Run one sweep over every known descriptor, updating health/load in
    /// the Router.
    pub async fn sweep_once(&self) {
        for descriptor in self.router.snapshot() {
            let deadline = Duration::from_secs(self.config.ping_deadline_secs);
            match self.pinger.ping(&descriptor.endpoint, deadline).await {
                Ok(outcome) => {
                    debug!(reactor = %descriptor.identifier, load = outcome.load_factor, "ping ok");
                    self.router.update_load(&descriptor.identifier, outcome.load_factor);
                    self.reset_failures(&descriptor.identifier);
                }
                Err(reason) => {
                    warn!(reactor = %descriptor.identifier, %reason, "ping failed");
                    self.record_failure(&descriptor.identifier);
                }
            }
        }
    }

    fn reset_failures(&self, identifier: &str) {
        if let Some(updated) = self.router.snapshot().into_iter().find(|d| d.identifier == identifier) {
            if updated.consecutive_failures > 0 || !updated.healthy {
                self.router.remove(identifier);
                let mut restored = (*updated).clone();
                restored.consecutive_failures = 0;
                restored.healthy = true;
                restored.last_health_check_ms = now_ms();
                self.router.add(restored);
            } else {
                self.router.set_health(identifier, true);
            }
        }
    }

    fn record_failure(&self, identifier: &str) {
        if let Some(current) = self.router.snapshot().into_iter().find(|d| d.identifier == identifier) {
            let mut updated = (*current).clone();
            updated.consecutive_failures += 1;
            updated.last_health_check_ms = now_ms();
            if updated.consecutive_failures >= self.config.failure_threshold {
                updated.healthy = false;
            }
            self.router.remove(identifier);
            self.router.add(updated);
        }
    }

    /// Run sweeps forever at the configured interval. Intended to be
    /// spawned as a background task.
    pub async fn run_forever(&self) {
        loop {
            self.sweep_once().await;
            self.time
                .sleep(Duration::from_secs(self.config.interval_secs))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::domain::affinity::Specialization;
    use crate::domain::ReactorDescriptor;
    use crate::time_provider::test_time_provider;

    struct AlwaysFails;

    #[async_trait]
    impl Pinger for AlwaysFails {
        async fn ping(&self, _endpoint: &str, _deadline: Duration) -> Result<PingOutcome, String> {
            Err("connection refused".to_string())
        }
    }

    struct AlwaysOk(f64);

    #[async_trait]
    impl Pinger for AlwaysOk {
        async fn ping(&self, _endpoint: &str, _deadline: Duration) -> Result<PingOutcome, String> {
            Ok(PingOutcome { load_factor: self.0 })
        }
    }

    fn router_with_one() -> Arc<Router> {
        let router = Arc::new(Router::new(RouterConfig::default()));
        router.add(ReactorDescriptor::new(
            "r1",
            "127.0.0.1:9000",
            vec![Specialization::General],
            10,
        ));
        router
    }

    #[tokio::test]
    async fn consecutive_failures_below_threshold_stay_healthy() {
        let router = router_with_one();
        let tracker = HealthTracker::new(
            Arc::clone(&router),
            Arc::new(AlwaysFails),
            HealthTrackerConfig {
                failure_threshold: 3,
                ..HealthTrackerConfig::default()
            },
            test_time_provider(),
        );

        tracker.sweep_once().await;
        tracker.sweep_once().await;

        let snapshot = router.snapshot();
        let descriptor = snapshot.iter().find(|d| d.identifier == "r1").unwrap();
        assert!(descriptor.healthy);
        assert_eq!(descriptor.consecutive_failures, 2);
    }

    #[tokio::test]
    async fn reaching_failure_threshold_marks_unhealthy() {
        let router = router_with_one();
        let tracker = HealthTracker::new(
            Arc::clone(&router),
            Arc::new(AlwaysFails),
            HealthTrackerConfig {
                failure_threshold: 2,
                ..HealthTrackerConfig::default()
            },
            test_time_provider(),
        );

        tracker.sweep_once().await;
        tracker.sweep_once().await;

        let snapshot = router.snapshot();
        let descriptor = snapshot.iter().find(|d| d.identifier == "r1").unwrap();
        assert!(!descriptor.healthy);
    }

    #[tokio::test]
    async fn success_after_failures_restores_health_and_resets_counter() {
        let router = router_with_one();
        let tracker = HealthTracker::new(
            Arc::clone(&router),
            Arc::new(AlwaysFails),
            HealthTrackerConfig {
                failure_threshold: 2,
                ..HealthTrackerConfig::default()
            },
            test_time_provider(),
        );
        tracker.sweep_once().await;
        tracker.sweep_once().await;
        assert!(!router.snapshot()[0].healthy);

        let recovering = HealthTracker::new(
            Arc::clone(&router),
            Arc::new(AlwaysOk(0.2)),
            HealthTrackerConfig::default(),
            test_time_provider(),
        );
        recovering.sweep_once().await;

        let snapshot = router.snapshot();
        let descriptor = snapshot.iter().find(|d| d.identifier == "r1").unwrap();
        assert!(descriptor.healthy);
        assert_eq!(descriptor.consecutive_failures, 0);
        assert_eq!(descriptor.load_factor, 0.2);
    }
}
