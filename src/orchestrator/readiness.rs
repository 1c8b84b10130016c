//! Bounded readiness polling.
//!
//! Before provisioning a proxy for a backend service, each expected instance
//! is polled until the runtime reports it running or the attempt budget runs
//! out. Lookup errors (including not-found) count as failed attempts, never
//! as fatal errors; a backend that never comes up simply exhausts the gate.

use std::time::Duration;

use futures::future::join_all;

use crate::naming::instance_ids;
use crate::runtime::ContainerRuntime;

/// Bounded polling wait for an instance to reach the running state.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessGate {
    /// Maximum status polls before giving up.
    pub max_attempts: u32,
    /// Pause between polls.
    pub interval: Duration,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

impl ReadinessGate {
    /// Gate with a custom budget; used by tests to avoid real sleeps.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Poll one instance until it is running or the budget is exhausted.
    ///
    /// Returns whether the instance was observed running.
    pub async fn await_running(&self, runtime: &dyn ContainerRuntime, instance: &str) -> bool {
        for attempt in 0..self.max_attempts {
            match runtime.container_status(instance).await {
                Ok(status) if status.is_running() => {
                    tracing::debug!("Instance '{}' is running", instance);
                    return true;
                }
                Ok(status) => {
                    tracing::trace!("Instance '{}' not ready: {:?}", instance, status);
                }
                Err(e) => {
                    tracing::trace!("Instance '{}' status lookup failed: {}", instance, e);
                }
            }
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        tracing::warn!(
            "Instance '{}' not running after {} attempts",
            instance,
            self.max_attempts
        );
        false
    }

    /// Gate every expected instance of a service, polling them concurrently.
    ///
    /// Resolves only once every gate has succeeded or exhausted its budget;
    /// one unready instance never short-circuits the others.
    pub async fn await_service(
        &self,
        runtime: &dyn ContainerRuntime,
        service: &str,
        scale: u32,
    ) -> Vec<(String, bool)> {
        let waits = instance_ids(service, scale).into_iter().map(|instance| async move {
            let ready = self.await_running(runtime, &instance).await;
            (instance, ready)
        });
        join_all(waits).await
    }
}
