//! Connectivity-aware retry around remote calls.
//!
//! Every hosting API call goes through [`RetryingClient::call`]. Transient
//! network failures park the call in a probe/backoff loop until the network is
//! reachable again, then the same operation is issued from scratch. Anything
//! permanent is returned to the caller untouched.

use crate::config::RetryConfig;
use crate::error::{MinerError, MinerResult};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Longest wait honoured for a rate-limit reset.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(3600);

/// Pause before re-issuing a call that keeps failing while the probe succeeds.
const REACHABLE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Answers whether the remote side is reachable right now.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Probe that opens a TCP connection to a well-known host.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_reachable(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)))
    }
}

/// Link state while one call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Issue the operation.
    Healthy,
    /// The last attempt failed with a network error; probe before deciding.
    Degraded,
    /// Network is down; sleep `backoff` then probe again.
    Waiting { backoff: Duration },
}

/// Backoff bounds and the optional outer deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// None waits out any outage.
    pub outage_deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_backoff: Duration::from_secs(config.initial_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            outage_deadline: config.outage_deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Decorator that retries transient failures of any remote operation.
#[derive(Clone)]
pub struct RetryingClient {
    policy: RetryPolicy,
    probe: Arc<dyn ConnectivityProbe>,
}

impl RetryingClient {
    pub fn new(policy: RetryPolicy, probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self { policy, probe }
    }

    /// Client probing the configured host over TCP.
    pub fn from_config(config: &RetryConfig) -> Self {
        let probe = TcpProbe::new(
            config.probe_host.clone(),
            config.probe_port,
            Duration::from_secs(config.probe_timeout_secs),
        );
        Self::new(RetryPolicy::from(config), Arc::new(probe))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds or fails permanently.
    ///
    /// The operation is re-created through the closure on every attempt, so it
    /// must not have applied side effects before failing.
    pub async fn call<T, F, Fut>(&self, what: &str, mut operation: F) -> MinerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MinerResult<T>>,
    {
        let mut state = LinkState::Healthy;
        let mut backoff = self.policy.initial_backoff;
        let mut outage_started: Option<Instant> = None;
        let mut consecutive_failures = 0u32;

        loop {
            state = match state {
                LinkState::Healthy => match operation().await {
                    Ok(value) => {
                        if let Some(started) = outage_started {
                            tracing::info!(
                                "{} succeeded after network outage of {:?}",
                                what,
                                started.elapsed()
                            );
                        }
                        return Ok(value);
                    }
                    Err(MinerError::RateLimited { retry_after }) => {
                        let wait = retry_after.min(MAX_RATE_LIMIT_WAIT);
                        tracing::warn!("{} rate limited, sleeping {:?}", what, wait);
                        tokio::time::sleep(wait).await;
                        LinkState::Healthy
                    }
                    Err(e) if e.is_transient() => {
                        consecutive_failures += 1;
                        outage_started.get_or_insert_with(Instant::now);
                        tracing::warn!("Network error during {}: {}", what, e);
                        LinkState::Degraded
                    }
                    Err(e) => return Err(e),
                },
                LinkState::Degraded => {
                    if !self.probe.is_reachable().await {
                        tracing::warn!("Waiting for network connectivity...");
                        LinkState::Waiting { backoff }
                    } else if consecutive_failures == 1 {
                        LinkState::Healthy
                    } else {
                        self.check_deadline(what, outage_started)?;
                        tokio::time::sleep(REACHABLE_RETRY_DELAY).await;
                        LinkState::Healthy
                    }
                }
                LinkState::Waiting { backoff: wait } => {
                    self.check_deadline(what, outage_started)?;

                    tracing::info!("Network unreachable, retrying in {:?}", wait);
                    tokio::time::sleep(wait).await;

                    if self.probe.is_reachable().await {
                        tracing::info!("Network connection restored");
                        backoff = self.policy.initial_backoff;
                        LinkState::Healthy
                    } else {
                        backoff = (wait * 2).min(self.policy.max_backoff);
                        LinkState::Waiting { backoff }
                    }
                }
            };
        }
    }

    fn check_deadline(&self, what: &str, outage_started: Option<Instant>) -> MinerResult<()> {
        if let (Some(deadline), Some(started)) = (self.policy.outage_deadline, outage_started) {
            if started.elapsed() >= deadline {
                tracing::error!("{} gave up after {:?} without network", what, deadline);
                return Err(MinerError::OutageDeadline(deadline));
            }
        }
        Ok(())
    }
}
