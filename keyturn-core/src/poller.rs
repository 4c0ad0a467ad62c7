//! Convergence polling.
//!
//! After a credential mutation is accepted, the target's control plane moves
//! through transient statuses before it is usable again. [`ConvergenceSpec`]
//! describes that transition and [`ConvergenceSpec::wait`] polls a refresh
//! function until the target status appears, an unexpected status appears,
//! the timeout passes, or the caller cancels.
//!
//! All sleeping goes through `tokio::time`, so tests can drive the loop on a
//! paused clock.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::target::TargetError;

/// First backoff step when no minimum interval dominates.
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Upper bound for the backoff step.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// One status read from a target's control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation<T> {
    /// Whatever the refresh call returned alongside the status.
    pub snapshot: T,

    /// Status label, compared against the pending and target statuses.
    pub status: String,
}

impl<T> Observation<T> {
    pub fn new(snapshot: T, status: impl Into<String>) -> Self {
        Self {
            snapshot,
            status: status.into(),
        }
    }
}

/// Why a convergence wait ended without reaching the target status.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    /// The timeout passed while the target was still pending.
    #[error("timed out after {elapsed:?} waiting for {target} (last status: {})", last_status.as_deref().unwrap_or("not found"))]
    Timeout {
        target: String,
        elapsed: Duration,
        last_status: Option<String>,
    },

    /// The target reported a status that is neither pending nor the target.
    #[error("unexpected status {status:?} while waiting for {target}")]
    UnexpectedState { status: String, target: String },

    /// The refresh call failed with something other than not-found.
    #[error("status refresh failed: {0}")]
    Refresh(#[source] TargetError),

    /// The wait was cancelled by the caller.
    #[error("wait cancelled")]
    Cancelled,

    /// The convergence settings are inconsistent.
    #[error("invalid convergence spec: {message}")]
    InvalidSpec { message: String },
}

/// How to wait for one kind of target to converge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceSpec {
    /// Statuses that mean "keep waiting".
    pub pending: Vec<String>,

    /// Status that means "done".
    pub target: String,

    /// Total time allowed, measured from the start of the wait.
    pub timeout: Duration,

    /// Lower bound between polls. `None` uses the backoff alone.
    pub min_poll_interval: Option<Duration>,

    /// Sleep before the first poll.
    pub initial_delay: Duration,
}

impl ConvergenceSpec {
    /// Managed cache cluster modifying its auth token.
    pub fn cache_cluster() -> Self {
        Self {
            pending: vec![
                "creating".to_string(),
                "modifying".to_string(),
                "snapshotting".to_string(),
            ],
            target: "available".to_string(),
            timeout: Duration::from_secs(30 * 60),
            min_poll_interval: Some(Duration::from_secs(10)),
            initial_delay: Duration::from_secs(30),
        }
    }

    /// Message broker coming back from a reboot.
    pub fn broker_reboot() -> Self {
        Self {
            pending: vec!["REBOOT_IN_PROGRESS".to_string()],
            target: "RUNNING".to_string(),
            timeout: Duration::from_secs(30 * 60),
            min_poll_interval: None,
            initial_delay: Duration::ZERO,
        }
    }

    /// Check that the settings can converge.
    pub fn validate(&self) -> Result<(), ConvergenceError> {
        if self.timeout.is_zero() {
            return Err(ConvergenceError::InvalidSpec {
                message: "timeout must be greater than zero".to_string(),
            });
        }

        if let Some(min) = self.min_poll_interval {
            if min.is_zero() || min >= self.timeout {
                return Err(ConvergenceError::InvalidSpec {
                    message: format!(
                        "minimum poll interval {:?} must be between zero and the timeout {:?}",
                        min, self.timeout
                    ),
                });
            }
        }

        if self.target.is_empty() {
            return Err(ConvergenceError::InvalidSpec {
                message: "target status must not be empty".to_string(),
            });
        }

        if self.pending.contains(&self.target) {
            return Err(ConvergenceError::InvalidSpec {
                message: format!("status {:?} is both pending and target", self.target),
            });
        }

        Ok(())
    }

    fn is_pending(&self, status: &str) -> bool {
        self.pending.iter().any(|p| p == status)
    }

    /// Poll `refresh` until the target status is observed.
    ///
    /// `TargetError::NotFound` from `refresh` is treated as pending; any
    /// other error ends the wait. No poll is issued at or after the
    /// deadline: when the next wake-up would land there, the wait sleeps to
    /// the deadline and returns [`ConvergenceError::Timeout`]. A refresh
    /// still in flight at the deadline or on cancellation is dropped.
    ///
    /// Returns the snapshot of the observation that reached the target.
    pub async fn wait<T, F, Fut>(
        &self,
        mut refresh: F,
        cancel: &CancellationToken,
    ) -> Result<T, ConvergenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>, TargetError>>,
    {
        self.validate()?;

        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut last_status: Option<String> = None;
        let mut backoff = INITIAL_BACKOFF;
        let mut polls = 0u32;

        self.pause(start + self.initial_delay, deadline, start, &last_status, cancel)
            .await?;

        loop {
            polls += 1;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConvergenceError::Cancelled),
                _ = sleep_until(deadline) => return Err(self.timed_out(start, &last_status)),
                outcome = refresh() => outcome,
            };

            match outcome {
                Ok(observation) if observation.status == self.target => {
                    info!(
                        "Reached {} after {} polls in {:?}",
                        self.target,
                        polls,
                        start.elapsed()
                    );
                    return Ok(observation.snapshot);
                }
                Ok(observation) if self.is_pending(&observation.status) => {
                    debug!("Poll {}: status {} (waiting for {})", polls, observation.status, self.target);
                    last_status = Some(observation.status);
                }
                Ok(observation) => {
                    return Err(ConvergenceError::UnexpectedState {
                        status: observation.status,
                        target: self.target.clone(),
                    });
                }
                Err(TargetError::NotFound { .. }) => {
                    debug!("Poll {}: not found yet (waiting for {})", polls, self.target);
                    last_status = None;
                }
                Err(e) => return Err(ConvergenceError::Refresh(e)),
            }

            let interval = match self.min_poll_interval {
                Some(min) => backoff.max(min),
                None => backoff,
            };
            backoff = (backoff * 2).min(MAX_BACKOFF);

            self.pause(Instant::now() + interval, deadline, start, &last_status, cancel)
                .await?;
        }
    }

    /// Sleep until `wake`, or until `deadline` if that comes first.
    ///
    /// Returns `Timeout` when the sleep was cut short by the deadline.
    async fn pause(
        &self,
        wake: Instant,
        deadline: Instant,
        start: Instant,
        last_status: &Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(), ConvergenceError> {
        if cancel.is_cancelled() {
            return Err(ConvergenceError::Cancelled);
        }

        let truncated = wake >= deadline;
        let until = if truncated { deadline } else { wake };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConvergenceError::Cancelled),
            _ = sleep_until(until) => {}
        }

        if truncated {
            return Err(self.timed_out(start, last_status));
        }

        Ok(())
    }

    fn timed_out(&self, start: Instant, last_status: &Option<String>) -> ConvergenceError {
        ConvergenceError::Timeout {
            target: self.target.clone(),
            elapsed: start.elapsed(),
            last_status: last_status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    type Step = Result<Observation<()>, TargetError>;

    /// Helper to script a sequence of refresh results and record poll times.
    struct Script {
        steps: RefCell<VecDeque<Step>>,
        polled_at: RefCell<Vec<Instant>>,
    }

    impl Script {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: RefCell::new(steps.into()),
                polled_at: RefCell::new(Vec::new()),
            }
        }

        fn refresh(&self) -> impl Future<Output = Step> + '_ {
            self.polled_at.borrow_mut().push(Instant::now());
            let step = self
                .steps
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Observation::new((), "modifying")));
            async move { step }
        }

        fn polls(&self) -> usize {
            self.polled_at.borrow().len()
        }
    }

    fn status(s: &str) -> Step {
        Ok(Observation::new((), s))
    }

    fn not_found() -> Step {
        Err(TargetError::NotFound {
            resource: "rg1".to_string(),
        })
    }

    fn spec(timeout: u64, min: Option<u64>, delay: u64) -> ConvergenceSpec {
        ConvergenceSpec {
            pending: vec!["modifying".to_string()],
            target: "available".to_string(),
            timeout: Duration::from_secs(timeout),
            min_poll_interval: min.map(Duration::from_secs),
            initial_delay: Duration::from_secs(delay),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_target() {
        let spec = spec(600, Some(10), 30);
        let script = Script::new(vec![
            status("modifying"),
            status("modifying"),
            status("modifying"),
            status("available"),
        ]);
        let start = Instant::now();

        spec.wait(|| script.refresh(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(script.polls(), 4);
        assert!(start.elapsed() >= Duration::from_secs(30 + 3 * 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_target_needs_one_poll() {
        let spec = spec(600, Some(10), 0);
        let script = Script::new(vec![status("available")]);

        spec.wait(|| script.refresh(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(script.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_status_fails_on_first_poll() {
        let spec = spec(600, Some(10), 0);
        let script = Script::new(vec![status("incompatible-network")]);

        let result = spec.wait(|| script.refresh(), &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(ConvergenceError::UnexpectedState { ref status, .. }) if status == "incompatible-network"
        ));
        assert_eq!(script.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_poll_after_deadline() {
        let spec = spec(60, Some(10), 0);
        let script = Script::new(Vec::new());
        let start = Instant::now();

        let result = spec.wait(|| script.refresh(), &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(ConvergenceError::Timeout { ref last_status, .. }) if last_status.as_deref() == Some("modifying")
        ));
        let deadline = start + Duration::from_secs(60);
        assert!(script.polled_at.borrow().iter().all(|t| *t < deadline));
        // Polls at 0, 10, 20, 30, 40, 50.
        assert_eq!(script.polls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_longer_than_timeout() {
        let spec = spec(20, Some(10), 30);
        let script = Script::new(vec![status("available")]);

        let result = spec.wait(|| script.refresh(), &CancellationToken::new()).await;

        assert!(matches!(result, Err(ConvergenceError::Timeout { .. })));
        assert_eq!(script.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_pending() {
        let spec = spec(600, Some(10), 0);
        let script = Script::new(vec![not_found(), not_found(), status("available")]);

        spec.wait(|| script.refresh(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(script.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_refresh_errors_end_the_wait() {
        let spec = spec(600, Some(10), 0);
        let script = Script::new(vec![Err(TargetError::Transport {
            message: "connection reset".to_string(),
        })]);

        let result = spec.wait(|| script.refresh(), &CancellationToken::new()).await;

        assert!(matches!(result, Err(ConvergenceError::Refresh(TargetError::Transport { .. }))));
        assert_eq!(script.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_without_minimum() {
        let spec = spec(600, None, 0);
        let script = Script::new(vec![
            status("modifying"),
            status("modifying"),
            status("modifying"),
            status("available"),
        ]);
        let start = Instant::now();

        spec.wait(|| script.refresh(), &CancellationToken::new())
            .await
            .unwrap();

        // 100ms + 200ms + 400ms between the four polls.
        let last = script.polled_at.borrow()[3];
        assert_eq!(last - start, Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let spec = spec(600, Some(10), 0);
        let script = Script::new(Vec::new());
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(25)).await;
                cancel.cancel();
            }
        };

        let (result, ()) = tokio::join!(spec.wait(|| script.refresh(), &cancel), canceller);

        assert!(matches!(result, Err(ConvergenceError::Cancelled)));
        assert_eq!(script.polls(), 3);
    }

    fn hung_refresh() -> impl Future<Output = Step> {
        std::future::pending()
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_refresh_times_out_at_deadline() {
        let spec = spec(60, Some(10), 0);
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_secs(3 * 60 * 60),
            spec.wait(hung_refresh, &CancellationToken::new()),
        )
        .await
        .expect("wait must end at its own deadline");

        assert!(matches!(
            result,
            Err(ConvergenceError::Timeout { ref last_status, .. }) if last_status.is_none()
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_refresh_is_cancelled() {
        let spec = spec(600, Some(10), 0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(120)).await;
                cancel.cancel();
            }
        };

        let (result, ()) = tokio::join!(spec.wait(hung_refresh, &cancel), canceller);

        assert!(matches!(result, Err(ConvergenceError::Cancelled)));
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_poll() {
        let spec = spec(600, Some(10), 0);
        let script = Script::new(vec![status("available")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = spec.wait(|| script.refresh(), &cancel).await;

        assert!(matches!(result, Err(ConvergenceError::Cancelled)));
        assert_eq!(script.polls(), 0);
    }

    #[test]
    fn test_validate() {
        assert!(ConvergenceSpec::cache_cluster().validate().is_ok());
        assert!(ConvergenceSpec::broker_reboot().validate().is_ok());

        assert!(spec(0, None, 0).validate().is_err());
        assert!(spec(10, Some(10), 0).validate().is_err());
        assert!(spec(10, Some(0), 0).validate().is_err());

        let mut overlapping = spec(60, None, 0);
        overlapping.pending.push("available".to_string());
        assert!(overlapping.validate().is_err());
    }
}
