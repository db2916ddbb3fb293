//! Polling until an asynchronous cloud operation settles.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{CloudError, CloudResult};

/// Pseudo-state reported when the refresh call answers `404`.
///
/// Put it in `target` to wait for a deletion.
pub const NOT_FOUND_STATE: &str = "NotFound";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

/// What to wait for and how patiently.
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    /// Sleep before the first poll.
    pub delay: Duration,
    pub cancel: CancellationToken,
}

impl StateChangeConf {
    #[must_use]
    pub fn new<P, T>(pending: P, target: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
            delay: Duration::ZERO,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Method form of [`wait_for_state`].
    ///
    /// # Errors
    /// See [`wait_for_state`].
    pub async fn wait<F, Fut>(&self, refresh: F) -> CloudResult<String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CloudResult<String>>,
    {
        wait_for_state(self, refresh).await
    }

    fn is_target(&self, state: &str) -> bool {
        self.target.iter().any(|t| t == state)
    }

    fn is_pending(&self, state: &str) -> bool {
        self.pending.iter().any(|p| p == state)
    }
}

/// Poll `refresh` until it reports a target state.
///
/// Returns the terminal state. A `404` from `refresh` counts as
/// [`NOT_FOUND_STATE`] when that is a target. The timeout bounds the whole
/// wait, including a `refresh` call that hangs.
///
/// ```ignore
/// let conf = StateChangeConf::new(["PENDING_DELETE", "ACTIVE"], ["DELETED", NOT_FOUND_STATE])
///     .with_timeout(Duration::from_secs(300));
/// conf.wait(|| async {
///     let vpc: Vpc = client.get(&url, &RequestOpts::new()).await?.extract_into_struct("vpc")?;
///     Ok(vpc.status)
/// })
/// .await?;
/// ```
///
/// # Errors
/// - `Timeout` when no target state is seen within `conf.timeout`
/// - `UnexpectedState` for a state that is neither pending nor target
/// - `Cancelled` when `conf.cancel` fires
/// - any other error returned by `refresh`
pub async fn wait_for_state<F, Fut>(conf: &StateChangeConf, mut refresh: F) -> CloudResult<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CloudResult<String>>,
{
    let deadline = Instant::now() + conf.timeout;
    let polling = async {
        if !conf.delay.is_zero() {
            tokio::time::sleep(conf.delay).await;
        }
        let mut tick = 0u32;
        loop {
            tick += 1;
            let state = match refresh().await {
                Ok(state) => state,
                Err(err) if err.is_not_found() && conf.is_target(NOT_FOUND_STATE) => {
                    NOT_FOUND_STATE.to_owned()
                }
                Err(err) => return Err(err),
            };
            tracing::debug!(state = %state, tick, "polled resource state");

            if conf.is_target(&state) {
                return Ok(state);
            }
            if !conf.is_pending(&state) {
                return Err(CloudError::UnexpectedState {
                    state,
                    pending: conf.pending.clone(),
                    target: conf.target.clone(),
                });
            }
            tokio::time::sleep(conf.interval).await;
        }
    };

    tokio::select! {
        biased;
        () = conf.cancel.cancelled() => Err(CloudError::Cancelled),
        result = tokio::time::timeout_at(deadline, polling) => {
            result.unwrap_or_else(|_| {
                tracing::warn!(timeout = ?conf.timeout, target = ?conf.target, "gave up waiting for state");
                Err(CloudError::Timeout(conf.timeout))
            })
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn scripted(states: &[&str]) -> Arc<Mutex<VecDeque<String>>> {
        Arc::new(Mutex::new(states.iter().map(|s| (*s).to_owned()).collect()))
    }

    fn not_found() -> CloudError {
        CloudError::Remote(Box::new(RemoteError {
            status: StatusCode::NOT_FOUND,
            method: Method::GET,
            url: "https://vpc.example.com/v1/p/vpcs/v-1".to_owned(),
            body: Bytes::new(),
            retry_after: None,
        }))
    }

    fn conf() -> StateChangeConf {
        StateChangeConf::new(["CREATING"], ["ACTIVE"])
            .with_interval(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_target_after_pending_ticks() {
        let states = scripted(&["CREATING", "CREATING", "ACTIVE"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();
        let state = conf()
            .wait(|| {
                let states = states.clone();
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(states.lock().unwrap().pop_front().unwrap())
                }
            })
            .await
            .unwrap();
        assert_eq!(state, "ACTIVE");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_settling() {
        let started = Instant::now();
        let err = conf()
            .wait(|| async { Ok("CREATING".to_owned()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Timeout(d) if d == Duration::from_secs(60)));
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_refresh_is_bounded_by_timeout() {
        let err = conf()
            .wait(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("ACTIVE".to_owned())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_state_fails_fast() {
        let err = conf()
            .wait(|| async { Ok("ERROR".to_owned()) })
            .await
            .unwrap_err();
        match err {
            CloudError::UnexpectedState { state, target, .. } => {
                assert_eq!(state, "ERROR");
                assert_eq!(target, vec!["ACTIVE".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_satisfies_deletion_target() {
        let conf = StateChangeConf::new(["ACTIVE", "PENDING_DELETE"], ["DELETED", NOT_FOUND_STATE])
            .with_interval(Duration::from_secs(1));
        let states = scripted(&["ACTIVE", "PENDING_DELETE"]);
        let state = conf
            .wait(|| {
                let next = states.lock().unwrap().pop_front();
                async move { next.ok_or_else(not_found) }
            })
            .await
            .unwrap();
        assert_eq!(state, NOT_FOUND_STATE);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_propagates_when_not_a_target() {
        let err = conf()
            .wait(|| async { Err(not_found()) })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_precedes_first_poll() {
        let started = Instant::now();
        conf()
            .with_delay(Duration::from_secs(30))
            .wait(|| async { Ok("ACTIVE".to_owned()) })
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_waiting() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });
        let err = conf()
            .with_cancellation(cancel)
            .wait(|| async { Ok("CREATING".to_owned()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Cancelled));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn logs_each_tick() {
        conf()
            .wait(|| async { Ok("ACTIVE".to_owned()) })
            .await
            .unwrap();
        assert!(logs_contain("polled resource state"));
    }
}
