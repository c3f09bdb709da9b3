//! Run completion polling.
//!
//! [`RunPoller`] fetches a run at a fixed interval until it is COMPLETED, the
//! accumulated wait reaches the ceiling, or the cancellation token fires.
//! Only status changes are logged at info level.
//!
//! # State Machine
//!
//! ```text
//!              status changed
//!   Waiting ───────────────────► Transitioned ──┐
//!      │  ▲                          │          │ status changed
//!      │  └──────────────────────────┘◄─────────┘
//!      │
//!      ├── COMPLETED ──────────► Completed   (Some(run))
//!      ├── waited >= ceiling ──► TimedOut    (None)
//!      └── token cancelled ────► Cancelled   (None)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{DeviceFarmApi, ExecutionStatus, Run};
use crate::arn::run_url_from_arn;
use crate::error::DeviceFarmResult;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(3_000_000);

/// Where a poll loop is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Transitioned,
    Completed,
    TimedOut,
    Cancelled,
}

/// Remembers the last observed status so repeated polls log once.
#[derive(Debug, Default)]
pub struct StatusTracker {
    last: Option<ExecutionStatus>,
    transitions: usize,
}

impl StatusTracker {
    /// Records a status and returns `true` if it differs from the last one.
    ///
    /// The first observation is not a transition.
    pub fn observe(&mut self, status: ExecutionStatus) -> bool {
        let changed = match self.last {
            Some(last) => last != status,
            None => false,
        };
        if changed {
            self.transitions += 1;
        }
        self.last = Some(status);
        changed
    }

    pub fn last(&self) -> Option<ExecutionStatus> {
        self.last
    }

    pub fn transitions(&self) -> usize {
        self.transitions
    }
}

/// Result of polling one run.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub state: PollState,
    /// The completed run; `None` unless `state` is `Completed`.
    pub run: Option<Run>,
    pub transitions: usize,
    pub waited: Duration,
}

/// Polls a run until it completes.
pub struct RunPoller {
    api: Arc<dyn DeviceFarmApi>,
    interval: Duration,
    max_wait: Duration,
    console_url: String,
    cancellation_token: CancellationToken,
}

impl RunPoller {
    /// Creates a poller with a 2 second interval and a 50 minute ceiling.
    pub fn new(api: Arc<dyn DeviceFarmApi>, console_url: impl Into<String>) -> Self {
        Self {
            api,
            interval: DEFAULT_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            console_url: console_url.into(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Waits for the run and returns it once COMPLETED.
    ///
    /// Returns `Ok(None)` on timeout or cancellation.
    pub async fn wait_for_completion(&self, run_arn: &str) -> DeviceFarmResult<Option<Run>> {
        Ok(self.poll(run_arn).await?.run)
    }

    /// Polls the run to a terminal [`PollState`].
    ///
    /// # Errors
    ///
    /// Remote call failures are returned as they are; timeouts and
    /// cancellation are reported through the outcome.
    pub async fn poll(&self, run_arn: &str) -> DeviceFarmResult<PollOutcome> {
        let url = run_url_from_arn(&self.console_url, run_arn);
        let mut tracker = StatusTracker::default();
        let mut state = PollState::Waiting;
        let mut waited = Duration::ZERO;

        let finish = |state: PollState, run: Option<Run>, tracker: &StatusTracker, waited| {
            PollOutcome {
                state,
                run,
                transitions: tracker.transitions(),
                waited,
            }
        };

        loop {
            if self.cancellation_token.is_cancelled() {
                warn!("Stopped polling run {}", run_arn);
                return Ok(finish(PollState::Cancelled, None, &tracker, waited));
            }

            let run = self.api.get_run(run_arn).await?;
            let first = tracker.last().is_none();
            if tracker.observe(run.status) {
                state = PollState::Transitioned;
                info!("Run {} is now {}: {}", run_arn, run.status, url);
            } else if first {
                info!("Monitoring run {} ({}): {}", run_arn, run.status, url);
            } else {
                debug!("Run {} still {} after {:?}", run_arn, run.status, waited);
            }

            if run.status == ExecutionStatus::Completed {
                return Ok(finish(PollState::Completed, Some(run), &tracker, waited));
            }

            if waited >= self.max_wait {
                warn!(
                    "Run {} did not complete within {}s (last status {}, was {:?})",
                    run_arn,
                    self.max_wait.as_secs(),
                    run.status,
                    state
                );
                return Ok(finish(PollState::TimedOut, None, &tracker, waited));
            }

            select! {
                _ = self.cancellation_token.cancelled() => {
                    warn!("Stopped polling run {}", run_arn);
                    return Ok(finish(PollState::Cancelled, None, &tracker, waited));
                }
                _ = tokio::time::sleep(self.interval) => {
                    waited += self.interval;
                }
            }
        }
    }
}
