//! Waiting for a file uploaded to the gateway to become usable.
//!
//! The remote side processes large documents asynchronously. The wait is a
//! small state machine driven by observed remote status and a monotonic
//! deadline, so the transition logic can be exercised without any timer.

use crate::gemini_client::{GatewayError, GenerativeGateway, RemoteFile, RemoteFileState};
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            ceiling: DEFAULT_POLL_CEILING,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteProcessing {
    Uploading,
    Processing(RemoteFile),
    Ready(RemoteFile),
    Failed(RemoteFile),
    TimedOut(RemoteFile),
}

impl RemoteProcessing {
    /// Fold one observed remote status into the machine. Terminal states
    /// ignore further observations.
    pub fn observe(self, observed: RemoteFile, now: Instant, deadline: Instant) -> Self {
        if self.is_terminal() {
            return self;
        }
        match observed.state {
            RemoteFileState::Active => RemoteProcessing::Ready(observed),
            RemoteFileState::Failed => RemoteProcessing::Failed(observed),
            RemoteFileState::Processing | RemoteFileState::Unspecified => {
                if now >= deadline {
                    RemoteProcessing::TimedOut(observed)
                } else {
                    RemoteProcessing::Processing(observed)
                }
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemoteProcessing::Ready(_) | RemoteProcessing::Failed(_) | RemoteProcessing::TimedOut(_)
        )
    }
}

/// Poll the gateway until `uploaded` leaves the processing state or the
/// policy ceiling passes. Status checks share the ceiling: one still in
/// flight at the deadline ends the wait as timed out. An error from a
/// status check ends the wait.
pub async fn wait_until_ready(
    gateway: &dyn GenerativeGateway,
    uploaded: RemoteFile,
    policy: PollPolicy,
) -> Result<RemoteProcessing, GatewayError> {
    let deadline = Instant::now() + policy.ceiling;
    let mut state = RemoteProcessing::Uploading.observe(uploaded, Instant::now(), deadline);

    while let RemoteProcessing::Processing(file) = &state {
        let file = file.clone();
        tracing::debug!("Remote file {} still processing", file.name);

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(policy.interval.min(remaining)).await;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let observed = match tokio::time::timeout(remaining, gateway.get_file(&file.name)).await {
            Ok(observed) => observed?,
            Err(_) => {
                tracing::warn!("Status check for {} outlived the poll ceiling", file.name);
                return Ok(RemoteProcessing::TimedOut(file));
            }
        };
        state = state.observe(observed, Instant::now(), deadline);
    }

    Ok(state)
}
