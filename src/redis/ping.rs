use crate::queue::QueueError;
use crate::redis::RedisClient;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How many times the startup probe pings before giving up.
pub const PROBE_ATTEMPTS: u32 = 10;

/// How long the startup probe waits between pings.
pub const PROBE_DELAY: Duration = Duration::from_secs(1);

impl RedisClient {
    /// Sends a single `PING`.
    #[tracing::instrument(skip_all)]
    pub(crate) async fn ping_once(&self, cancel: &CancellationToken) -> Result<(), QueueError> {
        self.query::<()>(cancel, "ping", redis::cmd("PING")).await
    }

    /// Pings until redis answers, up to [`PROBE_ATTEMPTS`] times with
    /// [`PROBE_DELAY`] between attempts, returning the last error if
    /// it never does.
    ///
    /// The delay is fixed, so startup gives up after a bounded time.
    pub(crate) async fn probe(&self) -> Result<(), QueueError> {
        let cancel = CancellationToken::new();
        let mut attempt = 1;

        loop {
            match self.ping_once(&cancel).await {
                Ok(()) => return Ok(()),
                Err(error) if attempt >= PROBE_ATTEMPTS => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        attempt,
                        attempts = PROBE_ATTEMPTS,
                        %error,
                        "unable to ping the redis queue; retrying"
                    );
                }
            }

            attempt += 1;
            tokio::time::sleep(PROBE_DELAY).await;
        }
    }
}
