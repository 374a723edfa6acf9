use crate::queue::QueueError;
use crate::redis::RedisClient;
use tokio_util::sync::CancellationToken;

impl RedisClient {
    /// Signs the payload and appends it to the route.
    ///
    /// This is `RPUSH {route} {signature ‖ payload}`; pops take from
    /// the other end.  The route has to be one of the configured
    /// routes, and the configured spelling is used as the key.
    #[tracing::instrument(skip(self, cancel, payload), fields(size = payload.len()))]
    pub(crate) async fn push_signed(
        &self,
        cancel: &CancellationToken,
        route: &str,
        payload: &[u8],
    ) -> Result<(), QueueError> {
        if payload.is_empty() {
            return Err(QueueError::EmptyPayload);
        }

        let route = self.configured_route(route)?;

        let signed = self.config.keys.sign(payload);

        let mut command = redis::cmd("RPUSH");
        command.arg(route).arg(signed);

        self.query::<()>(cancel, "push item", command).await?;

        tracing::debug!(%route, "pushed item");

        Ok(())
    }
}
