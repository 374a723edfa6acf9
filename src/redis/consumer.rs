use crate::item::Item;
use crate::queue::QueueError;
use crate::redis::data::PopReply;
use crate::redis::RedisClient;
use crate::signing::Keys;
use tokio_util::sync::CancellationToken;

impl RedisClient {
    /// Pops the next item from any of the routes.
    ///
    /// This is `BLPOP {route...} {timeout}`.  Redis serves blocked
    /// clients in the order they blocked, so any number of workers can
    /// pop concurrently without coordinating here.  Items come off the
    /// head of each list; with several routes, whichever route has an
    /// item first wins.
    ///
    /// Routes are matched against the configured set the same way
    /// pushes are, so any casing of a configured route pops from it; an
    /// unconfigured route is [`QueueError::UnknownRoute`].
    ///
    /// A timeout yields `Ok(None)`.  A cancelled token yields
    /// [`QueueError::Cancelled`] and the connection running the
    /// `BLPOP` is discarded, so an item popped after we stopped
    /// listening is not handed to someone else's reply.
    #[tracing::instrument(skip(self, cancel))]
    pub(crate) async fn pop_from(
        &self,
        cancel: &CancellationToken,
        routes: &[String],
    ) -> Result<Option<Item>, QueueError> {
        let routes: Vec<&str> = if routes.is_empty() {
            self.router.routes().iter().map(String::as_str).collect()
        } else {
            routes
                .iter()
                .map(|route| self.configured_route(route))
                .collect::<Result<_, _>>()?
        };

        let mut command = redis::cmd("BLPOP");
        command.arg(routes).arg(self.config.timeout.as_secs_f64());

        let reply: redis::Value = self.query(cancel, "pop item", command).await?;

        let Some(reply) = <Option<PopReply> as redis::FromRedisValue>::from_redis_value(&reply)
            .map_err(|source| QueueError::MalformedReply {
                source: Box::new(source),
            })?
        else {
            tracing::trace!("no item available before the pop timeout");
            return Ok(None);
        };

        let item = open_item(&self.config.keys, &reply.value)?;

        tracing::debug!(route = %reply.route, build = item.build.id, "popped item");

        Ok(Some(item))
    }
}

/// Verifies a stored value and decodes the item inside it.
pub(crate) fn open_item(keys: &Keys, stored: &[u8]) -> Result<Item, QueueError> {
    let payload = keys
        .open(stored)
        .map_err(|source| QueueError::Signature { source })?;

    Item::from_payload(payload).map_err(|source| QueueError::MalformedItem { source })
}
