use crate::item::{BuildRef, Item};
use crate::route::{RouteError, Worker};
use crate::signing::SigningError;
use tokio_util::sync::CancellationToken;

/// A boxed error from a queue backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error("refusing to push an empty payload")]
    EmptyPayload,
    #[error("route {route} is not configured for this queue")]
    UnknownRoute { route: String },
    #[error("the queue operation was cancelled")]
    Cancelled,
    #[error("failed to serialize the item: {source}")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode the popped item: {source}")]
    MalformedItem {
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected reply shape from the queue: {source}")]
    MalformedReply {
        #[source]
        source: BoxError,
    },
    #[error("failed to open the popped item: {source}")]
    Signature {
        #[source]
        source: SigningError,
    },
    #[error("failed to {operation} on the queue backend: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

impl QueueError {
    pub(crate) fn backend(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        QueueError::Backend {
            operation,
            source: Box::new(source),
        }
    }
}

#[async_trait::async_trait]
/// A build queue.
///
/// This is everything the rest of the server needs from the queue: a
/// producer pushes signed items onto routes, workers pop them, and the
/// length and position calls feed admission decisions and status
/// pages.  A backend only has to implement this trait to be swapped in;
/// callers hold an `Arc<dyn Queue>` (see [`crate::context`]).
///
/// Every I/O call takes a [`CancellationToken`].  A cancelled token
/// aborts the call with [`QueueError::Cancelled`], which callers can
/// always tell apart from [`Queue::pop`] timing out.
pub trait Queue: std::fmt::Debug + Send + Sync {
    /// The name of the backend driver.
    fn driver(&self) -> &str;

    /// Selects the route for a worker's pool selectors.
    fn route(&self, worker: &Worker) -> Result<String, RouteError>;

    /// Signs the payload and appends it to the tail of the route.
    ///
    /// An empty payload is rejected before anything is sent.
    async fn push(
        &self,
        cancel: &CancellationToken,
        route: &str,
        payload: &[u8],
    ) -> Result<(), QueueError>;

    /// Serializes the item and pushes it onto the route.
    async fn push_item(
        &self,
        cancel: &CancellationToken,
        route: &str,
        item: &Item,
    ) -> Result<(), QueueError> {
        let payload = item
            .to_payload()
            .map_err(|source| QueueError::Serialization { source })?;

        self.push(cancel, route, &payload).await
    }

    /// Waits for the next item on any of the routes, or on every
    /// configured route if `routes` is empty.
    ///
    /// Returns `Ok(None)` if nothing arrived within the configured
    /// timeout; that is an expected outcome, not an error.  Routes are
    /// matched like [`Queue::push`] matches them, and an unconfigured
    /// route is [`QueueError::UnknownRoute`].
    async fn pop(
        &self,
        cancel: &CancellationToken,
        routes: &[String],
    ) -> Result<Option<Item>, QueueError>;

    /// The total number of items across every configured route.
    async fn length(&self, cancel: &CancellationToken) -> Result<u64, QueueError>;

    /// The number of items on a single route.
    async fn route_length(&self, cancel: &CancellationToken, route: &str)
        -> Result<u64, QueueError>;

    /// The 0-based rank of the build on its route.
    ///
    /// This never fails: a build that cannot be found, or a lookup that
    /// errors, reports 0.  A 0 is therefore not a promise that the
    /// build is next in line.
    async fn position(&self, cancel: &CancellationToken, build: &BuildRef) -> u64;

    /// Checks once that the backend is reachable.
    async fn ping(&self, cancel: &CancellationToken) -> Result<(), QueueError>;
}
