//! Handing the queue to the rest of the server.
//!
//! The queue is built once at startup and then passed around
//! explicitly; there is no global.  Request handlers find it in the
//! request's extensions, put there by [`QueueLayer`], and background
//! tasks can carry it in an [`http::Extensions`] of their own.  Both
//! use the same key, a private type, so only this module can store or
//! read it.  Tests swap in their own [`Queue`] the same way.

use crate::queue::Queue;
use std::sync::Arc;

#[derive(Clone)]
struct QueueKey(Arc<dyn Queue>);

/// Returns the queue stored in the extensions, if any.
///
/// This returns `None` rather than panicking when no queue was
/// stored; callers have to handle that.
pub fn from_extensions(extensions: &http::Extensions) -> Option<Arc<dyn Queue>> {
    extensions.get::<QueueKey>().map(|key| Arc::clone(&key.0))
}

/// Stores the queue in the extensions, replacing any queue already
/// there.
pub fn with_extensions(extensions: &mut http::Extensions, queue: Arc<dyn Queue>) {
    extensions.insert(QueueKey(queue));
}

/// Returns the queue attached to the request, if any.
pub fn from_request<B>(request: &http::Request<B>) -> Option<Arc<dyn Queue>> {
    from_extensions(request.extensions())
}

/// A [`tower::Layer`] that attaches the queue to every request.
#[derive(Debug, Clone)]
pub struct QueueLayer {
    queue: Arc<dyn Queue>,
}

impl QueueLayer {
    pub fn new(queue: Arc<dyn Queue>) -> Self { Self { queue } }
}

impl<S> tower::Layer<S> for QueueLayer {
    type Service = WithQueue<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WithQueue {
            inner,
            queue: Arc::clone(&self.queue),
        }
    }
}

/// The service produced by [`QueueLayer`].
#[derive(Debug, Clone)]
pub struct WithQueue<S> {
    inner: S,
    queue: Arc<dyn Queue>,
}

impl<S, B> tower::Service<http::Request<B>> for WithQueue<S>
where
    S: tower::Service<http::Request<B>>,
{
    type Error = S::Error;
    type Future = S::Future;
    type Response = S::Response;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<B>) -> Self::Future {
        with_extensions(request.extensions_mut(), Arc::clone(&self.queue));
        self.inner.call(request)
    }
}

impl std::fmt::Debug for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("QueueKey").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{BuildRef, Item};
    use crate::queue::QueueError;
    use crate::route::{RouteError, Router, Worker};
    use std::convert::Infallible;
    use tokio_util::sync::CancellationToken;
    use tower::{Layer as _, ServiceExt as _};

    #[derive(Debug)]
    struct StubQueue {
        name: &'static str,
        router: Router,
    }

    impl StubQueue {
        fn shared(name: &'static str) -> Arc<dyn Queue> {
            Arc::new(StubQueue {
                name,
                router: Router::new(vec!["vela".to_owned()]),
            })
        }
    }

    #[async_trait::async_trait]
    impl Queue for StubQueue {
        fn driver(&self) -> &str { self.name }

        fn route(&self, worker: &Worker) -> Result<String, RouteError> { self.router.route(worker) }

        async fn push(
            &self,
            _cancel: &CancellationToken,
            _route: &str,
            _payload: &[u8],
        ) -> Result<(), QueueError> {
            Ok(())
        }

        async fn pop(
            &self,
            _cancel: &CancellationToken,
            _routes: &[String],
        ) -> Result<Option<Item>, QueueError> {
            Ok(None)
        }

        async fn length(&self, _cancel: &CancellationToken) -> Result<u64, QueueError> { Ok(0) }

        async fn route_length(
            &self,
            _cancel: &CancellationToken,
            _route: &str,
        ) -> Result<u64, QueueError> {
            Ok(0)
        }

        async fn position(&self, _cancel: &CancellationToken, _build: &BuildRef) -> u64 { 0 }

        async fn ping(&self, _cancel: &CancellationToken) -> Result<(), QueueError> { Ok(()) }
    }

    #[test]
    fn empty_extensions_have_no_queue() {
        assert!(from_extensions(&http::Extensions::new()).is_none());
        assert!(from_request(&http::Request::new(())).is_none());
    }

    #[test]
    fn stored_queue_is_returned() {
        let mut extensions = http::Extensions::new();
        with_extensions(&mut extensions, StubQueue::shared("stub"));

        let queue = from_extensions(&extensions).expect("queue");
        assert_eq!(queue.driver(), "stub");
    }

    #[test]
    fn storing_again_replaces_the_queue() {
        let mut extensions = http::Extensions::new();
        with_extensions(&mut extensions, StubQueue::shared("first"));
        with_extensions(&mut extensions, StubQueue::shared("second"));

        assert_eq!(from_extensions(&extensions).expect("queue").driver(), "second");
    }

    #[test]
    fn unrelated_extensions_are_not_a_queue() {
        let mut extensions = http::Extensions::new();
        extensions.insert("not a queue");

        assert!(from_extensions(&extensions).is_none());
    }

    #[tokio::test]
    async fn layer_attaches_the_queue_to_requests() {
        let queue = StubQueue::shared("stub");
        let service = QueueLayer::new(Arc::clone(&queue)).layer(tower::service_fn(
            |request: http::Request<()>| async move {
                let queue = from_request(&request).expect("queue in request");
                let route = queue
                    .route(&Worker::new("vela", ""))
                    .expect("route");
                Ok::<_, Infallible>((queue.driver().to_owned(), route))
            },
        ));

        let (driver, route) = service
            .oneshot(http::Request::new(()))
            .await
            .expect("call");

        assert_eq!(driver, "stub");
        assert_eq!(route, "vela");
    }
}
