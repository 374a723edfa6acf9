//! # **Build** **Q**ueue.
//!
//! The queue that sits between a CI server and its workers.  The
//! server pushes an [`Item`] for each build onto a route, a named
//! partition that stands for a worker pool, and workers block on the
//! routes they serve until an item arrives.
//!
//! Items are signed with an ed25519 private key on push and verified
//! with the matching public key on pop, so a worker only executes work
//! that a trusted server enqueued (see [`signing`]).  The set of routes
//! is fixed at construction, and [`Router`] maps a pipeline's worker
//! selectors onto it.
//!
//! ## Usage
//!
//! Build the queue once at startup from a [`Setup`], either with
//! [`new`], which requires signing keys, with [`connect`], which lets
//! the queue run unsigned, or through a backend's own builder.  Share
//! the resulting [`Queue`] with the rest of the server through
//! [`context`]; there is no global.
//!
//! The queue is split into providers, each behind a feature.
//! Currently there is only one, `redis`, which stores each route as a
//! redis list and can follow a master through Redis Sentinel.  It is
//! possible to implement your own provider by implementing [`Queue`].

pub mod context;
mod item;
mod queue;
mod route;
mod setup;
pub mod signing;

#[cfg(feature = "redis")]
pub mod redis;

pub use self::item::{BuildRef, Item, ITEM_VERSION};
pub use self::queue::{BoxError, Queue, QueueError};
pub use self::route::{RouteError, Router, Worker, DEFAULT_ROUTE};
pub use self::setup::{parse_duration, Setup, SetupError, DRIVER_REDIS};
pub use tokio_util::sync::CancellationToken;

use std::sync::Arc;

/// Validates the setup and creates the queue it describes.
///
/// This is the path a server should take: it refuses to start without
/// both signing keys, and checks everything it can before touching the
/// network.  The returned queue has already answered a ping.
#[tracing::instrument(skip_all, fields(driver = %setup.driver))]
pub async fn new(setup: &Setup) -> Result<Arc<dyn Queue>, SetupError> {
    setup.validate()?;

    open(setup).await
}

/// Creates the queue the setup describes, allowing it to run unsigned.
///
/// Every check of [`new`] runs except the key checks; an empty key
/// disables that half of signing with a warning.  This suits tooling
/// that inspects a queue without holding the private key.
#[tracing::instrument(skip_all, fields(driver = %setup.driver))]
pub async fn connect(setup: &Setup) -> Result<Arc<dyn Queue>, SetupError> {
    setup.validate_connection()?;

    open(setup).await
}

async fn open(setup: &Setup) -> Result<Arc<dyn Queue>, SetupError> {
    match setup.driver.as_str() {
        #[cfg(feature = "redis")]
        DRIVER_REDIS => Ok(Arc::new(setup.redis().await?)),
        driver => Err(SetupError::UnsupportedDriver {
            driver: driver.to_owned(),
        }),
    }
}
