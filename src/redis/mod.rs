//! # Redis Provider
//!
//! This is the redis provider for the build queue.  Each route is a
//! redis list keyed by the route name.
//!
//! ## Producing
//!
//! A push is an `RPUSH` of the signed item onto the route's list.  The
//! value stored is `signature ‖ payload`, where the payload is the JSON
//! encoded [`Item`](crate::Item) and the signature is the ed25519
//! signature over it (see [`crate::signing`]).  With signing disabled,
//! the payload is stored as-is.  Only configured routes can be pushed
//! to, popped from, or counted; a route given in another casing is
//! stored under its configured spelling.
//!
//! ## Consuming
//!
//! A pop is a `BLPOP` across the requested routes (all configured routes
//! if none are given), waiting up to the configured timeout.  Redis
//! hands each item to exactly one blocked client, so any number of
//! workers can pop concurrently; the client does no locking of its own.
//! A timeout is not an error and returns `None`.  Items are verified
//! with the public key before they are decoded, and an item that fails
//! verification is an error, never an empty queue.
//!
//! Delivery is at-least-once at best: once popped, an item is gone from
//! redis, and there is no dead-lettering or redelivery here.  Consumers
//! are expected to handle duplicates.
//!
//! ## Connections
//!
//! Connections are pooled with `bb8`, one caller per connection, since a
//! blocking pop ties up the connection it runs on.  Size the pool for
//! the number of concurrent pops plus headroom for everything else.
//!
//! With clustering enabled, the host part of the address is read as
//! `master,sentinel1,sentinel2,...`, and each new connection asks the
//! sentinels where the master is.  Connections that see the server go
//! away, or find it has become a read-only replica, are dropped from
//! the pool so the next one re-resolves the master.  Every other option
//! in the address applies the same way it would to a standalone server,
//! so turning clustering on changes availability, not behavior.
//!
//! The client pings redis when it is built, retrying up to
//! [`PROBE_ATTEMPTS`] times, [`PROBE_DELAY`] apart, since redis is often
//! still starting when the server boots.  Nothing else is retried.

mod client;
mod connection;
mod consumer;
mod data;
mod ping;
mod producer;
mod stats;

pub use self::client::{ClientBuilder, ClientError, Config, RedisClient, DRIVER};
pub use self::connection::{AddressError, Addressing, FailoverOptions, PoolOptions};
pub use self::ping::{PROBE_ATTEMPTS, PROBE_DELAY};
