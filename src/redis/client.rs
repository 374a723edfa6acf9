use crate::item::{BuildRef, Item};
use crate::queue::{Queue, QueueError};
use crate::redis::connection::{
    AddressError, Addressing, PoolOptions, QueueConnection, QueueConnectionManager,
};
use crate::route::{RouteError, Router, Worker, DEFAULT_ROUTE};
use crate::signing::{KeyError, Keys};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The driver name reported by [`RedisClient`].
pub const DRIVER: &str = "redis";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("invalid queue address: {source}")]
    Address {
        #[source]
        source: AddressError,
    },
    #[error("no queue routes provided")]
    MissingRoutes,
    #[error("invalid queue signing keys: {source}")]
    Keys {
        #[source]
        source: KeyError,
    },
    #[error("failed to create the redis connection manager: {source}")]
    Manager {
        #[source]
        source: redis::RedisError,
    },
    #[error("failed to reach the redis queue: {source}")]
    Unreachable {
        #[source]
        source: QueueError,
    },
}

/// Everything a [`RedisClient`] is configured with.
///
/// This is fixed for the life of the client.
#[derive(Debug, Clone)]
pub struct Config {
    pub addressing: Addressing,
    pub cluster: bool,
    pub routes: Vec<String>,
    pub timeout: Duration,
    pub pool: PoolOptions,
    pub(crate) keys: Keys,
}

impl Config {
    /// The signing keys the client was built with.
    pub fn keys(&self) -> &Keys { &self.keys }
}

/// Builds a [`RedisClient`].
///
/// Defaults: the `default` route, a 60 second pop timeout, 10 pooled
/// connections, and a 5 second connect timeout, with signing disabled
/// until keys are given.
pub struct ClientBuilder {
    address: String,
    cluster: bool,
    routes: Vec<String>,
    timeout: Duration,
    private_key: String,
    public_key: String,
    pool: PoolOptions,
}

impl ClientBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            cluster: false,
            routes: vec![DEFAULT_ROUTE.to_owned()],
            timeout: Duration::from_secs(60),
            private_key: String::new(),
            public_key: String::new(),
            pool: PoolOptions::default(),
        }
    }

    pub fn with_cluster(self, cluster: bool) -> Self { Self { cluster, ..self } }

    pub fn with_routes(self, routes: Vec<String>) -> Self { Self { routes, ..self } }

    pub fn with_timeout(self, timeout: Duration) -> Self { Self { timeout, ..self } }

    pub fn with_private_key(self, private_key: &str) -> Self {
        Self {
            private_key: private_key.to_owned(),
            ..self
        }
    }

    pub fn with_public_key(self, public_key: &str) -> Self {
        Self {
            public_key: public_key.to_owned(),
            ..self
        }
    }

    pub fn with_pool_size(self, max_size: u32) -> Self {
        let pool = PoolOptions {
            max_size,
            ..self.pool
        };

        Self { pool, ..self }
    }

    pub fn with_connect_timeout(self, connection_timeout: Duration) -> Self {
        let pool = PoolOptions {
            connection_timeout,
            ..self.pool
        };

        Self { pool, ..self }
    }

    /// Parses the address and decodes the keys, without connecting.
    pub fn config(&self) -> Result<Config, ClientError> {
        if self.routes.is_empty() {
            return Err(ClientError::MissingRoutes);
        }

        let addressing = Addressing::parse(&self.address, self.cluster)
            .map_err(|source| ClientError::Address { source })?;
        let keys = Keys::decode(&self.private_key, &self.public_key)
            .map_err(|source| ClientError::Keys { source })?;

        Ok(Config {
            addressing,
            cluster: self.cluster,
            routes: self.routes.clone(),
            timeout: self.timeout,
            pool: self.pool,
            keys,
        })
    }

    /// Creates the client and waits for redis to answer a ping.
    ///
    /// The ping is retried for a while to ride out redis starting up
    /// alongside the server; see [`RedisClient::ping`] for the
    /// single-shot version.
    #[tracing::instrument(skip_all, fields(cluster = self.cluster))]
    pub async fn build(self) -> Result<RedisClient, ClientError> {
        let client = self.build_lazy()?;

        client
            .probe()
            .await
            .map_err(|source| ClientError::Unreachable { source })?;

        tracing::debug!(routes = ?client.config.routes, "created redis queue client");

        Ok(client)
    }

    /// Creates the client without connecting; connections are opened
    /// on first use.
    pub(crate) fn build_lazy(&self) -> Result<RedisClient, ClientError> {
        let config = self.config()?;
        let manager = QueueConnectionManager::new(config.addressing.clone())
            .map_err(|source| ClientError::Manager { source })?;

        // connection errors are surfaced to the caller as-is; the
        // startup probe is the only place connecting is retried.
        let pool = bb8::Pool::builder()
            .max_size(config.pool.max_size)
            .connection_timeout(config.pool.connection_timeout)
            .retry_connection(false)
            .build_unchecked(manager);

        Ok(RedisClient {
            pool,
            router: Router::new(config.routes.clone()),
            config,
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("cluster", &self.cluster)
            .field("routes", &self.routes)
            .field("timeout", &self.timeout)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// A redis backed build queue.
///
/// Each route is a redis list named after the route.  Pushes append
/// the signed item to the tail and pops take from the head, so a
/// single route is FIFO; nothing is promised across routes.  The
/// client is cheap to share: wrap it in an `Arc` and hand it out (see
/// [`crate::context`]).
pub struct RedisClient {
    pub(crate) pool: bb8::Pool<QueueConnectionManager>,
    pub(crate) config: Config,
    pub(crate) router: Router,
}

impl RedisClient {
    pub fn builder(address: impl Into<String>) -> ClientBuilder { ClientBuilder::new(address) }

    pub fn config(&self) -> &Config { &self.config }

    pub fn router(&self) -> &Router { &self.router }

    /// Maps a caller's route onto its configured spelling, the key the
    /// route is stored under.  Routes outside the configured set are
    /// rejected.
    pub(crate) fn configured_route<'r>(&'r self, route: &str) -> Result<&'r str, QueueError> {
        self.router
            .configured(route)
            .ok_or_else(|| QueueError::UnknownRoute {
                route: route.to_owned(),
            })
    }

    /// Runs one command on a pooled connection.
    ///
    /// `command` gets a handle to the checked-out connection.  If the
    /// token is cancelled while the command is in flight the connection
    /// is discarded rather than returned to the pool, so a reply that
    /// arrives later (e.g. an item popped by an abandoned `BLPOP`) can't
    /// be read by the next user.
    pub(crate) async fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        command: F,
    ) -> Result<T, QueueError>
    where
        F: FnOnce(redis::aio::MultiplexedConnection) -> Fut + Send,
        Fut: Future<Output = redis::RedisResult<T>> + Send,
    {
        let mut connection = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(QueueError::Cancelled),
            connection = self.pool.get() => connection
                .map_err(|source| QueueError::backend(operation, source))?,
        };

        let handle = connection.connection.clone();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = command(handle) => Some(result),
        };

        let conn: &mut QueueConnection = &mut connection;
        match outcome {
            None => {
                conn.discard();
                Err(QueueError::Cancelled)
            }
            Some(Ok(value)) => Ok(value),
            Some(Err(source)) => {
                conn.observe(&source);
                Err(QueueError::backend(operation, source))
            }
        }
    }

    /// Runs a single command.
    pub(crate) async fn query<T>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        command: redis::Cmd,
    ) -> Result<T, QueueError>
    where
        T: redis::FromRedisValue + Send,
    {
        self.execute(cancel, operation, move |mut connection| async move {
            command.query_async(&mut connection).await
        })
        .await
    }
}

impl std::fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Queue for RedisClient {
    fn driver(&self) -> &str { DRIVER }

    fn route(&self, worker: &Worker) -> Result<String, RouteError> { self.router.route(worker) }

    async fn push(
        &self,
        cancel: &CancellationToken,
        route: &str,
        payload: &[u8],
    ) -> Result<(), QueueError> {
        self.push_signed(cancel, route, payload).await
    }

    async fn pop(
        &self,
        cancel: &CancellationToken,
        routes: &[String],
    ) -> Result<Option<Item>, QueueError> {
        self.pop_from(cancel, routes).await
    }

    async fn length(&self, cancel: &CancellationToken) -> Result<u64, QueueError> {
        self.total_length(cancel).await
    }

    async fn route_length(
        &self,
        cancel: &CancellationToken,
        route: &str,
    ) -> Result<u64, QueueError> {
        self.length_of(cancel, route).await
    }

    async fn position(&self, cancel: &CancellationToken, build: &BuildRef) -> u64 {
        self.rank_of(cancel, build).await
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), QueueError> {
        self.ping_once(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientBuilder::new("redis://localhost:6379")
            .config()
            .expect("config");

        assert_eq!(config.routes, vec![DEFAULT_ROUTE.to_owned()]);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.pool, PoolOptions::default());
        assert!(!config.cluster);
    }

    #[test]
    fn empty_keys_disable_signing() {
        let config = ClientBuilder::new("redis://localhost:6379")
            .with_private_key("")
            .with_public_key("")
            .config()
            .expect("config");

        assert!(!config.keys().signs());
        assert!(!config.keys().verifies());
    }

    #[test]
    fn generated_keys_enable_signing() {
        let generated = Keys::generate();
        let config = ClientBuilder::new("redis://localhost:6379")
            .with_private_key(&generated.private_key)
            .with_public_key(&generated.public_key)
            .config()
            .expect("config");

        assert!(config.keys().signs());
        assert!(config.keys().verifies());
    }

    #[test]
    fn bad_keys_are_fatal() {
        let err = ClientBuilder::new("redis://localhost:6379")
            .with_public_key("c2hvcnQ=")
            .config()
            .expect_err("config");

        assert!(matches!(err, ClientError::Keys { .. }));
    }

    #[test]
    fn cluster_config_uses_failover_addressing() {
        let config = ClientBuilder::new("redis://master,sentinel1,sentinel2")
            .with_cluster(true)
            .with_pool_size(32)
            .with_connect_timeout(Duration::from_secs(2))
            .config()
            .expect("config");

        let Addressing::Failover(options) = &config.addressing else {
            panic!("expected failover addressing, got {:?}", config.addressing);
        };
        assert_eq!(options.master_name, "master");
        assert_eq!(options.sentinel_addrs, vec!["sentinel1", "sentinel2"]);
        assert_eq!(
            config.pool,
            PoolOptions {
                max_size: 32,
                connection_timeout: Duration::from_secs(2),
            }
        );
    }

    #[test]
    fn empty_routes_are_fatal() {
        let err = ClientBuilder::new("redis://localhost:6379")
            .with_routes(vec![])
            .config()
            .expect_err("config");

        assert!(matches!(err, ClientError::MissingRoutes));
    }

    // nothing listens on port 1, so any call that got as far as redis
    // would fail with a backend error instead.
    fn offline() -> RedisClient {
        ClientBuilder::new("redis://127.0.0.1:1")
            .with_routes(vec!["vela".to_owned(), "Large:Docker".to_owned()])
            .build_lazy()
            .expect("client")
    }

    #[tokio::test]
    async fn configured_route_uses_the_configured_spelling() {
        let client = offline();

        assert_eq!(client.configured_route("VELA").expect("route"), "vela");
        assert_eq!(
            client.configured_route("large:docker").expect("route"),
            "Large:Docker"
        );
        assert!(matches!(
            client.configured_route("gpu"),
            Err(QueueError::UnknownRoute { ref route }) if route == "gpu"
        ));
    }

    #[tokio::test]
    async fn unknown_routes_fail_before_any_io() {
        let client = offline();
        let cancel = CancellationToken::new();

        assert!(matches!(
            client.push(&cancel, "gpu", b"payload").await,
            Err(QueueError::UnknownRoute { .. })
        ));
        assert!(matches!(
            client.pop(&cancel, &["vela".to_owned(), "gpu".to_owned()]).await,
            Err(QueueError::UnknownRoute { ref route }) if route == "gpu"
        ));
        assert!(matches!(
            client.route_length(&cancel, "gpu").await,
            Err(QueueError::UnknownRoute { .. })
        ));
        assert_eq!(
            client
                .position(&cancel, &BuildRef::new(1, "octocat/hello-world", 1).with_route("gpu"))
                .await,
            0
        );
    }

    #[test]
    fn bad_address_is_fatal() {
        let err = ClientBuilder::new("localhost:6379")
            .config()
            .expect_err("config");

        assert!(matches!(
            err,
            ClientError::Address {
                source: AddressError::Parse(_)
            }
        ));
    }
}
