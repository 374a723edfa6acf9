//! Queue configuration.
//!
//! [`Setup`] holds the raw settings as they arrive from flags or the
//! environment.  It derives [`clap::Args`], so a server binary can
//! flatten it into its own command line.  [`Setup::validate`] checks
//! the settings before any connection is attempted.

use std::time::Duration;

/// The only supported queue driver.
pub const DRIVER_REDIS: &str = "redis";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SetupError {
    #[error("no queue driver provided")]
    MissingDriver,
    #[error("no queue address provided")]
    MissingAddress,
    #[error("queue address must be fully qualified (<scheme>://<host>)")]
    MissingScheme,
    #[error("queue address must not have a trailing slash")]
    TrailingSlash,
    #[error("no queue routes provided")]
    MissingRoutes,
    #[error("no queue public key provided")]
    MissingPublicKey,
    #[error("no queue private key provided")]
    MissingPrivateKey,
    #[error("invalid queue driver provided: {driver}")]
    UnsupportedDriver { driver: String },
    #[cfg(feature = "redis")]
    #[error("failed to set up the redis queue: {source}")]
    Redis {
        #[source]
        source: crate::redis::ClientError,
    },
}

/// Raw queue configuration.
#[derive(Clone, clap::Args)]
pub struct Setup {
    /// Queue backend driver.
    #[arg(long = "queue.driver", env = "QUEUE_DRIVER")]
    pub driver: String,

    /// Fully qualified queue address (`<scheme>://<host>[:port]`).
    #[arg(long = "queue.addr", env = "QUEUE_ADDR")]
    pub address: String,

    /// Treat the address host list as `master,sentinel,...` and
    /// connect through Redis Sentinel.
    #[arg(long = "queue.cluster", env = "QUEUE_CLUSTER")]
    pub cluster: bool,

    /// Routes this node's queue serves.
    #[arg(
        long = "queue.routes",
        env = "QUEUE_ROUTES",
        value_delimiter = ',',
        default_value = "default"
    )]
    pub routes: Vec<String>,

    /// How long a single pop waits for an item.
    #[arg(
        long = "queue.pop.timeout",
        env = "QUEUE_POP_TIMEOUT",
        default_value = "60s",
        value_parser = parse_duration
    )]
    pub timeout: Duration,

    /// Base64 private key used to sign pushed items.
    #[arg(
        long = "queue.private-key",
        env = "QUEUE_PRIVATE_KEY",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub private_key: String,

    /// Base64 public key used to verify popped items.
    #[arg(
        long = "queue.public-key",
        env = "QUEUE_PUBLIC_KEY",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub public_key: String,

    /// Maximum number of pooled connections.  Every in-flight pop holds
    /// one for up to the pop timeout.
    #[arg(long = "queue.pool-size", env = "QUEUE_POOL_SIZE", default_value_t = 10)]
    pub pool_size: u32,

    /// How long to wait for a pooled connection.
    #[arg(
        long = "queue.connect-timeout",
        env = "QUEUE_CONNECT_TIMEOUT",
        default_value = "5s",
        value_parser = parse_duration
    )]
    pub connect_timeout: Duration,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            driver: DRIVER_REDIS.to_owned(),
            address: String::new(),
            cluster: false,
            routes: vec![crate::route::DEFAULT_ROUTE.to_owned()],
            timeout: Duration::from_secs(60),
            private_key: String::new(),
            public_key: String::new(),
            pool_size: 10,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl Setup {
    /// Checks the settings, reporting the first problem found.
    ///
    /// The checks run in a fixed order: driver, address, address
    /// scheme, trailing slash, routes, public key, private key.  This
    /// does no I/O.
    pub fn validate(&self) -> Result<(), SetupError> {
        self.validate_connection()?;

        if self.public_key.is_empty() {
            return Err(SetupError::MissingPublicKey);
        }

        if self.private_key.is_empty() {
            return Err(SetupError::MissingPrivateKey);
        }

        Ok(())
    }

    /// Runs every check in [`Setup::validate`] except the two key
    /// checks, for queues that may run unsigned.
    pub fn validate_connection(&self) -> Result<(), SetupError> {
        tracing::trace!("validating queue setup");

        if self.driver.is_empty() {
            return Err(SetupError::MissingDriver);
        }

        if self.address.is_empty() {
            return Err(SetupError::MissingAddress);
        }

        if !self.address.contains("://") {
            return Err(SetupError::MissingScheme);
        }

        if self.address.ends_with('/') {
            return Err(SetupError::TrailingSlash);
        }

        if self.routes.is_empty() {
            return Err(SetupError::MissingRoutes);
        }

        Ok(())
    }

    /// Creates the redis queue from these settings.
    ///
    /// This runs [`Setup::validate_connection`] rather than
    /// [`Setup::validate`], so empty keys disable signing (with a
    /// warning) instead of failing; use [`crate::new`] to require them.
    #[cfg(feature = "redis")]
    pub async fn redis(&self) -> Result<crate::redis::RedisClient, SetupError> {
        self.validate_connection()?;

        tracing::trace!("creating redis queue from setup");

        self.redis_builder()
            .build()
            .await
            .map_err(|source| SetupError::Redis { source })
    }

    #[cfg(feature = "redis")]
    pub(crate) fn redis_builder(&self) -> crate::redis::ClientBuilder {
        crate::redis::ClientBuilder::new(&self.address)
            .with_cluster(self.cluster)
            .with_routes(self.routes.clone())
            .with_timeout(self.timeout)
            .with_private_key(&self.private_key)
            .with_public_key(&self.public_key)
            .with_pool_size(self.pool_size)
            .with_connect_timeout(self.connect_timeout)
    }
}

impl std::fmt::Debug for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setup")
            .field("driver", &self.driver)
            .field("cluster", &self.cluster)
            .field("routes", &self.routes)
            .field("timeout", &self.timeout)
            .field("pool_size", &self.pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Parses a duration such as `500ms`, `60s`, `5m`, `1h`, or a bare
/// number of seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);

    let number: u64 = number
        .parse()
        .map_err(|err| format!("invalid duration {value:?}: {err}"))?;

    match unit {
        "ms" => Ok(Duration::from_millis(number)),
        "" | "s" => Ok(Duration::from_secs(number)),
        "m" => Ok(Duration::from_secs(number * 60)),
        "h" => Ok(Duration::from_secs(number * 60 * 60)),
        other => Err(format!("invalid duration unit {other:?} in {value:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;

    #[derive(Debug, clap::Parser)]
    struct Cli {
        #[command(flatten)]
        setup: Setup,
    }

    fn valid() -> Setup {
        Setup {
            address: "redis://redis.example.com:6379".to_owned(),
            routes: vec!["vela".to_owned(), "large:docker".to_owned()],
            private_key: "cHJpdmF0ZQ==".to_owned(),
            public_key: "cHVibGlj".to_owned(),
            ..Setup::default()
        }
    }

    #[test]
    fn valid_setup_passes() {
        valid().validate().expect("validate");
    }

    #[test]
    fn each_missing_field_is_reported() {
        let cases: Vec<(Setup, fn(&SetupError) -> bool)> = vec![
            (
                Setup {
                    driver: String::new(),
                    ..valid()
                },
                |e| matches!(e, SetupError::MissingDriver),
            ),
            (
                Setup {
                    address: String::new(),
                    ..valid()
                },
                |e| matches!(e, SetupError::MissingAddress),
            ),
            (
                Setup {
                    address: "redis.example.com:6379".to_owned(),
                    ..valid()
                },
                |e| matches!(e, SetupError::MissingScheme),
            ),
            (
                Setup {
                    address: "redis://redis.example.com/".to_owned(),
                    ..valid()
                },
                |e| matches!(e, SetupError::TrailingSlash),
            ),
            (
                Setup {
                    routes: vec![],
                    ..valid()
                },
                |e| matches!(e, SetupError::MissingRoutes),
            ),
            (
                Setup {
                    public_key: String::new(),
                    ..valid()
                },
                |e| matches!(e, SetupError::MissingPublicKey),
            ),
            (
                Setup {
                    private_key: String::new(),
                    ..valid()
                },
                |e| matches!(e, SetupError::MissingPrivateKey),
            ),
        ];

        for (setup, check) in cases {
            let err = setup.validate().expect_err("validated");
            assert!(check(&err), "unexpected error for {setup:?}: {err}");
        }
    }

    #[test]
    fn first_violation_wins() {
        let setup = Setup {
            driver: String::new(),
            address: String::new(),
            routes: vec![],
            ..Setup::default()
        };

        assert!(matches!(
            setup.validate(),
            Err(SetupError::MissingDriver)
        ));
    }

    #[test]
    fn connection_checks_ignore_keys() {
        let unsigned = Setup {
            private_key: String::new(),
            public_key: String::new(),
            ..valid()
        };

        unsigned.validate_connection().expect("validate");
        assert!(matches!(
            unsigned.validate(),
            Err(SetupError::MissingPublicKey)
        ));
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn redis_rejects_bad_settings_before_connecting() {
        // nothing listens on port 1; each of these has to fail first.
        let unsigned = Setup {
            address: "redis://127.0.0.1:1".to_owned(),
            ..Setup::default()
        };

        let no_routes = Setup {
            routes: vec![],
            ..unsigned.clone()
        };
        assert!(matches!(
            no_routes.redis().await,
            Err(SetupError::MissingRoutes)
        ));

        let trailing = Setup {
            address: "redis://127.0.0.1:1/".to_owned(),
            ..unsigned.clone()
        };
        assert!(matches!(
            trailing.redis().await,
            Err(SetupError::TrailingSlash)
        ));

        let no_scheme = Setup {
            address: "127.0.0.1:1".to_owned(),
            ..unsigned.clone()
        };
        assert!(matches!(
            no_scheme.redis().await,
            Err(SetupError::MissingScheme)
        ));

        let no_driver = Setup {
            driver: String::new(),
            ..unsigned
        };
        assert!(matches!(
            no_driver.redis().await,
            Err(SetupError::MissingDriver)
        ));
    }

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("60s"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn flags_parse_with_defaults() {
        let cli = Cli::try_parse_from([
            "server",
            "--queue.driver",
            "redis",
            "--queue.addr",
            "redis://localhost:6379",
        ])
        .expect("parse");

        assert_eq!(cli.setup.driver, "redis");
        assert!(!cli.setup.cluster);
        assert_eq!(cli.setup.routes, vec!["default".to_owned()]);
        assert_eq!(cli.setup.timeout, Duration::from_secs(60));
        assert!(cli.setup.private_key.is_empty());
        assert_eq!(cli.setup.pool_size, 10);
    }

    #[test]
    fn flags_parse_route_lists() {
        let cli = Cli::try_parse_from([
            "server",
            "--queue.driver",
            "redis",
            "--queue.addr",
            "redis://master,sentinel1,sentinel2",
            "--queue.cluster",
            "--queue.routes",
            "vela,large:docker",
            "--queue.pop.timeout",
            "30s",
        ])
        .expect("parse");

        assert!(cli.setup.cluster);
        assert_eq!(
            cli.setup.routes,
            vec!["vela".to_owned(), "large:docker".to_owned()]
        );
        assert_eq!(cli.setup.timeout, Duration::from_secs(30));
    }

    #[test]
    fn debug_hides_keys() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("cHJpdmF0ZQ=="));
        assert!(!rendered.contains("cHVibGlj"));
    }
}
