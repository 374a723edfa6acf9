//! Route selection.
//!
//! A route names a worker pool and is the key the queue stores items
//! under.  The set of routes is fixed when the queue is constructed;
//! a selector that maps outside that set is rejected rather than
//! silently creating a new partition that no worker listens on.

/// The route used by builds that carry no pool constraints.
pub const DEFAULT_ROUTE: &str = "default";

/// The pool selectors a pipeline places on its worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Worker {
    pub flavor: String,
    pub platform: String,
}

impl Worker {
    pub fn new(flavor: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            flavor: flavor.into(),
            platform: platform.into(),
        }
    }

    /// Whether this worker constrains the pool at all.
    pub fn is_unconstrained(&self) -> bool { self.flavor.is_empty() && self.platform.is_empty() }

    /// The route name this worker asks for: the non-empty selectors,
    /// flavor first, joined by `:`.
    pub fn candidate(&self) -> String {
        [self.flavor.as_str(), self.platform.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RouteError {
    #[error("invalid route {route} provided; it is not a configured queue route")]
    Invalid { route: String },
}

/// Picks a configured route for a worker selector.
#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<String>,
}

impl Router {
    pub fn new(routes: Vec<String>) -> Self { Self { routes } }

    /// The configured routes, in configuration order.
    pub fn routes(&self) -> &[String] { &self.routes }

    /// Returns the configured spelling of `route`, compared
    /// case-insensitively (Unicode lowercase, not just ASCII).
    pub fn configured(&self, route: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|configured| fold_eq(configured, route))
            .map(String::as_str)
    }

    /// Selects the route for the given worker.
    ///
    /// An unconstrained worker always gets [`DEFAULT_ROUTE`], whether or
    /// not it is configured.  Otherwise the joined selector must match a
    /// configured route, and the configured spelling is returned so
    /// producers and consumers agree on the key.
    pub fn route(&self, worker: &Worker) -> Result<String, RouteError> {
        if worker.is_unconstrained() {
            return Ok(DEFAULT_ROUTE.to_owned());
        }

        let candidate = worker.candidate();

        self.configured(&candidate)
            .map(str::to_owned)
            .ok_or(RouteError::Invalid { route: candidate })
    }
}

fn fold_eq(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
