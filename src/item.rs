//! The queued envelope.
//!
//! The queue does not interpret builds; it only moves an [`Item`]
//! that references one.  The envelope is serialized with
//! `serde_json`, which gives a stable field order, so the same item
//! always produces the same bytes (and, with signing enabled, the same
//! signed buffer).

use crate::route::DEFAULT_ROUTE;

/// The version of the [`Item`] layout produced by this crate.
///
/// Consumers compare this against the version stamped into a popped
/// item to detect work enqueued by an incompatible server, and should
/// fail that build instead of trying to execute it.
pub const ITEM_VERSION: u64 = 1;

/// A reference to the build an item was queued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BuildRef {
    /// The unique build id.
    pub id: i64,
    /// The full name of the repository the build belongs to.
    #[serde(default)]
    pub repo: String,
    /// The build number within the repository.
    #[serde(default)]
    pub number: i64,
    /// The route the build was queued on; empty means the default
    /// route.
    #[serde(default)]
    pub route: String,
}

impl BuildRef {
    pub fn new(id: i64, repo: impl Into<String>, number: i64) -> Self {
        Self {
            id,
            repo: repo.into(),
            number,
            route: String::new(),
        }
    }

    #[must_use]
    pub fn with_route(self, route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            ..self
        }
    }

    /// The route this build lives on, falling back to the default
    /// route when none was recorded.
    pub fn route(&self) -> &str {
        if self.route.is_empty() {
            DEFAULT_ROUTE
        } else {
            &self.route
        }
    }
}

/// The envelope pushed onto a route.
///
/// Items are immutable once signed; there is no way to alter an item
/// in the queue other than popping it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    pub build: BuildRef,
    pub item_version: u64,
}

impl Item {
    /// Creates an item for the build, stamped with the current
    /// [`ITEM_VERSION`].
    pub fn new(build: BuildRef) -> Self {
        Self {
            build,
            item_version: ITEM_VERSION,
        }
    }

    /// Whether this item was produced by a compatible version.
    pub fn is_compatible(&self) -> bool { self.item_version == ITEM_VERSION }

    pub(crate) fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_items_are_compatible() {
        let item = Item::new(BuildRef::new(1, "octocat/hello-world", 7));
        assert!(item.is_compatible());

        let old = Item {
            item_version: ITEM_VERSION + 1,
            ..item
        };
        assert!(!old.is_compatible());
    }

    #[test]
    fn route_falls_back_to_default() {
        let build = BuildRef::new(1, "octocat/hello-world", 7);
        assert_eq!(build.route(), DEFAULT_ROUTE);
        assert_eq!(build.with_route("gpu").route(), "gpu");
    }

    #[test]
    fn payload_tolerates_missing_optional_fields() {
        let item = Item::from_payload(br#"{"build":{"id":42},"item_version":1}"#).expect("decode");
        assert_eq!(item.build.id, 42);
        assert!(item.build.repo.is_empty());
        assert_eq!(item.build.route(), DEFAULT_ROUTE);
    }

    #[test]
    fn payload_rejects_garbage() {
        Item::from_payload(b"not json").expect_err("garbage decodes");
    }
}
