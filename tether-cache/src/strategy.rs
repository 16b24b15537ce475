//! Caching strategies and the route table that selects them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from cache; on miss fetch and store successful responses.
    CacheFirst,
    /// Fetch; store a stamped copy on success, fall back to the cache on failure.
    NetworkFirst,
    /// Serve the cached copy and refresh it in the background.
    StaleWhileRevalidate,
    /// Never touch the cache.
    NetworkOnly,
    /// Serve from cache; a miss is a hard failure.
    CacheOnly,
}

impl Strategy {
    /// Kebab-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
            Self::NetworkOnly => "network-only",
            Self::CacheOnly => "cache-only",
        }
    }

    /// Returns true if the strategy reads or writes a partition.
    #[must_use]
    pub fn uses_cache(&self) -> bool {
        !matches!(self, Self::NetworkOnly)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cache-first" => Ok(Self::CacheFirst),
            "network-first" => Ok(Self::NetworkFirst),
            "stale-while-revalidate" => Ok(Self::StaleWhileRevalidate),
            "network-only" => Ok(Self::NetworkOnly),
            "cache-only" => Ok(Self::CacheOnly),
            other => Err(format!("unknown caching strategy '{other}'")),
        }
    }
}

/// The three cache partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Partition {
    /// Stylesheets, scripts, images and fonts.
    Static,
    /// Backend API responses and the worker's reserved entries.
    Api,
    /// Pages and the offline page.
    AppShell,
}

impl Partition {
    /// All partitions.
    pub const ALL: [Self; 3] = [Self::Static, Self::Api, Self::AppShell];

    /// Short name used inside partition names.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Api => "api",
            Self::AppShell => "app-shell",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One route: a path prefix and how to serve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Path prefix matched against the request path.
    pub prefix: String,
    /// Strategy for matching requests.
    pub strategy: Strategy,
    /// Partition the strategy reads and writes. `None` for network-only routes.
    pub partition: Option<Partition>,
}

impl Route {
    /// Creates a route.
    #[must_use]
    pub fn new(prefix: impl Into<String>, strategy: Strategy, partition: Option<Partition>) -> Self {
        Self {
            prefix: prefix.into(),
            strategy,
            partition,
        }
    }
}

/// Selects a [`Route`] by the longest matching path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
    fallback: Route,
}

impl RouteTable {
    /// A table with no routes; every request gets `fallback`.
    #[must_use]
    pub fn new(fallback: Route) -> Self {
        Self {
            routes: Vec::new(),
            fallback,
        }
    }

    /// Adds a route. A later route with the same prefix replaces the earlier one.
    #[must_use]
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.retain(|r| r.prefix != route.prefix);
        self.routes.push(route);
        self
    }

    /// The route for `path`.
    ///
    /// `/` only matches the root itself, otherwise it would shadow the fallback.
    #[must_use]
    pub fn select(&self, path: &str) -> &Route {
        self.routes
            .iter()
            .filter(|route| {
                if route.prefix == "/" {
                    path == "/"
                } else {
                    path.starts_with(&route.prefix)
                }
            })
            .max_by_key(|route| route.prefix.len())
            .unwrap_or(&self.fallback)
    }

    /// Configured routes in insertion order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        use Partition::{Api, AppShell, Static};
        use Strategy::{CacheFirst, NetworkFirst, NetworkOnly, StaleWhileRevalidate};

        Self::new(Route::new("", StaleWhileRevalidate, Some(AppShell)))
            .with_route(Route::new("/css/", CacheFirst, Some(Static)))
            .with_route(Route::new("/js/", CacheFirst, Some(Static)))
            .with_route(Route::new("/images/", CacheFirst, Some(Static)))
            .with_route(Route::new("/fonts/", CacheFirst, Some(Static)))
            .with_route(Route::new("/api/", NetworkFirst, Some(Api)))
            .with_route(Route::new("/ws/", NetworkOnly, None))
            .with_route(Route::new("/", StaleWhileRevalidate, Some(AppShell)))
            .with_route(Route::new("/index.html", StaleWhileRevalidate, Some(AppShell)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = RouteTable::default();

        let css = table.select("/css/main.css");
        assert_eq!(css.strategy, Strategy::CacheFirst);
        assert_eq!(css.partition, Some(Partition::Static));

        let api = table.select("/api/players");
        assert_eq!(api.strategy, Strategy::NetworkFirst);
        assert_eq!(api.partition, Some(Partition::Api));

        assert_eq!(table.select("/ws/live").strategy, Strategy::NetworkOnly);
        assert_eq!(table.select("/").partition, Some(Partition::AppShell));
        assert_eq!(table.select("/index.html").strategy, Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_unmatched_path_uses_fallback() {
        let table = RouteTable::default();
        let route = table.select("/manifest.json");
        assert_eq!(route.strategy, Strategy::StaleWhileRevalidate);
        assert_eq!(route.partition, Some(Partition::AppShell));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::default()
            .with_route(Route::new("/api/live/", Strategy::NetworkOnly, None));
        assert_eq!(table.select("/api/live/feed").strategy, Strategy::NetworkOnly);
        assert_eq!(table.select("/api/players").strategy, Strategy::NetworkFirst);
    }

    #[test]
    fn test_replacing_a_route() {
        let table = RouteTable::default()
            .with_route(Route::new("/css/", Strategy::CacheOnly, Some(Partition::Static)));
        assert_eq!(table.select("/css/a.css").strategy, Strategy::CacheOnly);
        assert_eq!(table.routes().iter().filter(|r| r.prefix == "/css/").count(), 1);
    }

    #[test]
    fn test_strategy_names() {
        for strategy in [
            Strategy::CacheFirst,
            Strategy::NetworkFirst,
            Strategy::StaleWhileRevalidate,
            Strategy::NetworkOnly,
            Strategy::CacheOnly,
        ] {
            assert_eq!(strategy.as_str().parse::<Strategy>(), Ok(strategy));
        }
        assert!("cache-last".parse::<Strategy>().is_err());
        assert_eq!(
            serde_json::to_string(&Strategy::StaleWhileRevalidate).unwrap(),
            "\"stale-while-revalidate\""
        );
    }
}
