//! User identity resolution
//!
//! An identity is derived once per session by walking an ordered list of
//! strategies:
//! 1. structured user from the host platform bridge
//! 2. `user` field of the raw init-data string
//! 3. URL query parameters, prefixed scheme (`a_userId`, `b_username`, ...)
//! 4. URL query parameters, legacy scheme (`userId`, `username`)
//! 5. parameters cached in persistent storage by an earlier launch
//!
//! The first strategy that produces an id wins; partial values are never
//! merged across tiers.

pub mod cache;
pub mod init_data;
pub mod platform;
pub mod url_params;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::session::LaunchContext;
use crate::storage::KeyValueStorage;

pub use cache::{CachedLaunchParams, CachedParamsStrategy};
pub use init_data::InitData;
pub use platform::{PlatformUserStrategy, RawInitDataStrategy};
pub use url_params::{LaunchParams, LegacyUrlStrategy, PrefixedUrlStrategy, UserAction};

/// User id as delivered by the source: Telegram sends numbers, URL
/// parameters arrive as strings. The two are never coerced into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Numeric(id) => write!(f, "{}", id),
            UserId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId::Numeric(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        UserId::Text(id.to_string())
    }
}

/// Where an identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentitySource {
    Platform,
    PlatformRaw,
    UrlNew,
    UrlLegacy,
    Cache,
}

impl IdentitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentitySource::Platform => "platform",
            IdentitySource::PlatformRaw => "platform-raw",
            IdentitySource::UrlNew => "url-new",
            IdentitySource::UrlLegacy => "url-legacy",
            IdentitySource::Cache => "cache",
        }
    }
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved end-user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Marketing source from the launch link (`e_source`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_source: Option<String>,
    pub source: IdentitySource,
}

impl Identity {
    pub fn new(id: UserId, source: IdentitySource) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            locale: None,
            device: None,
            traffic_source: None,
            source,
        }
    }
}

/// One resolution tier.
pub trait IdentityStrategy: Send + Sync {
    /// Provenance recorded on identities this strategy produces.
    fn source(&self) -> IdentitySource;

    /// Produce an identity or `None` to fall through to the next tier.
    fn try_resolve(
        &self,
        launch: &LaunchContext,
        storage: &dyn KeyValueStorage,
    ) -> Option<Identity>;
}

/// Ordered list of strategies evaluated until the first success.
pub struct IdentityResolver {
    strategies: Vec<Box<dyn IdentityStrategy>>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::standard()
    }
}

impl IdentityResolver {
    pub fn new(strategies: Vec<Box<dyn IdentityStrategy>>) -> Self {
        Self { strategies }
    }

    /// Platform, raw init data, prefixed URL, legacy URL, cache.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(PlatformUserStrategy),
            Box::new(RawInitDataStrategy),
            Box::new(PrefixedUrlStrategy),
            Box::new(LegacyUrlStrategy),
            Box::new(CachedParamsStrategy),
        ])
    }

    pub fn sources(&self) -> Vec<IdentitySource> {
        self.strategies.iter().map(|s| s.source()).collect()
    }

    /// Resolve the session identity. Fresh resolutions are written to the
    /// launch-parameter cache so a later launch without platform data or URL
    /// parameters can still be attributed.
    pub fn resolve(
        &self,
        launch: &LaunchContext,
        storage: &dyn KeyValueStorage,
    ) -> Option<Identity> {
        for strategy in &self.strategies {
            let Some(identity) = strategy.try_resolve(launch, storage) else {
                debug!(source = %strategy.source(), "Identity tier produced nothing");
                continue;
            };

            info!(
                source = %identity.source,
                user_id = %identity.id,
                username = identity.username.as_deref().unwrap_or("-"),
                "Identity resolved"
            );

            if identity.source != IdentitySource::Cache {
                let actions = LaunchParams::from_query(&launch.query).actions;
                let record = CachedLaunchParams::from_identity(&identity, actions);
                if let Err(err) = record.store(storage) {
                    warn!("Failed to cache launch parameters: {}", err);
                }
            }

            return Some(identity);
        }

        warn!("Identity could not be resolved from any source");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{WebAppBridge, WebAppUser};
    use crate::storage::{MemoryStorage, URL_PARAMS_KEY};

    fn platform_user(id: i64, username: &str) -> WebAppUser {
        WebAppUser {
            id,
            first_name: "Alex".to_string(),
            last_name: None,
            username: Some(username.to_string()),
            language_code: Some("ru".to_string()),
        }
    }

    #[test]
    fn platform_user_wins_over_url_and_cache() {
        let storage = MemoryStorage::new();
        CachedLaunchParams {
            user_id: UserId::Text("cached".into()),
            username: Some("cached_user".into()),
            ..Default::default()
        }
        .store(&storage)
        .unwrap();

        let launch = LaunchContext::default()
            .with_bridge(WebAppBridge {
                user: Some(platform_user(42, "tg_user")),
                ..Default::default()
            })
            .with_query("a_userId=100&userId=200&username=legacy");

        let identity = IdentityResolver::standard()
            .resolve(&launch, &storage)
            .expect("identity");

        assert_eq!(identity.source, IdentitySource::Platform);
        assert_eq!(identity.id, UserId::Numeric(42));
        assert_eq!(identity.username.as_deref(), Some("tg_user"));
        assert_eq!(identity.locale.as_deref(), Some("ru"));
    }

    #[test]
    fn prefixed_scheme_beats_legacy_scheme() {
        let storage = MemoryStorage::new();
        let launch = LaunchContext::default()
            .with_query("userId=999&username=old&a_userId=123&b_username=new_name");

        let identity = IdentityResolver::standard()
            .resolve(&launch, &storage)
            .expect("identity");

        assert_eq!(identity.source, IdentitySource::UrlNew);
        assert_eq!(identity.id, UserId::Text("123".into()));
        assert_eq!(identity.username.as_deref(), Some("new_name"));
    }

    #[test]
    fn legacy_scheme_used_when_prefixed_absent() {
        let storage = MemoryStorage::new();
        let launch = LaunchContext::default().with_query("userId=555&username=legacy_user");

        let identity = IdentityResolver::standard()
            .resolve(&launch, &storage)
            .expect("identity");

        assert_eq!(identity.source, IdentitySource::UrlLegacy);
        assert_eq!(identity.id, UserId::Text("555".into()));
    }

    #[test]
    fn url_ids_stay_strings() {
        let storage = MemoryStorage::new();
        let launch = LaunchContext::default().with_query("a_userId=007");

        let identity = IdentityResolver::standard()
            .resolve(&launch, &storage)
            .expect("identity");

        assert_eq!(identity.id, UserId::Text("007".into()));
        assert_ne!(identity.id, UserId::Numeric(7));
    }

    #[test]
    fn fresh_resolution_is_cached_and_reused() {
        let storage = MemoryStorage::new();
        let first = LaunchContext::default()
            .with_query("a_userId=321&b_username=kate&c_country=de-DE&e_source=ads");
        IdentityResolver::standard()
            .resolve(&first, &storage)
            .expect("first identity");
        assert!(storage.get(URL_PARAMS_KEY).is_some());

        let relaunch = LaunchContext::default();
        let identity = IdentityResolver::standard()
            .resolve(&relaunch, &storage)
            .expect("cached identity");

        assert_eq!(identity.source, IdentitySource::Cache);
        assert_eq!(identity.id, UserId::Text("321".into()));
        assert_eq!(identity.username.as_deref(), Some("kate"));
        assert_eq!(identity.locale.as_deref(), Some("de-DE"));
        assert_eq!(identity.traffic_source.as_deref(), Some("ads"));
    }

    #[test]
    fn fresh_platform_data_replaces_stale_cache() {
        let storage = MemoryStorage::new();
        CachedLaunchParams {
            user_id: UserId::Text("stale".into()),
            ..Default::default()
        }
        .store(&storage)
        .unwrap();

        let launch = LaunchContext::default().with_bridge(WebAppBridge {
            user: Some(platform_user(77, "fresh")),
            ..Default::default()
        });
        IdentityResolver::standard().resolve(&launch, &storage);

        let cached = CachedLaunchParams::load(&storage).expect("cache");
        assert_eq!(cached.user_id, UserId::Numeric(77));
        assert_eq!(cached.resolved_from, Some(IdentitySource::Platform));
    }

    #[test]
    fn nothing_available_resolves_to_none() {
        let storage = MemoryStorage::new();
        let launch = LaunchContext::default().with_query("b_username=only_name");

        assert!(IdentityResolver::standard()
            .resolve(&launch, &storage)
            .is_none());
        assert!(storage.get(URL_PARAMS_KEY).is_none());
    }

    #[test]
    fn custom_order_is_data() {
        let resolver = IdentityResolver::new(vec![
            Box::new(LegacyUrlStrategy),
            Box::new(PrefixedUrlStrategy),
        ]);
        assert_eq!(
            resolver.sources(),
            vec![IdentitySource::UrlLegacy, IdentitySource::UrlNew]
        );

        let storage = MemoryStorage::new();
        let launch = LaunchContext::default().with_query("userId=1&a_userId=2");
        let identity = resolver.resolve(&launch, &storage).expect("identity");
        assert_eq!(identity.id, UserId::Text("1".into()));
    }

    #[test]
    fn user_id_serializes_without_coercion() {
        assert_eq!(serde_json::to_string(&UserId::Numeric(5)).unwrap(), "5");
        assert_eq!(serde_json::to_string(&UserId::Text("5".into())).unwrap(), "\"5\"");
        let back: UserId = serde_json::from_str("\"5\"").unwrap();
        assert_eq!(back, UserId::Text("5".into()));
    }
}
