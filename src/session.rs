//! Launch and session context
//!
//! Provides:
//! - `LaunchContext`: everything the host hands the mini-app at start
//!   (bridge data, launch-link query, user agent, locale)
//! - `SessionContext`: launch context plus the identity resolved once at
//!   start and the persistent storage handle, passed explicitly to every
//!   component that needs them

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityResolver, InitData, LaunchParams, UserAction};
use crate::storage::KeyValueStorage;

/// User object from `initDataUnsafe.user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// Data exposed by the host platform bridge when the app runs inside
/// Telegram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebAppBridge {
    /// Structured, already validated user.
    pub user: Option<WebAppUser>,
    /// Raw init-data string.
    pub init_data: Option<String>,
    pub start_param: Option<String>,
    pub platform: Option<String>,
    pub version: Option<String>,
}

impl WebAppBridge {
    /// Bridge that only carries the raw init-data string. The structured user
    /// is left empty; identity resolution parses it out of the raw form.
    pub fn from_raw_init_data(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let start_param = InitData::parse(&raw).ok().and_then(|d| d.start_param);
        Self {
            init_data: Some(raw),
            start_param,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub bridge: Option<WebAppBridge>,
    /// Query string of the launch link, without the leading `?`.
    pub query: String,
    pub user_agent: String,
    /// Full locale string, e.g. `ru-RU`.
    pub locale: String,
}

impl LaunchContext {
    /// Build from a full launch URL or a bare query string.
    pub fn from_url(link: &str) -> Result<Self> {
        let link = link.trim();
        let query = if link.contains("://") {
            url::Url::parse(link)
                .map_err(|e| Error::InvalidArgument(format!("Invalid launch URL: {}", e)))?
                .query()
                .unwrap_or_default()
                .to_string()
        } else {
            link.trim_start_matches('?').to_string()
        };

        Ok(Self {
            query,
            ..Default::default()
        })
    }

    pub fn with_bridge(mut self, bridge: WebAppBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.trim_start_matches('?').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = locale.to_string();
        self
    }

    pub fn platform(&self) -> Option<&str> {
        self.bridge.as_ref()?.platform.as_deref()
    }

    pub fn start_param(&self) -> Option<&str> {
        self.bridge.as_ref()?.start_param.as_deref()
    }
}

/// Per-launch context. The identity is resolved exactly once, in
/// [`SessionContext::start`], and never changes afterwards.
pub struct SessionContext {
    launch: LaunchContext,
    identity: Option<Identity>,
    /// Username found without an id; only set when `identity` is `None`.
    fallback_username: Option<String>,
    storage: Arc<dyn KeyValueStorage>,
    started_at: DateTime<Utc>,
}

impl SessionContext {
    /// Resolve identity with the standard tier order.
    pub fn start(launch: LaunchContext, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::start_with(launch, storage, &IdentityResolver::standard())
    }

    pub fn start_with(
        launch: LaunchContext,
        storage: Arc<dyn KeyValueStorage>,
        resolver: &IdentityResolver,
    ) -> Self {
        let identity = resolver.resolve(&launch, storage.as_ref());
        let fallback_username = match identity {
            Some(_) => None,
            None => LaunchParams::username_only(&launch.query),
        };
        Self {
            launch,
            identity,
            fallback_username,
            storage,
            started_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Username known for an unresolved session. Events still go out under
    /// their own name with a null user id.
    pub fn fallback_username(&self) -> Option<&str> {
        self.fallback_username.as_deref()
    }

    pub fn launch(&self) -> &LaunchContext {
        &self.launch
    }

    pub fn storage(&self) -> &dyn KeyValueStorage {
        self.storage.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Actions passed in through the launch link.
    pub fn launch_actions(&self) -> Vec<UserAction> {
        LaunchParams::from_query(&self.launch.query).actions
    }

    /// Locale to report: the environment's full locale, else the identity's.
    pub fn locale(&self) -> Option<String> {
        Some(self.launch.locale.clone())
            .filter(|l| !l.is_empty())
            .or_else(|| self.identity.as_ref()?.locale.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentitySource, UserId};
    use crate::storage::MemoryStorage;

    #[test]
    fn from_url_extracts_query() {
        let launch =
            LaunchContext::from_url("https://app.example.com/game?a_userId=5&b_username=x")
                .unwrap();
        assert_eq!(launch.query, "a_userId=5&b_username=x");
    }

    #[test]
    fn from_url_accepts_bare_query() {
        let launch = LaunchContext::from_url("?userId=5").unwrap();
        assert_eq!(launch.query, "userId=5");
    }

    #[test]
    fn from_url_rejects_garbage_url() {
        assert!(LaunchContext::from_url("http://[::1").is_err());
    }

    #[test]
    fn username_without_id_is_kept_as_fallback() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let session =
            SessionContext::start(LaunchContext::default().with_query("b_username=kate"), storage);
        assert!(session.identity().is_none());
        assert_eq!(session.fallback_username(), Some("kate"));

        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let session =
            SessionContext::start(LaunchContext::default().with_query("username=old"), storage);
        assert_eq!(session.fallback_username(), Some("old"));
    }

    #[test]
    fn resolved_session_has_no_fallback_username() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let session = SessionContext::start(
            LaunchContext::default().with_query("a_userId=5&b_username=kate"),
            storage,
        );
        assert_eq!(session.identity().map(|i| i.id.clone()), Some(UserId::from("5")));
        assert!(session.fallback_username().is_none());
    }

    #[test]
    fn raw_bridge_carries_start_param() {
        let bridge = WebAppBridge::from_raw_init_data("start_param=promo&hash=1");
        assert_eq!(bridge.start_param.as_deref(), Some("promo"));
        assert!(bridge.user.is_none());
    }

    #[test]
    fn session_resolves_identity_once() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let launch = LaunchContext::default()
            .with_query("a_userId=12")
            .with_locale("ru-RU");
        let session = SessionContext::start(launch, storage);

        let identity = session.identity().expect("identity");
        assert_eq!(identity.id, UserId::Text("12".into()));
        assert_eq!(identity.source, IdentitySource::UrlNew);
        assert_eq!(session.locale().as_deref(), Some("ru-RU"));
    }

    #[test]
    fn session_locale_falls_back_to_identity() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let launch = LaunchContext::default().with_query("a_userId=1&c_country=es-ES");
        let session = SessionContext::start(launch, storage);
        assert_eq!(session.locale().as_deref(), Some("es-ES"));
    }

    #[test]
    fn unresolved_session_has_no_identity() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let session = SessionContext::start(LaunchContext::default(), storage);
        assert!(session.identity().is_none());
        assert!(session.launch_actions().is_empty());
    }
}
