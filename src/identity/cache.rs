//! Last-resort tier: parameters persisted by a previous launch.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Identity, IdentitySource, IdentityStrategy, UserAction, UserId};
use crate::error::Result;
use crate::session::LaunchContext;
use crate::storage::{KeyValueStorage, URL_PARAMS_KEY};

/// Record stored under [`URL_PARAMS_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLaunchParams {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub actions: Vec<UserAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_from: Option<IdentitySource>,
}

impl Default for CachedLaunchParams {
    fn default() -> Self {
        Self {
            user_id: UserId::Text(String::new()),
            username: None,
            first_name: None,
            country: None,
            device: None,
            source: None,
            actions: Vec::new(),
            resolved_from: None,
        }
    }
}

impl CachedLaunchParams {
    pub fn from_identity(identity: &Identity, actions: Vec<UserAction>) -> Self {
        Self {
            user_id: identity.id.clone(),
            username: identity.username.clone(),
            first_name: identity.first_name.clone(),
            country: identity.locale.clone(),
            device: identity.device.clone(),
            source: identity.traffic_source.clone(),
            actions,
            resolved_from: Some(identity.source),
        }
    }

    pub fn load(storage: &dyn KeyValueStorage) -> Option<Self> {
        let raw = storage.get(URL_PARAMS_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(params) => Some(params),
            Err(err) => {
                warn!("Failed to parse cached launch parameters: {}", err);
                None
            }
        }
    }

    pub fn store(&self, storage: &dyn KeyValueStorage) -> Result<()> {
        storage.set(URL_PARAMS_KEY, &serde_json::to_string(self)?)
    }

    fn has_id(&self) -> bool {
        match &self.user_id {
            UserId::Numeric(_) => true,
            UserId::Text(id) => !id.trim().is_empty(),
        }
    }
}

pub struct CachedParamsStrategy;

impl IdentityStrategy for CachedParamsStrategy {
    fn source(&self) -> IdentitySource {
        IdentitySource::Cache
    }

    fn try_resolve(&self, _: &LaunchContext, storage: &dyn KeyValueStorage) -> Option<Identity> {
        let cached = CachedLaunchParams::load(storage).filter(|c| c.has_id())?;
        Some(Identity {
            id: cached.user_id,
            username: cached.username,
            first_name: cached.first_name,
            locale: cached.country,
            device: cached.device,
            traffic_source: cached.source,
            source: self.source(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn corrupt_cache_is_ignored() {
        let storage = MemoryStorage::new();
        storage.set(URL_PARAMS_KEY, "{oops").unwrap();
        assert!(CachedParamsStrategy
            .try_resolve(&LaunchContext::default(), &storage)
            .is_none());
    }

    #[test]
    fn blank_cached_id_is_ignored() {
        let storage = MemoryStorage::new();
        CachedLaunchParams {
            user_id: UserId::Text("  ".into()),
            username: Some("ghost".into()),
            ..Default::default()
        }
        .store(&storage)
        .unwrap();

        assert!(CachedParamsStrategy
            .try_resolve(&LaunchContext::default(), &storage)
            .is_none());
    }

    #[test]
    fn reads_record_written_by_browser_build() {
        let storage = MemoryStorage::new();
        storage
            .set(
                URL_PARAMS_KEY,
                r#"{"userId":"900","username":"web","country":"en-US","actions":[]}"#,
            )
            .unwrap();

        let identity = CachedParamsStrategy
            .try_resolve(&LaunchContext::default(), &storage)
            .expect("identity");
        assert_eq!(identity.id, UserId::Text("900".into()));
        assert_eq!(identity.locale.as_deref(), Some("en-US"));
        assert_eq!(identity.source, IdentitySource::Cache);
    }
}
