//! Launch-link query parameters.
//!
//! The canonical scheme prefixes every key with a letter so that parameter
//! families keep a stable order in generated links:
//!
//! | key          | meaning                          |
//! |--------------|----------------------------------|
//! | `a_userId`   | user id (kept as a string)       |
//! | `b_username` | username                         |
//! | `c_country`  | locale / country                 |
//! | `d_device`   | device                           |
//! | `e_source`   | traffic source                   |
//! | `f_actions`  | JSON array of prior user actions |
//!
//! The unprefixed `userId` / `username` pair is still accepted as a
//! compatibility shim for old links.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Identity, IdentitySource, IdentityStrategy, UserId};
use crate::session::LaunchContext;
use crate::storage::KeyValueStorage;

/// An action recorded before launch and passed through the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Identity-related launch parameters with prefixes stripped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchParams {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub country: Option<String>,
    pub device: Option<String>,
    pub source: Option<String>,
    pub actions: Vec<UserAction>,
}

fn pairs(query: &str) -> Vec<(String, String)> {
    let query = query.trim().trim_start_matches('?');
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn lookup(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl LaunchParams {
    /// Read the prefixed scheme.
    pub fn from_query(query: &str) -> Self {
        let pairs = pairs(query);

        let actions = match lookup(&pairs, "f_actions") {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Failed to parse f_actions: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        Self {
            user_id: lookup(&pairs, "a_userId"),
            username: lookup(&pairs, "b_username"),
            country: lookup(&pairs, "c_country"),
            device: lookup(&pairs, "d_device"),
            source: lookup(&pairs, "e_source"),
            actions,
        }
    }

    /// Read the legacy unprefixed scheme.
    pub fn from_legacy_query(query: &str) -> Self {
        let pairs = pairs(query);
        Self {
            user_id: lookup(&pairs, "userId"),
            username: lookup(&pairs, "username"),
            ..Default::default()
        }
    }

    /// Username from the link when no tier could supply an id: prefixed
    /// `b_username` first, then legacy `username`.
    pub fn username_only(query: &str) -> Option<String> {
        Self::from_query(query)
            .username
            .or_else(|| Self::from_legacy_query(query).username)
    }

    fn into_identity(self, source: IdentitySource) -> Option<Identity> {
        let id = self.user_id?;
        Some(Identity {
            id: UserId::Text(id),
            username: self.username,
            first_name: None,
            locale: self.country,
            device: self.device,
            traffic_source: self.source,
            source,
        })
    }
}

pub struct PrefixedUrlStrategy;

impl IdentityStrategy for PrefixedUrlStrategy {
    fn source(&self) -> IdentitySource {
        IdentitySource::UrlNew
    }

    fn try_resolve(&self, launch: &LaunchContext, _: &dyn KeyValueStorage) -> Option<Identity> {
        LaunchParams::from_query(&launch.query).into_identity(self.source())
    }
}

pub struct LegacyUrlStrategy;

impl IdentityStrategy for LegacyUrlStrategy {
    fn source(&self) -> IdentitySource {
        IdentitySource::UrlLegacy
    }

    fn try_resolve(&self, launch: &LaunchContext, _: &dyn KeyValueStorage) -> Option<Identity> {
        LaunchParams::from_legacy_query(&launch.query).into_identity(self.source())
    }
}
