//! Per-user settings.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{encode, Direction, DocumentStore, FilterOp, Query};
use crate::logger::iso_timestamp;
use crate::Result;

pub const COLLECTION: &str = "userSettings";
pub const DEFAULT_LANGUAGE: &str = "ru";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub language: String,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_notifications")]
    pub notifications: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn default_notifications() -> bool {
    true
}

impl UserSettings {
    /// Defaults for a user with no stored settings. The language is the
    /// primary subtag of `locale` (`ru-RU` → `ru`).
    pub fn defaults_for(user_id: &str, username: Option<&str>, locale: &str) -> Self {
        let language = locale
            .split(['-', '_'])
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_lowercase();

        Self {
            id: None,
            user_id: user_id.to_string(),
            username: username.map(str::to_string),
            language,
            theme: Theme::System,
            notifications: true,
            last_visit: Some(iso_timestamp(Utc::now())),
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Clone)]
pub struct UserSettingsRepo {
    store: Arc<dyn DocumentStore>,
}

impl UserSettingsRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Most recently created settings for the user, or fresh defaults.
    pub fn load_or_default(
        &self,
        user_id: &str,
        username: Option<&str>,
        locale: &str,
    ) -> Result<UserSettings> {
        let query = Query::new()
            .filter("userId", FilterOp::Eq, user_id)
            .order_by("createdAt", Direction::Desc)
            .limit(1);

        match self.store.query(COLLECTION, &query)?.into_iter().next() {
            Some(doc) => doc.decode(),
            None => Ok(UserSettings::defaults_for(user_id, username, locale)),
        }
    }

    /// Replace the stored document when the settings carry an id, otherwise
    /// insert and assign the new id.
    pub fn save(&self, settings: &mut UserSettings) -> Result<()> {
        let now = iso_timestamp(Utc::now());
        settings.last_visit = Some(now.clone());
        settings.updated_at = Some(now.clone());

        match settings.id.clone() {
            Some(id) => self.store.set(COLLECTION, &id, encode(settings)?),
            None => {
                settings.created_at.get_or_insert(now);
                let id = self.store.add(COLLECTION, encode(settings)?)?;
                settings.id = Some(id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::MemoryDocumentStore;

    fn repo() -> UserSettingsRepo {
        UserSettingsRepo::new(Arc::new(MemoryDocumentStore::new()))
    }

    #[test]
    fn defaults_use_primary_locale_subtag() {
        let settings = repo().load_or_default("7", Some("kate"), "en-GB").unwrap();
        assert!(settings.id.is_none());
        assert_eq!(settings.language, "en");
        assert_eq!(settings.theme, Theme::System);
        assert!(settings.notifications);
        assert_eq!(settings.username.as_deref(), Some("kate"));

        let settings = repo().load_or_default("7", None, "").unwrap();
        assert_eq!(settings.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn first_save_inserts_then_later_saves_replace() {
        let repo = repo();
        let mut settings = repo.load_or_default("7", None, "ru-RU").unwrap();
        settings.theme = Theme::Dark;
        repo.save(&mut settings).unwrap();

        let id = settings.id.clone().expect("assigned id");
        assert!(settings.created_at.is_some());

        let loaded = repo.load_or_default("7", None, "ru-RU").unwrap();
        assert_eq!(loaded.id.as_deref(), Some(id.as_str()));
        assert_eq!(loaded.theme, Theme::Dark);

        let mut loaded = loaded;
        loaded.notifications = false;
        repo.save(&mut loaded).unwrap();
        assert_eq!(loaded.id.as_deref(), Some(id.as_str()));

        let reloaded = repo.load_or_default("7", None, "ru-RU").unwrap();
        assert!(!reloaded.notifications);
        assert_eq!(reloaded.created_at, settings.created_at);
    }

    #[test]
    fn theme_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Theme::Light).unwrap(), "\"light\"");
    }
}
