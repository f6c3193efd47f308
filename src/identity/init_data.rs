//! Parser for the raw Telegram init-data string.
//!
//! The host passes `query_id=...&user=%7B...%7D&auth_date=...&hash=...`, a
//! URL-encoded form whose `user` field is a JSON object.

use crate::error::{Error, Result};
use crate::session::WebAppUser;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitData {
    pub query_id: Option<String>,
    pub user: Option<WebAppUser>,
    pub auth_date: Option<i64>,
    pub start_param: Option<String>,
    pub hash: Option<String>,
}

impl InitData {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim().trim_start_matches(['?', '#']);
        if raw.is_empty() {
            return Err(Error::InvalidArgument("init data is empty".to_string()));
        }

        let mut data = InitData::default();
        for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                "query_id" => data.query_id = Some(value.into_owned()),
                "user" => {
                    let user: WebAppUser = serde_json::from_str(&value).map_err(|e| {
                        Error::Serialization(format!("init data user field: {}", e))
                    })?;
                    data.user = Some(user);
                }
                "auth_date" => data.auth_date = value.parse().ok(),
                "start_param" => data.start_param = Some(value.into_owned()),
                "hash" => data.hash = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "query_id=AAH&user=%7B%22id%22%3A279058397%2C%22first_name%22%3A%22Vlad%22%2C%22username%22%3A%22vlad_dev%22%2C%22language_code%22%3A%22ru%22%7D&auth_date=1712000000&start_param=promo&hash=abc123";

    #[test]
    fn parses_user_and_metadata() {
        let data = InitData::parse(RAW).unwrap();
        let user = data.user.expect("user");
        assert_eq!(user.id, 279058397);
        assert_eq!(user.first_name, "Vlad");
        assert_eq!(user.username.as_deref(), Some("vlad_dev"));
        assert_eq!(user.language_code.as_deref(), Some("ru"));
        assert_eq!(data.query_id.as_deref(), Some("AAH"));
        assert_eq!(data.auth_date, Some(1712000000));
        assert_eq!(data.start_param.as_deref(), Some("promo"));
        assert_eq!(data.hash.as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_user_is_not_an_error() {
        let data = InitData::parse("auth_date=1&hash=x").unwrap();
        assert!(data.user.is_none());
    }

    #[test]
    fn malformed_user_json_is_an_error() {
        let err = InitData::parse("user=%7Bnot-json").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn empty_string_is_an_error() {
        assert!(InitData::parse("   ").is_err());
    }
}
