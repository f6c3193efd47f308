//! Google Sheets row appender authenticated with a service account.
//!
//! A short-lived RS256 assertion is exchanged at the token URI for an access
//! token, which is reused until shortly before it expires.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::row::SheetRow;
use crate::config::SinkConfig;
use crate::{Error, Result};

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ServiceAccount {
    pub client_email: String,
    /// PEM-encoded RSA private key.
    pub private_key: String,
    pub token_uri: String,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

impl ServiceAccount {
    /// Signed JWT assertion for the token exchange.
    pub fn assertion(&self) -> Result<String> {
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| Error::Auth(format!("Invalid service account private key: {}", e)))?;
        let iat = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            exp: iat + ASSERTION_LIFETIME_SECS,
            iat,
        };
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }
}

#[derive(Debug, Clone)]
pub struct SheetsAppender {
    http: Client,
    account: ServiceAccount,
    spreadsheet_id: String,
    sheet_name: String,
    api_base: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl SheetsAppender {
    pub fn new(
        account: ServiceAccount,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(format!("ellie_log_sink/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Sheets(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            account,
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// `Error::Config` when the service account is not configured.
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        if !config.has_credentials() {
            return Err(Error::Config(
                "Google Service Account credentials not configured".to_string(),
            ));
        }
        if config.spreadsheet_id.trim().is_empty() {
            return Err(Error::Config("Spreadsheet id not configured".to_string()));
        }

        Self::new(
            ServiceAccount {
                client_email: config.service_account_email.clone(),
                private_key: config.private_key.clone(),
                token_uri: config.token_uri.clone(),
            },
            config.spreadsheet_id.clone(),
            config.sheet_name.clone(),
            config.sheets_api_base.clone(),
        )
    }

    fn cached_token(&self) -> Result<Option<String>> {
        let guard = self
            .token
            .lock()
            .map_err(|_| Error::Auth("Token cache poisoned".to_string()))?;
        Ok(guard
            .as_ref()
            .filter(|t| Instant::now() < t.refresh_at)
            .map(|t| t.value.clone()))
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token()? {
            return Ok(token);
        }

        let assertion = self.account.assertion()?;
        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Auth(format!("Failed to read token response: {}", e)))?;
        if status != StatusCode::OK {
            return Err(Error::Auth(format!(
                "OAuth token error: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Auth(format!("Unexpected token response: {} ({})", text, e)))?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        let refresh_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);

        debug!(expires_in = lifetime.as_secs(), "Obtained Google access token");
        let mut guard = self
            .token
            .lock()
            .map_err(|_| Error::Auth("Token cache poisoned".to_string()))?;
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });
        Ok(token.access_token)
    }

    fn append_url(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.api_base)
            .map_err(|e| {
                Error::Config(format!("Invalid Sheets API base '{}': {}", self.api_base, e))
            })?;
        let range = format!("{}!A:H:append", self.sheet_name);
        url.path_segments_mut()
            .map_err(|_| {
                Error::Config(format!("Sheets API base '{}' cannot have a path", self.api_base))
            })?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                range.as_str(),
            ]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        Ok(url)
    }

    pub async fn append_row(&self, row: SheetRow) -> Result<()> {
        let token = self.access_token().await?;
        let url = self.append_url()?;

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "values": [row.into_values()] }))
            .send()
            .await
            .map_err(|e| Error::Sheets(format!("Append request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Sheets(format!(
                "Google Sheets API error: HTTP {} - {}",
                status.as_u16(),
                text
            )));
        }

        info!(sheet = %self.sheet_name, "Row appended to Google Sheets");
        Ok(())
    }
}
