//! Configuration for the mini-app, the log sink and the document store
//!
//! Loads configuration from config.yml file

use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default constants (fallback if config.yml not found)
pub const DEFAULT_LOG_ENDPOINT: &str = "http://127.0.0.1:8787/api/logAppEvent";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_SHEET_NAME: &str = "TelegramBotLogs";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STORAGE_PATH: &str = "ellie_storage.json";
pub const DEFAULT_DOCUMENTS_DIR: &str = "ellie_documents";
pub const DEFAULT_CSV_PATH: &str = "ellie_events.csv";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_SHEETS_API: &str = "https://sheets.googleapis.com";

/// Where the sink writes rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBackendKind {
    Sheets,
    Csv,
}

impl SinkBackendKind {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => SinkBackendKind::Csv,
            _ => SinkBackendKind::Sheets,
        }
    }
}

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    logging: Option<LoggingYaml>,
    documents: Option<DocumentsYaml>,
    sink: Option<SinkYaml>,
    game: Option<GameYaml>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingYaml {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    storage_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentsYaml {
    dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SinkYaml {
    listen: Option<String>,
    backend: Option<String>,
    spreadsheet_id: Option<String>,
    sheet_name: Option<String>,
    service_account_email: Option<String>,
    private_key: Option<String>,
    token_uri: Option<String>,
    sheets_api_base: Option<String>,
    csv_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GameYaml {
    offer_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// File backing the client key-value storage.
    pub storage_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub listen: String,
    pub backend: SinkBackendKind,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub service_account_email: String,
    /// PEM key, `\n` escapes already turned into newlines.
    pub private_key: String,
    pub token_uri: String,
    pub sheets_api_base: String,
    pub csv_path: PathBuf,
}

impl SinkConfig {
    pub fn listen_addr(&self) -> crate::Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            crate::Error::Config(format!("Invalid sink listen address '{}': {}", self.listen, e))
        })
    }

    pub fn has_credentials(&self) -> bool {
        !self.service_account_email.is_empty() && !self.private_key.is_empty()
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub documents_dir: PathBuf,
    pub sink: SinkConfig,
    pub offer_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml values
    pub fn new() -> Self {
        Self::load_from_file("config.yml")
            .or_else(|_| Self::load_from_file("../config.yml"))
            .unwrap_or_else(|_| Self::from_yaml(YamlConfig::default()))
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    return Some(env_val);
                }
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        value.filter(|v| !(v.starts_with("${") && v.ends_with('}')))
    }

    fn resolve_env_u64(value: Option<u64>, env_key: &str) -> Option<u64> {
        std::env::var(env_key)
            .ok()
            .and_then(|v| v.parse().ok())
            .or(value)
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        // Try to load from current directory first, then parent
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, String> {
        Self::load_dotenv();

        let yaml: YamlConfig = if content.trim().is_empty() {
            YamlConfig::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| format!("Failed to parse config file: {}", e))?
        };
        Ok(Self::from_yaml(yaml))
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let logging = yaml.logging.unwrap_or_default();
        let documents = yaml.documents.unwrap_or_default();
        let sink = yaml.sink.unwrap_or_default();
        let game = yaml.game.unwrap_or_default();

        let private_key = Self::resolve_env_string(sink.private_key, "GOOGLE_PRIVATE_KEY")
            .map(|key| key.replace("\\n", "\n"))
            .unwrap_or_default();

        Self {
            logging: LoggingConfig {
                endpoint: Self::resolve_env_string(logging.endpoint, "ELLIE_LOG_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_LOG_ENDPOINT.to_string()),
                timeout: Duration::from_secs(
                    Self::resolve_env_u64(logging.timeout_secs, "ELLIE_LOG_TIMEOUT_SECS")
                        .unwrap_or(DEFAULT_TIMEOUT_SECS),
                ),
                storage_path: PathBuf::from(
                    Self::resolve_env_string(logging.storage_path, "ELLIE_STORAGE_PATH")
                        .unwrap_or_else(|| DEFAULT_STORAGE_PATH.to_string()),
                ),
            },
            documents_dir: PathBuf::from(
                Self::resolve_env_string(documents.dir, "ELLIE_DOCUMENTS_DIR")
                    .unwrap_or_else(|| DEFAULT_DOCUMENTS_DIR.to_string()),
            ),
            sink: SinkConfig {
                listen: Self::resolve_env_string(sink.listen, "ELLIE_SINK_LISTEN")
                    .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
                backend: SinkBackendKind::parse(
                    &Self::resolve_env_string(sink.backend, "ELLIE_SINK_BACKEND")
                        .unwrap_or_default(),
                ),
                spreadsheet_id: Self::resolve_env_string(sink.spreadsheet_id, "SPREADSHEET_ID")
                    .unwrap_or_default(),
                sheet_name: sink
                    .sheet_name
                    .unwrap_or_else(|| DEFAULT_SHEET_NAME.to_string()),
                service_account_email: Self::resolve_env_string(
                    sink.service_account_email,
                    "GOOGLE_SERVICE_ACCOUNT_EMAIL",
                )
                .unwrap_or_default(),
                private_key,
                token_uri: sink
                    .token_uri
                    .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
                sheets_api_base: sink
                    .sheets_api_base
                    .unwrap_or_else(|| DEFAULT_SHEETS_API.to_string()),
                csv_path: PathBuf::from(
                    sink.csv_path
                        .unwrap_or_else(|| DEFAULT_CSV_PATH.to_string()),
                ),
            },
            offer_url: Self::resolve_env_string(game.offer_url, "ELLIE_OFFER_URL")
                .filter(|url| !url.is_empty()),
        }
    }
}
