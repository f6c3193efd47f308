//! Incoming log request parsing and spreadsheet row building.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

use crate::device::classify_device;
use crate::logger::iso_timestamp;

pub const ROW_SOURCE: &str = "mini_app";
pub const UNKNOWN: &str = "unknown";

/// Column headers, in sheet order (A..H).
pub const COLUMNS: [&str; 8] = [
    "Date",
    "User ID",
    "Username",
    "Country",
    "Device",
    "Action",
    "Source",
    "Additional Data",
];

/// Fields pulled out of `additionalData` into their own columns.
const PROMOTED_FIELDS: [&str; 5] = ["language", "userAgent", "device", "country", "platform"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    InvalidJson,
    MissingEvent,
}

impl RequestError {
    pub fn message(&self) -> &'static str {
        match self {
            RequestError::InvalidJson => "Invalid JSON in request body",
            RequestError::MissingEvent => "Event name is required",
        }
    }
}

/// A log request as received, with identity fields already recovered.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingEvent {
    pub event: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub timestamp: Option<String>,
    pub additional_data: Map<String, Value>,
}

/// Text of a JSON scalar; `None` for anything falsy.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

impl IncomingEvent {
    pub fn parse(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| RequestError::InvalidJson)?;
        let Value::Object(body) = value else {
            return Err(RequestError::MissingEvent);
        };

        let event = text(body.get("event")).ok_or(RequestError::MissingEvent)?;
        let additional_data = match body.get("additionalData") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        let mut incoming = Self {
            event,
            user_id: text(body.get("userId")),
            username: text(body.get("username")),
            timestamp: text(body.get("timestamp")),
            additional_data,
        };
        incoming.recover_identity();
        Ok(incoming)
    }

    fn identity_complete(&self) -> bool {
        self.user_id.is_some() && self.username.is_some()
    }

    fn fill(&mut self, user_id: Option<String>, username: Option<String>, origin: &str) {
        if self.user_id.is_none() {
            self.user_id = user_id;
        }
        if self.username.is_none() {
            self.username = username;
        }
        debug!(
            origin,
            user_id = ?self.user_id,
            username = ?self.username,
            "Identity recovery step"
        );
    }

    /// Fill missing user id / username from auxiliary fields, first hit wins
    /// per field: legacy URL query, extracted fields, debug block, launch
    /// diagnostics.
    fn recover_identity(&mut self) {
        if self.identity_complete() {
            return;
        }

        if let Some(query) = text(self.additional_data.get("urlParams")) {
            let mut user_id = None;
            let mut username = None;
            let query = query.trim_start_matches('?');
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    "userId" if user_id.is_none() && !value.is_empty() => {
                        user_id = Some(value.into_owned())
                    }
                    "username" if username.is_none() && !value.is_empty() => {
                        username = Some(value.into_owned())
                    }
                    _ => {}
                }
            }
            self.fill(user_id, username, "urlParams");
        }

        if !self.identity_complete() {
            let data = &self.additional_data;
            let (user_id, username) = (
                text(data.get("extractedUserId")),
                text(data.get("extractedUsername")),
            );
            self.fill(user_id, username, "extracted");
        }

        if !self.identity_complete() {
            if let Some(Value::Object(debug)) = self.additional_data.get("debug") {
                let (user_id, username) = (
                    text(debug.get("extractedUserId")),
                    text(debug.get("extractedUsername")),
                );
                self.fill(user_id, username, "debug");
            }
        }

        if !self.identity_complete() {
            if let Some(Value::Object(diag)) = self.additional_data.get("launchDiagnostics") {
                let (user_id, username) = (
                    text(diag.get("userIdFromURL")),
                    text(diag.get("usernameFromURL")),
                );
                self.fill(user_id, username, "launchDiagnostics");
            }
        }
    }
}

/// One spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub date: String,
    pub user_id: String,
    pub username: String,
    pub country: String,
    pub device: String,
    pub action: String,
    pub source: String,
    pub additional_data: String,
}

impl SheetRow {
    pub fn from_event(event: &IncomingEvent) -> Self {
        let mut extra = event.additional_data.clone();

        let mut country = text(extra.get("language")).unwrap_or_else(|| UNKNOWN.to_string());
        let mut device = text(extra.get("userAgent"))
            .map(|ua| classify_device(&ua).to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        if let Some(explicit) = text(extra.get("device")) {
            device = explicit;
        }
        if let Some(explicit) = text(extra.get("country")) {
            country = explicit;
        }
        for field in PROMOTED_FIELDS {
            extra.remove(field);
        }

        let additional_data = if extra.is_empty() {
            String::new()
        } else {
            Value::Object(extra).to_string()
        };

        Self {
            date: event
                .timestamp
                .clone()
                .unwrap_or_else(|| iso_timestamp(Utc::now())),
            user_id: event.user_id.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            username: event
                .username
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            country,
            device,
            action: event.event.clone(),
            source: ROW_SOURCE.to_string(),
            additional_data,
        }
    }

    pub fn into_values(self) -> Vec<String> {
        vec![
            self.date,
            self.user_id,
            self.username,
            self.country,
            self.device,
            self.action,
            self.source,
            self.additional_data,
        ]
    }
}
