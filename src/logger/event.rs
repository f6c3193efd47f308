//! Event names, payload schema and the wire record.
//!
//! Every event name belongs to a family, and every family accepts a fixed set
//! of payload kinds. Mismatches are rejected before anything is sent.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identity::UserId;

pub const APP_OPENED: &str = "app_opened";
pub const APP_CLOSED: &str = "app_closed";
pub const GAME_COMPLETED: &str = "game_completed";
pub const USER_ACTION_PREFIX: &str = "user_action:";
/// Sent in place of the requested event when no user identity is known.
pub const DIAGNOSTIC_EVENT: &str = "identity_unresolved";

/// Version of the `additionalData` layout.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventName {
    AppOpened,
    AppClosed,
    UserAction(String),
    GameCompleted,
    IdentityUnresolved,
}

impl EventName {
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidEvent("event name is empty".to_string()));
        }

        match name {
            APP_OPENED => Ok(EventName::AppOpened),
            APP_CLOSED => Ok(EventName::AppClosed),
            GAME_COMPLETED => Ok(EventName::GameCompleted),
            DIAGNOSTIC_EVENT => Ok(EventName::IdentityUnresolved),
            other => match other.strip_prefix(USER_ACTION_PREFIX) {
                Some(action) if !action.is_empty() => Ok(EventName::UserAction(action.to_string())),
                Some(_) => Err(Error::InvalidEvent("user action name is empty".to_string())),
                None => Err(Error::InvalidEvent(format!("unknown event '{}'", other))),
            },
        }
    }

    pub fn user_action(action: &str) -> String {
        format!("{}{}", USER_ACTION_PREFIX, action)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventName::AppOpened => f.write_str(APP_OPENED),
            EventName::AppClosed => f.write_str(APP_CLOSED),
            EventName::UserAction(action) => write!(f, "{}{}", USER_ACTION_PREFIX, action),
            EventName::GameCompleted => f.write_str(GAME_COMPLETED),
            EventName::IdentityUnresolved => f.write_str(DIAGNOSTIC_EVENT),
        }
    }
}

/// Closed set of payload shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    None,
    Launch {
        #[serde(skip_serializing_if = "Option::is_none")]
        start_param: Option<String>,
        launch_actions: usize,
    },
    Close {
        session_seconds: i64,
    },
    Choice {
        stage_id: String,
        option_text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<i32>,
    },
    Navigation {
        from_stage: String,
        to_stage: String,
    },
    Link {
        url: String,
    },
    GameResult {
        total_score: i32,
        max_score: i32,
        stages_completed: usize,
    },
    Diagnostic {
        original_event: String,
        error: String,
        original_payload: Box<EventPayload>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::None => "none",
            EventPayload::Launch { .. } => "launch",
            EventPayload::Close { .. } => "close",
            EventPayload::Choice { .. } => "choice",
            EventPayload::Navigation { .. } => "navigation",
            EventPayload::Link { .. } => "link",
            EventPayload::GameResult { .. } => "game_result",
            EventPayload::Diagnostic { .. } => "diagnostic",
        }
    }

    fn allowed_for(&self, name: &EventName) -> bool {
        match (name, self) {
            (EventName::IdentityUnresolved, EventPayload::Diagnostic { .. }) => true,
            (EventName::IdentityUnresolved, _) => false,
            (_, EventPayload::None) => true,
            (EventName::AppOpened, EventPayload::Launch { .. }) => true,
            (EventName::AppClosed, EventPayload::Close { .. }) => true,
            (
                EventName::UserAction(_),
                EventPayload::Choice { .. }
                | EventPayload::Navigation { .. }
                | EventPayload::Link { .. },
            ) => true,
            (EventName::GameCompleted, EventPayload::GameResult { .. }) => true,
            _ => false,
        }
    }

    /// Payload fields as a JSON object, tagged with `kind`.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Event name and payload that passed schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedEvent {
    pub name: EventName,
    pub payload: EventPayload,
}

impl ValidatedEvent {
    pub fn new(name: &str, payload: EventPayload) -> Result<Self> {
        let name = EventName::parse(name)?;
        if !payload.allowed_for(&name) {
            return Err(Error::InvalidEvent(format!(
                "payload '{}' is not allowed for event '{}'",
                payload.kind(),
                name
            )));
        }
        Ok(Self { name, payload })
    }
}

/// JSON body posted to the log sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub event: String,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Map<String, Value>>,
}
