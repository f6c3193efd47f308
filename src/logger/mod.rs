//! Best-effort telemetry delivery to the remote log sink.
//!
//! `EventLogger::log_event` never returns an error: every failure is turned
//! into `false` and, when a request was actually attempted, into an entry of
//! the bounded error history. Nothing here may interrupt the game.

pub mod event;
pub mod history;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::classify_device;
use crate::error::{Error, Result};
use crate::metrics;
use crate::session::SessionContext;

pub use event::{
    EventName, EventPayload, LogEvent, ValidatedEvent, DIAGNOSTIC_EVENT, SCHEMA_VERSION,
};
pub use history::{LoggingFailure, MAX_ERROR_ENTRIES};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of the one-time availability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Pending,
    Available,
    Unavailable,
}

impl Availability {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Availability::Available,
            2 => Availability::Unavailable,
            _ => Availability::Pending,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Availability::Pending => 0,
            Availability::Available => 1,
            Availability::Unavailable => 2,
        }
    }
}

pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct EventLogger {
    http: Client,
    endpoint: String,
    session: Arc<SessionContext>,
    availability: AtomicU8,
}

impl EventLogger {
    pub fn new(endpoint: impl Into<String>, session: Arc<SessionContext>) -> Result<Self> {
        Self::with_timeout(endpoint, session, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        session: Arc<SessionContext>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(Error::Config("log endpoint is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent(format!("ellie_miniapp/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::LogSink(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            session,
            availability: AtomicU8::new(Availability::Pending.as_u8()),
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn availability(&self) -> Availability {
        Availability::from_u8(self.availability.load(Ordering::Acquire))
    }

    /// Send an OPTIONS request to the sink. Until this has completed
    /// successfully every log call short-circuits.
    pub async fn probe(&self) -> Availability {
        let state = match self
            .http
            .request(Method::OPTIONS, &self.endpoint)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => Availability::Available,
            Ok(response) => {
                warn!(status = %response.status(), "Log sink probe rejected");
                Availability::Unavailable
            }
            Err(err) => {
                warn!("Log sink probe failed: {}", err);
                Availability::Unavailable
            }
        };

        info!(endpoint = %self.endpoint, ?state, "Log sink availability probed");
        self.availability.store(state.as_u8(), Ordering::Release);
        state
    }

    pub async fn log_event(&self, name: &str, payload: EventPayload) -> bool {
        self.log_event_at(name, payload, None).await
    }

    /// Log with an explicit timestamp; `None` stamps the event at send time.
    pub async fn log_event_at(
        &self,
        name: &str,
        payload: EventPayload,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        if self.availability() != Availability::Available {
            debug!(event = name, "Log sink not available, event dropped");
            metrics::record_logged_event("skipped");
            return false;
        }

        let validated = match ValidatedEvent::new(name, payload) {
            Ok(validated) => validated,
            Err(err) => {
                warn!(event = name, "Event rejected: {}", err);
                metrics::record_logged_event("rejected");
                return false;
            }
        };

        let validated = self.attribute(validated);
        let event = self.build(&validated, timestamp);
        let event_name = event.event.clone();

        match self.send(&event).await {
            Ok(()) => {
                debug!(event = %event_name, "Event logged");
                metrics::record_logged_event("sent");
                true
            }
            Err(err) => {
                warn!(event = %event_name, "Failed to log event: {}", err);
                metrics::record_logged_event("failed");
                let failure = LoggingFailure {
                    timestamp: iso_timestamp(Utc::now()),
                    event: event_name,
                    error: err.to_string(),
                };
                if let Err(store_err) = history::push(self.session.storage(), failure) {
                    warn!("Failed to record logging error: {}", store_err);
                }
                false
            }
        }
    }

    /// Run `log_event` on a background task; callers never wait for it.
    /// Delivery is not guaranteed if the process exits first.
    pub fn spawn_event(
        self: &Arc<Self>,
        name: impl Into<String>,
        payload: EventPayload,
    ) -> JoinHandle<bool> {
        let logger = Arc::clone(self);
        let name = name.into();
        tokio::spawn(async move { logger.log_event(&name, payload).await })
    }

    /// Probe the sink and report the launch on a background task, so the
    /// first screen never waits on the network. Events logged before the
    /// probe finishes are dropped by the availability guard.
    pub fn spawn_open(self: &Arc<Self>) -> JoinHandle<bool> {
        let logger = Arc::clone(self);
        tokio::spawn(async move {
            if logger.probe().await != Availability::Available {
                return false;
            }
            logger.log_app_open().await
        })
    }

    pub async fn log_app_open(&self) -> bool {
        let payload = EventPayload::Launch {
            start_param: self.session.launch().start_param().map(str::to_string),
            launch_actions: self.session.launch_actions().len(),
        };
        self.log_event(event::APP_OPENED, payload).await
    }

    pub async fn log_app_close(&self) -> bool {
        let payload = EventPayload::Close {
            session_seconds: (Utc::now() - self.session.started_at()).num_seconds(),
        };
        self.log_event(event::APP_CLOSED, payload).await
    }

    pub async fn log_user_action(&self, action: &str, data: EventPayload) -> bool {
        self.log_event(&EventName::user_action(action), data).await
    }

    pub fn error_history(&self) -> Vec<LoggingFailure> {
        history::load(self.session.storage())
    }

    pub fn clear_error_history(&self) -> Result<()> {
        history::clear(self.session.storage())
    }

    /// With neither an id nor a username the requested event is replaced,
    /// once, by the diagnostic event carrying the original name and payload.
    fn attribute(&self, validated: ValidatedEvent) -> ValidatedEvent {
        let attributable =
            self.session.identity().is_some() || self.session.fallback_username().is_some();
        if attributable || validated.name == EventName::IdentityUnresolved {
            return validated;
        }

        ValidatedEvent {
            name: EventName::IdentityUnresolved,
            payload: EventPayload::Diagnostic {
                original_event: validated.name.to_string(),
                error: "user identity could not be resolved".to_string(),
                original_payload: Box::new(validated.payload),
            },
        }
    }

    fn build(&self, validated: &ValidatedEvent, timestamp: Option<DateTime<Utc>>) -> LogEvent {
        let identity = self.session.identity();
        let launch = self.session.launch();

        let mut data: Map<String, Value> = validated.payload.to_fields();
        data.insert("schemaVersion".into(), Value::from(SCHEMA_VERSION));

        if let Some(locale) = self.session.locale() {
            data.insert("language".into(), Value::String(locale));
        }
        let device = identity
            .and_then(|i| i.device.clone())
            .unwrap_or_else(|| classify_device(&launch.user_agent).to_string());
        data.insert("device".into(), Value::String(device));
        if !launch.user_agent.is_empty() {
            data.insert("userAgent".into(), Value::String(launch.user_agent.clone()));
        }
        if let Some(platform) = launch.platform() {
            data.insert("platform".into(), Value::String(platform.to_string()));
        }
        if let Some(identity) = identity {
            data.insert(
                "identitySource".into(),
                Value::String(identity.source.to_string()),
            );
            if let Some(source) = &identity.traffic_source {
                data.insert("trafficSource".into(), Value::String(source.clone()));
            }
        }

        LogEvent {
            event: validated.name.to_string(),
            user_id: identity.map(|i| i.id.clone()),
            username: match identity {
                Some(identity) => identity.username.clone(),
                None => self.session.fallback_username().map(str::to_string),
            },
            timestamp: iso_timestamp(timestamp.unwrap_or_else(Utc::now)),
            additional_data: Some(data),
        }
    }

    async fn send(&self, event: &LogEvent) -> Result<()> {
        let response = self.http.post(&self.endpoint).json(event).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::LogSink(format!(
                "Logging failed with HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        Ok(())
    }
}
