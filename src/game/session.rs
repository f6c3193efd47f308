//! A played game wired to telemetry and result persistence.
//!
//! Every step is reported through the event logger on a background task, so
//! play never waits on the network. Call [`GameSession::flush`] before exit
//! to give queued events a chance to be delivered.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{ChoiceOutcome, DialogueEngine, Transition};
use crate::device::classify_device;
use crate::docstore::{DeviceInfo, GameResult, GameResults};
use crate::logger::event::GAME_COMPLETED;
use crate::logger::{iso_timestamp, EventLogger, EventName, EventPayload};
use crate::{Error, Result};

pub const DEFAULT_OFFER_URL: &str = "https://example.com/dating";

pub const ACTION_CHOICE: &str = "choice";
pub const ACTION_NEXT_STAGE: &str = "next_stage";
pub const ACTION_OFFER_OPENED: &str = "offer_opened";

pub struct GameSession {
    engine: DialogueEngine,
    logger: Arc<EventLogger>,
    results: Option<GameResults>,
    offer_url: String,
    saved_result_id: Option<String>,
    pending: Vec<JoinHandle<bool>>,
}

impl GameSession {
    pub fn new(logger: Arc<EventLogger>, results: Option<GameResults>) -> Self {
        Self {
            engine: DialogueEngine::ellie(),
            logger,
            results,
            offer_url: DEFAULT_OFFER_URL.to_string(),
            saved_result_id: None,
            pending: Vec::new(),
        }
    }

    pub fn with_offer_url(mut self, url: impl Into<String>) -> Self {
        self.offer_url = url.into();
        self
    }

    pub fn engine(&self) -> &DialogueEngine {
        &self.engine
    }

    pub fn logger(&self) -> &Arc<EventLogger> {
        &self.logger
    }

    pub fn saved_result_id(&self) -> Option<&str> {
        self.saved_result_id.as_deref()
    }

    fn emit(&mut self, name: String, payload: EventPayload) {
        self.pending.push(self.logger.spawn_event(name, payload));
    }

    pub fn choose(&mut self, index: usize) -> Result<ChoiceOutcome> {
        let outcome = self.engine.choose(index)?;
        self.emit(
            EventName::user_action(ACTION_CHOICE),
            EventPayload::Choice {
                stage_id: outcome.stage_id.to_string(),
                option_text: outcome.option_text.to_string(),
                score: outcome.score,
            },
        );
        if let Some(to) = outcome.auto_advanced_to {
            self.emit_navigation(outcome.stage_id, to);
        }
        if outcome.finished {
            self.complete();
        }
        Ok(outcome)
    }

    pub fn advance(&mut self) -> Result<Transition> {
        let transition = self.engine.advance()?;
        self.emit_navigation(transition.from, transition.to);
        if transition.finished {
            self.complete();
        }
        Ok(transition)
    }

    /// Report the offer link being opened and return the URL to open.
    pub fn open_offer(&mut self) -> Result<String> {
        if !self.engine.is_finished() {
            return Err(Error::Game(
                "the offer is only available after the game".to_string(),
            ));
        }
        self.emit(
            EventName::user_action(ACTION_OFFER_OPENED),
            EventPayload::Link {
                url: self.offer_url.clone(),
            },
        );
        Ok(self.offer_url.clone())
    }

    /// Wait for every queued event; returns how many were delivered.
    pub async fn flush(&mut self) -> usize {
        let mut delivered = 0;
        for handle in self.pending.drain(..) {
            match handle.await {
                Ok(true) => delivered += 1,
                Ok(false) => {}
                Err(err) => warn!("Event task failed: {}", err),
            }
        }
        delivered
    }

    fn emit_navigation(&mut self, from: &str, to: &str) {
        self.emit(
            EventName::user_action(ACTION_NEXT_STAGE),
            EventPayload::Navigation {
                from_stage: from.to_string(),
                to_stage: to.to_string(),
            },
        );
    }

    fn complete(&mut self) {
        info!(
            score = self.engine.total_score(),
            max = self.engine.max_score(),
            "Game completed"
        );
        self.emit(
            GAME_COMPLETED.to_string(),
            EventPayload::GameResult {
                total_score: self.engine.total_score(),
                max_score: self.engine.max_score(),
                stages_completed: self.engine.choices().len(),
            },
        );

        let Some(result) = self.build_result() else {
            debug!("No resolved identity, game result not stored");
            return;
        };
        let Some(results) = &self.results else {
            return;
        };
        match results.save(&result) {
            Ok(id) => {
                info!(%id, user_id = %result.user_id, "Game result stored");
                self.saved_result_id = Some(id);
            }
            Err(err) => warn!("Failed to store game result: {}", err),
        }
    }

    fn build_result(&self) -> Option<GameResult> {
        let session = self.logger.session();
        let identity = session.identity()?;
        let launch = session.launch();

        let device = identity
            .device
            .clone()
            .unwrap_or_else(|| classify_device(&launch.user_agent).to_string());

        Some(GameResult {
            id: None,
            user_id: identity.id.to_string(),
            username: identity.username.clone(),
            total_score: self.engine.total_score(),
            stages: self.engine.choices().clone(),
            created_at: iso_timestamp(Utc::now()),
            device_info: Some(DeviceInfo {
                country: session.locale().unwrap_or_else(|| "unknown".to_string()),
                device,
                platform: launch.platform().unwrap_or("unknown").to_string(),
            }),
            source: identity.traffic_source.clone(),
            actions: session.launch_actions(),
        })
    }
}
