//! Dialogue state machine: transcript, score and stage progression.

use std::collections::BTreeMap;

use super::scenario::{ellie, Scenario, Stage, Tone, MAX_SCORE};
use crate::docstore::StageChoice;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Ellie,
    Player,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatMessage {
    fn ellie(text: &str) -> Self {
        Self {
            speaker: Speaker::Ellie,
            text: text.to_string(),
        }
    }

    fn player(text: &str) -> Self {
        Self {
            speaker: Speaker::Player,
            text: text.to_string(),
        }
    }
}

/// What happened after a choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOutcome {
    pub stage_id: &'static str,
    pub option_text: &'static str,
    pub reply: &'static str,
    pub tone: Tone,
    pub score: Option<i32>,
    /// Set when the engine moved on by itself (next stage is the last one).
    pub auto_advanced_to: Option<&'static str>,
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: &'static str,
    pub to: &'static str,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct DialogueEngine {
    scenario: &'static Scenario,
    current: &'static Stage,
    transcript: Vec<ChatMessage>,
    total_score: i32,
    choices: BTreeMap<String, StageChoice>,
    awaiting_next: bool,
    finished: bool,
}

impl DialogueEngine {
    pub fn new(scenario: &'static Scenario) -> Result<Self> {
        let current = scenario.stage(scenario.initial).ok_or_else(|| {
            Error::Game(format!("initial stage '{}' not found", scenario.initial))
        })?;

        Ok(Self {
            scenario,
            current,
            transcript: vec![ChatMessage::ellie(current.message)],
            total_score: 0,
            choices: BTreeMap::new(),
            awaiting_next: false,
            finished: current.id == scenario.final_stage,
        })
    }

    /// Engine over the built-in Ellie scenario.
    pub fn ellie() -> Self {
        let scenario = ellie();
        let current = &scenario.stages[0];
        Self {
            scenario,
            current,
            transcript: vec![ChatMessage::ellie(current.message)],
            total_score: 0,
            choices: BTreeMap::new(),
            awaiting_next: false,
            finished: false,
        }
    }

    pub fn current_stage(&self) -> &'static Stage {
        self.current
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn total_score(&self) -> i32 {
        self.total_score
    }

    pub fn max_score(&self) -> i32 {
        MAX_SCORE
    }

    /// Score bar fill, capped at 100.
    pub fn progress_percent(&self) -> f64 {
        (f64::from(self.total_score) / f64::from(MAX_SCORE) * 100.0).min(100.0)
    }

    pub fn is_awaiting_next(&self) -> bool {
        self.awaiting_next
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Choice made at each stage so far, keyed by stage id.
    pub fn choices(&self) -> &BTreeMap<String, StageChoice> {
        &self.choices
    }

    pub fn choose(&mut self, index: usize) -> Result<ChoiceOutcome> {
        if self.finished {
            return Err(Error::Game("the game is already finished".to_string()));
        }
        if self.awaiting_next {
            return Err(Error::Game(format!(
                "stage '{}' already answered, advance first",
                self.current.id
            )));
        }
        let stage = self.current;
        let option = stage.options.get(index).ok_or_else(|| {
            Error::Game(format!(
                "option {} out of range for stage '{}' ({} options)",
                index,
                stage.id,
                stage.options.len()
            ))
        })?;

        self.transcript.push(ChatMessage::player(option.text));
        self.transcript.push(ChatMessage::ellie(option.reply.text));
        if let Some(score) = option.reply.score {
            self.total_score += score;
        }
        self.choices.insert(
            stage.id.to_string(),
            StageChoice {
                selected_option_text: option.text.to_string(),
                score: option.reply.score.unwrap_or(0),
            },
        );

        let mut outcome = ChoiceOutcome {
            stage_id: stage.id,
            option_text: option.text,
            reply: option.reply.text,
            tone: option.reply.tone,
            score: option.reply.score,
            auto_advanced_to: None,
            finished: false,
        };

        match stage.next {
            Some(next) if next == self.scenario.final_stage => {
                self.awaiting_next = true;
                let transition = self.advance()?;
                outcome.auto_advanced_to = Some(transition.to);
                outcome.finished = transition.finished;
            }
            Some(_) => self.awaiting_next = true,
            None => self.finished = true,
        }
        Ok(outcome)
    }

    /// Move to the next stage after an answered one.
    pub fn advance(&mut self) -> Result<Transition> {
        if !self.awaiting_next {
            return Err(Error::Game(format!(
                "stage '{}' has not been answered yet",
                self.current.id
            )));
        }
        let from = self.current;
        let next_id = from
            .next
            .ok_or_else(|| Error::Game(format!("stage '{}' has no next stage", from.id)))?;
        let next = self
            .scenario
            .stage(next_id)
            .ok_or_else(|| Error::Game(format!("stage '{}' not found", next_id)))?;

        self.current = next;
        self.awaiting_next = false;
        self.transcript.push(ChatMessage::ellie(next.message));
        self.finished = next.id == self.scenario.final_stage;

        Ok(Transition {
            from: from.id,
            to: next.id,
            finished: self.finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_starts_with_welcome() {
        let engine = DialogueEngine::ellie();
        assert_eq!(engine.current_stage().id, "welcome");
        assert_eq!(engine.transcript().len(), 1);
        assert_eq!(engine.transcript()[0].speaker, Speaker::Ellie);
        assert!(!engine.is_finished());
    }

    #[test]
    fn full_playthrough() {
        let mut engine = DialogueEngine::ellie();

        let outcome = engine.choose(0).unwrap();
        assert_eq!(outcome.score, None);
        assert!(engine.is_awaiting_next());
        assert_eq!(engine.advance().unwrap().to, "stage1");

        assert_eq!(engine.choose(1).unwrap().score, Some(8));
        engine.advance().unwrap();
        assert_eq!(engine.choose(0).unwrap().score, Some(8));
        engine.advance().unwrap();

        let outcome = engine.choose(2).unwrap();
        assert_eq!(outcome.score, Some(9));
        assert_eq!(outcome.auto_advanced_to, Some("final"));
        assert!(outcome.finished);
        assert!(engine.is_finished());

        assert_eq!(engine.total_score(), 25);
        assert_eq!(engine.current_stage().id, "final");
        // welcome + 4 x (player, ellie) + 3 stage messages + final
        assert_eq!(engine.transcript().len(), 1 + 8 + 3 + 1);
        assert_eq!(engine.choices().len(), 4);
        assert_eq!(engine.choices()["stage3"].score, 9);
    }

    #[test]
    fn choosing_twice_without_advance_fails() {
        let mut engine = DialogueEngine::ellie();
        engine.choose(0).unwrap();
        assert!(matches!(engine.choose(0), Err(Error::Game(_))));
    }

    #[test]
    fn out_of_range_and_after_finish_fail() {
        let mut engine = DialogueEngine::ellie();
        assert!(matches!(engine.choose(9), Err(Error::Game(_))));
        assert!(engine.advance().is_err());

        for pick in [0, 0, 0] {
            engine.choose(pick).unwrap();
            engine.advance().unwrap();
        }
        engine.choose(0).unwrap();
        assert!(engine.is_finished());
        assert!(matches!(engine.choose(0), Err(Error::Game(_))));
    }

    #[test]
    fn progress_is_capped() {
        let mut engine = DialogueEngine::ellie();
        assert_eq!(engine.progress_percent(), 0.0);
        engine.total_score = 45;
        assert_eq!(engine.progress_percent(), 100.0);
        engine.total_score = 15;
        assert_eq!(engine.progress_percent(), 50.0);
    }

    #[test]
    fn new_rejects_missing_initial_stage() {
        static BROKEN: Scenario = Scenario {
            stages: &[],
            initial: "nowhere",
            final_stage: "final",
        };
        assert!(DialogueEngine::new(&BROKEN).is_err());
    }
}
