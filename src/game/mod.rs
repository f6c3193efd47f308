//! Ellie flirt-trainer game.

pub mod engine;
pub mod scenario;
pub mod session;

pub use engine::{ChatMessage, ChoiceOutcome, DialogueEngine, Speaker, Transition};
pub use scenario::{ellie, GameOption, Reply, Scenario, Stage, Tone, MAX_SCORE};
pub use session::{GameSession, DEFAULT_OFFER_URL};
