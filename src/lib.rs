//! Ellie Telegram mini-app library
//!
//! This library provides:
//! - Identity resolution for mini-app launches (platform bridge, launch link,
//!   cached parameters) with a single resolution per session
//! - Event logging to an HTTP log sink with availability probing and a
//!   bounded failure history
//! - The log sink server itself, appending rows to Google Sheets or CSV
//! - A small document store for game results and user settings
//! - The Ellie flirt-trainer dialogue game

pub mod config;
pub mod device;
pub mod docstore;
pub mod error;
pub mod game;
pub mod identity;
pub mod logger;
pub mod metrics;
pub mod session;
pub mod sink;
pub mod storage;

// Re-export common types
pub use config::Config;
pub use device::{classify_device, DeviceClass};
pub use error::{Error, Result};
pub use identity::{Identity, IdentityResolver, IdentitySource, UserId};
pub use logger::{Availability, EventLogger, EventPayload};
pub use session::{LaunchContext, SessionContext, WebAppBridge, WebAppUser};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
