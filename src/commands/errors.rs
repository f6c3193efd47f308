//! Show or clear the recorded log delivery failures.

use std::fmt::Write as _;

use tracing::info;

use crate::config::Config;
use crate::logger::history::{self, LoggingFailure};
use crate::storage::FileStorage;

pub fn run(config: &Config, clear: bool) -> anyhow::Result<()> {
    let storage = FileStorage::new(&config.logging.storage_path);
    if clear {
        history::clear(&storage)?;
        info!(path = %storage.path().display(), "Logging error history cleared");
        return Ok(());
    }
    print!("{}", render(&history::load(&storage)));
    Ok(())
}

pub fn render(failures: &[LoggingFailure]) -> String {
    if failures.is_empty() {
        return "No logging errors recorded\n".to_string();
    }
    let mut out = String::new();
    for failure in failures {
        let _ = writeln!(out, "{}  {:<28} {}", failure.timestamp, failure.event, failure.error);
    }
    out
}
