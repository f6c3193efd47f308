//! Leaderboard and per-player history from stored game results.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::Config;
use crate::docstore::{average_score, DocumentStore, FileDocumentStore, GameResults};
use crate::game::MAX_SCORE;
use crate::Result;

pub fn run(config: &Config, user: Option<&str>) -> anyhow::Result<()> {
    let store: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::new(&config.documents_dir));
    print!("{}", render(&GameResults::new(store), user)?);
    Ok(())
}

pub fn render(results: &GameResults, user: Option<&str>) -> Result<String> {
    let mut out = String::new();

    if let Some(user_id) = user {
        let recent = results.for_user(user_id)?;
        let _ = writeln!(out, "Последние игры пользователя {}:", user_id);
        if recent.is_empty() {
            let _ = writeln!(out, "  нет сохранённых игр");
        }
        for result in &recent {
            let _ = writeln!(
                out,
                "  {}  {}/{}",
                result.created_at, result.total_score, MAX_SCORE
            );
        }
        let _ = writeln!(out, "Средний счёт: {:.1}\n", average_score(&recent));
    }

    let top = results.top_scores()?;
    let _ = writeln!(out, "🏆 Лучшие результаты:");
    if top.is_empty() {
        let _ = writeln!(out, "  пока никто не играл");
    }
    for (place, entry) in top.iter().enumerate() {
        let _ = writeln!(out, "  {:>2}. {:<24} {}", place + 1, entry.username, entry.score);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::{GameResult, MemoryDocumentStore};
    use std::collections::BTreeMap;

    fn game(user_id: &str, username: Option<&str>, score: i32, created_at: &str) -> GameResult {
        GameResult {
            id: None,
            user_id: user_id.to_string(),
            username: username.map(str::to_string),
            total_score: score,
            stages: BTreeMap::new(),
            created_at: created_at.to_string(),
            device_info: None,
            source: None,
            actions: Vec::new(),
        }
    }

    #[test]
    fn renders_history_and_leaderboard() {
        let results = GameResults::new(Arc::new(MemoryDocumentStore::new()));
        results
            .save(&game("1", Some("kate"), 20, "2024-05-01T10:00:00.000Z"))
            .unwrap();
        results
            .save(&game("1", Some("kate"), 24, "2024-05-02T10:00:00.000Z"))
            .unwrap();
        results
            .save(&game("2", None, 15, "2024-05-03T10:00:00.000Z"))
            .unwrap();

        let text = render(&results, Some("1")).unwrap();
        assert!(text.contains("2024-05-02T10:00:00.000Z  24/30"));
        assert!(text.contains("Средний счёт: 22.0"));
        assert!(text.contains("Неизвестный"));

        let kate = text.find("kate").unwrap();
        let anonymous = text.find("Неизвестный").unwrap();
        assert!(kate < anonymous);
    }

    #[test]
    fn empty_store() {
        let results = GameResults::new(Arc::new(MemoryDocumentStore::new()));
        let text = render(&results, Some("404")).unwrap();
        assert!(text.contains("нет сохранённых игр"));
        assert!(text.contains("пока никто не играл"));
        assert!(text.contains("Средний счёт: 0.0"));
    }
}
