//! Finished games, written once at completion and never mutated.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{encode, Direction, DocumentStore, FilterOp, Query};
use crate::identity::UserAction;
use crate::Result;

pub const COLLECTION: &str = "gameResults";
pub const RECENT_RESULTS_LIMIT: usize = 5;
pub const TOP_SCORES_LIMIT: usize = 10;
/// Shown on the leaderboard for results without a username.
pub const ANONYMOUS_PLAYER: &str = "Неизвестный";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageChoice {
    pub selected_option_text: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub country: String,
    pub device: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub total_score: i32,
    pub stages: BTreeMap<String, StageChoice>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<UserAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopScore {
    pub username: String,
    pub score: i32,
}

/// Mean total score, `0.0` for no games.
pub fn average_score(results: &[GameResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let sum: i64 = results.iter().map(|r| i64::from(r.total_score)).sum();
    sum as f64 / results.len() as f64
}

#[derive(Clone)]
pub struct GameResults {
    store: Arc<dyn DocumentStore>,
}

impl GameResults {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Store a result and return the assigned document id.
    pub fn save(&self, result: &GameResult) -> Result<String> {
        self.store.add(COLLECTION, encode(result)?)
    }

    /// Latest results of one user, newest first.
    pub fn for_user(&self, user_id: &str) -> Result<Vec<GameResult>> {
        let query = Query::new()
            .filter("userId", FilterOp::Eq, user_id)
            .order_by("createdAt", Direction::Desc)
            .limit(RECENT_RESULTS_LIMIT);
        self.store
            .query(COLLECTION, &query)?
            .into_iter()
            .map(|doc| doc.decode())
            .collect()
    }

    /// Highest totals across all players.
    pub fn top_scores(&self) -> Result<Vec<TopScore>> {
        let query = Query::new()
            .order_by("totalScore", Direction::Desc)
            .limit(TOP_SCORES_LIMIT);
        self.store
            .query(COLLECTION, &query)?
            .into_iter()
            .map(|doc| {
                let result: GameResult = doc.decode()?;
                Ok(TopScore {
                    username: result
                        .username
                        .unwrap_or_else(|| ANONYMOUS_PLAYER.to_string()),
                    score: result.total_score,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::{FileDocumentStore, MemoryDocumentStore};

    fn result(user_id: &str, score: i32, created_at: &str) -> GameResult {
        let mut stages = BTreeMap::new();
        stages.insert(
            "stage1".to_string(),
            StageChoice {
                selected_option_text: "Привет!".to_string(),
                score,
            },
        );
        GameResult {
            id: None,
            user_id: user_id.to_string(),
            username: Some(format!("user{}", user_id)),
            total_score: score,
            stages,
            created_at: created_at.to_string(),
            device_info: Some(DeviceInfo {
                country: "ru-RU".into(),
                device: "Android".into(),
                platform: "android".into(),
            }),
            source: Some("ads".into()),
            actions: vec![UserAction {
                kind: "visit".into(),
                timestamp: "2024-01-01T00:00:00Z".into(),
                data: None,
            }],
        }
    }

    #[test]
    fn saved_result_round_trips_through_user_query() {
        let dir = tempfile::tempdir().unwrap();
        let repo = GameResults::new(Arc::new(FileDocumentStore::new(dir.path())));
        let original = result("42", 25, "2024-03-01T10:00:00.000Z");

        let id = repo.save(&original).unwrap();
        let found = repo.for_user("42").unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id.as_deref(), Some(id.as_str()));
        assert_eq!(
            GameResult {
                id: None,
                ..found[0].clone()
            },
            original
        );
    }

    #[test]
    fn for_user_returns_latest_five() {
        let repo = GameResults::new(Arc::new(MemoryDocumentStore::new()));
        for day in 1..=7 {
            repo.save(&result("1", day, &format!("2024-01-0{}T00:00:00.000Z", day)))
                .unwrap();
        }
        repo.save(&result("2", 30, "2024-02-01T00:00:00.000Z"))
            .unwrap();

        let recent = repo.for_user("1").unwrap();
        let scores: Vec<i32> = recent.iter().map(|r| r.total_score).collect();
        assert_eq!(scores, vec![7, 6, 5, 4, 3]);
        assert_eq!(average_score(&recent), 5.0);
    }

    #[test]
    fn leaderboard_orders_by_score_and_names_anonymous_players() {
        let repo = GameResults::new(Arc::new(MemoryDocumentStore::new()));
        for (user, score) in [("1", 10), ("2", 30), ("3", 20)] {
            repo.save(&result(user, score, "2024-01-01T00:00:00.000Z"))
                .unwrap();
        }
        let mut anonymous = result("4", 25, "2024-01-01T00:00:00.000Z");
        anonymous.username = None;
        repo.save(&anonymous).unwrap();

        let top = repo.top_scores().unwrap();
        assert_eq!(
            top,
            vec![
                TopScore { username: "user2".into(), score: 30 },
                TopScore { username: ANONYMOUS_PLAYER.into(), score: 25 },
                TopScore { username: "user3".into(), score: 20 },
                TopScore { username: "user1".into(), score: 10 },
            ]
        );
    }

    #[test]
    fn average_of_nothing_is_zero() {
        assert_eq!(average_score(&[]), 0.0);
    }
}
