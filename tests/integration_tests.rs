//! Integration tests for ellie_miniapp
//!
//! A real log sink is bound on a loopback port with the CSV backend and the
//! client side talks to it over HTTP.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ellie_miniapp::docstore::{DocumentStore, FileDocumentStore, GameResults};
use ellie_miniapp::game::GameSession;
use ellie_miniapp::sink::{self, CsvAppender, LogSink, SinkBackend, LOG_PATH};
use ellie_miniapp::{
    Availability, EventLogger, EventPayload, KeyValueStorage, LaunchContext, MemoryStorage,
    SessionContext,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";

struct RunningSink {
    endpoint: String,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl RunningSink {
    async fn start(backend: SinkBackend) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(sink::serve_listener(
            listener,
            Arc::new(LogSink::new(backend)),
            async move {
                let _ = stopped.await;
            },
        ));
        Self {
            endpoint: format!("http://{}{}", addr, LOG_PATH),
            stop,
            task,
        }
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap();
    }
}

fn csv_backend(dir: &Path) -> (SinkBackend, PathBuf) {
    let path = dir.join("events.csv");
    (SinkBackend::Csv(CsvAppender::new(&path)), path)
}

fn session(query: &str) -> Arc<SessionContext> {
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
    let launch = LaunchContext::default()
        .with_query(query)
        .with_user_agent(IPHONE_UA)
        .with_locale("ru-RU");
    Arc::new(SessionContext::start(launch, storage))
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ellie_miniapp::sink::row::COLUMNS);
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

// ============================================================================
// Logger -> sink -> CSV
// ============================================================================

#[tokio::test]
async fn test_logged_event_lands_in_csv() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, csv_path) = csv_backend(dir.path());
    let sink = RunningSink::start(backend).await;

    let logger = EventLogger::new(
        sink.endpoint.clone(),
        session("a_userId=42&b_username=kate&e_source=ads"),
    )
    .unwrap();
    assert_eq!(logger.probe().await, Availability::Available);
    assert!(logger.log_app_open().await);
    assert!(
        logger
            .log_user_action(
                "choice",
                EventPayload::Choice {
                    stage_id: "stage1".into(),
                    option_text: "Привет".into(),
                    score: Some(7),
                },
            )
            .await
    );
    sink.shutdown().await;

    let rows = read_rows(&csv_path);
    assert_eq!(rows.len(), 2);

    let open = &rows[0];
    assert_eq!(open[1], "42");
    assert_eq!(open[2], "kate");
    assert_eq!(open[3], "ru-RU");
    assert_eq!(open[4], "iOS");
    assert_eq!(open[5], "app_opened");
    assert_eq!(open[6], "mini_app");

    let choice = &rows[1];
    assert_eq!(choice[5], "user_action:choice");
    let extra: serde_json::Value = serde_json::from_str(&choice[7]).unwrap();
    assert_eq!(extra["stageId"], "stage1");
    assert_eq!(extra["score"], 7);
    assert!(extra.get("userAgent").is_none());
    assert!(logger.error_history().is_empty());
}

#[tokio::test]
async fn test_unresolved_identity_logs_diagnostic_row() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, csv_path) = csv_backend(dir.path());
    let sink = RunningSink::start(backend).await;

    let logger = EventLogger::new(sink.endpoint.clone(), session("")).unwrap();
    logger.probe().await;
    assert!(logger.log_app_open().await);
    sink.shutdown().await;

    let rows = read_rows(&csv_path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], "unknown");
    assert_eq!(rows[0][5], "identity_unresolved");
    let extra: serde_json::Value = serde_json::from_str(&rows[0][7]).unwrap();
    assert_eq!(extra["originalEvent"], "app_opened");
}

#[tokio::test]
async fn test_unconfigured_sink_failure_is_recorded() {
    let sink =
        RunningSink::start(SinkBackend::Unconfigured("missing spreadsheet id".into())).await;

    let logger = EventLogger::new(sink.endpoint.clone(), session("a_userId=7")).unwrap();
    assert_eq!(logger.probe().await, Availability::Available);
    assert!(!logger.log_app_open().await);
    sink.shutdown().await;

    let history = logger.error_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event, "app_opened");
    assert!(history[0].error.contains("500"));

    logger.clear_error_history().unwrap();
    assert!(logger.error_history().is_empty());
}

#[tokio::test]
async fn test_unreachable_sink_drops_events_silently() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let logger = EventLogger::new(
        format!("http://{}{}", addr, LOG_PATH),
        session("a_userId=7"),
    )
    .unwrap();
    assert_eq!(logger.probe().await, Availability::Unavailable);
    assert!(!logger.log_app_open().await);
    assert!(logger.error_history().is_empty());
}

// ============================================================================
// Full game over HTTP with file-backed results
// ============================================================================

#[tokio::test]
async fn test_full_game_is_logged_and_stored() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, csv_path) = csv_backend(dir.path());
    let sink = RunningSink::start(backend).await;

    let logger = Arc::new(
        EventLogger::new(
            sink.endpoint.clone(),
            session("a_userId=42&b_username=kate&d_device=Android"),
        )
        .unwrap(),
    );
    logger.probe().await;

    let store: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::new(dir.path().join("docs")));
    let results = GameResults::new(Arc::clone(&store));
    let mut game = GameSession::new(Arc::clone(&logger), Some(results.clone()));

    for _ in 0..3 {
        game.choose(1).unwrap();
        game.advance().unwrap();
    }
    game.choose(1).unwrap();
    assert!(game.engine().is_finished());
    game.open_offer().unwrap();
    assert_eq!(game.flush().await, 10);
    sink.shutdown().await;

    let rows = read_rows(&csv_path);
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|row| row[4] == "Android"));
    assert_eq!(
        rows.iter().filter(|row| row[5] == "game_completed").count(),
        1
    );

    let stored = results.for_user("42").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].total_score, 8 + 7 + 7);
    assert_eq!(stored[0].stages.len(), 4);

    let reopened = GameResults::new(Arc::new(FileDocumentStore::new(dir.path().join("docs"))));
    let top = reopened.top_scores().unwrap();
    assert_eq!(top[0].username, "kate");
}
