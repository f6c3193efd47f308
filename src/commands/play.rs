//! Play the Ellie game in the terminal
//!
//! The launch context is assembled from the command line the same way the
//! host would hand it to the mini-app: a launch link, an optional raw
//! init-data string, the user agent and the locale. Everything after that
//! goes through the regular session, logger and document store.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::Config;
use crate::docstore::{DocumentStore, FileDocumentStore, GameResults, UserSettingsRepo};
use crate::game::{GameSession, Speaker, DEFAULT_OFFER_URL};
use crate::logger::EventLogger;
use crate::session::{LaunchContext, SessionContext, WebAppBridge};
use crate::storage::{FileStorage, KeyValueStorage};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) ellie_miniapp";

#[derive(Debug, Clone, Default)]
pub struct PlayArgs {
    /// Launch link or bare query string.
    pub url: Option<String>,
    /// Raw Telegram init-data string.
    pub init_data: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
    pub locale: String,
    pub offer_url: Option<String>,
}

impl PlayArgs {
    pub fn launch_context(&self) -> crate::Result<LaunchContext> {
        let mut launch = match &self.url {
            Some(url) => LaunchContext::from_url(url)?,
            None => LaunchContext::default(),
        };

        if self.init_data.is_some() || self.platform.is_some() {
            let mut bridge = match &self.init_data {
                Some(raw) => WebAppBridge::from_raw_init_data(raw.clone()),
                None => WebAppBridge::default(),
            };
            bridge.platform = self.platform.clone();
            launch = launch.with_bridge(bridge);
        }

        Ok(launch
            .with_user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .with_locale(&self.locale))
    }
}

pub async fn run(config: &Config, args: PlayArgs) -> anyhow::Result<()> {
    let storage: Arc<dyn KeyValueStorage> =
        Arc::new(FileStorage::new(&config.logging.storage_path));
    let session = Arc::new(SessionContext::start(args.launch_context()?, storage));

    match session.identity() {
        Some(identity) => info!(
            user_id = %identity.id,
            source = %identity.source,
            "Player identified"
        ),
        None => warn!("Player identity could not be resolved, results will not be stored"),
    }

    let logger = Arc::new(EventLogger::with_timeout(
        config.logging.endpoint.clone(),
        Arc::clone(&session),
        config.logging.timeout,
    )?);
    let opened = logger.spawn_open();

    let store: Arc<dyn DocumentStore> = Arc::new(FileDocumentStore::new(&config.documents_dir));
    touch_settings(&session, &store);

    let offer_url = args
        .offer_url
        .or_else(|| config.offer_url.clone())
        .unwrap_or_else(|| DEFAULT_OFFER_URL.to_string());
    let mut game = GameSession::new(Arc::clone(&logger), Some(GameResults::new(store)))
        .with_offer_url(offer_url);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let finished = play_loop(&mut game, stdin, &mut stdout).await?;

    if finished {
        let url = game.open_offer()?;
        writeln!(stdout, "\n💘 Знакомься по-настоящему: {}", url)?;
    }

    if let Err(err) = opened.await {
        warn!("Open event task failed: {}", err);
    }
    let delivered = game.flush().await;
    logger.log_app_close().await;
    info!(delivered, finished, "Session closed");
    Ok(())
}

/// Refresh the player's last visit, creating default settings on first run.
fn touch_settings(session: &SessionContext, store: &Arc<dyn DocumentStore>) {
    let Some(identity) = session.identity() else {
        return;
    };
    let repo = UserSettingsRepo::new(Arc::clone(store));
    let locale = session.locale().unwrap_or_default();
    let result = repo
        .load_or_default(
            &identity.id.to_string(),
            identity.username.as_deref(),
            &locale,
        )
        .and_then(|mut settings| repo.save(&mut settings));
    if let Err(err) = result {
        warn!("Failed to update user settings: {}", err);
    }
}

/// Drive the game from line input. Returns `true` when the final stage was
/// reached, `false` when the player quit or input ended.
pub async fn play_loop<R, W>(game: &mut GameSession, input: R, out: &mut W) -> anyhow::Result<bool>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut shown = 0;

    loop {
        shown = render_transcript(game, shown, out)?;
        let engine = game.engine();
        if engine.is_finished() {
            writeln!(out, "\nИтог: {}/{}", engine.total_score(), engine.max_score())?;
            return Ok(true);
        }

        let awaiting = engine.is_awaiting_next();
        let option_count = engine.current_stage().options.len();
        if awaiting {
            writeln!(out, "[Enter] дальше, q выход")?;
        } else {
            for (i, option) in engine.current_stage().options.iter().enumerate() {
                match option.emoji {
                    Some(emoji) => writeln!(out, "  {}. {} {}", i + 1, emoji, option.text)?,
                    None => writeln!(out, "  {}. {}", i + 1, option.text)?,
                }
            }
        }
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            return Ok(false);
        }

        if awaiting {
            game.advance()?;
            continue;
        }

        match line.parse::<usize>() {
            Ok(n) if (1..=option_count).contains(&n) => {
                let outcome = game.choose(n - 1)?;
                if outcome.score.is_some() {
                    let engine = game.engine();
                    writeln!(
                        out,
                        "Очки: {}/{} ({:.0}%)",
                        engine.total_score(),
                        engine.max_score(),
                        engine.progress_percent()
                    )?;
                }
            }
            _ => writeln!(out, "Введите номер варианта от 1 до {}", option_count)?,
        }
    }
}

fn render_transcript<W: Write>(
    game: &GameSession,
    shown: usize,
    out: &mut W,
) -> std::io::Result<usize> {
    let transcript = game.engine().transcript();
    for message in transcript.iter().skip(shown) {
        match message.speaker {
            Speaker::Ellie => writeln!(out, "\nEllie: {}", message.text)?,
            Speaker::Player => writeln!(out, "\nВы: {}", message.text)?,
        }
    }
    Ok(transcript.len())
}
