use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use ellie_miniapp::{commands, metrics, Config};
use tracing::warn;

#[derive(Parser)]
#[command(name = "ellie_miniapp")]
#[command(about = "Ellie flirt trainer: game, event logging and log sink", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the log sink HTTP server
    Serve {
        /// Listen address, overrides sink.listen from config
        #[arg(short, long, env = "ELLIE_SINK_LISTEN")]
        listen: Option<String>,
    },

    /// Play the game in the terminal
    Play {
        /// Launch link or query string (e.g. "?a_userId=42&b_username=kate")
        #[arg(short, long)]
        url: Option<String>,

        /// Raw Telegram init data
        #[arg(long, env = "TG_INIT_DATA")]
        init_data: Option<String>,

        /// Host platform reported by the bridge (ios, android, tdesktop, ...)
        #[arg(long)]
        platform: Option<String>,

        /// User agent reported with every event
        #[arg(long)]
        user_agent: Option<String>,

        /// Locale, e.g. ru-RU
        #[arg(long, default_value = "ru-RU")]
        locale: String,

        /// Link shown after the game, overrides game.offer_url from config
        #[arg(long)]
        offer_url: Option<String>,
    },

    /// Show the leaderboard and a player's recent games
    Stats {
        /// Player id to show recent games for
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Show recorded log delivery failures
    Errors {
        /// Clear the history instead of printing it
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::Play { .. } => "play",
            Commands::Stats { .. } => "stats",
            Commands::Errors { .. } => "errors",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ellie_miniapp=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands) -> anyhow::Result<()> {
    let config = Config::new();

    match command {
        Commands::Serve { listen } => {
            commands::serve_run(&config, listen).await?;
        }
        Commands::Play {
            url,
            init_data,
            platform,
            user_agent,
            locale,
            offer_url,
        } => {
            let args = commands::PlayArgs {
                url,
                init_data,
                platform,
                user_agent,
                locale,
                offer_url,
            };
            commands::play_run(&config, args).await?;
        }
        Commands::Stats { user } => {
            commands::stats_run(&config, user.as_deref())?;
        }
        Commands::Errors { clear } => {
            commands::errors_run(&config, clear)?;
        }
    }

    Ok(())
}
