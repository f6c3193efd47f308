//! Terminal flirt trainer.

use clap::Parser;
use dotenvy::dotenv;
use ellie_miniapp::commands::{self, PlayArgs};
use ellie_miniapp::Config;

#[derive(Parser, Debug)]
#[command(name = "flirt_game")]
#[command(about = "Play the Ellie flirt trainer in the terminal")]
struct Args {
    /// Launch link or query string
    #[arg(short, long)]
    url: Option<String>,

    /// Raw Telegram init data
    #[arg(long, env = "TG_INIT_DATA")]
    init_data: Option<String>,

    #[arg(long, default_value = "ru-RU")]
    locale: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let play = PlayArgs {
        url: args.url,
        init_data: args.init_data,
        locale: args.locale,
        ..Default::default()
    };
    commands::play_run(&Config::new(), play).await
}
