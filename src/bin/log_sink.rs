//! Log sink server binary.
//!
//! Usage:
//!   cargo run --bin log_sink                      # listen on sink.listen from config
//!   cargo run --bin log_sink -- --listen 0.0.0.0:8787

use clap::Parser;
use dotenvy::dotenv;
use ellie_miniapp::{commands, Config};

#[derive(Parser, Debug)]
#[command(name = "log_sink")]
#[command(about = "Receive mini-app events and append them to Google Sheets or CSV")]
struct Args {
    /// Listen address, overrides sink.listen from config
    #[arg(short, long, env = "ELLIE_SINK_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    commands::serve_run(&Config::new(), args.listen).await
}
