//! Run the log sink HTTP server until Ctrl+C.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::sink::{self, LogSink};

pub async fn run(config: &Config, listen: Option<String>) -> anyhow::Result<()> {
    let mut sink_config = config.sink.clone();
    if let Some(listen) = listen {
        sink_config.listen = listen;
    }
    let addr = sink_config.listen_addr()?;

    let sink = Arc::new(LogSink::from_config(&sink_config));

    info!(%addr, backend = sink.backend().label(), "Starting log sink");
    sink::serve(addr, sink, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
