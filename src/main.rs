use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sip2mqtt::{
    Bridge, Config, ConfigError, LogWriter, RsipSignaling, StatusPublisher, Subscribe, shutdown,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(ConfigError::Cli(e)) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(1) } else { ExitCode::SUCCESS };
        }
        Err(e) => {
            tracing::error!(label = e.as_label(), error = %e, "invalid configuration");
            return ExitCode::from(1);
        }
    };
    tracing::info!(config = ?cfg, "configuration loaded");

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let bridge = Bridge::builder(cfg.bridge.clone())
        .with_subscribers(subs)
        .build();
    let bus = bridge.bus().clone();

    let token = CancellationToken::new();
    let _signals = shutdown::spawn_listener(token.clone(), bus.clone());

    let publisher = StatusPublisher::connect(&cfg.mqtt, bus.clone());
    let signaling = RsipSignaling::new(cfg.sip.clone(), bus);

    match bridge.run(publisher, signaling, token).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(label = e.as_label(), error = %e, "bridge stopped with error");
            ExitCode::from(1)
        }
    }
}
