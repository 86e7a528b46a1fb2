use std::sync::Arc;

use hb_analytics_relay::adapter::AnalyticsAdapter;
use hb_analytics_relay::config::Config;
use hb_analytics_relay::event_loop::EventLoop;
use hb_analytics_relay::transport::HttpTransport;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Exceptional init failure: log and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("HB_ANALYTICS_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid HB_ANALYTICS_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown requested");
    cancel.cancel();
}

// One cooperative loop: dispatch, idle flushes and sends never run in parallel.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));

    let transport = Arc::new(
        HttpTransport::new().unwrap_or_else(|e| fatal("failed to build HTTP transport", &e)),
    );

    let mut adapter = AnalyticsAdapter::new(Arc::clone(&transport));
    // Fails closed: the service keeps accepting events and drops them.
    if let Err(err) = adapter.enable(&config.options, config.queue_ttl) {
        error!(%err, "analytics adapter not enabled");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let mut event_loop = EventLoop::new(adapter, &config, cancel)
        .await
        .unwrap_or_else(|e| fatal("failed to start event loop", &e));

    let result = event_loop.run().await;

    if !transport.drain(config.shutdown_grace).await {
        warn!("abandoned in-flight deliveries at shutdown");
    }

    if let Err(e) = result {
        error!(%e, "runtime error");
        std::process::exit(1);
    }
}
