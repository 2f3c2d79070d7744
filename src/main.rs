//! jobwatch binary entrypoint.
//! Wires config, metrics, the listing source, the Telegram transport, and
//! the monitor session, then serves bot commands until the process dies.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobwatch::bot;
use jobwatch::config::{load_selectors_default, Config};
use jobwatch::fetch::WebListingSource;
use jobwatch::metrics::Metrics;
use jobwatch::monitor::{MonitorCfg, MonitorHandle};
use jobwatch::notify::TelegramNotifier;
use jobwatch::telegram::TelegramClient;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobwatch=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the vars come from the real env.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Missing credentials abort here, before any loop starts.
    let cfg = Config::from_env()?;
    let selectors = load_selectors_default().context("loading selectors")?;

    let metrics = Metrics::init();
    let listener = tokio::net::TcpListener::bind(&cfg.http_addr)
        .await
        .with_context(|| format!("binding {}", cfg.http_addr))?;
    tracing::info!(addr = %cfg.http_addr, "health/metrics listening");
    tokio::spawn(axum::serve(listener, metrics.router()).into_future());

    let source = WebListingSource::new(&cfg.webdriver_url, &cfg.list_url, selectors)
        .with_max_items(cfg.max_list_items)
        .with_timeout(cfg.fetch_timeout_secs)
        .with_headless(cfg.headless);

    let api = TelegramClient::new(&cfg.bot_token);
    let notifier = TelegramNotifier::new(api.clone());

    let monitor = MonitorHandle::new(
        MonitorCfg {
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            seen_cap: cfg.seen_cap,
            ..MonitorCfg::default()
        },
        Arc::new(source),
        Arc::new(notifier),
    );

    tracing::info!(list_url = %cfg.list_url, "jobwatch ready, waiting for /start");
    bot::run_command_loop(api, monitor, cfg.owner_chat_id).await
}
