// ███████╗ █████╗ ██████╗ ███╗   ██╗██╗███╗   ██╗ ██████╗ ███████╗
// ██╔════╝██╔══██╗██╔══██╗████╗  ██║██║████╗  ██║██╔════╝ ██╔════╝
// █████╗  ███████║██████╔╝██╔██╗ ██║██║██╔██╗ ██║██║  ███╗███████╗
// ██╔══╝  ██╔══██║██╔══██╗██║╚██╗██║██║██║╚██╗██║██║   ██║╚════██║
// ███████╗██║  ██║██║  ██║██║ ╚████║██║██║ ╚████║╚██████╔╝███████║
// ╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝  ╚═══╝╚═╝╚═╝  ╚═══╝ ╚═════╝ ╚══════╝
//
// H E R A L D   E N G I N E
//
// Quarterly-results notification engine for the Nifty 500.
// Rust + Tokio + four-strategy fuzzy matching + exactly-once-per-day
// delivery. All to make sure a Telegram channel hears about earnings
// announcements in order, once, every time.

mod config;
mod dedup;
mod matching;
mod metrics;
mod models;
mod notifier;
mod pipeline;
mod poller;
mod transport;

use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::dedup::DedupTracker;
use crate::matching::index::ReferenceIndex;
use crate::metrics::MetricsCollector;
use crate::notifier::{NotifyChannel, TelegramNotifier};
use crate::pipeline::DeliveryPipeline;
use crate::poller::ResultPoller;
use crate::transport::RetryingTransport;

fn print_banner() {
    let banner = r#"

    ╔══════════════════════════════════════════════════════════════════╗
    ║                                                                  ║
    ║            📊  E A R N I N G S   H E R A L D  📊                 ║
    ║                                                                  ║
    ║   Feed:     liveResults × {Large, Mid, Small}                    ║
    ║   Matching: Exact → Normalized → Substring → Token Overlap       ║
    ║   Delivery: summary, 3s of silence, document — in that order     ║
    ║   Dedup:    one notification per (company, variant) per day      ║
    ║   Channel:  Telegram Bot API                                     ║
    ║                                                                  ║
    ║   "When results drop, the channel knows. Exactly once."          ║
    ║                                                                  ║
    ╚══════════════════════════════════════════════════════════════════╝

    "#;
    println!("{}", banner);
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    print_banner();

    info!("📊 EARNINGS HERALD ENGINE initializing...");

    // Load and gate configuration. A bad config here means the process
    // does not start — there is no degraded mode for missing credentials.
    let config = Arc::new(Config::from_env());
    config.validate().context("startup configuration check failed")?;
    info!(
        feed = %config.feed_base_url,
        poll_secs = config.poll_interval.as_secs(),
        "✅ Configuration loaded and validated"
    );

    // The canonical company list. Built once, immutable, shared by
    // reference with everything that resolves names.
    let index = Arc::new(
        ReferenceIndex::from_csv_path(&config.canonical_list_path)
            .context("loading canonical company list")?,
    );
    info!(
        companies = index.len(),
        path = %config.canonical_list_path.display(),
        "✅ Reference index built"
    );

    // Per-day dedup state, reloaded across restarts.
    let tracker = DedupTracker::load(
        config.dedup_state_path.clone(),
        Local::now().date_naive(),
    )
    .await;
    info!(already_sent_today = tracker.len(), "✅ Dedup tracker online");

    // Metrics collector
    let metrics_collector = Arc::new(MetricsCollector::new());
    info!("✅ Metrics collector initialized");

    // The shared retry policy for every outbound call.
    let transport = RetryingTransport::new(
        config.max_retries,
        config.initial_backoff,
        config.max_backoff,
    );

    let notifier = TelegramNotifier::new(&config.telegram_bot_token, config.send_timeout)
        .context("building telegram notifier")?;

    // Announce ourselves to the channel. Best effort: a failed hello is
    // worth a warning, not a refusal to start.
    let hello = format!(
        "🤖 Earnings Herald Engine started\n📅 {}\n💾 {} notification(s) already sent today",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        tracker.len(),
    );
    if let Err(err) = notifier.send_text(&config.telegram_channel_id, &hello).await {
        warn!(error = %err, "startup message failed to send — continuing anyway");
    }

    let pipeline = DeliveryPipeline::new(
        notifier,
        tracker,
        transport.clone(),
        config.telegram_channel_id.clone(),
        config.inter_step_delay,
        config.send_timeout,
        metrics_collector.clone(),
    );

    let result_poller = ResultPoller::new(
        config.clone(),
        index.clone(),
        transport,
        metrics_collector.clone(),
    )
    .context("building result poller")?;

    // Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ═══════════════════════════════════════════
    // SPAWN THE POLL LOOP
    // ═══════════════════════════════════════════
    let mut poller_shutdown = shutdown_rx.clone();
    let poller_handle = tokio::spawn(async move {
        info!("📡 Result Poller: ONLINE");
        poller::run(result_poller, pipeline, &mut poller_shutdown).await;
        info!("📡 Result Poller: OFFLINE");
    });

    // ═══════════════════════════════════════════
    // SPAWN METRICS HTTP SERVER
    // ═══════════════════════════════════════════
    let metrics_for_server = metrics_collector.clone();
    let metrics_port = config.metrics_port;
    let mut metrics_shutdown = shutdown_rx.clone();
    let metrics_handle = tokio::spawn(async move {
        metrics::run_metrics_server(metrics_for_server, metrics_port, &mut metrics_shutdown).await;
        info!("📊 Metrics server: OFFLINE");
    });

    info!("═══════════════════════════════════════════════════════");
    info!("  🟢 ALL SYSTEMS ONLINE - EARNINGS HERALD ACTIVE");
    info!("  📡 Polling 3 market-cap partitions every {}s", config.poll_interval.as_secs());
    info!("  📤 Delivering to {}", config.telegram_channel_id);
    info!("  📊 Metrics at http://0.0.0.0:{}/metrics", metrics_port);
    info!("  ⚡ Press Ctrl+C for graceful shutdown");
    info!("═══════════════════════════════════════════════════════");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("🛑 Shutdown signal received!");
            let _ = shutdown_tx.send(true);
        }
        Err(err) => {
            error!("❌ Signal listener error: {}", err);
            let _ = shutdown_tx.send(true);
        }
    }

    info!("⏳ Waiting for tasks to complete (timeout: 10s)...");
    let _ = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let _ = tokio::join!(poller_handle, metrics_handle);
    })
    .await;

    info!("📪 EARNINGS HERALD ENGINE: OFFLINE");
    Ok(())
}
