// =============================================================================
// config.rs — THE GRAND CONFIGURATION CATHEDRAL
// =============================================================================
//
// Every tunable parameter in the engine lives here, loaded from
// environment variables with defaults that work out of the box. The
// defaults were chosen through the time-honored process of "that's what
// survived a year of production" — 5 retries, exponential backoff capped
// at five minutes, a 3-second gap between ordered sends.
//
// All values can be overridden via environment variables prefixed with
// EARNINGS_HERALD_, because namespacing your env vars is what separates
// the professionals from the amateurs. The two Telegram credentials keep
// their conventional unprefixed names.
//
// validate() is the startup gate: missing credentials or a missing
// canonical company list mean the process must not start. Everything
// else degrades at runtime; those two do not.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::MarketCapSegment;

/// Raised when the engine is not allowed to start. Every problem is
/// listed at once so the operator fixes them in one pass, not one per
/// crash.
#[derive(Debug, Error)]
#[error("configuration invalid: {}", .problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

/// The Grand Configuration Struct. If you need to change how the engine
/// behaves, this is where you come.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // TELEGRAM CREDENTIALS
    // =========================================================================
    /// Bot token for the Telegram Bot API. No token, no notifications,
    /// no process: this is fatal at startup.
    pub telegram_bot_token: String,

    /// The channel every notification is delivered to.
    pub telegram_channel_id: String,

    // =========================================================================
    // UPSTREAM FEED
    // =========================================================================
    /// Base URL of the live-results feed. The three market-cap partition
    /// endpoints are derived from this via segment_endpoints().
    pub feed_base_url: String,

    /// Session cookie for the feed, passed verbatim on every fetch.
    /// Refreshed out of band; the engine just carries it.
    pub feed_session_cookie: Option<String>,

    // =========================================================================
    // FILE PATHS
    // =========================================================================
    /// The canonical company list (CSV with Company Name and Symbol
    /// columns). Missing file is fatal at startup.
    pub canonical_list_path: PathBuf,

    /// Where the per-day dedup state lives between restarts.
    pub dedup_state_path: PathBuf,

    // =========================================================================
    // POLLING & RETRY POLICY
    // =========================================================================
    /// How often to poll the feed. Default: 120 seconds. Results drop in
    /// bursts around market hours; two minutes keeps us prompt without
    /// getting the engine IP-banned.
    pub poll_interval: Duration,

    /// Total attempts per network operation before giving up. Default: 5.
    pub max_retries: u32,

    /// First backoff delay; doubles each retry. Default: 1 second.
    pub initial_backoff: Duration,

    /// Backoff ceiling. Default: 300 seconds.
    pub max_backoff: Duration,

    /// Minimum gap between the summary send and the document send for one
    /// record. Telegram makes no ordering promise across messages; this
    /// gap is what keeps a summary above its attachment. Default: 3s.
    pub inter_step_delay: Duration,

    /// Per-attempt timeout for feed fetches. Default: 30 seconds.
    pub fetch_timeout: Duration,

    /// Per-attempt timeout for notification sends. Default: 600 seconds —
    /// Telegram fetches the document from the upstream URL before
    /// acknowledging, and result-day PDFs are not small.
    pub send_timeout: Duration,

    // =========================================================================
    // MATCHING
    // =========================================================================
    /// Token-overlap acceptance ratio for the fuzzy matcher's last-resort
    /// strategy. Default: 0.8 — four of five significant tokens.
    pub match_threshold: f64,

    // =========================================================================
    // METRICS
    // =========================================================================
    /// Port for the metrics HTTP endpoint. Default: 9090.
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    /// Reads a .env file first if one exists, and fails silently if it
    /// doesn't, because not everyone has their life together enough to
    /// create a .env file.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Config {
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
            telegram_channel_id: env::var("TELEGRAM_CHANNEL_ID").unwrap_or_default(),

            feed_base_url: env_or_default(
                "EARNINGS_HERALD_FEED_BASE_URL",
                "https://api.concall.in/leap/fetch/liveResults",
            ),
            feed_session_cookie: env::var("EARNINGS_HERALD_FEED_SESSION_COOKIE")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            canonical_list_path: PathBuf::from(env_or_default(
                "EARNINGS_HERALD_CANONICAL_LIST",
                "nifty_500.csv",
            )),
            dedup_state_path: PathBuf::from(env_or_default(
                "EARNINGS_HERALD_DEDUP_STATE",
                "data/sent_today.json",
            )),

            poll_interval: Duration::from_secs(
                env_or_default("EARNINGS_HERALD_POLL_SECS", "120").parse().unwrap_or(120),
            ),
            max_retries: env_or_default("EARNINGS_HERALD_MAX_RETRIES", "5")
                .parse()
                .unwrap_or(5),
            initial_backoff: Duration::from_secs(
                env_or_default("EARNINGS_HERALD_INITIAL_BACKOFF_SECS", "1")
                    .parse()
                    .unwrap_or(1),
            ),
            max_backoff: Duration::from_secs(
                env_or_default("EARNINGS_HERALD_MAX_BACKOFF_SECS", "300")
                    .parse()
                    .unwrap_or(300),
            ),
            inter_step_delay: Duration::from_secs(
                env_or_default("EARNINGS_HERALD_INTER_STEP_DELAY_SECS", "3")
                    .parse()
                    .unwrap_or(3),
            ),
            fetch_timeout: Duration::from_secs(
                env_or_default("EARNINGS_HERALD_FETCH_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            send_timeout: Duration::from_secs(
                env_or_default("EARNINGS_HERALD_SEND_TIMEOUT_SECS", "600")
                    .parse()
                    .unwrap_or(600),
            ),

            match_threshold: env_or_default("EARNINGS_HERALD_MATCH_THRESHOLD", "0.8")
                .parse()
                .unwrap_or(0.8),

            metrics_port: env_or_default("EARNINGS_HERALD_METRICS_PORT", "9090")
                .parse()
                .unwrap_or(9090),
        }
    }

    /// The startup gate. Collects every fatal problem before refusing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.telegram_bot_token.is_empty()
            || self.telegram_bot_token == "your_bot_token_here"
        {
            problems.push("TELEGRAM_BOT_TOKEN is not configured".to_string());
        }
        if self.telegram_channel_id.is_empty()
            || self.telegram_channel_id == "your_channel_id_here"
        {
            problems.push("TELEGRAM_CHANNEL_ID is not configured".to_string());
        }
        if !self.canonical_list_path.exists() {
            problems.push(format!(
                "canonical company list not found at {}",
                self.canonical_list_path.display()
            ));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            problems.push(format!(
                "EARNINGS_HERALD_MATCH_THRESHOLD must be within [0, 1], got {}",
                self.match_threshold
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    /// The three partition endpoints, one per market-cap segment, in the
    /// order they are fetched every cycle.
    pub fn segment_endpoints(&self) -> Vec<(MarketCapSegment, String)> {
        MarketCapSegment::ALL
            .into_iter()
            .map(|segment| {
                let url = format!(
                    "{}?page=0&size=40&sector=All&marketCap={}",
                    self.feed_base_url,
                    urlencoding::encode(segment.as_query()),
                );
                (segment, url)
            })
            .collect()
    }
}

/// Helper function to read an environment variable with a default fallback.
/// Because unwrap_or on env::var is ugly and we have standards.
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
