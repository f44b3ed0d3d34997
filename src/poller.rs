// =============================================================================
// poller.rs — THE RESULTS FEED STAKEOUT
// =============================================================================
//
// Polls the three market-cap partition endpoints of the results feed,
// peels the event list out of the feed's triple-nested response, keeps
// only today's announcements, and resolves every company name through the
// fuzzy matcher.
//
// The three fetches run concurrently — they are independent, read-only,
// and the feed doesn't care. Everything after the fetch is strictly
// sequential: records are sorted by announcement time and handed to the
// delivery pipeline one at a time, because the whole point of this engine
// is that the channel sees announcements in order.
//
// A partition that fails its fetch (after the transport's full retry
// budget) is logged and skipped for the cycle; the other partitions still
// process. One bad endpoint never kills a cycle.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::matching::fuzzy::find_match;
use crate::matching::index::ReferenceIndex;
use crate::metrics::MetricsCollector;
use crate::models::{
    DeliveryOutcome, FeedResponse, MarketCapSegment, MatchStrategy, RawFilingRecord,
    ResolvedMatch, ResolvedRecord,
};
use crate::notifier::NotifyChannel;
use crate::pipeline::DeliveryPipeline;
use crate::transport::{classify_reqwest, error_for_status, RetryingTransport, TransportError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

pub struct ResultPoller {
    config: Arc<Config>,
    index: Arc<ReferenceIndex>,
    transport: RetryingTransport,
    client: reqwest::Client,
    metrics: Arc<MetricsCollector>,
}

impl ResultPoller {
    pub fn new(
        config: Arc<Config>,
        index: Arc<ReferenceIndex>,
        transport: RetryingTransport,
        metrics: Arc<MetricsCollector>,
    ) -> anyhow::Result<Self> {
        // The feed fronts a website, so it expects website-shaped requests.
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://concall.in"));
        headers.insert(header::REFERER, HeaderValue::from_static("https://concall.in/"));
        if let Some(cookie) = &config.feed_session_cookie {
            headers.insert(header::COOKIE, HeaderValue::from_str(cookie)?);
        }

        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            config,
            index,
            transport,
            client,
            metrics,
        })
    }

    /// One full fetch-and-resolve pass: all three partitions, merged,
    /// date-filtered, ordered, resolved.
    pub async fn poll_cycle(&self, today: NaiveDate) -> Vec<ResolvedRecord> {
        let endpoints = self.config.segment_endpoints();

        let fetches: Vec<_> = endpoints
            .iter()
            .map(|(segment, url)| self.fetch_segment(*segment, url))
            .collect();
        let results = futures::future::join_all(fetches).await;

        let mut raw_records: Vec<RawFilingRecord> = Vec::new();
        for ((segment, _), result) in endpoints.iter().zip(results) {
            match result {
                Ok(feed) => {
                    let records = extract_records(*segment, feed, today);
                    debug!(segment = %segment, records = records.len(), "partition fetched");
                    raw_records.extend(records);
                }
                Err(err) => {
                    self.metrics.increment_fetch_error(*segment);
                    error!(
                        segment = %segment,
                        error = %err,
                        "partition fetch failed — skipping it this cycle"
                    );
                }
            }
        }

        // Announcement order is delivery order. The feed's timestamps are
        // ISO-shaped strings, so lexicographic order is chronological.
        raw_records.sort_by(|a, b| a.announced_at.cmp(&b.announced_at));

        self.metrics.record_fetched(raw_records.len() as u64);

        raw_records
            .into_iter()
            .map(|raw| {
                let resolved = resolve_record(raw, &self.index, self.config.match_threshold);
                match &resolved.matched {
                    Some(m) => self.metrics.increment_matched(m.strategy),
                    None => self.metrics.increment_unmatched(),
                }
                resolved
            })
            .collect()
    }

    async fn fetch_segment(
        &self,
        segment: MarketCapSegment,
        url: &str,
    ) -> Result<FeedResponse, TransportError> {
        let op = format!("fetch:{segment}");
        self.transport
            .execute(&op, self.config.fetch_timeout, || {
                let client = self.client.clone();
                let url = url.to_string();
                async move {
                    let response = client.get(&url).send().await.map_err(classify_reqwest)?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(error_for_status(status, "results feed"));
                    }
                    response
                        .json::<FeedResponse>()
                        .await
                        .map_err(|e| TransportError::Fatal(e.into()))
                }
            })
            .await
    }
}

/// Flatten the feed's content → eventsWithDate → eventList nesting into
/// raw records, keeping only today's announcements and dropping exact
/// in-batch duplicates (the feed repeats events across date groups).
fn extract_records(
    segment: MarketCapSegment,
    feed: FeedResponse,
    today: NaiveDate,
) -> Vec<RawFilingRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut records = Vec::new();

    for content in feed.content.unwrap_or_default() {
        for group in content.events_with_date.unwrap_or_default() {
            for event in group.event_list.unwrap_or_default() {
                let Some(name) = event
                    .company_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                else {
                    continue;
                };

                let announced_at = event.date_time.clone().unwrap_or_default();
                if announced_on(&announced_at) != Some(today) {
                    continue;
                }

                let variant = event
                    .result_description
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();

                if !seen.insert((name.to_string(), variant.clone())) {
                    continue;
                }

                records.push(RawFilingRecord {
                    api_company_name: name.to_string(),
                    alias_name: event
                        .assent_name
                        .as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string),
                    result_variant: variant,
                    announced_at,
                    document_url: event
                        .result_link
                        .as_deref()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                    segment,
                });
            }
        }
    }

    records
}

/// The calendar day of a feed timestamp like "2026-02-03T10:00:00".
/// Anything unparseable is treated as "not today" — a record without a
/// readable date can't be delivered in order, so it isn't delivered.
fn announced_on(date_time: &str) -> Option<NaiveDate> {
    let prefix = date_time.get(0..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// Resolve one record's company name: primary name first, the feed's
/// alias as fallback. Non-exact resolutions are reported here — this is
/// the audit trail for every name the matcher had to guess about.
pub(crate) fn resolve_record(
    raw: RawFilingRecord,
    index: &ReferenceIndex,
    threshold: f64,
) -> ResolvedRecord {
    let hit = find_match(&raw.api_company_name, index, threshold).or_else(|| {
        raw.alias_name
            .as_deref()
            .and_then(|alias| find_match(alias, index, threshold))
    });

    match hit {
        Some((company, strategy)) => {
            if strategy != MatchStrategy::Exact {
                info!(
                    api_name = %raw.api_company_name,
                    matched = %company.original_name,
                    strategy = %strategy,
                    "fuzzy-matched feed name to canonical company"
                );
            }
            ResolvedRecord {
                matched: Some(ResolvedMatch {
                    company: company.clone(),
                    strategy,
                }),
                raw,
            }
        }
        None => {
            debug!(
                api_name = %raw.api_company_name,
                "no canonical match — record skipped"
            );
            ResolvedRecord { raw, matched: None }
        }
    }
}

/// The engine's main loop: poll, resolve, deliver, sleep, repeat. Runs
/// until the shutdown watch flips. A shutdown signal aborts an in-flight
/// cycle mid-step; anything undelivered stays uncommitted and re-runs on
/// the next start.
pub async fn run<C: NotifyChannel>(
    poller: ResultPoller,
    mut pipeline: DeliveryPipeline<C>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let interval = poller.config.poll_interval;
    info!(
        interval_secs = interval.as_secs(),
        companies = poller.index.len(),
        "result poller online"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("result poller received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                tokio::select! {
                    _ = shutdown.changed() => {
                        warn!("shutdown mid-cycle — in-flight work abandoned uncommitted");
                        break;
                    }
                    _ = run_cycle(&poller, &mut pipeline) => {}
                }
            }
        }
    }

    info!("result poller stopped");
}

async fn run_cycle<C: NotifyChannel>(poller: &ResultPoller, pipeline: &mut DeliveryPipeline<C>) {
    let today = Local::now().date_naive();

    // Rollover runs before any dedup lookup, every cycle.
    if let Err(err) = pipeline.tracker_mut().rollover_if_stale(today).await {
        error!(error = %err, "failed to roll dedup state to the new day");
    }

    let resolved = poller.poll_cycle(today).await;
    let fetched = resolved.len();
    let matched: Vec<ResolvedRecord> = resolved
        .into_iter()
        .filter(|r| r.matched.is_some())
        .collect();

    let outcomes = pipeline.process(&matched).await;
    let delivered = outcomes
        .iter()
        .filter(|o| matches!(o, DeliveryOutcome::Delivered))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, DeliveryOutcome::Skipped))
        .count();
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, DeliveryOutcome::Failed(_)))
        .count();

    poller.metrics.increment_cycles();

    if delivered + failed > 0 {
        info!(
            fetched,
            matched = matched.len(),
            delivered,
            skipped,
            failed,
            "poll cycle complete"
        );
    } else {
        debug!(fetched, matched = matched.len(), skipped, "poll cycle complete — nothing new");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedContent, FeedDateGroup, FeedEvent};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn event(name: &str, date_time: &str, description: &str) -> FeedEvent {
        FeedEvent {
            company_name: Some(name.to_string()),
            assent_name: None,
            result_description: Some(description.to_string()),
            date_time: Some(date_time.to_string()),
            result_link: Some("https://example.com/doc.pdf".to_string()),
        }
    }

    fn feed(events: Vec<FeedEvent>) -> FeedResponse {
        FeedResponse {
            content: Some(vec![FeedContent {
                events_with_date: Some(vec![FeedDateGroup {
                    event_list: Some(events),
                }]),
            }]),
        }
    }

    #[test]
    fn test_extract_keeps_only_todays_records() {
        let feed = feed(vec![
            event("ICICI Bank Ltd.", "2026-02-03T10:00:00", "Standalone"),
            event("Reliance Industries Ltd.", "2026-02-02T10:00:00", "Consolidated"),
            event("Tata Consultancy Services Ltd.", "2026-02-04T09:00:00", "Standalone"),
        ]);
        let records = extract_records(MarketCapSegment::Large, feed, day("2026-02-03"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].api_company_name, "ICICI Bank Ltd.");
        assert_eq!(records[0].segment, MarketCapSegment::Large);
    }

    #[test]
    fn test_extract_drops_in_batch_duplicates_but_keeps_variants() {
        let feed = feed(vec![
            event("ICICI Bank Ltd.", "2026-02-03T10:00:00", "Standalone"),
            event("ICICI Bank Ltd.", "2026-02-03T10:05:00", "Standalone"),
            event("ICICI Bank Ltd.", "2026-02-03T10:10:00", "Consolidated"),
        ]);
        let records = extract_records(MarketCapSegment::Mid, feed, day("2026-02-03"));
        let variants: Vec<&str> = records.iter().map(|r| r.result_variant.as_str()).collect();
        assert_eq!(variants, vec!["Standalone", "Consolidated"]);
    }

    #[test]
    fn test_extract_tolerates_missing_fields() {
        let feed = feed(vec![
            FeedEvent {
                company_name: None,
                assent_name: None,
                result_description: None,
                date_time: Some("2026-02-03T10:00:00".to_string()),
                result_link: None,
            },
            FeedEvent {
                company_name: Some("  ".to_string()),
                assent_name: None,
                result_description: None,
                date_time: Some("2026-02-03T10:00:00".to_string()),
                result_link: None,
            },
            FeedEvent {
                company_name: Some("ICICI Bank Ltd.".to_string()),
                assent_name: None,
                result_description: None,
                date_time: None,
                result_link: None,
            },
        ]);
        let records = extract_records(MarketCapSegment::Small, feed, day("2026-02-03"));
        assert!(records.is_empty());
    }

    #[test]
    fn test_announced_on_parses_iso_prefixes() {
        assert_eq!(announced_on("2026-02-03T10:00:00"), Some(day("2026-02-03")));
        assert_eq!(announced_on("2026-02-03"), Some(day("2026-02-03")));
        assert_eq!(announced_on("03/02/2026"), None);
        assert_eq!(announced_on(""), None);
        assert_eq!(announced_on("soon"), None);
    }

    #[test]
    fn test_resolve_record_uses_alias_as_fallback() {
        let index = ReferenceIndex::from_rows(vec![(
            "ICICI Lombard General Insurance Company Ltd.".to_string(),
            None,
        )]);
        let raw = RawFilingRecord {
            api_company_name: "Some Unrelated Feed Label".to_string(),
            alias_name: Some("ICICI Lombard Gen. Ins. Co.".to_string()),
            result_variant: "Standalone".to_string(),
            announced_at: "2026-02-03T10:00:00".to_string(),
            document_url: None,
            segment: MarketCapSegment::Large,
        };
        let resolved = resolve_record(raw, &index, 0.8);
        let matched = resolved.matched.expect("alias should resolve");
        assert_eq!(
            matched.company.original_name,
            "ICICI Lombard General Insurance Company Ltd."
        );
        assert_eq!(matched.strategy, MatchStrategy::Normalized);
    }

    #[test]
    fn test_resolve_record_no_match_is_not_an_error() {
        let index = ReferenceIndex::from_rows(vec![("ICICI Bank Ltd.".to_string(), None)]);
        let raw = RawFilingRecord {
            api_company_name: "Tiny Unlisted Widgets".to_string(),
            alias_name: None,
            result_variant: "Standalone".to_string(),
            announced_at: "2026-02-03T10:00:00".to_string(),
            document_url: None,
            segment: MarketCapSegment::Small,
        };
        let resolved = resolve_record(raw, &index, 0.8);
        assert!(resolved.matched.is_none());
        assert_eq!(resolved.raw.api_company_name, "Tiny Unlisted Widgets");
    }
}
