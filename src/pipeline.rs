// =============================================================================
// pipeline.rs — THE ORDERED DELIVERY LINE
// =============================================================================
//
// Walks the cycle's resolved records one at a time and drives each to a
// terminal state before touching the next. Single-flight, strictly
// ordered: record N+1 does not begin until record N is Delivered, Skipped,
// or Failed.
//
// Per record, the state machine is:
//
//   Pending ── dedup says already sent ──────────────→ Skipped
//   Pending → Sending-Summary → Sending-Attachment → Delivered
//
// Both sends route through the RetryingTransport. A fixed delay sits
// between the two sends because Telegram makes no ordering promise across
// messages; the gap keeps the summary above its attachment in the channel.
//
// Failure rules, in order of importance:
//
//   - Summary exhausted → Failed. The attachment is never attempted and
//     nothing is committed.
//   - Attachment exhausted after the summary landed → Failed, logged as a
//     partial failure, and the dedup key is NOT committed. The next cycle
//     re-attempts both steps; the channel may see the summary twice. That
//     duplicate is accepted and documented, not swallowed.
//   - Only a full Delivered transition commits the dedup key.
//   - No record's failure ever aborts the rest of the cycle.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupTracker;
use crate::metrics::MetricsCollector;
use crate::models::{DedupKey, DeliveryFailure, DeliveryOutcome, ResolvedMatch, ResolvedRecord};
use crate::notifier::NotifyChannel;
use crate::transport::RetryingTransport;

pub struct DeliveryPipeline<C: NotifyChannel> {
    channel: C,
    tracker: DedupTracker,
    transport: RetryingTransport,
    channel_id: String,
    inter_step_delay: Duration,
    send_timeout: Duration,
    metrics: Arc<MetricsCollector>,
}

impl<C: NotifyChannel> DeliveryPipeline<C> {
    pub fn new(
        channel: C,
        tracker: DedupTracker,
        transport: RetryingTransport,
        channel_id: String,
        inter_step_delay: Duration,
        send_timeout: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            channel,
            tracker,
            transport,
            channel_id,
            inter_step_delay,
            send_timeout,
            metrics,
        }
    }

    /// The dedup tracker, for the cycle driver's rollover call.
    pub fn tracker_mut(&mut self) -> &mut DedupTracker {
        &mut self.tracker
    }

    pub fn tracker(&self) -> &DedupTracker {
        &self.tracker
    }

    /// Process a cycle's records in order, each to a terminal state.
    pub async fn process(&mut self, records: &[ResolvedRecord]) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let Some(matched) = &record.matched else {
                outcomes.push(DeliveryOutcome::Skipped);
                continue;
            };
            let outcome = self.deliver(record, matched).await;
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn deliver(&mut self, record: &ResolvedRecord, matched: &ResolvedMatch) -> DeliveryOutcome {
        let key = DedupKey::new(
            matched.company.original_name.clone(),
            record.raw.result_variant.clone(),
        );

        if !self.tracker.should_notify(&key) {
            debug!(key = %key, "already notified today — suppressed");
            self.metrics.increment_suppressed();
            return DeliveryOutcome::Skipped;
        }

        let summary = format_summary(record, matched);
        let summary_sent = self
            .transport
            .execute("send:summary", self.send_timeout, || {
                self.channel.send_text(&self.channel_id, &summary)
            })
            .await;

        if let Err(err) = summary_sent {
            error!(
                company = %key.company,
                variant = %key.variant,
                error = %err,
                "summary send failed — record will retry next cycle"
            );
            self.metrics.increment_failed();
            return DeliveryOutcome::Failed(DeliveryFailure::Summary);
        }

        if let Some(document_url) = record
            .raw
            .document_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
        {
            // Telegram orders nothing; the gap does.
            tokio::time::sleep(self.inter_step_delay).await;

            let document_sent = self
                .transport
                .execute("send:document", self.send_timeout, || {
                    self.channel.send_document(&self.channel_id, document_url)
                })
                .await;

            if let Err(err) = document_sent {
                warn!(
                    company = %key.company,
                    variant = %key.variant,
                    document_url,
                    error = %err,
                    "attachment failed after summary was delivered — key left uncommitted, \
                     both steps re-attempt next cycle (duplicate summary accepted)"
                );
                self.metrics.increment_partial_failure();
                return DeliveryOutcome::Failed(DeliveryFailure::Attachment);
            }
        }

        if let Err(err) = self.tracker.commit(key.clone(), Local::now()).await {
            // The notification went out; losing the commit only risks a
            // duplicate after restart, so the record still counts as
            // delivered.
            error!(key = %key, error = %err, "failed to persist dedup state");
        }

        info!(
            company = %key.company,
            variant = %key.variant,
            strategy = %matched.strategy,
            segment = %record.raw.segment,
            "notification delivered"
        );
        self.metrics.increment_delivered();
        DeliveryOutcome::Delivered
    }
}

/// The summary text for one record: canonical name (with symbol when the
/// reference list has one), the variant line, and the announcement stamp.
fn format_summary(record: &ResolvedRecord, matched: &ResolvedMatch) -> String {
    let company = &matched.company;
    let mut summary = match &company.symbol {
        Some(symbol) => format!("📊 {} ({})", company.original_name, symbol),
        None => format!("📊 {}", company.original_name),
    };
    if !record.raw.result_variant.trim().is_empty() {
        summary.push('\n');
        summary.push_str(record.raw.result_variant.trim());
    }
    if !record.raw.announced_at.trim().is_empty() {
        summary.push_str("\n\n📅 ");
        summary.push_str(record.raw.announced_at.trim());
    }
    summary
}
