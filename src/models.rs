// =============================================================================
// models.rs — THE SACRED DATA STRUCTURES OF QUARTERLY EARNINGS
// =============================================================================
//
// These structs represent everything that flows through the engine: raw
// filing records as the upstream feed reports them, resolved records after
// the fuzzy matcher has decided which Nifty 500 company the feed was
// actually talking about, and the dedup keys that guarantee the channel
// hears about each (company, variant) pair exactly once per day.
//
// The serde mirrors of the feed response live here too. Every field is
// Optional because the feed is a production API and production APIs omit
// fields whenever they feel like it.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::matching::index::CanonicalCompany;

/// The market-cap partition a record was fetched from. The upstream feed
/// exposes one endpoint per segment; each poll cycle hits all three.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MarketCapSegment {
    Large,
    Mid,
    Small,
}

impl MarketCapSegment {
    /// All segments, in the order they are fetched and reported.
    pub const ALL: [MarketCapSegment; 3] = [
        MarketCapSegment::Large,
        MarketCapSegment::Mid,
        MarketCapSegment::Small,
    ];

    /// The value the feed expects in its `marketCap` query parameter.
    pub fn as_query(&self) -> &'static str {
        match self {
            MarketCapSegment::Large => "Large",
            MarketCapSegment::Mid => "Mid",
            MarketCapSegment::Small => "Small",
        }
    }
}

impl fmt::Display for MarketCapSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_query())
    }
}

/// One filing announcement as fetched from the feed, before any name
/// resolution. Produced per poll cycle, discarded after processing.
#[derive(Debug, Clone)]
pub struct RawFilingRecord {
    /// The company name exactly as the feed spelled it. May be abbreviated,
    /// suffixed, truncated, or otherwise mangled — that's what the fuzzy
    /// matcher is for.
    pub api_company_name: String,

    /// Secondary name the feed sometimes carries for the same entity.
    /// Tried as a fallback when the primary name fails to resolve.
    pub alias_name: Option<String>,

    /// The result variant, e.g. "Standalone" or "Consolidated" result
    /// descriptions. Part of the dedup key: a company legitimately
    /// announces both variants on the same day.
    pub result_variant: String,

    /// Announcement timestamp as reported by the feed (ISO-like string).
    /// Records are delivered in ascending announcement order.
    pub announced_at: String,

    /// Link to the filing document, when the feed provides one.
    pub document_url: Option<String>,

    /// Which partition endpoint this record came from.
    pub segment: MarketCapSegment,
}

/// Which strategy resolved a noisy feed name to a canonical company.
/// Ordered cheapest/most-specific first; the matcher stops at the first hit.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    Exact,
    Normalized,
    Substring,
    TokenOverlap,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Exact => write!(f, "exact"),
            MatchStrategy::Normalized => write!(f, "normalized"),
            MatchStrategy::Substring => write!(f, "substring"),
            MatchStrategy::TokenOverlap => write!(f, "token-overlap"),
        }
    }
}

/// A successful resolution: the canonical company plus how we got there.
/// "No match" is the absence of this value, not a sentinel variant — a
/// record either carries a company and a strategy or carries neither.
#[derive(Debug, Clone)]
pub struct ResolvedMatch {
    pub company: CanonicalCompany,
    pub strategy: MatchStrategy,
}

/// A raw record after name resolution.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub raw: RawFilingRecord,
    pub matched: Option<ResolvedMatch>,
}

/// The per-day uniqueness key: at most one notification per
/// (canonical company, result variant) per local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub company: String,
    pub variant: String,
}

impl DedupKey {
    pub fn new(company: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            company: company.into(),
            variant: variant.into(),
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.company, self.variant)
    }
}

/// Terminal state of one record's trip through the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Summary and attachment (where present) both confirmed sent,
    /// dedup key committed.
    Delivered,
    /// Suppressed before any send: already notified today, or unmatched.
    Skipped,
    /// A send step exhausted its retries. The dedup key stays
    /// uncommitted so the next cycle re-attempts the record.
    Failed(DeliveryFailure),
}

/// Which step of the two-step notification gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The summary never went out; nothing was delivered.
    Summary,
    /// The summary was delivered but the attachment exhausted retries.
    /// The accepted cost of retrying next cycle is a duplicate summary.
    Attachment,
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Skipped => write!(f, "skipped"),
            DeliveryOutcome::Failed(DeliveryFailure::Summary) => write!(f, "failed:summary"),
            DeliveryOutcome::Failed(DeliveryFailure::Attachment) => write!(f, "failed:attachment"),
        }
    }
}

// =============================================================================
// Upstream feed response mirrors
// =============================================================================
// The feed wraps its event list three layers deep: content → eventsWithDate
// → eventList. Every layer and every field is Optional because the feed
// has strong opinions about which fields it feels like sending today.
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FeedResponse {
    pub content: Option<Vec<FeedContent>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedContent {
    #[serde(rename = "eventsWithDate")]
    pub events_with_date: Option<Vec<FeedDateGroup>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedDateGroup {
    #[serde(rename = "eventList")]
    pub event_list: Option<Vec<FeedEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedEvent {
    #[serde(rename = "companyName")]
    pub company_name: Option<String>,
    #[serde(rename = "assentName")]
    pub assent_name: Option<String>,
    #[serde(rename = "resultDescription")]
    pub result_description: Option<String>,
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
    #[serde(rename = "resultLink")]
    pub result_link: Option<String>,
}
