// =============================================================================
// fuzzy.rs — FOUR WAYS TO AGREE ON A NAME
// =============================================================================
//
// Resolves a noisy feed name against the reference index using four
// strategies, tried in order, first hit wins. The order is deliberate:
// cheapest and most specific first, so the expensive scans only run for
// the names that genuinely need them.
//
//   1. Exact        — case-insensitive equality with a canonical name
//   2. Normalized   — equality after both sides go through the normalizer
//   3. Substring    — normalized containment, either direction, with a
//                     5-char floor so "abc" can't claim half the index
//   4. TokenOverlap — fraction of the noisy name's significant tokens
//                     found in a canonical entry's token set
//
// Ties in the scan strategies resolve to the first entry in reference-list
// order. That is deterministic and arbitrary, and it is documented as
// such: the list order is the tie-break, not a semantic judgement.
//
// This module is pure: no logging, no metrics, no I/O. "No match" is a
// perfectly normal return value, not an error. Callers own the audit
// trail for non-exact matches.
// =============================================================================

use crate::models::MatchStrategy;

use super::index::{CanonicalCompany, ReferenceIndex};
use super::normalizer::{normalize, significant_tokens};

/// Substring containment only counts when the contained normalized form
/// has at least this many characters. Below the floor, containment says
/// nothing ("ab" is a substring of half the index).
const SUBSTRING_FLOOR: usize = 5;

/// Resolve a noisy name against the index. Returns the matched entry and
/// the strategy that found it, or `None` when no strategy clears its bar.
///
/// `threshold` is the token-overlap acceptance ratio (0.8 means at least
/// 80% of the noisy name's significant tokens must appear in a canonical
/// entry's token set). It is an explicit parameter, not a constant buried
/// in a call site.
pub fn find_match<'a>(
    api_name: &str,
    index: &'a ReferenceIndex,
    threshold: f64,
) -> Option<(&'a CanonicalCompany, MatchStrategy)> {
    if api_name.trim().is_empty() {
        return None;
    }

    // Strategy 1: exact, case-insensitive.
    if let Some(company) = index.exact_lookup(api_name) {
        return Some((company, MatchStrategy::Exact));
    }

    let normalized = normalize(api_name);
    if normalized.is_empty() {
        return None;
    }

    // Strategy 2: normalized equality.
    if let Some(company) = index.normalized_lookup(&normalized) {
        return Some((company, MatchStrategy::Normalized));
    }

    // Strategy 3: substring containment over normalized forms, scanned in
    // reference-list order. Forward ("icici prudential" inside "icici
    // prudential life insurance") covers truncated feed names; reverse
    // covers the rare feed name that embellishes past the canonical one.
    for entry in index.entries() {
        let forward = normalized.len() >= SUBSTRING_FLOOR
            && entry.normalized_name.contains(&normalized);
        let reverse = entry.normalized_name.len() >= SUBSTRING_FLOOR
            && normalized.contains(&entry.normalized_name);
        if forward || reverse {
            return Some((entry, MatchStrategy::Substring));
        }
    }

    // Strategy 4: token overlap. Score each entry by the fraction of the
    // noisy name's significant tokens it covers; highest score wins, and
    // the strict `>` keeps the first-encountered entry on equal scores.
    let api_tokens = significant_tokens(&normalized);
    if api_tokens.is_empty() {
        return None;
    }

    let mut best: Option<(&CanonicalCompany, f64)> = None;
    for entry in index.entries() {
        if entry.token_set.is_empty() {
            continue;
        }
        let common = api_tokens.intersection(&entry.token_set).count();
        if common == 0 {
            continue;
        }
        let score = common as f64 / api_tokens.len() as f64;
        if score >= threshold && best.map_or(true, |(_, top)| score > top) {
            best = Some((entry, score));
        }
    }

    best.map(|(company, _)| (company, MatchStrategy::TokenOverlap))
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f64 = 0.8;

    fn sample_index() -> ReferenceIndex {
        ReferenceIndex::from_rows(vec![
            ("HDFC Asset Management Company Ltd.".to_string(), Some("HDFCAMC".to_string())),
            ("Tata Consultancy Services Ltd.".to_string(), Some("TCS".to_string())),
            ("Reliance Industries Ltd.".to_string(), Some("RELIANCE".to_string())),
            ("ICICI Bank Ltd.".to_string(), Some("ICICIBANK".to_string())),
            (
                "ICICI Lombard General Insurance Company Ltd.".to_string(),
                Some("ICICIGI".to_string()),
            ),
            (
                "ICICI Prudential Life Insurance Company Ltd.".to_string(),
                Some("ICICIPRULI".to_string()),
            ),
            ("Sun Pharmaceutical Industries Ltd.".to_string(), Some("SUNPHARMA".to_string())),
            ("Power Grid Corporation of India Ltd.".to_string(), Some("POWERGRID".to_string())),
        ])
    }

    #[test]
    fn test_exact_match_any_casing() {
        let index = sample_index();
        let (company, strategy) = find_match("icici bank ltd.", &index, THRESHOLD).unwrap();
        assert_eq!(company.original_name, "ICICI Bank Ltd.");
        assert_eq!(strategy, MatchStrategy::Exact);
    }

    #[test]
    fn test_suffixless_name_resolves_via_normalized() {
        let index = sample_index();
        let (company, strategy) = find_match("ICICI Bank", &index, THRESHOLD).unwrap();
        assert_eq!(company.original_name, "ICICI Bank Ltd.");
        assert_eq!(strategy, MatchStrategy::Normalized);
    }

    #[test]
    fn test_abbreviated_name_resolves_via_normalized() {
        let index = sample_index();
        let (company, strategy) =
            find_match("ICICI Lombard Gen. Ins. Co.", &index, THRESHOLD).unwrap();
        assert_eq!(
            company.original_name,
            "ICICI Lombard General Insurance Company Ltd."
        );
        assert_eq!(strategy, MatchStrategy::Normalized);

        let (company, strategy) = find_match("HDFC Asset Mngt. Co", &index, THRESHOLD).unwrap();
        assert_eq!(company.original_name, "HDFC Asset Management Company Ltd.");
        assert_eq!(strategy, MatchStrategy::Normalized);
    }

    #[test]
    fn test_truncated_name_resolves_via_substring() {
        let index = sample_index();
        let (company, strategy) = find_match("ICICI Prudential", &index, THRESHOLD).unwrap();
        assert_eq!(
            company.original_name,
            "ICICI Prudential Life Insurance Company Ltd."
        );
        assert_eq!(strategy, MatchStrategy::Substring);
    }

    #[test]
    fn test_abbreviation_prefix_resolves_via_substring() {
        // "sun pharmaceutical ind" is a prefix of "sun pharmaceutical industries"
        let index = sample_index();
        let (company, strategy) = find_match("Sun Pharm. Ind.", &index, THRESHOLD).unwrap();
        assert_eq!(company.original_name, "Sun Pharmaceutical Industries Ltd.");
        assert_eq!(strategy, MatchStrategy::Substring);
    }

    #[test]
    fn test_short_names_do_not_substring_match() {
        let index = sample_index();
        // Normalizes to "zeta" — 4 chars, below the substring floor, and
        // no token overlap with anything in the index.
        assert!(find_match("Zeta", &index, THRESHOLD).is_none());
    }

    #[test]
    fn test_substring_tie_break_is_index_order() {
        let index = ReferenceIndex::from_rows(vec![
            ("Bharat Electronics Ltd.".to_string(), None),
            ("Bharat Electronics & Instruments Ltd.".to_string(), None),
        ]);
        let (company, strategy) = find_match("Bharat Electronics", &index, THRESHOLD).unwrap();
        // Normalized form matches the first entry exactly, so this resolves
        // at strategy 2; the point is the first entry wins, not the second.
        assert_eq!(company.original_name, "Bharat Electronics Ltd.");
        assert!(matches!(
            strategy,
            MatchStrategy::Normalized | MatchStrategy::Substring
        ));
    }

    #[test]
    fn test_token_overlap_accepts_four_of_five_tokens() {
        let index = ReferenceIndex::from_rows(vec![(
            "Alpha Beta Gamma Delta Epsilon Ltd.".to_string(),
            None,
        )]);
        let (company, strategy) =
            find_match("Alpha Beta Gamma Delta Omega", &index, THRESHOLD).unwrap();
        assert_eq!(company.original_name, "Alpha Beta Gamma Delta Epsilon Ltd.");
        assert_eq!(strategy, MatchStrategy::TokenOverlap);
    }

    #[test]
    fn test_token_overlap_rejects_three_of_five_tokens() {
        let index = ReferenceIndex::from_rows(vec![(
            "Alpha Beta Gamma Delta Epsilon Ltd.".to_string(),
            None,
        )]);
        assert!(find_match("Alpha Beta Gamma Omega Sigma", &index, THRESHOLD).is_none());
    }

    #[test]
    fn test_token_overlap_ties_resolve_to_first_entry() {
        let index = ReferenceIndex::from_rows(vec![
            ("Orchid Steel Mills Works Trading Ltd.".to_string(), None),
            ("Orchid Steel Mills Works Holdings Ltd.".to_string(), None),
        ]);
        let (company, strategy) =
            find_match("Orchid Steel Mills Works Global", &index, THRESHOLD).unwrap();
        assert_eq!(strategy, MatchStrategy::TokenOverlap);
        assert_eq!(company.original_name, "Orchid Steel Mills Works Trading Ltd.");
    }

    #[test]
    fn test_threshold_is_respected() {
        let index = ReferenceIndex::from_rows(vec![(
            "Alpha Beta Gamma Delta Epsilon Ltd.".to_string(),
            None,
        )]);
        // 3/5 = 0.6 clears a 0.5 threshold even though it fails the default.
        let hit = find_match("Alpha Beta Gamma Omega Sigma", &index, 0.5);
        assert!(hit.is_some());
    }

    #[test]
    fn test_empty_input_never_matches() {
        let index = sample_index();
        assert!(find_match("", &index, THRESHOLD).is_none());
        assert!(find_match("   ", &index, THRESHOLD).is_none());
        assert!(find_match("Ltd.", &index, THRESHOLD).is_none());
    }
}
