// =============================================================================
// normalizer.rs — THE NAME LAUNDROMAT
// =============================================================================
//
// Takes whatever the feed thinks a company is called and reduces it to a
// canonical comparable form. Deterministic, total, no failure mode: any
// string in, normalized string out. The same function runs over both the
// noisy feed names and every canonical name at index build time, which is
// the entire reason normalized forms are comparable at all.
//
// Fixed pipeline, every step idempotent:
//
//   1. lowercase + trim
//   2. expand known abbreviations ("gen." → "general", "mngt" →
//      "management"), word-boundary matches only, left to right
//   3. drop company-suffix tokens wherever they appear (ltd, limited,
//      inc, corp, company, pvt, plc, ...)
//   4. strip punctuation, collapse whitespace
//
// The abbreviation pass is a single Aho-Corasick automaton over the whole
// table — one scan regardless of table size, built once and kept in a
// static. Boundary checks are manual because the automaton happily finds
// "gen" inside "general" and we are not in the business of expanding a
// name into "generaleral".
// =============================================================================

use aho_corasick::{AhoCorasick, MatchKind};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Abbreviation table: token as the feed writes it → expanded form.
/// Seeded from years of watching the feed mangle Nifty 500 names.
/// Entries are matched case-sensitively against already-lowercased input.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("gen", "general"),
    ("ins", "insurance"),
    ("intl", "international"),
    ("mfg", "manufacturing"),
    ("mngt", "management"),
    ("mgmt", "management"),
    ("corpn", "corporation"),
    ("fin", "finance"),
    ("comm", "communications"),
    ("syst", "systems"),
    ("tech", "technology"),
    ("telecom", "telecommunication"),
    ("eng", "engineering"),
    ("dev", "development"),
    ("infra", "infrastructure"),
    ("petro", "petroleum"),
    ("auto", "automotive"),
    ("svcs", "services"),
    ("svc", "services"),
    ("pharm", "pharmaceutical"),
    ("pharma", "pharmaceutical"),
];

/// Company-suffix tokens dropped wherever they appear in a name.
/// "HDFC Asset Management Company Ltd." and "HDFC Asset Management"
/// must normalize identically.
const SUFFIX_TOKENS: &[&str] = &[
    "ltd",
    "limited",
    "inc",
    "incorporated",
    "corp",
    "corporation",
    "company",
    "co",
    "pvt",
    "private",
    "public",
    "plc",
];

/// Words that carry no discriminative weight in token-overlap scoring.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "at", "by", "for", "in", "of", "on", "the", "to", "with",
];

static ABBREV_AUTOMATON: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(ABBREVIATIONS.iter().map(|(abbr, _)| *abbr))
        .expect("abbreviation table builds a valid automaton")
});

/// Normalize a company name into its canonical comparable form.
pub fn normalize(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let expanded = expand_abbreviations(&lowered);

    let mut tokens: Vec<String> = Vec::new();
    for raw_token in expanded.split_whitespace() {
        let cleaned: String = raw_token
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if cleaned.is_empty() || SUFFIX_TOKENS.contains(&cleaned.as_str()) {
            continue;
        }
        tokens.push(cleaned);
    }
    tokens.join(" ")
}

/// Split a normalized name into its significant tokens — everything the
/// stop-word list doesn't swallow. Used for token-overlap scoring and for
/// the per-entry token sets the index precomputes.
pub fn significant_tokens(normalized: &str) -> HashSet<String> {
    normalized
        .split_whitespace()
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Replace every word-boundary abbreviation hit, left to right. Hits that
/// sit inside a longer word ("gen" in "general") are skipped.
fn expand_abbreviations(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0usize;

    for m in ABBREV_AUTOMATON.find_iter(text) {
        let boundary_before = m.start() == 0 || !bytes[m.start() - 1].is_ascii_alphanumeric();
        let boundary_after = m.end() == bytes.len() || !bytes[m.end()].is_ascii_alphanumeric();
        if !(boundary_before && boundary_after) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(ABBREVIATIONS[m.pattern().as_usize()].1);
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}
