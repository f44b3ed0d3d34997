// =============================================================================
// matching/mod.rs — THE NAME RESOLUTION WAR ROOM
// =============================================================================
//
// The upstream feed and the Nifty 500 reference list disagree about what
// companies are called, constantly and creatively. "HDFC Asset Mngt. Co"
// versus "HDFC Asset Management Company Ltd." — same company, zero bytes
// in common after the first sixteen.
//
// This module closes that gap in three layers:
//
//   normalizer — a pure function that beats any company name into a
//                canonical comparable form (abbreviations expanded,
//                suffixes stripped, punctuation gone)
//   index      — the reference list, built once at startup, with exact /
//                normalized / symbol lookups plus an ordered scan
//   fuzzy      — four matching strategies tried cheapest-first, because
//                most names resolve long before we have to count tokens
// =============================================================================

pub mod fuzzy;
pub mod index;
pub mod normalizer;
