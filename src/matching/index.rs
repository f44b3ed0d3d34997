// =============================================================================
// index.rs — THE CANONICAL REFERENCE INDEX
// =============================================================================
//
// The Nifty 500 list is the single source of truth for what a company is
// actually called. It is loaded exactly once at startup, frozen into an
// immutable index, and passed by reference to anything that needs to
// resolve names. No ambient globals, no reloading, no mutation.
//
// Three hash lookups (exact, normalized, symbol) answer the cheap
// questions in O(1). The ordered entry list exists for the substring and
// token-overlap scans, which are O(n) per query and fine at n = 500.
// Entry order is CSV file order and is load-bearing: it is the documented
// tie-break when several canonical entries qualify for the same noisy name.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::normalizer::{normalize, significant_tokens};

/// One authoritative company entry, immutable once the index is built.
#[derive(Debug, Clone)]
pub struct CanonicalCompany {
    /// The name exactly as the reference list records it. This is the
    /// spelling notifications use and the spelling dedup keys are built on.
    pub original_name: String,
    /// Normalized comparable form, precomputed at build time.
    pub normalized_name: String,
    /// Significant tokens of the normalized form, precomputed for
    /// token-overlap scoring.
    pub token_set: HashSet<String>,
    /// Exchange symbol, when the reference list provides one.
    pub symbol: Option<String>,
}

/// What can go wrong loading the reference list. All of it is fatal at
/// startup — the engine must not run without its canonical names.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("canonical company list not found at {0}")]
    NotFound(PathBuf),
    #[error("failed to read canonical company list: {0}")]
    Csv(#[from] csv::Error),
    #[error("canonical company list has no `{0}` column")]
    MissingColumn(&'static str),
    #[error("canonical company list at {0} contains no companies")]
    Empty(PathBuf),
}

const NAME_COLUMN: &str = "Company Name";
const SYMBOL_COLUMN: &str = "Symbol";

/// The reference index. Built once, read everywhere.
#[derive(Debug)]
pub struct ReferenceIndex {
    entries: Vec<CanonicalCompany>,
    exact: HashMap<String, usize>,
    normalized: HashMap<String, usize>,
    symbols: HashMap<String, usize>,
}

impl ReferenceIndex {
    /// Load the index from a reference CSV with a `Company Name` column
    /// and an optional `Symbol` column.
    pub fn from_csv_path(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Err(IndexError::NotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        let name_col = headers
            .iter()
            .position(|h| h.trim() == NAME_COLUMN)
            .ok_or(IndexError::MissingColumn(NAME_COLUMN))?;
        let symbol_col = headers.iter().position(|h| h.trim() == SYMBOL_COLUMN);

        let mut rows: Vec<(String, Option<String>)> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let name = record.get(name_col).unwrap_or("").trim();
            if name.is_empty() {
                continue;
            }
            let symbol = symbol_col
                .and_then(|col| record.get(col))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            rows.push((name.to_string(), symbol));
        }

        if rows.is_empty() {
            return Err(IndexError::Empty(path.to_path_buf()));
        }

        Ok(Self::from_rows(rows))
    }

    /// Build the index from (name, symbol) rows, preserving row order.
    pub fn from_rows(rows: Vec<(String, Option<String>)>) -> Self {
        let mut entries = Vec::with_capacity(rows.len());
        let mut exact = HashMap::with_capacity(rows.len());
        let mut normalized = HashMap::with_capacity(rows.len());
        let mut symbols = HashMap::new();

        for (name, symbol) in rows {
            let idx = entries.len();
            let normalized_name = normalize(&name);
            let token_set = significant_tokens(&normalized_name);

            // First occurrence wins on every lookup map, matching the
            // scan-order tie-break used by the fuzzy strategies.
            exact.entry(name.to_lowercase()).or_insert(idx);
            if !normalized_name.is_empty() {
                normalized.entry(normalized_name.clone()).or_insert(idx);
            }
            if let Some(symbol) = &symbol {
                symbols.entry(symbol.to_uppercase()).or_insert(idx);
            }

            entries.push(CanonicalCompany {
                original_name: name,
                normalized_name,
                token_set,
                symbol,
            });
        }

        debug!(
            entries = entries.len(),
            normalized = normalized.len(),
            symbols = symbols.len(),
            "reference index built"
        );

        Self {
            entries,
            exact,
            normalized,
            symbols,
        }
    }

    /// Case-insensitive lookup of the full canonical spelling.
    pub fn exact_lookup(&self, name: &str) -> Option<&CanonicalCompany> {
        self.exact
            .get(&name.trim().to_lowercase())
            .map(|&idx| &self.entries[idx])
    }

    /// Lookup by an already-normalized form.
    pub fn normalized_lookup(&self, normalized_name: &str) -> Option<&CanonicalCompany> {
        self.normalized
            .get(normalized_name)
            .map(|&idx| &self.entries[idx])
    }

    /// Lookup by exchange symbol, case-insensitive.
    pub fn symbol_lookup(&self, symbol: &str) -> Option<&CanonicalCompany> {
        self.symbols
            .get(&symbol.trim().to_uppercase())
            .map(|&idx| &self.entries[idx])
    }

    /// All entries in reference-list order — the stable scan order for
    /// the substring and token-overlap strategies.
    pub fn entries(&self) -> &[CanonicalCompany] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_index() -> ReferenceIndex {
        ReferenceIndex::from_rows(vec![
            ("ICICI Bank Ltd.".to_string(), Some("ICICIBANK".to_string())),
            ("Reliance Industries Ltd.".to_string(), Some("RELIANCE".to_string())),
            ("Tata Consultancy Services Ltd.".to_string(), Some("TCS".to_string())),
        ])
    }

    #[test]
    fn test_exact_lookup_is_case_insensitive() {
        let index = sample_index();
        assert!(index.exact_lookup("icici bank ltd.").is_some());
        assert!(index.exact_lookup("ICICI BANK LTD.").is_some());
        assert!(index.exact_lookup("  Icici Bank Ltd. ").is_some());
        assert!(index.exact_lookup("icici bank").is_none());
    }

    #[test]
    fn test_normalized_lookup_uses_precomputed_forms() {
        let index = sample_index();
        let hit = index.normalized_lookup("reliance industries").unwrap();
        assert_eq!(hit.original_name, "Reliance Industries Ltd.");
    }

    #[test]
    fn test_symbol_lookup_is_case_insensitive() {
        let index = sample_index();
        assert_eq!(
            index.symbol_lookup("tcs").unwrap().original_name,
            "Tata Consultancy Services Ltd."
        );
    }

    #[test]
    fn test_entries_preserve_insertion_order() {
        let index = sample_index();
        let names: Vec<&str> = index
            .entries()
            .iter()
            .map(|e| e.original_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "ICICI Bank Ltd.",
                "Reliance Industries Ltd.",
                "Tata Consultancy Services Ltd.",
            ]
        );
    }

    #[test]
    fn test_from_csv_path_reads_name_and_symbol_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Company Name,Industry,Symbol").unwrap();
        writeln!(file, "ICICI Bank Ltd.,Banks,ICICIBANK").unwrap();
        writeln!(file, "Reliance Industries Ltd.,Energy,RELIANCE").unwrap();
        writeln!(file, ",,").unwrap();
        file.flush().unwrap();

        let index = ReferenceIndex::from_csv_path(file.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.symbol_lookup("RELIANCE").unwrap().original_name,
            "Reliance Industries Ltd."
        );
    }

    #[test]
    fn test_from_csv_path_missing_file_is_an_error() {
        let err = ReferenceIndex::from_csv_path(Path::new("/nonexistent/nifty.csv")).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[test]
    fn test_from_csv_path_rejects_empty_lists() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Company Name,Symbol").unwrap();
        file.flush().unwrap();

        let err = ReferenceIndex::from_csv_path(file.path()).unwrap_err();
        assert!(matches!(err, IndexError::Empty(_)));
    }
}
