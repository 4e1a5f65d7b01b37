//! Core domain types for lexenrich batches.

/// Source tag of the encyclopedia entry whose definition seeds enrichment.
pub const DEFAULT_SOURCE_TAG: &str = "www.zgbk.com";

/// Source tag stamped on meaning entries produced by the enrichment model.
pub const DEFAULT_MODEL_TAG: &str = "Initial_Thaw_DS";

// ---------------------------------------------------------------------------
// LexicalRecord
// ---------------------------------------------------------------------------

/// One row of the lexical entry table as read by a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalRecord {
    /// Stable, unique row id. Also the resume checkpoint axis.
    pub id: i64,
    /// The headword.
    pub term: String,
    /// The stored document text (XML).
    pub document: String,
}

// ---------------------------------------------------------------------------
// RecordStage
// ---------------------------------------------------------------------------

/// Pipeline states a record moves through, in order.
///
/// A failed record is reported with the stage it was trying to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordStage {
    Fetched,
    Normalized,
    Extracted,
    Enriched,
    Merged,
    Persisted,
}

impl RecordStage {
    /// Short verb used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetched => "fetch",
            Self::Normalized => "normalize",
            Self::Extracted => "extract",
            Self::Enriched => "enrich",
            Self::Merged => "merge",
            Self::Persisted => "persist",
        }
    }
}

impl std::fmt::Display for RecordStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
