//! Per-record stage machine: normalize → extract → enrich → merge → persist.

use std::future::Future;

use tracing::{debug, instrument, warn};

use lexenrich_document::{
    append_meaning_entry, extract_definition_by_source, normalize, serialize,
};
use lexenrich_shared::{BatchSettings, LexError, LexicalRecord, RecordStage, Result};
use lexenrich_storage::LexiconStore;

use crate::enrichment::DescriptionExpander;

/// Description merged in place of a generated one during a dry run.
pub const DRY_RUN_DESCRIPTION: &str = "(dry run: description not generated)";

/// The two store operations the batch needs.
pub trait RecordStore: Send + Sync {
    fn fetch_candidates(
        &self,
        min_id: i64,
    ) -> impl Future<Output = Result<Vec<LexicalRecord>>> + Send;

    fn persist_document(
        &self,
        id: i64,
        document: &str,
    ) -> impl Future<Output = Result<u64>> + Send;
}

impl RecordStore for LexiconStore {
    async fn fetch_candidates(&self, min_id: i64) -> Result<Vec<LexicalRecord>> {
        LexiconStore::fetch_candidates(self, min_id).await
    }

    async fn persist_document(&self, id: i64, document: &str) -> Result<u64> {
        LexiconStore::persist_document(self, id, document).await
    }
}

/// A record that made it through every stage.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub id: i64,
    /// Whether a short definition under the source tag was found.
    pub definition_found: bool,
    /// The merged document as written (or as it would be, in a dry run).
    pub document: String,
    /// Rows touched by the write-back. `None` in a dry run.
    pub rows_affected: Option<u64>,
}

/// A record that stopped at `stage`.
#[derive(Debug)]
pub struct RecordFailure {
    pub id: i64,
    pub stage: RecordStage,
    pub error: LexError,
}

impl RecordFailure {
    fn at(id: i64, stage: RecordStage) -> impl FnOnce(LexError) -> Self {
        move |error| Self { id, stage, error }
    }

    pub fn is_fatal(&self) -> bool {
        self.error.is_batch_fatal()
    }

    /// Wrap into the error the batch returns when it stops on this record.
    pub fn into_aborted(self) -> LexError {
        LexError::BatchAborted {
            id: self.id,
            stage: self.stage,
            source: Box::new(self.error),
        }
    }
}

/// Drive one record through every stage. No retries.
#[instrument(skip_all, fields(id = record.id, term = %record.term))]
pub async fn process_record<S, E>(
    record: LexicalRecord,
    store: &S,
    expander: &E,
    settings: &BatchSettings,
) -> std::result::Result<RecordOutcome, RecordFailure>
where
    S: RecordStore,
    E: DescriptionExpander,
{
    let LexicalRecord { id, term, document } = record;

    let doc = normalize(&document).map_err(RecordFailure::at(id, RecordStage::Normalized))?;

    let definition = extract_definition_by_source(&doc, &settings.source_tag);
    let definition_found = definition.is_some();
    if !definition_found {
        warn!(id, source = %settings.source_tag, "no short definition under source tag");
    }
    let definition = definition.unwrap_or_default();

    let description = if settings.dry_run {
        DRY_RUN_DESCRIPTION.to_string()
    } else {
        expander
            .expand(&term, definition)
            .await
            .map_err(RecordFailure::at(id, RecordStage::Enriched))?
    };

    let merged = append_meaning_entry(&doc, settings.model_tag.as_str(), description);
    let xml = serialize(&merged).map_err(RecordFailure::at(id, RecordStage::Merged))?;

    let rows_affected = if settings.dry_run {
        None
    } else {
        let rows = store
            .persist_document(id, &xml)
            .await
            .map_err(RecordFailure::at(id, RecordStage::Persisted))?;
        if rows == 0 {
            warn!(id, "update matched no rows; record may have been removed");
        }
        Some(rows)
    };

    debug!(id, stage = %RecordStage::Persisted, "record complete");
    Ok(RecordOutcome {
        id,
        definition_found,
        document: xml,
        rows_affected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const C_LANG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<word_definition>
 <traditional_meaning>
  <noun>
   <word_meaning>
    <source>www.zgbk.com</source>
    <data>一种通用的过程式编程语言。</data>
   </word_meaning>
  </noun>
 </traditional_meaning>
</word_definition>"#;

    #[derive(Default)]
    struct MapStore {
        rows: Mutex<BTreeMap<i64, String>>,
        fail: bool,
    }

    impl RecordStore for MapStore {
        async fn fetch_candidates(&self, _min_id: i64) -> Result<Vec<LexicalRecord>> {
            Ok(Vec::new())
        }

        async fn persist_document(&self, id: i64, document: &str) -> Result<u64> {
            if self.fail {
                return Err(LexError::store(
                    lexenrich_shared::StoreErrorKind::Operational,
                    "database is locked",
                ));
            }
            let mut rows = self.rows.lock().unwrap();
            Ok(match rows.get_mut(&id) {
                Some(doc) => {
                    *doc = document.to_string();
                    1
                }
                None => 0,
            })
        }
    }

    /// Echoes its inputs; records what it was asked.
    #[derive(Default)]
    struct EchoExpander {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl DescriptionExpander for EchoExpander {
        async fn expand(&self, term: &str, definition: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((term.to_string(), definition.to_string()));
            Ok(format!("{term}是{definition}"))
        }
    }

    struct FailingExpander;

    impl DescriptionExpander for FailingExpander {
        async fn expand(&self, _term: &str, _definition: &str) -> Result<String> {
            Err(LexError::Service("HTTP 503".into()))
        }
    }

    fn settings() -> BatchSettings {
        BatchSettings {
            start_index: 0,
            workers: 1,
            source_tag: "www.zgbk.com".into(),
            model_tag: "Initial_Thaw_DS".into(),
            dry_run: false,
        }
    }

    fn record(id: i64, term: &str, document: &str) -> LexicalRecord {
        LexicalRecord {
            id,
            term: term.into(),
            document: document.into(),
        }
    }

    fn store_with(id: i64) -> MapStore {
        let store = MapStore::default();
        store.rows.lock().unwrap().insert(id, String::new());
        store
    }

    #[tokio::test]
    async fn happy_path_persists_merged_document() {
        let store = store_with(7);
        let expander = EchoExpander::default();

        let outcome = process_record(record(7, "C语言", C_LANG), &store, &expander, &settings())
            .await
            .expect("record should succeed");

        assert_eq!(outcome.rows_affected, Some(1));
        assert!(outcome.definition_found);
        assert_eq!(
            expander.calls.lock().unwrap().as_slice(),
            [("C语言".to_string(), "一种通用的过程式编程语言。".to_string())]
        );

        let written = store.rows.lock().unwrap()[&7].clone();
        assert_eq!(written, outcome.document);
        let doc = normalize(&written).unwrap();
        assert_eq!(doc.meanings().len(), 2);
        assert_eq!(doc.meanings()[1].source, "Initial_Thaw_DS");
        assert_eq!(doc.meanings()[1].data, "C语言是一种通用的过程式编程语言。");
    }

    #[tokio::test]
    async fn missing_definition_sends_empty_text() {
        let store = store_with(1);
        let expander = EchoExpander::default();
        let xml = "<word_definition><traditional_meaning/></word_definition>";

        let outcome = process_record(record(1, "苹果", xml), &store, &expander, &settings())
            .await
            .unwrap();

        assert!(!outcome.definition_found);
        assert_eq!(expander.calls.lock().unwrap()[0].1, "");
    }

    #[tokio::test]
    async fn malformed_document_fails_at_normalize_and_is_not_fatal() {
        let store = store_with(3);
        let expander = EchoExpander::default();
        let failure = process_record(record(3, "x", "<broken>"), &store, &expander, &settings())
            .await
            .unwrap_err();

        assert_eq!(failure.id, 3);
        assert_eq!(failure.stage, RecordStage::Normalized);
        assert!(!failure.is_fatal());
        assert_eq!(store.rows.lock().unwrap()[&3], "");
    }

    #[tokio::test]
    async fn service_failure_stops_before_persist() {
        let store = store_with(4);
        let failure =
            process_record(record(4, "C语言", C_LANG), &store, &FailingExpander, &settings())
                .await
                .unwrap_err();

        assert_eq!(failure.stage, RecordStage::Enriched);
        assert!(failure.is_fatal());
        assert_eq!(store.rows.lock().unwrap()[&4], "");

        let aborted = failure.into_aborted();
        let msg = aborted.to_string();
        assert!(msg.contains("record 4"), "got: {msg}");
        assert!(msg.contains("HTTP 503"), "got: {msg}");
    }

    #[tokio::test]
    async fn store_failure_is_fatal_at_persist() {
        let store = MapStore {
            fail: true,
            ..MapStore::default()
        };
        let expander = EchoExpander::default();
        let failure = process_record(record(9, "C语言", C_LANG), &store, &expander, &settings())
            .await
            .unwrap_err();
        assert_eq!(failure.stage, RecordStage::Persisted);
        assert!(failure.is_fatal());
    }

    #[tokio::test]
    async fn zero_row_update_is_not_an_error() {
        let store = MapStore::default();
        let expander = EchoExpander::default();
        let outcome = process_record(record(5, "C语言", C_LANG), &store, &expander, &settings())
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, Some(0));
    }

    #[tokio::test]
    async fn dry_run_skips_service_and_store() {
        let store = store_with(2);
        let expander = EchoExpander::default();
        let dry = BatchSettings {
            dry_run: true,
            ..settings()
        };

        let outcome = process_record(record(2, "C语言", C_LANG), &store, &expander, &dry)
            .await
            .unwrap();

        assert_eq!(outcome.rows_affected, None);
        assert!(outcome.document.contains(DRY_RUN_DESCRIPTION));
        assert!(expander.calls.lock().unwrap().is_empty());
        assert_eq!(store.rows.lock().unwrap()[&2], "");
    }
}
