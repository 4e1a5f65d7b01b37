//! Canonical lexical document model and its XML transforms.
//!
//! Stored documents arrive in a variety of legacy shapes, with meaning entries
//! nested under part-of-speech wrappers at arbitrary depth. [`normalize`]
//! flattens them into the canonical two-section schema:
//!
//! ```text
//! <word_definition>
//!  <traditional_meaning>
//!   <word_meaning><source>…</source><data>…</data></word_meaning>
//!  </traditional_meaning>
//!  <model_meaning>
//!   <coordinate><model>…</model><data>…</data></coordinate>
//!  </model_meaning>
//! </word_definition>
//! ```
//!
//! Every other operation works on the canonical [`Document`] value and never
//! mutates its input.

mod reader;
mod writer;

use std::path::PathBuf;

use tracing::{debug, instrument};

use lexenrich_shared::{LexError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One provenance-tagged definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeaningEntry {
    /// Where the definition came from (an encyclopedia domain, a model tag).
    pub source: String,
    /// The definition text.
    pub data: String,
}

impl MeaningEntry {
    pub fn new(source: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            data: data.into(),
        }
    }
}

/// One embedding/vector annotation for the term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinateEntry {
    /// Embedding model identifier.
    pub model: String,
    /// Serialized coordinates.
    pub data: String,
}

/// A document in canonical form. Both sections always exist, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    traditional_meaning: Vec<MeaningEntry>,
    model_meaning: Vec<CoordinateEntry>,
}

impl Document {
    /// An empty canonical document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Meaning entries in ingestion order.
    pub fn meanings(&self) -> &[MeaningEntry] {
        &self.traditional_meaning
    }

    /// Populated coordinate entries.
    pub fn coordinates(&self) -> &[CoordinateEntry] {
        &self.model_meaning
    }
}

/// Where a raw document comes from. Resolved once, at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// The XML text itself (e.g. a database column).
    RawText(String),
    /// A file containing the XML text.
    FilePath(PathBuf),
}

impl DocumentSource {
    /// Resolve to the document text.
    pub fn load(self) -> Result<String> {
        match self {
            Self::RawText(text) => Ok(text),
            Self::FilePath(path) => {
                std::fs::read_to_string(&path).map_err(|e| LexError::io(&path, e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Parse a raw document of any nesting shape into canonical form.
///
/// Every `word_meaning` found anywhere is kept, in document order. The
/// `model_meaning` section starts out empty: coordinates are regenerated
/// downstream, never carried over from legacy input.
#[instrument(skip_all, fields(len = raw.len()))]
pub fn normalize(raw: &str) -> Result<Document> {
    let scan = reader::scan(raw)?;
    debug!(meanings = scan.meanings.len(), "normalized document");
    Ok(Document {
        traditional_meaning: scan.meanings,
        model_meaning: Vec::new(),
    })
}

/// Data of the first meaning entry whose source is exactly `source_tag`.
pub fn extract_definition_by_source<'a>(doc: &'a Document, source_tag: &str) -> Option<&'a str> {
    doc.traditional_meaning
        .iter()
        .find(|entry| entry.source == source_tag)
        .map(|entry| entry.data.as_str())
}

/// A copy of `doc` with one more meaning entry at the end.
pub fn append_meaning_entry(
    doc: &Document,
    source_tag: impl Into<String>,
    data: impl Into<String>,
) -> Document {
    let mut next = doc.clone();
    next.traditional_meaning.push(MeaningEntry::new(source_tag, data));
    next
}

/// A copy of `doc` with one more coordinate entry at the end.
pub fn append_coordinate_entry(
    doc: &Document,
    model: impl Into<String>,
    data: impl Into<String>,
) -> Document {
    let mut next = doc.clone();
    next.model_meaning.push(CoordinateEntry {
        model: model.into(),
        data: data.into(),
    });
    next
}

/// Render `doc` as persisted text. Output is a pure function of the value.
pub fn serialize(doc: &Document) -> Result<String> {
    writer::write(doc)
}

// ---------------------------------------------------------------------------
// Merges on stored canonical text
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Section {
    Traditional,
    Model,
}

impl Section {
    fn name(self) -> &'static str {
        match self {
            Self::Traditional => "traditional_meaning",
            Self::Model => "model_meaning",
        }
    }
}

/// Read canonical text without discarding its coordinates.
///
/// Unlike [`normalize`], the `required` section must already be present.
fn parse_canonical(xml: &str, required: Section) -> Result<Document> {
    let scan = reader::scan(xml)?;
    let present = match required {
        Section::Traditional => scan.has_traditional,
        Section::Model => scan.has_model,
    };
    if !present {
        return Err(LexError::MissingSection {
            section: required.name(),
        });
    }
    Ok(Document {
        traditional_meaning: scan.meanings,
        model_meaning: scan.coordinates,
    })
}

/// Append a meaning entry to stored canonical text.
///
/// Fails with [`LexError::MissingSection`] when the text has no
/// `traditional_meaning` section.
pub fn append_meaning_entry_raw(xml: &str, source_tag: &str, data: &str) -> Result<String> {
    let doc = parse_canonical(xml, Section::Traditional)?;
    serialize(&append_meaning_entry(&doc, source_tag, data))
}

/// Append a coordinate entry to stored canonical text.
///
/// Fails with [`LexError::MissingSection`] when the text has no
/// `model_meaning` section.
pub fn append_coordinate_entry_raw(xml: &str, model: &str, data: &str) -> Result<String> {
    let doc = parse_canonical(xml, Section::Model)?;
    serialize(&append_coordinate_entry(&doc, model, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<word_definition>
	<traditional_meaning>
		<Noun>
			<word_meaning>
				<source>www.zgbk.com</source>
				<data>一种通用的过程式编程语言。</data>
			</word_meaning>
		</Noun>
	</traditional_meaning>
	<model_meaning/>
</word_definition>"#;

    fn doc_with(entries: &[(&str, &str)]) -> Document {
        entries.iter().fold(Document::new(), |doc, (s, d)| {
            append_meaning_entry(&doc, *s, *d)
        })
    }

    #[test]
    fn normalize_flattens_nested_meanings() {
        let doc = normalize(LEGACY).unwrap();
        assert_eq!(
            doc.meanings(),
            &[MeaningEntry::new("www.zgbk.com", "一种通用的过程式编程语言。")]
        );
        assert!(doc.coordinates().is_empty());
    }

    #[test]
    fn normalize_without_meanings_gives_empty_section() {
        let doc = normalize("<word_definition><traditional_meaning/></word_definition>").unwrap();
        assert!(doc.meanings().is_empty());
        let xml = serialize(&doc).unwrap();
        assert!(xml.contains("<traditional_meaning/>"));
        assert!(xml.contains("<model_meaning>"));
    }

    #[test]
    fn normalize_drops_legacy_coordinates() {
        let xml = "<word_definition><traditional_meaning/><model_meaning>\
                   <coordinate><model>m</model><data>1,2</data></coordinate>\
                   </model_meaning></word_definition>";
        assert!(normalize(xml).unwrap().coordinates().is_empty());
    }

    #[test]
    fn normalize_rejects_malformed_input() {
        let err = normalize("<word_definition><traditional_meaning>").unwrap_err();
        assert!(matches!(err, LexError::MalformedDocument { .. }));
    }

    #[test]
    fn extraction_hit() {
        let doc = normalize(LEGACY).unwrap();
        assert_eq!(
            extract_definition_by_source(&doc, "www.zgbk.com"),
            Some("一种通用的过程式编程语言。")
        );
    }

    #[test]
    fn extraction_miss() {
        let doc = doc_with(&[("baike.baidu.com", "a"), ("zh.wikipedia.org", "b")]);
        assert_eq!(extract_definition_by_source(&doc, "www.zgbk.com"), None);
        assert_eq!(extract_definition_by_source(&Document::new(), "www.zgbk.com"), None);
    }

    #[test]
    fn extraction_takes_first_match_and_is_repeatable() {
        let doc = doc_with(&[
            ("other", "x"),
            ("www.zgbk.com", "first"),
            ("www.zgbk.com", "second"),
        ]);
        let a = extract_definition_by_source(&doc, "www.zgbk.com");
        let b = extract_definition_by_source(&doc, "www.zgbk.com");
        assert_eq!(a, Some("first"));
        assert_eq!(a, b);
    }

    #[test]
    fn append_keeps_input_and_orders_new_last() {
        let original = doc_with(&[("www.zgbk.com", "old")]);
        let merged = append_meaning_entry(&original, "Initial_Thaw_DS", "X");

        assert_eq!(original.meanings().len(), 1);
        assert_eq!(merged.meanings().len(), 2);
        assert_eq!(merged.meanings()[0], MeaningEntry::new("www.zgbk.com", "old"));
        assert_eq!(merged.meanings()[1], MeaningEntry::new("Initial_Thaw_DS", "X"));
    }

    #[test]
    fn append_does_not_deduplicate() {
        let doc = doc_with(&[("a", "same")]);
        let doc = append_meaning_entry(&doc, "a", "same");
        assert_eq!(doc.meanings().len(), 2);
    }

    #[test]
    fn coordinate_merge_targets_the_given_document() {
        let original = normalize(LEGACY).unwrap();
        let merged = append_coordinate_entry(&original, "bge-large-zh-v1.5", "0.12,0.56");

        assert!(original.coordinates().is_empty());
        assert_eq!(merged.coordinates().len(), 1);
        assert_eq!(merged.coordinates()[0].model, "bge-large-zh-v1.5");
        assert_eq!(merged.meanings(), original.meanings());
    }

    #[test]
    fn coordinate_merge_on_stored_text_survives_serialization() {
        let stored = serialize(&normalize(LEGACY).unwrap()).unwrap();
        let once = append_coordinate_entry_raw(&stored, "bge", "1,2").unwrap();
        let twice = append_coordinate_entry_raw(&once, "bge", "3,4").unwrap();

        assert!(!once.contains("模型信息"));
        assert!(twice.contains("<data>1,2</data>"));
        assert!(twice.contains("<data>3,4</data>"));
        assert!(twice.contains("<source>www.zgbk.com</source>"));
    }

    #[test]
    fn raw_merge_reports_missing_section() {
        let xml = "<word_definition><model_meaning/></word_definition>";
        let err = append_meaning_entry_raw(xml, "s", "d").unwrap_err();
        assert!(matches!(
            err,
            LexError::MissingSection {
                section: "traditional_meaning"
            }
        ));

        let err = append_coordinate_entry_raw(
            "<word_definition><traditional_meaning/></word_definition>",
            "m",
            "d",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LexError::MissingSection {
                section: "model_meaning"
            }
        ));
    }

    #[test]
    fn raw_meaning_merge_appends() {
        let stored = serialize(&normalize(LEGACY).unwrap()).unwrap();
        let merged = append_meaning_entry_raw(&stored, "Initial_Thaw_DS", "X").unwrap();
        let doc = normalize(&merged).unwrap();
        assert_eq!(doc.meanings().len(), 2);
        assert_eq!(doc.meanings()[1].source, "Initial_Thaw_DS");
    }

    #[test]
    fn serialize_has_fixed_shape() {
        let doc = doc_with(&[("www.zgbk.com", "a < b & c")]);
        let xml = serialize(&doc).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(xml.contains("<source>www.zgbk.com</source>"));
        assert!(xml.contains("a &lt; b &amp; c"));
        assert!(xml.contains("<!-- 模型信息 -->"));
        assert!(xml.contains("<!-- 坐标数据 -->"));
        let traditional = xml.find("<traditional_meaning>").unwrap();
        let model = xml.find("<model_meaning>").unwrap();
        assert!(traditional < model);
        assert_eq!(xml, serialize(&doc).unwrap());
    }

    #[test]
    fn roundtrip_is_stable() {
        let inputs = [
            LEGACY,
            "<word_definition/>",
            "<x><word_meaning><source> padded </source><data>\n  text\n</data></word_meaning>\
             <word_meaning><data>no source</data></word_meaning></x>",
        ];
        for raw in inputs {
            let first = normalize(raw).unwrap();
            let text = serialize(&first).unwrap();
            let second = normalize(&text).unwrap();
            assert_eq!(first, second, "input: {raw}");
            assert_eq!(text, serialize(&second).unwrap());
        }
    }

    #[test]
    fn document_source_resolves_text_and_files() {
        let text = DocumentSource::RawText(LEGACY.into()).load().unwrap();
        assert_eq!(text, LEGACY);

        let path = std::env::temp_dir().join(format!("lexenrich_doc_{}.xml", std::process::id()));
        std::fs::write(&path, LEGACY).unwrap();
        let loaded = DocumentSource::FilePath(path.clone()).load().unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, LEGACY);

        let missing = DocumentSource::FilePath("/nonexistent/lexenrich.xml".into()).load();
        assert!(matches!(missing, Err(LexError::Io { .. })));
    }
}
