//! Deterministic rendering of the canonical document.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use lexenrich_shared::{LexError, Result};

use crate::Document;

/// Annotation on the scaffold `<model>` element.
const MODEL_ANNOTATION: &str = " 模型信息 ";

/// Annotation on the scaffold `<data>` element under `<coordinate>`.
const DATA_ANNOTATION: &str = " 坐标数据 ";

type XmlWriter = Writer<Vec<u8>>;

fn write_failed(e: impl std::fmt::Display) -> LexError {
    LexError::validation(format!("xml write failed: {e}"))
}

fn start(w: &mut XmlWriter, name: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_failed)
}

fn end(w: &mut XmlWriter, name: &str) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_failed)
}

fn empty(w: &mut XmlWriter, name: &str) -> Result<()> {
    w.write_event(Event::Empty(BytesStart::new(name)))
        .map_err(write_failed)
}

fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        return empty(w, name);
    }
    start(w, name)?;
    w.write_event(Event::Text(BytesText::new(text)))
        .map_err(write_failed)?;
    end(w, name)
}

fn annotated_element(w: &mut XmlWriter, name: &str, annotation: &str) -> Result<()> {
    start(w, name)?;
    w.write_event(Event::Comment(BytesText::from_escaped(annotation)))
        .map_err(write_failed)?;
    end(w, name)
}

/// Render `doc` with a UTF-8 declaration and one-space indentation.
pub(crate) fn write(doc: &Document) -> Result<String> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 1);

    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(write_failed)?;
    start(&mut w, "word_definition")?;

    if doc.traditional_meaning.is_empty() {
        empty(&mut w, "traditional_meaning")?;
    } else {
        start(&mut w, "traditional_meaning")?;
        for entry in &doc.traditional_meaning {
            start(&mut w, "word_meaning")?;
            text_element(&mut w, "source", &entry.source)?;
            text_element(&mut w, "data", &entry.data)?;
            end(&mut w, "word_meaning")?;
        }
        end(&mut w, "traditional_meaning")?;
    }

    start(&mut w, "model_meaning")?;
    if doc.model_meaning.is_empty() {
        start(&mut w, "coordinate")?;
        annotated_element(&mut w, "model", MODEL_ANNOTATION)?;
        annotated_element(&mut w, "data", DATA_ANNOTATION)?;
        end(&mut w, "coordinate")?;
    } else {
        for entry in &doc.model_meaning {
            start(&mut w, "coordinate")?;
            text_element(&mut w, "model", &entry.model)?;
            text_element(&mut w, "data", &entry.data)?;
            end(&mut w, "coordinate")?;
        }
    }
    end(&mut w, "model_meaning")?;

    end(&mut w, "word_definition")?;

    let mut out = String::from_utf8(w.into_inner()).map_err(write_failed)?;
    out.push('\n');
    Ok(out)
}
