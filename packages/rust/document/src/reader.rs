//! Single-pass XML scanner that pulls meaning and coordinate entries out of a
//! document regardless of how deeply the meanings are nested.

use quick_xml::Reader;
use quick_xml::events::Event;

use lexenrich_shared::{LexError, Result};

use crate::{CoordinateEntry, MeaningEntry};

/// Everything the transformer needs from one pass over a document.
#[derive(Debug, Default)]
pub(crate) struct Scan {
    /// Every `word_meaning` in the document, in pre-order.
    pub meanings: Vec<MeaningEntry>,
    /// Populated `coordinate` entries directly under `model_meaning`.
    pub coordinates: Vec<CoordinateEntry>,
    /// Whether the root has a `traditional_meaning` child.
    pub has_traditional: bool,
    /// Whether the root has a `model_meaning` child.
    pub has_model: bool,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Source(usize),
    MeaningData(usize),
    Model(usize),
    CoordinateData(usize),
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Root,
    Traditional,
    ModelSection,
    WordMeaning(usize),
    Coordinate(usize),
    Field(Slot),
    Other,
}

struct Frame {
    name: String,
    role: Role,
}

struct Scanner {
    scan: Scan,
    stack: Vec<Frame>,
    saw_root: bool,
}

impl Scanner {
    fn open(&mut self, name: String) -> Result<()> {
        let role = match self.stack.last().map(|f| f.role) {
            None => {
                if self.saw_root {
                    return Err(LexError::malformed(format!(
                        "second root element <{name}>"
                    )));
                }
                self.saw_root = true;
                Role::Root
            }
            Some(_) if name == "word_meaning" => {
                self.scan.meanings.push(MeaningEntry::default());
                Role::WordMeaning(self.scan.meanings.len() - 1)
            }
            Some(Role::WordMeaning(i)) => match name.as_str() {
                "source" if self.scan.meanings[i].source.is_empty() => Role::Field(Slot::Source(i)),
                "data" if self.scan.meanings[i].data.is_empty() => {
                    Role::Field(Slot::MeaningData(i))
                }
                _ => Role::Other,
            },
            Some(Role::Root) if name == "traditional_meaning" => {
                self.scan.has_traditional = true;
                Role::Traditional
            }
            Some(Role::Root) if name == "model_meaning" => {
                self.scan.has_model = true;
                Role::ModelSection
            }
            Some(Role::ModelSection) if name == "coordinate" => {
                self.scan.coordinates.push(CoordinateEntry::default());
                Role::Coordinate(self.scan.coordinates.len() - 1)
            }
            Some(Role::Coordinate(i)) => match name.as_str() {
                "model" if self.scan.coordinates[i].model.is_empty() => Role::Field(Slot::Model(i)),
                "data" if self.scan.coordinates[i].data.is_empty() => {
                    Role::Field(Slot::CoordinateData(i))
                }
                _ => Role::Other,
            },
            Some(_) => Role::Other,
        };
        self.stack.push(Frame { name, role });
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<()> {
        match self.stack.pop() {
            Some(frame) if frame.name == name => Ok(()),
            Some(frame) => Err(LexError::malformed(format!(
                "</{name}> closes <{}>",
                frame.name
            ))),
            None => Err(LexError::malformed(format!("</{name}> has no open element"))),
        }
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let Some(frame) = self.stack.last() else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(LexError::malformed("text outside the root element"));
        };
        if let Role::Field(slot) = frame.role {
            let target = match slot {
                Slot::Source(i) => &mut self.scan.meanings[i].source,
                Slot::MeaningData(i) => &mut self.scan.meanings[i].data,
                Slot::Model(i) => &mut self.scan.coordinates[i].model,
                Slot::CoordinateData(i) => &mut self.scan.coordinates[i].data,
            };
            target.push_str(text);
        }
        Ok(())
    }
}

/// Scan `xml` in one pass.
pub(crate) fn scan(xml: &str) -> Result<Scan> {
    // Text is kept raw; whole fields are trimmed once the pass is done.
    let mut reader = Reader::from_str(xml);

    let mut scanner = Scanner {
        scan: Scan::default(),
        stack: Vec::new(),
        saw_root: false,
    };

    loop {
        let event = reader.read_event().map_err(|e| {
            LexError::malformed(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                scanner.open(name)?;
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                scanner.open(name.clone())?;
                scanner.close(&name)?;
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                scanner.close(&name)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| LexError::malformed(format!("bad text content: {e}")))?;
                scanner.text(&text)?;
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                scanner.text(&String::from_utf8_lossy(&raw))?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype.
            _ => {}
        }
    }

    if let Some(frame) = scanner.stack.last() {
        return Err(LexError::malformed(format!(
            "unclosed element <{}>",
            frame.name
        )));
    }
    if !scanner.saw_root {
        return Err(LexError::malformed("no root element"));
    }

    let mut scan = scanner.scan;
    for entry in &mut scan.meanings {
        trim_in_place(&mut entry.source);
        trim_in_place(&mut entry.data);
    }
    for entry in &mut scan.coordinates {
        trim_in_place(&mut entry.model);
        trim_in_place(&mut entry.data);
    }
    // The unpopulated scaffold coordinate carries only annotation comments.
    scan.coordinates.retain(|c| !(c.model.is_empty() && c.data.is_empty()));

    Ok(scan)
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}
