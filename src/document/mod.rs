//! Decoding of the controller's `plant.xml` status document.
//!
//! The document is a root element holding `cdd` controller elements, each of
//! which holds `edd` inverter elements. All data lives in attributes:
//!
//! ```xml
//! <root>
//!   <cdd pout_W="120.5" etot_Wh="3400" status="Run">
//!     <edd ts="01-05-24 10:00:00" macrf="AA:BB" Pout_W="60.1" ... />
//!   </cdd>
//! </root>
//! ```
//!
//! Broken markup rejects the whole document. A record whose attributes can't
//! be converted is dropped on its own and its siblings are still returned.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::warn;

use crate::model::Record;

mod fields;

pub use fields::{Attributes, FieldError};

const CONTROLLER_TAG: &[u8] = b"cdd";
const INVERTER_TAG: &[u8] = b"edd";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed document at byte {position}: {source}")]
    Malformed {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("document has no root element")]
    NoRoot,

    #[error("document ended with {depth} unclosed element(s)")]
    Unclosed { depth: usize },

    #[error("unexpected content outside the root element at byte {position}")]
    OutsideRoot { position: u64 },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedDocument {
    /// Converted records in document order, a controller before its inverters.
    pub records: Vec<Record>,
    /// Records left out because one of their attributes couldn't be converted.
    pub dropped: usize,
}

impl ParsedDocument {
    fn push(&mut self, record: Result<Record, FieldError>, describe: impl FnOnce() -> String) {
        match record {
            Ok(record) => self.records.push(record),
            Err(err) => {
                warn!("Dropping {}: {}", describe(), err);
                self.dropped += 1;
            }
        }
    }
}

fn malformed<B>(reader: &Reader<B>, source: quick_xml::Error) -> DocumentError {
    DocumentError::Malformed {
        position: reader.error_position() as u64,
        source,
    }
}

//The reader has already consumed the whole tag when its attributes are read
fn malformed_attribute<B>(reader: &Reader<B>, source: quick_xml::Error) -> DocumentError {
    DocumentError::Malformed {
        position: reader.buffer_position() as u64,
        source,
    }
}

/// Values are decoded with the encoding the document declares.
fn collect_attributes<B>(
    reader: &Reader<B>,
    element: &BytesStart,
) -> Result<Attributes, DocumentError> {
    let mut attributes = Attributes::default();

    for attribute in element.attributes() {
        let attribute = attribute.map_err(|err| malformed_attribute(reader, err.into()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| malformed_attribute(reader, err))?
            .into_owned();
        attributes.insert(key, value);
    }

    Ok(attributes)
}

/// Handles an element opening at `depth`, where the root sits at depth 0.
fn visit_element<B>(
    reader: &Reader<B>,
    element: &BytesStart,
    depth: usize,
    in_controller: bool,
    captured_at: i64,
    parsed: &mut ParsedDocument,
) -> Result<(), DocumentError> {
    let tag = element.local_name();

    if depth == 1 && tag.as_ref() == CONTROLLER_TAG {
        let attributes = collect_attributes(reader, element)?;
        let record = fields::plant_snapshot(&attributes, captured_at).map(Record::Plant);
        parsed.push(record, || "controller record".to_string());
    } else if depth == 2 && in_controller && tag.as_ref() == INVERTER_TAG {
        let attributes = collect_attributes(reader, element)?;
        let record = fields::panel_snapshot(&attributes).map(Record::Panel);
        parsed.push(record, || {
            format!(
                "inverter record {}",
                attributes.get("macrf").unwrap_or("<unknown>")
            )
        });
    }

    Ok(())
}

/// Decodes a plant document.
///
/// `captured_at` stamps every controller record; inverter records carry
/// their own sample time.
pub fn parse(document: &[u8], captured_at: i64) -> Result<ParsedDocument, DocumentError> {
    let mut reader = Reader::from_reader(document);
    let mut buf = Vec::new();

    let mut parsed = ParsedDocument::default();
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut in_controller = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => {
                if depth == 0 && root_seen {
                    return Err(DocumentError::OutsideRoot {
                        position: reader.buffer_position() as u64,
                    });
                }
                root_seen = true;

                visit_element(&reader, &element, depth, in_controller, captured_at, &mut parsed)?;

                if depth == 1 {
                    in_controller = element.local_name().as_ref() == CONTROLLER_TAG;
                }
                depth += 1;
            }
            Ok(Event::Empty(element)) => {
                if depth == 0 && root_seen {
                    return Err(DocumentError::OutsideRoot {
                        position: reader.buffer_position() as u64,
                    });
                }
                root_seen = true;

                visit_element(&reader, &element, depth, in_controller, captured_at, &mut parsed)?;
            }
            Ok(Event::End(_)) => {
                //Unmatched end tags come back from the reader as errors
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    in_controller = false;
                }
            }
            Ok(Event::Text(text)) => {
                if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) {
                    return Err(DocumentError::OutsideRoot {
                        position: reader.buffer_position() as u64,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(malformed(&reader, err)),
        }
        buf.clear();
    }

    if !root_seen {
        return Err(DocumentError::NoRoot);
    }

    if depth != 0 {
        return Err(DocumentError::Unclosed { depth });
    }

    Ok(parsed)
}
