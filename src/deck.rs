//! Slide-deck parsing and per-slide text extraction.
//!
//! A `.pptx` file is a zip package; each slide lives at
//! `ppt/slides/slideN.xml` as DrawingML, with the visible text inside
//! `<a:t>` runs grouped into `<a:p>` paragraphs. [`Deck::parse`] opens the
//! package, validates it actually is one, and pulls the paragraph text out
//! of every slide in deck order.
//!
//! The extraction contract matters more than the parsing details:
//! [`Deck::slide_texts`] yields one `(slide_index, text)` pair per slide,
//! 1-based, in source order, with runs of whitespace collapsed to single
//! spaces. Slides with no text are **retained** with an empty string so the
//! final notes document numbers slides exactly like the source deck; the
//! runner decides to skip generation for them.

use crate::error::ExplainError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use tracing::debug;

/// Leading bytes of every zip-based OOXML package.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// A parsed slide deck: per-slide paragraph text, in deck order.
#[derive(Debug, Clone)]
pub struct Deck {
    slides: Vec<SlideText>,
}

/// Raw paragraph text of one slide, before normalisation.
#[derive(Debug, Clone)]
struct SlideText {
    paragraphs: Vec<String>,
}

impl Deck {
    /// Parse pptx bytes into a [`Deck`].
    ///
    /// `name` is the original artifact name, used only in error messages.
    ///
    /// # Errors
    /// [`ExplainError::DocumentFormat`] when the bytes are not a zip
    /// archive, the archive is not a PowerPoint package, or a slide part is
    /// not well-formed XML.
    pub fn parse(bytes: &[u8], name: &str) -> Result<Deck, ExplainError> {
        if bytes.len() < 4 || &bytes[..4] != ZIP_MAGIC {
            return Err(ExplainError::DocumentFormat {
                name: name.to_string(),
                detail: "missing zip signature (not an OOXML package)".to_string(),
            });
        }

        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExplainError::DocumentFormat {
                name: name.to_string(),
                detail: format!("unreadable zip archive: {e}"),
            })?;

        // A zip without the presentation part is some other OOXML flavour
        // (docx, xlsx) or a plain archive.
        let entry_names: Vec<String> = archive.file_names().map(str::to_string).collect();
        if !entry_names.iter().any(|n| n == "ppt/presentation.xml") {
            return Err(ExplainError::DocumentFormat {
                name: name.to_string(),
                detail: "no ppt/presentation.xml entry (not a PowerPoint package)".to_string(),
            });
        }

        // Slide parts are named slide1.xml, slide2.xml, ... — deck order is
        // their numeric order, not the archive's entry order.
        let mut slide_entries: Vec<(usize, String)> = entry_names
            .iter()
            .filter_map(|entry| slide_number(entry).map(|n| (n, entry.clone())))
            .collect();
        slide_entries.sort_unstable_by_key(|(n, _)| *n);

        let mut slides = Vec::with_capacity(slide_entries.len());
        for (number, entry) in slide_entries {
            let mut xml = String::new();
            archive
                .by_name(&entry)
                .map_err(|e| ExplainError::DocumentFormat {
                    name: name.to_string(),
                    detail: format!("cannot open {entry}: {e}"),
                })?
                .read_to_string(&mut xml)
                .map_err(|e| ExplainError::DocumentFormat {
                    name: name.to_string(),
                    detail: format!("cannot read {entry}: {e}"),
                })?;

            let paragraphs = parse_slide_xml(&xml).map_err(|detail| {
                ExplainError::DocumentFormat {
                    name: name.to_string(),
                    detail: format!("slide {number}: {detail}"),
                }
            })?;
            slides.push(SlideText { paragraphs });
        }

        debug!(slides = slides.len(), deck = name, "parsed deck");
        Ok(Deck { slides })
    }

    /// Number of slides in the deck.
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Ordered `(slide_index, text)` pairs, one per slide.
    ///
    /// `slide_index` is 1-based. `text` is the whitespace-normalised
    /// concatenation of the slide's paragraphs; empty slides yield an empty
    /// string rather than being dropped.
    pub fn slide_texts(&self) -> impl Iterator<Item = (usize, String)> + '_ {
        self.slides.iter().enumerate().map(|(i, slide)| {
            let joined = slide.paragraphs.join(" ");
            (i + 1, normalize_whitespace(&joined))
        })
    }
}

/// Extract `N` from an archive entry named `ppt/slides/slideN.xml`.
fn slide_number(entry: &str) -> Option<usize> {
    entry
        .strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Pull paragraph text out of one slide's DrawingML.
///
/// Text runs (`<a:t>`) accumulate into the current paragraph without extra
/// separators (a word may be split across runs by formatting); paragraph
/// ends (`</a:p>`) flush. Everything else is ignored.
fn parse_slide_xml(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    } else {
                        current.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_run {
                    let decoded = e.decode().map_err(|e| e.to_string())?;
                    current.push_str(&decoded);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parsing error: {e}")),
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Assemble a minimal pptx in memory, one slide per text entry.
    fn build_pptx(slide_texts: &[&str]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        writer
            .start_file("ppt/presentation.xml", options)
            .unwrap();
        writer
            .write_all(br#"<?xml version="1.0"?><p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"/>"#)
            .unwrap();

        for (i, text) in slide_texts.iter().enumerate() {
            writer
                .start_file(format!("ppt/slides/slide{}.xml", i + 1), options)
                .unwrap();
            let body = format!(
                r#"<?xml version="1.0"?><p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
            );
            writer.write_all(body.as_bytes()).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn rejects_non_zip_bytes() {
        let err = Deck::parse(b"not a deck", "bad.pptx").unwrap_err();
        assert!(matches!(err, ExplainError::DocumentFormat { .. }));
    }

    #[test]
    fn rejects_zip_without_presentation_part() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<doc/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = Deck::parse(&bytes, "actually.docx").unwrap_err();
        match err {
            ExplainError::DocumentFormat { detail, .. } => {
                assert!(detail.contains("PowerPoint"), "got: {detail}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extracts_slides_in_deck_order() {
        let bytes = build_pptx(&["First slide", "Second slide", "Third slide"]);
        let deck = Deck::parse(&bytes, "deck.pptx").unwrap();
        assert_eq!(deck.slide_count(), 3);

        let texts: Vec<(usize, String)> = deck.slide_texts().collect();
        assert_eq!(
            texts,
            vec![
                (1, "First slide".to_string()),
                (2, "Second slide".to_string()),
                (3, "Third slide".to_string()),
            ]
        );
    }

    #[test]
    fn empty_slides_are_retained() {
        let bytes = build_pptx(&["Has text", "", "Also text"]);
        let deck = Deck::parse(&bytes, "deck.pptx").unwrap();
        let texts: Vec<(usize, String)> = deck.slide_texts().collect();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[1], (2, String::new()));
    }

    #[test]
    fn whitespace_is_normalised() {
        let bytes = build_pptx(&["  Lots\t of \n  space  "]);
        let deck = Deck::parse(&bytes, "deck.pptx").unwrap();
        let texts: Vec<(usize, String)> = deck.slide_texts().collect();
        assert_eq!(texts[0].1, "Lots of space");
    }

    #[test]
    fn slide_texts_is_restartable() {
        let bytes = build_pptx(&["Once", "Twice"]);
        let deck = Deck::parse(&bytes, "deck.pptx").unwrap();
        let first: Vec<_> = deck.slide_texts().collect();
        let second: Vec<_> = deck.slide_texts().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn runs_in_a_paragraph_join_without_separator() {
        // A word split across two runs by formatting must not gain a space.
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p"><p:sp><p:txBody><a:p><a:r><a:t>Hel</a:t></a:r><a:r><a:t>lo</a:t></a:r></a:p></p:txBody></p:sp></p:sld>"#;
        let paragraphs = parse_slide_xml(xml).unwrap();
        assert_eq!(paragraphs, vec!["Hello".to_string()]);
    }

    #[test]
    fn slide_number_parsing() {
        assert_eq!(slide_number("ppt/slides/slide1.xml"), Some(1));
        assert_eq!(slide_number("ppt/slides/slide12.xml"), Some(12));
        assert_eq!(slide_number("ppt/slides/_rels/slide1.xml.rels"), None);
        assert_eq!(slide_number("ppt/slideLayouts/slideLayout1.xml"), None);
    }

    #[test]
    fn normalize_whitespace_examples() {
        assert_eq!(normalize_whitespace("a  b"), "a b");
        assert_eq!(normalize_whitespace("  \t\n  "), "");
        assert_eq!(normalize_whitespace("one"), "one");
    }
}
