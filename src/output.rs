//! The persisted explanation document.
//!
//! A [`DeckNotes`] is an ordered sequence of [`SlideNotes`], one per source
//! slide, serialised as a bare JSON array so the file is self-describing and
//! trivially consumable by any client:
//!
//! ```json
//! [
//!   { "slide_index": 1, "generated_texts": ["..."] },
//!   { "slide_index": 2, "generated_texts": [] }
//! ]
//! ```
//!
//! The document is created once, atomically, by the pipeline runner and is
//! immutable thereafter; slides with no extractable text keep their entry
//! with an empty `generated_texts` so indexing always matches the source
//! deck.

use serde::{Deserialize, Serialize};

/// Generated explanations for a single slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideNotes {
    /// 1-based slide position, matching the source deck exactly.
    pub slide_index: usize,
    /// Ordered generated paragraphs; empty when the slide had no text or
    /// the model produced nothing.
    pub generated_texts: Vec<String>,
}

/// The complete notes document for one deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeckNotes {
    pub slides: Vec<SlideNotes>,
}

impl DeckNotes {
    /// Number of slide entries.
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    /// Whether `slide_index` values are exactly `1..=len()` in order.
    ///
    /// Holds for every document the runner produces; exposed so tests and
    /// downstream consumers can validate documents read back from disk.
    pub fn is_well_ordered(&self) -> bool {
        self.slides
            .iter()
            .enumerate()
            .all(|(i, s)| s.slide_index == i + 1)
    }

    /// Serialise to the on-disk JSON representation.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Parse the on-disk JSON representation.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeckNotes {
        DeckNotes {
            slides: vec![
                SlideNotes {
                    slide_index: 1,
                    generated_texts: vec!["Intro paragraph.".into()],
                },
                SlideNotes {
                    slide_index: 2,
                    generated_texts: vec![],
                },
                SlideNotes {
                    slide_index: 3,
                    generated_texts: vec!["A.".into(), "B.".into()],
                },
            ],
        }
    }

    #[test]
    fn serialises_as_bare_array() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 3);
        assert_eq!(json[0]["slide_index"], 1);
        assert_eq!(json[1]["generated_texts"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn round_trips() {
        let notes = sample();
        let bytes = notes.to_json().unwrap();
        let back = DeckNotes::from_json(&bytes).unwrap();
        assert_eq!(notes, back);
    }

    #[test]
    fn well_ordered_check() {
        assert!(sample().is_well_ordered());
        let scrambled = DeckNotes {
            slides: vec![SlideNotes {
                slide_index: 2,
                generated_texts: vec![],
            }],
        };
        assert!(!scrambled.is_well_ordered());
    }
}
