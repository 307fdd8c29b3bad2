//! reckon-ingest: PDF layout extraction, statement segmentation and column-based
//! transaction line parsing.

pub mod extract;
pub mod parsers;
pub mod segment;
pub mod writer;

pub use extract::{extract, open, LineStream};
pub use parsers::{LineParser, ParseOutcome};
pub use segment::{SegmentOutcome, Segmenter};
pub use writer::{write_text_pdf, PlacedText};
