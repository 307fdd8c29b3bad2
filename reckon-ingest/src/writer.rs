//! Minimal text-only PDF writer.
//!
//! Renders positioned strings with a standard Courier font so that the output
//! reads back through [`crate::extract`] with the same coordinates. Used by
//! `reckon sample` and by the test suites to build statement fixtures.

use std::path::Path;

use anyhow::Result;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

use crate::extract::encode_win_ansi;

const FONT_SIZE: i64 = 9;
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;

/// A string drawn with its left baseline at (`x`, `y`).
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

impl PlacedText {
    pub fn new(x: f32, y: f32, text: impl Into<String>) -> Self {
        Self {
            x,
            y,
            text: text.into(),
        }
    }
}

/// Write one page per entry of `pages` to `path`.
pub fn write_text_pdf(path: &Path, pages: &[Vec<PlacedText>]) -> Result<()> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for placed in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)],
            ),
        ];
        for item in placed {
            operations.push(Operation::new(
                "Tm",
                vec![
                    Object::Integer(1),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(1),
                    Object::Integer(item.x.round() as i64),
                    Object::Integer(item.y.round() as i64),
                ],
            ));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(&item.text), StringFormat::Literal)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_pdf_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        let pages = vec![
            vec![
                PlacedText::new(50.0, 700.0, "01 Apr 25"),
                PlacedText::new(100.0, 700.0, "CR EMPLOYER"),
                PlacedText::new(420.0, 700.0, "£50.00"),
            ],
            vec![PlacedText::new(50.0, 760.0, "page two")],
        ];
        write_text_pdf(&path, &pages).unwrap();

        let lines = crate::extract(&path).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "01 Apr 25 CR EMPLOYER £50.00");
        assert_eq!(lines[0].segments[2].x, 420.0);
        assert_eq!(lines[1].page, 2);
    }
}
