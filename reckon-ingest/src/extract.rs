//! Positional text extraction from PDF content streams.
//!
//! Each page's content stream is decoded and walked operator by operator,
//! tracking the text position so that every shown string keeps its x/y
//! coordinates. Fragments whose baselines sit within `LINE_TOLERANCE` points
//! of each other are grouped into one `RawLine`, ordered left to right.
//!
//! Pages are decoded lazily: `open` only loads the document, and lines are
//! produced page by page as the returned `LineStream` is iterated.

use std::collections::btree_map;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};
use reckon_core::{RawLine, TextSegment, UnreadablePdfError, UnreadableReason};

/// Baselines closer than this (in points) belong to the same visual line.
const LINE_TOLERANCE: f32 = 2.0;

/// A negative TJ adjustment wider than this (in thousandths of an em) is read as a space.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Load `path` and return a lazy iterator over its lines.
///
/// The file is read into memory and closed before this returns.
pub fn open(path: &Path) -> Result<LineStream, UnreadablePdfError> {
    let bytes = std::fs::read(path)
        .map_err(|e| UnreadablePdfError::new(path, UnreadableReason::Io(e.to_string())))?;

    let doc = Document::load_mem(&bytes).map_err(|e| {
        let msg = e.to_string();
        let reason = if msg.to_ascii_lowercase().contains("crypt") || mentions_encrypt(&bytes) {
            UnreadableReason::Encrypted
        } else {
            UnreadableReason::Corrupt(msg)
        };
        UnreadablePdfError::new(path, reason)
    })?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(UnreadablePdfError::new(path, UnreadableReason::Encrypted));
    }

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(UnreadablePdfError::new(path, UnreadableReason::NoPages));
    }
    tracing::debug!(path = %path.display(), pages = pages.len(), "opened PDF");

    Ok(LineStream {
        path: Arc::from(path),
        doc,
        pages: pages.into_iter(),
        pending: VecDeque::new(),
    })
}

/// A trailer `/Encrypt` key, found without parsing.
fn mentions_encrypt(bytes: &[u8]) -> bool {
    bytes.windows(8).any(|w| w == b"/Encrypt")
}

/// Load `path` and collect every line.
pub fn extract(path: &Path) -> Result<Vec<RawLine>, UnreadablePdfError> {
    open(path)?.materialize()
}

/// Lines of one document in reading order: page ascending, top to bottom,
/// left to right.
pub struct LineStream {
    path: Arc<Path>,
    doc: Document,
    pages: btree_map::IntoIter<u32, ObjectId>,
    pending: VecDeque<RawLine>,
}

impl LineStream {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Collect the remaining lines, failing if the document had no text at all.
    pub fn materialize(self) -> Result<Vec<RawLine>, UnreadablePdfError> {
        let path = self.path.clone();
        let lines: Vec<RawLine> = self.collect();
        if lines.is_empty() {
            return Err(UnreadablePdfError::new(
                path.as_ref(),
                UnreadableReason::NoTextLayer,
            ));
        }
        Ok(lines)
    }
}

impl Iterator for LineStream {
    type Item = RawLine;

    fn next(&mut self) -> Option<RawLine> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(line);
            }
            let (page_no, page_id) = self.pages.next()?;
            match page_fragments(&self.doc, page_id) {
                Ok(fragments) => {
                    self.pending
                        .extend(group_lines(fragments, page_no, &self.path));
                }
                Err(e) => {
                    // One bad page does not sink the document.
                    tracing::warn!(
                        path = %self.path.display(),
                        page = page_no,
                        error = %e,
                        "skipping undecodable page"
                    );
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    x: f32,
    y: f32,
    text: String,
}

fn page_fragments(doc: &Document, page_id: ObjectId) -> Result<Vec<Fragment>, lopdf::Error> {
    let data = doc.get_page_content(page_id)?;
    let content = Content::decode(&data)?;
    Ok(walk_operations(&content.operations))
}

/// Text-space state for the subset of operators that move or show text.
struct TextCursor {
    line_x: f32,
    line_y: f32,
    scale_x: f32,
    scale_y: f32,
    leading: f32,
    /// Set when the position changed since the last shown string
    moved: bool,
}

impl TextCursor {
    fn new() -> Self {
        Self {
            line_x: 0.0,
            line_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            leading: 0.0,
            moved: true,
        }
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.line_x += tx * self.scale_x;
        self.line_y += ty * self.scale_y;
        self.moved = true;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.translate(0.0, -leading);
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn operand(op: &Operation, i: usize) -> f32 {
    op.operands.get(i).and_then(number).unwrap_or(0.0)
}

fn walk_operations(ops: &[Operation]) -> Vec<Fragment> {
    let mut cursor = TextCursor::new();
    let mut out: Vec<Fragment> = Vec::new();

    for op in ops {
        match op.operator.as_str() {
            "BT" => {
                cursor.line_x = 0.0;
                cursor.line_y = 0.0;
                cursor.scale_x = 1.0;
                cursor.scale_y = 1.0;
                cursor.moved = true;
            }
            "TL" => cursor.leading = operand(op, 0),
            "Td" => cursor.translate(operand(op, 0), operand(op, 1)),
            "TD" => {
                cursor.leading = -operand(op, 1);
                cursor.translate(operand(op, 0), operand(op, 1));
            }
            "Tm" => {
                cursor.scale_x = non_zero(operand(op, 0));
                cursor.scale_y = non_zero(operand(op, 3));
                cursor.line_x = operand(op, 4);
                cursor.line_y = operand(op, 5);
                cursor.moved = true;
            }
            "T*" => cursor.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show(&mut cursor, &mut out, decode_pdf_string(bytes));
                }
            }
            "'" => {
                cursor.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    show(&mut cursor, &mut out, decode_pdf_string(bytes));
                }
            }
            "\"" => {
                cursor.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    show(&mut cursor, &mut out, decode_pdf_string(bytes));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let mut text = String::new();
                    for item in items {
                        match item {
                            Object::String(bytes, _) => text.push_str(&decode_pdf_string(bytes)),
                            other => {
                                if number(other).is_some_and(|n| n < -TJ_SPACE_THRESHOLD) {
                                    text.push(' ');
                                }
                            }
                        }
                    }
                    show(&mut cursor, &mut out, text);
                }
            }
            _ => {}
        }
    }

    out
}

fn non_zero(v: f32) -> f32 {
    if v == 0.0 { 1.0 } else { v }
}

/// Strings shown without an intervening move continue the previous fragment.
fn show(cursor: &mut TextCursor, out: &mut Vec<Fragment>, text: String) {
    if text.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if !cursor.moved => last.text.push_str(&text),
        _ => out.push(Fragment {
            x: cursor.line_x,
            y: cursor.line_y,
            text,
        }),
    }
    cursor.moved = false;
}

fn group_lines(mut fragments: Vec<Fragment>, page: u32, path: &Arc<Path>) -> Vec<RawLine> {
    fragments.retain(|f| !f.text.trim().is_empty());
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines = Vec::new();
    let mut current: Vec<Fragment> = Vec::new();

    for frag in fragments {
        let same_line = current
            .first()
            .is_some_and(|head| (head.y - frag.y).abs() <= LINE_TOLERANCE);
        if !same_line && !current.is_empty() {
            lines.push(finish_line(std::mem::take(&mut current), page, path));
        }
        current.push(frag);
    }
    if !current.is_empty() {
        lines.push(finish_line(current, page, path));
    }
    lines
}

fn finish_line(mut frags: Vec<Fragment>, page: u32, path: &Arc<Path>) -> RawLine {
    frags.sort_by(|a, b| a.x.total_cmp(&b.x));
    let y = frags[0].y;
    let segments = frags
        .into_iter()
        .map(|f| TextSegment {
            x: f.x,
            text: f.text.trim().to_string(),
        })
        .collect();
    RawLine::new(path.clone(), page, y, segments)
}

/// Decode a PDF string: UTF-16BE when it carries a byte order mark,
/// otherwise WinAnsi (Latin-1 plus the common 0x80..0x9F punctuation).
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| win_ansi(b)).collect()
}

fn win_ansi(b: u8) -> char {
    match b {
        0x80 => '€',
        0x85 => '…',
        0x91 => '‘',
        0x92 => '’',
        0x93 => '“',
        0x94 => '”',
        0x96 => '–',
        0x97 => '—',
        _ => b as char,
    }
}

/// Inverse of [`decode_pdf_string`] for text without a UTF-16 marker.
pub(crate) fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '–' => 0x96,
            '—' => 0x97,
            c if (c as u32) < 0x100 => c as u8,
            _ => b'?',
        })
        .collect()
}
