//! Read access to a report's searchable text layer, and the annotation sink
//! used when writing a highlighted copy.
//!
//! Pages are addressed 1-based everywhere, matching the citation convention of
//! the extraction oracle.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Axis-aligned region on a page, in points from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

pub trait Document {
    fn page_count(&self) -> u32;

    /// Plain text of a 1-based page, `None` when out of range.
    fn page_text(&self, page: u32) -> Option<&str>;

    /// Regions where `needle` occurs on the page. Matching ignores ASCII case
    /// and treats any run of whitespace, including line breaks, as one space.
    fn search_for(&self, page: u32, needle: &str) -> Vec<Rect>;

    fn page_bounds(&self, page: u32) -> Option<Rect>;
}

pub trait AnnotatableDocument: Document {
    fn add_highlight(&mut self, page: u32, rect: Rect) -> Result<()>;

    fn insert_text(&mut self, page: u32, x: f64, y: f64, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Highlight { page: u32, rect: Rect },
    Text { page: u32, x: f64, y: f64, text: String },
}

const MARGIN: f64 = 36.0;
const CHAR_WIDTH: f64 = 6.0;
const LINE_HEIGHT: f64 = 12.0;
const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;

/// In-memory text layer with fixed-pitch geometry: column `c` of line `l`
/// sits at `(36 + 6c, 36 + 12l)`.
#[derive(Debug, Clone, Default)]
pub struct TextDocument {
    pages: Vec<String>,
    annotations: Vec<Annotation>,
}

/// One searchable character with the line/column it came from.
struct Glyph {
    ch: char,
    line: usize,
    col: usize,
}

impl TextDocument {
    pub fn from_pages<S: Into<String>>(pages: impl IntoIterator<Item = S>) -> Self {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
            annotations: Vec::new(),
        }
    }

    /// Splits plain text on form feeds, the page separator `pdftotext` and
    /// similar tools emit.
    pub fn from_form_feed_text(text: &str) -> Self {
        let mut pages: Vec<&str> = text.split('\x0c').collect();
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        Self::from_pages(pages)
    }

    #[cfg(feature = "pdf")]
    pub fn from_pdf(path: &Path) -> Result<Self> {
        let pages = pdf_extract::extract_text_by_pages(path)
            .map_err(|e| ReconcileError::DocumentError(format!("{}: {}", path.display(), e)))?;
        let document = Self::from_pages(pages);
        log::debug!(
            "Loaded {} pages of text from {}",
            document.page_count(),
            path.display()
        );
        Ok(document)
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Writes the recorded annotations as JSON next to the page count.
    pub fn save_annotations(&self, path: &Path) -> Result<()> {
        let payload = serde_json::json!({
            "page_count": self.page_count(),
            "annotations": self.annotations,
        });
        std::fs::write(path, serde_json::to_string_pretty(&payload)?)?;
        Ok(())
    }

    fn page_index(&self, page: u32) -> Option<usize> {
        if page == 0 || page as usize > self.pages.len() {
            None
        } else {
            Some(page as usize - 1)
        }
    }

    fn check_page(&self, page: u32) -> Result<()> {
        self.page_index(page).map(|_| ()).ok_or_else(|| {
            ReconcileError::DocumentError(format!(
                "page {} out of range (document has {} pages)",
                page,
                self.pages.len()
            ))
        })
    }

    fn glyphs(text: &str) -> Vec<Glyph> {
        let mut glyphs: Vec<Glyph> = Vec::new();
        let mut in_space = true;
        for (line, content) in text.lines().enumerate() {
            for (col, ch) in content.chars().enumerate() {
                if ch.is_whitespace() {
                    if !in_space {
                        glyphs.push(Glyph { ch: ' ', line, col });
                        in_space = true;
                    }
                } else {
                    glyphs.push(Glyph {
                        ch: ch.to_ascii_lowercase(),
                        line,
                        col,
                    });
                    in_space = false;
                }
            }
            if !in_space {
                glyphs.push(Glyph {
                    ch: ' ',
                    line,
                    col: content.chars().count(),
                });
                in_space = true;
            }
        }
        glyphs
    }

    fn rects_for_span(span: &[Glyph]) -> Vec<Rect> {
        let mut rects: Vec<Rect> = Vec::new();
        let mut current: Option<(usize, usize, usize)> = None;
        for glyph in span.iter().filter(|g| g.ch != ' ') {
            current = match current {
                Some((line, start, _)) if line == glyph.line => Some((line, start, glyph.col)),
                Some(done) => {
                    rects.push(Self::line_rect(done));
                    Some((glyph.line, glyph.col, glyph.col))
                }
                None => Some((glyph.line, glyph.col, glyph.col)),
            };
        }
        if let Some(done) = current {
            rects.push(Self::line_rect(done));
        }
        rects
    }

    fn line_rect((line, start, end): (usize, usize, usize)) -> Rect {
        let y0 = MARGIN + line as f64 * LINE_HEIGHT;
        Rect::new(
            MARGIN + start as f64 * CHAR_WIDTH,
            y0,
            MARGIN + (end + 1) as f64 * CHAR_WIDTH,
            y0 + LINE_HEIGHT,
        )
    }
}

impl Document for TextDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_text(&self, page: u32) -> Option<&str> {
        self.page_index(page).map(|i| self.pages[i].as_str())
    }

    fn search_for(&self, page: u32, needle: &str) -> Vec<Rect> {
        let Some(text) = self.page_text(page) else {
            return Vec::new();
        };
        let pattern: Vec<char> = needle
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if pattern.is_empty() {
            return Vec::new();
        }

        let glyphs = Self::glyphs(text);
        let mut rects = Vec::new();
        let mut start = 0;
        while start + pattern.len() <= glyphs.len() {
            let window = &glyphs[start..start + pattern.len()];
            if window.iter().zip(&pattern).all(|(g, p)| g.ch == *p) {
                rects.extend(Self::rects_for_span(window));
                start += pattern.len();
            } else {
                start += 1;
            }
        }
        rects
    }

    fn page_bounds(&self, page: u32) -> Option<Rect> {
        let text = self.page_text(page)?;
        let lines = text.lines().count() as f64;
        let widest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
        Some(Rect::new(
            0.0,
            0.0,
            PAGE_WIDTH.max(2.0 * MARGIN + widest * CHAR_WIDTH),
            PAGE_HEIGHT.max(2.0 * MARGIN + lines * LINE_HEIGHT),
        ))
    }
}

impl AnnotatableDocument for TextDocument {
    fn add_highlight(&mut self, page: u32, rect: Rect) -> Result<()> {
        self.check_page(page)?;
        self.annotations.push(Annotation::Highlight { page, rect });
        Ok(())
    }

    fn insert_text(&mut self, page: u32, x: f64, y: f64, text: &str) -> Result<()> {
        self.check_page(page)?;
        self.annotations.push(Annotation::Text {
            page,
            x,
            y,
            text: text.to_string(),
        });
        Ok(())
    }
}
