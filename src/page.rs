//! Page content snapshot.
//!
//! The backend reduces every page to this plain-data model once, up front:
//! text lines (assembled from positioned spans), raster image bounds and
//! classified vector objects. All scoring and refinement phases work on
//! these snapshots; nothing downstream of the backend touches pdfium.

use crate::geometry::Rect;

/// A positioned run of text with uniform font attributes.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub text: String,
    pub rect: Rect,
    /// Font size in points (approximated by glyph height when the backend
    /// cannot resolve the nominal size).
    pub font_size: f32,
    pub font_name: String,
    pub bold: bool,
}

/// A reconstructed text line.
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    pub rect: Rect,
    pub font_size: f32,
    pub bold: bool,
    /// Index of the owning block within the page.
    pub block: usize,
    pub spans: Vec<TextSpan>,
}

impl TextLine {
    /// Convenience constructor for synthetic content (tests, probes).
    pub fn synthetic(text: &str, rect: Rect, font_size: f32) -> Self {
        TextLine {
            text: text.to_string(),
            rect,
            font_size,
            bold: false,
            block: 0,
            spans: Vec::new(),
        }
    }
}

/// Coarse classification of a non-text page object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    /// Embedded raster image.
    Raster,
    /// General vector path (charts, diagrams, boxes).
    VectorPath,
    /// Wide, flat path - a horizontal rule.
    HorizontalLine,
    /// Tall, thin path - a vertical rule.
    VerticalLine,
}

/// A drawing or image object reduced to its bounds.
#[derive(Debug, Clone, Copy)]
pub struct DrawObject {
    pub rect: Rect,
    pub kind: DrawKind,
}

/// Classify a vector path bbox by aspect ratio, mirroring the rule used for
/// line/grid awareness: ratio >= 8 is a horizontal rule, <= 1/8 vertical.
pub fn classify_path(rect: Rect) -> DrawKind {
    let ar = rect.width() / rect.height().max(1e-6);
    if ar >= 8.0 {
        DrawKind::HorizontalLine
    } else if ar <= 1.0 / 8.0 {
        DrawKind::VerticalLine
    } else {
        DrawKind::VectorPath
    }
}

/// Read-only snapshot of one page.
#[derive(Debug, Clone)]
pub struct PageContent {
    /// 0-based page index.
    pub index: usize,
    pub rect: Rect,
    pub lines: Vec<TextLine>,
    pub objects: Vec<DrawObject>,
}

impl PageContent {
    pub fn new(index: usize, rect: Rect) -> Self {
        PageContent {
            index,
            rect,
            lines: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Bounds of raster images on the page.
    pub fn image_rects(&self) -> impl Iterator<Item = Rect> + '_ {
        self.objects
            .iter()
            .filter(|o| o.kind == DrawKind::Raster)
            .map(|o| o.rect)
    }

    /// Bounds of vector objects (paths and rules).
    pub fn vector_rects(&self) -> impl Iterator<Item = Rect> + '_ {
        self.objects
            .iter()
            .filter(|o| o.kind != DrawKind::Raster)
            .map(|o| o.rect)
    }

    /// All object bounds regardless of kind.
    pub fn object_rects(&self) -> impl Iterator<Item = Rect> + '_ {
        self.objects.iter().map(|o| o.rect)
    }

    /// Horizontal rules, used by table scoring and edge snapping.
    pub fn horizontal_rules(&self) -> impl Iterator<Item = Rect> + '_ {
        self.objects
            .iter()
            .filter(|o| o.kind == DrawKind::HorizontalLine)
            .map(|o| o.rect)
    }

    /// Lines belonging to the given block, in reading order.
    pub fn block_lines(&self, block: usize) -> impl Iterator<Item = &TextLine> {
        self.lines.iter().filter(move |l| l.block == block)
    }

    /// Total characters of the block's text (caption-structure scoring).
    pub fn block_char_count(&self, block: usize) -> usize {
        self.block_lines(block).map(|l| l.text.chars().count()).sum()
    }
}

/// Whole-document snapshot plus identity metadata for the index.
#[derive(Debug, Clone)]
pub struct DocumentContent {
    pub pdf_name: String,
    /// `sha256:<first 16 hex>` of the input bytes; empty when unknown.
    pub pdf_hash: String,
    pub pages: Vec<PageContent>,
}

impl DocumentContent {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Assemble lines from raw spans: group by vertical overlap, split columns at
/// wide horizontal gaps, then group lines into blocks by vertical adjacency.
///
/// The span list does not need to be ordered.
pub fn assemble_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    if spans.is_empty() {
        return Vec::new();
    }

    spans.sort_by(|a, b| {
        a.rect
            .center_y()
            .partial_cmp(&b.rect.center_y())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.rect
                    .x0
                    .partial_cmp(&b.rect.x0)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    // Group spans sharing a baseline band.
    let mut rows: Vec<Vec<TextSpan>> = Vec::new();
    for span in spans {
        let fits = rows.last().map(|row: &Vec<TextSpan>| {
            let last = row.last().expect("rows are never empty");
            let tol = 0.4 * last.rect.height().max(span.rect.height()).max(1.0);
            (span.rect.center_y() - last.rect.center_y()).abs() < tol
        });
        if fits == Some(true) {
            rows.last_mut().expect("just checked").push(span);
        } else {
            rows.push(vec![span]);
        }
    }

    // Split rows at column-sized gaps, then materialize lines.
    let mut lines: Vec<TextLine> = Vec::new();
    for mut row in rows {
        row.sort_by(|a, b| {
            a.rect
                .x0
                .partial_cmp(&b.rect.x0)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut current: Vec<TextSpan> = Vec::new();
        for span in row {
            if let Some(prev) = current.last() {
                let gap = span.rect.x0 - prev.rect.x1;
                let split_at = 2.0 * prev.font_size.max(span.font_size).max(6.0);
                if gap > split_at {
                    lines.push(line_from_spans(std::mem::take(&mut current)));
                }
            }
            current.push(span);
        }
        if !current.is_empty() {
            lines.push(line_from_spans(current));
        }
    }

    lines.sort_by(|a, b| {
        a.rect
            .y0
            .partial_cmp(&b.rect.y0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.rect
                    .x0
                    .partial_cmp(&b.rect.x0)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });
    assign_blocks(&mut lines);
    lines
}

fn line_from_spans(spans: Vec<TextSpan>) -> TextLine {
    let mut text = String::new();
    let mut rect = spans[0].rect;
    let mut font_size = 0.0_f32;
    let mut bold = false;

    for (i, span) in spans.iter().enumerate() {
        if i > 0 {
            let prev = &spans[i - 1];
            let gap = span.rect.x0 - prev.rect.x1;
            if gap > 0.2 * span.font_size.max(4.0) && !text.ends_with(' ') {
                text.push(' ');
            }
        }
        text.push_str(&span.text);
        rect = rect.union(&span.rect);
        font_size = font_size.max(span.font_size);
        bold = bold || span.bold;
    }

    TextLine {
        text,
        rect,
        font_size,
        bold,
        block: 0,
        spans,
    }
}

/// Group vertically adjacent, horizontally overlapping lines into blocks.
fn assign_blocks(lines: &mut [TextLine]) {
    let mut next_block = 0usize;
    let mut prev: Option<(usize, Rect)> = None;

    for line in lines.iter_mut() {
        let block = match prev {
            Some((blk, prev_rect)) => {
                let gap = line.rect.y0 - prev_rect.y1;
                let near = gap >= -2.0 && gap < 0.9 * prev_rect.height().max(6.0);
                let overlaps = line.rect.x_overlap(&prev_rect) > 0.0;
                if near && overlaps {
                    blk
                } else {
                    next_block += 1;
                    next_block
                }
            }
            None => 0,
        };
        line.block = block;
        prev = Some((block, line.rect));
    }
}
