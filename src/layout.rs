//! Optional document layout model.
//!
//! A rule-based pass over the text lines that yields paragraph and title
//! blocks plus a column count. The model only *guides* earlier phases:
//! anchor scoring downweights windows overlapping paragraph blocks, and the
//! far-side trim uses title blocks to keep section headings out of crops.
//! Every consumer degrades gracefully when the model is absent.

use serde::Serialize;

use crate::caption::CaptionScanner;
use crate::geometry::Rect;
use crate::metrics::LineMetrics;
use crate::page::{DocumentContent, TextLine};

/// Minimum classified lines for the model to be considered trustworthy.
const MIN_MODEL_LINES: usize = 20;

/// Line classification used while building blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    Caption,
    Title,
    Paragraph,
    Other,
}

/// Paragraph/title geometry of one page.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub paragraph_blocks: Vec<Rect>,
    pub title_blocks: Vec<Rect>,
    pub caption_lines: Vec<Rect>,
}

/// The document-wide model.
#[derive(Debug, Clone)]
pub struct DocumentLayout {
    pub columns: u8,
    pub typical_font_size: f32,
    pub typical_line_height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pages: Vec<PageLayout>,
}

impl DocumentLayout {
    pub fn page(&self, index: usize) -> Option<&PageLayout> {
        self.pages.get(index)
    }

    /// Build the model. Returns `None` when the document carries too little
    /// text to classify (the caller logs `LayoutModelUnavailable` and every
    /// phase falls back to its unguided form).
    pub fn build(
        doc: &DocumentContent,
        metrics: &LineMetrics,
        scanner: &CaptionScanner,
    ) -> Option<DocumentLayout> {
        let total_lines: usize = doc.pages.iter().map(|p| p.lines.len()).sum();
        if total_lines < MIN_MODEL_LINES {
            return None;
        }

        let page_width = doc
            .pages
            .first()
            .map(|p| p.rect.width())
            .unwrap_or(612.0);
        let columns = detect_columns(doc, page_width);
        let (margin_left, margin_right) = estimate_margins(doc, page_width);

        let column_width = if columns == 2 {
            0.5 * (page_width - margin_left - margin_right)
        } else {
            page_width - margin_left - margin_right
        };

        let mut pages = Vec::with_capacity(doc.pages.len());
        for page in &doc.pages {
            let mut layout = PageLayout::default();
            let mut para_run: Option<Rect> = None;
            let mut para_run_block = usize::MAX;

            for line in &page.lines {
                let class = classify_line(line, metrics, scanner, column_width);
                match class {
                    LineClass::Paragraph => {
                        match &mut para_run {
                            Some(run) if line.block == para_run_block => {
                                *run = run.union(&line.rect);
                            }
                            _ => {
                                if let Some(run) = para_run.take() {
                                    layout.paragraph_blocks.push(run);
                                }
                                para_run = Some(line.rect);
                                para_run_block = line.block;
                            }
                        }
                    }
                    other => {
                        if let Some(run) = para_run.take() {
                            layout.paragraph_blocks.push(run);
                        }
                        match other {
                            LineClass::Title => layout.title_blocks.push(line.rect),
                            LineClass::Caption => layout.caption_lines.push(line.rect),
                            _ => {}
                        }
                    }
                }
            }
            if let Some(run) = para_run.take() {
                layout.paragraph_blocks.push(run);
            }
            pages.push(layout);
        }

        Some(DocumentLayout {
            columns,
            typical_font_size: metrics.typical_font_size,
            typical_line_height: metrics.typical_line_height,
            margin_left,
            margin_right,
            pages,
        })
    }

    /// Serializable summary written to `layout_model.json`.
    pub fn summary(&self) -> LayoutSummary {
        LayoutSummary {
            columns: self.columns,
            typical_font_size: round1(self.typical_font_size),
            typical_line_height: round1(self.typical_line_height),
            margins: [round1(self.margin_left), round1(self.margin_right)],
            pages: self
                .pages
                .iter()
                .enumerate()
                .map(|(i, p)| PageSummary {
                    page: i + 1,
                    paragraph_blocks: p.paragraph_blocks.len(),
                    title_blocks: p.title_blocks.len(),
                    caption_lines: p.caption_lines.len(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LayoutSummary {
    pub columns: u8,
    pub typical_font_size: f32,
    pub typical_line_height: f32,
    /// `[left, right]` in points.
    pub margins: [f32; 2],
    pub pages: Vec<PageSummary>,
}

#[derive(Debug, Serialize)]
pub struct PageSummary {
    pub page: usize,
    pub paragraph_blocks: usize,
    pub title_blocks: usize,
    pub caption_lines: usize,
}

fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

fn classify_line(
    line: &TextLine,
    metrics: &LineMetrics,
    scanner: &CaptionScanner,
    column_width: f32,
) -> LineClass {
    let text = line.text.trim();
    if text.is_empty() {
        return LineClass::Other;
    }

    if scanner.match_line(text).is_some() {
        return LineClass::Caption;
    }

    let size_ratio = line.font_size / metrics.typical_font_size.max(1.0);
    let short = text.chars().count() < 80;
    let numbered_heading = text.len() > 2
        && text.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
        && text.contains(' ')
        && short
        && line.bold;
    if (line.bold && size_ratio > 1.05 && short) || numbered_heading {
        return LineClass::Title;
    }

    let wide = line.rect.width() >= 0.45 * column_width;
    let body_size = (0.8..=1.25).contains(&size_ratio);
    if wide && body_size && text.chars().count() > 20 {
        return LineClass::Paragraph;
    }

    LineClass::Other
}

/// One or two columns, from the left-edge histogram of body-width lines.
fn detect_columns(doc: &DocumentContent, page_width: f32) -> u8 {
    let mut left_edges: Vec<f32> = Vec::new();
    for page in doc.pages.iter().take(crate::metrics::SAMPLE_PAGES) {
        for line in &page.lines {
            if line.rect.width() > 0.2 * page_width {
                left_edges.push(line.rect.x0);
            }
        }
    }
    if left_edges.len() < 10 {
        return 1;
    }

    left_edges.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let min = left_edges[0];
    // Count lines starting well to the right of the leftmost cluster.
    let right_start = min + 0.25 * page_width;
    let right = left_edges.iter().filter(|&&x| x > right_start).count();
    let ratio = right as f32 / left_edges.len() as f32;
    if ratio > 0.25 {
        2
    } else {
        1
    }
}

fn estimate_margins(doc: &DocumentContent, page_width: f32) -> (f32, f32) {
    let mut lefts: Vec<f32> = Vec::new();
    let mut rights: Vec<f32> = Vec::new();
    for page in doc.pages.iter().take(crate::metrics::SAMPLE_PAGES) {
        for line in &page.lines {
            lefts.push(line.rect.x0);
            rights.push(page.rect.x1 - line.rect.x1);
        }
    }
    if lefts.is_empty() {
        return (0.1 * page_width, 0.1 * page_width);
    }
    lefts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    rights.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    // 5th percentile keeps stray page furniture from zeroing the margins.
    let p5 = lefts.len() / 20;
    (lefts[p5], rights[p5].max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{assemble_lines, PageContent, TextSpan};

    fn span(text: &str, x0: f32, y0: f32, w: f32, size: f32, bold: bool) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            rect: Rect::new(x0, y0, x0 + w, y0 + size),
            font_size: size,
            font_name: if bold { "Times-Bold" } else { "Times-Roman" }.to_string(),
            bold,
        }
    }

    fn single_column_doc() -> DocumentContent {
        let mut spans = Vec::new();
        // A bold section heading, a body paragraph, a caption.
        spans.push(span("1 Introduction", 72.0, 80.0, 140.0, 14.0, true));
        for i in 0..12 {
            spans.push(span(
                "This body paragraph line carries enough characters to classify.",
                72.0,
                110.0 + i as f32 * 12.0,
                460.0,
                10.0,
                false,
            ));
        }
        spans.push(span(
            "Figure 1: A caption line for the layout model.",
            72.0,
            420.0,
            300.0,
            9.0,
            false,
        ));
        for i in 0..10 {
            spans.push(span(
                "Second body paragraph continues with plenty of text in every line.",
                72.0,
                450.0 + i as f32 * 12.0,
                460.0,
                10.0,
                false,
            ));
        }
        let mut page = PageContent::new(0, Rect::new(0.0, 0.0, 612.0, 792.0));
        page.lines = assemble_lines(spans);
        DocumentContent {
            pdf_name: "layout.pdf".to_string(),
            pdf_hash: String::new(),
            pages: vec![page],
        }
    }

    #[test]
    fn model_builds_blocks() {
        let doc = single_column_doc();
        let metrics = LineMetrics::with_line_height(12.0);
        let model =
            DocumentLayout::build(&doc, &metrics, &CaptionScanner::new()).expect("model builds");
        assert_eq!(model.columns, 1);
        let page = model.page(0).unwrap();
        assert!(
            page.paragraph_blocks.len() >= 2,
            "expected two paragraph runs, got {:?}",
            page.paragraph_blocks
        );
        assert_eq!(page.title_blocks.len(), 1);
        assert_eq!(page.caption_lines.len(), 1);
    }

    #[test]
    fn paragraph_blocks_cover_their_lines() {
        let doc = single_column_doc();
        let metrics = LineMetrics::with_line_height(12.0);
        let model = DocumentLayout::build(&doc, &metrics, &CaptionScanner::new()).unwrap();
        let blocks = &model.page(0).unwrap().paragraph_blocks;
        let first = blocks
            .iter()
            .find(|b| b.y0 < 130.0)
            .expect("first paragraph block");
        assert!(first.height() > 100.0);
    }

    #[test]
    fn sparse_document_has_no_model() {
        let doc = DocumentContent {
            pdf_name: "empty.pdf".to_string(),
            pdf_hash: String::new(),
            pages: vec![PageContent::new(0, Rect::new(0.0, 0.0, 612.0, 792.0))],
        };
        let metrics = LineMetrics::default();
        assert!(DocumentLayout::build(&doc, &metrics, &CaptionScanner::new()).is_none());
    }

    #[test]
    fn two_column_detection() {
        let mut spans = Vec::new();
        for i in 0..15 {
            let y = 100.0 + i as f32 * 12.0;
            spans.push(span(
                "left column body text with plenty of characters in it",
                50.0,
                y,
                240.0,
                10.0,
                false,
            ));
            spans.push(span(
                "right column body text with plenty of characters too",
                320.0,
                y,
                240.0,
                10.0,
                false,
            ));
        }
        let mut page = PageContent::new(0, Rect::new(0.0, 0.0, 612.0, 792.0));
        page.lines = assemble_lines(spans);
        let doc = DocumentContent {
            pdf_name: "two-col.pdf".to_string(),
            pdf_hash: String::new(),
            pages: vec![page],
        };
        let metrics = LineMetrics::with_line_height(12.0);
        let model = DocumentLayout::build(&doc, &metrics, &CaptionScanner::new()).unwrap();
        assert_eq!(model.columns, 2);
    }

    #[test]
    fn summary_serializes() {
        let doc = single_column_doc();
        let metrics = LineMetrics::with_line_height(12.0);
        let model = DocumentLayout::build(&doc, &metrics, &CaptionScanner::new()).unwrap();
        let json = serde_json::to_string(&model.summary()).unwrap();
        assert!(json.contains("\"columns\":1"));
        assert!(json.contains("\"pages\""));
    }
}
