//! Document line-metrics probe.
//!
//! Samples up to five pages and derives the typical body font size and line
//! height. These feed the adaptive thresholds of the trim and anchor phases
//! (`adjacent_th = 2L`, `far_text_th = 10L`, `text_trim_gap = 0.5L`,
//! `far_side_min_dist = 8L`).

use crate::page::DocumentContent;

/// Number of pages the probe samples from the front of the document.
pub const SAMPLE_PAGES: usize = 5;

/// Minimum line samples before the probe trusts its own statistics.
const MIN_SAMPLES: usize = 8;

/// Conservative fallback when a document has too little body text.
const DEFAULT_LINE_HEIGHT: f32 = 12.0;
const DEFAULT_FONT_SIZE: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct LineMetrics {
    pub typical_font_size: f32,
    pub typical_line_height: f32,
    pub typical_line_gap: f32,
    pub median_line_height: f32,
    pub p75_line_height: f32,
}

impl LineMetrics {
    pub fn typical_line_height(&self) -> f32 {
        self.typical_line_height
    }

    /// A metrics value with everything derived from one line height; used by
    /// config resolution tests and degenerate documents.
    pub fn with_line_height(line_h: f32) -> Self {
        LineMetrics {
            typical_font_size: line_h * DEFAULT_FONT_SIZE / DEFAULT_LINE_HEIGHT,
            typical_line_height: line_h,
            typical_line_gap: (line_h - line_h * DEFAULT_FONT_SIZE / DEFAULT_LINE_HEIGHT)
                .max(0.0),
            median_line_height: line_h,
            p75_line_height: line_h,
        }
    }
}

impl Default for LineMetrics {
    fn default() -> Self {
        Self::with_line_height(DEFAULT_LINE_HEIGHT)
    }
}

/// Probe the document. Lines shorter than 10 pt or flatter than 3 pt are
/// noise; only spans with body-plausible font sizes (8–14 pt) count.
pub fn estimate_line_metrics(doc: &DocumentContent) -> LineMetrics {
    let mut font_sizes: Vec<f32> = Vec::new();
    let mut line_heights: Vec<f32> = Vec::new();

    for page in doc.pages.iter().take(SAMPLE_PAGES) {
        let lines = &page.lines;
        for (i, line) in lines.iter().enumerate() {
            if line.rect.height() < 3.0 || line.rect.width() < 10.0 {
                continue;
            }
            if (8.0..=14.0).contains(&line.font_size) {
                font_sizes.push(line.font_size);
            }

            // Line advance: height plus the gap to the previous line of the
            // same block, when that gap is plausible.
            if i > 0 {
                let prev = &lines[i - 1];
                if prev.block == line.block {
                    let gap = line.rect.y0 - prev.rect.y1;
                    let height = line.rect.height();
                    if gap > 0.0 && gap < 30.0 && height > 3.0 && height < 30.0 {
                        line_heights.push(height + gap);
                    }
                }
            }
        }
    }

    if font_sizes.len() < MIN_SAMPLES || line_heights.len() < MIN_SAMPLES {
        return LineMetrics::default();
    }

    let typical_font_size = robust_median(&mut font_sizes);
    let median_line_height = robust_median(&mut line_heights);
    let p75_line_height = percentile(&line_heights, 0.75);

    LineMetrics {
        typical_font_size,
        typical_line_height: median_line_height,
        typical_line_gap: (median_line_height - typical_font_size).max(0.0),
        median_line_height,
        p75_line_height,
    }
}

/// Median ignoring the extreme decile on each end. Sorts in place.
fn robust_median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    let cut = n / 10;
    let core = &values[cut..n - cut];
    core[core.len() / 2]
}

/// Percentile over already-sorted values.
fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f32 * p).round() as usize;
    sorted[idx]
}
