//! Caption detection and scoring.
//!
//! A caption candidate is any text line that opens with a figure/table label
//! and identifier. The same identifier usually appears several times in a
//! paper (the caption itself plus in-text mentions), so candidates are
//! ranked with a four-axis score and only the winner - when it clears the
//! acceptance threshold - becomes the caption for that `(kind, ident)`.
//!
//! Score axes (total ≤ 100):
//! - position (40): distance to the nearest image/drawing on the page
//! - format (30): bold label, block shape, trailing punctuation
//! - structure (20): descriptive continuation vs. long body paragraph
//! - context (10): caption verbs vs. reference phrasing

use std::collections::HashMap;

use regex::Regex;

use crate::geometry::Rect;
use crate::ident::Ident;
use crate::page::{DocumentContent, PageContent};

/// Minimum winning score for a candidate to be accepted as the caption.
/// A score of exactly 25 passes.
pub const MIN_CAPTION_SCORE: f32 = 25.0;

/// Attachment kind, ordering figures before tables in the emitted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachmentKind {
    Figure,
    Table,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Figure => "figure",
            AttachmentKind::Table => "table",
        }
    }

    /// Filename prefix (`Figure_…` / `Table_…`).
    pub fn prefix(&self) -> &'static str {
        match self {
            AttachmentKind::Figure => "Figure",
            AttachmentKind::Table => "Table",
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, AttachmentKind::Table)
    }
}

/// Result of matching one text line against the caption patterns.
#[derive(Debug, Clone)]
pub struct CaptionMatch {
    pub kind: AttachmentKind,
    pub ident: Ident,
    /// Trailing `(continued)` / `续` marker was present.
    pub continued_marker: bool,
}

/// Compiled caption patterns.
///
/// Labels are case-insensitive; identifiers are case-sensitive so that a
/// lowercase "figure i" in running text does not read as Roman numeral I.
pub struct CaptionScanner {
    figure_re: Regex,
    table_re: Regex,
}

impl Default for CaptionScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptionScanner {
    pub fn new() -> Self {
        let figure_re = Regex::new(
            r"^\s*(?P<label>(?i:extended\s+data\s+|supplementary\s+)?(?i:figure|fig\.?)|图表|附图|图)\s*(?:S\s*(?P<sid>\d+|[IVX]{1,6})|(?P<roman>[IVX]{1,6})|(?P<num>\d+))(?:\s*[-–]?\s*\(?[a-z]\)?)??(?P<cont>\s*\(continued\)|\s*续|\s*接上页)?(?:\s*[.:：，,]|\b)",
        )
        .expect("figure caption pattern is valid");
        let table_re = Regex::new(
            r"^\s*(?P<label>(?i:extended\s+data\s+|supplementary\s+)?(?i:table|tab\.?)|表)\s*(?:S\s*(?P<sid>\d+|[IVX]{1,6})|(?P<letter>[A-Z]\d+)|(?P<roman>[IVX]{1,6})|(?P<num>\d+))(?P<cont>\s*\(continued\)|\s*续|\s*接上页)?(?:\s*[.:：，,]|\b)",
        )
        .expect("table caption pattern is valid");
        CaptionScanner {
            figure_re,
            table_re,
        }
    }

    /// Match a line against the figure pattern, then the table pattern.
    pub fn match_line(&self, text: &str) -> Option<CaptionMatch> {
        self.match_kind(text, AttachmentKind::Figure)
            .or_else(|| self.match_kind(text, AttachmentKind::Table))
    }

    pub fn match_kind(&self, text: &str, kind: AttachmentKind) -> Option<CaptionMatch> {
        let re = match kind {
            AttachmentKind::Figure => &self.figure_re,
            AttachmentKind::Table => &self.table_re,
        };
        let caps = re.captures(text)?;

        let label = caps.name("label").map(|m| m.as_str()).unwrap_or("");
        let is_supp_label = label.trim().to_ascii_lowercase().starts_with("supplementary");

        let mut raw = if let Some(sid) = caps.name("sid") {
            format!("S{}", sid.as_str())
        } else if let Some(letter) = caps.name("letter") {
            letter.as_str().to_string()
        } else if let Some(roman) = caps.name("roman") {
            roman.as_str().to_string()
        } else {
            caps.name("num")?.as_str().to_string()
        };

        // "Supplementary Figure 4" numbers into the supplement.
        if is_supp_label && !raw.to_ascii_uppercase().starts_with('S') {
            raw = format!("S{raw}");
        }

        let ident = Ident::parse(&raw)?;
        Some(CaptionMatch {
            kind,
            ident,
            continued_marker: caps.name("cont").is_some(),
        })
    }
}

/// Per-axis score of one candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreBreakdown {
    pub position: f32,
    pub format: f32,
    pub structure: f32,
    pub context: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.position + self.format + self.structure + self.context
    }
}

/// One textual occurrence of a caption-like line.
#[derive(Debug, Clone)]
pub struct CaptionCandidate {
    pub kind: AttachmentKind,
    pub ident: Ident,
    /// 0-based page index.
    pub page: usize,
    /// Index of the line within the page snapshot.
    pub line_index: usize,
    pub block: usize,
    pub rect: Rect,
    pub text: String,
    pub continued_marker: bool,
    pub score: ScoreBreakdown,
}

impl CaptionCandidate {
    pub fn total_score(&self) -> f32 {
        self.score.total()
    }
}

/// The selected caption for a `(kind, ident)` occurrence.
#[derive(Debug, Clone)]
pub struct Caption {
    pub kind: AttachmentKind,
    pub ident: Ident,
    pub page: usize,
    pub line_index: usize,
    pub block: usize,
    pub rect: Rect,
    pub text: String,
    pub score: f32,
    pub continued: bool,
}

/// An identifier whose best candidate stayed below the score threshold.
#[derive(Debug, Clone)]
pub struct UncertainId {
    pub kind: AttachmentKind,
    pub ident: Ident,
    pub best_score: f32,
    pub candidates: usize,
}

/// All candidates of the document, grouped per `(kind, ident text)`.
#[derive(Debug, Default)]
pub struct CaptionIndex {
    map: HashMap<(AttachmentKind, String), Vec<CaptionCandidate>>,
}

impl CaptionIndex {
    /// Scan every text line of every page and score each candidate against
    /// its own page's objects.
    pub fn build(doc: &DocumentContent, scanner: &CaptionScanner) -> Self {
        let mut map: HashMap<(AttachmentKind, String), Vec<CaptionCandidate>> = HashMap::new();

        for page in &doc.pages {
            let objects: Vec<Rect> = page.object_rects().collect();
            for (line_index, line) in page.lines.iter().enumerate() {
                let Some(m) = scanner.match_line(line.text.trim()) else {
                    continue;
                };
                let mut cand = CaptionCandidate {
                    kind: m.kind,
                    ident: m.ident,
                    page: page.index,
                    line_index,
                    block: line.block,
                    rect: line.rect,
                    text: line.text.trim().to_string(),
                    continued_marker: m.continued_marker,
                    score: ScoreBreakdown::default(),
                };
                cand.score = score_candidate(&cand, page, &objects);
                map.entry((cand.kind, cand.ident.text().to_string()))
                    .or_default()
                    .push(cand);
            }
        }

        CaptionIndex { map }
    }

    pub fn candidates(&self, kind: AttachmentKind, ident_text: &str) -> &[CaptionCandidate] {
        self.map
            .get(&(kind, ident_text.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All `(kind, ident)` keys, ordered by kind then ident sort key.
    pub fn keys(&self) -> Vec<(AttachmentKind, Ident)> {
        let mut keys: Vec<(AttachmentKind, Ident)> = self
            .map
            .values()
            .filter_map(|cands| cands.first())
            .map(|c| (c.kind, c.ident.clone()))
            .collect();
        keys.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        keys
    }

    pub fn all_candidates(&self) -> impl Iterator<Item = &CaptionCandidate> {
        self.map.values().flatten()
    }

    /// Pick the caption(s) for each identifier.
    ///
    /// Document-wide mode keeps the single best-scoring candidate; continued
    /// mode keeps the best candidate of every page that has one (at most one
    /// per page), marking all but the first as continued.
    pub fn select(
        &self,
        allow_continued: bool,
    ) -> (Vec<Caption>, Vec<UncertainId>) {
        let mut captions = Vec::new();
        let mut uncertain = Vec::new();

        for (kind, ident) in self.keys() {
            let cands = self.candidates(kind, ident.text());
            let best = cands
                .iter()
                .max_by(|a, b| {
                    a.total_score()
                        .partial_cmp(&b.total_score())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("keys() only yields populated groups");

            if best.total_score() < MIN_CAPTION_SCORE {
                uncertain.push(UncertainId {
                    kind,
                    ident: ident.clone(),
                    best_score: best.total_score(),
                    candidates: cands.len(),
                });
                continue;
            }

            if allow_continued {
                let mut per_page: HashMap<usize, &CaptionCandidate> = HashMap::new();
                for cand in cands {
                    if cand.total_score() < MIN_CAPTION_SCORE {
                        continue;
                    }
                    per_page
                        .entry(cand.page)
                        .and_modify(|cur| {
                            if cand.total_score() > cur.total_score() {
                                *cur = cand;
                            }
                        })
                        .or_insert(cand);
                }
                let mut pages: Vec<usize> = per_page.keys().copied().collect();
                pages.sort_unstable();
                let first_page = best.page.min(pages.first().copied().unwrap_or(best.page));
                for page in pages {
                    let cand = per_page[&page];
                    captions.push(to_caption(cand, page != first_page));
                }
            } else {
                captions.push(to_caption(best, false));
            }
        }

        captions.sort_by(|a, b| {
            a.page
                .cmp(&b.page)
                .then(a.kind.cmp(&b.kind))
                .then_with(|| a.ident.cmp(&b.ident))
        });
        (captions, uncertain)
    }
}

fn to_caption(cand: &CaptionCandidate, continued: bool) -> Caption {
    Caption {
        kind: cand.kind,
        ident: cand.ident.clone(),
        page: cand.page,
        line_index: cand.line_index,
        block: cand.block,
        rect: cand.rect,
        text: cand.text.clone(),
        score: cand.total_score(),
        continued: continued || cand.continued_marker,
    }
}

/// Score one candidate against its page.
pub fn score_candidate(
    cand: &CaptionCandidate,
    page: &PageContent,
    objects: &[Rect],
) -> ScoreBreakdown {
    ScoreBreakdown {
        position: position_score(&cand.rect, objects),
        format: format_score(cand, page),
        structure: structure_score(cand, page),
        context: context_score(&cand.text),
    }
}

/// Position axis: inverse-distance to the nearest object on the page.
fn position_score(rect: &Rect, objects: &[Rect]) -> f32 {
    if objects.is_empty() {
        // No objects at all (text-only page) is neutral, not damning.
        return 15.0;
    }
    let mut min_dist = f32::INFINITY;
    for obj in objects {
        let above = (rect.y0 - obj.y1).abs();
        let below = (rect.y1 - obj.y0).abs();
        min_dist = min_dist.min(above.min(below));
    }
    match min_dist {
        d if d < 10.0 => 40.0,
        d if d < 20.0 => 35.0,
        d if d < 40.0 => 28.0,
        d if d < 80.0 => 18.0,
        d if d < 150.0 => 8.0,
        _ => 0.0,
    }
}

/// Format axis: bold label, block shape, early punctuation.
fn format_score(cand: &CaptionCandidate, page: &PageContent) -> f32 {
    let mut score = 0.0;

    let line_bold = page
        .lines
        .get(cand.line_index)
        .map(|l| l.bold)
        .unwrap_or(false);
    if line_bold {
        score += 15.0;
    }

    match page.block_lines(cand.block).count() {
        1 => score += 10.0,
        2 => score += 8.0,
        3 | 4 => score += 5.0,
        _ => {}
    }

    let prefix: String = cand.text.chars().take(40).collect();
    if prefix.contains(':') || prefix.contains('：') {
        score += 5.0;
    } else if prefix.contains('.') && !prefix.trim_end().ends_with("et al.") {
        score += 3.0;
    } else if prefix.contains('—') || prefix.contains('-') {
        score += 2.0;
    }

    score
}

/// Structure axis: a short descriptive continuation is caption-like; a long
/// body paragraph is not.
fn structure_score(cand: &CaptionCandidate, page: &PageContent) -> f32 {
    let mut score = 0.0;

    let next_line_len = page
        .block_lines(cand.block)
        .skip_while(|l| l.rect.y0 < cand.rect.y0 + 0.5)
        .nth(1)
        .map(|l| l.text.trim().chars().count())
        .unwrap_or(0);
    match next_line_len {
        n if n > 40 => score += 12.0,
        n if n > 15 => score += 8.0,
        n if n > 0 => score += 3.0,
        _ => {}
    }

    let para_len = page.block_char_count(cand.block);
    match para_len {
        n if n < 150 => score += 8.0,
        n if n < 300 => score += 4.0,
        _ => score -= 8.0,
    }

    score
}

const CAPTION_KEYWORDS: &[&str] = &[
    "shows",
    "illustrates",
    "depicts",
    "displays",
    "compares",
    "comparison",
    "presents",
    "demonstrates",
    "展示",
    "显示",
    "说明",
    "比较",
    "给出",
    "呈现",
];

const REFERENCE_KEYWORDS: &[&str] = &[
    "as shown in",
    "see figure",
    "see table",
    "refer to",
    "shown in figure",
    "shown in table",
    "listed in table",
    "according to",
    "based on",
    "from figure",
    "from table",
    "如图所示",
    "如表所示",
    "所示",
    "参见",
    "见图",
];

/// Context axis: caption verbs promote, reference phrasing demotes.
fn context_score(text: &str) -> f32 {
    let lower = text.to_lowercase();
    if REFERENCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return -15.0;
    }
    if CAPTION_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return 10.0;
    }
    0.0
}
