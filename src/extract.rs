//! Extraction orchestrator.
//!
//! Runs the whole core over a document snapshot: caption index → global
//! direction vote → per-caption anchoring → A/B/D refinement → acceptance
//! gate → render, record, index, prune. Everything here works against
//! [`DocumentContent`] and [`PageRaster`], so the pipeline is exercised in
//! tests with synthetic pages and a painting rasterizer - pdfium only
//! enters through the backend adapter.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::anchor::{self, AnchorContext, Side};
use crate::caption::{
    AttachmentKind, Caption, CaptionIndex, CaptionScanner, UncertainId,
};
use crate::config::{ExtractConfig, LayoutDriven};
use crate::debug_visual::{self, StageRect};
use crate::direction::{global_direction_vote, resolve_side, DirectionVote};
use crate::error::{ExtractError, Result};
use crate::geometry::Rect;
use crate::layout::DocumentLayout;
use crate::metrics::LineMetrics;
use crate::output::{
    build_basename, sort_records, write_index, write_manifest, AttachmentRecord, LayoutInfo,
    NameAllocator, RunMeta,
};
use crate::page::DocumentContent;
use crate::raster::{ink_map_for_page, InkMap, PageRaster};
use crate::refine::{autocrop, gate, objects, text_trim, PhaseTrace, RefineContext, StageOutcome};
use crate::runlog::{Level, RunLog};

/// Output-side options of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub out_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    pub layout_json: bool,
    pub debug_visual: bool,
}

impl RunOptions {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        RunOptions {
            out_dir: out_dir.into(),
            manifest: None,
            layout_json: false,
            debug_visual: false,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.out_dir.join("index.json")
    }
}

/// What a run produced (fatal failures surface as `Err` instead).
#[derive(Debug)]
pub struct RunOutcome {
    pub records: Vec<AttachmentRecord>,
    pub uncertain: Vec<UncertainId>,
    pub pruned: usize,
}

/// Run the core over an already-snapshotted document.
pub fn extract_document(
    doc: &DocumentContent,
    raster: &dyn PageRaster,
    cfg: &ExtractConfig,
    metrics: &LineMetrics,
    opts: &RunOptions,
    log: &mut RunLog,
) -> Result<RunOutcome> {
    fs::create_dir_all(&opts.out_dir)
        .map_err(|e| ExtractError::index_write(&opts.out_dir, format!("create out dir: {e}")))?;

    let scanner = CaptionScanner::new();

    // Layout model (guidance only; absence is never fatal).
    let layout = match cfg.layout_driven {
        LayoutDriven::Off => None,
        LayoutDriven::Auto | LayoutDriven::On => {
            let model = DocumentLayout::build(doc, metrics, &scanner);
            if model.is_none() {
                let msg = "layout model unavailable; phases run unguided";
                if cfg.layout_driven == LayoutDriven::On {
                    log.warning("layout", msg);
                } else {
                    log.info("layout", msg);
                }
            }
            model
        }
    };

    // Caption index and selection.
    let index = CaptionIndex::build(doc, &scanner);
    let (captions, uncertain) = if cfg.smart_caption_detection {
        index.select(cfg.allow_continued)
    } else {
        (select_first_occurrences(&index, cfg.allow_continued), Vec::new())
    };
    for u in &uncertain {
        log.attachment(
            Level::Warning,
            "caption",
            0,
            u.kind.as_str(),
            u.ident.text(),
            format!(
                "uncertain caption (best score {:.1} over {} candidate(s)); skipped",
                u.best_score, u.candidates
            ),
        );
    }
    if captions.is_empty() {
        log.warning("caption", "no captions detected; emitting empty index");
        write_index(&[], &opts.index_path())?;
        let pruned = if cfg.prune_images {
            crate::output::prune_unreferenced(&opts.out_dir, &[])
        } else {
            0
        };
        return Ok(RunOutcome {
            records: Vec::new(),
            uncertain,
            pruned,
        });
    }
    info!(captions = captions.len(), "captions selected");

    // Ink previews for every page hosting a caption.
    let mut ink_maps: Vec<Option<InkMap>> = vec![None; doc.pages.len()];
    for caption in &captions {
        let page = caption.page;
        if ink_maps[page].is_some() {
            continue;
        }
        match ink_map_for_page(raster, page, doc.pages[page].rect, cfg.autocrop_white_th) {
            Ok(map) => ink_maps[page] = Some(map),
            Err(e) => log.warning("preview", format!("page {}: {e}", page + 1)),
        }
    }

    // Global direction votes, one per kind.
    let fig_vote = global_direction_vote(
        doc,
        &ink_maps,
        &captions,
        AttachmentKind::Figure,
        cfg,
        layout.as_ref(),
    );
    let table_vote = global_direction_vote(
        doc,
        &ink_maps,
        &captions,
        AttachmentKind::Table,
        cfg,
        layout.as_ref(),
    );

    let meta = RunMeta {
        pdf_name: doc.pdf_name.clone(),
        pdf_hash: doc.pdf_hash.clone(),
        page_count: doc.page_count(),
        extractor_version: crate::VERSION.to_string(),
        preset: match cfg.preset {
            crate::config::Preset::Robust => "robust".to_string(),
            crate::config::Preset::None => "none".to_string(),
        },
    };
    let layout_info = LayoutInfo {
        columns: layout.as_ref().map(|l| l.columns).unwrap_or(1),
        typical_line_height: metrics.typical_line_height,
    };

    let mut alloc = NameAllocator::new();
    let mut records: Vec<AttachmentRecord> = Vec::new();
    for caption in &captions {
        let vote = match caption.kind {
            AttachmentKind::Figure => &fig_vote,
            AttachmentKind::Table => &table_vote,
        };
        if let Some(record) = process_caption(
            doc,
            raster,
            cfg,
            metrics,
            layout.as_ref(),
            &ink_maps,
            vote,
            caption,
            &captions,
            &meta,
            layout_info,
            &mut alloc,
            opts,
            log,
        ) {
            records.push(record);
        }
    }

    sort_records(&mut records);
    write_index(&records, &opts.index_path())?;

    let pruned = if cfg.prune_images {
        crate::output::prune_unreferenced(&opts.out_dir, &records)
    } else {
        0
    };

    if let Some(manifest) = &opts.manifest {
        write_manifest(&records, manifest)?;
    }
    if opts.layout_json {
        if let Some(model) = &layout {
            let path = opts.out_dir.join("layout_model.json");
            match serde_json::to_vec_pretty(&model.summary()) {
                Ok(json) => {
                    if let Err(e) = fs::write(&path, json) {
                        log.warning("layout", format!("layout_model.json write failed: {e}"));
                    }
                }
                Err(e) => log.warning("layout", format!("layout summary serialize: {e}")),
            }
        }
    }

    Ok(RunOutcome {
        records,
        uncertain,
        pruned,
    })
}

/// Legacy selection: first textual occurrence of each identifier wins.
fn select_first_occurrences(index: &CaptionIndex, allow_continued: bool) -> Vec<Caption> {
    let mut captions = Vec::new();
    for (kind, ident) in index.keys() {
        let cands = index.candidates(kind, ident.text());
        let mut sorted: Vec<_> = cands.iter().collect();
        sorted.sort_by_key(|c| (c.page, c.line_index));
        if allow_continued {
            let mut last_page = usize::MAX;
            let first_page = sorted.first().map(|c| c.page).unwrap_or(0);
            for cand in sorted {
                if cand.page == last_page {
                    continue;
                }
                last_page = cand.page;
                let mut cap = caption_from_candidate(cand);
                cap.continued = cap.continued || cand.page != first_page;
                captions.push(cap);
            }
        } else if let Some(first) = sorted.first() {
            captions.push(caption_from_candidate(first));
        }
    }
    captions.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(a.kind.cmp(&b.kind))
            .then_with(|| a.ident.cmp(&b.ident))
    });
    captions
}

fn caption_from_candidate(cand: &crate::caption::CaptionCandidate) -> Caption {
    Caption {
        kind: cand.kind,
        ident: cand.ident.clone(),
        page: cand.page,
        line_index: cand.line_index,
        block: cand.block,
        rect: cand.rect,
        text: cand.text.clone(),
        score: cand.total_score(),
        continued: cand.continued_marker,
    }
}

#[allow(clippy::too_many_arguments)]
fn process_caption(
    doc: &DocumentContent,
    raster: &dyn PageRaster,
    cfg: &ExtractConfig,
    metrics: &LineMetrics,
    layout: Option<&DocumentLayout>,
    ink_maps: &[Option<InkMap>],
    vote: &DirectionVote,
    caption: &Caption,
    all_captions: &[Caption],
    meta: &RunMeta,
    layout_info: LayoutInfo,
    alloc: &mut NameAllocator,
    opts: &RunOptions,
    log: &mut RunLog,
) -> Option<AttachmentRecord> {
    let page = &doc.pages[caption.page];
    let page_no = caption.page + 1;
    let kind = caption.kind;
    let ident_text = caption.ident.text().to_string();

    let empty_map;
    let ink = match &ink_maps[caption.page] {
        Some(map) => map,
        None => {
            empty_map = InkMap::empty(page.rect);
            &empty_map
        }
    };

    let mut caption_rects: Vec<Rect> = all_captions
        .iter()
        .filter(|c| c.page == caption.page)
        .map(|c| c.rect)
        .collect();
    caption_rects.sort_by(|a, b| a.y0.partial_cmp(&b.y0).unwrap_or(std::cmp::Ordering::Equal));

    let (allowed, global_used) = resolve_side(cfg, vote, &ident_text, kind.is_table());

    let anchor_ctx = AnchorContext {
        page,
        ink,
        cfg,
        kind,
        captions_on_page: &caption_rects,
        layout: layout.and_then(|l| l.page(caption.page)),
    };

    let Some(choice) = anchor::select_anchor(&anchor_ctx, caption, allowed) else {
        // Degenerate page: emit the best-effort caption-sized window.
        log.attachment(
            Level::Warning,
            "anchor",
            page_no,
            kind.as_str(),
            &ident_text,
            "no scoreable window; emitting caption-sized baseline",
        );
        let rect = anchor::empty_fallback_rect(cfg, &page.rect, &caption.rect);
        return finish_record(
            raster,
            cfg,
            caption,
            rect,
            page.rect,
            Side::Above,
            vec!["baseline-empty".to_string()],
            0.5 * (caption.score / 100.0).clamp(0.0, 1.0),
            global_used,
            meta,
            layout_info,
            alloc,
            opts,
            log,
            Vec::new(),
        );
    };

    let side = choice.side;
    let baseline = choice.baseline.clamp_to(&page.rect);
    let refine_ctx = RefineContext {
        page,
        cfg,
        kind,
        caption_rect: caption.rect,
        caption_text: &caption.text,
        side,
        line_h: metrics.typical_line_height.max(1.0),
        layout: layout.and_then(|l| l.page(caption.page)),
    };

    let mut stages: Vec<String> = vec!["baseline".to_string()];
    let mut traces: Vec<PhaseTrace> = Vec::new();

    let after_a = if cfg.text_trim {
        let (rect, trace) = text_trim::apply(&refine_ctx, baseline);
        stages.push("A".to_string());
        traces.push(trace);
        rect
    } else {
        baseline
    };

    let (after_b, trace_b) = objects::apply(&refine_ctx, after_a);
    stages.push("B".to_string());
    traces.push(trace_b);

    let after_d = if cfg.autocrop {
        let (rect, trace) = autocrop::apply(&refine_ctx, raster, after_b);
        stages.push("D".to_string());
        traces.push(trace);
        rect
    } else {
        after_b
    };

    // Gate: keep baseline / after-A / refined alive until the verdict.
    let merge_gap = cfg.object_merge_gap_pt;
    let baseline_m = gate::measure(&baseline, page, Some(ink), merge_gap);
    let a_only_m = gate::measure(&after_a, page, Some(ink), merge_gap);
    let refined_m = gate::measure(&after_d, page, Some(ink), merge_gap);
    let far_cov = gate::far_coverage(&baseline, side, page, refine_ctx.layout);
    let report = gate::decide(&baseline_m, &a_only_m, &refined_m, far_cov);

    for trace in traces.iter().filter(|t| t.applied) {
        log.attachment(
            Level::Info,
            "refine",
            page_no,
            kind.as_str(),
            &ident_text,
            format!("{}: {}", trace.phase, trace.note),
        );
    }

    let (final_rect, confidence_damp) = match report.outcome {
        StageOutcome::Refined => (after_d, 1.0),
        StageOutcome::AOnly => {
            stages = vec![
                "baseline".to_string(),
                "A".to_string(),
                "A-only-fallback".to_string(),
            ];
            (after_a, 0.9)
        }
        StageOutcome::Baseline => {
            stages = vec!["baseline".to_string(), "baseline-fallback".to_string()];
            (baseline, 0.8)
        }
    };
    if let Some(reason) = &report.reject_reason {
        log.attachment(
            Level::Warning,
            "gate",
            page_no,
            kind.as_str(),
            &ident_text,
            format!("refined window rejected ({reason}); using {:?}", report.outcome),
        );
    }

    // Invariants: inside the page, never degenerate.
    let mut final_rect = final_rect.clamp_to(&page.rect);
    let min_h_pt = 60.0 / cfg.dpi as f32 * 72.0;
    if final_rect.height() < min_h_pt {
        let grow = min_h_pt - final_rect.height();
        final_rect = match side {
            Side::Above => Rect::new(final_rect.x0, final_rect.y0 - grow, final_rect.x1, final_rect.y1),
            Side::Below => Rect::new(final_rect.x0, final_rect.y0, final_rect.x1, final_rect.y1 + grow),
        }
        .clamp_to(&page.rect);
    }

    let confidence = ((caption.score / 100.0) * confidence_damp).clamp(0.0, 1.0);

    let mut debug_artifacts = Vec::new();
    if opts.debug_visual {
        let stage_rects = [
            StageRect {
                label: "baseline",
                rect: baseline,
                color: debug_visual::BASELINE_COLOR,
            },
            StageRect {
                label: "phase-a",
                rect: after_a,
                color: debug_visual::PHASE_A_COLOR,
            },
            StageRect {
                label: "phase-b",
                rect: after_b,
                color: debug_visual::PHASE_B_COLOR,
            },
            StageRect {
                label: "phase-d",
                rect: after_d,
                color: debug_visual::PHASE_D_COLOR,
            },
            StageRect {
                label: "final",
                rect: final_rect,
                color: debug_visual::FINAL_COLOR,
            },
            StageRect {
                label: "caption",
                rect: caption.rect,
                color: debug_visual::CAPTION_COLOR,
            },
        ];
        if let Some(rel) = debug_visual::save_overlay(
            raster,
            caption.page,
            page.rect,
            &stage_rects,
            &opts.out_dir,
            kind.as_str(),
            &ident_text,
        ) {
            debug_artifacts.push(rel);
        }
    }

    finish_record(
        raster,
        cfg,
        caption,
        final_rect,
        page.rect,
        side,
        stages,
        confidence,
        global_used,
        meta,
        layout_info,
        alloc,
        opts,
        log,
        debug_artifacts,
    )
}

/// Render the final window, write the PNG, and build the record. A failed
/// render retries at the caption-sized baseline before giving up.
#[allow(clippy::too_many_arguments)]
fn finish_record(
    raster: &dyn PageRaster,
    cfg: &ExtractConfig,
    caption: &Caption,
    rect: Rect,
    page_rect: Rect,
    side: Side,
    mut stages: Vec<String>,
    confidence: f32,
    global_used: bool,
    meta: &RunMeta,
    layout_info: LayoutInfo,
    alloc: &mut NameAllocator,
    opts: &RunOptions,
    log: &mut RunLog,
    debug_artifacts: Vec<String>,
) -> Option<AttachmentRecord> {
    let page_no = caption.page + 1;
    let kind = caption.kind;

    let (rect, image) = match raster.render_color(caption.page, rect, cfg.dpi as f32) {
        Ok(img) => (rect, img),
        Err(e) => {
            log.attachment(
                Level::Warning,
                "render",
                page_no,
                kind.as_str(),
                caption.ident.text(),
                format!("final render failed ({e}); retrying at baseline"),
            );
            stages = vec!["baseline".to_string(), "baseline-fallback".to_string()];
            let fallback = anchor::empty_fallback_rect(cfg, &page_rect, &caption.rect);
            match raster.render_color(caption.page, fallback, cfg.dpi as f32) {
                Ok(img) => (fallback, img),
                Err(e) => {
                    log.attachment(
                        Level::Warning,
                        "render",
                        page_no,
                        kind.as_str(),
                        caption.ident.text(),
                        format!("baseline render failed ({e}); attachment skipped"),
                    );
                    return None;
                }
            }
        }
    };

    let mut basename = build_basename(
        kind.prefix(),
        &caption.ident,
        &caption.text,
        cfg.max_caption_words,
    );
    if caption.continued {
        basename.push_str(&format!("_continued_p{page_no}"));
    }
    let (file, collision) = alloc.claim(&basename, "png");
    if collision {
        log.attachment(
            Level::Warning,
            "naming",
            page_no,
            kind.as_str(),
            caption.ident.text(),
            format!("filename collision resolved as {file}"),
        );
    }

    let path = opts.out_dir.join(&file);
    if let Err(e) = image.save(&path) {
        log.attachment(
            Level::Warning,
            "output",
            page_no,
            kind.as_str(),
            caption.ident.text(),
            format!("PNG write failed: {e}; attachment skipped"),
        );
        return None;
    }
    info!(file = file.as_str(), page = page_no, "attachment written");

    Some(AttachmentRecord {
        kind: kind.as_str().to_string(),
        ident: caption.ident.text().to_string(),
        page: page_no,
        caption_text: caption.text.clone(),
        file,
        continued: caption.continued,
        meta: meta.clone(),
        layout: layout_info,
        anchor_mode: match cfg.anchor_mode {
            crate::config::AnchorMode::V1 => "v1".to_string(),
            crate::config::AnchorMode::V2 => "v2".to_string(),
        },
        side: side.as_str().to_string(),
        global_anchor_used: global_used,
        stages_applied: stages,
        confidence: (confidence * 1000.0).round() / 1000.0,
        bbox_pt: rect.to_array(),
        dpi: cfg.dpi,
        pixmap_size_px: [image.width(), image.height()],
        debug_artifacts,
        sort_key: (
            page_no,
            if kind.is_table() { 1 } else { 0 },
            caption.ident.sort_key(),
        ),
    })
}

/// Convenience wrapper used by the CLI: validate, snapshot, probe, resolve
/// adaptive config, then run [`extract_document`].
pub fn run(
    pdf_path: &Path,
    builder: &crate::config::ConfigBuilder,
    opts: &RunOptions,
    log: &mut RunLog,
) -> Result<RunOutcome> {
    // Input validation precedes backend init so a bad path fails fast even
    // where no pdfium library is installed.
    if !pdf_path.is_file() {
        return Err(ExtractError::input(pdf_path, "no such file"));
    }
    let backend = crate::backend::Backend::init()?;
    let document = backend.open(pdf_path)?;
    let doc = document.snapshot()?;

    let probe = crate::metrics::estimate_line_metrics(&doc);
    let cfg = builder.resolve(Some(&probe));
    info!(
        pages = doc.page_count(),
        line_h = probe.typical_line_height,
        "document opened"
    );

    extract_document(&doc, &document, &cfg, &probe, opts, log)
}
