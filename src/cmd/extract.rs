use anyhow::{Context, Result};

use figcrop::config::{parse_comma_list, ConfigBuilder, Overrides};
use figcrop::extract::{run, RunOptions};
use figcrop::runlog::RunLog;

use crate::ExtractArgs;

/// Map CLI flags onto the top-priority override layer.
fn overrides_from_args(args: &ExtractArgs) -> Overrides {
    Overrides {
        dpi: args.dpi,
        clip_height_pt: args.clip_height,
        margin_x_pt: args.margin_x,
        caption_gap_pt: args.caption_gap,
        scan_heights: args.scan_heights.as_deref().map(|v| {
            parse_comma_list(v)
                .iter()
                .filter_map(|s| s.parse::<f32>().ok())
                .collect()
        }),
        scan_step_pt: args.scan_step,
        scan_dist_lambda: args.scan_dist_lambda,
        caption_mid_guard_pt: args.caption_mid_guard,
        text_trim: args.text_trim,
        adjacent_th_pt: args.adjacent_th,
        far_text_th_pt: args.far_text_th,
        far_side_min_dist_pt: args.far_side_min_dist,
        far_side_para_min_ratio: args.far_side_para_min_ratio,
        object_pad_pt: args.object_pad,
        object_min_area_ratio: args.object_min_area_ratio,
        object_merge_gap_pt: args.object_merge_gap,
        refine_near_edge_only: args.refine_near_edge_only,
        autocrop: args.autocrop,
        autocrop_pad_px: args.autocrop_pad_px,
        autocrop_white_th: args.autocrop_white_th,
        autocrop_shrink_limit: args.autocrop_shrink_limit,
        autocrop_min_height_px: args.autocrop_min_height_px,
        protect_far_edge_px: args.protect_far_edge_px,
        near_edge_pad_px: args.near_edge_pad_px,
        smart_caption_detection: args.smart_captions,
        layout_driven: args.layout_driven,
        adaptive_line_height: args.adaptive_line_height,
        global_anchor: args.global_anchor,
        global_anchor_margin: args.global_anchor_margin,
        anchor_mode: args.anchor_mode,
        allow_continued: args.allow_continued,
        force_above_ids: args.force_above.as_deref().map(parse_comma_list),
        force_below_ids: args.force_below.as_deref().map(parse_comma_list),
        force_table_above_ids: args.force_table_above.as_deref().map(parse_comma_list),
        force_table_below_ids: args.force_table_below.as_deref().map(parse_comma_list),
        prune_images: args.prune_images,
        max_caption_words: args.max_caption_words,
        preset: args.preset,
    }
}

pub fn cmd_extract(args: &ExtractArgs) -> Result<()> {
    let builder = ConfigBuilder {
        env: Overrides::from_env(),
        cli: overrides_from_args(args),
    };

    let mut opts = RunOptions::new(&args.out);
    opts.manifest = args.manifest.clone();
    opts.layout_json = args.layout_json;
    opts.debug_visual = args.debug_visual;

    let log_path = args.run_log.then(|| args.out.join("run.log.jsonl"));
    let mut log = RunLog::new(log_path);

    let outcome = run(&args.pdf, &builder, &opts, &mut log)
        .with_context(|| format!("extraction failed for {}", args.pdf.display()))?;
    log.flush();

    println!(
        "{} attachment(s) -> {}",
        outcome.records.len(),
        args.out.display()
    );
    for record in &outcome.records {
        println!(
            "  {} {} p{} [{}] {}",
            record.kind,
            record.ident,
            record.page,
            record.stages_applied.join(","),
            record.file
        );
    }
    if !outcome.uncertain.is_empty() {
        println!("{} uncertain caption(s) skipped", outcome.uncertain.len());
    }
    if outcome.pruned > 0 {
        println!("{} stale file(s) pruned", outcome.pruned);
    }

    Ok(())
}
