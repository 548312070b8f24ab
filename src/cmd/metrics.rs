use std::path::Path;

use anyhow::Result;
use serde_json::json;

use figcrop::backend::Backend;
use figcrop::caption::CaptionScanner;
use figcrop::layout::DocumentLayout;
use figcrop::metrics::estimate_line_metrics;

use crate::DumpFormat;

pub fn cmd_metrics(pdf: &Path, format: DumpFormat) -> Result<()> {
    let backend = Backend::init()?;
    let document = backend.open(pdf)?;
    let doc = document.snapshot()?;

    let metrics = estimate_line_metrics(&doc);
    let layout = DocumentLayout::build(&doc, &metrics, &CaptionScanner::new());

    match format {
        DumpFormat::Json => {
            let value = json!({
                "pages": doc.page_count(),
                "typical_font_size": metrics.typical_font_size,
                "typical_line_height": metrics.typical_line_height,
                "typical_line_gap": metrics.typical_line_gap,
                "median_line_height": metrics.median_line_height,
                "p75_line_height": metrics.p75_line_height,
                "layout": layout.as_ref().map(|l| serde_json::to_value(l.summary()).ok()),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        DumpFormat::Text => {
            println!("pages:               {}", doc.page_count());
            println!("typical font size:   {:.1} pt", metrics.typical_font_size);
            println!("typical line height: {:.1} pt", metrics.typical_line_height);
            println!("typical line gap:    {:.1} pt", metrics.typical_line_gap);
            println!("median line height:  {:.1} pt", metrics.median_line_height);
            println!("p75 line height:     {:.1} pt", metrics.p75_line_height);
            match layout {
                Some(model) => {
                    println!("columns:             {}", model.columns);
                    println!(
                        "margins:             {:.1} / {:.1} pt",
                        model.margin_left, model.margin_right
                    );
                }
                None => println!("layout model:        unavailable (too little text)"),
            }
        }
    }

    Ok(())
}
