use std::path::Path;

use anyhow::Result;
use serde_json::json;

use figcrop::backend::Backend;
use figcrop::caption::{AttachmentKind, CaptionIndex, CaptionScanner};

use crate::DumpFormat;

pub fn cmd_captions(pdf: &Path, kind: Option<&str>, format: DumpFormat) -> Result<()> {
    let kind_filter = match kind.map(str::to_ascii_lowercase).as_deref() {
        Some("figure") => Some(AttachmentKind::Figure),
        Some("table") => Some(AttachmentKind::Table),
        Some(other) => anyhow::bail!("unknown kind '{other}' (expected figure or table)"),
        None => None,
    };

    let backend = Backend::init()?;
    let document = backend.open(pdf)?;
    let doc = document.snapshot()?;
    let index = CaptionIndex::build(&doc, &CaptionScanner::new());

    let mut entries = Vec::new();
    for (kind, ident) in index.keys() {
        if kind_filter.map(|k| k != kind).unwrap_or(false) {
            continue;
        }
        for cand in index.candidates(kind, ident.text()) {
            entries.push((kind, ident.clone(), cand));
        }
    }

    match format {
        DumpFormat::Json => {
            let items: Vec<serde_json::Value> = entries
                .iter()
                .map(|(kind, ident, cand)| {
                    json!({
                        "kind": kind.as_str(),
                        "ident": ident.text(),
                        "page": cand.page + 1,
                        "score": {
                            "position": cand.score.position,
                            "format": cand.score.format,
                            "structure": cand.score.structure,
                            "context": cand.score.context,
                            "total": cand.total_score(),
                        },
                        "bbox_pt": cand.rect.to_array(),
                        "text": cand.text,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        DumpFormat::Text => {
            if entries.is_empty() {
                println!("no caption candidates found");
                return Ok(());
            }
            for (kind, ident, cand) in &entries {
                let preview: String = cand.text.chars().take(60).collect();
                println!(
                    "{:>6} {:<4} p{:<3} score {:5.1} (pos {:4.1} fmt {:4.1} str {:4.1} ctx {:5.1})  {}",
                    kind.as_str(),
                    ident.text(),
                    cand.page + 1,
                    cand.total_score(),
                    cand.score.position,
                    cand.score.format,
                    cand.score.structure,
                    cand.score.context,
                    preview
                );
            }
        }
    }

    Ok(())
}
