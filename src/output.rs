//! Output contract: file naming, PNG placement, the traceable index, and
//! pruning of stale artifacts.
//!
//! The index is a single JSON list in document order, written atomically
//! (temp file + rename) so a crashed run can never clobber a previous
//! index. Pruning runs only after a successful index write and deletes
//! exactly the `Figure_*`/`Table_*` PNGs the fresh index does not reference.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{ExtractError, Result};
use crate::ident::Ident;

/// Caption-derived filename slug limits.
const MAX_BASENAME_CHARS: usize = 160;

/// Run-level metadata stamped into every record.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub pdf_name: String,
    pub pdf_hash: String,
    pub page_count: usize,
    pub extractor_version: String,
    pub preset: String,
}

/// Document layout summary carried by each record.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LayoutInfo {
    pub columns: u8,
    pub typical_line_height: f32,
}

/// One emitted attachment. Schema of the `index.json` entries.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentRecord {
    pub kind: String,
    pub ident: String,
    /// 1-based page number.
    pub page: usize,
    pub caption_text: String,
    /// Path relative to the output directory.
    pub file: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub continued: bool,
    pub meta: RunMeta,
    pub layout: LayoutInfo,
    pub anchor_mode: String,
    pub side: String,
    pub global_anchor_used: bool,
    pub stages_applied: Vec<String>,
    pub confidence: f32,
    pub bbox_pt: [f32; 4],
    pub dpi: u32,
    pub pixmap_size_px: [u32; 2],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub debug_artifacts: Vec<String>,
    /// Ordering key `(page, kind rank, ident key)`; not serialized.
    #[serde(skip)]
    pub sort_key: (usize, u8, (u8, char, i32, String)),
}

/// Sort records into index order: page, then figures before tables, then
/// natural identifier order.
pub fn sort_records(records: &mut [AttachmentRecord]) {
    records.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
}

/// `sha256:<first 16 hex>` of the file's bytes.
pub fn hash_pdf(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| ExtractError::input(path, format!("cannot open for hashing: {e}")))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| ExtractError::input(path, format!("read failed: {e}")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!("sha256:{}", &hex[..16]))
}

/// Reduce a caption to a filename-safe slug: ASCII word characters only,
/// separators collapsed to single underscores, at most `max_words` words.
pub fn sanitize_caption(caption: &str, max_chars: usize, max_words: usize) -> String {
    let mut out = String::with_capacity(caption.len());
    for c in caption.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    while out.contains("__") {
        out = out.replace("__", "_");
    }
    let trimmed = out.trim_matches('_');

    let words: Vec<&str> = trimmed.split('_').take(max_words).collect();
    let mut result = words.join("_");
    if result.len() > max_chars {
        result.truncate(max_chars);
        result = result.trim_end_matches('_').to_string();
    }
    result
}

/// `{Figure|Table}_<ident>_<slug>`, the caption's own label stripped from
/// the slug so names never read `Figure_1_Figure_1_...`.
pub fn build_basename(
    kind_prefix: &str,
    ident: &Ident,
    caption: &str,
    max_words: usize,
) -> String {
    let prefix = format!("{kind_prefix}_{}_", ident.text());
    let room = MAX_BASENAME_CHARS.saturating_sub(prefix.len());
    let mut slug = sanitize_caption(caption, room, max_words);

    let dup = format!("{kind_prefix}_{}_", ident.text());
    if let Some(rest) = strip_prefix_ignore_case(&slug, &dup) {
        slug = rest.to_string();
    } else {
        let dup_short = format!("{kind_prefix}_{}", ident.text());
        if let Some(rest) = strip_prefix_ignore_case(&slug, &dup_short) {
            slug = rest.trim_start_matches('_').to_string();
        }
    }

    let name = format!("{prefix}{slug}");
    name.trim_end_matches('_').to_string()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Allocates filenames unique *within the run*. Collisions between records
/// get deterministic `_1`, `_2` suffixes; files left over from previous
/// runs are simply overwritten (and later pruned), so re-running into a
/// dirty directory converges to the clean-run result.
#[derive(Debug, Default)]
pub struct NameAllocator {
    claimed: std::collections::BTreeSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `basename.ext`, suffixing on in-run collision. Returns the
    /// final filename and whether a collision occurred.
    pub fn claim(&mut self, basename: &str, ext: &str) -> (String, bool) {
        let candidate = format!("{basename}.{ext}");
        if self.claimed.insert(candidate.clone()) {
            return (candidate, false);
        }
        let mut counter = 1usize;
        loop {
            let candidate = format!("{basename}_{counter}.{ext}");
            if self.claimed.insert(candidate.clone()) {
                warn!(
                    base = basename,
                    suffix = counter,
                    "filename collision; deterministic suffix appended"
                );
                return (candidate, true);
            }
            counter += 1;
        }
    }
}

/// Write the index atomically: serialize to `<index>.tmp`, then rename.
pub fn write_index(records: &[AttachmentRecord], index_path: &Path) -> Result<()> {
    let json = serde_json::to_vec_pretty(records)
        .map_err(|e| ExtractError::index_write(index_path, format!("serialize: {e}")))?;

    let tmp = index_path.with_extension("json.tmp");
    fs::write(&tmp, &json)
        .map_err(|e| ExtractError::index_write(index_path, format!("write temp: {e}")))?;
    fs::rename(&tmp, index_path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ExtractError::index_write(index_path, format!("rename: {e}"))
    })?;

    info!(path = %index_path.display(), items = records.len(), "index written");
    Ok(())
}

/// Delete every `Figure_*`/`Table_*` PNG in `out_dir` not referenced by the
/// records. Returns the number of files removed. Never touches anything
/// else in the directory.
pub fn prune_unreferenced(out_dir: &Path, records: &[AttachmentRecord]) -> usize {
    let referenced: std::collections::BTreeSet<String> =
        records.iter().map(|r| r.file.clone()).collect();

    let Ok(entries) = fs::read_dir(out_dir) else {
        return 0;
    };

    let mut removed = 0usize;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_attachment_png = name.to_ascii_lowercase().ends_with(".png")
            && (name.starts_with("Figure_") || name.starts_with("Table_"));
        if !is_attachment_png || referenced.contains(&name) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                removed += 1;
                info!(file = name, "pruned stale attachment");
            }
            Err(e) => warn!(file = name, error = %e, "prune failed"),
        }
    }
    removed
}

/// Optional CSV manifest mirroring the index.
pub fn write_manifest(records: &[AttachmentRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| ExtractError::index_write(path, format!("manifest: {e}")))?;
    writer
        .write_record(["kind", "ident", "page", "caption", "file", "continued"])
        .map_err(|e| ExtractError::index_write(path, format!("manifest: {e}")))?;
    for r in records {
        writer
            .write_record([
                r.kind.as_str(),
                r.ident.as_str(),
                &r.page.to_string(),
                r.caption_text.as_str(),
                r.file.as_str(),
                if r.continued { "1" } else { "0" },
            ])
            .map_err(|e| ExtractError::index_write(path, format!("manifest: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| ExtractError::index_write(path, format!("manifest: {e}")))?;
    info!(path = %path.display(), items = records.len(), "manifest written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(kind: &str, ident: &str, page: usize, file: &str) -> AttachmentRecord {
        let parsed = Ident::parse(ident).unwrap();
        AttachmentRecord {
            kind: kind.to_string(),
            ident: ident.to_string(),
            page,
            caption_text: format!("{kind} {ident}: caption"),
            file: file.to_string(),
            continued: false,
            meta: RunMeta {
                pdf_name: "paper.pdf".to_string(),
                pdf_hash: "sha256:0123456789abcdef".to_string(),
                page_count: 10,
                extractor_version: "0.4.0".to_string(),
                preset: "none".to_string(),
            },
            layout: LayoutInfo {
                columns: 1,
                typical_line_height: 12.0,
            },
            anchor_mode: "v2".to_string(),
            side: "above".to_string(),
            global_anchor_used: false,
            stages_applied: vec!["baseline".to_string(), "A".to_string()],
            confidence: 0.6,
            bbox_pt: [20.0, 100.0, 592.0, 440.0],
            dpi: 300,
            pixmap_size_px: [2383, 1417],
            debug_artifacts: Vec::new(),
            sort_key: (
                page,
                if kind == "figure" { 0 } else { 1 },
                parsed.sort_key(),
            ),
        }
    }

    #[test]
    fn sanitize_collapses_separators() {
        assert_eq!(
            sanitize_caption("Overview of the (proposed) system - v2.", 160, 12),
            "Overview_of_the_proposed_system_v2"
        );
    }

    #[test]
    fn sanitize_limits_word_count() {
        let long = "one two three four five six seven eight nine ten eleven twelve thirteen";
        let slug = sanitize_caption(long, 160, 12);
        assert_eq!(slug.split('_').count(), 12);
        assert!(!slug.contains("thirteen"));
    }

    #[test]
    fn basename_strips_duplicate_label() {
        let ident = Ident::parse("1").unwrap();
        let name = build_basename("Figure", &ident, "Figure 1: Overview of the system", 12);
        assert_eq!(name, "Figure_1_Overview_of_the_system");
    }

    #[test]
    fn basename_keeps_supplementary_ident() {
        let ident = Ident::parse("S1").unwrap();
        let name = build_basename("Figure", &ident, "Figure S1: Ablation", 12);
        assert_eq!(name, "Figure_S1_Ablation");
    }

    #[test]
    fn name_allocator_appends_deterministic_suffixes() {
        let mut alloc = NameAllocator::new();
        let (first, clash) = alloc.claim("Figure_1_Overview", "png");
        assert_eq!(first, "Figure_1_Overview.png");
        assert!(!clash);

        let (second, clash) = alloc.claim("Figure_1_Overview", "png");
        assert_eq!(second, "Figure_1_Overview_1.png");
        assert!(clash);

        let (third, _) = alloc.claim("Figure_1_Overview", "png");
        assert_eq!(third, "Figure_1_Overview_2.png");
    }

    #[test]
    fn name_allocator_ignores_preexisting_files() {
        // Collisions are an in-run property: names claimed in a fresh run
        // are independent of what a previous run left on disk.
        let mut alloc = NameAllocator::new();
        let (name, clash) = alloc.claim("Figure_1_Overview", "png");
        assert_eq!(name, "Figure_1_Overview.png");
        assert!(!clash);
    }

    #[test]
    fn index_write_is_atomic_and_ordered() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("index.json");

        let mut records = vec![
            record("table", "1", 2, "Table_1_caption.png"),
            record("figure", "2", 2, "Figure_2_caption.png"),
            record("figure", "1", 1, "Figure_1_caption.png"),
            record("figure", "S1", 1, "Figure_S1_caption.png"),
        ];
        sort_records(&mut records);
        write_index(&records, &index).unwrap();

        assert!(!dir.path().join("index.json.tmp").exists());
        let data = fs::read_to_string(&index).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&data).unwrap();
        let list = parsed.as_array().unwrap();
        assert_eq!(list.len(), 4);
        // (page 1, figure 1) < (page 1, figure S1) < (page 2, figure 2) <
        // (page 2, table 1)
        assert_eq!(list[0]["ident"], "1");
        assert_eq!(list[1]["ident"], "S1");
        assert_eq!(list[2]["ident"], "2");
        assert_eq!(list[3]["kind"], "table");
        // `continued: false` is omitted from the serialized form.
        assert!(list[0].get("continued").is_none());
    }

    #[test]
    fn prune_removes_only_unreferenced_attachment_pngs() {
        let dir = tempdir().unwrap();
        let records = vec![record("figure", "1", 1, "Figure_1_kept.png")];

        fs::write(dir.path().join("Figure_1_kept.png"), b"png").unwrap();
        fs::write(dir.path().join("Figure_9_stale.png"), b"png").unwrap();
        fs::write(dir.path().join("Table_3_stale.png"), b"png").unwrap();
        fs::write(dir.path().join("unrelated.png"), b"png").unwrap();
        fs::write(dir.path().join("notes.txt"), b"text").unwrap();

        let removed = prune_unreferenced(dir.path(), &records);
        assert_eq!(removed, 2);
        assert!(dir.path().join("Figure_1_kept.png").exists());
        assert!(dir.path().join("unrelated.png").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("Figure_9_stale.png").exists());
        assert!(!dir.path().join("Table_3_stale.png").exists());
    }

    #[test]
    fn manifest_mirrors_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.csv");
        let records = vec![record("figure", "1", 1, "Figure_1_x.png")];
        write_manifest(&records, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("kind,ident,page,caption,file,continued"));
        assert!(text.contains("figure,1,1,"));
    }

    #[test]
    fn hash_pdf_is_stable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"%PDF-1.4 fake").unwrap();
        let h1 = hash_pdf(&path).unwrap();
        let h2 = hash_pdf(&path).unwrap();
        assert_eq!(h1, h2);
        assert!(h1.starts_with("sha256:"));
        assert_eq!(h1.len(), "sha256:".len() + 16);
    }
}
