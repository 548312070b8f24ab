//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, each subcommand
//! responds to `--help`, and bad input fails with a nonzero exit. None of
//! these require a pdfium library or a real PDF.

#![allow(deprecated)] // cargo_bin deprecation — replacement not yet stable

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `figcrop` binary.
fn figcrop() -> Command {
    Command::cargo_bin("figcrop").expect("binary 'figcrop' should be built")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    figcrop()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: figcrop"))
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("captions"))
        .stdout(predicate::str::contains("metrics"));
}

#[test]
fn short_help_flag_shows_usage() {
    figcrop()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: figcrop"));
}

#[test]
fn version_flag_shows_semver() {
    figcrop()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^figcrop \d+\.\d+\.\d+\n$").unwrap());
}

// ─── Subcommand help ─────────────────────────────────────────────────────────

#[test]
fn extract_help_lists_tuning_flags() {
    figcrop()
        .args(["extract", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dpi"))
        .stdout(predicate::str::contains("--clip-height"))
        .stdout(predicate::str::contains("--anchor-mode"))
        .stdout(predicate::str::contains("--force-below"))
        .stdout(predicate::str::contains("--prune-images"))
        .stdout(predicate::str::contains("--allow-continued"));
}

#[test]
fn captions_help_mentions_kind_filter() {
    figcrop()
        .args(["captions", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--kind"));
}

#[test]
fn metrics_help_mentions_format() {
    figcrop()
        .args(["metrics", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--format"));
}

// ─── Failure exits ───────────────────────────────────────────────────────────

#[test]
fn extract_missing_pdf_fails_with_input_error() {
    let dir = tempfile::tempdir().unwrap();
    figcrop()
        .args(["extract", "definitely-missing.pdf", "--out"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("input error"));
}

#[test]
fn extract_requires_pdf_argument() {
    figcrop().arg("extract").assert().failure();
}

#[test]
fn unknown_subcommand_fails() {
    figcrop().arg("frobnicate").assert().failure();
}
