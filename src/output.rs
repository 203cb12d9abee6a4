//! CLI output formatting for build and check runs.
//!
//! Each entity gets a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.
//!
//! ```text
//! 001 docs/index.html
//!     photo.jpg: 4 sources, 12 breakpoints
//!     hero.jpg: FAILED (Failed to decode /site/hero.jpg: ...)
//!
//! Built 3 documents, 7 images rewritten, 1 failed
//! ```

use crate::pipeline::DocumentOutcome;
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One document's result block: header line plus one indented line per image.
pub fn format_document(index: usize, document: &Path, outcome: &DocumentOutcome) -> Vec<String> {
    let mut lines = vec![format!("{} {}", format_index(index), document.display())];

    for image in &outcome.images {
        let breakpoints: usize = image.sources.iter().map(|s| s.breakpoints.len()).sum();
        lines.push(format!(
            "    {}: {} sources, {} breakpoints",
            file_name(&image.original_path),
            image.sources.len(),
            breakpoints
        ));
    }

    for failure in &outcome.failures {
        lines.push(format!(
            "    {}: FAILED ({})",
            file_name(&failure.path),
            failure.error
        ));
    }

    if outcome.images.is_empty() && outcome.failures.is_empty() {
        lines.push("    no responsive images".to_string());
    }

    lines
}

pub fn print_document(index: usize, document: &Path, outcome: &DocumentOutcome) {
    for line in format_document(index, document, outcome) {
        println!("{}", line);
    }
}

/// Closing summary line for a build run.
pub fn format_build_summary(documents: usize, images: usize, failures: usize) -> String {
    let mut summary = format!(
        "Built {} document{}, {} image{} rewritten",
        documents,
        if documents == 1 { "" } else { "s" },
        images,
        if images == 1 { "" } else { "s" },
    );
    if failures > 0 {
        summary.push_str(&format!(", {failures} failed"));
    }
    summary
}

/// Closing summary line for a check run.
pub fn format_check_summary(documents: usize, directives: usize) -> String {
    format!(
        "Checked {} document{}, {} responsive image tag{}",
        documents,
        if documents == 1 { "" } else { "s" },
        directives,
        if directives == 1 { "" } else { "s" },
    )
}
