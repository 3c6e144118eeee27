//! Split command.

use std::path::{Path, PathBuf};

use console::style;

use crate::config::{is_valid_margin_ratio, Settings};
use crate::split::OcrStatus;

/// Default output directory: `<stem>_split` beside the input.
fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("packet");
    input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!("{}_split", stem))
}

/// Split a packet and print a summary.
pub async fn cmd_split(
    settings: &Settings,
    input: &Path,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let margin = settings.split.margin_ratio;
    if !is_valid_margin_ratio(margin) {
        anyhow::bail!("Margin ratio must be in [0, 0.5), got {}", margin);
    }

    let outdir = output.unwrap_or_else(|| default_output_dir(input));
    println!(
        "{} Splitting {} into {}",
        style("→").cyan(),
        input.display(),
        outdir.display()
    );

    let summary = settings.split.splitter().split(input, &outdir).await?;

    match summary.ocr {
        OcrStatus::Replaced => println!("  {} Used OCR text layer", style("✓").green()),
        OcrStatus::NoReplacement => println!(
            "  {} OCR did not help; see ocr_log.txt",
            style("!").yellow()
        ),
        OcrStatus::Disabled => println!(
            "  {} No identifiers found and OCR is disabled",
            style("!").yellow()
        ),
        OcrStatus::NotNeeded => {}
    }

    if summary.gated {
        println!(
            "  {} {} page(s) need review; per-BEO files withheld",
            style("!").yellow(),
            summary.problem_pages
        );
    } else {
        println!(
            "  {} {} {} file(s) from {} page(s)",
            style("✓").green(),
            summary.resolved_count,
            summary.document_kind,
            summary.page_count
        );
        if summary.problem_pages > 0 {
            println!(
                "  {} {} page(s) need review",
                style("!").yellow(),
                summary.problem_pages
            );
        }
    }
    println!(
        "  {} Report: {}",
        style("→").cyan(),
        summary.report_path.display()
    );

    Ok(())
}
