//! Per-page audit report (`split_report.csv`).

use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::PageResult;

pub const REPORT_FILENAME: &str = "split_report.csv";

const HEADER: &str = "page,status,beo,matches";

/// Escape a string for CSV output.
pub fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Render the report: a header line, then one row per result in ascending
/// page order.
pub fn render_csv(results: &[PageResult]) -> String {
    let mut rows: Vec<&PageResult> = results.iter().collect();
    rows.sort_by_key(|r| r.page_number);

    let mut output = Vec::new();
    writeln!(output, "{}", HEADER).ok();
    for result in rows {
        writeln!(
            output,
            "{},{},{},{}",
            result.page_number,
            result.outcome.status(),
            result.outcome.identifier().unwrap_or(""),
            escape_csv(&result.raw_matches().join(","))
        )
        .ok();
    }
    String::from_utf8_lossy(&output).into_owned()
}

/// Write the report into `dir` and return its path.
pub async fn write_report(dir: &Path, results: &[PageResult]) -> std::io::Result<PathBuf> {
    let path = dir.join(REPORT_FILENAME);
    tokio::fs::write(&path, render_csv(results)).await?;
    Ok(path)
}
