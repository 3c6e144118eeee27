//! External tool check.

use console::style;

use crate::config::Settings;

/// Report whether `pdftotext` and the OCR command are on PATH.
pub fn cmd_tools(settings: &Settings) -> anyhow::Result<()> {
    let tools = [
        ("pdftotext", "pdftotext", true, "poppler-utils"),
        ("OCR", settings.split.ocr_command.as_str(), false, "ocrmypdf"),
    ];

    let mut missing_required = false;
    for (label, binary, required, package) in tools {
        match which::which(binary) {
            Ok(path) => println!(
                "  {} {} ({})",
                style("✓").green(),
                label,
                path.display()
            ),
            Err(_) if required => {
                missing_required = true;
                println!(
                    "  {} {} not found; install {}",
                    style("✗").red(),
                    binary,
                    package
                );
            }
            Err(_) => println!(
                "  {} {} not found; scanned packets cannot be OCR'd (install {})",
                style("!").yellow(),
                binary,
                package
            ),
        }
    }

    if missing_required {
        anyhow::bail!("Required tools are missing");
    }
    Ok(())
}
