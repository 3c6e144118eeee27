//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::repository::open_submissions;

/// Initialize the data directory and database.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    open_submissions(&settings.database_url()).await?;

    println!(
        "{} Initialized beo-split in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    if !settings.has_supabase() {
        println!(
            "  {} Supabase not configured; archives will be stored in {}",
            style("!").yellow(),
            settings.storage_dir().display()
        );
    }
    if !settings.has_postmark() {
        println!(
            "  {} Postmark not configured; download links will be logged only",
            style("!").yellow()
        );
    }

    Ok(())
}
