//! Log viewing command.

use console::style;

use pl_core::config::ConfigHandle;
use pl_core::error::PlResult;
use crate::OutputFormat;

/// Run the logs command.
pub async fn run(
    config: ConfigHandle,
    count: u32,
    level_filter: Option<String>,
    format: OutputFormat,
) -> PlResult<()> {
    let log_dir = config.read().await.effective_log_dir()?;

    if !log_dir.exists() {
        println!("No log directory found at: {}", log_dir.display());
        return Ok(());
    }

    // Find the most recent log file (daily rotation appends the date).
    let mut log_files: Vec<_> = std::fs::read_dir(&log_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("parcellive.log")
        })
        .collect();

    log_files.sort_by_key(|e| std::cmp::Reverse(e.metadata().ok().and_then(|m| m.modified().ok())));

    let Some(latest) = log_files.first() else {
        println!("No log files found in: {}", log_dir.display());
        return Ok(());
    };

    let content = std::fs::read_to_string(latest.path())?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count as usize);

    match format {
        OutputFormat::Json => {
            let selected: Vec<&str> = lines[start..]
                .iter()
                .filter(|line| matches_level(line, &level_filter))
                .copied()
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "file": latest.path().display().to_string(),
                    "lines": selected,
                }))
                .unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            println!(
                "  {} {}\n",
                style("LOG").cyan().bold(),
                latest.path().display()
            );
            for line in &lines[start..] {
                if !matches_level(line, &level_filter) {
                    continue;
                }
                println!("{}", colorize_log_line(line));
            }
        }
    }

    Ok(())
}

/// Apply the level filter, if any.
fn matches_level(line: &str, filter: &Option<String>) -> bool {
    match filter {
        Some(level) => line.to_uppercase().contains(&level.to_uppercase()),
        None => true,
    }
}

/// Colorize a log line based on its level marker.
fn colorize_log_line(line: &str) -> String {
    if line.contains("ERROR") {
        style(line).red().to_string()
    } else if line.contains("WARN") {
        style(line).yellow().to_string()
    } else if line.contains("DEBUG") || line.contains("TRACE") {
        style(line).dim().to_string()
    } else {
        line.to_string()
    }
}
