//! Init command - first-run setup.

use crate::cli::preflight::{check_tool, install_hint};
use crate::cli::Output;
use crate::config::Settings;
use console::style;
use std::path::PathBuf;

/// Write a default config file (if missing) and report missing requirements.
pub fn run_init(settings: &Settings, config_path: Option<&PathBuf>) -> anyhow::Result<()> {
    Output::header("Podsift Setup");
    println!();

    println!("{}", style("Step 1: Checking prerequisites").bold().cyan());
    let mut missing = Vec::new();
    for tool in ["ffmpeg", "ffprobe"] {
        match check_tool(tool) {
            Ok(()) => println!("  {} {}", style("✓").green(), tool),
            Err(_) => {
                println!("  {} {} - not found", style("✗").red(), style(tool).bold());
                missing.push(tool);
            }
        }
    }
    if !missing.is_empty() {
        println!("    {} {}", style("→").dim(), style(install_hint()).dim());
    }
    println!();

    println!("{}", style("Step 2: Checking API configuration").bold().cyan());
    if settings.api_key().is_some() {
        Output::success("OpenAI API key is configured.");
    } else {
        Output::warning("No OpenAI API key found.");
        println!("  Set [openai] api_key in the config file or:");
        println!("  {}", style("export OPENAI_API_KEY='sk-...'").green());
    }
    println!();

    println!("{}", style("Step 3: Setting up directories").bold().cyan());
    for dir in [
        settings.downloads_dir(),
        settings.transcripts_dir(),
        settings.results_dir(),
    ] {
        if dir.exists() {
            Output::info(&format!("Exists: {}", dir.display()));
        } else {
            std::fs::create_dir_all(&dir)?;
            Output::success(&format!("Created: {}", dir.display()));
        }
    }
    println!();

    println!("{}", style("Step 4: Configuration file").bold().cyan());
    let path = config_path
        .cloned()
        .unwrap_or_else(Settings::default_config_path);
    if path.exists() {
        Output::info(&format!("Config file exists: {}", path.display()));
    } else {
        settings.save_to(&path)?;
        Output::success(&format!("Created config file: {}", path.display()));
    }
    if settings.feed.url.is_none() {
        println!("  Set the feed to process under {}", style("[feed] url").green());
    }
    println!();

    println!("Next steps:");
    println!("  {} Try a few episodes first", style("podsift run --limit 3").cyan());
    println!("  {} Process the whole feed", style("podsift run").cyan());
    println!("  {} See progress and failures", style("podsift status").cyan());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_config_once() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_string_lossy().to_string();
        let mut settings = Settings::default();
        settings.storage.downloads_dir = format!("{}/downloads", root);
        settings.storage.transcripts_dir = format!("{}/transcripts", root);
        settings.storage.results_dir = format!("{}/results", root);
        let config_path = temp.path().join("config.toml");

        run_init(&settings, Some(&config_path)).unwrap();
        assert!(config_path.exists());
        assert!(temp.path().join("results").is_dir());

        let loaded = Settings::load_from(Some(&config_path)).unwrap();
        assert_eq!(loaded.storage.results_dir, settings.storage.results_dir);

        std::fs::write(&config_path, "[feed]\nurl = \"https://x/feed\"\n").unwrap();
        run_init(&settings, Some(&config_path)).unwrap();
        let kept = Settings::load_from(Some(&config_path)).unwrap();
        assert_eq!(kept.feed.url.as_deref(), Some("https://x/feed"));
    }
}
