use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use colored::Colorize;
use spaprobe_core::crawl::{CrawlOptions, execute_check, execute_crawl, execute_diagnose};
use spaprobe_core::diagnose::{format_accessibility_report, format_diagnostic_report};
use spaprobe_core::report::{ReportFormat, format_stored_scripts, generate_report, save_report};
use spaprobe_core::views::UrlFilter;
use spaprobe_scanner::{CaptureStore, CrawlerConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

// Helper functions for crawl handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file. Lines starting with `#` are comments.
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as an http(s) URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok_and(|u| u.host_str().is_some_and(|h| !h.contains(' '))) {
        return Some(with_scheme);
    }

    eprintln!("{}  Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

/// Command-line settings layered over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<String>,
    pub capture_dir: Option<String>,
    pub max_retries: Option<u32>,
    pub chrome: Option<PathBuf>,
    pub headed: bool,
    pub no_explore: bool,
}

impl ConfigOverrides {
    /// Subcommands only define some of these arguments; absent ones stay unset.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_file: matches.try_get_one::<String>("config").ok().flatten().cloned(),
            capture_dir: matches
                .try_get_one::<String>("capture-dir")
                .ok()
                .flatten()
                .cloned(),
            max_retries: matches.try_get_one::<u32>("max-retries").ok().flatten().copied(),
            chrome: matches.try_get_one::<PathBuf>("chrome").ok().flatten().cloned(),
            headed: flag(matches, "headed"),
            no_explore: flag(matches, "no-explore"),
        }
    }
}

fn flag(matches: &ArgMatches, id: &str) -> bool {
    matches
        .try_get_one::<bool>(id)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

/// Build the crawler configuration: defaults, then the JSON file, then flags.
pub fn load_config(overrides: &ConfigOverrides) -> Result<CrawlerConfig> {
    let mut config = match overrides.config_file {
        Some(ref path) => {
            let path = expand_path(path);
            CrawlerConfig::from_json_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => CrawlerConfig::default(),
    };

    config.capture_dir = match overrides.capture_dir {
        Some(ref dir) => expand_path(dir),
        None => expand_path(&config.capture_dir.to_string_lossy()),
    };
    if let Some(retries) = overrides.max_retries {
        config = config.with_max_retries(retries);
    }
    if let Some(ref chrome) = overrides.chrome {
        config.chrome_executable = Some(chrome.clone());
    }
    if overrides.headed {
        config.headless = false;
    }
    if overrides.no_explore {
        config = config.with_explore(false);
    }

    debug!("Effective config: {:?}", config);
    Ok(config)
}

/// Where the report for target `index` of `total` goes. Multiple targets get
/// a numbered suffix before the extension.
pub fn output_path_for(base: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    let name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, index + 1, ext.to_string_lossy()),
        None => format!("{}-{}", stem, index + 1),
    };
    base.with_file_name(name)
}

pub fn print_banner() {
    let banner = r#"
   ___ _ __   __ _ _ __  _ __ ___ | |__   ___
  / __| '_ \ / _` | '_ \| '__/ _ \| '_ \ / _ \
  \__ \ |_) | (_| | |_) | | | (_) | |_) |  __/
  |___/ .__/ \__,_| .__/|_|  \___/|_.__/ \___|
      |_|         |_|"#;
    println!("{}", banner.bright_cyan().bold());
    println!(
        "  {} {}\n",
        "adaptive crawler for JavaScript-heavy sites".bright_white(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let url = sub_matches.get_one::<Url>("url");
    let hosts_file = sub_matches.get_one::<PathBuf>("hosts-file");
    let urls = load_urls_from_source(url, hosts_file).map_err(anyhow::Error::msg)?;
    let config = load_config(&ConfigOverrides::from_matches(sub_matches))?;

    let format = sub_matches
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let filter = UrlFilter {
        api_only: sub_matches.get_flag("api-only"),
        search: sub_matches.get_one::<String>("search").cloned(),
    };
    let output = sub_matches.get_one::<PathBuf>("output");

    if !quiet {
        print_divider();
        println!("  Crawling {} target(s)", urls.len());
        println!("  Capture dir: {}", config.capture_dir.display());
        println!("  Max retries: {}", config.max_retries);
        println!(
            "  Explore: {}",
            if config.explore { "enabled" } else { "disabled" }
        );
        print_divider();
        println!();
    }

    let mut failures = 0;
    for (idx, target) in urls.iter().enumerate() {
        let mut options = CrawlOptions::new(target.clone(), config.clone());
        options.show_progress_bars = !quiet;

        let result = match execute_crawl(options, None).await {
            Ok(result) => result,
            Err(e) => {
                eprintln!("{} Crawl of {} failed: {}", "✗".red().bold(), target, e);
                failures += 1;
                continue;
            }
        };

        let report = generate_report(&result, &filter, format)?;
        match output {
            Some(base) => {
                let path = output_path_for(base, idx, urls.len());
                save_report(&report, &path)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
            None => print!("{}", report),
        }
    }

    if failures > 0 && failures == urls.len() {
        bail!("all {} crawl(s) failed", failures);
    }
    Ok(())
}

pub async fn handle_check(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let url = sub_matches
        .get_one::<Url>("url")
        .context("--url is required")?;
    let config = load_config(&ConfigOverrides::from_matches(sub_matches))?;

    let mut options = CrawlOptions::new(url.as_str(), config);
    options.show_progress_bars = !quiet;
    let report = execute_check(options, None).await?;

    if sub_matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_accessibility_report(&report));
    }
    Ok(())
}

pub async fn handle_diagnose(sub_matches: &ArgMatches, quiet: bool) -> Result<()> {
    let url = sub_matches
        .get_one::<Url>("url")
        .context("--url is required")?;
    let config = load_config(&ConfigOverrides::from_matches(sub_matches))?;

    let mut options = CrawlOptions::new(url.as_str(), config);
    options.show_progress_bars = !quiet;
    let report = execute_diagnose(options, None).await?;

    if sub_matches.get_flag("json") {
        let suggestions = spaprobe_core::diagnose::suggestions(&report);
        let value = serde_json::json!({
            "diagnostics": report,
            "suggestions": suggestions,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", format_diagnostic_report(&report));
    }
    Ok(())
}

pub async fn handle_files(sub_matches: &ArgMatches) -> Result<()> {
    let dir = sub_matches
        .get_one::<String>("capture-dir")
        .map(|d| expand_path(d))
        .unwrap_or_else(|| PathBuf::from("captures"));

    let scripts = CaptureStore::new(&dir)
        .read_all()
        .await
        .with_context(|| format!("Failed to read capture dir {}", dir.display()))?;

    println!("{}\n", dir.display().to_string().bright_white().bold());
    print!("{}", format_stored_scripts(&scripts));
    Ok(())
}
