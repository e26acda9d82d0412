// Report generation from crawl results

use crate::crawl::extract_route;
use crate::views::{UrlFilter, group_by_type};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use spaprobe_scanner::result::CrawlResult;
use spaprobe_scanner::store::StoredScript;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const HEAVY_RULE: &str =
    "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

/// Render `result` in `format`, restricted to the responses `filter` selects.
pub fn generate_report(
    result: &CrawlResult,
    filter: &UrlFilter,
    format: ReportFormat,
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(result, filter)),
        ReportFormat::Json => generate_json_report(result, filter),
        ReportFormat::Markdown => Ok(generate_markdown_report(result, filter)),
    }
}

fn colored_status(status: u16) -> String {
    let s = status.to_string();
    match status {
        200..=299 => s.green().to_string(),
        300..=399 => s.cyan().to_string(),
        400..=499 => s.yellow().to_string(),
        500..=599 => s.red().to_string(),
        _ => s,
    }
}

fn section(report: &mut String, title: &str) {
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str(title);
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");
}

pub fn generate_text_report(result: &CrawlResult, filter: &UrlFilter) -> String {
    let urls = filter.apply(&result.urls);
    let api_count = urls.iter().filter(|r| r.is_api).count();
    let mut report = String::new();

    // Header
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                          SPAPROBE CRAWL REPORT\n");
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");

    report.push_str(&format!("Session ID:   {}\n", result.session_id));
    report.push_str(&format!("Target:       {}\n", result.target_url));
    if result.final_url != result.target_url {
        report.push_str(&format!("Final URL:    {}\n", result.final_url));
    }
    report.push_str(&format!("Strategy:     {}\n", result.navigation_strategy));
    report.push_str(&format!("Crawl Date:   {}\n", format_timestamp_ms(result.started_at)));
    report.push_str(&format!(
        "Duration:     {:.1} seconds\n\n",
        result.duration_ms() as f64 / 1000.0
    ));

    report.push_str("# Summary:\n");
    report.push_str(&format!("  Responses captured: {}\n", urls.len()));
    report.push_str(&format!("  API endpoints: {}\n", api_count));
    report.push_str(&format!("  Scripts saved: {}\n", result.files.len()));
    report.push_str(&format!("  Routes visited: {}\n", result.routes.len()));
    report.push_str(&format!("  Failed requests: {}\n", result.failed_requests.len()));

    let state = &result.page_state;
    report.push_str(&format!(
        "  Page state: {}, {}, score {:.1}\n",
        if state.is_stable { "stable" } else { "unstable" },
        if state.has_content { "has content" } else { "no content" },
        state.content_score
    ));
    if state.is_js_rendered {
        report.push_str("  Rendering: JavaScript framework detected\n");
    }
    if !state.loading_indicators.is_empty() {
        report.push_str(&format!(
            "  Loading indicators: {}\n",
            state.loading_indicators.join(", ")
        ));
    }
    for error in &state.errors {
        report.push_str(&format!("  Error: {}\n", error));
    }
    report.push('\n');

    if !filter.is_empty() {
        let mut applied = Vec::new();
        if filter.api_only {
            applied.push("api only".to_string());
        }
        if let Some(ref keyword) = filter.search {
            applied.push(format!("search \"{}\"", keyword));
        }
        report.push_str(&format!("  Filter: {}\n\n", applied.join(", ")));
    }

    section(&mut report, "CAPTURED RESPONSES");
    if urls.is_empty() {
        report.push_str("  (none)\n\n");
    }
    for (url_type, group) in group_by_type(urls.iter().copied()) {
        report.push_str(&format!("## {} ({})\n", url_type, group.len()));
        for response in group {
            let mut line = format!(
                "  {} {} {}",
                colored_status(response.status),
                response.method,
                response.url
            );
            if !response.content_type.is_empty() && response.content_type != "text/html" {
                line.push_str(&format!(" {}", response.content_type.bright_black()));
            }
            report.push_str(&line);
            report.push('\n');
        }
        report.push('\n');
    }

    if !result.routes.is_empty() {
        section(&mut report, "SPA ROUTES");
        for route in &result.routes {
            report.push_str(&format!(
                "  {}  {}  (score {:.1})\n",
                extract_route(&route.url),
                route.title,
                route.content_score
            ));
        }
        report.push('\n');
    }

    if !result.files.is_empty() {
        section(&mut report, "SAVED SCRIPTS");
        for script in &result.files {
            let location = script
                .local_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(not saved)".to_string());
            report.push_str(&format!("  {}\n", script.url));
            report.push_str(&format!("    {} bytes -> {}\n", script.size, location));
        }
        report.push('\n');
    }

    if !result.failed_requests.is_empty() {
        section(&mut report, "FAILED REQUESTS");
        for failed in &result.failed_requests {
            report.push_str(&format!("  {} {}\n", failed.method, failed.url));
            report.push_str(&format!("    {}\n", failed.error.red()));
        }
        report.push('\n');
    }

    // Footer
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                              End of Report\n");
    report.push_str(HEAVY_RULE);
    report.push('\n');

    report
}

pub fn generate_json_report(
    result: &CrawlResult,
    filter: &UrlFilter,
) -> Result<String, serde_json::Error> {
    let urls = filter.apply(&result.urls);
    let files: Vec<serde_json::Value> = result
        .files
        .iter()
        .map(|f| {
            serde_json::json!({
                "url": f.url,
                "size": f.size,
                "method": f.method,
                "timestamp": format_timestamp_rfc3339(f.timestamp),
                "local_path": f.local_path,
            })
        })
        .collect();

    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "spaprobe",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "crawl": {
                "session_id": result.session_id,
                "target_url": result.target_url,
                "final_url": result.final_url,
                "navigation_strategy": result.navigation_strategy,
                "started_at": format_timestamp_rfc3339(result.started_at),
                "finished_at": format_timestamp_rfc3339(result.finished_at),
                "duration_ms": result.duration_ms(),
                "page_state": result.page_state
            },
            "summary": {
                "total_urls": urls.len(),
                "api_urls": urls.iter().filter(|r| r.is_api).count(),
                "files": result.files.len(),
                "routes": result.routes.len(),
                "failed_requests": result.failed_requests.len()
            },
            "filter": {
                "api_only": filter.api_only,
                "search": filter.search
            },
            "urls": urls,
            "files": files,
            "routes": result.routes,
            "failed_requests": result.failed_requests
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_markdown_report(result: &CrawlResult, filter: &UrlFilter) -> String {
    let urls = filter.apply(&result.urls);
    let mut report = String::new();

    report.push_str("# spaprobe Crawl Report\n\n");
    report.push_str(&format!("- **Target:** {}\n", result.target_url));
    report.push_str(&format!("- **Final URL:** {}\n", result.final_url));
    report.push_str(&format!("- **Strategy:** {}\n", result.navigation_strategy));
    report.push_str(&format!("- **Session:** `{}`\n", result.session_id));
    report.push_str(&format!("- **Date:** {}\n", format_timestamp_ms(result.started_at)));
    report.push_str(&format!("- **Duration:** {} ms\n\n", result.duration_ms()));

    report.push_str("## Summary\n\n");
    report.push_str("| Metric | Count |\n|---|---|\n");
    report.push_str(&format!("| Responses | {} |\n", urls.len()));
    report.push_str(&format!(
        "| API endpoints | {} |\n",
        urls.iter().filter(|r| r.is_api).count()
    ));
    report.push_str(&format!("| Scripts saved | {} |\n", result.files.len()));
    report.push_str(&format!("| Routes | {} |\n", result.routes.len()));
    report.push_str(&format!(
        "| Failed requests | {} |\n\n",
        result.failed_requests.len()
    ));

    report.push_str("## Responses\n\n");
    if urls.is_empty() {
        report.push_str("_None captured._\n\n");
    } else {
        report.push_str("| Status | Method | Type | URL |\n|---|---|---|---|\n");
        for response in &urls {
            report.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                response.status,
                response.method,
                response.url_type,
                escape_cell(&response.url)
            ));
        }
        report.push('\n');
    }

    if !result.routes.is_empty() {
        report.push_str("## Routes\n\n| URL | Title | Score |\n|---|---|---|\n");
        for route in &result.routes {
            report.push_str(&format!(
                "| {} | {} | {:.1} |\n",
                escape_cell(&route.url),
                escape_cell(&route.title),
                route.content_score
            ));
        }
        report.push('\n');
    }

    if !result.failed_requests.is_empty() {
        report.push_str("## Failed Requests\n\n");
        for failed in &result.failed_requests {
            report.push_str(&format!("- `{} {}`: {}\n", failed.method, failed.url, failed.error));
        }
        report.push('\n');
    }

    report
}

/// Listing of scripts already on disk, as printed by `spaprobe files`.
pub fn format_stored_scripts(scripts: &[StoredScript]) -> String {
    if scripts.is_empty() {
        return "No captured scripts found.\n".to_string();
    }

    let mut out = String::new();
    let total: u64 = scripts.iter().map(|s| s.size).sum();
    out.push_str(&format!(
        "{} script(s), {} bytes total\n\n",
        scripts.len(),
        total
    ));
    for script in scripts {
        let when = script
            .timestamp
            .map(format_timestamp_ms)
            .unwrap_or_else(|| "unknown time".to_string());
        out.push_str(&format!("  {}\n", script.file_name.bold()));
        out.push_str(&format!(
            "    host {}  {}  {} bytes\n",
            script.hostname, when, script.size
        ));
    }
    out
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

pub(crate) fn format_timestamp_ms(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now);
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_timestamp_rfc3339(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now);
    datetime.to_rfc3339()
}
