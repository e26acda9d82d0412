//! Human-readable analysis of quick checks and network diagnostics.

use crate::report::format_timestamp_ms;
use colored::Colorize;
use spaprobe_scanner::result::{AccessibilityReport, DiagnosticReport};

/// Loads slower than this earn a suggestion.
pub const SLOW_LOAD_MS: u64 = 30_000;

/// Suggestions derived from a diagnostic run, most specific first.
pub fn suggestions(report: &DiagnosticReport) -> Vec<String> {
    let mut out = Vec::new();

    if !report.reached() {
        out.push(
            "The page could not be reached with any strategy. Check the URL, DNS resolution and any firewall or proxy in between."
                .to_string(),
        );
    }

    match report.status {
        Some(403) => out.push(
            "Access was refused (403). The site may run bot protection: add random delays, use a realistic User-Agent, or route through a proxy."
                .to_string(),
        ),
        Some(404) => out.push("The URL does not exist (404). Check that it is spelled correctly.".to_string()),
        Some(429) => out.push("Requests are being rate limited (429). Increase the interval between requests.".to_string()),
        Some(s) if s >= 500 => out.push(format!(
            "The server answered with an error ({}). Retry later or check the site's status.",
            s
        )),
        _ => {}
    }

    if report.load_time_ms.is_some_and(|ms| ms > SLOW_LOAD_MS) {
        out.push(
            "The page took over 30 seconds to load. Check the network connection, run headless, or tune the wait strategy."
                .to_string(),
        );
    }

    if let Some(ref state) = report.page_state {
        if !state.has_content && state.is_js_rendered {
            out.push(
                "A JavaScript application was detected but rendered no content. Wait longer, trigger more interaction, or check whether a login is required."
                    .to_string(),
            );
        } else if !state.has_content {
            out.push(
                "The page is empty and is not a JavaScript application. It may have failed to load, need extra parameters, or be blocking crawlers."
                    .to_string(),
            );
        } else if !state.loading_indicators.is_empty() {
            out.push(format!(
                "Loading indicators are still present ({}); the page may not have finished loading.",
                state.loading_indicators.join(", ")
            ));
        }

        if !state.errors.is_empty() {
            out.push(format!("The page reported errors: {}", state.errors.join(", ")));
        }
    }

    if !report.failed_requests.is_empty() {
        out.push(format!(
            "{} network request(s) failed. The connection may be unstable, DNS may be misconfigured, or a firewall may be blocking them.",
            report.failed_requests.len()
        ));
    }

    if out.is_empty() && is_accessible(report) {
        out.push(
            "The page is accessible. If problems persist, look at the site's own behavior."
                .to_string(),
        );
    }

    out
}

/// Reached with a non-error status.
pub fn is_accessible(report: &DiagnosticReport) -> bool {
    report.reached() && report.status.is_none_or(|s| s < 400)
}

pub fn format_diagnostic_report(report: &DiagnosticReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("Diagnostics for {}\n\n", report.url.bold()));

    out.push_str("Navigation attempts:\n");
    for attempt in &report.attempts {
        let mark = if attempt.reached {
            "✓".green()
        } else {
            "✗".red()
        };
        let detail = match (&attempt.status, &attempt.error) {
            (Some(status), _) => format!("HTTP {}", status),
            (None, Some(error)) => error.clone(),
            (None, None) => "no response".to_string(),
        };
        out.push_str(&format!(
            "  {} {:<16} {:>6} ms  {}\n",
            mark, attempt.strategy, attempt.elapsed_ms, detail
        ));
    }
    out.push('\n');

    if let Some(status) = report.status {
        out.push_str(&format!("Status:       {}\n", status));
    }
    if let Some(ms) = report.load_time_ms {
        out.push_str(&format!("Load time:    {} ms\n", ms));
    }
    if let Some(ref url) = report.final_url {
        out.push_str(&format!("Final URL:    {}\n", url));
    }
    if let Some(ref title) = report.title {
        out.push_str(&format!("Title:        {}\n", title));
    }
    if let Some(ref state) = report.page_state {
        out.push_str(&format!(
            "Page state:   stable={} content={} js={} score={:.1}\n",
            state.is_stable, state.has_content, state.is_js_rendered, state.content_score
        ));
    }

    if !report.error_responses.is_empty() {
        out.push_str("\nError responses:\n");
        for response in &report.error_responses {
            out.push_str(&format!("  {} {}\n", response.status.to_string().yellow(), response.url));
        }
    }
    if !report.failed_requests.is_empty() {
        out.push_str("\nFailed requests:\n");
        for failed in &report.failed_requests {
            out.push_str(&format!(
                "  {} {} ({})\n",
                failed.method,
                failed.url,
                format_timestamp_ms(failed.timestamp)
            ));
            out.push_str(&format!("    {}\n", failed.error));
        }
    }

    out.push_str("\nSuggestions:\n");
    for suggestion in suggestions(report) {
        out.push_str(&format!("  - {}\n", suggestion));
    }

    out
}

pub fn format_accessibility_report(report: &AccessibilityReport) -> String {
    let verdict = if report.accessible {
        "ACCESSIBLE".green().bold()
    } else {
        "NOT ACCESSIBLE".red().bold()
    };

    let mut out = format!("{} {}\n", verdict, report.url);
    out.push_str(&format!("  {}\n", report.message));
    if let Some(status) = report.status {
        out.push_str(&format!("  Status:  {}\n", status));
    }
    if !report.title.is_empty() {
        out.push_str(&format!("  Title:   {}\n", report.title));
    }
    out.push_str(&format!(
        "  Content: score {:.1}{}\n",
        report.page_state.content_score,
        if report.page_state.is_js_rendered {
            ", JavaScript rendered"
        } else {
            ""
        }
    ));
    out.push_str(&format!("  Elapsed: {} ms\n", report.elapsed_ms));
    out
}
