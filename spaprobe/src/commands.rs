use crate::CLAP_STYLING;
use clap::{arg, command};
use std::path::PathBuf;
use url::Url;

fn browser_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-c --"config" <PATH>)
            .required(false)
            .help("JSON crawler configuration file"),
    )
    .arg(
        arg!(--"headed")
            .required(false)
            .help("Show the browser window instead of running headless")
            .action(clap::ArgAction::SetTrue),
    )
    .arg(
        arg!(--"chrome" <PATH>)
            .required(false)
            .help("Path to a Chrome/Chromium executable (default: $CHROME_EXECUTABLE, then PATH)")
            .value_parser(clap::value_parser!(PathBuf)),
    )
}

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("spaprobe")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("spaprobe")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" "Enable debug logging (RUST_LOG overrides)")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(browser_args(
            command!("crawl")
                .about(
                    "Load a JavaScript-heavy page in a real browser, wait for its content and \
                capture scripts, API calls and SPA routes.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to crawl")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to crawl one after another")
                        .value_parser(clap::value_parser!(PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-d --"capture-dir" <PATH>)
                        .required(false)
                        .help("Directory captured scripts are written to (default: captures)"),
                )
                .arg(
                    arg!(-r --"max-retries" <NUM>)
                        .required(false)
                        .help("Navigation attempts before giving up")
                        .value_parser(clap::value_parser!(u32).range(1..)),
                )
                .arg(
                    arg!(--"no-explore")
                        .required(false)
                        .help("Skip scrolling, clicking and SPA route exploration")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"api-only")
                        .required(false)
                        .help("Only report responses classified as API calls")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-s --"search" <KEYWORD>)
                        .required(false)
                        .help("Only report responses whose URL contains KEYWORD (case-insensitive)"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown")
                        .value_parser(["text", "json", "markdown", "md"])
                        .default_value("text"),
                ),
        ))
        .subcommand(browser_args(
            command!("check")
                .about("Quickly check whether a page loads and renders content")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to check")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the result as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        ))
        .subcommand(browser_args(
            command!("diagnose")
                .about("Try several navigation strategies against a URL and suggest fixes")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to diagnose")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Print the result as JSON")
                        .action(clap::ArgAction::SetTrue),
                ),
        ))
        .subcommand(
            command!("files")
                .about("List scripts saved by previous crawls")
                .arg(
                    arg!(-d --"capture-dir" <PATH>)
                        .required(false)
                        .help("Capture directory to read")
                        .default_value("captures"),
                ),
        )
}
