use colored::Colorize;
use commands::command_argument_builder;
use spaprobe::handlers::{handle_check, handle_crawl, handle_diagnose, handle_files, print_banner};
use tracing_subscriber::EnvFilter;

mod commands;

fn init_tracing(verbose: bool) {
    let default = if verbose { "spaprobe=debug" } else { "spaprobe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_tracing(chosen_command.get_flag("verbose"));

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let outcome = match chosen_command.subcommand() {
        Some(("crawl", primary_command)) => handle_crawl(primary_command, quiet).await,
        Some(("check", primary_command)) => handle_check(primary_command, quiet).await,
        Some(("diagnose", primary_command)) => handle_diagnose(primary_command, quiet).await,
        Some(("files", primary_command)) => handle_files(primary_command).await,
        // No subcommand provided, just show the banner
        None => return,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
