use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use claude_context_watch::app;
use claude_context_watch::cli::{Cli, Commands};
use claude_context_watch::config::{self, WatchConfig};
use claude_context_watch::process_guard;
use claude_context_watch::util::setup_tracing;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("claude-context-watch error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<u8> {
    let cli = Cli::parse();
    let watching_interactively = cli.command.is_none() && io::stdout().is_terminal();
    setup_tracing(if watching_interactively { "error" } else { "info" });
    let config = WatchConfig::load_or_init()?;
    let runtime = config::runtime_settings();

    match cli.command {
        Some(Commands::Status { json }) => {
            app::print_status(&runtime, json)?;
            Ok(0)
        }
        Some(Commands::Doctor) => app::doctor(&config),
        None => {
            let _guard = process_guard::claim_watcher_lock()?;
            app::run(config, runtime)?;
            Ok(0)
        }
    }
}
