use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "claude-context-watch",
    version,
    about = "Watch Claude Code context usage per project and alert near the limit"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a one-shot snapshot of active sessions.
    Status {
        /// Emit the sessions as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Check the projects directory and notification tooling.
    Doctor,
}
