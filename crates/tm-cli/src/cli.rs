//! CLI argument definitions using clap derive API

use clap::{ArgGroup, Args, Parser, Subcommand};

/// Tidemark - ordered, recorded migrations for document databases
#[derive(Parser, Debug)]
#[command(name = "tm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory containing tidemark.yml
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override the database path (also read from TM_DATABASE)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Readable prefix of this run's lock owner id; the process id and a
    /// random suffix are appended
    #[arg(long, global = true)]
    pub owner_prefix: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply every pending migration
    Up(UpArgs),

    /// Roll back applied migrations
    Down(DownArgs),

    /// Show applied, pending, and unknown migrations
    Status(StatusArgs),

    /// Remove a migration lock left behind by a crashed run
    Unlock(UnlockArgs),
}

/// Arguments for the up command
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Show what would run without running it
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the down command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["to", "steps"])))]
pub struct DownArgs {
    /// Roll back every migration with a key above this one (0 for all)
    #[arg(long)]
    pub to: Option<u64>,

    /// Roll back this many of the most recent migrations
    #[arg(long)]
    pub steps: Option<usize>,

    /// Show what would run without running it
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print status as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the unlock command
#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Remove the lock without confirming the holder
    #[arg(short, long)]
    pub force: bool,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
