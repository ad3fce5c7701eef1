//! CLI 명령 파싱 모듈.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "reviewpilot")]
#[command(about = "Webhook-driven AI review for GitHub pull requests")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Receive webhooks and run review workers in one process
    Serve {
        /// Listen address (overrides `server.bind`)
        #[arg(long)]
        bind: Option<String>,
        /// Number of workers (overrides `worker.concurrency`)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run review workers only (requires a shared queue such as sqlite://)
    Worker {
        /// Number of workers (overrides `worker.concurrency`)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Show effective merged config and credential sources
    Config,
    /// List jobs that exhausted their retry budget
    DeadLetters,
}
