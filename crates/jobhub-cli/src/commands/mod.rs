//! CLI command definitions and dispatch.

pub mod job;
pub mod stats;
pub mod watch;

use clap::{Parser, Subcommand};

use jobhub_core::error::AppError;

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// JobHub: submit, control and watch batch jobs
#[derive(Debug, Parser)]
#[command(name = "jobhub", version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the JobHub server
    #[arg(
        short,
        long,
        env = "JOBHUB_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub server: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit a new job from a JSON file of records
    Submit(job::SubmitArgs),
    /// List jobs, newest first
    List(job::ListArgs),
    /// Show one job
    Status(job::JobArg),
    /// Pause a running job
    Pause(job::JobArg),
    /// Resume a paused job
    Resume(job::JobArg),
    /// Cancel a job
    Cancel(job::JobArg),
    /// Retry the failed records of a failed job
    Retry(job::JobArg),
    /// List per-record outcomes
    Outcomes(job::OutcomesArgs),
    /// Show queue statistics
    Stats,
    /// Follow a job's progress until it finishes
    Watch(job::JobArg),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let client = ApiClient::new(&self.server);
        match &self.command {
            Commands::Submit(args) => job::submit(&client, args, self.format).await,
            Commands::List(args) => job::list(&client, args, self.format).await,
            Commands::Status(arg) => job::status(&client, arg, self.format).await,
            Commands::Pause(arg) => job::control(&client, arg, "pause", self.format).await,
            Commands::Resume(arg) => job::control(&client, arg, "resume", self.format).await,
            Commands::Cancel(arg) => job::control(&client, arg, "cancel", self.format).await,
            Commands::Retry(arg) => job::control(&client, arg, "retry", self.format).await,
            Commands::Outcomes(args) => job::outcomes(&client, args, self.format).await,
            Commands::Stats => stats::execute(&client, self.format).await,
            Commands::Watch(arg) => watch::execute(&client, arg, self.format).await,
        }
    }
}
