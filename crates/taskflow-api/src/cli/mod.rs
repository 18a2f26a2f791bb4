//! CLI command definitions for the `flowctl` binary.
//!
//! Every command is a thin call into the workflow client; the CLI never
//! touches storage keys directly.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Inspect and steer taskflow workflows.
#[derive(Parser)]
#[command(name = "flowctl", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// More log output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to taskflow.toml (defaults to the data directory).
    #[arg(long, global = true, env = "TASKFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List workflows.
    #[command(alias = "ls")]
    List {
        /// Only finished workflows.
        #[arg(long, conflicts_with = "running")]
        finished: bool,

        /// Only workflows still in progress.
        #[arg(long)]
        running: bool,
    },

    /// Show a workflow and its tasks.
    Show {
        workflow_id: String,
    },

    /// Enqueue a pending task now, ignoring its trigger rule.
    #[command(name = "start-task")]
    StartTask {
        workflow_id: String,
        task_id: String,
    },

    /// Reset a task and everything downstream of it, then start it.
    #[command(name = "restart-task")]
    RestartTask {
        workflow_id: String,
        task_id: String,
    },

    /// Put a task back to pending; it waits for `start-task`.
    #[command(name = "clear-task")]
    ClearTask {
        workflow_id: String,
        task_id: String,
    },

    /// Move a task to another job queue.
    #[command(name = "set-queue")]
    SetQueue {
        workflow_id: String,
        task_id: String,
        queue: String,
    },

    /// Delete a workflow and its index entries.
    #[command(alias = "rm")]
    Destroy {
        workflow_id: String,
    },

    /// Delete every finished workflow.
    Prune,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
