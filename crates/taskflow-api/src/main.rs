//! taskflow operator CLI.
//!
//! Binary name: `flowctl`
//!
//! Loads `taskflow.toml`, installs tracing, opens the SQLite store, and
//! dispatches to a workflow command.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::workflow::ListFilter;
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "flowctl", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = AppState::load_config(cli.config.as_deref()).await;
    config.logging.level =
        taskflow_observe::tracing_setup::level_for_verbosity(&config.logging.level, cli.verbose);
    if let Err(e) = taskflow_observe::tracing_setup::init_tracing(&config.logging) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = run(cli, config).await;
    taskflow_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli, config: taskflow_types::config::FlowConfig) -> anyhow::Result<()> {
    let state = AppState::init(config).await?;
    tracing::debug!(namespace = %state.config.namespace, "client ready");

    match cli.command {
        Commands::List { finished, running } => {
            let filter = ListFilter::from_flags(finished, running);
            cli::workflow::list_workflows(&state, filter, cli.json).await?;
        }
        Commands::Show { workflow_id } => {
            cli::workflow::show_workflow(&state, &workflow_id, cli.json).await?;
        }
        Commands::StartTask {
            workflow_id,
            task_id,
        } => {
            cli::workflow::start_task(&state, &workflow_id, &task_id, cli.json).await?;
        }
        Commands::RestartTask {
            workflow_id,
            task_id,
        } => {
            cli::workflow::restart_task(&state, &workflow_id, &task_id, cli.json).await?;
        }
        Commands::ClearTask {
            workflow_id,
            task_id,
        } => {
            cli::workflow::clear_task(&state, &workflow_id, &task_id, cli.json).await?;
        }
        Commands::SetQueue {
            workflow_id,
            task_id,
            queue,
        } => {
            cli::workflow::set_queue(&state, &workflow_id, &task_id, &queue, cli.json).await?;
        }
        Commands::Destroy { workflow_id } => {
            cli::workflow::destroy_workflow(&state, &workflow_id, cli.json).await?;
        }
        Commands::Prune => {
            cli::workflow::prune(&state, cli.json).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
