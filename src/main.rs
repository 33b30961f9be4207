use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crm_reconciler::config::{self, CoreConfig};
use crm_reconciler::domain::dispatch::audit;
use crm_reconciler::domain::dispatch::connection::{HostConnection, ShellConnection};
use crm_reconciler::domain::dispatch::dispatcher::CommandDispatcher;
use crm_reconciler::domain::dispatch::remote_api::RemoteApiConnection;
use crm_reconciler::domain::ids::HostName;
use crm_reconciler::domain::reconcile::delta::compute_delta;
use crm_reconciler::domain::reconcile::reconciler::Reconciler;
use crm_reconciler::domain::reconcile::report::{ApplyReport, CommandOutcome};
use crm_reconciler::domain::status::poller::StatusPoller;
use crm_reconciler::{load_agent_catalog, load_desired_config, logger, parse_status_document};

/// Drives a Pacemaker cluster toward a declared configuration.
#[derive(Parser)]
#[command(name = "crm-reconciler")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the commands that would bring the cluster to the desired configuration
    Plan {
        /// Agent manifest file
        #[arg(long)]
        catalog: String,

        /// Desired configuration file
        #[arg(long)]
        desired: String,

        /// Captured status document of the live cluster
        #[arg(long)]
        status: String,
    },

    /// Compute the delta against the live cluster and apply it
    Apply {
        /// Agent manifest file
        #[arg(long)]
        catalog: String,

        /// Desired configuration file
        #[arg(long)]
        desired: String,

        /// Host eligible to carry a command stream, repeatable; falls back to the config file
        #[arg(long = "host")]
        hosts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logger::init();
    let config = config::load_config().await;
    if config.audit_file.is_some() {
        audit::init_global(config.audit_file.clone());
    }

    let result = match cli.command {
        Commands::Plan { catalog, desired, status } => run_plan(&catalog, &desired, &status).await,
        Commands::Apply { catalog, desired, hosts } => run_apply(&config, &catalog, &desired, hosts).await,
    };

    audit::shutdown_global();

    if let Err(e) = result {
        eprintln!("{} {}", "✗".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_plan(catalog_path: &str, desired_path: &str, status_path: &str) -> anyhow::Result<()> {
    let catalog = load_agent_catalog(catalog_path)?;
    let desired = load_desired_config(desired_path, catalog)?;

    let raw = tokio::fs::read_to_string(status_path).await?;
    let snapshot = parse_status_document(&raw)?;

    let commands = compute_delta(&desired, &snapshot);
    if commands.is_empty() {
        println!("{} Cluster already matches the desired configuration.", "✓".green().bold());
        return Ok(());
    }

    println!("\n{}", "Planned commands".bold().underline());
    for (index, command) in commands.iter().enumerate() {
        println!("{:>3}. {}", index + 1, command.render_line());
    }
    println!("\n{} command(s) to apply.", commands.len());

    Ok(())
}

async fn run_apply(config: &CoreConfig, catalog_path: &str, desired_path: &str, host_args: Vec<String>) -> anyhow::Result<()> {
    let catalog = load_agent_catalog(catalog_path)?;
    let desired = load_desired_config(desired_path, catalog)?;

    let hosts: Vec<HostName> = if host_args.is_empty() {
        config.host_names()
    } else {
        host_args.iter().map(HostName::new).collect()
    };
    let Some(status_host) = hosts.first().cloned() else {
        anyhow::bail!("no target hosts given, pass --host or list them in the config file");
    };

    let connection: Arc<dyn HostConnection> = match &config.remote_api {
        Some(remote) => {
            let api = RemoteApiConnection::new(&remote.base_url, &remote.user_name, &remote.auth_token)?;
            api.probe().await?;
            Arc::new(api)
        }
        None => Arc::new(ShellConnection),
    };

    let poller = StatusPoller::new(connection.clone(), status_host, config.poll_interval());
    let snapshot = poller.poll_once().await?;

    let dispatcher = Arc::new(CommandDispatcher::new(connection, config.retry_policy(), config.command_timeout()));
    let reconciler = Reconciler::new(dispatcher);

    let cancel = CancellationToken::new();
    let signal_guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, skipping commands that have not started yet.");
            signal_guard.cancel();
        }
    });

    let report = reconciler.reconcile(&desired, &snapshot, &hosts, &cancel).await?;
    print_report(&report);

    if report.is_clean() {
        Ok(())
    } else {
        anyhow::bail!("apply run left {} command(s) unapplied", report.failed() + report.skipped())
    }
}

fn print_report(report: &ApplyReport) {
    println!("\n{}", "Apply report".bold().underline());

    for entry in &report.commands {
        match &entry.outcome {
            CommandOutcome::Succeeded { attempts } if *attempts > 1 => {
                println!("{} [{}] {} (attempt {})", "✓".green().bold(), entry.host, entry.command_line, attempts);
            }
            CommandOutcome::Succeeded { .. } => {
                println!("{} [{}] {}", "✓".green().bold(), entry.host, entry.command_line);
            }
            CommandOutcome::Failed { error } => {
                println!("{} [{}] {}: {}", "✗".red().bold(), entry.host, entry.command_line, error);
            }
            CommandOutcome::Skipped { reason } => {
                println!("{} [{}] {}: skipped, {}", "!".yellow().bold(), entry.host, entry.command_line, reason);
            }
        }
    }

    println!(
        "\n{} succeeded, {} failed, {} skipped.",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
}
