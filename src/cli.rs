//! CLI command handling.
//!
//! Three commands over one configuration file:
//! - `up` — start services and provision load balancers
//! - `down` — remove load balancers and stop services
//! - `ps` — list running containers grouped by service
//!
//! Per-item failures are printed and never abort the run; the process exits
//! 1 when any item failed, 0 otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::ConvoyConfig;
use crate::inventory::format_ports;
use crate::lb::{ConfigStore, LbState, RemoveOutcome};
use crate::orchestrator::{LaunchOutcome, Orchestrator, StopOutcome};
use crate::runtime::DockerRuntime;

#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(about = "Declarative container-service orchestrator with load balancing")]
#[command(
    long_about = "Convoy starts scaled container services from a YAML file and provisions\nnginx load balancers in front of them.\nExamples:\n  convoy up            # Start everything in convoy.yml\n  convoy up web        # Start only the 'web' service\n  convoy down          # Tear everything down\n  convoy ps            # List running containers"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the convoy configuration file
    #[arg(short, long, global = true, default_value = "convoy.yml")]
    pub file: PathBuf,

    /// Directory for rendered load-balancer configs (defaults to a
    /// convoy-owned directory under the system temp dir)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start services and load balancers
    #[command(
        about = "Start services",
        long_about = "Starts every declared service (or a single one) and provisions load\nbalancers once their backends are running.\nExamples:\n  convoy up\n  convoy up --rebuild web"
    )]
    Up {
        /// Start only this service (skips load balancers)
        service: Option<String>,

        /// Pull images before starting
        #[arg(long)]
        rebuild: bool,
    },

    /// Stop and remove services and load balancers
    #[command(
        about = "Stop and remove services",
        long_about = "Removes load balancers first, then stops and removes service instances.\nWith a service argument, stops only that service and leaves load\nbalancers untouched.\nExample: convoy down"
    )]
    Down {
        /// Stop only this service (leaves load balancers untouched)
        service: Option<String>,
    },

    /// List running containers
    #[command(
        about = "List running containers",
        long_about = "Lists running containers grouped into services and load balancers,\nwith published port mappings.\nExample: convoy ps"
    )]
    Ps,
}

/// Execute a parsed CLI invocation. Returns whether everything succeeded.
pub async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = ConvoyConfig::load(&cli.file)?;
    let runtime = Arc::new(DockerRuntime::connect().await?);

    let mut orchestrator = Orchestrator::new(config, runtime);
    if let Some(dir) = &cli.config_dir {
        orchestrator = orchestrator.with_store(ConfigStore::new(dir));
    }

    match cli.command {
        Command::Up { service, rebuild } => run_up(&orchestrator, service.as_deref(), rebuild).await,
        Command::Down { service } => run_down(&orchestrator, service.as_deref()).await,
        Command::Ps => run_ps(&orchestrator).await,
    }
}

async fn run_up(
    orchestrator: &Orchestrator,
    service: Option<&str>,
    rebuild: bool,
) -> anyhow::Result<bool> {
    let report = orchestrator.up(service, rebuild).await?;

    for batch in &report.services {
        for result in &batch.results {
            match &result.outcome {
                LaunchOutcome::Started { id } => {
                    println!("Started {} ({})", result.instance, &id[..id.len().min(12)]);
                }
                LaunchOutcome::Failed { reason } => {
                    eprintln!("Error starting {}: {}", result.instance, reason);
                }
            }
        }
    }

    for lb in &report.load_balancers {
        match lb.state {
            LbState::Active => println!("Load balancer {} is active", lb.name),
            _ => eprintln!(
                "Load balancer {} failed: {}",
                lb.name,
                lb.detail.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    Ok(report.all_succeeded())
}

async fn run_down(orchestrator: &Orchestrator, service: Option<&str>) -> anyhow::Result<bool> {
    let report = orchestrator.down(service).await?;

    for lb in &report.load_balancers {
        match &lb.outcome {
            RemoveOutcome::Removed {
                container_found: true,
                ..
            } => println!("Removed load balancer {}", lb.name),
            RemoveOutcome::Removed {
                container_found: false,
                ..
            } => println!("Load balancer {} not found", lb.name),
            RemoveOutcome::Failed { reason } => {
                eprintln!("Error removing load balancer {}: {}", lb.name, reason);
            }
        }
    }

    for batch in &report.services {
        for result in &batch.results {
            match &result.outcome {
                StopOutcome::Stopped => println!("Stopped {}", result.instance),
                StopOutcome::NotFound => println!("Container {} not found", result.instance),
                StopOutcome::Failed { reason } => {
                    eprintln!("Error stopping {}: {}", result.instance, reason);
                }
            }
        }
    }

    Ok(report.all_succeeded())
}

async fn run_ps(orchestrator: &Orchestrator) -> anyhow::Result<bool> {
    let inventory = orchestrator.ps().await?;

    if inventory.is_empty() {
        println!("No running containers");
        return Ok(true);
    }

    if !inventory.services.is_empty() {
        println!("\nSERVICES:");
        println!("SERVICE\t\tSCALE\tCONTAINER ID\tNAME\t\tSTATUS\t\tPORTS");
        for (service, containers) in &inventory.services {
            let scale = containers.len();
            for container in containers {
                println!(
                    "{}\t\t{}\t{}\t{}\t{}\t{}",
                    service,
                    scale,
                    container.short_id,
                    container.name,
                    container.status,
                    format_ports(&container.ports),
                );
            }
        }
    }

    if !inventory.load_balancers.is_empty() {
        println!("\nLOAD BALANCERS:");
        println!("NAME\t\tCONTAINER ID\tSTATUS\t\tPORTS");
        for container in &inventory.load_balancers {
            println!(
                "{}\t\t{}\t{}\t{}",
                container.name,
                container.short_id,
                container.status,
                format_ports(&container.ports),
            );
        }
    }

    Ok(true)
}
