//! # Fleet Dispatch CLI
//!
//! Binary entry point: one-shot fleet commands printing JSON, or `serve` to
//! seed the store and run the battery audit until shutdown.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleet_dispatch::{Config, DispatchError, DispatchResult, FleetContext};
use fleet_domain::{DroneModel, DroneRegistration, DroneState};

#[derive(Parser, Debug)]
#[command(name = "fleet-dispatch", version)]
#[command(about = "Drone dispatch fleet registry")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed the store if needed and run the battery audit until Ctrl+C
    Serve,

    /// Write the fixtures once
    Populate,

    /// List drones, fullest battery first
    Drones {
        /// Only drones in this state
        #[arg(long)]
        state: Option<DroneState>,
    },

    /// Show one drone
    Drone { serial_number: String },

    /// Register or replace a drone
    Register {
        serial_number: String,
        model: DroneModel,
        battery_capacity: f64,
        #[arg(default_value = "IDLE")]
        state: DroneState,
    },

    /// List the medication catalog, heaviest first
    Medications,

    /// Show the medication codes loaded onto a drone
    Manifest { serial_number: String },

    /// Replace the manifest of a drone; no codes clears it
    Load {
        serial_number: String,
        codes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration (reads .env first)
    let config = Config::from_env()?;

    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    info!(version = fleet_dispatch::VERSION, "Starting fleet dispatch");

    let ctx = FleetContext::open(config)?;

    match cli.command {
        Command::Serve => {
            serve(ctx).await?;
            Ok(ExitCode::SUCCESS)
        }
        command => Ok(report(run(&ctx, command))),
    }
}

fn run(ctx: &FleetContext, command: Command) -> DispatchResult<Value> {
    let service = &ctx.service;
    match command {
        Command::Serve => Err(DispatchError::InvalidInput(
            "serve is not a one-shot command".to_string(),
        )),
        Command::Populate => {
            service.populate_db()?;
            Ok(json!({ "populated": true }))
        }
        Command::Drones { state } => to_value(&service.list_drones(&state.into())?),
        Command::Drone { serial_number } => to_value(&service.get_drone(&serial_number)?),
        Command::Register {
            serial_number,
            model,
            battery_capacity,
            state,
        } => to_value(&service.register_drone(DroneRegistration {
            serial_number,
            model,
            battery_capacity,
            state,
        })?),
        Command::Medications => to_value(&service.list_medications()?),
        Command::Manifest { serial_number } => {
            to_value(&service.list_loaded_medications(&serial_number)?)
        }
        Command::Load {
            serial_number,
            codes,
        } => to_value(&service.load_medications(&serial_number, &codes)?),
    }
}

fn to_value<T: Serialize>(value: &T) -> DispatchResult<Value> {
    serde_json::to_value(value).map_err(|e| DispatchError::InvalidInput(e.to_string()))
}

fn report(result: DispatchResult<Value>) -> ExitCode {
    match result {
        Ok(value) => {
            println!("{value:#}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(code = err.error_code(), error = %err, "Command failed");
            match serde_json::to_string_pretty(&err.problem()) {
                Ok(problem) => eprintln!("{problem}"),
                Err(_) => eprintln!("{err}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn serve(ctx: FleetContext) -> anyhow::Result<()> {
    let seeded = tokio::task::spawn_blocking({
        let ctx = ctx.clone();
        move || ctx.bootstrap()
    })
    .await??;
    info!(
        seeded,
        populated = ctx.service.is_populated(),
        "Store ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let audit = ctx.config.audit_enabled.then(|| {
        tokio::spawn(
            ctx.auditor()
                .run(ctx.config.audit_interval, shutdown_rx),
        )
    });

    shutdown_signal().await;
    shutdown_tx.send(true).ok();

    if let Some(handle) = audit {
        handle.await?;
    }

    info!("Fleet dispatch shut down gracefully");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
