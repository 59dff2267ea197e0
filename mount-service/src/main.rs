// SPDX-License-Identifier: GPL-3.0-only

//! wsl-disk-bridge - mount physical disks into WSL and expose them to Windows

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mount_service::{BridgeConfig, MountRequest, ServiceRegistry, UnmountRequest, logging};
use mount_types::AccessMode;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "wsl-disk-bridge")]
#[command(about = "Mount physical disks into WSL and expose them to Windows")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $WSL_DISK_BRIDGE_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List disks that can be mounted
    Disks,
    /// Mount a partition and expose it to the host
    Mount {
        #[arg(long)]
        disk: u32,
        #[arg(long)]
        partition: u32,
        /// network, drive or none
        #[arg(long, default_value = "network")]
        access: AccessMode,
        #[arg(long)]
        letter: Option<char>,
        #[arg(long, default_value = "ext4")]
        fs_type: String,
        #[arg(long)]
        distro: Option<String>,
        /// Network location name
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove access surfaces and detach a disk
    Unmount {
        #[arg(long)]
        disk: u32,
        #[arg(long)]
        letter: Option<char>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show recorded mounts
    Status,
    /// Prune records whose mount or surface is gone
    Reconcile,
    /// Forget every recorded mount without touching the system
    Clear,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(cli: Cli, registry: ServiceRegistry, cancel: CancellationToken) -> Result<ExitCode> {
    match cli.command {
        Command::Disks => {
            let disks = registry
                .disks()
                .list_candidate_disks()
                .await
                .context("Failed to list disks")?;
            print_json(&disks)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Mount {
            disk,
            partition,
            access,
            letter,
            fs_type,
            distro,
            name,
        } => {
            let request = MountRequest {
                disk_index: disk,
                partition,
                access_mode: access,
                drive_letter: letter,
                fs_type,
                distribution: distro,
                surface_name: name,
            };
            let result = registry.mount().mount_and_map(&request, &cancel).await;
            print_json(&result)?;
            Ok(exit_code(result.success))
        }
        Command::Unmount { disk, letter, name } => {
            let request = UnmountRequest {
                disk_index: disk,
                drive_letter: letter,
                surface_name: name,
            };
            let result = registry.unmount().unmount_and_unmap(&request, &cancel).await;
            print_json(&result)?;
            Ok(exit_code(result.success))
        }
        Command::Status => {
            let mounts = registry.store().list_all().await?;
            print_json(&mounts)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Reconcile => {
            let removed = registry.store().reconcile().await?;
            print_json(&removed)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear => {
            let count = registry.store().clear_all().await?;
            print_json(&serde_json::json!({ "cleared": count }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = BridgeConfig::load(cli.config.as_deref())?;
    logging::init(&config);

    tracing::info!("wsl-disk-bridge v{}", env!("CARGO_PKG_VERSION"));

    let registry = ServiceRegistry::build_default(&config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    run(cli, registry, cancel).await
}
