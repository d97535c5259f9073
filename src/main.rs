//! keenetic-vpn - per-device VPN policy manager for Keenetic routers
//!
//! Talks to the router's RCI, merges its active and configured host tables
//! into one device list and switches the VPN policy of individual devices.

mod config;
mod devices;
mod error;
mod http;
mod models;
mod parser;
mod rci;
mod web;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use devices::DeviceService;
use rci::RciClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keenetic-vpn")]
#[command(about = "Per-device VPN policy manager for Keenetic routers", long_about = None)]
struct Args {
    /// Config file path (default: search config.toml locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Print the merged device list
    Devices,
    /// Switch the VPN policy of one device
    Vpn {
        /// Device MAC address, e.g. aa:bb:cc:dd:ee:ff
        mac: String,
        state: Toggle,
    },
    /// Check that the router answers authenticated requests
    Health,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let cfg = config::Config::load(args.config.as_deref())?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level)),
        )
        .init();

    let client = RciClient::new(cfg.router.base_url(), &cfg.router.user, &cfg.router.pass)?;
    tracing::debug!("RCI endpoint: {}", client.base_url());
    let service = DeviceService::new(Arc::new(client), &cfg.vpn.policy);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(
                "Router: {} | User: {} | Policy: {}",
                cfg.router.ip,
                cfg.router.user,
                service.vpn_policy()
            );
            let state = web::AppState {
                devices: service,
                router: Arc::from(cfg.router.ip.as_str()),
            };
            web::serve(state, cfg.port).await
        }
        Command::Devices => print_devices(&service).await,
        Command::Vpn { mac, state } => {
            if !parser::is_valid_mac(&mac) {
                bail!("Invalid MAC address format: {}", mac);
            }
            let result = service
                .set_device_vpn(&mac, matches!(state, Toggle::On))
                .await?;
            println!("success: {}, verified: {}", result.success, result.verified);
            Ok(())
        }
        Command::Health => {
            if service.check_health().await {
                println!("Router {} is reachable", cfg.router.ip);
                Ok(())
            } else {
                bail!("Router {} is unreachable", cfg.router.ip)
            }
        }
    }
}

async fn print_devices(service: &DeviceService) -> Result<()> {
    let devices = service.list_devices().await?;

    for device in &devices {
        println!(
            "{:<17}  {:<24}  {:<15}  {:<7}  {:<10}  {}",
            device.mac,
            device.label(),
            device.ip,
            if device.active { "online" } else { "offline" },
            if device.registered { "registered" } else { "" },
            if device.vpn_enabled { "vpn" } else { "" },
        );
    }
    tracing::info!("{} devices", devices.len());
    Ok(())
}
