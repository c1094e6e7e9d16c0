// sesame-os3/sesame/src/main.rs
//
// Copyright (c) 2025 Sesame OS3 Client Team
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE>
// or the MIT license <LICENSE-MIT>, at your option.
// This file may not be copied, modified, or distributed
// except according to those terms.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::BufReader;

use sesame::error::AnyResult;
use sesame::proto::HistoryRead;
use sesame::{config, log, BleLink, Console, GattLink, SesameClient, SesameConfig};

/// Sesame OS3: control a smart lock over Bluetooth LE
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <base>/config/sesame.toml; *.json is read as legacy config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lock Bluetooth address, overrides the config
    #[arg(short, long)]
    address: Option<String>,

    /// Base64 device key, overrides the config
    #[arg(short, long)]
    key: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive console (default)
    Console,
    /// Lock, recording NAME in the lock history
    Lock { name: Option<String> },
    /// Unlock, recording NAME in the lock history
    Unlock { name: Option<String> },
    /// Print the firmware version
    Version,
    /// Read or delete history entries
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Set the auto lock delay in seconds (0 disables it)
    Autolock { seconds: u16 },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Show the oldest entry without removing it
    Peek,
    /// Show and remove the oldest entry
    Pop,
    /// Delete one entry
    Delete { id: u32 },
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let cli = Cli::parse();

    // 1. Configuration, then logging before any other side effect
    let (mut config, warnings) = config::load(cli.config.as_deref()).await?;
    config.apply_overrides(cli.address.clone(), cli.key.clone());
    let _log_guard = log::init(&config)?;
    tracing::info!("Starting up (v{})", env!("CARGO_PKG_VERSION"));
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    config.validate()?;

    // 2. Connect and log in
    let key = config.device_key()?;
    let link = BleLink::connect(&config.device.address, &config.ble_options()).await?;
    tracing::info!("Connected to {}", link.address());
    let client = SesameClient::connect(link, key, config.client_options()).await?;
    tracing::info!("Logged in");

    // 3. Run the command, then always disconnect
    let outcome = run(&cli, &config, &client).await;
    if let Err(e) = client.disconnect().await {
        tracing::warn!("Disconnect failed: {}", e);
    }
    tracing::info!("Shutting down");
    outcome
}

async fn run<L: GattLink>(cli: &Cli, config: &SesameConfig, client: &SesameClient<L>) -> AnyResult<()> {
    let display_name = |name: &Option<String>| {
        name.clone()
            .unwrap_or_else(|| config.client.display_name.clone())
    };

    match cli.command.as_ref().unwrap_or(&Commands::Console) {
        Commands::Console => {
            let mut console = Console::new(
                client,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                &config.client.display_name,
            );
            tokio::select! {
                result = console.run() => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C, shutting down..."),
            }
        }
        Commands::Lock { name } => {
            client.lock(&display_name(name)).await?;
            report(cli.json, "Locked", serde_json::json!({ "locked": true }));
        }
        Commands::Unlock { name } => {
            client.unlock(&display_name(name)).await?;
            report(cli.json, "Unlocked", serde_json::json!({ "locked": false }));
        }
        Commands::Version => {
            let version = client.version().await?;
            report(cli.json, &version, serde_json::json!({ "version": version }));
        }
        Commands::History { action } => match action {
            HistoryAction::Peek | HistoryAction::Pop => {
                let read = match action {
                    HistoryAction::Peek => HistoryRead::Peek,
                    _ => HistoryRead::Pop,
                };
                let record = client.history(read).await?;
                let text = match &record {
                    Some(record) => record.to_string(),
                    None => "History is empty".to_string(),
                };
                report(cli.json, &text, serde_json::to_value(&record)?);
            }
            HistoryAction::Delete { id } => {
                client.delete_history(*id).await?;
                report(
                    cli.json,
                    &format!("History entry {} deleted", id),
                    serde_json::json!({ "deleted": id }),
                );
            }
        },
        Commands::Autolock { seconds } => {
            client.set_autolock_time(*seconds).await?;
            report(
                cli.json,
                &format!("Auto lock set to {}s", seconds),
                serde_json::json!({ "autolock_seconds": seconds }),
            );
        }
    }
    Ok(())
}

fn report(json: bool, text: &str, value: serde_json::Value) {
    if json {
        println!("{}", value);
    } else {
        println!("{}", text);
    }
}
