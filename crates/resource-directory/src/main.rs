// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource Directory server binary.

use clap::Parser;
use resource_directory::{
    run_expiry_sweeper, HeapPayloadFactory, InMemoryResourceStore, RdConfig, ResourceDirectory,
    TcpTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Resource Directory - aggregation endpoint for published device resources
#[derive(Parser, Debug)]
#[command(name = "resource-directory")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "5683")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Selection bias advertised to discovering clients (0-100)
    #[arg(long, default_value = "100")]
    bias: u8,

    /// Uri of the directory resource
    #[arg(long, default_value = "/oic/rd")]
    uri: String,

    /// Default lifetime of published links in seconds
    #[arg(long, default_value = "86400")]
    ttl: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = if let Some(config_path) = args.config {
        info!("Loading config from {:?}", config_path);
        RdConfig::from_file(&config_path)?
    } else {
        RdConfig {
            bind_address: args.bind.parse()?,
            port: args.port,
            rd_uri: args.uri,
            discovery_bias: args.bias,
            default_ttl_secs: args.ttl,
            ..Default::default()
        }
    };
    config.validate()?;

    info!("+----------------------------------------------------+");
    info!(
        "|       Resource Directory v{}                   |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bind:   {:40} |", config.socket_addr());
    info!("|  Uri:    {:40} |", config.rd_uri);
    info!("|  Bias:   {:40} |", config.discovery_bias);
    info!("|  TTL:    {:40} |", format!("{}s", config.default_ttl_secs));
    info!("+----------------------------------------------------+");

    let transport = Arc::new(TcpTransport::new(
        config.transport_config(),
        tokio::runtime::Handle::current(),
    ));
    let factory = Arc::new(HeapPayloadFactory::new(config.max_outstanding_payloads));
    let store = Arc::new(InMemoryResourceStore::new(config.default_ttl()));

    let rd = ResourceDirectory::new(&config, transport, factory, store.clone());
    rd.start()?;

    let shutdown = Arc::new(Notify::new());
    let sweeper = tokio::spawn(run_expiry_sweeper(
        store,
        config.expiry_check_interval(),
        shutdown.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping Resource Directory...");

    shutdown.notify_one();
    sweeper.await?;
    rd.stop()?;

    info!("Resource Directory stopped");
    Ok(())
}
