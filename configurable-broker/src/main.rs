/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod config;
mod topology;

use anyhow::Result;
use broker_core::{
    DestinationEvent, DestinationRegistry, InMemoryMessageStore, TransactionCoordinator,
};
use clap::Parser;
use config::BrokerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "configurable-broker")]
#[command(about = "Runs the broker core with a topology declared in a JSON5 config file")]
struct Cli {
    /// Path to the JSON5 configuration file
    #[arg(short, long, default_value = "DEFAULT_CONFIG.json5")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("broker_core=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = BrokerConfig::load(&cli.config)?;
    info!(config = %cli.config.display(), "starting broker");

    let registry = Arc::new(DestinationRegistry::new(config.virtual_host.clone()));
    let mut topology_events = registry.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = topology_events.recv().await {
            match event {
                DestinationEvent::Created { name, kind, .. } => {
                    debug!(%name, %kind, "destination created")
                }
                DestinationEvent::Deleted { name, kind, .. } => {
                    debug!(%name, %kind, "destination deleted")
                }
            }
        }
    });

    topology::apply_topology(&registry, &config.topology).await?;

    let store = Arc::new(InMemoryMessageStore::with_persistence(config.store.persistent));
    let transactions = TransactionCoordinator::new(store);
    info!(
        destinations = registry.destinations().len(),
        default_credit = config.link.default_credit,
        persistent_store = config.store.persistent,
        active_transactions = transactions.active_transactions(),
        "broker ready; press Ctrl+C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
