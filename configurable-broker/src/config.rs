//! On-disk broker configuration.

use anyhow::{Context, Result};
use broker_core::{
    BindingArguments, ExchangeDeclaration, LinkSettings, QueueDeclaration, VirtualHostSettings,
};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub(crate) struct BrokerConfig {
    pub(crate) virtual_host: VirtualHostSettings,
    pub(crate) link: LinkSettings,
    pub(crate) store: StoreConfig,
    pub(crate) topology: TopologyConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub(crate) struct StoreConfig {
    /// Whether the message store reports itself durable. A transient store
    /// rejects persistent messages.
    pub(crate) persistent: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TopologyConfig {
    pub(crate) exchanges: Vec<ExchangeDeclaration>,
    pub(crate) queues: Vec<QueueDeclaration>,
    pub(crate) bindings: Vec<BindingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct BindingConfig {
    pub(crate) exchange: String,
    pub(crate) destination: String,
    #[serde(default)]
    pub(crate) binding_key: String,
    #[serde(default)]
    pub(crate) arguments: BindingArguments,
    #[serde(default)]
    pub(crate) replace_existing: bool,
}

impl BrokerConfig {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub(crate) fn parse(contents: &str) -> Result<Self> {
        Ok(json5::from_str(contents)?)
    }
}
