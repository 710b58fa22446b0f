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

//! Tunables consumed by the core. Loading them from disk is the binary's job.

use crate::data_plane::delivery::ReceiverSettleMode;
use crate::data_plane::terminus::TerminusDurability;
use serde::Deserialize;

pub const DEFAULT_RESERVED_EXCHANGE_PREFIX: &str = "amq.";
pub const DEFAULT_MAX_ROUTE_HOPS: usize = 16;
pub const DEFAULT_LINK_CREDIT: u32 = 20_000;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct VirtualHostSettings {
    /// Exchange names under this prefix belong to the system.
    pub reserved_exchange_prefix: String,
    /// Upper bound on exchange-to-exchange hops within one publish.
    pub max_route_hops: usize,
    /// Per-queue depth beyond which a queue stops accepting messages.
    pub queue_capacity: Option<usize>,
}

impl Default for VirtualHostSettings {
    fn default() -> Self {
        Self {
            reserved_exchange_prefix: DEFAULT_RESERVED_EXCHANGE_PREFIX.to_string(),
            max_route_hops: DEFAULT_MAX_ROUTE_HOPS,
            queue_capacity: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct LinkSettings {
    pub highest_supported_durability: TerminusDurability,
    pub default_credit: u32,
    /// Negotiated receiver settle mode; `None` behaves as settle-first.
    pub receiver_settle_mode: Option<ReceiverSettleMode>,
    /// When `false`, a detached link is always destroyed instead of kept for resumption.
    pub resume_supported: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            highest_supported_durability: TerminusDurability::UnsettledState,
            default_credit: DEFAULT_LINK_CREDIT,
            receiver_settle_mode: None,
            resume_supported: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let settings: LinkSettings =
            serde_json::from_str(r#"{ "receiver-settle-mode": "second" }"#).expect("valid json");

        assert_eq!(settings.receiver_settle_mode, Some(ReceiverSettleMode::Second));
        assert_eq!(settings.default_credit, DEFAULT_LINK_CREDIT);
        assert!(!settings.resume_supported);
    }

    #[test]
    fn virtual_host_defaults_reserve_amq_prefix() {
        let settings = VirtualHostSettings::default();
        assert_eq!(settings.reserved_exchange_prefix, "amq.");
        assert_eq!(settings.max_route_hops, DEFAULT_MAX_ROUTE_HOPS);
    }
}
