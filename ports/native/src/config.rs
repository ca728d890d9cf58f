// Copyright 2025 HEM Sp. z o.o.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::info;
use serde::Deserialize;
use tab_arbiter_core::RelayConfig;

/// Overrides `relay.address` when set to a non-empty value.
pub const RELAY_URL_ENV: &str = "TAB_ARBITER_RELAY_URL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    pub address: String,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        let defaults = RelayConfig::default();
        Self {
            address: defaults.address,
            reconnect_delay_ms: defaults.reconnect_delay.as_millis() as u64,
            max_reconnect_delay_ms: defaults.max_reconnect_delay.as_millis() as u64,
        }
    }
}

impl RelaySection {
    pub fn to_relay_config(&self) -> RelayConfig {
        let reconnect_delay = Duration::from_millis(self.reconnect_delay_ms);
        RelayConfig {
            address: self.address.clone(),
            reconnect_delay,
            max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms).max(reconnect_delay),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub relay: RelaySection,
    pub preferences_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 56131)),
            relay: RelaySection::default(),
            preferences_file: None,
        }
    }
}

impl ServiceConfig {
    /// Reads the config file if one is given, then applies the environment override.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_relay_override(std::env::var(RELAY_URL_ENV).ok());
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn apply_relay_override(&mut self, value: Option<String>) {
        if let Some(address) = value {
            if !address.trim().is_empty() {
                info!("Relay address overridden by {}: {}", RELAY_URL_ENV, address);
                self.relay.address = address;
            }
        }
    }
}
