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

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;
use tab_arbiter_core::listener::BroadcastSubscriber;
use tab_arbiter_core::{
    context_event_channel, run_arbiter, run_relay, FilePreferences, MemoryPreferences, MultiServiceHandle,
    PreferenceStore, RelayHandle, TabArbiter,
};
use tab_arbiter_service::cli::Cli;
use tab_arbiter_service::{run_context_server, LiveContexts, NativePlatform, ServiceConfig};
use tokio::net::TcpListener;

const RELAY_FEED_CAPACITY: usize = 256;

#[cfg(unix)]
async fn wait_for_shutdown(relay: RelayHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => return res.context("Failed to listen for Ctrl+C signal"),
            _ = hangup.recv() => {
                info!("SIGHUP received, reconnecting relay");
                relay.reconnect();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_relay: RelayHandle) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C signal")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level.to_level_filter())
        .parse_default_env()
        .init();

    let config = ServiceConfig::load(cli.config.as_deref()).await?;

    let preferences: Arc<dyn PreferenceStore> = match &config.preferences_file {
        Some(path) => {
            info!("Reading preferences from {}", path.display());
            Arc::new(FilePreferences::new(path.clone()))
        }
        None => Arc::new(MemoryPreferences::default()),
    };

    let live = LiveContexts::default();
    let platform = Arc::new(NativePlatform::new(live.clone()));
    let arbiter = Arc::new(TabArbiter::new(platform.clone(), preferences));
    let relay_feed = Arc::new(BroadcastSubscriber::new(RELAY_FEED_CAPACITY));
    arbiter.subscribe(relay_feed.clone());

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind context server to {}", config.listen))?;

    let (events_tx, events_rx) = context_event_channel();
    let mut services = MultiServiceHandle::new();
    services.add(run_context_server(listener, events_tx, live));
    services.add(run_arbiter(arbiter.clone(), events_rx));
    let (relay, relay_handle) = run_relay(config.relay.to_relay_config(), arbiter, platform, relay_feed.subscribe());
    services.add(relay);

    info!("Tab arbiter running, press Ctrl+C to exit");
    wait_for_shutdown(relay_handle).await?;

    info!("Exiting...");
    services.shutdown().await?;
    Ok(())
}
