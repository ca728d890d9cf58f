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

//! Client side of the remote-control relay.
//!
//! Keeps a WebSocket open to the relay process, routes relay commands to the
//! active context and streams every arbiter message back as JSON frames.

use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::arbiter::TabArbiter;
use crate::definitions::{Command, ContextMessage, OutboundMessage, TransportCommand};
use crate::errors::RelayError;
use crate::page_action::{relay_icon, BROWSER_ACTION_TITLE};
use crate::platform::TabPlatform;
use crate::service::{spawn_service, ServiceHandle, StopHandle};

/// `sender` tag the in-page adapter accepts commands from.
pub const RELAY_SENDER: &str = "vkpc-proxy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub address: String,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address: "ws://127.0.0.1:56130/".to_string(),
            reconnect_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// A relay text frame split into command and optional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    pub command: String,
    pub argument: Option<String>,
}

impl RelayCommand {
    /// Command for the active context.
    pub fn into_command(self) -> Command {
        let mut message = OutboundMessage::new(self.command);
        if let Some(argument) = self.argument {
            message = message.with_argument(Value::String(argument));
        }
        Command::active(message)
    }
}

/// Splits `"<command> <argument>"` at the first space.
pub fn parse_relay_command(text: &str) -> RelayCommand {
    match text.split_once(' ') {
        Some((command, argument)) => RelayCommand {
            command: command.to_string(),
            argument: Some(argument.to_string()),
        },
        None => RelayCommand { command: text.to_string(), argument: None },
    }
}

#[derive(Serialize)]
struct RelayFrame<'a> {
    command: &'a str,
    argument: &'a Value,
}

/// Encodes an arbiter message as `{"command": name, "argument": value}`.
pub fn encode_relay_frame(message: &ContextMessage) -> Result<String, RelayError> {
    let frame = RelayFrame { command: &message.name, argument: &message.value };
    Ok(serde_json::to_string(&frame)?)
}

fn next_delay(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// Requests an immediate reconnect of a running relay client.
#[derive(Clone)]
pub struct RelayHandle {
    reconnect: Arc<Notify>,
}

impl RelayHandle {
    /// Drops the current relay connection (if any) and dials again right away.
    /// A request made while a connection is being dialed is served by that
    /// connection.
    pub fn reconnect(&self) {
        self.reconnect.notify_one();
    }
}

enum SessionEnd {
    Stopped,
    ReconnectRequested,
    Closed,
}

/// Spawns the relay client.
pub fn run_relay(
    config: RelayConfig,
    arbiter: Arc<TabArbiter>,
    platform: Arc<dyn TabPlatform>,
    mut messages: broadcast::Receiver<ContextMessage>,
) -> (ServiceHandle, RelayHandle) {
    let reconnect = Arc::new(Notify::new());
    let handle = RelayHandle { reconnect: reconnect.clone() };

    let service = spawn_service(move |mut stop| async move {
        let mut delay = config.reconnect_delay;
        platform.set_browser_action(BROWSER_ACTION_TITLE, &relay_icon(false));
        loop {
            info!("Connecting to relay at {}", config.address);
            let connected = select! {
                biased;
                _ = stop.signaled() => return,
                res = tokio_tungstenite::connect_async(config.address.as_str()) => res,
            };

            match connected {
                Ok((ws, _response)) => {
                    info!("Relay connected");
                    // A reconnect requested while dialing is satisfied by this connection.
                    let _ = reconnect.notified().now_or_never();
                    delay = config.reconnect_delay;
                    platform.set_browser_action(BROWSER_ACTION_TITLE, &relay_icon(true));
                    // Anything queued while disconnected is stale.
                    messages = messages.resubscribe();
                    arbiter.send_message(Command::active(
                        OutboundMessage::from(TransportCommand::Reconnect).with_sender(RELAY_SENDER),
                    ));

                    let end = run_session(ws, &arbiter, &mut messages, &mut stop, &reconnect).await;
                    platform.set_browser_action(BROWSER_ACTION_TITLE, &relay_icon(false));
                    match end {
                        Ok(SessionEnd::Stopped) => return,
                        Ok(SessionEnd::ReconnectRequested) => {
                            info!("Relay reconnect requested");
                            continue;
                        }
                        Ok(SessionEnd::Closed) => info!("Relay closed the connection"),
                        Err(e) => warn!("Relay session ended with error: {}", e),
                    }
                }
                Err(e) => warn!("Relay connection to {} failed: {}", config.address, e),
            }

            debug!("Retrying relay in {:?}", delay);
            select! {
                biased;
                _ = stop.signaled() => return,
                _ = reconnect.notified() => delay = config.reconnect_delay,
                _ = tokio::time::sleep(delay) => delay = next_delay(delay, config.max_reconnect_delay),
            }
        }
    });

    (service, handle)
}

async fn run_session<S>(
    ws: WebSocketStream<S>,
    arbiter: &TabArbiter,
    messages: &mut broadcast::Receiver<ContextMessage>,
    stop: &mut StopHandle,
    reconnect: &Notify,
) -> Result<SessionEnd, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    loop {
        select! {
            biased;
            _ = stop.signaled() => {
                let _ = sink.close().await;
                return Ok(SessionEnd::Stopped);
            }
            _ = reconnect.notified() => {
                let _ = sink.close().await;
                return Ok(SessionEnd::ReconnectRequested);
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let command = parse_relay_command(text.as_str());
                    debug!("Relay command: {:?}", command);
                    arbiter.send_message(command.into_command());
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            received = messages.recv() => match received {
                Ok(message) => {
                    let frame = encode_relay_frame(&message)?;
                    sink.send(Message::Text(frame.into())).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Relay lagged behind by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Arbiter message feed closed; stopping relay");
                    let _ = sink.close().await;
                    return Ok(SessionEnd::Stopped);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::{sleep, timeout};

    use crate::channel::MpscContextChannel;
    use crate::definitions::ContextId;
    use crate::listener::BroadcastSubscriber;
    use crate::page_action::{IconSet, PageActionUpdate};
    use crate::preferences::MemoryPreferences;

    #[derive(Default)]
    struct RecordingPlatform {
        alive: Mutex<HashSet<ContextId>>,
        browser_icons: Mutex<Vec<IconSet>>,
    }

    #[async_trait]
    impl TabPlatform for RecordingPlatform {
        async fn exists(&self, id: ContextId) -> bool {
            self.alive.lock().unwrap().contains(&id)
        }
        fn show_page_action(&self, _id: ContextId) {}
        fn set_page_action(&self, _update: &PageActionUpdate) {}
        fn set_browser_action(&self, title: &str, icon: &IconSet) {
            assert_eq!(title, BROWSER_ACTION_TITLE);
            self.browser_icons.lock().unwrap().push(icon.clone());
        }
    }

    async fn short_wait() {
        sleep(Duration::from_millis(50)).await
    }

    struct Setup {
        arbiter: Arc<TabArbiter>,
        platform: Arc<RecordingPlatform>,
        bridge: Arc<BroadcastSubscriber>,
        context_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    }

    async fn setup() -> Setup {
        let platform = Arc::new(RecordingPlatform::default());
        let arbiter = Arc::new(TabArbiter::new(platform.clone(), Arc::new(MemoryPreferences::default())));
        let bridge = Arc::new(BroadcastSubscriber::new(32));
        arbiter.subscribe(bridge.clone());

        let id = ContextId(1);
        platform.alive.lock().unwrap().insert(id);
        let (channel, mut context_rx) = MpscContextChannel::new(id);
        arbiter.connect(id, Arc::new(channel)).await;
        assert_eq!(context_rx.try_recv().unwrap().command, "reload");
        Setup { arbiter, platform, bridge, context_rx }
    }

    fn test_config(address: String) -> RelayConfig {
        RelayConfig {
            address,
            reconnect_delay: Duration::from_millis(20),
            max_reconnect_delay: Duration::from_millis(100),
        }
    }

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("ws://{}/", listener.local_addr().unwrap());
        (listener, address)
    }

    #[test]
    fn parse_splits_at_first_space() {
        assert_eq!(
            parse_relay_command("seek -5000"),
            RelayCommand { command: "seek".into(), argument: Some("-5000".into()) }
        );
        assert_eq!(
            parse_relay_command("say hello world"),
            RelayCommand { command: "say".into(), argument: Some("hello world".into()) }
        );
        assert_eq!(parse_relay_command("next"), RelayCommand { command: "next".into(), argument: None });
    }

    #[test]
    fn relay_command_targets_active_context() {
        let command = parse_relay_command("set-position 1000").into_command();
        assert_eq!(command.target, crate::definitions::CommandTarget::Active);
        assert_eq!(command.message.command, "set-position");
        assert_eq!(command.message.argument, Some(json!("1000")));
    }

    #[test]
    fn frames_carry_name_and_value() {
        let frame = encode_relay_frame(&ContextMessage::playback_status(crate::definitions::PlaybackStatus::Paused)).unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed, json!({"command": "playbackStatus", "argument": "paused"}));

        let frame = encode_relay_frame(&ContextMessage::new("ping", Value::Null)).unwrap();
        assert_eq!(frame, r#"{"command":"ping","argument":null}"#);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let max = Duration::from_secs(4);
        assert_eq!(next_delay(Duration::from_secs(1), max), Duration::from_secs(2));
        assert_eq!(next_delay(Duration::from_secs(3), max), max);
    }

    #[tokio::test]
    async fn relay_routes_commands_and_streams_messages() {
        let mut s = setup().await;
        let (listener, address) = bind().await;
        let (service, _handle) = run_relay(
            test_config(address),
            s.arbiter.clone(),
            s.platform.clone(),
            s.bridge.subscribe(),
        );

        let (stream, _) = timeout(Duration::from_secs(2), listener.accept()).await.unwrap().unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        short_wait().await;

        let reconnect = s.context_rx.try_recv().unwrap();
        assert_eq!(reconnect.command, "reconnect");
        assert_eq!(reconnect.sender.as_deref(), Some(RELAY_SENDER));
        {
            let icons = s.platform.browser_icons.lock().unwrap();
            assert_eq!(icons.first(), Some(&relay_icon(false)));
            assert_eq!(icons.last(), Some(&relay_icon(true)));
        }

        ws.send(Message::Text("seek 5000".into())).await.unwrap();
        short_wait().await;
        let seek = s.context_rx.try_recv().unwrap();
        assert_eq!(seek.command, "seek");
        assert_eq!(seek.argument, Some(json!("5000")));

        s.arbiter.on_incoming_message(ContextId(1), ContextMessage::current_time(42)).await;
        let frame = timeout(Duration::from_secs(2), ws.next()).await.unwrap().unwrap().unwrap();
        let parsed: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(parsed, json!({"command": "currentTime", "argument": 42}));

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn relay_reconnects_after_close_and_on_request() {
        let s = setup().await;
        let (listener, address) = bind().await;
        let (service, handle) = run_relay(
            test_config(address),
            s.arbiter.clone(),
            s.platform.clone(),
            s.bridge.subscribe(),
        );

        let (stream, _) = timeout(Duration::from_secs(2), listener.accept()).await.unwrap().unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        let (stream, _) = timeout(Duration::from_secs(2), listener.accept()).await.unwrap().unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        short_wait().await;

        handle.reconnect();
        // The old connection is closed by the client...
        let closed = timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(closed.is_ok());
        // ...and a new one is dialed.
        let accepted = timeout(Duration::from_secs(2), listener.accept()).await;
        assert!(accepted.is_ok());

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn reconnect_requested_while_dialing_does_not_drop_new_session() {
        let s = setup().await;
        let (listener, address) = bind().await;
        let (service, handle) = run_relay(
            test_config(address),
            s.arbiter.clone(),
            s.platform.clone(),
            s.bridge.subscribe(),
        );
        handle.reconnect();

        let (stream, _) = timeout(Duration::from_secs(2), listener.accept()).await.unwrap().unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let redial = timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(redial.is_err(), "relay dialed again after the pending request was served");

        service.shutdown().await.unwrap();
    }
}
