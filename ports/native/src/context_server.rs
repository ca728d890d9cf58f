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

//! WebSocket transport for media contexts.
//!
//! Every accepted socket is one context. Its text frames are decoded as
//! [`ContextMessage`]s and forwarded to the arbiter loop; commands posted to the
//! context's channel are written back as JSON.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tab_arbiter_core::definitions::{ContextId, ContextMessage};
use tab_arbiter_core::{spawn_service, ContextEvent, ContextEventSender, MpscContextChannel, ServiceHandle};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::platform::LiveContexts;

const TABS_PATH_PREFIX: &str = "/tabs/";

/// Reads the context id from a `/tabs/<id>` request path.
pub fn context_id_from_path(path: &str) -> Option<ContextId> {
    path.strip_prefix(TABS_PATH_PREFIX)?
        .trim_end_matches('/')
        .parse::<i64>()
        .ok()
        .map(ContextId)
}

/// Hands out ids for sockets that did not name one.
struct ContextIds {
    next: AtomicI64,
}

impl ContextIds {
    fn new() -> Self {
        Self { next: AtomicI64::new(1) }
    }

    fn allocate(&self, live: &LiveContexts) -> ContextId {
        loop {
            let id = ContextId(self.next.fetch_add(1, Ordering::Relaxed));
            if !live.contains(id) {
                return id;
            }
        }
    }
}

/// Accepts context sockets on `listener` until shut down.
///
/// Open sockets are dropped together with the server.
pub fn run_context_server(listener: TcpListener, events: ContextEventSender, live: LiveContexts) -> ServiceHandle {
    let ids = Arc::new(ContextIds::new());
    spawn_service(move |mut stop| async move {
        if let Ok(addr) = listener.local_addr() {
            info!("Context server listening on {}", addr);
        }
        let mut connections = JoinSet::new();
        loop {
            select! {
                biased;
                _ = stop.signaled() => break,
                Some(_) = connections.join_next() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_context(stream, peer, events.clone(), live.clone(), ids.clone()));
                    }
                    Err(e) => warn!("Failed to accept context connection: {}", e),
                },
            }
        }
        info!("Context server stopping; closing {} sockets", connections.len());
        connections.shutdown().await;
    })
}

async fn serve_context(
    stream: TcpStream,
    peer: SocketAddr,
    events: ContextEventSender,
    live: LiveContexts,
    ids: Arc<ContextIds>,
) {
    let mut requested = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        requested = context_id_from_path(request.uri().path());
        Ok(response)
    };
    let ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let id = requested.unwrap_or_else(|| ids.allocate(&live));
    let token = live.insert(id);
    info!("Context {} connected from {}", id, peer);

    let (channel, mut outbound) = MpscContextChannel::new(id);
    if events.send(ContextEvent::Connected { id, channel: Arc::new(channel) }).is_err() {
        live.remove(id, token);
        return;
    }

    let (mut sink, mut frames) = ws.split();
    loop {
        select! {
            command = outbound.recv() => match command {
                Some(command) => match serde_json::to_string(&command) {
                    Ok(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                            warn!("Failed to write to context {}: {}", id, e);
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to encode command for context {}: {}", id, e),
                },
                // The arbiter dropped this channel, e.g. a newer socket took over the id.
                None => break,
            },
            frame = frames.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ContextMessage>(text.as_str()) {
                    Ok(message) => {
                        if events.send(ContextEvent::Message { id, message }).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Skipping undecodable frame from context {}: {}", id, e),
                },
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Context {} socket error: {}", id, e);
                    break;
                }
            },
        }
    }

    let _ = sink.close().await;
    // Leave the live table first so a later existence probe for this id fails.
    if live.remove(id, token) {
        info!("Context {} disconnected", id);
        let _ = events.send(ContextEvent::Disconnected { id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tab_arbiter_core::context_event_channel;
    use tab_arbiter_core::definitions::{PlaybackStatus, TransportCommand};
    use tab_arbiter_core::{ContextChannel, ContextEventReceiver};
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;

    async fn start() -> (ServiceHandle, ContextEventReceiver, LiveContexts, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        let (events_tx, events_rx) = context_event_channel();
        let live = LiveContexts::default();
        let server = run_context_server(listener, events_tx, live.clone());
        (server, events_rx, live, base)
    }

    async fn next_event(events: &mut ContextEventReceiver) -> ContextEvent {
        timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap()
    }

    #[test]
    fn tabs_path_carries_id() {
        assert_eq!(context_id_from_path("/tabs/42"), Some(ContextId(42)));
        assert_eq!(context_id_from_path("/tabs/42/"), Some(ContextId(42)));
        assert_eq!(context_id_from_path("/tabs/abc"), None);
        assert_eq!(context_id_from_path("/"), None);
    }

    #[tokio::test]
    async fn socket_lifecycle_produces_events() {
        let (server, mut events, live, base) = start().await;
        let (mut client, _) = connect_async(format!("{}/tabs/7", base)).await.unwrap();

        let channel = match next_event(&mut events).await {
            ContextEvent::Connected { id, channel } => {
                assert_eq!(id, ContextId(7));
                channel
            }
            other => panic!("unexpected event {:?}", other),
        };
        assert!(live.contains(ContextId(7)));

        client
            .send(WsMessage::Text(r#"{"name":"playbackStatus","value":"playing"}"#.into()))
            .await
            .unwrap();
        client.send(WsMessage::Text("not json".into())).await.unwrap();
        client
            .send(WsMessage::Text(r#"{"name":"currentTime","value":1500}"#.into()))
            .await
            .unwrap();
        match next_event(&mut events).await {
            ContextEvent::Message { id, message } => {
                assert_eq!(id, ContextId(7));
                assert_eq!(PlaybackStatus::from_value(&message.value), Some(PlaybackStatus::Playing));
            }
            other => panic!("unexpected event {:?}", other),
        }
        match next_event(&mut events).await {
            ContextEvent::Message { message, .. } => assert_eq!(message.value, json!(1500)),
            other => panic!("unexpected event {:?}", other),
        }

        channel.post_message(&TransportCommand::Pause.into()).unwrap();
        let frame = timeout(Duration::from_secs(2), client.next()).await.unwrap().unwrap().unwrap();
        let parsed: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert_eq!(parsed, json!({"command": "pause"}));

        client.close(None).await.unwrap();
        match next_event(&mut events).await {
            ContextEvent::Disconnected { id } => assert_eq!(id, ContextId(7)),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!live.contains(ContextId(7)));

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unnamed_sockets_get_distinct_ids() {
        let (server, mut events, _live, base) = start().await;
        let (_first, _) = connect_async(format!("{}/", base)).await.unwrap();
        let (_second, _) = connect_async(format!("{}/player", base)).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..2 {
            match next_event(&mut events).await {
                ContextEvent::Connected { id, .. } => ids.push(id),
                other => panic!("unexpected event {:?}", other),
            }
        }
        ids.sort();
        assert_eq!(ids, vec![ContextId(1), ContextId(2)]);

        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn replaced_socket_does_not_disconnect_new_one() {
        let (server, mut events, live, base) = start().await;
        let (_old, _) = connect_async(format!("{}/tabs/3", base)).await.unwrap();
        let old_channel = match next_event(&mut events).await {
            ContextEvent::Connected { channel, .. } => channel,
            other => panic!("unexpected event {:?}", other),
        };
        let (_new, _) = connect_async(format!("{}/tabs/3", base)).await.unwrap();
        let _new_channel = match next_event(&mut events).await {
            ContextEvent::Connected { channel, .. } => channel,
            other => panic!("unexpected event {:?}", other),
        };

        // Dropping the old channel, as the arbiter does on replacement, closes the old socket.
        drop(old_channel);
        let extra = timeout(Duration::from_millis(200), events.recv()).await;
        assert!(extra.is_err(), "old socket must not emit Disconnected");
        assert!(live.contains(ContextId(3)));

        server.shutdown().await.unwrap();
    }
}
