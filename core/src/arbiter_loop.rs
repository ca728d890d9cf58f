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

use std::fmt;
use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{debug, info};
use tokio::select;
use tokio::sync::mpsc;

use crate::arbiter::TabArbiter;
use crate::channel::ContextChannel;
use crate::definitions::{ContextId, ContextMessage, Selection};
use crate::service::{spawn_service, ServiceHandle};

/// Events delivered by the context transport (and by user actions) to the arbiter loop.
pub enum ContextEvent {
    Connected { id: ContextId, channel: Arc<dyn ContextChannel> },
    Message { id: ContextId, message: ContextMessage },
    Disconnected { id: ContextId },
    /// Explicit selection request, e.g. from a user picking a tab.
    Select(Selection),
}

impl fmt::Debug for ContextEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextEvent::Connected { id, .. } => write!(f, "Connected({})", id),
            ContextEvent::Message { id, message } => write!(f, "Message({}, {})", id, message.name),
            ContextEvent::Disconnected { id } => write!(f, "Disconnected({})", id),
            ContextEvent::Select(selection) => write!(f, "Select({:?})", selection),
        }
    }
}

pub type ContextEventSender = mpsc::UnboundedSender<ContextEvent>;
pub type ContextEventReceiver = mpsc::UnboundedReceiver<ContextEvent>;

pub fn context_event_channel() -> (ContextEventSender, ContextEventReceiver) {
    mpsc::unbounded_channel()
}

async fn dispatch(arbiter: Arc<TabArbiter>, event: ContextEvent) {
    debug!("Dispatching {:?}", event);
    match event {
        ContextEvent::Connected { id, channel } => arbiter.connect(id, channel).await,
        ContextEvent::Message { id, message } => arbiter.on_incoming_message(id, message).await,
        ContextEvent::Disconnected { id } => arbiter.disconnect(id).await,
        ContextEvent::Select(selection) => arbiter.select(selection).await,
    }
}

/// Runs the arbiter event loop on a background task.
///
/// Events are handled in delivery order. A handler waiting on a preference
/// lookup or an existence probe stays in flight while later events are handled,
/// so a lookup that never resolves stalls only its own switch.
pub fn run_arbiter(arbiter: Arc<TabArbiter>, mut events: ContextEventReceiver) -> ServiceHandle {
    spawn_service(move |mut stop| async move {
        let mut in_flight = FuturesUnordered::new();
        loop {
            select! {
                biased;
                _ = stop.signaled() => {
                    info!("Arbiter shutdown requested");
                    return;
                }
                Some(()) = in_flight.next(), if !in_flight.is_empty() => {}
                event = events.recv() => match event {
                    Some(event) => in_flight.push(dispatch(arbiter.clone(), event)),
                    None => {
                        info!("Context event channel closed; stopping arbiter");
                        break;
                    }
                }
            }
        }
        while in_flight.next().await.is_some() {}
    })
}
