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

use std::sync::{Arc, Mutex};

use log::trace;
use tokio::sync::broadcast;

use crate::definitions::ContextMessage;

/// Receives every message the arbiter fans out, forwarded or synthetic.
pub trait MessageSubscriber: Send + Sync {
    fn on_message(&self, message: &ContextMessage);
}

/// Ordered, synchronous fan-out to all subscribers. Subscriptions cannot be
/// cancelled.
#[derive(Default)]
pub struct ListenerManager {
    subscribers: Mutex<Vec<Arc<dyn MessageSubscriber>>>,
}

impl ListenerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn MessageSubscriber>) {
        self.lock().push(subscriber);
    }

    /// Delivers `message` to every subscriber in registration order.
    pub fn publish(&self, message: &ContextMessage) {
        // Snapshot so a subscriber may subscribe others while being called.
        let subscribers = self.lock().clone();
        trace!("Publishing {} to {} subscribers", message.name, subscribers.len());
        for subscriber in subscribers {
            subscriber.on_message(message);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn MessageSubscriber>>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Bridges the synchronous fan-out into a tokio broadcast channel.
pub struct BroadcastSubscriber {
    sender: broadcast::Sender<ContextMessage>,
}

impl BroadcastSubscriber {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextMessage> {
        self.sender.subscribe()
    }
}

impl MessageSubscriber for BroadcastSubscriber {
    fn on_message(&self, message: &ContextMessage) {
        // No receivers is fine; the message is simply not observed.
        let _ = self.sender.send(message.clone());
    }
}
