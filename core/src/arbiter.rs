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

//! Single-active-source arbitration between connected media contexts.
//!
//! All state mutation funnels through [`TabArbiter::connect`],
//! [`TabArbiter::on_incoming_message`], [`TabArbiter::disconnect`] and
//! [`TabArbiter::select`]. The state lock is never held across an await, so
//! handlers for other contexts may interleave while a preference lookup or an
//! existence probe is pending.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};

use crate::channel::ContextChannel;
use crate::definitions::{
    Command, CommandTarget, ContextId, ContextMessage, PlaybackStatus, Selection, TransportCommand,
};
use crate::listener::{ListenerManager, MessageSubscriber};
use crate::page_action::{page_action_update, MessageCatalog};
use crate::platform::TabPlatform;
use crate::preferences::{PreferenceKey, PreferenceStore};

struct RegisteredContext {
    channel: Arc<dyn ContextChannel>,
    last_playback_status: Option<PlaybackStatus>,
    was_playing_before_auto_change: bool,
}

impl RegisteredContext {
    fn new(channel: Arc<dyn ContextChannel>) -> Self {
        Self { channel, last_playback_status: None, was_playing_before_auto_change: false }
    }
}

/// A context that just became active, with the resume flag it carried.
struct Activation {
    id: ContextId,
    was_playing_before_auto_change: bool,
}

#[derive(Default)]
struct ArbiterState {
    contexts: HashMap<ContextId, RegisteredContext>,
    active: Option<ContextId>,
    // oldest first
    history: Vec<ContextId>,
}

impl ArbiterState {
    fn is_current(&self, candidate: Selection) -> bool {
        match candidate {
            Selection::None => self.active.is_none(),
            Selection::Context(id) => self.active == Some(id),
            Selection::Last => false,
        }
    }

    fn resolve(&mut self, candidate: Selection) -> Option<ContextId> {
        match candidate {
            Selection::None => None,
            Selection::Last => self.history.pop(),
            Selection::Context(id) => Some(id),
        }
    }
}

pub struct TabArbiter {
    platform: Arc<dyn TabPlatform>,
    preferences: Arc<dyn PreferenceStore>,
    catalog: MessageCatalog,
    listeners: ListenerManager,
    state: Mutex<ArbiterState>,
}

impl TabArbiter {
    pub fn new(platform: Arc<dyn TabPlatform>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self::with_catalog(platform, preferences, MessageCatalog::default())
    }

    pub fn with_catalog(
        platform: Arc<dyn TabPlatform>,
        preferences: Arc<dyn PreferenceStore>,
        catalog: MessageCatalog,
    ) -> Self {
        Self {
            platform,
            preferences,
            catalog,
            listeners: ListenerManager::new(),
            state: Mutex::new(ArbiterState::default()),
        }
    }

    /// Adds a subscriber for every forwarded and synthetic message.
    pub fn subscribe(&self, subscriber: Arc<dyn MessageSubscriber>) {
        self.listeners.subscribe(subscriber);
    }

    pub fn active(&self) -> Option<ContextId> {
        self.state().active
    }

    /// Previously active contexts, oldest first.
    pub fn history(&self) -> Vec<ContextId> {
        self.state().history.clone()
    }

    pub fn is_connected(&self, id: ContextId) -> bool {
        self.state().contexts.contains_key(&id)
    }

    pub fn connected(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.state().contexts.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn last_playback_status(&self, id: ContextId) -> Option<PlaybackStatus> {
        self.state().contexts.get(&id).and_then(|c| c.last_playback_status)
    }

    pub fn was_playing_before_auto_change(&self, id: ContextId) -> bool {
        self.state()
            .contexts
            .get(&id)
            .map(|c| c.was_playing_before_auto_change)
            .unwrap_or(false)
    }

    /// Registers a context. A context already registered under the same id is
    /// replaced. Message and disconnect routing is done by the caller, which
    /// feeds them to [`Self::on_incoming_message`] and [`Self::disconnect`].
    pub async fn connect(&self, id: ContextId, channel: Arc<dyn ContextChannel>) {
        let replaced = self.state().contexts.insert(id, RegisteredContext::new(channel)).is_some();
        if replaced {
            debug!("Context {} registered again, replacing previous channel", id);
        }
        info!("Context {} connected", id);
        self.platform.show_page_action(id);

        let choose_on_empty = self.preferences.get_bool(PreferenceKey::ChooseOnEmpty).await;
        if choose_on_empty && self.active().is_none() {
            self.select(Selection::Context(id)).await;
        }
    }

    /// Forwards `message` to subscribers and folds playback-status reports into
    /// the arbiter state. A background context that starts playing takes the
    /// selection.
    pub async fn on_incoming_message(&self, id: ContextId, message: ContextMessage) {
        self.listeners.publish(&message);

        if !message.is_playback_status() {
            return;
        }
        let Some(status) = PlaybackStatus::from_value(&message.value) else {
            warn!("Context {} reported unknown playback status {}", id, message.value);
            return;
        };

        let (is_active, registered) = {
            let mut state = self.state();
            let is_active = state.active == Some(id);
            let registered = match state.contexts.get_mut(&id) {
                Some(context) => {
                    context.last_playback_status = Some(status);
                    true
                }
                None => false,
            };
            (is_active, registered)
        };

        // The active context shows through the default icon; both cases target `id`.
        self.set_playback_status_icon(status, id);

        if !is_active && registered && status == PlaybackStatus::Playing {
            debug!("Context {} started playing in background, switching to it", id);
            self.select(Selection::Context(id)).await;
        }
    }

    /// Drops a context. When it was active, the selection moves to the previous
    /// context or to NONE depending on preferences, and the newly selected
    /// context is resumed if it was playing when it lost the selection.
    pub async fn disconnect(&self, id: ContextId) {
        let was_active = {
            let mut state = self.state();
            state.contexts.remove(&id);
            state.history.retain(|prev| *prev != id);
            state.active == Some(id)
        };
        info!("Context {} disconnected{}", id, if was_active { " while active" } else { "" });
        if !was_active {
            return;
        }

        let return_to_last = self.preferences.get_bool(PreferenceKey::ReturnToLastOnClose).await;
        let candidate = if return_to_last { Selection::Last } else { Selection::None };
        let Some(Activation { id: next, was_playing_before_auto_change }) = self.switch(candidate).await else {
            return;
        };

        // TODO: gate the resume on this value once the intended semantics of
        // playAfterPauseOnChange are confirmed; today only the captured flag decides.
        let play_after_pause = self.preferences.get_bool(PreferenceKey::PlayAfterPauseOnChange).await;
        if !was_playing_before_auto_change {
            return;
        }
        if self.active() == Some(next) {
            debug!("Resuming context {} (playAfterPauseOnChange = {})", next, play_after_pause);
            self.send_message(Command::to(next, TransportCommand::Play));
        } else {
            debug!("Context {} lost the selection before it could be resumed", next);
        }
    }

    /// The selection choke point.
    ///
    /// The new active id is committed in the same step that reads the outgoing
    /// one, so overlapping switches each demote the context the previous switch
    /// selected. The outgoing context is then probed, paused and marked.
    pub async fn select(&self, candidate: Selection) {
        self.switch(candidate).await;
    }

    async fn switch(&self, candidate: Selection) -> Option<Activation> {
        let (outgoing, resolved, activation) = {
            let mut state = self.state();
            if state.is_current(candidate) {
                return None;
            }
            let outgoing = state.active;
            let mut resolved = state.resolve(candidate);
            if let Some(id) = resolved {
                if !state.contexts.contains_key(&id) {
                    warn!("Context {} is not connected, selecting none instead", id);
                    resolved = None;
                }
            }
            if resolved == outgoing {
                return None;
            }

            // Snapshot taken at displacement time; applied once the probe settles.
            let outgoing = outgoing.and_then(|prev| {
                let context = state.contexts.get(&prev)?;
                let was_playing = context.last_playback_status == Some(PlaybackStatus::Playing);
                Some((prev, was_playing))
            });
            if let Some((prev, _)) = outgoing {
                state.history.push(prev);
            }

            state.active = resolved;
            let activation = resolved.and_then(|id| {
                let context = state.contexts.get_mut(&id)?;
                Some(Activation {
                    id,
                    was_playing_before_auto_change: std::mem::take(&mut context.was_playing_before_auto_change),
                })
            });
            (outgoing, resolved, activation)
        };
        info!("Active context: {:?} -> {:?}", outgoing.map(|(prev, _)| prev), resolved);

        match resolved {
            None => {
                for message in ContextMessage::empty_state() {
                    self.listeners.publish(&message);
                }
            }
            Some(id) => self.send_message(Command::to(id, TransportCommand::Reload)),
        }

        if let Some((prev, was_playing)) = outgoing {
            self.demote(prev, was_playing).await;
        }
        activation
    }

    /// Pauses and marks a context that lost the selection. A context the probe
    /// no longer finds is taken back out of history.
    async fn demote(&self, prev: ContextId, was_playing: bool) {
        if !self.platform.exists(prev).await {
            debug!("Outgoing context {} is gone, skipping pause", prev);
            self.state().history.retain(|id| *id != prev);
            return;
        }

        let pause_on_change = self.preferences.get_bool(PreferenceKey::PauseOnChange).await;
        {
            let mut state = self.state();
            if state.active == Some(prev) {
                debug!("Context {} was selected again, skipping pause", prev);
                return;
            }
            if let Some(context) = state.contexts.get_mut(&prev) {
                context.was_playing_before_auto_change = pause_on_change && was_playing;
            }
        }
        if pause_on_change {
            self.send_message(Command::to(prev, TransportCommand::Pause));
        }
        self.set_playback_status_icon(PlaybackStatus::Disconnected, prev);
    }

    /// Routes a command through the target's channel. Commands for NONE or for
    /// contexts that are not connected are dropped.
    pub fn send_message(&self, command: Command) {
        let channel = {
            let state = self.state();
            let target = match command.target {
                CommandTarget::Active => state.active,
                CommandTarget::Context(id) => Some(id),
            };
            target.and_then(|id| state.contexts.get(&id).map(|c| (id, c.channel.clone())))
        };

        match channel {
            Some((id, channel)) => {
                if let Err(e) = channel.post_message(&command.message) {
                    warn!("Failed to deliver {} to context {}: {}", command.message.command, id, e);
                }
            }
            None => debug!("Dropping {} for {:?}: no connected target", command.message.command, command.target),
        }
    }

    fn set_playback_status_icon(&self, status: PlaybackStatus, target: ContextId) {
        let update = page_action_update(status, target, &self.catalog);
        self.platform.set_page_action(&update);
    }

    fn state(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
