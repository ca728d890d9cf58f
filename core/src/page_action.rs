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

//! Pure mapping from a playback status to the page-action title and icon set.

use std::collections::{BTreeMap, HashMap};

use crate::definitions::{ContextId, PlaybackStatus};

const PAGE_ACTION_SIZES: [u32; 1] = [32];
const PAGE_ACTION_DISCONNECT_SIZES: [u32; 1] = [16];
const BROWSER_ACTION_SIZES: [u32; 4] = [16, 32, 64, 128];

/// Title shown on the global browser action, which re-dials the relay when clicked.
pub const BROWSER_ACTION_TITLE: &str = "Reconnect";

/// Icon paths keyed by pixel size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IconSet {
    pub paths: BTreeMap<u32, String>,
}

impl IconSet {
    pub fn new(name: &str, sizes: &[u32], extension: &str) -> Self {
        let paths = sizes
            .iter()
            .map(|size| (*size, format!("icons/{}-{}.{}", name, size, extension)))
            .collect();
        Self { paths }
    }

    pub fn sizes(&self) -> Vec<u32> {
        self.paths.keys().copied().collect()
    }
}

/// Title and icon for one context's page action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageActionUpdate {
    pub target: ContextId,
    pub title: String,
    pub icon: IconSet,
}

/// Localized strings, looked up by message key.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    messages: HashMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let messages = [
            ("status_playing", "Playing"),
            ("status_paused", "Paused"),
            ("status_stopped", "Stopped"),
            ("status_disconnect", "Not selected"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { messages }
    }
}

impl MessageCatalog {
    pub fn from_messages(messages: HashMap<String, String>) -> Self {
        Self { messages }
    }

    /// Falls back to the key itself when no translation exists.
    pub fn message(&self, key: &str) -> String {
        self.messages.get(key).cloned().unwrap_or_else(|| key.to_string())
    }
}

pub fn status_title_key(status: PlaybackStatus) -> String {
    format!("status_{}", status.icon_name())
}

/// Builds the page-action update for `status` on `target`. Disconnected
/// contexts get the small icon, every other status the large one.
pub fn page_action_update(status: PlaybackStatus, target: ContextId, catalog: &MessageCatalog) -> PageActionUpdate {
    let sizes: &[u32] = match status {
        PlaybackStatus::Disconnected => &PAGE_ACTION_DISCONNECT_SIZES,
        _ => &PAGE_ACTION_SIZES,
    };
    PageActionUpdate {
        target,
        title: catalog.message(&status_title_key(status)),
        icon: IconSet::new(status.icon_name(), sizes, "svg"),
    }
}

/// Global icon reflecting the relay link.
pub fn relay_icon(connected: bool) -> IconSet {
    let name = if connected { "playing" } else { "disconnect" };
    IconSet::new(name, &BROWSER_ACTION_SIZES, "png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_uses_small_icon() {
        let catalog = MessageCatalog::default();
        let update = page_action_update(PlaybackStatus::Disconnected, ContextId(4), &catalog);
        assert_eq!(update.target, ContextId(4));
        assert_eq!(update.icon.sizes(), vec![16]);
        assert_eq!(update.icon.paths[&16], "icons/disconnect-16.svg");
        assert_eq!(update.title, "Not selected");
    }

    #[test]
    fn other_statuses_use_large_icon() {
        let catalog = MessageCatalog::default();
        for status in [PlaybackStatus::Playing, PlaybackStatus::Paused, PlaybackStatus::Stopped] {
            let update = page_action_update(status, ContextId(1), &catalog);
            assert_eq!(update.icon.sizes(), vec![32]);
            assert_eq!(update.icon.paths[&32], format!("icons/{}-32.svg", status.as_str()));
        }
    }

    #[test]
    fn missing_translation_falls_back_to_key() {
        let catalog = MessageCatalog::from_messages(HashMap::new());
        let update = page_action_update(PlaybackStatus::Paused, ContextId(1), &catalog);
        assert_eq!(update.title, "status_paused");
    }

    #[test]
    fn relay_icon_sets() {
        assert_eq!(relay_icon(true).paths[&128], "icons/playing-128.png");
        assert_eq!(relay_icon(false).sizes(), vec![16, 32, 64, 128]);
    }
}
