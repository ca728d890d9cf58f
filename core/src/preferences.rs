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

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// User preferences consulted by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    /// Select a newly connected context when nothing is active.
    ChooseOnEmpty,
    /// When the active context goes away, return to the previous one instead of NONE.
    ReturnToLastOnClose,
    /// Pause the context that loses the selection.
    PauseOnChange,
    /// Resume a context that was playing when it lost the selection.
    PlayAfterPauseOnChange,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 4] = [
        PreferenceKey::ChooseOnEmpty,
        PreferenceKey::ReturnToLastOnClose,
        PreferenceKey::PauseOnChange,
        PreferenceKey::PlayAfterPauseOnChange,
    ];

    /// Key name in the preference store.
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKey::ChooseOnEmpty => "chooseOnEmpty",
            PreferenceKey::ReturnToLastOnClose => "returnToLastOnClose",
            PreferenceKey::PauseOnChange => "pauseOnChange",
            PreferenceKey::PlayAfterPauseOnChange => "playAfterPauseOnChange",
        }
    }
}

/// Snapshot of all recognised preferences. Missing keys take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub choose_on_empty: bool,
    pub return_to_last_on_close: bool,
    pub pause_on_change: bool,
    pub play_after_pause_on_change: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            choose_on_empty: true,
            return_to_last_on_close: true,
            pause_on_change: true,
            play_after_pause_on_change: true,
        }
    }
}

impl Preferences {
    pub fn get(&self, key: PreferenceKey) -> bool {
        match key {
            PreferenceKey::ChooseOnEmpty => self.choose_on_empty,
            PreferenceKey::ReturnToLastOnClose => self.return_to_last_on_close,
            PreferenceKey::PauseOnChange => self.pause_on_change,
            PreferenceKey::PlayAfterPauseOnChange => self.play_after_pause_on_change,
        }
    }

    pub fn set(&mut self, key: PreferenceKey, value: bool) {
        match key {
            PreferenceKey::ChooseOnEmpty => self.choose_on_empty = value,
            PreferenceKey::ReturnToLastOnClose => self.return_to_last_on_close = value,
            PreferenceKey::PauseOnChange => self.pause_on_change = value,
            PreferenceKey::PlayAfterPauseOnChange => self.play_after_pause_on_change = value,
        }
    }
}

/// Asynchronous preference lookup. A lookup always resolves to a value: the
/// stored one or the key's default.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_bool(&self, key: PreferenceKey) -> bool;
}

/// Mutable in-memory store.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<Preferences>,
}

impl MemoryPreferences {
    pub fn new(values: Preferences) -> Self {
        Self { values: Mutex::new(values) }
    }

    pub fn set(&self, key: PreferenceKey, value: bool) {
        match self.values.lock() {
            Ok(mut values) => values.set(key, value),
            Err(poisoned) => poisoned.into_inner().set(key, value),
        }
    }

    pub fn snapshot(&self) -> Preferences {
        match self.values.lock() {
            Ok(values) => *values,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferences {
    async fn get_bool(&self, key: PreferenceKey) -> bool {
        self.snapshot().get(key)
    }
}

/// Store backed by a JSON file that is re-read on every lookup, so edits apply
/// without a restart. An unreadable or malformed file yields defaults.
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Preferences {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!("Preferences file {} not readable ({}), using defaults", self.path.display(), e);
                return Preferences::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!("Malformed preferences file {}: {}", self.path.display(), e);
                Preferences::default()
            }
        }
    }
}

#[async_trait]
impl PreferenceStore for FilePreferences {
    async fn get_bool(&self, key: PreferenceKey) -> bool {
        self.load().await.get(key)
    }
}
