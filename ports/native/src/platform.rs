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

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::info;
use tab_arbiter_core::definitions::ContextId;
use tab_arbiter_core::page_action::{IconSet, PageActionUpdate};
use tab_arbiter_core::TabPlatform;

/// Contexts whose sockets are currently open.
///
/// Each socket registers under a fresh token, so a socket that was replaced by a
/// newer one for the same id cannot remove the newer entry.
#[derive(Clone, Default)]
pub struct LiveContexts {
    inner: Arc<Mutex<LiveTable>>,
}

#[derive(Default)]
struct LiveTable {
    sockets: HashMap<ContextId, u64>,
    next_token: u64,
}

impl LiveContexts {
    /// Registers a socket for `id` and returns its token.
    pub fn insert(&self, id: ContextId) -> u64 {
        let mut table = self.lock();
        table.next_token += 1;
        let token = table.next_token;
        table.sockets.insert(id, token);
        token
    }

    /// Removes `id` if it is still owned by `token`.
    pub fn remove(&self, id: ContextId, token: u64) -> bool {
        let mut table = self.lock();
        if table.sockets.get(&id) == Some(&token) {
            table.sockets.remove(&id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.lock().sockets.contains_key(&id)
    }

    fn lock(&self) -> MutexGuard<'_, LiveTable> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn describe(icon: &IconSet) -> String {
    icon.paths.values().cloned().collect::<Vec<_>>().join(", ")
}

/// Platform backed by the context server's socket table. The UI sink is the log.
pub struct NativePlatform {
    live: LiveContexts,
}

impl NativePlatform {
    pub fn new(live: LiveContexts) -> Self {
        Self { live }
    }
}

#[async_trait]
impl TabPlatform for NativePlatform {
    async fn exists(&self, id: ContextId) -> bool {
        self.live.contains(id)
    }

    fn show_page_action(&self, id: ContextId) {
        info!("Context {}: page action shown", id);
    }

    fn set_page_action(&self, update: &PageActionUpdate) {
        info!("Context {}: {} [{}]", update.target, update.title, describe(&update.icon));
    }

    fn set_browser_action(&self, title: &str, icon: &IconSet) {
        info!("Browser action: {} [{}]", title, describe(icon));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existence_follows_live_table() {
        let live = LiveContexts::default();
        let platform = NativePlatform::new(live.clone());
        assert!(!platform.exists(ContextId(4)).await);

        let token = live.insert(ContextId(4));
        assert!(platform.exists(ContextId(4)).await);

        assert!(live.remove(ContextId(4), token));
        assert!(!platform.exists(ContextId(4)).await);
        assert!(!live.remove(ContextId(4), token));
    }

    #[test]
    fn replaced_socket_cannot_remove_newer_entry() {
        let live = LiveContexts::default();
        let old = live.insert(ContextId(2));
        let new = live.insert(ContextId(2));
        assert!(!live.remove(ContextId(2), old));
        assert!(live.contains(ContextId(2)));
        assert!(live.remove(ContextId(2), new));
    }
}
