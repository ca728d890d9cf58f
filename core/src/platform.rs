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

use async_trait::async_trait;

use crate::definitions::ContextId;
use crate::page_action::{IconSet, PageActionUpdate};

/// Host platform hooks: the liveness probe and the fire-and-forget UI sink.
#[async_trait]
pub trait TabPlatform: Send + Sync {
    /// Best-effort liveness probe. The answer may be stale by the time it
    /// arrives; callers must not cache it.
    async fn exists(&self, id: ContextId) -> bool;

    /// Reveal the page-level affordance for a newly connected context.
    fn show_page_action(&self, id: ContextId);

    /// Update title and icon of a context's page action. Invalid targets are ignored.
    fn set_page_action(&self, update: &PageActionUpdate);

    /// Update the global browser-action icon and title.
    fn set_browser_action(&self, _title: &str, _icon: &IconSet) {}
}
