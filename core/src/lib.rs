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

pub mod definitions;
pub mod errors;
pub mod channel;
pub mod preferences;
pub mod page_action;
pub mod platform;
pub mod listener;
pub mod relay;

mod arbiter;
mod arbiter_loop;
mod service;

pub use arbiter::TabArbiter;
pub use arbiter_loop::{context_event_channel, run_arbiter, ContextEvent, ContextEventReceiver, ContextEventSender};
pub use service::{spawn_service, MultiServiceHandle, ServiceHandle, StopHandle};

pub use channel::{ContextChannel, MpscContextChannel};
pub use listener::{BroadcastSubscriber, ListenerManager, MessageSubscriber};
pub use platform::TabPlatform;
pub use preferences::{FilePreferences, MemoryPreferences, PreferenceKey, PreferenceStore, Preferences};
pub use relay::{run_relay, RelayConfig, RelayHandle};
