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

use log::debug;
use tokio::sync::mpsc;

use crate::definitions::{ContextId, OutboundMessage};
use crate::errors::ChannelError;

/// Outgoing half of a context's bidirectional channel.
///
/// Posting is fire-and-forget; the arbiter logs and drops failures.
pub trait ContextChannel: Send + Sync {
    fn post_message(&self, message: &OutboundMessage) -> Result<(), ChannelError>;
}

/// Channel backed by an unbounded tokio mpsc sender. The receiving half is
/// drained by whatever transport writes frames to the context.
pub struct MpscContextChannel {
    id: ContextId,
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl MpscContextChannel {
    pub fn new(id: ContextId) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

impl ContextChannel for MpscContextChannel {
    fn post_message(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        debug!("Posting {} to context {}", message.command, self.id);
        self.tx.send(message.clone()).map_err(|_| ChannelError::Closed(self.id))
    }
}
