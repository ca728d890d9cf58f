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

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message name carrying a context's playback status.
pub const PLAYBACK_STATUS: &str = "playbackStatus";
/// Message name carrying the current track description.
pub const TRACK_INFO: &str = "trackInfo";
/// Message name carrying the playback position in milliseconds.
pub const CURRENT_TIME: &str = "currentTime";

/// Opaque identifier of a connected media context (a browser tab).
///
/// The platform may reuse an id after disconnect and reconnect; every connect is
/// still treated as a fresh context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub i64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Candidate passed to the selection routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Deselect everything.
    None,
    /// Return to the most recently displaced context, or NONE when there is none.
    Last,
    /// Select the given context.
    Context(ContextId),
}

/// Playback status as reported by a context, plus the `Disconnected` state used
/// for contexts that lost the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    Disconnected,
}

impl PlaybackStatus {
    /// Wire value sent to subscribers.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Disconnected => "disconnected",
        }
    }

    /// Name used for the icon file and the localized title key.
    pub fn icon_name(&self) -> &'static str {
        match self {
            PlaybackStatus::Disconnected => "disconnect",
            other => other.as_str(),
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "playing" => Some(PlaybackStatus::Playing),
            "paused" => Some(PlaybackStatus::Paused),
            "stopped" => Some(PlaybackStatus::Stopped),
            "disconnect" | "disconnected" => Some(PlaybackStatus::Disconnected),
            _ => None,
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(Self::from_wire)
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Track description as pushed by the in-page adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub url: String,
    /// Track length in milliseconds.
    pub length: u64,
    pub art_url: String,
    pub track_id: String,
}

/// `{name, value}` frame received from a context and fanned out to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl ContextMessage {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self { name: name.into(), value }
    }

    pub fn playback_status(status: PlaybackStatus) -> Self {
        Self::new(PLAYBACK_STATUS, Value::from(status.as_str()))
    }

    pub fn track_info(info: &TrackInfo) -> Self {
        let value = serde_json::to_value(info).unwrap_or(Value::Null);
        Self::new(TRACK_INFO, value)
    }

    pub fn current_time(millis: u64) -> Self {
        Self::new(CURRENT_TIME, Value::from(millis))
    }

    /// Events emitted when nothing is selected, in emission order.
    pub fn empty_state() -> [ContextMessage; 3] {
        [
            Self::track_info(&TrackInfo::default()),
            Self::playback_status(PlaybackStatus::Stopped),
            Self::current_time(0),
        ]
    }

    pub fn is_playback_status(&self) -> bool {
        self.name == PLAYBACK_STATUS
    }
}

/// Commands understood by the in-page media adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportCommand {
    Play,
    Pause,
    PlayPause,
    Next,
    Previous,
    Stop,
    /// Relative seek, argument in milliseconds.
    Seek,
    /// Absolute position, argument in milliseconds.
    SetPosition,
    /// Ask the context to push its full state again.
    Reload,
    /// Sent after the relay link came back.
    Reconnect,
}

impl TransportCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportCommand::Play => "play",
            TransportCommand::Pause => "pause",
            TransportCommand::PlayPause => "play-pause",
            TransportCommand::Next => "next",
            TransportCommand::Previous => "previous",
            TransportCommand::Stop => "stop",
            TransportCommand::Seek => "seek",
            TransportCommand::SetPosition => "set-position",
            TransportCommand::Reload => "reload",
            TransportCommand::Reconnect => "reconnect",
        }
    }
}

impl fmt::Display for TransportCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured command frame posted to a context channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl OutboundMessage {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), argument: None, sender: None }
    }

    pub fn with_argument(mut self, argument: Value) -> Self {
        self.argument = Some(argument);
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }
}

impl From<TransportCommand> for OutboundMessage {
    fn from(command: TransportCommand) -> Self {
        Self::new(command.as_str())
    }
}

/// Where a command is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTarget {
    /// Whatever context is active when the command is routed.
    Active,
    Context(ContextId),
}

/// A routed command; delivery is best effort.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub target: CommandTarget,
    pub message: OutboundMessage,
}

impl Command {
    pub fn active(message: impl Into<OutboundMessage>) -> Self {
        Self { target: CommandTarget::Active, message: message.into() }
    }

    pub fn to(id: ContextId, message: impl Into<OutboundMessage>) -> Self {
        Self { target: CommandTarget::Context(id), message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_state_is_trackinfo_status_time() {
        let [track, status, time] = ContextMessage::empty_state();
        assert_eq!(track.name, TRACK_INFO);
        assert_eq!(
            track.value,
            json!({
                "artist": "", "album": "", "title": "", "url": "",
                "length": 0, "artUrl": "", "trackId": ""
            })
        );
        assert_eq!(status, ContextMessage::new(PLAYBACK_STATUS, json!("stopped")));
        assert_eq!(time, ContextMessage::new(CURRENT_TIME, json!(0)));
    }

    #[test]
    fn playback_status_parsing() {
        assert_eq!(PlaybackStatus::from_value(&json!("playing")), Some(PlaybackStatus::Playing));
        assert_eq!(PlaybackStatus::from_value(&json!("disconnect")), Some(PlaybackStatus::Disconnected));
        assert_eq!(PlaybackStatus::from_value(&json!("buffering")), None);
        assert_eq!(PlaybackStatus::from_value(&json!(1)), None);
        assert_eq!(PlaybackStatus::Disconnected.icon_name(), "disconnect");
        assert_eq!(PlaybackStatus::Paused.icon_name(), "paused");
    }

    #[test]
    fn outbound_message_omits_absent_fields() {
        let bare = serde_json::to_value(OutboundMessage::from(TransportCommand::Reload)).unwrap();
        assert_eq!(bare, json!({"command": "reload"}));

        let full = OutboundMessage::from(TransportCommand::Seek).with_argument(json!(5000));
        assert_eq!(serde_json::to_value(full).unwrap(), json!({"command": "seek", "argument": 5000}));
    }

    #[test]
    fn inbound_message_without_value_decodes_as_null() {
        let msg: ContextMessage = serde_json::from_str(r#"{"name":"ping"}"#).unwrap();
        assert_eq!(msg, ContextMessage::new("ping", Value::Null));
    }
}
