use crate::audio::Base64EncodedAudioBytes;
use crate::session::SessionConfig;
use crate::Item;

/// `session.update` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The session configuration to apply
    session: SessionConfig,
}

impl SessionUpdateEvent {
    pub fn new(session: SessionConfig) -> Self {
        Self {
            event_id: None,
            session,
        }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }
}

/// `input_audio_buffer.append` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferAppendEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The audio data to append to the buffer
    audio: Base64EncodedAudioBytes,
}

impl InputAudioBufferAppendEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self {
            event_id: None,
            audio,
        }
    }

    pub fn audio(&self) -> &Base64EncodedAudioBytes {
        &self.audio
    }
}

/// `conversation.item.truncate` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemTruncateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The ID of the assistant message item to truncate.
    pub item_id: String,
    /// The index of the content part to truncate
    pub content_index: i32,
    /// Inclusive duration up to which audio was actually heard, in milliseconds
    pub audio_end_ms: i32,
}

impl ConversationItemTruncateEvent {
    pub fn new(item_id: &str, content_index: i32, audio_end_ms: i32) -> Self {
        Self {
            event_id: None,
            item_id: item_id.to_string(),
            content_index,
            audio_end_ms,
        }
    }
}

/// `conversation.item.create` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemCreateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,

    /// The item to add to the conversation
    pub item: Item,
}

impl ConversationItemCreateEvent {
    pub fn new(item: Item) -> Self {
        Self {
            event_id: None,
            item,
        }
    }
}

/// `response.create` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreateEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

impl Default for ResponseCreateEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCreateEvent {
    pub fn new() -> Self {
        Self { event_id: None }
    }
}
