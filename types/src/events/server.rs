mod error;

use crate::items::ItemResource;
pub use error::ErrorDetails;

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    event_id: Option<String>,

    /// Details about the error
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

/// A thin view of the session resource the service reports back. Only the
/// fields the session manager reads are typed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionResource {
    id: Option<String>,
    model: Option<String>,
    voice: Option<String>,
}

impl SessionResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }
}

/// `session.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionCreatedEvent {
    event_id: String,
    session: SessionResource,
}

impl SessionCreatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &SessionResource {
        &self.session
    }
}

/// `session.updated` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdatedEvent {
    event_id: String,
    session: SessionResource,
}

impl SessionUpdatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &SessionResource {
        &self.session
    }
}

/// `input_audio_buffer.speech_started` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferSpeechStartedEvent {
    event_id: String,

    /// Milliseconds since the session started when speech was detected
    audio_start_ms: i32,
    /// The ID of the user message item that will be created when speech stops
    item_id: String,
}

impl InputAudioBufferSpeechStartedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn audio_start_ms(&self) -> i32 {
        self.audio_start_ms
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// `input_audio_buffer.speech_stopped` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioBufferSpeechStoppedEvent {
    event_id: String,

    /// Milliseconds since the session started when speech stopped
    audio_end_ms: i32,
    /// The ID of the user message item that will be created
    item_id: String,
}

impl InputAudioBufferSpeechStoppedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn audio_end_ms(&self) -> i32 {
        self.audio_end_ms
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// `conversation.item.input_audio_transcription.completed` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemInputAudioTranscriptionCompletedEvent {
    event_id: String,

    /// The ID of the user message item
    item_id: String,

    /// The index of the content part containing the audio
    content_index: i32,

    /// The transcribed text
    transcript: String,
}

impl ConversationItemInputAudioTranscriptionCompletedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn content_index(&self) -> i32 {
        self.content_index
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.output_item.added` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseOutputItemAddedEvent {
    event_id: String,

    /// The ID of the response to which the item belongs
    response_id: String,
    /// The index of the output item in the response
    output_index: i32,
    /// The item that was added
    item: ItemResource,
}

impl ResponseOutputItemAddedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn output_index(&self) -> i32 {
        self.output_index
    }

    pub fn item(&self) -> &ItemResource {
        &self.item
    }
}

/// `response.audio.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDeltaEvent {
    event_id: String,

    /// The ID of the response
    response_id: String,
    /// The ID of the item
    item_id: String,
    /// The index of the output item in the response
    output_index: i32,
    /// The index of the content part in the item's content array
    content_index: i32,
    /// The delta in the audio content, base64 PCM16
    delta: String,
}

impl ResponseAudioDeltaEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn output_index(&self) -> i32 {
        self.output_index
    }

    pub fn content_index(&self) -> i32 {
        self.content_index
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.audio.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioDoneEvent {
    event_id: String,

    response_id: String,
    item_id: String,
    output_index: i32,
    content_index: i32,
}

impl ResponseAudioDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// `response.audio_transcript.delta` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDeltaEvent {
    event_id: String,

    response_id: String,
    item_id: String,
    output_index: i32,
    content_index: i32,
    /// The delta in the audio transcript
    delta: String,
}

impl ResponseAudioTranscriptDeltaEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn delta(&self) -> &str {
        &self.delta
    }
}

/// `response.audio_transcript.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseAudioTranscriptDoneEvent {
    event_id: String,

    response_id: String,
    item_id: String,
    output_index: i32,
    content_index: i32,
    /// The completed audio transcript
    transcript: String,
}

impl ResponseAudioTranscriptDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.function_call_arguments.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseFunctionCallArgumentsDoneEvent {
    event_id: String,

    /// The ID of the response
    response_id: String,
    /// The ID of the function call item
    item_id: String,
    /// The index of the output item in the response
    output_index: i32,
    /// The ID of the function call
    call_id: String,
    /// The name of the called function
    name: String,
    /// The completed function calling arguments, as a JSON string
    arguments: String,
}

impl ResponseFunctionCallArgumentsDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }
}

/// A thin view of the response resource.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseResource {
    id: Option<String>,
    status: Option<String>,
}

impl ResponseResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// `response.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseDoneEvent {
    event_id: String,

    /// The response resource
    response: ResponseResource,
}

impl ResponseDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response(&self) -> &ResponseResource {
        &self.response
    }
}
