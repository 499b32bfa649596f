pub mod client;
pub mod server;

use client::*;
use server::*;

/// Every message the session manager can send to the service.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(SessionUpdateEvent),
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend(InputAudioBufferAppendEvent),
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate(ConversationItemTruncateEvent),
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

/// Every decoded inbound event. `Close` is synthesized locally when the
/// socket shuts down so consumers see teardown through the same channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "close")]
    Close { reason: Option<String> },
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "session.created")]
    SessionCreated(SessionCreatedEvent),
    #[serde(rename = "session.updated")]
    SessionUpdated(SessionUpdatedEvent),
    #[serde(rename = "input_audio_buffer.speech_started")]
    InputAudioBufferSpeechStarted(InputAudioBufferSpeechStartedEvent),
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    InputAudioBufferSpeechStopped(InputAudioBufferSpeechStoppedEvent),
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    ConversationItemInputAudioTranscriptionCompleted(
        ConversationItemInputAudioTranscriptionCompletedEvent,
    ),
    #[serde(rename = "response.output_item.added")]
    ResponseOutputItemAdded(ResponseOutputItemAddedEvent),
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta(ResponseAudioDeltaEvent),
    #[serde(rename = "response.audio.done")]
    ResponseAudioDone(ResponseAudioDoneEvent),
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta(ResponseAudioTranscriptDeltaEvent),
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone(ResponseAudioTranscriptDoneEvent),
    #[serde(rename = "response.function_call_arguments.done")]
    ResponseFunctionCallArgumentsDone(ResponseFunctionCallArgumentsDoneEvent),
    #[serde(rename = "response.done")]
    ResponseDone(ResponseDoneEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_carries_type_tag() {
        let event = ClientEvent::ResponseCreate(ResponseCreateEvent::new());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "response.create");
    }

    #[test]
    fn audio_delta_round_trips() {
        let json = r#"{
            "type": "response.audio.delta",
            "event_id": "evt_1",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "AAAA"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::ResponseAudioDelta(e) => {
                assert_eq!(e.item_id(), "item_1");
                assert_eq!(e.delta(), "AAAA");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn function_call_arguments_done_round_trips() {
        let json = r#"{
            "type": "response.function_call_arguments.done",
            "event_id": "evt_2",
            "response_id": "resp_1",
            "item_id": "item_2",
            "output_index": 0,
            "call_id": "call_1",
            "name": "set_volume",
            "arguments": "{\"speaker\":\"Kitchen\",\"volume\":30}"
        }"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        match event {
            ServerEvent::ResponseFunctionCallArgumentsDone(e) => {
                assert_eq!(e.name(), "set_volume");
                assert_eq!(e.call_id(), "call_1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_is_a_decode_error() {
        let json = r#"{"type":"rate_limits.updated","event_id":"evt_3"}"#;
        assert!(serde_json::from_str::<ServerEvent>(json).is_err());
    }
}
