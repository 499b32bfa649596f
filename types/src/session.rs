use crate::audio::{AudioFormat, InputAudioTranscription, TranscriptionModel, TurnDetection, Voice};
use crate::tools::{Tool, ToolChoice};

/// The session configuration carried by a `session.update` event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    /// The set of modalities the model can respond with.
    modalities: Vec<String>,

    /// The default system instructions prepended to model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    /// The voice the model uses to respond.
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<Voice>,

    /// The format of input audio. Options are "pcm16", "g711_ulaw", "g711_alaw".
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_format: Option<AudioFormat>,

    /// The format of output audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_format: Option<AudioFormat>,

    /// Configuration for input audio transcription. Null leaves it off.
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<InputAudioTranscription>,

    /// Configuration for turn detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    turn_detection: Option<TurnDetection>,

    /// Tools (functions) available to the model.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    tools: Vec<Tool>,

    /// How the model chooses tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

impl SessionConfig {
    pub fn new() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    pub fn turn_detection(&self) -> Option<&TurnDetection> {
        self.turn_detection.as_ref()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }
}

pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: None,
                voice: None,
                input_audio_format: None,
                output_audio_format: None,
                input_audio_transcription: None,
                turn_detection: None,
                tools: vec![],
                tool_choice: None,
            },
        }
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.config.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.config.voice = Some(voice);
        self
    }

    pub fn with_pcm16_audio(mut self) -> Self {
        self.config.input_audio_format = Some(AudioFormat::Pcm16);
        self.config.output_audio_format = Some(AudioFormat::Pcm16);
        self
    }

    pub fn with_input_audio_transcription_enable(mut self, model: TranscriptionModel) -> Self {
        self.config.input_audio_transcription =
            Some(InputAudioTranscription::new().with_model(model));
        self
    }

    pub fn with_turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        self.config.turn_detection = Some(turn_detection);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.config.tool_choice = Some(tool_choice);
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ServerVadTurnDetection;

    #[test]
    fn update_payload_omits_unset_fields() {
        let config = SessionConfig::new()
            .with_voice(Voice::Coral)
            .with_turn_detection(TurnDetection::ServerVad(
                ServerVadTurnDetection::default().with_threshold(0.4),
            ))
            .build();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["voice"], "coral");
        assert_eq!(json["turn_detection"]["type"], "server_vad");
        assert!(json.get("instructions").is_none());
        assert!(json.get("tools").is_none());
    }
}
