//! Session lifecycle orchestration.
//!
//! One controller instance owns the microphone, the signaling channel, and
//! the playback queue for the single live session. It is driven by three
//! event sources: user commands, decoded server events, and captured audio
//! frames, multiplexed on one task. Every teardown path (explicit stop,
//! connect failure, remote close) funnels through the same idempotent
//! release routine.

use serde_json::Value;
use sndctl_voice_types::events::client::{
    ConversationItemCreateEvent, ConversationItemTruncateEvent, InputAudioBufferAppendEvent,
    ResponseCreateEvent,
};
use sndctl_voice_types::items::{FunctionCallOutputItem, Item};
use sndctl_voice_types::{ClientEvent, ServerEvent, SessionConfig};
use sndctl_voice_types::audio::{
    ServerVadTurnDetection, TranscriptionModel, TurnDetection, Voice,
};
use sndctl_voice_types::tools::ToolChoice;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::capture::{AudioCapture, CaptureEvent};
use crate::channel::{ChannelHandle, ServerRx, Signaling};
use crate::dispatch::{tool_declarations, FunctionDispatcher};
use crate::error::VoiceError;
use crate::playback::PlaybackQueue;
use sndctl_voice_utils::audio;

const TOGGLE_DEBOUNCE: Duration = Duration::from_millis(300);

const INSTRUCTIONS: &str = "You are a voice assistant that controls Sonos speakers. \
Keep spoken replies short. Use the provided functions to inspect and control \
speakers, and confirm what you did.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Listening,
    Hearing,
    Processing,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Start a session, or stop the running one.
    Toggle,
    Stop,
}

/// Display-only notifications for the frontend.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    State(SessionState),
    User(String),
    Assistant { text: String, streaming: bool },
    Error(String),
}

enum Tick {
    Cmd(Option<SessionCommand>),
    Server(Result<ServerEvent, broadcast::error::RecvError>),
    Frame(Option<CaptureEvent>),
    ChunkDone,
}

pub struct SessionController {
    state: SessionState,
    signaling: Box<dyn Signaling>,
    capture: Box<dyn AudioCapture>,
    playback: PlaybackQueue,
    dispatcher: FunctionDispatcher,
    channel: Option<ChannelHandle>,
    playback_tx: mpsc::Sender<Vec<f32>>,
    notices: broadcast::Sender<SessionNotice>,
    voice: Voice,
    threshold: f32,
    capture_rate: u32,
    last_toggle: Option<Instant>,
    transcript: String,
}

impl SessionController {
    pub fn new(
        signaling: Box<dyn Signaling>,
        capture: Box<dyn AudioCapture>,
        dispatcher: FunctionDispatcher,
        playback_tx: mpsc::Sender<Vec<f32>>,
        voice: Voice,
        threshold: f32,
    ) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            state: SessionState::Idle,
            signaling,
            capture,
            playback: PlaybackQueue::new(audio::SERVICE_PCM16_SAMPLE_RATE as u32),
            dispatcher,
            channel: None,
            playback_tx,
            notices,
            voice,
            threshold,
            capture_rate: 0,
            last_toggle: None,
            transcript: String::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("session state {:?} -> {:?}", self.state, state);
            self.state = state;
            let _ = self.notices.send(SessionNotice::State(state));
        }
    }

    fn notify_error(&self, message: &str) {
        let _ = self.notices.send(SessionNotice::Error(message.to_string()));
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_instructions(INSTRUCTIONS)
            .with_voice(self.voice.clone())
            .with_pcm16_audio()
            .with_input_audio_transcription_enable(TranscriptionModel::Whisper)
            .with_turn_detection(TurnDetection::ServerVad(
                ServerVadTurnDetection::default().with_threshold(self.threshold),
            ))
            .with_tools(tool_declarations())
            .with_tool_choice(ToolChoice::Auto)
            .build()
    }

    /// Brings a session up. The microphone is acquired before any network
    /// traffic so a permission failure never opens the channel.
    pub async fn start(
        &mut self,
    ) -> Result<(ServerRx, mpsc::Receiver<CaptureEvent>), VoiceError> {
        self.set_state(SessionState::Connecting);

        if let Err(e) = self.capture.acquire() {
            self.notify_error("Microphone permission denied");
            self.teardown();
            return Err(e);
        }
        self.capture_rate = self.capture.sample_rate();

        let channel = match self.signaling.connect(self.session_config()).await {
            Ok(channel) => channel,
            Err(e) => {
                self.notify_error(&e.to_string());
                self.teardown();
                return Err(e);
            }
        };
        let server_rx = channel.subscribe();
        self.channel = Some(channel);

        let frames = match self.capture.start() {
            Ok(frames) => frames,
            Err(e) => {
                self.notify_error(&e.to_string());
                self.teardown();
                return Err(e);
            }
        };

        self.set_state(SessionState::Listening);
        Ok((server_rx, frames))
    }

    /// Releases everything the session holds. Safe to call from any state
    /// and any number of times.
    pub fn teardown(&mut self) {
        if self.state == SessionState::Idle && self.channel.is_none() {
            return;
        }
        self.capture.stop();
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.playback.reset();
        self.transcript.clear();
        self.set_state(SessionState::Idle);
    }

    /// Handles a dead input stream, typically after a hardware suspend.
    /// Restarts the stream when the device still answers; otherwise tears
    /// the session down so we never sit listening to silence.
    fn recover_capture(&mut self) -> Option<mpsc::Receiver<CaptureEvent>> {
        if self.state == SessionState::Idle {
            return None;
        }
        if self.capture.check_health() {
            match self.capture.start() {
                Ok(rx) => {
                    tracing::info!("input stream restarted");
                    return Some(rx);
                }
                Err(e) => tracing::error!("input stream restart failed: {}", e),
            }
        }
        self.notify_error("Microphone unavailable");
        self.teardown();
        None
    }

    fn toggle_debounced(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_toggle {
            if now.duration_since(last) < TOGGLE_DEBOUNCE {
                tracing::debug!("ignoring rapid toggle");
                return false;
            }
        }
        self.last_toggle = Some(now);
        true
    }

    async fn send(&self, event: ClientEvent) {
        if let Some(channel) = &self.channel {
            if channel.sender().send(event).await.is_err() {
                tracing::error!("outbound channel closed while sending");
            }
        }
    }

    /// Main loop. Owns the command stream for the life of the process;
    /// sessions come and go inside it.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut server_rx: Option<ServerRx> = None;
        let mut frames: Option<mpsc::Receiver<CaptureEvent>> = None;
        let mut chunk_deadline: Option<Instant> = None;

        loop {
            // Helpers park forever on a missing source, so no branch needs
            // an explicit precondition.
            let tick = tokio::select! {
                cmd = commands.recv() => Tick::Cmd(cmd),
                event = recv_server(&mut server_rx) => Tick::Server(event),
                frame = recv_frame(&mut frames) => Tick::Frame(frame),
                _ = sleep_until_opt(chunk_deadline) => Tick::ChunkDone,
            };

            match tick {
                Tick::Cmd(None) => {
                    self.teardown();
                    return;
                }
                Tick::Cmd(Some(SessionCommand::Stop)) => {
                    self.teardown();
                    server_rx = None;
                    frames = None;
                    chunk_deadline = None;
                }
                Tick::Cmd(Some(SessionCommand::Toggle)) => {
                    if !self.toggle_debounced(Instant::now()) {
                        continue;
                    }
                    if self.state == SessionState::Idle {
                        match self.start().await {
                            Ok((rx, fr)) => {
                                server_rx = Some(rx);
                                frames = Some(fr);
                            }
                            Err(e) => tracing::error!("session start failed: {}", e),
                        }
                    } else {
                        self.teardown();
                        server_rx = None;
                        frames = None;
                        chunk_deadline = None;
                    }
                }
                Tick::Server(Ok(event)) => {
                    if self.on_server_event(event, &mut chunk_deadline).await {
                        server_rx = None;
                        frames = None;
                        chunk_deadline = None;
                    }
                }
                Tick::Server(Err(broadcast::error::RecvError::Lagged(n))) => {
                    tracing::warn!("dropped {} server events", n);
                }
                Tick::Server(Err(broadcast::error::RecvError::Closed)) => {
                    self.notify_error("connection lost");
                    self.teardown();
                    server_rx = None;
                    frames = None;
                    chunk_deadline = None;
                }
                Tick::Frame(Some(CaptureEvent::Frame(frame))) => self.on_frame(frame).await,
                Tick::Frame(Some(CaptureEvent::Failed(reason))) => {
                    tracing::warn!("input stream failed: {}", reason);
                    frames = self.recover_capture();
                    if self.state == SessionState::Idle {
                        server_rx = None;
                        chunk_deadline = None;
                    }
                }
                Tick::Frame(None) => {
                    frames = self.recover_capture();
                    if self.state == SessionState::Idle {
                        server_rx = None;
                        chunk_deadline = None;
                    }
                }
                Tick::ChunkDone => {
                    chunk_deadline = None;
                    self.playback.finish_current();
                    self.pump_playback(&mut chunk_deadline).await;
                    if self.playback.is_idle() && self.state == SessionState::Speaking {
                        self.set_state(SessionState::Listening);
                    }
                }
            }
        }
    }

    /// Resamples a captured block to the service rate and ships it. Frames
    /// outside the live states, or with no open channel, are dropped.
    async fn on_frame(&mut self, frame: Vec<f32>) {
        if !matches!(self.state, SessionState::Listening | SessionState::Hearing) {
            return;
        }
        if self.channel.is_none() {
            return;
        }
        let resampled = audio::resample_linear(
            &frame,
            self.capture_rate as f64,
            audio::SERVICE_PCM16_SAMPLE_RATE,
        );
        let encoded = audio::encode_frame(&resampled);
        self.send(ClientEvent::InputAudioBufferAppend(
            InputAudioBufferAppendEvent::new(encoded),
        ))
        .await;
    }

    /// Starts the next playback chunk if the queue has one and nothing is
    /// audible, forwarding the samples to the output device.
    async fn pump_playback(&mut self, chunk_deadline: &mut Option<Instant>) {
        let now = Instant::now();
        if let Some(chunk) = self.playback.start_next(now.into_std()) {
            *chunk_deadline = Some(now + chunk.duration);
            if self.playback_tx.send(chunk.samples).await.is_err() {
                tracing::error!("playback output channel closed");
            }
        }
    }

    /// Handles one decoded server event. Returns true when the session was
    /// torn down and the caller must drop its receivers.
    async fn on_server_event(
        &mut self,
        event: ServerEvent,
        chunk_deadline: &mut Option<Instant>,
    ) -> bool {
        match event {
            ServerEvent::SessionCreated(e) => {
                tracing::info!("session created: {:?}", e.session().id());
            }
            ServerEvent::SessionUpdated(_) => {
                tracing::debug!("session configuration acknowledged");
            }
            ServerEvent::InputAudioBufferSpeechStarted(e) => {
                tracing::debug!("speech started at {} ms", e.audio_start_ms());
                if let Some(cut) = self.playback.interrupt(std::time::Instant::now()) {
                    self.send(ClientEvent::ConversationItemTruncate(
                        ConversationItemTruncateEvent::new(&cut.item_id, 0, cut.played_ms as i32),
                    ))
                    .await;
                }
                *chunk_deadline = None;
                self.set_state(SessionState::Hearing);
            }
            ServerEvent::InputAudioBufferSpeechStopped(_) => {
                self.set_state(SessionState::Processing);
            }
            ServerEvent::ConversationItemInputAudioTranscriptionCompleted(e) => {
                let _ = self
                    .notices
                    .send(SessionNotice::User(e.transcript().trim().to_string()));
            }
            ServerEvent::ResponseOutputItemAdded(e) => {
                tracing::debug!("output item added: {:?}", e.item().id());
            }
            ServerEvent::ResponseAudioDelta(e) => {
                let samples = audio::decode_frame(e.delta());
                self.playback.enqueue(e.item_id(), samples);
                if matches!(
                    self.state,
                    SessionState::Processing | SessionState::Listening
                ) {
                    self.set_state(SessionState::Speaking);
                }
                if chunk_deadline.is_none() {
                    self.pump_playback(chunk_deadline).await;
                }
            }
            ServerEvent::ResponseAudioDone(_) => {
                tracing::debug!("audio stream for response complete");
            }
            ServerEvent::ResponseAudioTranscriptDelta(e) => {
                self.transcript.push_str(e.delta());
                let _ = self.notices.send(SessionNotice::Assistant {
                    text: self.transcript.clone(),
                    streaming: true,
                });
            }
            ServerEvent::ResponseAudioTranscriptDone(e) => {
                let _ = self.notices.send(SessionNotice::Assistant {
                    text: e.transcript().to_string(),
                    streaming: false,
                });
                self.transcript.clear();
            }
            ServerEvent::ResponseFunctionCallArgumentsDone(e) => {
                let arguments: Value =
                    serde_json::from_str(e.arguments()).unwrap_or(Value::Null);
                let result = self.dispatcher.dispatch(e.name(), &arguments).await;
                self.send(ClientEvent::ConversationItemCreate(
                    ConversationItemCreateEvent::new(Item::FunctionCallOutput(
                        FunctionCallOutputItem::new(e.call_id(), &result.to_string()),
                    )),
                ))
                .await;
                self.send(ClientEvent::ResponseCreate(ResponseCreateEvent::new()))
                    .await;
            }
            ServerEvent::ResponseDone(_) => {
                tracing::debug!("response complete");
            }
            ServerEvent::Error(e) => {
                let error = VoiceError::Remote(e.error().message().to_string());
                tracing::error!("{}", error);
                self.notify_error(&error.to_string());
            }
            ServerEvent::Close { reason } => {
                let error = VoiceError::ChannelClosed(
                    reason.unwrap_or_else(|| "connection closed".to_string()),
                );
                tracing::warn!("{}", error);
                self.notify_error(&error.to_string());
                self.teardown();
                return true;
            }
        }
        false
    }
}

async fn recv_server(
    rx: &mut Option<ServerRx>,
) -> Result<ServerEvent, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_frame(rx: &mut Option<mpsc::Receiver<CaptureEvent>>) -> Option<CaptureEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockAudioCapture;
    use crate::channel::{ChannelHandle, MockSignaling};
    use crate::dispatch::MockDeviceApi;
    use std::sync::Arc;

    fn controller(
        signaling: MockSignaling,
        capture: MockAudioCapture,
    ) -> (SessionController, mpsc::Receiver<Vec<f32>>) {
        let (playback_tx, playback_rx) = mpsc::channel(8);
        let dispatcher = FunctionDispatcher::new(Arc::new(MockDeviceApi::new()));
        let controller = SessionController::new(
            Box::new(signaling),
            Box::new(capture),
            dispatcher,
            playback_tx,
            Voice::Coral,
            0.5,
        );
        (controller, playback_rx)
    }

    fn live_channel() -> (ChannelHandle, mpsc::Receiver<ClientEvent>) {
        let (client_tx, client_rx) = mpsc::channel(64);
        let (server_tx, _) = broadcast::channel(64);
        (ChannelHandle::new(client_tx, server_tx), client_rx)
    }

    #[tokio::test]
    async fn denied_microphone_never_opens_the_channel() {
        let mut capture = MockAudioCapture::new();
        capture
            .expect_acquire()
            .times(1)
            .returning(|| Err(VoiceError::Device("permission denied".to_string())));
        capture.expect_stop().returning(|| ());

        let mut signaling = MockSignaling::new();
        signaling.expect_connect().times(0);

        let (mut controller, _playback) = controller(signaling, capture);
        let mut notices = controller.subscribe_notices();

        assert!(controller.start().await.is_err());
        assert_eq!(controller.state(), SessionState::Idle);

        // Connecting, then the error text, then back to Idle.
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::State(SessionState::Connecting)
        ));
        match notices.recv().await.unwrap() {
            SessionNotice::Error(message) => {
                assert_eq!(message, "Microphone permission denied");
            }
            other => panic!("unexpected notice: {:?}", other),
        }
        assert!(matches!(
            notices.recv().await.unwrap(),
            SessionNotice::State(SessionState::Idle)
        ));
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture.expect_sample_rate().return_const(48_000u32);
        capture.expect_start().returning(|| {
            let (_tx, rx) = mpsc::channel(8);
            Ok(rx)
        });
        // A second teardown must not stop the capture again.
        capture.expect_stop().times(1).returning(|| ());

        let mut signaling = MockSignaling::new();
        signaling.expect_connect().returning(|_| {
            let (handle, _rx) = {
                let (client_tx, client_rx) = mpsc::channel(64);
                let (server_tx, _) = broadcast::channel(64);
                (ChannelHandle::new(client_tx, server_tx), client_rx)
            };
            Ok(handle)
        });

        let (mut controller, _playback) = controller(signaling, capture);
        controller.start().await.unwrap();
        assert_eq!(controller.state(), SessionState::Listening);

        controller.teardown();
        assert_eq!(controller.state(), SessionState::Idle);
        controller.teardown();
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn speech_started_truncates_the_playing_item() {
        let capture = started_capture();
        let (handle, mut outbound) = live_channel();
        let mut signaling = MockSignaling::new();
        let mut handle = Some(handle);
        signaling
            .expect_connect()
            .returning(move |_| Ok(handle.take().unwrap()));

        let (mut controller, mut playback_rx) = controller(signaling, capture);
        controller.start().await.unwrap();

        // 100 ms of assistant audio starts playing.
        let mut deadline = None;
        let chunk = vec![0i16; 2400];
        let delta = delta_event("item_1", &chunk);
        controller.on_server_event(delta, &mut deadline).await;
        assert_eq!(controller.state(), SessionState::Speaking);
        assert!(deadline.is_some());
        assert!(playback_rx.recv().await.is_some());

        let speech = serde_json::from_value(serde_json::json!({
            "type": "input_audio_buffer.speech_started",
            "event_id": "evt", "audio_start_ms": 0, "item_id": "user_item"
        }))
        .unwrap();
        controller.on_server_event(speech, &mut deadline).await;
        assert_eq!(controller.state(), SessionState::Hearing);
        assert!(deadline.is_none());

        let truncate = outbound.recv().await.unwrap();
        match truncate {
            ClientEvent::ConversationItemTruncate(e) => {
                assert_eq!(e.item_id, "item_1");
            }
            other => panic!("unexpected outbound event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn interrupting_silence_sends_no_truncation() {
        let capture = started_capture();
        let (handle, mut outbound) = live_channel();
        let mut signaling = MockSignaling::new();
        let mut handle = Some(handle);
        signaling
            .expect_connect()
            .returning(move |_| Ok(handle.take().unwrap()));

        let (mut controller, _playback_rx) = controller(signaling, capture);
        controller.start().await.unwrap();

        let mut deadline = None;
        let speech = serde_json::from_value(serde_json::json!({
            "type": "input_audio_buffer.speech_started",
            "event_id": "evt", "audio_start_ms": 0, "item_id": "user_item"
        }))
        .unwrap();
        controller.on_server_event(speech, &mut deadline).await;
        assert_eq!(controller.state(), SessionState::Hearing);
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn function_call_posts_output_and_requests_a_response() {
        let capture = started_capture();
        let (handle, mut outbound) = live_channel();
        let mut signaling = MockSignaling::new();
        let mut handle = Some(handle);
        signaling
            .expect_connect()
            .returning(move |_| Ok(handle.take().unwrap()));

        let (playback_tx, _playback_rx) = mpsc::channel(8);
        let mut api = MockDeviceApi::new();
        api.expect_list_speakers()
            .returning(|| Ok(serde_json::json!(["Kitchen", "Den"])));
        let mut controller = SessionController::new(
            Box::new(signaling),
            Box::new(capture),
            FunctionDispatcher::new(Arc::new(api)),
            playback_tx,
            Voice::Coral,
            0.5,
        );
        controller.start().await.unwrap();

        let mut deadline = None;
        let call = serde_json::from_value(serde_json::json!({
            "type": "response.function_call_arguments.done",
            "event_id": "evt", "response_id": "resp", "item_id": "item",
            "output_index": 0, "call_id": "call_1",
            "name": "list_speakers", "arguments": "{}"
        }))
        .unwrap();
        controller.on_server_event(call, &mut deadline).await;

        match outbound.recv().await.unwrap() {
            ClientEvent::ConversationItemCreate(e) => match &e.item {
                Item::FunctionCallOutput(out) => {
                    assert_eq!(out.call_id(), "call_1");
                    assert_eq!(out.output(), r#"["Kitchen","Den"]"#);
                }
            },
            other => panic!("unexpected outbound event: {:?}", other),
        }
        assert!(matches!(
            outbound.recv().await.unwrap(),
            ClientEvent::ResponseCreate(_)
        ));
    }

    #[tokio::test]
    async fn remote_error_keeps_the_session_alive() {
        let capture = started_capture();
        let (handle, _outbound) = live_channel();
        let mut signaling = MockSignaling::new();
        let mut handle = Some(handle);
        signaling
            .expect_connect()
            .returning(move |_| Ok(handle.take().unwrap()));

        let (mut controller, _playback_rx) = controller(signaling, capture);
        controller.start().await.unwrap();
        let mut notices = controller.subscribe_notices();

        let mut deadline = None;
        let error = serde_json::from_value(serde_json::json!({
            "type": "error",
            "event_id": "evt",
            "error": { "type": "invalid_request_error", "message": "bad frame" }
        }))
        .unwrap();
        let closed = controller.on_server_event(error, &mut deadline).await;
        assert!(!closed);
        assert_eq!(controller.state(), SessionState::Listening);
        match notices.recv().await.unwrap() {
            SessionNotice::Error(message) => assert_eq!(message, "assistant error: bad frame"),
            other => panic!("unexpected notice: {:?}", other),
        }

        let close = ServerEvent::Close {
            reason: Some("going away".to_string()),
        };
        let closed = controller.on_server_event(close, &mut deadline).await;
        assert!(closed);
        assert_eq!(controller.state(), SessionState::Idle);
        match notices.recv().await.unwrap() {
            SessionNotice::Error(message) => assert_eq!(message, "channel closed: going away"),
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dead_input_stream_with_no_device_tears_down() {
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture.expect_sample_rate().return_const(48_000u32);
        capture.expect_start().times(1).returning(|| {
            let (_tx, rx) = mpsc::channel(8);
            Ok(rx)
        });
        capture.expect_check_health().times(1).returning(|| false);
        capture.expect_stop().returning(|| ());

        let (handle, _outbound) = live_channel();
        let mut signaling = MockSignaling::new();
        let mut handle = Some(handle);
        signaling
            .expect_connect()
            .returning(move |_| Ok(handle.take().unwrap()));

        let (mut controller, _playback_rx) = controller(signaling, capture);
        controller.start().await.unwrap();
        let mut notices = controller.subscribe_notices();

        assert!(controller.recover_capture().is_none());
        assert_eq!(controller.state(), SessionState::Idle);
        match notices.recv().await.unwrap() {
            SessionNotice::Error(message) => assert_eq!(message, "Microphone unavailable"),
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dead_input_stream_restarts_on_a_healthy_device() {
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture.expect_sample_rate().return_const(48_000u32);
        // Once at session start, once for the restart.
        capture.expect_start().times(2).returning(|| {
            let (_tx, rx) = mpsc::channel(8);
            Ok(rx)
        });
        capture.expect_check_health().times(1).returning(|| true);
        capture.expect_stop().returning(|| ());

        let (handle, _outbound) = live_channel();
        let mut signaling = MockSignaling::new();
        let mut handle = Some(handle);
        signaling
            .expect_connect()
            .returning(move |_| Ok(handle.take().unwrap()));

        let (mut controller, _playback_rx) = controller(signaling, capture);
        controller.start().await.unwrap();

        assert!(controller.recover_capture().is_some());
        assert_eq!(controller.state(), SessionState::Listening);
    }

    fn started_capture() -> MockAudioCapture {
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture.expect_sample_rate().return_const(48_000u32);
        capture.expect_start().returning(|| {
            let (_tx, rx) = mpsc::channel(8);
            Ok(rx)
        });
        capture.expect_stop().returning(|| ());
        capture
    }

    fn delta_event(item_id: &str, samples: &[i16]) -> ServerEvent {
        use base64::Engine;
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let delta = base64::engine::general_purpose::STANDARD.encode(bytes);
        serde_json::from_value(serde_json::json!({
            "type": "response.audio.delta",
            "event_id": "evt", "response_id": "resp", "item_id": item_id,
            "output_index": 0, "content_index": 0, "delta": delta
        }))
        .unwrap()
    }
}
