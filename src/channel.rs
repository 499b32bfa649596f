//! Signaling channel to the realtime assistant service.
//!
//! Connecting is a three-step sequence: mint a short-lived credential from
//! the token-issuance endpoint, open the websocket with it, then push the
//! initial session configuration. Once open, outbound events flow through a
//! single mpsc consumer (caller ordering is preserved) and every decoded
//! inbound event is fanned out on a broadcast channel. Socket close or a
//! read failure is surfaced as a synthetic `ServerEvent::Close` so the
//! session sees teardown through the same stream as everything else.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use sndctl_voice_types::events::client::SessionUpdateEvent;
use sndctl_voice_types::{ClientEvent, ServerEvent, SessionConfig};
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::error::VoiceError;

pub type ClientTx = tokio::sync::mpsc::Sender<ClientEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<ServerEvent>;
type ServerTx = tokio::sync::broadcast::Sender<ServerEvent>;

const CHANNEL_CAPACITY: usize = 1024;

/// The connect sequence must fail deterministically rather than hang.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A live full-duplex session with the assistant service.
pub struct ChannelHandle {
    client_tx: ClientTx,
    server_tx: ServerTx,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ChannelHandle {
    /// Builds a handle around pre-wired channels. Production code attaches
    /// the socket pump tasks afterwards; tests drive the channels directly.
    pub fn new(client_tx: ClientTx, server_tx: ServerTx) -> Self {
        Self {
            client_tx,
            server_tx,
            tasks: Vec::new(),
        }
    }

    fn with_task(mut self, task: tokio::task::JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn sender(&self) -> ClientTx {
        self.client_tx.clone()
    }

    pub fn subscribe(&self) -> ServerRx {
        self.server_tx.subscribe()
    }

    /// Tears the socket pumps down. Safe to call more than once.
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Seam for opening the signaling channel, mockable in session tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait(?Send)]
pub trait Signaling {
    /// Mints a credential, opens the session, and sends `config` as the
    /// initial `session.update`.
    async fn connect(&mut self, config: SessionConfig) -> Result<ChannelHandle, VoiceError>;
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    client_secret: Option<ClientSecret>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(serde::Deserialize)]
struct ClientSecret {
    value: String,
}

fn credential_from_response(body: TokenResponse) -> Result<SecretString, VoiceError> {
    if let Some(secret) = body.client_secret {
        return Ok(SecretString::from(secret.value));
    }
    let message = body
        .message
        .or(body.error)
        .unwrap_or_else(|| "token endpoint returned no credential".to_string());
    Err(VoiceError::Config(message))
}

pub struct RealtimeSignaling {
    http: reqwest::Client,
    token_endpoint: String,
    realtime_url: String,
}

impl RealtimeSignaling {
    pub fn new(token_endpoint: &str, realtime_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_endpoint: token_endpoint.to_string(),
            realtime_url: realtime_url.to_string(),
        }
    }

    /// Fetches a short-lived connection credential for the requested voice.
    /// A structured error body means the assistant is not provisioned;
    /// transport failures are connect errors.
    async fn fetch_credential(&self, voice: &str) -> Result<SecretString, VoiceError> {
        let url = format!("{}?voice={}", self.token_endpoint, voice);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| VoiceError::Connect(format!("token request failed: {}", e)))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Connect(format!("malformed token response: {}", e)))?;

        credential_from_response(body)
    }

    async fn open_socket(
        &self,
        credential: &SecretString,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        VoiceError,
    > {
        let mut request = self
            .realtime_url
            .clone()
            .into_client_request()
            .map_err(|e| VoiceError::Connect(format!("bad realtime url: {}", e)))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", credential.expose_secret())
                .parse()
                .map_err(|e| VoiceError::Connect(format!("bad credential header: {}", e)))?,
        );
        request.headers_mut().insert(
            "OpenAI-Beta",
            "realtime=v1"
                .parse()
                .map_err(|e| VoiceError::Connect(format!("bad header: {}", e)))?,
        );

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| VoiceError::Connect(format!("socket open failed: {}", e)))?;
        Ok(ws_stream)
    }
}

#[async_trait(?Send)]
impl Signaling for RealtimeSignaling {
    async fn connect(&mut self, config: SessionConfig) -> Result<ChannelHandle, VoiceError> {
        let voice = config
            .voice()
            .map(|v| v.as_str().to_string())
            .unwrap_or_default();

        let connect = async {
            let credential = self.fetch_credential(&voice).await?;
            self.open_socket(&credential).await
        };
        let ws_stream = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| VoiceError::Connect("connect timed out".to_string()))??;

        let (mut write, mut read) = ws_stream.split();

        let (client_tx, mut client_rx) =
            tokio::sync::mpsc::channel::<ClientEvent>(CHANNEL_CAPACITY);
        let (server_tx, _) = tokio::sync::broadcast::channel(CHANNEL_CAPACITY);

        // Single consumer: outbound events hit the wire in caller order.
        let send_handle = tokio::spawn(async move {
            while let Some(event) = client_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
        });

        let events = server_tx.clone();
        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        let _ = events.send(ServerEvent::Close {
                            reason: Some(e.to_string()),
                        });
                        return;
                    }
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if let Err(e) = events.send(event) {
                                tracing::error!("failed to forward event: {}", e);
                            }
                        }
                        Err(_) => {
                            let kind = serde_json::from_str::<serde_json::Value>(&text)
                                .ok()
                                .and_then(|v| {
                                    v.get("type").and_then(|t| t.as_str()).map(str::to_string)
                                });
                            tracing::debug!("ignoring inbound event: {:?}", kind);
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(frame) => {
                        tracing::info!("connection closed: {:?}", frame);
                        let _ = events.send(ServerEvent::Close {
                            reason: frame.map(|f| f.reason.to_string()),
                        });
                        return;
                    }
                    _ => {}
                }
            }
            let _ = events.send(ServerEvent::Close { reason: None });
        });

        // Initial reconfiguration carrying voice, turn detection, and tools.
        client_tx
            .send(ClientEvent::SessionUpdate(SessionUpdateEvent::new(config)))
            .await
            .map_err(|e| VoiceError::Connect(format!("initial session.update failed: {}", e)))?;

        Ok(ChannelHandle::new(client_tx, server_tx)
            .with_task(send_handle)
            .with_task(recv_handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_parses_from_token_body() {
        let body: TokenResponse =
            serde_json::from_str(r#"{"client_secret":{"value":"ek_abc"}}"#).unwrap();
        let secret = credential_from_response(body).unwrap();
        assert_eq!(secret.expose_secret(), "ek_abc");
    }

    #[test]
    fn provisioning_error_surfaces_as_config_error() {
        let body: TokenResponse = serde_json::from_str(
            r#"{"error":"not_configured","message":"OpenAI API key not configured"}"#,
        )
        .unwrap();
        match credential_from_response(body) {
            Err(VoiceError::Config(message)) => {
                assert_eq!(message, "OpenAI API key not configured");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_token_body_is_a_config_error() {
        let body: TokenResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            credential_from_response(body),
            Err(VoiceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn handle_close_is_idempotent() {
        let (client_tx, _client_rx) = tokio::sync::mpsc::channel(8);
        let (server_tx, _) = tokio::sync::broadcast::channel(8);
        let mut handle = ChannelHandle::new(client_tx, server_tx);
        handle.close();
        handle.close();
    }
}
