//! Realtime voice control for networked speakers.
//!
//! Captures microphone audio, streams it to a speech-to-speech assistant
//! service over a persistent websocket, and turns the assistant's function
//! calls into speaker-control REST requests. Assistant speech is played back
//! locally with sample-accurate interruption when the user talks over it.

pub mod capture;
pub mod channel;
pub mod config;
pub mod device_api;
pub mod dispatch;
pub mod error;
pub mod playback;
pub mod session;

pub use config::Config;
pub use error::VoiceError;
pub use session::{SessionCommand, SessionController, SessionNotice, SessionState};
