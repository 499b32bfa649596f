/// Failure taxonomy for the voice session.
///
/// `Config` and `Device` are setup problems the user has to fix; `Connect`
/// and `ChannelClosed` end the session without automatic retry so a flaky
/// link cannot hammer the metered remote service; `Remote` is surfaced but
/// leaves the session connected.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Assistant not provisioned, or the credential is missing or invalid.
    #[error("assistant not configured: {0}")]
    Config(String),

    /// Microphone denied, unavailable, or its track ended.
    #[error("microphone unavailable: {0}")]
    Device(String),

    /// Credential or socket failure while connecting.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// The service closed the channel unexpectedly.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// An `error` event from the service.
    #[error("assistant error: {0}")]
    Remote(String),
}
