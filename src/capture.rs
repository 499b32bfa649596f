//! Microphone capture.
//!
//! Frames arrive on a bounded channel as fixed-size mono `f32` chunks at the
//! device's native rate. Acquiring the device is separate from starting the
//! stream so a permission failure can be reported before any signaling
//! happens.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use tokio::sync::mpsc;

use crate::config::CAPTURE_CHUNK_SIZE;
use crate::error::VoiceError;
use sndctl_voice_utils::device;

/// One message from the input stream: a mono block of samples, or the
/// stream reporting its own death so the session loop can react.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Frame(Vec<f32>),
    Failed(String),
}

/// Seam for the capture pipeline, mockable in session tests.
#[cfg_attr(test, mockall::automock)]
pub trait AudioCapture {
    /// Opens the input device and validates its configuration. Fails with
    /// `VoiceError::Device` when no usable microphone is available.
    fn acquire(&mut self) -> Result<(), VoiceError>;

    /// Starts the stream and returns the capture channel.
    fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, VoiceError>;

    /// Native sample rate of the acquired device.
    fn sample_rate(&self) -> u32;

    /// Probes whether the device still answers, used after the host resumes
    /// from suspend.
    fn check_health(&self) -> bool;

    /// Stops the stream and releases the device. Safe to call repeatedly.
    fn stop(&mut self);
}

pub struct MicCapture {
    device_name: Option<String>,
    device: Option<cpal::Device>,
    stream: Option<cpal::Stream>,
    sample_rate: u32,
    channels: u16,
}

impl MicCapture {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            device: None,
            stream: None,
            sample_rate: 0,
            channels: 0,
        }
    }
}

impl AudioCapture for MicCapture {
    fn acquire(&mut self) -> Result<(), VoiceError> {
        let device = device::get_or_default_input(self.device_name.clone())
            .map_err(|e| VoiceError::Device(e.to_string()))?;
        let config = device
            .default_input_config()
            .map_err(|e| VoiceError::Device(format!("no input config: {}", e)))?;
        if config.channels() == 0 {
            return Err(VoiceError::Device(
                "input device reports zero channels".to_string(),
            ));
        }
        tracing::info!(
            "using input device {:?} at {} Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            config.sample_rate().0,
            config.channels()
        );
        self.sample_rate = config.sample_rate().0;
        self.channels = config.channels();
        self.device = Some(device);
        Ok(())
    }

    fn start(&mut self) -> Result<mpsc::Receiver<CaptureEvent>, VoiceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| VoiceError::Device("capture not acquired".to_string()))?;

        let config = StreamConfig {
            channels: self.channels,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: BufferSize::Fixed(CAPTURE_CHUNK_SIZE as u32),
        };

        let (frame_tx, frame_rx) = mpsc::channel::<CaptureEvent>(32);
        let error_tx = frame_tx.clone();
        let channels = self.channels as usize;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _| {
                    // Downmix interleaved frames to mono by averaging.
                    let mono: Vec<f32> = data
                        .chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                        .collect();
                    // Drop the frame when the session loop is behind; stale
                    // audio is worse than a gap.
                    if let Err(mpsc::error::TrySendError::Closed(_)) =
                        frame_tx.try_send(CaptureEvent::Frame(mono))
                    {
                        tracing::debug!("capture channel closed, dropping frame");
                    }
                },
                move |e| {
                    tracing::error!("input stream error: {}", e);
                    // Surface the failure to the session loop as well, so a
                    // dead stream never leaves us listening to silence.
                    let _ = error_tx.try_send(CaptureEvent::Failed(e.to_string()));
                },
                None,
            )
            .map_err(|e| VoiceError::Device(format!("failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| VoiceError::Device(format!("failed to start input stream: {}", e)))?;
        self.stream = Some(stream);
        Ok(frame_rx)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn check_health(&self) -> bool {
        match &self.device {
            Some(device) => device::input_is_healthy(device),
            None => false,
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::info!("input stream stopped");
        }
        self.device = None;
    }
}
