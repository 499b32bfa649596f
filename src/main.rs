use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use rubato::Resampler;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::fmt::time::ChronoLocal;

use sndctl_voice::capture::MicCapture;
use sndctl_voice::channel::RealtimeSignaling;
use sndctl_voice::config::{Config, OUTPUT_CHUNK_SIZE, OUTPUT_LATENCY_MS};
use sndctl_voice::device_api::HttpDeviceApi;
use sndctl_voice::dispatch::FunctionDispatcher;
use sndctl_voice::session::{SessionCommand, SessionController, SessionNotice, SessionState};
use sndctl_voice_types::audio::Voice;
use sndctl_voice_utils::audio;
use sndctl_voice_utils::device;

#[derive(Parser)]
#[command(about = "Voice control for networked speakers")]
struct Cli {
    /// Assistant voice, overriding the environment
    #[arg(long)]
    voice: Option<Voice>,

    /// Turn-detection sensitivity between 0.0 and 1.0
    #[arg(long)]
    threshold: Option<f32>,

    /// Input device name, default device when omitted
    #[arg(long)]
    input_device: Option<String>,

    /// Output device name, default device when omitted
    #[arg(long)]
    output_device: Option<String>,

    /// List available input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();
    if args.list_devices {
        println!("{}", device::describe_inputs()?);
        return Ok(());
    }

    let voice = args.voice.unwrap_or(config.voice.clone());
    let threshold = args.threshold.unwrap_or(config.turn_detection_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("threshold must be between 0.0 and 1.0, got {}", threshold);
    }

    // Output device, driven by a ring buffer the playback pump fills.
    let output = device::get_or_default_output(args.output_device.clone())
        .context("Failed to get audio output device")?;
    tracing::info!("Using output device: {:?}", output.name()?);

    let output_config = output
        .default_output_config()
        .context("Failed to get default output config")?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
    };
    let output_channel_count = output_config.channels as usize;
    let output_sample_rate = output_config.sample_rate.0 as f64;

    let out_buffer =
        audio::shared_buffer(output_sample_rate as usize * OUTPUT_LATENCY_MS / 1000);
    let (mut out_producer, mut out_consumer) = out_buffer.split();

    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        for frame in data.chunks_mut(output_channel_count) {
            let sample = out_consumer.try_pop().unwrap_or(0.0);
            // Duplicate mono onto every output channel.
            for slot in frame.iter_mut() {
                *slot = sample;
            }
        }
    };
    let output_stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("An error occurred on output stream: {}", err),
        None,
    )?;
    output_stream.play()?;

    // Pump: assistant chunks arrive at the service rate and get resampled to
    // the device rate before entering the ring buffer.
    let (playback_tx, mut playback_rx) = tokio::sync::mpsc::channel::<Vec<f32>>(100);
    let mut out_resampler =
        audio::create_resampler(audio::SERVICE_PCM16_SAMPLE_RATE, output_sample_rate, 100)?;
    let pump = tokio::spawn(async move {
        while let Some(samples) = playback_rx.recv().await {
            let chunk_size = out_resampler.input_frames_next();
            for chunk in audio::split_for_chunks(&samples, chunk_size) {
                if let Ok(resampled) = out_resampler.process(&[chunk.as_slice()], None) {
                    if let Some(resampled) = resampled.first() {
                        for sample in resampled {
                            if out_producer.try_push(*sample).is_err() {
                                tracing::warn!("output buffer full, dropping sample");
                            }
                        }
                    }
                }
            }
        }
    });

    let signaling = RealtimeSignaling::new(&config.token_endpoint, &config.realtime_url);
    let capture = MicCapture::new(args.input_device);
    let api = HttpDeviceApi::new(&config.device_api_url)?;
    let dispatcher = FunctionDispatcher::new(Arc::new(api));

    let mut controller = SessionController::new(
        Box::new(signaling),
        Box::new(capture),
        dispatcher,
        playback_tx,
        voice,
        threshold,
    );

    let mut notices = controller.subscribe_notices();
    let printer = tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                SessionNotice::State(SessionState::Listening) => println!("● listening"),
                SessionNotice::State(SessionState::Idle) => println!("○ idle"),
                SessionNotice::State(_) => {}
                SessionNotice::User(text) => println!("you: {}", text),
                SessionNotice::Assistant { text, streaming } => {
                    if !streaming {
                        println!("assistant: {}", text);
                    }
                }
                SessionNotice::Error(message) => eprintln!("error: {}", message),
            }
        }
    });

    let (command_tx, command_rx) = tokio::sync::mpsc::channel::<SessionCommand>(32);
    let stdin_commands = command_tx.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "q" | "quit" => SessionCommand::Stop,
                _ => SessionCommand::Toggle,
            };
            if stdin_commands.send(command).await.is_err() {
                break;
            }
        }
    });

    println!("Press Enter to start or stop a conversation, Ctrl-C to exit.");

    // cpal streams are not Send, so the session runs on this task.
    tokio::select! {
        _ = controller.run(command_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    controller.teardown();

    printer.abort();
    pump.abort();
    Ok(())
}
