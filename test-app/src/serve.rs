// Local stand-in SpyServer for exercising the client without hardware.
//
// Accepts any number of clients. Each connection gets DEVICE_INFO and
// CLIENT_SYNC after its HELLO, honours SET_SETTING for streaming, gain,
// frequency, and IQ format, and while streaming sends one frame of uniform
// noise per tick in the requested format.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use spyserver::protocol::{ClientSync, DeviceInfo, MessageKind, Setting, StreamFormat};
use spyserver_test_harness::frames::{self, RecordedCommand, airspy_one_info, read_command};

/// Hardware the mock server pretends to front.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MockDevice {
    AirspyOne,
    AirspyHf,
    RtlSdr,
}

impl MockDevice {
    pub fn device_info(self) -> DeviceInfo {
        match self {
            MockDevice::AirspyOne => airspy_one_info(),
            MockDevice::AirspyHf => DeviceInfo {
                device_type: 2,
                device_serial: 0x3C52_0A11,
                maximum_sample_rate: 768_000,
                maximum_bandwidth: 660_000,
                decimation_stage_count: 4,
                gain_stage_count: 9,
                maximum_gain_index: 8,
                minimum_frequency: 9_000,
                maximum_frequency: 260_000_000,
                resolution: 18,
                minimum_iq_decimation: 0,
                forced_iq_format: 0,
            },
            MockDevice::RtlSdr => DeviceInfo {
                device_type: 3,
                device_serial: 0x0000_0001,
                maximum_sample_rate: 2_400_000,
                maximum_bandwidth: 2_000_000,
                decimation_stage_count: 6,
                gain_stage_count: 29,
                maximum_gain_index: 28,
                minimum_frequency: 24_000_000,
                maximum_frequency: 1_766_000_000,
                resolution: 8,
                minimum_iq_decimation: 0,
                forced_iq_format: u32::from(StreamFormat::Uint8),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeOptions {
    pub bind: String,
    pub device: MockDevice,
    pub samples_per_frame: usize,
    pub interval: Duration,
    /// Clients allowed to change gain and frequency.
    pub allow_control: bool,
}

pub async fn run(options: ServeOptions) -> Result<()> {
    let listener = TcpListener::bind(&options.bind)
        .await
        .with_context(|| format!("failed to bind {}", options.bind))?;
    let local = listener.local_addr()?;
    let info = options.device.device_info();
    tracing::info!(
        addr = %local,
        device = info.device().display_name(),
        "Mock SpyServer listening"
    );
    println!("Mock SpyServer ({}) listening on {local}", info.device().display_name());

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                return Ok(());
            }
        };
        tracing::info!(peer = %peer, "Client connected");

        let options = options.clone();
        tokio::spawn(async move {
            match handle_client(stream, &options).await {
                Ok(()) => tracing::info!(peer = %peer, "Client disconnected"),
                Err(e) => tracing::warn!(peer = %peer, error = %e, "Client session failed"),
            }
        });
    }
}

/// Per-connection server state.
struct Session {
    info: DeviceInfo,
    sync: ClientSync,
    format: StreamFormat,
    decimation: u32,
    streaming: bool,
    sequence: u32,
    rng: StdRng,
}

impl Session {
    fn new(info: DeviceInfo, allow_control: bool) -> Self {
        let center = info.minimum_frequency.max(100_000_000).min(info.maximum_frequency);
        let format = match info.forced_format() {
            Some(format) => format,
            None => StreamFormat::Int16,
        };
        Session {
            info,
            sync: ClientSync {
                can_control: allow_control as u32,
                gain: info.maximum_gain_index / 2,
                device_center_frequency: center,
                iq_center_frequency: center,
                fft_center_frequency: center,
                minimum_iq_center_frequency: info.minimum_frequency,
                maximum_iq_center_frequency: info.maximum_frequency,
                minimum_fft_center_frequency: info.minimum_frequency,
                maximum_fft_center_frequency: info.maximum_frequency,
            },
            format,
            decimation: info.minimum_iq_decimation,
            streaming: false,
            sequence: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Apply a SET_SETTING. Returns true when CLIENT_SYNC should be resent.
    fn apply(&mut self, setting: u32, value: u32) -> bool {
        let can_control = self.sync.can_control();
        match setting {
            s if s == Setting::StreamingEnabled as u32 => {
                self.streaming = value != 0;
                tracing::info!(
                    streaming = self.streaming,
                    stage = self.decimation,
                    format = ?self.format,
                    "Streaming toggled"
                );
                false
            }
            s if s == Setting::Gain as u32 && can_control => {
                self.sync.gain = value.min(self.info.maximum_gain_index);
                true
            }
            s if s == Setting::IqFrequency as u32 && can_control => {
                let freq = value.clamp(self.info.minimum_frequency, self.info.maximum_frequency);
                self.sync.iq_center_frequency = freq;
                self.sync.device_center_frequency = freq;
                true
            }
            s if s == Setting::IqFormat as u32 => {
                if self.info.forced_format().is_none() {
                    self.format = StreamFormat::from(value);
                }
                false
            }
            s if s == Setting::IqDecimation as u32 => {
                self.decimation = value;
                tracing::debug!(stage = value, "Decimation set");
                false
            }
            other => {
                tracing::debug!(setting = other, value = value, "Setting ignored");
                false
            }
        }
    }

    fn next_sequence(&mut self) -> u32 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        seq
    }

    fn frame(&mut self, kind: MessageKind, body: &[u8]) -> Vec<u8> {
        let sequence = self.next_sequence();
        frames::message_frame_with_sequence(kind, 0, sequence, body)
    }

    fn noise_frame(&mut self, samples: usize) -> Vec<u8> {
        let (kind, body) = match self.format {
            StreamFormat::Uint8 => {
                let body: Vec<u8> = (0..samples * 2)
                    .map(|_| self.rng.gen_range(96u8..=160))
                    .collect();
                (MessageKind::Uint8Iq, body)
            }
            StreamFormat::Float => {
                let mut body = Vec::with_capacity(samples * 8);
                for _ in 0..samples * 2 {
                    let v: f32 = self.rng.gen_range(-0.25..=0.25);
                    body.extend_from_slice(&v.to_le_bytes());
                }
                (MessageKind::FloatIq, body)
            }
            StreamFormat::Int24 => {
                let body: Vec<u8> = (0..samples * 6).map(|_| self.rng.gen_range(0..=255)).collect();
                (MessageKind::Int24Iq, body)
            }
            _ => {
                let mut body = Vec::with_capacity(samples * 4);
                for _ in 0..samples * 2 {
                    let v: i16 = self.rng.gen_range(-8192..=8192);
                    body.extend_from_slice(&v.to_le_bytes());
                }
                (MessageKind::Int16Iq, body)
            }
        };
        self.frame(kind, &body)
    }
}

async fn handle_client(stream: TcpStream, options: &ServeOptions) -> Result<()> {
    stream.set_nodelay(true)?;
    let (read, mut write) = stream.into_split();

    // Commands are read on their own task so a half-read command is never
    // abandoned when the frame timer fires.
    let (tx, mut commands) = mpsc::channel(32);
    let reader = tokio::spawn(read_commands(read, tx));

    let hello = commands.recv().await.context("client sent no handshake")?;
    let (Some(version), Some(app)) = (hello.protocol_version(), hello.app_name()) else {
        bail!("expected HELLO, got command {}", hello.command_type);
    };
    tracing::info!(app = %app, version = %format!("0x{version:08X}"), "Handshake");

    let mut session = Session::new(options.device.device_info(), options.allow_control);
    let info_body = session.info.encode();
    let frame = session.frame(MessageKind::DeviceInfo, &info_body);
    write.write_all(&frame).await?;
    let sync_body = session.sync.encode();
    let frame = session.frame(MessageKind::ClientSync, &sync_body);
    write.write_all(&frame).await?;

    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break Ok(()) };
                let Some((setting, value)) = command.setting() else {
                    tracing::debug!(command = command.command_type, "Command ignored");
                    continue;
                };
                if session.apply(setting, value) {
                    let sync_body = session.sync.encode();
                    let frame = session.frame(MessageKind::ClientSync, &sync_body);
                    if let Err(e) = write.write_all(&frame).await {
                        break Err(e.into());
                    }
                }
            }
            _ = ticker.tick(), if session.streaming => {
                let frame = session.noise_frame(options.samples_per_frame);
                if let Err(e) = write.write_all(&frame).await {
                    break Err(e.into());
                }
            }
        }
    };

    reader.abort();
    result
}

async fn read_commands(mut read: OwnedReadHalf, tx: mpsc::Sender<RecordedCommand>) {
    loop {
        let command = match read_command(&mut read).await {
            Ok(command) => command,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                tracing::warn!(error = %e, "Malformed command, dropping client");
                return;
            }
            Err(_) => return,
        };
        if tx.send(command).await.is_err() {
            return;
        }
    }
}
