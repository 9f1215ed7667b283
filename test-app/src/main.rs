// spyserver test application -- CLI tool for exercising the SpyServer
// client against a real server or the built-in mock.
//
// Usage:
//   spyserver-test-app --host 192.168.1.50 info
//   spyserver-test-app --host 192.168.1.50 probe
//   spyserver-test-app --host 192.168.1.50 freq set 145500000
//   spyserver-test-app --host 192.168.1.50 gain get
//   spyserver-test-app --host 192.168.1.50 rate list
//   spyserver-test-app --host 192.168.1.50 stream --duration 10 --rate 2500000
//   spyserver-test-app serve --bind 127.0.0.1:5555 --device rtl-sdr
//
// Logging is controlled with RUST_LOG (default: info for the spyserver
// crates, debug with -v), e.g. RUST_LOG=spyserver_client=trace.

mod serve;

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use spyserver::protocol::{DEFAULT_PORT, PROTOCOL_VERSION};
use spyserver::{Complex32, Error, IqStream, SpyServerBuilder, SpyServerDevice};

use crate::serve::{MockDevice, ServeOptions};

/// Samples requested per read in the `stream` command.
const READ_CHUNK: usize = 16_384;

/// Per-read timeout in the `stream` command.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// spyserver test application -- talks to a SpyServer from the command line.
#[derive(Parser)]
#[command(name = "spyserver-test-app", version, about)]
struct Cli {
    /// SpyServer host name or IP address.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// SpyServer TCP port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Application name sent in the handshake.
    #[arg(long, default_value = "spyserver-test-app")]
    app_name: String,

    /// Sample batches buffered before the oldest is dropped.
    #[arg(long, default_value_t = spyserver::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Milliseconds to wait for the server's metadata after connecting.
    #[arg(long, default_value_t = 1000)]
    sync_timeout_ms: u64,

    /// Log at debug level when RUST_LOG is not set.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print device identity, tuning, and capabilities.
    Info,

    /// Connect briefly and print the device summary.
    Probe,

    /// Frequency operations.
    Freq {
        #[command(subcommand)]
        action: FreqAction,
    },

    /// Gain operations.
    Gain {
        #[command(subcommand)]
        action: GainAction,
    },

    /// Sample rate operations.
    Rate {
        #[command(subcommand)]
        action: RateAction,
    },

    /// Stream IQ samples and report throughput, power, and overflows.
    Stream {
        /// Duration in seconds.
        #[arg(long, default_value_t = 5)]
        duration: u64,

        /// Tune to this frequency (Hz) first.
        #[arg(long)]
        frequency: Option<u32>,

        /// Select this sample rate (S/s) first.
        #[arg(long)]
        rate: Option<f64>,

        /// Set this gain index first.
        #[arg(long)]
        gain: Option<u32>,
    },

    /// Run a local mock SpyServer that streams noise.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:5555")]
        bind: String,

        /// Hardware to impersonate.
        #[arg(long, value_enum, default_value = "airspy-one")]
        device: MockDevice,

        /// Complex samples per IQ frame.
        #[arg(long, default_value_t = 4096)]
        samples_per_frame: usize,

        /// Milliseconds between IQ frames.
        #[arg(long, default_value_t = 10)]
        interval_ms: u64,

        /// Refuse gain and frequency changes from clients.
        #[arg(long)]
        read_only: bool,
    },
}

#[derive(Subcommand)]
enum FreqAction {
    /// Read the IQ centre frequency.
    Get,
    /// Set the IQ centre frequency.
    Set {
        /// Frequency in hertz (e.g. 145500000).
        freq_hz: u32,
    },
}

#[derive(Subcommand)]
enum GainAction {
    /// Read the gain index and allowed range.
    Get,
    /// Set the gain index.
    Set {
        /// Gain index (0 to the device maximum).
        gain: u32,
    },
}

#[derive(Subcommand)]
enum RateAction {
    /// List the supported sample rates.
    List,
    /// Select a sample rate.
    Set {
        /// Sample rate in samples per second; must match a listed rate.
        rate: f64,
    },
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn format_freq(hz: f64) -> String {
    let mhz = hz / 1_000_000.0;
    format!("{mhz:.6} MHz")
}

fn format_rate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.3} MS/s", rate / 1_000_000.0)
    } else {
        format!("{:.3} kS/s", rate / 1_000.0)
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "spyserver_client={level},spyserver_transport={level},spyserver_test_app={level}"
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn open_device(cli: &Cli) -> Result<SpyServerDevice> {
    SpyServerBuilder::new()
        .host(&cli.host)
        .port(cli.port)
        .app_name(&cli.app_name)
        .queue_capacity(cli.queue_capacity)
        .sync_timeout(Duration::from_millis(cli.sync_timeout_ms))
        .build()
        .await
        .with_context(|| format!("failed to open SpyServer at {}:{}", cli.host, cli.port))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_info(device: &SpyServerDevice) -> Result<()> {
    let summary = device.summary()?;
    let hw = device.hardware_info()?;
    let gain = device.gain_range()?;
    let freq = device.frequency_range()?;

    println!("SpyServer Device");
    println!("  Driver:         {}", device.driver_key());
    println!("  URL:            {}", summary.url);
    println!("  Device:         {}", summary.device);
    println!("  Serial:         {}", summary.serial);
    println!(
        "  Protocol:       {} (0x{PROTOCOL_VERSION:08X})",
        hw.protocol_version
    );
    println!("  Full control:   {}", device.can_control()?);
    println!();
    println!("Tuning");
    println!("  Frequency:      {}", format_freq(device.frequency()? as f64));
    println!(
        "  Freq range:     {} - {}",
        format_freq(freq.minimum),
        format_freq(freq.maximum)
    );
    println!("  Gain:           {}", device.gain()?);
    println!("  Gain range:     {} - {}", gain.minimum, gain.maximum);
    println!("  Sample rate:    {}", format_rate(device.sample_rate()));
    println!(
        "  Sample rates:   {}",
        device
            .sample_rates()
            .iter()
            .map(|r| format_rate(*r))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

async fn cmd_probe(cli: &Cli) -> Result<()> {
    let summary = SpyServerDevice::probe(&cli.host, cli.port)
        .await
        .with_context(|| format!("no SpyServer answered at {}:{}", cli.host, cli.port))?;
    println!("Found {} (serial {}) at {}", summary.device, summary.serial, summary.url);
    Ok(())
}

async fn cmd_freq_set(device: &SpyServerDevice, freq_hz: u32) -> Result<()> {
    let range = device.frequency_range()?;
    if !range.contains(freq_hz as f64) {
        bail!(
            "{} is outside {} - {}",
            format_freq(freq_hz as f64),
            format_freq(range.minimum),
            format_freq(range.maximum)
        );
    }
    device.set_frequency(freq_hz).await?;
    println!("Frequency set to {}", format_freq(freq_hz as f64));
    Ok(())
}

fn cmd_gain_get(device: &SpyServerDevice) -> Result<()> {
    let range = device.gain_range()?;
    println!(
        "Gain: {} (range {} - {}, control {})",
        device.gain()?,
        range.minimum,
        range.maximum,
        if device.can_control()? { "granted" } else { "denied" }
    );
    Ok(())
}

async fn cmd_gain_set(device: &SpyServerDevice, gain: u32) -> Result<()> {
    device.set_gain(gain).await?;
    println!("Gain set to {gain}");
    Ok(())
}

fn cmd_rate_list(device: &SpyServerDevice) -> Result<()> {
    let current = device.sample_rate();
    for rate in device.sample_rates() {
        let marker = if rate == current { "*" } else { " " };
        println!("{marker} {:>12.0}  {}", rate, format_rate(rate));
    }
    Ok(())
}

async fn cmd_rate_set(device: &SpyServerDevice, rate: f64) -> Result<()> {
    device.set_sample_rate(rate).await?;
    println!("Sample rate set to {}", format_rate(rate));
    Ok(())
}

/// Counters gathered by the `stream` reader thread.
#[derive(Default)]
struct StreamReport {
    samples: u64,
    reads: u64,
    timeouts: u64,
    overflows: u64,
    power_sum: f64,
    elapsed: Duration,
    error: Option<Error>,
}

fn read_for(stream: &mut IqStream, duration: Duration) -> StreamReport {
    let mut report = StreamReport::default();
    let mut buf = vec![Complex32::default(); READ_CHUNK];
    let start = Instant::now();

    while start.elapsed() < duration {
        // Checked before each read, since a timed dequeue clears the flag.
        if stream.overflow() {
            report.overflows += 1;
        }
        match stream.read(&mut buf, READ_TIMEOUT) {
            Ok(n) => {
                report.samples += n as u64;
                report.reads += 1;
                report.power_sum += buf[..n].iter().map(|s| s.norm_sqr() as f64).sum::<f64>();
            }
            Err(Error::Timeout) => report.timeouts += 1,
            Err(e) => {
                report.error = Some(e);
                break;
            }
        }
    }

    report.elapsed = start.elapsed();
    report
}

async fn cmd_stream(
    device: &SpyServerDevice,
    duration_secs: u64,
    frequency: Option<u32>,
    rate: Option<f64>,
    gain: Option<u32>,
) -> Result<()> {
    if let Some(rate) = rate {
        device.set_sample_rate(rate).await?;
    }
    if let Some(freq_hz) = frequency {
        device.set_frequency(freq_hz).await?;
    }
    if let Some(gain) = gain {
        device.set_gain(gain).await?;
    }

    let mut stream = device.setup_stream()?;
    device.activate_stream(&stream).await?;
    println!(
        "Streaming {} at {} for {duration_secs} s...",
        format_rate(device.sample_rate()),
        format_freq(device.frequency()? as f64)
    );

    let duration = Duration::from_secs(duration_secs);
    let (stream, report) = tokio::task::spawn_blocking(move || {
        let report = read_for(&mut stream, duration);
        (stream, report)
    })
    .await
    .context("reader thread panicked")?;

    if device.is_open() {
        device.close_stream(stream).await?;
    }

    let secs = report.elapsed.as_secs_f64();
    let effective = if secs > 0.0 {
        report.samples as f64 / secs
    } else {
        0.0
    };
    let mean_power = if report.samples > 0 {
        report.power_sum / report.samples as f64
    } else {
        0.0
    };
    let stats = device.client().stats();

    println!();
    println!("Results:");
    println!("  Samples:        {}", report.samples);
    println!("  Reads:          {}", report.reads);
    println!("  Elapsed:        {secs:.3} s");
    println!("  Rate:           {}", format_rate(effective));
    if mean_power > 0.0 {
        println!("  Mean power:     {:.1} dBFS", 10.0 * mean_power.log10());
    }
    println!("  Timeouts:       {}", report.timeouts);
    println!("  Overflows:      {}", report.overflows);
    println!("  Frames:         {}", stats.frames_received);
    println!("  Rejected:       {}", stats.frames_rejected);

    if let Some(e) = report.error {
        bail!("stream ended early: {e}");
    }
    if report.samples == 0 {
        bail!("no samples received in {duration_secs} s");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // These commands do not need an open device.
    match &cli.command {
        Command::Serve {
            bind,
            device,
            samples_per_frame,
            interval_ms,
            read_only,
        } => {
            if *samples_per_frame == 0 {
                bail!("--samples-per-frame must be at least 1");
            }
            return serve::run(ServeOptions {
                bind: bind.clone(),
                device: *device,
                samples_per_frame: *samples_per_frame,
                interval: Duration::from_millis((*interval_ms).max(1)),
                allow_control: !*read_only,
            })
            .await;
        }
        Command::Probe => return cmd_probe(&cli).await,
        _ => {}
    }

    let device = open_device(&cli).await?;

    let result = match &cli.command {
        Command::Info => cmd_info(&device),
        Command::Freq { action } => match action {
            FreqAction::Get => {
                println!("{}", format_freq(device.frequency()? as f64));
                Ok(())
            }
            FreqAction::Set { freq_hz } => cmd_freq_set(&device, *freq_hz).await,
        },
        Command::Gain { action } => match action {
            GainAction::Get => cmd_gain_get(&device),
            GainAction::Set { gain } => cmd_gain_set(&device, *gain).await,
        },
        Command::Rate { action } => match action {
            RateAction::List => cmd_rate_list(&device),
            RateAction::Set { rate } => cmd_rate_set(&device, *rate).await,
        },
        Command::Stream {
            duration,
            frequency,
            rate,
            gain,
        } => cmd_stream(&device, *duration, *frequency, *rate, *gain).await,
        Command::Serve { .. } | Command::Probe => unreachable!("handled above"),
    };

    device.close().await.ok();
    result
}
