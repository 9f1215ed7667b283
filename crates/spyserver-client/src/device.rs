//! SpyServerDevice -- a receive-only SDR device backed by a SpyServer.
//!
//! Wraps a [`SpyServerClient`] with the view an SDR application expects:
//! one RX channel with a single gain element, a tunable centre frequency, a
//! discrete list of sample rates, and one complex-float stream.
//!
//! Getters read from the cached CLIENT_SYNC / DEVICE_INFO snapshots rather
//! than querying the server, since SpyServer pushes a fresh CLIENT_SYNC
//! whenever tuning or permissions change. Setters send SET_SETTING and
//! return without waiting for the server to acknowledge.
//!
//! SpyServer selects the sample rate by decimation stage, so the list of
//! supported rates is derived once at open time from DEVICE_INFO:
//! `maximum_sample_rate / 2^stage` for each stage from
//! `minimum_iq_decimation` through `decimation_stage_count`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use spyserver_core::error::{Error, Result};
use spyserver_core::protocol::{ClientSync, DeviceInfo, PROTOCOL_VERSION, StreamFormat};

use crate::builder::SpyServerBuilder;
use crate::client::SpyServerClient;
use crate::stream::IqStream;

/// Driver identifier reported by [`SpyServerDevice::driver_key`].
pub const DRIVER_KEY: &str = "spyserver";

/// Name of the only gain element.
pub const GAIN_NAME: &str = "Full";

/// Name of the only antenna.
pub const ANTENNA_NAME: &str = "RX";

/// Tolerance used when matching a requested sample rate against the table.
const SAMPLE_RATE_EPSILON: f64 = 1e-6;

/// Build the `sdr://host:port` URL identifying a server.
pub fn spyserver_url(host: &str, port: u16) -> String {
    format!("sdr://{}:{}", host, port)
}

/// A closed numeric interval with a step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub minimum: f64,
    pub maximum: f64,
    pub step: f64,
}

impl Range {
    pub fn new(minimum: f64, maximum: f64, step: f64) -> Self {
        Range {
            minimum,
            maximum,
            step,
        }
    }

    /// Whether `value` lies within the interval.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }
}

/// Identification details for a connected server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareInfo {
    /// Human-readable hardware name, e.g. "AirSpy One".
    pub device: String,
    /// Hardware serial number, in decimal.
    pub serial: String,
    /// Protocol version this client speaks, in decimal.
    pub protocol_version: String,
}

/// One reachable server, as reported by [`SpyServerDevice::probe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub device: String,
    pub serial: String,
    pub url: String,
}

impl DeviceSummary {
    fn from_info(info: &DeviceInfo, url: String) -> Self {
        DeviceSummary {
            device: info.device().display_name().to_string(),
            serial: info.device_serial.to_string(),
            url,
        }
    }
}

/// A decimation stage and the sample rate it produces.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RateEntry {
    stage: u32,
    rate: f64,
}

/// A SpyServer exposed as a single-channel receive device.
///
/// Constructed via [`SpyServerBuilder`].
pub struct SpyServerDevice {
    client: SpyServerClient,
    url: String,
    sync_timeout: Duration,
    sample_rates: Vec<RateEntry>,
    /// Last rate passed to `set_sample_rate`; the server does not report it.
    sample_rate: parking_lot::Mutex<f64>,
    /// Active flag of the stream handed out by `setup_stream`, if any.
    stream: parking_lot::Mutex<Option<Arc<AtomicBool>>>,
}

impl SpyServerDevice {
    /// Finish opening a device over a connected client.
    ///
    /// Called by [`SpyServerBuilder`]; use the builder instead.
    pub(crate) async fn open(
        client: SpyServerClient,
        url: String,
        sync_timeout: Duration,
    ) -> Result<Self> {
        if !wait_synced(&client, sync_timeout).await {
            tracing::error!(url = %url, "Server never sent device info and client sync");
            let _ = client.close().await;
            return Err(Error::Timeout);
        }

        let (info, sync) = match (client.device_info(), client.client_sync()) {
            (Some(info), Some(sync)) => (info, sync),
            _ => return Err(Error::NotConnected),
        };

        if let Some(format) = info.forced_format() {
            if matches!(format, StreamFormat::Int24 | StreamFormat::Dint4) {
                let _ = client.close().await;
                return Err(Error::Unsupported(format!(
                    "server forces the {:?} IQ format, which cannot be converted",
                    format
                )));
            }
        }

        if !sync.can_control() {
            tracing::warn!(
                url = %url,
                gain_name = GAIN_NAME,
                gain = sync.gain,
                "This server restricts changing gain"
            );
        }

        let sample_rates = derive_sample_rates(&info);
        let Some(first) = sample_rates.first().copied() else {
            let _ = client.close().await;
            return Err(Error::Protocol(format!(
                "server advertises no sample rates (minimum decimation {}, {} stages)",
                info.minimum_iq_decimation, info.decimation_stage_count
            )));
        };

        let device = SpyServerDevice {
            client,
            url,
            sync_timeout,
            sample_rates,
            sample_rate: parking_lot::Mutex::new(first.rate),
            stream: parking_lot::Mutex::new(None),
        };

        // The server has no way to report the current rate, so pick one.
        device.set_sample_rate(first.rate).await?;

        tracing::info!(
            url = %device.url,
            device = info.device().display_name(),
            serial = info.device_serial,
            rates = device.sample_rates.len(),
            "SpyServer device ready"
        );

        Ok(device)
    }

    /// Connect to `host:port` with default settings.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        SpyServerBuilder::new().host(host).port(port).build().await
    }

    /// Connect briefly and report what is behind `host:port`.
    pub async fn probe(host: &str, port: u16) -> Result<DeviceSummary> {
        let client = SpyServerBuilder::new()
            .host(host)
            .port(port)
            .queue_capacity(1)
            .build_client()
            .await?;

        let timeout = SpyServerBuilder::DEFAULT_SYNC_TIMEOUT;
        let synced = wait_synced(&client, timeout).await;
        let info = client.device_info();
        client.close().await?;

        match info {
            Some(info) if synced => Ok(DeviceSummary::from_info(&info, spyserver_url(host, port))),
            _ => Err(Error::Timeout),
        }
    }

    /// Like [`probe`](Self::probe) but returns an empty list instead of an
    /// error when nothing answers.
    pub async fn find(host: &str, port: u16) -> Vec<DeviceSummary> {
        match Self::probe(host, port).await {
            Ok(summary) => vec![summary],
            Err(e) => {
                tracing::debug!(host = %host, port = port, error = %e, "No SpyServer found");
                Vec::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Identification
    // -----------------------------------------------------------------------

    pub fn driver_key(&self) -> &'static str {
        DRIVER_KEY
    }

    /// The `sdr://host:port` URL this device was opened with.
    pub fn hardware_key(&self) -> &str {
        &self.url
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn hardware_info(&self) -> Result<HardwareInfo> {
        let info = self.device_info()?;
        Ok(HardwareInfo {
            device: info.device().display_name().to_string(),
            serial: info.device_serial.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
        })
    }

    pub fn device_name(&self) -> Result<&'static str> {
        Ok(self.device_info()?.device().display_name())
    }

    pub fn summary(&self) -> Result<DeviceSummary> {
        Ok(DeviceSummary::from_info(&self.device_info()?, self.url.clone()))
    }

    /// Whether the server lets this client change gain and frequency.
    pub fn can_control(&self) -> Result<bool> {
        Ok(self.client_sync()?.can_control())
    }

    pub fn antenna(&self) -> &'static str {
        ANTENNA_NAME
    }

    // -----------------------------------------------------------------------
    // Gain
    // -----------------------------------------------------------------------

    /// Current gain index.
    pub fn gain(&self) -> Result<u32> {
        Ok(self.client_sync()?.gain)
    }

    /// Set the gain index.
    ///
    /// Fails with [`Error::Unsupported`] if the server does not grant this
    /// client control.
    pub async fn set_gain(&self, gain: u32) -> Result<()> {
        self.sync().await?;
        if !self.client_sync()?.can_control() {
            return Err(Error::Unsupported(
                "this server does not allow setting gain".into(),
            ));
        }
        self.client.set_gain(gain).await
    }

    /// Allowed gain indices: `0..=maximum_gain_index` with control, or just
    /// the current gain without.
    pub fn gain_range(&self) -> Result<Range> {
        let sync = self.client_sync()?;
        if sync.can_control() {
            let info = self.device_info()?;
            Ok(Range::new(0.0, info.maximum_gain_index as f64, 1.0))
        } else {
            Ok(Range::new(sync.gain as f64, sync.gain as f64, 1.0))
        }
    }

    // -----------------------------------------------------------------------
    // Frequency
    // -----------------------------------------------------------------------

    /// Current IQ centre frequency in hertz.
    pub fn frequency(&self) -> Result<u32> {
        Ok(self.client_sync()?.iq_center_frequency)
    }

    pub async fn set_frequency(&self, freq_hz: u32) -> Result<()> {
        self.client.set_frequency(freq_hz).await
    }

    /// Tunable IQ centre frequency range reported by the server.
    pub fn frequency_range(&self) -> Result<Range> {
        let sync = self.client_sync()?;
        Ok(Range::new(
            sync.minimum_iq_center_frequency as f64,
            sync.maximum_iq_center_frequency as f64,
            1.0,
        ))
    }

    // -----------------------------------------------------------------------
    // Sample rate
    // -----------------------------------------------------------------------

    /// Supported sample rates, highest first.
    pub fn sample_rates(&self) -> Vec<f64> {
        self.sample_rates.iter().map(|entry| entry.rate).collect()
    }

    /// The sample rate most recently selected.
    pub fn sample_rate(&self) -> f64 {
        *self.sample_rate.lock()
    }

    /// Select one of the rates from [`sample_rates`](Self::sample_rates).
    pub async fn set_sample_rate(&self, rate: f64) -> Result<()> {
        let entry = self
            .sample_rates
            .iter()
            .find(|entry| (entry.rate - rate).abs() <= SAMPLE_RATE_EPSILON)
            .copied()
            .ok_or_else(|| Error::InvalidParameter(format!("invalid sample rate: {}", rate)))?;

        self.client.set_decimation(entry.stage).await?;
        *self.sample_rate.lock() = entry.rate;
        tracing::debug!(rate = entry.rate, stage = entry.stage, "Sample rate set");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    /// Create the device's IQ stream. It starts inactive.
    ///
    /// Only one stream may exist at a time.
    pub fn setup_stream(&self) -> Result<IqStream> {
        let mut slot = self.stream.lock();
        if slot.is_some() {
            return Err(Error::InvalidParameter("a stream is already set up".into()));
        }
        let active = Arc::new(AtomicBool::new(false));
        *slot = Some(Arc::clone(&active));
        Ok(IqStream::with_flag(Arc::clone(self.client.queue()), active))
    }

    /// Start streaming samples into `stream`.
    pub async fn activate_stream(&self, stream: &IqStream) -> Result<()> {
        self.check_stream(stream)?;
        if stream.is_active() {
            return Err(Error::InvalidParameter("stream is already active".into()));
        }
        self.client.start_stream().await?;
        self.set_stream_active(stream, true);
        Ok(())
    }

    /// Stop streaming. Samples already queued stay readable once the stream
    /// is activated again.
    pub async fn deactivate_stream(&self, stream: &IqStream) -> Result<()> {
        self.check_stream(stream)?;
        if !stream.is_active() {
            return Err(Error::InvalidParameter("stream is already inactive".into()));
        }
        self.client.stop_stream().await?;
        self.set_stream_active(stream, false);
        Ok(())
    }

    /// Tear down `stream`, stopping the server first if it is active.
    pub async fn close_stream(&self, stream: IqStream) -> Result<()> {
        self.check_stream(&stream)?;
        let was_active = stream.is_active();
        self.set_stream_active(&stream, false);
        *self.stream.lock() = None;

        if was_active && self.client.is_open() {
            self.client.stop_stream().await?;
        }
        Ok(())
    }

    fn check_stream(&self, stream: &IqStream) -> Result<()> {
        match self.stream.lock().as_ref() {
            Some(active) if stream.shares_flag(active) => Ok(()),
            _ => Err(Error::InvalidParameter(
                "stream does not belong to this device".into(),
            )),
        }
    }

    fn set_stream_active(&self, stream: &IqStream, active: bool) {
        if let Some(flag) = self.stream.lock().as_ref() {
            if stream.shares_flag(flag) {
                flag.store(active, Ordering::SeqCst);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Close the connection. Any stream is deactivated.
    pub async fn close(&self) -> Result<()> {
        if let Some(flag) = self.stream.lock().as_ref() {
            flag.store(false, Ordering::SeqCst);
        }
        self.client.close().await
    }

    pub fn is_open(&self) -> bool {
        self.client.is_open()
    }

    /// The underlying protocol client.
    pub fn client(&self) -> &SpyServerClient {
        &self.client
    }

    /// Wait for both metadata snapshots.
    async fn sync(&self) -> Result<()> {
        if wait_synced(&self.client, self.sync_timeout).await {
            Ok(())
        } else {
            Err(Error::Timeout)
        }
    }

    fn device_info(&self) -> Result<DeviceInfo> {
        self.client.device_info().ok_or(Error::NotConnected)
    }

    fn client_sync(&self) -> Result<ClientSync> {
        self.client.client_sync().ok_or(Error::NotConnected)
    }
}

impl std::fmt::Debug for SpyServerDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpyServerDevice")
            .field("url", &self.url)
            .field("sample_rate", &self.sample_rate())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

async fn wait_synced(client: &SpyServerClient, timeout: Duration) -> bool {
    client.wait_for_device_info(timeout).await && client.wait_for_client_sync(timeout).await
}

fn derive_sample_rates(info: &DeviceInfo) -> Vec<RateEntry> {
    (info.minimum_iq_decimation..=info.decimation_stage_count)
        .filter_map(|stage| {
            let divisor = 1u32.checked_shl(stage)?;
            Some(RateEntry {
                stage,
                rate: (info.maximum_sample_rate / divisor) as f64,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use spyserver_core::protocol::{CommandType, Setting};
    use spyserver_core::sample::Complex32;
    use spyserver_test_harness::frames::{self, airspy_one_info, controllable_sync};
    use spyserver_test_harness::{MockPeer, MockSpyServer, duplex_transport};

    async fn open_device(info: DeviceInfo, sync: ClientSync) -> (SpyServerDevice, MockPeer) {
        let (halves, mut peer) = duplex_transport();
        peer.send(&frames::device_info_frame(&info)).await.unwrap();
        peer.send(&frames::client_sync_frame(&sync)).await.unwrap();

        let device = SpyServerBuilder::new()
            .host("radio.local")
            .build_with_transport(halves)
            .await
            .unwrap();

        let hello = peer.read_command().await.unwrap();
        assert_eq!(hello.command_type, CommandType::Hello as u32);
        let decimation = peer.read_command().await.unwrap();
        assert_eq!(
            decimation.setting(),
            Some((Setting::IqDecimation as u32, info.minimum_iq_decimation))
        );
        (device, peer)
    }

    async fn open_error(info: DeviceInfo) -> Error {
        let (halves, mut peer) = duplex_transport();
        peer.send(&frames::device_info_frame(&info)).await.unwrap();
        peer.send(&frames::client_sync_frame(&controllable_sync()))
            .await
            .unwrap();
        SpyServerBuilder::new()
            .host("radio.local")
            .build_with_transport(halves)
            .await
            .unwrap_err()
    }

    #[test]
    fn sample_rate_table_from_device_info() {
        let rates: Vec<f64> = derive_sample_rates(&airspy_one_info())
            .iter()
            .map(|e| e.rate)
            .collect();
        assert_eq!(rates.len(), 8);
        assert_eq!(rates[0], 5_000_000.0);
        assert_eq!(rates[1], 2_500_000.0);
        // Integer division, as the server computes it.
        assert_eq!(rates[7], 39_062.0);
    }

    #[test]
    fn sample_rate_table_empty_when_stages_inverted() {
        let info = DeviceInfo {
            minimum_iq_decimation: 5,
            decimation_stage_count: 4,
            ..airspy_one_info()
        };
        assert!(derive_sample_rates(&info).is_empty());
    }

    #[test]
    fn url_format() {
        assert_eq!(spyserver_url("10.0.0.2", 5555), "sdr://10.0.0.2:5555");
    }

    #[tokio::test]
    async fn open_reports_identity() {
        let (device, _peer) = open_device(airspy_one_info(), controllable_sync()).await;

        assert_eq!(device.driver_key(), "spyserver");
        assert_eq!(device.hardware_key(), "sdr://radio.local:5555");
        assert_eq!(device.device_name().unwrap(), "AirSpy One");

        let hw = device.hardware_info().unwrap();
        assert_eq!(hw.device, "AirSpy One");
        assert_eq!(hw.serial, airspy_one_info().device_serial.to_string());
        assert_eq!(hw.protocol_version, "33556132");

        let summary = device.summary().unwrap();
        assert_eq!(summary.device, hw.device);
        assert_eq!(summary.serial, hw.serial);
        assert_eq!(summary.url, device.url());

        assert_eq!(device.sample_rate(), 5_000_000.0);
        assert_eq!(device.antenna(), "RX");
    }

    #[tokio::test]
    async fn gain_and_frequency_from_sync() {
        let (device, mut peer) = open_device(airspy_one_info(), controllable_sync()).await;
        let sync = controllable_sync();

        assert_eq!(device.gain().unwrap(), sync.gain);
        assert_eq!(device.frequency().unwrap(), sync.iq_center_frequency);
        assert_eq!(device.gain_range().unwrap(), Range::new(0.0, 21.0, 1.0));

        let range = device.frequency_range().unwrap();
        assert_eq!(range.minimum, sync.minimum_iq_center_frequency as f64);
        assert!(range.contains(100_000_000.0));

        device.set_gain(15).await.unwrap();
        device.set_frequency(433_920_000).await.unwrap();

        let gain = peer.read_command().await.unwrap();
        assert_eq!(gain.setting(), Some((Setting::Gain as u32, 15)));
        let freq = peer.read_command().await.unwrap();
        assert_eq!(freq.setting(), Some((Setting::IqFrequency as u32, 433_920_000)));
    }

    #[tokio::test]
    async fn gain_locked_without_control() {
        let sync = ClientSync {
            can_control: 0,
            gain: 8,
            ..controllable_sync()
        };
        let (device, _peer) = open_device(airspy_one_info(), sync).await;

        assert!(!device.can_control().unwrap());
        assert_eq!(device.gain_range().unwrap(), Range::new(8.0, 8.0, 1.0));
        assert!(matches!(device.set_gain(3).await, Err(Error::Unsupported(_))));
    }

    #[tokio::test]
    async fn set_sample_rate_sends_stage() {
        let (device, mut peer) = open_device(airspy_one_info(), controllable_sync()).await;

        device.set_sample_rate(625_000.0).await.unwrap();
        let command = peer.read_command().await.unwrap();
        assert_eq!(command.setting(), Some((Setting::IqDecimation as u32, 4)));
        assert_eq!(device.sample_rate(), 625_000.0);

        let result = device.set_sample_rate(1_000_000.0).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(device.sample_rate(), 625_000.0);
    }

    #[tokio::test]
    async fn forced_int24_is_refused() {
        let info = DeviceInfo {
            forced_iq_format: u32::from(StreamFormat::Int24),
            ..airspy_one_info()
        };
        assert!(matches!(open_error(info).await, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn forced_dint4_is_refused() {
        let info = DeviceInfo {
            forced_iq_format: u32::from(StreamFormat::Dint4),
            ..airspy_one_info()
        };
        assert!(matches!(open_error(info).await, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn forced_uint8_is_accepted() {
        let info = DeviceInfo {
            forced_iq_format: u32::from(StreamFormat::Uint8),
            ..airspy_one_info()
        };
        let (device, _peer) = open_device(info, controllable_sync()).await;
        assert!(device.is_open());
    }

    #[tokio::test]
    async fn open_without_metadata_times_out() {
        let (halves, _peer) = duplex_transport();
        let result = SpyServerBuilder::new()
            .host("radio.local")
            .sync_timeout(Duration::from_millis(50))
            .build_with_transport(halves)
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn stream_lifecycle() {
        let (device, mut peer) = open_device(airspy_one_info(), controllable_sync()).await;

        let stream = device.setup_stream().unwrap();
        assert!(!stream.is_active());
        assert!(matches!(device.setup_stream(), Err(Error::InvalidParameter(_))));
        assert!(matches!(
            device.deactivate_stream(&stream).await,
            Err(Error::InvalidParameter(_))
        ));

        device.activate_stream(&stream).await.unwrap();
        assert!(stream.is_active());
        assert!(matches!(
            device.activate_stream(&stream).await,
            Err(Error::InvalidParameter(_))
        ));
        let start = peer.read_command().await.unwrap();
        assert_eq!(start.setting(), Some((Setting::StreamingEnabled as u32, 1)));

        device.deactivate_stream(&stream).await.unwrap();
        assert!(!stream.is_active());
        let stop = peer.read_command().await.unwrap();
        assert_eq!(stop.setting(), Some((Setting::StreamingEnabled as u32, 0)));

        device.activate_stream(&stream).await.unwrap();
        peer.read_command().await.unwrap();
        device.close_stream(stream).await.unwrap();
        let stop = peer.read_command().await.unwrap();
        assert_eq!(stop.setting(), Some((Setting::StreamingEnabled as u32, 0)));

        // A new stream can be set up once the old one is closed.
        let again = device.setup_stream().unwrap();
        device.close_stream(again).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_stream_is_rejected() {
        let (device, _peer) = open_device(airspy_one_info(), controllable_sync()).await;
        let _own = device.setup_stream().unwrap();
        let foreign = IqStream::new(Arc::clone(device.client().queue()));
        assert!(matches!(
            device.activate_stream(&foreign).await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn samples_flow_through_stream() {
        let (device, mut peer) = open_device(airspy_one_info(), controllable_sync()).await;
        let mut stream = device.setup_stream().unwrap();
        device.activate_stream(&stream).await.unwrap();

        peer.send(&frames::uint8_iq_frame(0, &[(128, 128), (255, 0), (0, 255)]))
            .await
            .unwrap();

        let (stream, read) = tokio::task::spawn_blocking(move || {
            let mut out = [Complex32::default(); 2];
            let first = stream.read(&mut out, Duration::from_secs(2)).unwrap();
            let second = stream.read(&mut out, Duration::from_secs(2)).unwrap();
            (stream, (first, second, out[0]))
        })
        .await
        .unwrap();

        assert_eq!(read.0, 2);
        assert_eq!(read.1, 1);
        assert_eq!(read.2, Complex32::new(-1.0, 0.9921875));

        device.close().await.unwrap();
        assert!(!stream.is_active());
    }

    #[tokio::test]
    async fn probe_and_find_over_tcp() {
        let mut server = MockSpyServer::new().await.unwrap();
        server.wait_for_hello();
        server.push(frames::device_info_frame(&airspy_one_info()));
        server.push(frames::client_sync_frame(&controllable_sync()));
        server.start();

        let summary = SpyServerDevice::probe(server.host(), server.port())
            .await
            .unwrap();
        assert_eq!(summary.device, "AirSpy One");
        assert_eq!(summary.serial, airspy_one_info().device_serial.to_string());
        assert_eq!(summary.url, format!("sdr://{}", server.addr()));
        server.shutdown().await.unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(SpyServerDevice::find("127.0.0.1", port).await.is_empty());
    }
}
