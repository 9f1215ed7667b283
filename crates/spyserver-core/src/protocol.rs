//! SpyServer wire protocol definitions.
//!
//! SpyServer speaks a binary protocol over a single TCP connection. The
//! client writes commands; the server writes messages. Every integer on the
//! wire is a little-endian `u32` and every structure is packed without
//! padding.
//!
//! # Frame layouts
//!
//! ```text
//! Command (client -> server):
//!   u32 CommandType | u32 BodySize | body[BodySize]
//!
//! Message (server -> client):
//!   u32 ProtocolID | u32 MessageType | u32 StreamType | u32 SequenceNumber
//!   | u32 BodySize | body[BodySize]
//! ```
//!
//! The low 16 bits of `MessageType` select the message kind; the high 16
//! bits carry flags, which for IQ messages are the gain applied by the
//! server in dB.
//!
//! All encoding and decoding in this module is pure -- no I/O is performed.
//! Structures are decoded field by field rather than by reinterpreting the
//! byte buffer.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

/// Protocol version sent in the HELLO handshake (2.0.1700).
pub const PROTOCOL_VERSION: u32 = (2 << 24) | (0 << 16) | 1700;

/// Largest message body the server will ever send.
pub const MAX_MESSAGE_BODY_SIZE: usize = 1 << 20;

/// Largest command body the server will accept.
pub const MAX_COMMAND_BODY_SIZE: usize = 256;

/// Default SpyServer TCP port.
pub const DEFAULT_PORT: u16 = 5555;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Hardware behind the server, from the `DeviceType` field of [`DeviceInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Invalid,
    AirspyOne,
    AirspyHf,
    RtlSdr,
    Unknown(u32),
}

impl DeviceType {
    /// Human-readable device name.
    pub fn display_name(self) -> &'static str {
        match self {
            DeviceType::AirspyOne => "AirSpy One",
            DeviceType::AirspyHf => "AirSpy HF+",
            DeviceType::RtlSdr => "RTL-SDR",
            DeviceType::Invalid | DeviceType::Unknown(_) => "Unknown",
        }
    }
}

impl From<u32> for DeviceType {
    fn from(value: u32) -> Self {
        match value {
            0 => DeviceType::Invalid,
            1 => DeviceType::AirspyOne,
            2 => DeviceType::AirspyHf,
            3 => DeviceType::RtlSdr,
            other => DeviceType::Unknown(other),
        }
    }
}

impl From<DeviceType> for u32 {
    fn from(value: DeviceType) -> Self {
        match value {
            DeviceType::Invalid => 0,
            DeviceType::AirspyOne => 1,
            DeviceType::AirspyHf => 2,
            DeviceType::RtlSdr => 3,
            DeviceType::Unknown(other) => other,
        }
    }
}

/// Command identifiers written in [`CommandHeader::command_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandType {
    Hello = 0,
    GetSetting = 1,
    SetSetting = 2,
    Ping = 3,
}

/// Settings addressed by a SET_SETTING command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Setting {
    StreamingMode = 0,
    StreamingEnabled = 1,
    Gain = 2,
    IqFormat = 100,
    IqFrequency = 101,
    IqDecimation = 102,
    IqDigitalGain = 103,
    FftFormat = 200,
    FftFrequency = 201,
    FftDecimation = 202,
    FftDbOffset = 203,
    FftDbRange = 204,
    FftDisplayPixels = 205,
}

/// Stream selection for [`Setting::StreamingMode`]; also echoed in the
/// `StreamType` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StreamType {
    Iq = 1,
    Af = 2,
    Fft = 4,
    FftIq = 5,
    FftAf = 6,
}

/// Sample encodings the server can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFormat {
    Invalid,
    Uint8,
    Int16,
    Int24,
    Float,
    Dint4,
    Unknown(u32),
}

impl StreamFormat {
    /// Whether samples in this format can be decoded to complex `f32`.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            StreamFormat::Uint8 | StreamFormat::Int16 | StreamFormat::Float
        )
    }
}

impl From<u32> for StreamFormat {
    fn from(value: u32) -> Self {
        match value {
            0 => StreamFormat::Invalid,
            1 => StreamFormat::Uint8,
            2 => StreamFormat::Int16,
            3 => StreamFormat::Int24,
            4 => StreamFormat::Float,
            5 => StreamFormat::Dint4,
            other => StreamFormat::Unknown(other),
        }
    }
}

impl From<StreamFormat> for u32 {
    fn from(value: StreamFormat) -> Self {
        match value {
            StreamFormat::Invalid => 0,
            StreamFormat::Uint8 => 1,
            StreamFormat::Int16 => 2,
            StreamFormat::Int24 => 3,
            StreamFormat::Float => 4,
            StreamFormat::Dint4 => 5,
            StreamFormat::Unknown(other) => other,
        }
    }
}

/// Message kind carried in the low 16 bits of `MessageType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    DeviceInfo,
    ClientSync,
    Pong,
    ReadSetting,
    Uint8Iq,
    Int16Iq,
    Int24Iq,
    FloatIq,
    Uint8Af,
    Int16Af,
    Int24Af,
    FloatAf,
    Dint4Fft,
    Uint8Fft,
    Unknown(u16),
}

impl From<u16> for MessageKind {
    fn from(value: u16) -> Self {
        match value {
            0 => MessageKind::DeviceInfo,
            1 => MessageKind::ClientSync,
            2 => MessageKind::Pong,
            3 => MessageKind::ReadSetting,
            100 => MessageKind::Uint8Iq,
            101 => MessageKind::Int16Iq,
            102 => MessageKind::Int24Iq,
            103 => MessageKind::FloatIq,
            200 => MessageKind::Uint8Af,
            201 => MessageKind::Int16Af,
            202 => MessageKind::Int24Af,
            203 => MessageKind::FloatAf,
            300 => MessageKind::Dint4Fft,
            301 => MessageKind::Uint8Fft,
            other => MessageKind::Unknown(other),
        }
    }
}

impl From<MessageKind> for u16 {
    fn from(value: MessageKind) -> Self {
        match value {
            MessageKind::DeviceInfo => 0,
            MessageKind::ClientSync => 1,
            MessageKind::Pong => 2,
            MessageKind::ReadSetting => 3,
            MessageKind::Uint8Iq => 100,
            MessageKind::Int16Iq => 101,
            MessageKind::Int24Iq => 102,
            MessageKind::FloatIq => 103,
            MessageKind::Uint8Af => 200,
            MessageKind::Int16Af => 201,
            MessageKind::Int24Af => 202,
            MessageKind::FloatAf => 203,
            MessageKind::Dint4Fft => 300,
            MessageKind::Uint8Fft => 301,
            MessageKind::Unknown(other) => other,
        }
    }
}

/// Compose a `MessageType` word from a kind and its 16-bit flags.
pub fn message_type(kind: MessageKind, flags: u16) -> u32 {
    ((flags as u32) << 16) | u16::from(kind) as u32
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Header preceding every server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub protocol_id: u32,
    pub message_type: u32,
    pub stream_type: u32,
    pub sequence_number: u32,
    pub body_size: u32,
}

impl MessageHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 20;

    /// Message kind from the low 16 bits of `message_type`.
    pub fn kind(&self) -> MessageKind {
        MessageKind::from((self.message_type & 0xFFFF) as u16)
    }

    /// Flags from the high 16 bits of `message_type`.
    pub fn flags(&self) -> u16 {
        ((self.message_type >> 16) & 0xFFFF) as u16
    }

    /// Decode a header from the first [`Self::SIZE`] bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = checked(data, Self::SIZE, "message header")?;
        Ok(Self {
            protocol_id: buf.get_u32_le(),
            message_type: buf.get_u32_le(),
            stream_type: buf.get_u32_le(),
            sequence_number: buf.get_u32_le(),
            body_size: buf.get_u32_le(),
        })
    }

    /// Append the encoded header to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(Self::SIZE);
        buf.put_u32_le(self.protocol_id);
        buf.put_u32_le(self.message_type);
        buf.put_u32_le(self.stream_type);
        buf.put_u32_le(self.sequence_number);
        buf.put_u32_le(self.body_size);
    }

    /// Encode the header into a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        self.encode_into(&mut buf);
        buf.to_vec()
    }
}

/// Header preceding every client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub command_type: u32,
    pub body_size: u32,
}

impl CommandHeader {
    /// Encoded size in bytes.
    pub const SIZE: usize = 8;

    /// Decode a header from the first [`Self::SIZE`] bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = checked(data, Self::SIZE, "command header")?;
        Ok(Self {
            command_type: buf.get_u32_le(),
            body_size: buf.get_u32_le(),
        })
    }

    /// Append the encoded header to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(Self::SIZE);
        buf.put_u32_le(self.command_type);
        buf.put_u32_le(self.body_size);
    }
}

/// Append a complete command frame (header + body) to `buf`.
pub fn encode_command_into(buf: &mut BytesMut, command: CommandType, body: &[u8]) {
    CommandHeader {
        command_type: command as u32,
        body_size: body.len() as u32,
    }
    .encode_into(buf);
    buf.put_slice(body);
}

/// Encode a complete command frame (header + body).
pub fn encode_command(command: CommandType, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(CommandHeader::SIZE + body.len());
    encode_command_into(&mut buf, command, body);
    buf.to_vec()
}

/// HELLO body: protocol version followed by the raw application name.
///
/// The name is not length-prefixed or NUL-terminated; the command's
/// `BodySize` delimits it.
pub fn handshake_body(protocol_version: u32, app_name: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(4 + app_name.len());
    buf.put_u32_le(protocol_version);
    buf.put_slice(app_name.as_bytes());
    buf.to_vec()
}

/// SET_SETTING body: setting identifier followed by its value.
pub fn setting_body(setting: Setting, value: u32) -> [u8; 8] {
    let mut body = [0u8; 8];
    body[..4].copy_from_slice(&(setting as u32).to_le_bytes());
    body[4..].copy_from_slice(&value.to_le_bytes());
    body
}

// ---------------------------------------------------------------------------
// Metadata payloads
// ---------------------------------------------------------------------------

/// Server and hardware capabilities, sent once per DEVICE_INFO message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub device_type: u32,
    pub device_serial: u32,
    pub maximum_sample_rate: u32,
    pub maximum_bandwidth: u32,
    pub decimation_stage_count: u32,
    pub gain_stage_count: u32,
    pub maximum_gain_index: u32,
    pub minimum_frequency: u32,
    pub maximum_frequency: u32,
    pub resolution: u32,
    pub minimum_iq_decimation: u32,
    pub forced_iq_format: u32,
}

impl DeviceInfo {
    /// Encoded size in bytes.
    pub const SIZE: usize = 48;

    /// Typed view of `device_type`.
    pub fn device(&self) -> DeviceType {
        DeviceType::from(self.device_type)
    }

    /// The IQ format the server insists on, if any.
    pub fn forced_format(&self) -> Option<StreamFormat> {
        match StreamFormat::from(self.forced_iq_format) {
            StreamFormat::Invalid => None,
            format => Some(format),
        }
    }

    /// Decode from a DEVICE_INFO body. Trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = checked(data, Self::SIZE, "device info")?;
        Ok(Self {
            device_type: buf.get_u32_le(),
            device_serial: buf.get_u32_le(),
            maximum_sample_rate: buf.get_u32_le(),
            maximum_bandwidth: buf.get_u32_le(),
            decimation_stage_count: buf.get_u32_le(),
            gain_stage_count: buf.get_u32_le(),
            maximum_gain_index: buf.get_u32_le(),
            minimum_frequency: buf.get_u32_le(),
            maximum_frequency: buf.get_u32_le(),
            resolution: buf.get_u32_le(),
            minimum_iq_decimation: buf.get_u32_le(),
            forced_iq_format: buf.get_u32_le(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        for field in [
            self.device_type,
            self.device_serial,
            self.maximum_sample_rate,
            self.maximum_bandwidth,
            self.decimation_stage_count,
            self.gain_stage_count,
            self.maximum_gain_index,
            self.minimum_frequency,
            self.maximum_frequency,
            self.resolution,
            self.minimum_iq_decimation,
            self.forced_iq_format,
        ] {
            buf.put_u32_le(field);
        }
        buf.to_vec()
    }
}

/// Current tuning and permission state, sent on every CLIENT_SYNC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientSync {
    pub can_control: u32,
    pub gain: u32,
    pub device_center_frequency: u32,
    pub iq_center_frequency: u32,
    pub fft_center_frequency: u32,
    pub minimum_iq_center_frequency: u32,
    pub maximum_iq_center_frequency: u32,
    pub minimum_fft_center_frequency: u32,
    pub maximum_fft_center_frequency: u32,
}

impl ClientSync {
    /// Encoded size in bytes.
    pub const SIZE: usize = 36;

    /// Whether this client may change gain and frequency.
    pub fn can_control(&self) -> bool {
        self.can_control != 0
    }

    /// Decode from a CLIENT_SYNC body. Trailing bytes are ignored.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = checked(data, Self::SIZE, "client sync")?;
        Ok(Self {
            can_control: buf.get_u32_le(),
            gain: buf.get_u32_le(),
            device_center_frequency: buf.get_u32_le(),
            iq_center_frequency: buf.get_u32_le(),
            fft_center_frequency: buf.get_u32_le(),
            minimum_iq_center_frequency: buf.get_u32_le(),
            maximum_iq_center_frequency: buf.get_u32_le(),
            minimum_fft_center_frequency: buf.get_u32_le(),
            maximum_fft_center_frequency: buf.get_u32_le(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        for field in [
            self.can_control,
            self.gain,
            self.device_center_frequency,
            self.iq_center_frequency,
            self.fft_center_frequency,
            self.minimum_iq_center_frequency,
            self.maximum_iq_center_frequency,
            self.minimum_fft_center_frequency,
            self.maximum_fft_center_frequency,
        ] {
            buf.put_u32_le(field);
        }
        buf.to_vec()
    }
}

/// Map a device gain and decimation stage to the server's digital gain index.
///
/// Returns `None` for device types without a known formula.
pub fn compute_digital_gain(info: &DeviceInfo, device_gain: u32, decimation_id: u32) -> Option<i32> {
    let decimation_gain = decimation_id as f32 * 3.01;
    let gain = match info.device() {
        DeviceType::AirspyOne => {
            (info.maximum_gain_index as f32 - device_gain as f32) + decimation_gain
        }
        DeviceType::AirspyHf | DeviceType::RtlSdr => decimation_gain,
        DeviceType::Invalid | DeviceType::Unknown(_) => return None,
    };
    Some(gain as i32)
}

/// Check that `data` holds at least `size` bytes and return it as a cursor.
fn checked<'a>(data: &'a [u8], size: usize, what: &str) -> Result<&'a [u8]> {
    if data.len() < size {
        return Err(Error::Protocol(format!(
            "{} too short: {} bytes, expected {}",
            what,
            data.len(),
            size
        )));
    }
    Ok(data)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn airspy_one() -> DeviceInfo {
        DeviceInfo {
            device_type: 1,
            device_serial: 0x1234_5678,
            maximum_sample_rate: 10_000_000,
            maximum_bandwidth: 9_000_000,
            decimation_stage_count: 8,
            gain_stage_count: 22,
            maximum_gain_index: 21,
            minimum_frequency: 24_000_000,
            maximum_frequency: 1_800_000_000,
            resolution: 12,
            minimum_iq_decimation: 1,
            forced_iq_format: 0,
        }
    }

    #[test]
    fn protocol_version_value() {
        assert_eq!(PROTOCOL_VERSION, 0x0200_06A4);
    }

    #[test]
    fn message_header_round_trip() {
        let bytes: Vec<u8> = (0u8..20).collect();
        let header = MessageHeader::decode(&bytes).unwrap();
        assert_eq!(header.protocol_id, 0x0302_0100);
        assert_eq!(header.body_size, 0x1312_1110);
        assert_eq!(header.encode(), bytes);
    }

    #[test]
    fn message_header_kind_and_flags() {
        let header = MessageHeader {
            message_type: message_type(MessageKind::Int16Iq, 20),
            ..MessageHeader::default()
        };
        assert_eq!(header.kind(), MessageKind::Int16Iq);
        assert_eq!(header.flags(), 20);
        assert_eq!(header.message_type, 0x0014_0065);
    }

    #[test]
    fn message_header_too_short() {
        let result = MessageHeader::decode(&[0u8; 19]);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn unknown_kind_preserved() {
        assert_eq!(MessageKind::from(999), MessageKind::Unknown(999));
        assert_eq!(u16::from(MessageKind::Unknown(999)), 999);
    }

    #[test]
    fn command_frame_layout() {
        let frame = encode_command(CommandType::SetSetting, &setting_body(Setting::Gain, 7));
        assert_eq!(
            frame,
            vec![2, 0, 0, 0, 8, 0, 0, 0, 2, 0, 0, 0, 7, 0, 0, 0]
        );
        let header = CommandHeader::decode(&frame).unwrap();
        assert_eq!(header.command_type, CommandType::SetSetting as u32);
        assert_eq!(header.body_size, 8);
    }

    #[test]
    fn handshake_body_layout() {
        let body = handshake_body(PROTOCOL_VERSION, "test");
        assert_eq!(&body[..4], &PROTOCOL_VERSION.to_le_bytes());
        assert_eq!(&body[4..], b"test");
    }

    #[test]
    fn device_info_round_trip() {
        let info = airspy_one();
        let encoded = info.encode();
        assert_eq!(encoded.len(), DeviceInfo::SIZE);
        assert_eq!(DeviceInfo::decode(&encoded).unwrap(), info);
        assert_eq!(info.device(), DeviceType::AirspyOne);
        assert_eq!(info.forced_format(), None);
    }

    #[test]
    fn device_info_too_short() {
        let result = DeviceInfo::decode(&[0u8; 47]);
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn client_sync_round_trip() {
        let sync = ClientSync {
            can_control: 1,
            gain: 10,
            device_center_frequency: 100_000_000,
            iq_center_frequency: 100_000_000,
            fft_center_frequency: 100_000_000,
            minimum_iq_center_frequency: 24_000_000,
            maximum_iq_center_frequency: 1_800_000_000,
            minimum_fft_center_frequency: 24_000_000,
            maximum_fft_center_frequency: 1_800_000_000,
        };
        let encoded = sync.encode();
        assert_eq!(encoded.len(), ClientSync::SIZE);
        assert_eq!(ClientSync::decode(&encoded).unwrap(), sync);
        assert!(sync.can_control());
    }

    #[test]
    fn forced_format_reported() {
        let info = DeviceInfo {
            forced_iq_format: 3,
            ..airspy_one()
        };
        assert_eq!(info.forced_format(), Some(StreamFormat::Int24));
        assert!(!StreamFormat::Int24.is_supported());
        assert!(StreamFormat::Float.is_supported());
    }

    #[test]
    fn digital_gain_airspy_one() {
        // (21 - 10) + 2 * 3.01 = 17.02 -> 17
        assert_eq!(compute_digital_gain(&airspy_one(), 10, 2), Some(17));
    }

    #[test]
    fn digital_gain_airspy_hf_and_rtlsdr() {
        let hf = DeviceInfo {
            device_type: 2,
            ..airspy_one()
        };
        let rtl = DeviceInfo {
            device_type: 3,
            ..airspy_one()
        };
        // 4 * 3.01 = 12.04 -> 12
        assert_eq!(compute_digital_gain(&hf, 5, 4), Some(12));
        assert_eq!(compute_digital_gain(&rtl, 0, 4), Some(12));
    }

    #[test]
    fn digital_gain_unknown_device() {
        let unknown = DeviceInfo {
            device_type: 42,
            ..airspy_one()
        };
        assert_eq!(compute_digital_gain(&unknown, 5, 1), None);
        assert_eq!(compute_digital_gain(&DeviceInfo::default(), 5, 1), None);
    }

    #[test]
    fn device_names() {
        assert_eq!(DeviceType::from(1).display_name(), "AirSpy One");
        assert_eq!(DeviceType::from(2).display_name(), "AirSpy HF+");
        assert_eq!(DeviceType::from(3).display_name(), "RTL-SDR");
        assert_eq!(DeviceType::from(9).display_name(), "Unknown");
    }
}
