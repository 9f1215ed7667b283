//! Frame builders and fixture metadata.
//!
//! Server-side messages are built with the same encoders the client decodes
//! with, so a test can describe what the server says in terms of typed
//! payloads rather than raw bytes. Client commands captured on the wire are
//! split back into [`RecordedCommand`]s by [`parse_commands`].

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use spyserver_core::protocol::{
    ClientSync, CommandHeader, CommandType, DeviceInfo, MAX_COMMAND_BODY_SIZE, MessageHeader,
    MessageKind, PROTOCOL_VERSION, StreamType, message_type,
};

/// Build a complete server message: header followed by `body`.
pub fn message_frame(kind: MessageKind, flags: u16, body: &[u8]) -> Vec<u8> {
    message_frame_with_sequence(kind, flags, 0, body)
}

/// Like [`message_frame`] with an explicit sequence number.
pub fn message_frame_with_sequence(
    kind: MessageKind,
    flags: u16,
    sequence: u32,
    body: &[u8],
) -> Vec<u8> {
    let stream_type = match kind {
        MessageKind::Uint8Iq | MessageKind::Int16Iq | MessageKind::Int24Iq | MessageKind::FloatIq => {
            StreamType::Iq as u32
        }
        _ => 0,
    };
    let header = MessageHeader {
        protocol_id: PROTOCOL_VERSION,
        message_type: message_type(kind, flags),
        stream_type,
        sequence_number: sequence,
        body_size: body.len() as u32,
    };
    let mut frame = header.encode();
    frame.extend_from_slice(body);
    frame
}

pub fn device_info_frame(info: &DeviceInfo) -> Vec<u8> {
    message_frame(MessageKind::DeviceInfo, 0, &info.encode())
}

pub fn client_sync_frame(sync: &ClientSync) -> Vec<u8> {
    message_frame(MessageKind::ClientSync, 0, &sync.encode())
}

/// UINT8 IQ message; `flags` is the gain in dB.
pub fn uint8_iq_frame(flags: u16, samples: &[(u8, u8)]) -> Vec<u8> {
    let body: Vec<u8> = samples.iter().flat_map(|&(i, q)| [i, q]).collect();
    message_frame(MessageKind::Uint8Iq, flags, &body)
}

/// INT16 IQ message, little-endian.
pub fn int16_iq_frame(flags: u16, samples: &[(i16, i16)]) -> Vec<u8> {
    let mut body = Vec::with_capacity(samples.len() * 4);
    for &(i, q) in samples {
        body.extend_from_slice(&i.to_le_bytes());
        body.extend_from_slice(&q.to_le_bytes());
    }
    message_frame(MessageKind::Int16Iq, flags, &body)
}

/// FLOAT IQ message, little-endian.
pub fn float_iq_frame(flags: u16, samples: &[(f32, f32)]) -> Vec<u8> {
    let mut body = Vec::with_capacity(samples.len() * 8);
    for &(i, q) in samples {
        body.extend_from_slice(&i.to_le_bytes());
        body.extend_from_slice(&q.to_le_bytes());
    }
    message_frame(MessageKind::FloatIq, flags, &body)
}

/// An AirSpy One at 10 MS/s with eight decimation stages, decimation from
/// stage 1, and gain indices 0-21.
pub fn airspy_one_info() -> DeviceInfo {
    DeviceInfo {
        device_type: 1,
        device_serial: 0x2601_44B3,
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

/// A CLIENT_SYNC granting control, tuned to 100 MHz with gain 10.
pub fn controllable_sync() -> ClientSync {
    ClientSync {
        can_control: 1,
        gain: 10,
        device_center_frequency: 100_000_000,
        iq_center_frequency: 100_000_000,
        fft_center_frequency: 100_000_000,
        minimum_iq_center_frequency: 24_000_000,
        maximum_iq_center_frequency: 1_800_000_000,
        minimum_fft_center_frequency: 24_000_000,
        maximum_fft_center_frequency: 1_800_000_000,
    }
}

/// One command as written by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub command_type: u32,
    pub body: Vec<u8>,
}

impl RecordedCommand {
    pub fn is_hello(&self) -> bool {
        self.command_type == CommandType::Hello as u32
    }

    /// `(setting, value)` for a SET_SETTING command.
    pub fn setting(&self) -> Option<(u32, u32)> {
        if self.command_type != CommandType::SetSetting as u32 || self.body.len() < 8 {
            return None;
        }
        let setting = u32::from_le_bytes([self.body[0], self.body[1], self.body[2], self.body[3]]);
        let value = u32::from_le_bytes([self.body[4], self.body[5], self.body[6], self.body[7]]);
        Some((setting, value))
    }

    /// Protocol version announced by a HELLO command.
    pub fn protocol_version(&self) -> Option<u32> {
        if !self.is_hello() || self.body.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes([self.body[0], self.body[1], self.body[2], self.body[3]]))
    }

    /// Application name carried by a HELLO command.
    pub fn app_name(&self) -> Option<String> {
        if !self.is_hello() || self.body.len() < 4 {
            return None;
        }
        Some(String::from_utf8_lossy(&self.body[4..]).into_owned())
    }
}

/// Read the next complete command from a client connection.
///
/// Fails with `InvalidData` when the header announces a body larger than
/// [`MAX_COMMAND_BODY_SIZE`].
pub async fn read_command<R>(reader: &mut R) -> io::Result<RecordedCommand>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; CommandHeader::SIZE];
    reader.read_exact(&mut header).await?;
    let header = CommandHeader::decode(&header)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    let size = header.body_size as usize;
    if size > MAX_COMMAND_BODY_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("command body of {} bytes exceeds {}", size, MAX_COMMAND_BODY_SIZE),
        ));
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(RecordedCommand {
        command_type: header.command_type,
        body,
    })
}

/// Split a captured client byte stream into commands.
///
/// A trailing incomplete command is ignored.
pub fn parse_commands(mut bytes: &[u8]) -> Vec<RecordedCommand> {
    let mut commands = Vec::new();
    while let Ok(header) = CommandHeader::decode(bytes) {
        let end = CommandHeader::SIZE + header.body_size as usize;
        if bytes.len() < end {
            break;
        }
        commands.push(RecordedCommand {
            command_type: header.command_type,
            body: bytes[CommandHeader::SIZE..end].to_vec(),
        });
        bytes = &bytes[end..];
    }
    commands
}
