//! IQ payload decoding.
//!
//! Converts the body of a UINT8, INT16, or FLOAT IQ message into complex
//! `f32` samples, applying the gain the server encodes in the high 16 bits
//! of the message type. The packed 24-bit format is rejected.
//!
//! Each decoder works on interleaved I/Q pairs. A body whose length is not
//! a whole number of pairs is decoded up to the last complete pair.

use spyserver_core::protocol::MessageKind;
use spyserver_core::{Complex32, Error, Result, SampleBatch};

/// Bytes per complex UINT8 sample.
pub const UINT8_PAIR_SIZE: usize = 2;
/// Bytes per complex INT16 sample.
pub const INT16_PAIR_SIZE: usize = 4;
/// Bytes per complex FLOAT sample.
pub const FLOAT_PAIR_SIZE: usize = 8;

/// Linear gain factor for the dB value carried in the header flags.
pub fn gain_factor(flags: u16) -> f32 {
    10f64.powf(flags as f64 / 20.0) as f32
}

/// Decode an IQ message body of the given kind.
///
/// Returns [`Error::Unsupported`] for INT24 and for kinds that do not carry
/// IQ samples.
pub fn decode_iq(kind: MessageKind, flags: u16, body: &[u8]) -> Result<SampleBatch> {
    let gain = gain_factor(flags);
    match kind {
        MessageKind::Uint8Iq => Ok(decode_uint8(body, gain)),
        MessageKind::Int16Iq => Ok(decode_int16(body, gain)),
        MessageKind::FloatIq => Ok(decode_float(body, gain)),
        MessageKind::Int24Iq => Err(Error::Unsupported(
            "INT24 IQ stream format cannot be decoded".into(),
        )),
        other => Err(Error::Unsupported(format!(
            "message kind {:?} does not carry IQ samples",
            other
        ))),
    }
}

/// Unsigned 8-bit pairs centred on 128: `(b - 128) / (128 * gain)`.
pub fn decode_uint8(body: &[u8], gain: f32) -> SampleBatch {
    let scale = 1.0 / (gain * 128.0);
    body.chunks_exact(UINT8_PAIR_SIZE)
        .map(|pair| {
            Complex32::new(
                (pair[0] as f32 - 128.0) * scale,
                (pair[1] as f32 - 128.0) * scale,
            )
        })
        .collect()
}

/// Signed 16-bit little-endian pairs: `raw * gain / 32768`.
pub fn decode_int16(body: &[u8], gain: f32) -> SampleBatch {
    let scale = gain / 32768.0;
    body.chunks_exact(INT16_PAIR_SIZE)
        .map(|pair| {
            let re = i16::from_le_bytes([pair[0], pair[1]]);
            let im = i16::from_le_bytes([pair[2], pair[3]]);
            Complex32::new(re as f32 * scale, im as f32 * scale)
        })
        .collect()
}

/// IEEE 754 float32 little-endian pairs: `raw * gain`.
pub fn decode_float(body: &[u8], gain: f32) -> SampleBatch {
    body.chunks_exact(FLOAT_PAIR_SIZE)
        .map(|pair| {
            let re = f32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
            let im = f32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
            Complex32::new(re * gain, im * gain)
        })
        .collect()
}
