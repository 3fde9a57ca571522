//! Numeric and bit-level encodings used inside Firmata sysex payloads.
//!
//! Every byte inside a sysex frame must stay below 0x80, so the helpers below spread wider
//! values over several 7-bit bytes.

use crate::io::constants::SYSEX_REALTIME;

/// Largest significand the custom float format can hold (23 bits).
const MAX_SIGNIFICAND: f64 = 8_388_607.0;
/// Offset applied to the decimal exponent so it fits in 4 unsigned bits.
const FLOAT_EXPONENT_OFFSET: i32 = 11;

// ########################################
// Two-byte pairs

/// Splits each byte into a `[lsb, msb]` pair of 7-bit bytes.
///
/// This is the encoding used by STRING_DATA, I2C and serial payloads.
pub fn encode_pairs(data: &[u8]) -> Vec<u8> {
    data.iter()
        .flat_map(|&byte| [byte & SYSEX_REALTIME, (byte >> 7) & SYSEX_REALTIME])
        .collect()
}

/// Rebuilds 14-bit values from `[lsb, msb]` pairs. A trailing odd byte is read as a lone lsb.
pub fn decode_pairs(data: &[u8]) -> Vec<u16> {
    data.chunks(2)
        .map(|pair| {
            let lsb = (pair[0] & SYSEX_REALTIME) as u16;
            let msb = pair.get(1).map_or(0, |&b| (b & SYSEX_REALTIME) as u16);
            lsb | (msb << 7)
        })
        .collect()
}

// ########################################
// Rolling 7-bit packing

/// Packs 8-bit bytes into a stream of 7-bit bytes (8 input bits consumed at a time across a
/// rolling 7-bit window).
///
/// # Example
/// ```
/// use firmata_host::io::encoding::{from_7bit, to_7bit};
///
/// let encoded = to_7bit(&[0xFF, 0x80]);
/// assert!(encoded.iter().all(|&b| b < 0x80));
/// assert_eq!(from_7bit(&encoded), vec![0xFF, 0x80]);
/// ```
pub fn to_7bit(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len() * 8 / 7 + 1);
    let mut shift = 0;
    let mut previous: u8 = 0;

    for &byte in data {
        if shift == 0 {
            encoded.push(byte & SYSEX_REALTIME);
            shift += 1;
            previous = byte >> 7;
        } else {
            encoded.push(((byte << shift) & SYSEX_REALTIME) | previous);
            if shift == 6 {
                encoded.push(byte >> 1);
                shift = 0;
            } else {
                shift += 1;
                previous = byte >> (8 - shift);
            }
        }
    }

    if shift > 0 {
        encoded.push(previous);
    }
    encoded
}

/// Inverse of [`to_7bit`]: yields `floor(len * 7 / 8)` bytes, dropping the encoder padding.
pub fn from_7bit(data: &[u8]) -> Vec<u8> {
    let expected = data.len() * 7 / 8;
    (0..expected)
        .map(|i| {
            let j = i * 8;
            let pos = j / 7;
            let shift = j % 7;
            let low = data[pos] >> shift;
            let high = data.get(pos + 1).map_or(0, |&b| ((b as u16) << (7 - shift)) as u8);
            low | high
        })
        .collect()
}

// ########################################
// 32-bit signed integers

/// Encodes a signed integer over 5 bytes: 28 bits of magnitude spread over 4 bytes, the last 3
/// magnitude bits in the 5th byte and the sign flag (0x08) on top of them.
///
/// The magnitude holds 31 bits: `i32::MIN` saturates to `-i32::MAX`.
pub fn encode_i32(value: i32) -> [u8; 5] {
    let magnitude = value.max(-i32::MAX).unsigned_abs();
    let mut encoded = [
        (magnitude & 0x7F) as u8,
        ((magnitude >> 7) & 0x7F) as u8,
        ((magnitude >> 14) & 0x7F) as u8,
        ((magnitude >> 21) & 0x7F) as u8,
        ((magnitude >> 28) & 0x07) as u8,
    ];
    if value < 0 {
        encoded[4] |= 0x08;
    }
    encoded
}

/// Decodes 5 bytes produced by [`encode_i32`]. Missing bytes are read as zero.
pub fn decode_i32(bytes: &[u8]) -> i32 {
    let byte = |i: usize| bytes.get(i).copied().unwrap_or_default() as u32;
    let magnitude = (byte(0) & 0x7F)
        | ((byte(1) & 0x7F) << 7)
        | ((byte(2) & 0x7F) << 14)
        | ((byte(3) & 0x7F) << 21)
        | ((byte(4) & 0x07) << 28);
    let value = magnitude as i32;
    match byte(4) & 0x08 {
        0 => value,
        _ => -value,
    }
}

// ########################################
// Custom float

/// Encodes a value with the AccelStepper float format: a 23-bit significand, a 4-bit decimal
/// exponent (offset by 11) and a sign bit, packed in 4 bytes.
pub fn encode_custom_float(value: f64) -> [u8; 4] {
    if value == 0.0 || !value.is_finite() {
        return [0, 0, 0, 0];
    }

    let sign = u32::from(value < 0.0);
    let mut input = value.abs();

    let base10 = input.log10().floor() as i32;
    let mut exponent = base10;
    input /= 10f64.powi(base10);

    while input.fract() != 0.0 && input < MAX_SIGNIFICAND {
        exponent -= 1;
        input *= 10.0;
    }
    while input > MAX_SIGNIFICAND {
        exponent += 1;
        input /= 10.0;
    }

    // Rounding absorbs the drift of the decimal shifts above.
    let significand = input.round().min(MAX_SIGNIFICAND) as u32;
    let exponent = (exponent + FLOAT_EXPONENT_OFFSET) as u32;

    [
        (significand & 0x7F) as u8,
        ((significand >> 7) & 0x7F) as u8,
        ((significand >> 14) & 0x7F) as u8,
        (((significand >> 21) & 0x03) | ((exponent & 0x0F) << 2) | ((sign & 0x01) << 6)) as u8,
    ]
}

/// Decodes 4 bytes produced by [`encode_custom_float`].
pub fn decode_custom_float(bytes: &[u8; 4]) -> f64 {
    let exponent = ((bytes[3] >> 2) & 0x0F) as i32 - FLOAT_EXPONENT_OFFSET;
    let sign = (bytes[3] >> 6) & 0x01;
    let significand = (bytes[0] as u32)
        | ((bytes[1] as u32) << 7)
        | ((bytes[2] as u32) << 14)
        | (((bytes[3] & 0x03) as u32) << 21);

    let result = significand as f64 * 10f64.powi(exponent);
    match sign {
        0 => result,
        _ => -result,
    }
}

// ########################################
// CRC

/// Dallas/Maxim CRC-8 (polynomial 0x8C, LSB-first) as used by OneWire ROM codes.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &byte| {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
        crc
    })
}
