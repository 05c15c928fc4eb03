//! Inbound envelopes and the records decoded from them.
//!
//! The producer writes one envelope per event into the queue: a native `long`
//! discriminant followed by a payload block of at most [`PAYLOAD_CAPACITY`] bytes.
//! How the payload is read depends on the discriminant:
//!
//! | Kind | Value | Payload |
//! |------|-------|---------|
//! | Device | 1 | NUL-terminated text |
//! | Environmental | 2 | nine `(i32 integer, i32 fraction)` pairs, native endian |
//! | Sound | 3 | NUL-terminated text |
//!
//! [`decode`] validates the discriminant and the payload length before reading
//! anything, so a short environmental payload is rejected instead of being read
//! past its end.

use crate::error::{BridgeError, BridgeResult};
use std::fmt;
use std::str::FromStr;

/// Capacity of the payload block in bytes.
pub const PAYLOAD_CAPACITY: usize = 500;

/// Number of readings carried by an environmental payload.
pub const ENVIRONMENTAL_READINGS: usize = 9;

/// Bytes occupied by the environmental readings (nine pairs of `i32`).
pub const ENVIRONMENTAL_PAYLOAD_LEN: usize = ENVIRONMENTAL_READINGS * 2 * 4;

/// Record kind selected by the envelope discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Device state change reported as free text.
    Device,
    /// Environmental sensor sample.
    Environmental,
    /// Sound classification event reported as free text.
    Sound,
}

impl MessageKind {
    /// Wire discriminant of this kind.
    pub fn discriminant(self) -> i64 {
        match self {
            MessageKind::Device => 1,
            MessageKind::Environmental => 2,
            MessageKind::Sound => 3,
        }
    }

    /// One-letter tag that starts every row of this kind.
    pub fn tag(self) -> char {
        match self {
            MessageKind::Device => 'D',
            MessageKind::Environmental => 'E',
            MessageKind::Sound => 'S',
        }
    }
}

impl TryFrom<i64> for MessageKind {
    type Error = BridgeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageKind::Device),
            2 => Ok(MessageKind::Environmental),
            3 => Ok(MessageKind::Sound),
            other => Err(BridgeError::MalformedPayload(format!(
                "unrecognized discriminant {other}"
            ))),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageKind::Device => "device",
            MessageKind::Environmental => "environmental",
            MessageKind::Sound => "sound",
        };
        write!(f, "{}", label)
    }
}

/// The wire unit received from the queue.
///
/// The discriminant is kept raw so that an unknown value survives until
/// [`decode`] reports it.
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    discriminant: i64,
    payload: [u8; PAYLOAD_CAPACITY],
    len: usize,
}

impl Envelope {
    /// Build an envelope from a raw discriminant and payload bytes.
    ///
    /// Payloads shorter than the capacity are zero-padded; longer ones are rejected.
    pub fn new(discriminant: i64, payload: &[u8]) -> BridgeResult<Self> {
        if payload.len() > PAYLOAD_CAPACITY {
            return Err(BridgeError::MalformedPayload(format!(
                "payload of {} bytes exceeds capacity of {PAYLOAD_CAPACITY}",
                payload.len()
            )));
        }
        let mut block = [0u8; PAYLOAD_CAPACITY];
        block[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            discriminant,
            payload: block,
            len: payload.len(),
        })
    }

    /// Device event carrying `text`.
    pub fn device(text: &str) -> BridgeResult<Self> {
        Self::new(MessageKind::Device.discriminant(), text.as_bytes())
    }

    /// Sound event carrying `text`.
    pub fn sound(text: &str) -> BridgeResult<Self> {
        Self::new(MessageKind::Sound.discriminant(), text.as_bytes())
    }

    /// Environmental sample encoded as nine native-endian `i32` pairs.
    pub fn environmental(sample: &EnvironmentalSample) -> Self {
        let mut block = [0u8; PAYLOAD_CAPACITY];
        for (i, reading) in sample.readings().iter().enumerate() {
            let offset = i * 8;
            block[offset..offset + 4].copy_from_slice(&reading.integer.to_ne_bytes());
            block[offset + 4..offset + 8].copy_from_slice(&reading.fraction.to_ne_bytes());
        }
        Self {
            discriminant: MessageKind::Environmental.discriminant(),
            payload: block,
            len: ENVIRONMENTAL_PAYLOAD_LEN,
        }
    }

    /// Raw discriminant as received.
    pub fn discriminant(&self) -> i64 {
        self.discriminant
    }

    /// Payload bytes actually carried by the message.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }

    /// Full zero-padded payload block, as laid out on the wire.
    pub fn block(&self) -> &[u8; PAYLOAD_CAPACITY] {
        &self.payload
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("discriminant", &self.discriminant)
            .field("len", &self.len)
            .finish()
    }
}

/// A sensor reading with an integer part and a separately encoded fractional part.
///
/// The producer splits a float into `int(x)` and `int(frac(x) * resolution)`, so the
/// fraction is rendered exactly as sent, without zero padding. `(1, 2)` renders as
/// `1.2` and `(12, 5000)` as `12.5000`.
///
/// The sign is carried by the integer part, or by the fraction when the integer
/// part is zero. Only the magnitude of the fraction is printed, so the pair
/// `(3, -5)`, which the producer never emits, renders as `3.5` rather than `3.-5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FixedPoint {
    /// Integer part.
    pub integer: i32,
    /// Fractional digits as an integer.
    pub fraction: i32,
}

impl FixedPoint {
    /// Create a reading from its two parts.
    pub const fn new(integer: i32, fraction: i32) -> Self {
        Self { integer, fraction }
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // int(-0.5) == 0 on the producer side, so the sign only survives in the fraction.
        if self.integer == 0 && self.fraction < 0 {
            write!(f, "-0.{}", self.fraction.unsigned_abs())
        } else {
            write!(f, "{}.{}", self.integer, self.fraction.unsigned_abs())
        }
    }
}

impl FromStr for FixedPoint {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::MalformedPayload(format!("invalid fixed-point value '{s}'"));
        let s = s.trim();
        let negative = s.starts_with('-');
        let (int_part, frac_part) = match s.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (s, "0"),
        };
        if frac_part.is_empty() || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        // The fraction travels as an integer, so "05" would come back as "5".
        if frac_part.len() > 1 && frac_part.starts_with('0') {
            return Err(invalid());
        }
        let integer: i32 = match int_part {
            "-" | "" => 0,
            digits => digits.parse().map_err(|_| invalid())?,
        };
        let magnitude: i32 = frac_part.parse().map_err(|_| invalid())?;
        let fraction = if negative { -magnitude } else { magnitude };
        Ok(Self { integer, fraction })
    }
}

/// The nine readings of an environmental sample, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvironmentalSample {
    /// Barometric pressure.
    pub pressure: FixedPoint,
    /// Temperature.
    pub temperature: FixedPoint,
    /// Relative humidity.
    pub humidity: FixedPoint,
    /// Raw gas sensor resistance.
    pub gas_raw: FixedPoint,
    /// Indoor air quality index.
    pub iaq: FixedPoint,
    /// Static indoor air quality index.
    pub static_iaq: FixedPoint,
    /// Estimated CO2 equivalent.
    pub eco2: FixedPoint,
    /// Estimated breath VOC equivalent.
    pub bvoc: FixedPoint,
    /// Gas percentage.
    pub gas_percent: FixedPoint,
}

impl EnvironmentalSample {
    /// Readings in positional wire order.
    pub fn readings(&self) -> [FixedPoint; ENVIRONMENTAL_READINGS] {
        [
            self.pressure,
            self.temperature,
            self.humidity,
            self.gas_raw,
            self.iaq,
            self.static_iaq,
            self.eco2,
            self.bvoc,
            self.gas_percent,
        ]
    }
}

impl From<[FixedPoint; ENVIRONMENTAL_READINGS]> for EnvironmentalSample {
    fn from(r: [FixedPoint; ENVIRONMENTAL_READINGS]) -> Self {
        Self {
            pressure: r[0],
            temperature: r[1],
            humidity: r[2],
            gas_raw: r[3],
            iaq: r[4],
            static_iaq: r[5],
            eco2: r[6],
            bvoc: r[7],
            gas_percent: r[8],
        }
    }
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Device event text.
    Device(String),
    /// Environmental sample.
    Environmental(EnvironmentalSample),
    /// Sound event text.
    Sound(String),
}

impl Record {
    /// Kind of this record.
    pub fn kind(&self) -> MessageKind {
        match self {
            Record::Device(_) => MessageKind::Device,
            Record::Environmental(_) => MessageKind::Environmental,
            Record::Sound(_) => MessageKind::Sound,
        }
    }
}

/// Decode an envelope into a typed record.
///
/// Fails with [`BridgeError::MalformedPayload`] for an unknown discriminant or an
/// environmental payload shorter than [`ENVIRONMENTAL_PAYLOAD_LEN`].
pub fn decode(envelope: &Envelope) -> BridgeResult<Record> {
    let kind = MessageKind::try_from(envelope.discriminant())?;
    let payload = envelope.payload();
    match kind {
        MessageKind::Device => Ok(Record::Device(decode_text(payload))),
        MessageKind::Sound => Ok(Record::Sound(decode_text(payload))),
        MessageKind::Environmental => decode_environmental(payload).map(Record::Environmental),
    }
}

fn decode_text(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

fn decode_environmental(payload: &[u8]) -> BridgeResult<EnvironmentalSample> {
    if payload.len() < ENVIRONMENTAL_PAYLOAD_LEN {
        return Err(BridgeError::MalformedPayload(format!(
            "environmental payload has {} bytes, expected at least {ENVIRONMENTAL_PAYLOAD_LEN}",
            payload.len()
        )));
    }

    let mut readings = [FixedPoint::default(); ENVIRONMENTAL_READINGS];
    for (i, chunk) in payload[..ENVIRONMENTAL_PAYLOAD_LEN]
        .chunks_exact(8)
        .enumerate()
    {
        let integer = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let fraction = i32::from_ne_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
        readings[i] = FixedPoint::new(integer, fraction);
    }
    Ok(EnvironmentalSample::from(readings))
}
