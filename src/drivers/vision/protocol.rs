//! Input report layout, firmware revision v1.
//!
//! ```text
//! 0x00           0x34          0x3e                     0x110
//! | id | opaque   | temps[5] u16 | opaque (2 + 0xd0)    |
//! ```
//!
//! Offsets are explicit and every access is bounds checked against
//! [`REPORT_LEN`]; the buffer is never reinterpreted as a struct.

use crate::error::PwmdError;

/// Opaque prefix, including the leading report id byte.
pub const PREFIX_LEN: usize = 0x34;
pub const SENSOR_COUNT: usize = 5;
pub const TEMPS_OFFSET: usize = PREFIX_LEN;
const TEMP_WORD_LEN: usize = 2;
pub const TRAILER_LEN: usize = 2 + 0xd0;
pub const REPORT_LEN: usize = TEMPS_OFFSET + SENSOR_COUNT * TEMP_WORD_LEN + TRAILER_LEN;

/// Raw sensor words are hundredths of a degree.
const RAW_PER_DEGREE: f64 = 100.0;

/// A length-validated view over a raw input report.
#[derive(Debug, Clone, Copy)]
pub struct InputReport<'a> {
    buf: &'a [u8],
}

impl<'a> InputReport<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, PwmdError> {
        if buf.len() < REPORT_LEN {
            return Err(PwmdError::ShortReport {
                expected: REPORT_LEN,
                actual: buf.len(),
            });
        }
        Ok(Self { buf })
    }

    pub fn report_id(&self) -> u8 {
        self.buf[0]
    }

    /// Raw sensor word for `slot`.
    ///
    /// # Panics
    ///
    /// If `slot >= SENSOR_COUNT`.
    pub fn raw_temp(&self, slot: usize) -> u16 {
        assert!(
            slot < SENSOR_COUNT,
            "sensor slot {slot} out of range (0..{SENSOR_COUNT})"
        );
        let offset = TEMPS_OFFSET + slot * TEMP_WORD_LEN;
        u16::from_le_bytes([self.buf[offset], self.buf[offset + 1]])
    }

    /// Temperature of `slot` in degrees Celsius.
    ///
    /// # Panics
    ///
    /// If `slot >= SENSOR_COUNT`.
    pub fn temperature(&self, slot: usize) -> f64 {
        f64::from(self.raw_temp(slot)) / RAW_PER_DEGREE
    }

    pub fn temperatures(&self) -> [f64; SENSOR_COUNT] {
        std::array::from_fn(|slot| self.temperature(slot))
    }
}

/// Decodes one sensor slot of a raw report.
pub fn temperature(buf: &[u8], slot: usize) -> Result<f64, PwmdError> {
    InputReport::parse(buf).map(|report| report.temperature(slot))
}

/// Builds a full-length report carrying `temps` (raw hundredths).
#[cfg(test)]
pub(crate) fn encode_report(temps: [u16; SENSOR_COUNT]) -> Vec<u8> {
    let mut buf = vec![0u8; REPORT_LEN];
    buf[0] = 0x01;
    for (slot, raw) in temps.iter().enumerate() {
        let offset = TEMPS_OFFSET + slot * TEMP_WORD_LEN;
        buf[offset..offset + TEMP_WORD_LEN].copy_from_slice(&raw.to_le_bytes());
    }
    buf
}
