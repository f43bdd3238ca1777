//! The radio abstraction consumed by the scheduler's slot handlers.
//!
//! The driver behind this trait programs the UWB transceiver; the stack only
//! sees frame bytes, radio-clock timestamps and a handful of configuration
//! knobs. Radio timestamps count ticks of roughly 15.65 ps and convert to
//! the scheduler's microsecond timebase through [`ticks_to_us`].

use crate::constants::MAX_FRAME_LEN;
use crate::time::Instant;

/// Radio clock ticks per microsecond (63.8976 GHz tick rate, rounded).
pub const RADIO_TICKS_PER_US: u64 = 63_898;

/// Convert a radio-clock timestamp to the scheduler timebase.
pub fn ticks_to_us(ticks: u64) -> Instant {
    Instant::from_us(ticks / RADIO_TICKS_PER_US)
}

/// Convert a scheduler timestamp to radio-clock ticks.
pub fn us_to_ticks(at: Instant) -> u64 {
    at.as_us().wrapping_mul(RADIO_TICKS_PER_US)
}

/// Pulse repetition frequency of the UWB physical layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Prf {
    /// 16 MHz.
    Mhz16,
    /// 64 MHz.
    #[default]
    Mhz64,
}

/// Preamble length in symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PreambleLength {
    /// 64 symbols.
    _64,
    /// 128 symbols.
    #[default]
    _128,
    /// 1024 symbols.
    _1024,
}

/// Over-the-air data rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataRate {
    /// 110 kbit/s.
    Kbps110,
    /// 850 kbit/s.
    Kbps850,
    /// 6.8 Mbit/s.
    #[default]
    Mbps6_8,
}

/// Physical layer configuration applied by [`Radio::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// UWB channel number.
    pub channel: u8,
    /// Pulse repetition frequency.
    pub prf: Prf,
    /// Preamble length.
    pub preamble: PreambleLength,
    /// Data rate.
    pub data_rate: DataRate,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            channel: 5,
            prf: Prf::default(),
            preamble: PreambleLength::default(),
            data_rate: DataRate::default(),
        }
    }
}

/// An error surfaced by the radio driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// The transmission could not be started or did not complete.
    TxFailed,
    /// No frame arrived inside the receive window.
    RxTimeout,
    /// The received frame was rejected by the driver.
    RxGarbled,
}

/// A received frame with its reception metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    /// The number of frame octets written to the caller's buffer.
    pub len: usize,
    /// Reception timestamp, in radio-clock ticks.
    pub timestamp: u64,
    /// Received signal strength in dBm.
    pub rssi: i8,
}

/// The operations the stack needs from the radio driver.
///
/// All operations are synchronous and callable from the slot ISR; a driver
/// backs the delayed variants with the transceiver's own delayed-TX/RX
/// machinery.
pub trait Radio {
    /// Apply a physical layer configuration.
    fn configure(&mut self, config: &RadioConfig);

    /// Transmit a frame, optionally at a precise radio-clock time.
    ///
    /// Returns the transmission timestamp in radio-clock ticks.
    fn tx(&mut self, frame: &[u8], at: Option<u64>) -> Result<u64, RadioError>;

    /// Enable the receiver, optionally at a precise radio-clock time, with
    /// an optional timeout in microseconds.
    fn rx_enable(&mut self, at: Option<u64>, timeout_us: Option<u32>);

    /// Drain a received frame into `buffer`.
    fn rx_drain(&mut self, buffer: &mut [u8]) -> Result<RxInfo, RadioError>;

    /// The measured offset of the radio clock against its nominal rate, in
    /// Hz.
    fn clock_offset(&self) -> i32;
}

/// A fixed-capacity MAC frame buffer.
#[derive(Debug, Clone)]
pub struct FrameBuf {
    bytes: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self {
            bytes: [0; MAX_FRAME_LEN],
            len: 0,
        }
    }
}

impl FrameBuf {
    /// Create a frame buffer holding a copy of `bytes`.
    ///
    /// Returns `None` when `bytes` exceeds the MAC frame size.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > MAX_FRAME_LEN {
            return None;
        }
        let mut buf = Self::default();
        buf.bytes[..bytes.len()].copy_from_slice(bytes);
        buf.len = bytes.len();
        Some(buf)
    }

    /// The frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The full backing storage, for in-place frame building.
    pub fn storage_mut(&mut self) -> &mut [u8; MAX_FRAME_LEN] {
        &mut self.bytes
    }

    /// Set the used length after in-place building.
    pub fn set_len(&mut self, len: usize) {
        debug_assert!(len <= MAX_FRAME_LEN);
        self.len = len;
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// A scripted radio for scheduler tests: records transmissions and
    /// serves queued receptions.
    #[derive(Default)]
    pub struct TestRadio {
        pub transmitted: Vec<(Vec<u8>, Option<u64>)>,
        pub rx_queue: VecDeque<Vec<u8>>,
        pub rx_enabled: usize,
        pub tx_fail: bool,
    }

    impl Radio for TestRadio {
        fn configure(&mut self, _config: &RadioConfig) {}

        fn tx(&mut self, frame: &[u8], at: Option<u64>) -> Result<u64, RadioError> {
            if self.tx_fail {
                return Err(RadioError::TxFailed);
            }
            self.transmitted.push((frame.to_vec(), at));
            Ok(at.unwrap_or(0))
        }

        fn rx_enable(&mut self, _at: Option<u64>, _timeout_us: Option<u32>) {
            self.rx_enabled += 1;
        }

        fn rx_drain(&mut self, buffer: &mut [u8]) -> Result<RxInfo, RadioError> {
            let frame = self.rx_queue.pop_front().ok_or(RadioError::RxTimeout)?;
            buffer[..frame.len()].copy_from_slice(&frame);
            Ok(RxInfo {
                len: frame.len(),
                timestamp: 0,
                rssi: -60,
            })
        }

        fn clock_offset(&self) -> i32 {
            0
        }
    }

    #[test]
    fn tick_conversion() {
        let t = ticks_to_us(RADIO_TICKS_PER_US * 125);
        assert_eq!(t.as_us(), 125);
    }
}
