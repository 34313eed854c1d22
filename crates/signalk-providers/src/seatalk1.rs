//! Seatalk 1 byte-stream decoder.
//!
//! The bus marks command bytes with a ninth bit that a plain UART cannot see,
//! so framing is heuristic: the first byte after an idle gap (or the very
//! first byte) is taken as the command. The attribute byte that follows
//! carries the data length in its low nibble.

use std::time::{Duration, Instant};

use signalk_core::conversions::{celsius_to_kelvin, deg_to_rad, knots_to_ms, FEET_TO_M};
use signalk_core::SignalKStore;

/// Source tag for everything decoded from the Seatalk bus.
pub const SEATALK_SOURCE: &str = "seatalk1";

/// Longest possible datagram: command + attribute + 16 data bytes.
pub const MAX_MESSAGE_LEN: usize = 18;

/// Inter-byte gap after which a partial datagram is dropped.
pub const FRAME_TIMEOUT: Duration = Duration::from_millis(100);

pub const CMD_DEPTH: u8 = 0x00;
pub const CMD_APPARENT_WIND_ANGLE: u8 = 0x10;
pub const CMD_APPARENT_WIND_SPEED: u8 = 0x11;
pub const CMD_SPEED_THROUGH_WATER: u8 = 0x20;
pub const CMD_WATER_TEMPERATURE: u8 = 0x23;
pub const CMD_AUTOPILOT_COURSE: u8 = 0x84;
pub const CMD_COMPASS_HEADING: u8 = 0x9C;

/// A complete datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatalkMessage {
    pub command: u8,
    pub attribute: u8,
    pub data: Vec<u8>,
}

impl SeatalkMessage {
    /// Total length including command and attribute bytes.
    pub fn frame_len(&self) -> usize {
        self.data.len() + 2
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Seatalk1Stats {
    /// Complete datagrams framed.
    pub received: u64,
    /// Datagrams that produced a store write.
    pub decoded: u64,
    /// Datagrams with a command this decoder does not handle.
    pub unknown: u64,
    /// Partial datagrams dropped on timeout or overflow, and known commands
    /// that arrived too short.
    pub discarded: u64,
}

#[derive(Debug)]
enum FrameState {
    AwaitingCommand,
    ReceivingData,
}

/// Framing state machine plus statistics.
#[derive(Debug)]
pub struct Seatalk1Decoder {
    state: FrameState,
    buf: [u8; MAX_MESSAGE_LEN],
    index: usize,
    expected: usize,
    last_byte: Option<Instant>,
    stats: Seatalk1Stats,
}

impl Default for Seatalk1Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Seatalk1Decoder {
    pub fn new() -> Self {
        Self {
            state: FrameState::AwaitingCommand,
            buf: [0; MAX_MESSAGE_LEN],
            index: 0,
            expected: 0,
            last_byte: None,
            stats: Seatalk1Stats::default(),
        }
    }

    pub fn stats(&self) -> Seatalk1Stats {
        self.stats
    }

    fn reset(&mut self) {
        self.state = FrameState::AwaitingCommand;
        self.index = 0;
        self.expected = 0;
    }

    /// Feed one byte received at `at`. Returns a datagram once complete.
    pub fn feed(&mut self, byte: u8, at: Instant) -> Option<SeatalkMessage> {
        if let (FrameState::ReceivingData, Some(last)) = (&self.state, self.last_byte) {
            if at.saturating_duration_since(last) > FRAME_TIMEOUT {
                tracing::debug!("Seatalk frame timeout after {} bytes, resetting", self.index);
                self.stats.discarded += 1;
                self.reset();
            }
        }
        self.last_byte = Some(at);

        match self.state {
            FrameState::AwaitingCommand => {
                self.buf[0] = byte;
                self.index = 1;
                self.expected = 0;
                self.state = FrameState::ReceivingData;
                None
            }
            FrameState::ReceivingData => {
                if self.index >= MAX_MESSAGE_LEN {
                    tracing::debug!("Seatalk buffer overflow, resetting");
                    self.stats.discarded += 1;
                    self.reset();
                    return None;
                }

                self.buf[self.index] = byte;
                self.index += 1;

                if self.index == 2 {
                    self.expected = 3 + usize::from(byte & 0x0F);
                }

                if self.expected > 0 && self.index >= self.expected {
                    let message = SeatalkMessage {
                        command: self.buf[0],
                        attribute: self.buf[1],
                        data: self.buf[2..self.index].to_vec(),
                    };
                    self.stats.received += 1;
                    self.reset();
                    return Some(message);
                }
                None
            }
        }
    }

    /// Feed one byte and decode any completed datagram into the store.
    pub fn process(&mut self, store: &mut SignalKStore, byte: u8, at: Instant) -> bool {
        let Some(message) = self.feed(byte, at) else {
            return false;
        };

        match decode_message(store, &message) {
            Decoded::Written => {
                self.stats.decoded += 1;
                true
            }
            Decoded::Unknown => {
                self.stats.unknown += 1;
                tracing::debug!(
                    "Unhandled Seatalk command 0x{:02X} ({})",
                    message.command,
                    command_name(message.command)
                );
                false
            }
            Decoded::TooShort => {
                self.stats.discarded += 1;
                tracing::debug!(
                    "Seatalk {} too short ({} bytes)",
                    command_name(message.command),
                    message.frame_len()
                );
                false
            }
        }
    }
}

/// Result of decoding one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Written,
    Unknown,
    TooShort,
}

fn write(store: &mut SignalKStore, path: &str, value: f64, units: &str, description: &str) {
    store.set_numeric(path, value, SEATALK_SOURCE, Some(units), Some(description));
}

/// Decode a framed datagram into canonical paths.
pub fn decode_message(store: &mut SignalKStore, msg: &SeatalkMessage) -> Decoded {
    let min_len = match msg.command {
        CMD_DEPTH => 5,
        CMD_APPARENT_WIND_ANGLE
        | CMD_APPARENT_WIND_SPEED
        | CMD_SPEED_THROUGH_WATER
        | CMD_WATER_TEMPERATURE
        | CMD_COMPASS_HEADING => 4,
        CMD_AUTOPILOT_COURSE => 6,
        _ => return Decoded::Unknown,
    };
    if msg.frame_len() < min_len {
        return Decoded::TooShort;
    }

    let d = &msg.data;
    let attr_nibble = u16::from(msg.attribute & 0x0F);

    match msg.command {
        CMD_DEPTH => {
            // 00 02 YZ XX XX
            let raw = u16::from(d[1]) | (u16::from(d[2]) << 8);
            let feet = (f64::from(raw) + f64::from(attr_nibble) * 256.0) / 10.0;
            let meters = feet * FEET_TO_M;
            write(store, "environment.depth.belowTransducer", meters, "m", "Depth below transducer");
            store.update_depth_alarm(meters);
        }
        CMD_APPARENT_WIND_ANGLE => {
            let mut degrees = f64::from(d[0]) * 2.0;
            if d[1] & 0x80 != 0 {
                degrees = -degrees;
            }
            write(store, "environment.wind.angleApparent", deg_to_rad(degrees), "rad", "Apparent wind angle");
        }
        CMD_APPARENT_WIND_SPEED => {
            let knots = f64::from(d[0]) + f64::from(d[1] & 0x0F) / 10.0;
            write(store, "environment.wind.speedApparent", knots_to_ms(knots), "m/s", "Apparent wind speed");
        }
        CMD_SPEED_THROUGH_WATER => {
            let raw = u16::from(d[0]) | (u16::from(d[1]) << 8);
            let knots = f64::from(raw) / 10.0;
            write(store, "navigation.speedThroughWater", knots_to_ms(knots), "m/s", "Speed through water");
        }
        CMD_WATER_TEMPERATURE => {
            let raw = i32::from(d[0]) | (i32::from(d[1] & 0x0F) << 8);
            let celsius = f64::from(raw - 100) / 10.0;
            write(store, "environment.water.temperature", celsius_to_kelvin(celsius), "K", "Water temperature");
        }
        CMD_COMPASS_HEADING => {
            let raw = (u16::from(d[0]) | (attr_nibble << 8)) & 0x0FFF;
            let degrees = f64::from(raw) / 2.0;
            write(store, "navigation.headingMagnetic", deg_to_rad(degrees), "rad", "Heading (magnetic)");
        }
        CMD_AUTOPILOT_COURSE => {
            let high = u16::from((msg.attribute >> 4) & 0x03);
            let raw = u16::from(d[0]) | (high << 8);
            let degrees = f64::from(raw) / 2.0;
            write(
                store,
                "steering.autopilot.target.headingMagnetic",
                deg_to_rad(degrees),
                "rad",
                "Autopilot target heading (magnetic)",
            );
        }
        _ => return Decoded::Unknown,
    }
    Decoded::Written
}

/// Human-readable name of a Seatalk command, for diagnostics.
pub fn command_name(command: u8) -> &'static str {
    match command {
        0x00 => "Depth Below Transducer",
        0x01 => "Equipment ID",
        0x10 => "Apparent Wind Angle",
        0x11 => "Apparent Wind Speed",
        0x20 => "Speed Through Water",
        0x21 => "Trip Mileage",
        0x22 => "Total Mileage",
        0x23 => "Water Temperature",
        0x24 => "Display Units",
        0x25 => "Total & Trip Log",
        0x26 => "Speed Through Water (Alt)",
        0x27 => "Water Temperature (Alt)",
        0x30 => "Set Lamp Intensity",
        0x36 => "Wind Alarm",
        0x84 => "Compass Heading (Autopilot)",
        0x85 => "Navigation Data",
        0x86 => "Keystroke",
        0x87 => "Target Waypoint",
        0x88 => "Autopilot Parameter",
        0x90 => "Equipment ID (Alt)",
        0x9C => "Compass Heading (Magnetic)",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> SignalKStore {
        SignalKStore::new("urn:mrn:signalk:uuid:test")
    }

    /// Feed bytes 1 ms apart, returning completed datagrams.
    fn feed_all(decoder: &mut Seatalk1Decoder, bytes: &[u8], start: Instant) -> Vec<SeatalkMessage> {
        bytes
            .iter()
            .enumerate()
            .filter_map(|(i, b)| decoder.feed(*b, start + Duration::from_millis(i as u64)))
            .collect()
    }

    #[test]
    fn test_framing_uses_attribute_length() {
        let mut decoder = Seatalk1Decoder::new();
        let messages = feed_all(&mut decoder, &[0x00, 0x02, 0x00, 0x0A, 0x00], Instant::now());
        assert_eq!(
            messages,
            vec![SeatalkMessage {
                command: 0x00,
                attribute: 0x02,
                data: vec![0x00, 0x0A, 0x00],
            }]
        );
        assert_eq!(decoder.stats().received, 1);
    }

    #[test]
    fn test_depth_decode() {
        let mut decoder = Seatalk1Decoder::new();
        let mut store = store();
        let start = Instant::now();
        for (i, b) in [0x00u8, 0x02, 0x00, 0x0A, 0x00].iter().enumerate() {
            decoder.process(&mut store, *b, start + Duration::from_millis(i as u64));
        }

        // (0x000A + 2 * 256) / 10 = 52.2 ft
        let depth = store.numeric("environment.depth.belowTransducer").unwrap();
        assert!((depth - 52.2 * 0.3048).abs() < 1e-9, "depth {depth}");
        assert!((depth - 15.91056).abs() < 1e-6);
        assert_eq!(decoder.stats().decoded, 1);
    }

    #[test]
    fn test_timeout_discards_partial_frame() {
        let mut decoder = Seatalk1Decoder::new();
        let start = Instant::now();
        assert_eq!(decoder.feed(0x20, start), None);
        assert_eq!(decoder.feed(0x01, start + Duration::from_millis(1)), None);

        // Gap longer than the frame timeout: the next byte starts a new frame.
        let later = start + Duration::from_millis(200);
        let messages = feed_all(&mut decoder, &[0x11, 0x01, 0x0C, 0x05], later);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].command, 0x11);
        assert_eq!(decoder.stats().discarded, 1);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut decoder = Seatalk1Decoder::new();
        let bytes = [0x20, 0x01, 0x3C, 0x00, 0x9C, 0x01, 0xB4, 0x00];
        let messages = feed_all(&mut decoder, &bytes, Instant::now());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].command, 0x9C);
    }

    #[test]
    fn test_wind_and_water() {
        let mut store = store();
        let msg = |command, attribute, data: &[u8]| SeatalkMessage {
            command,
            attribute,
            data: data.to_vec(),
        };

        // 45 * 2 = 90 degrees, starboard then port
        decode_message(&mut store, &msg(0x10, 0x01, &[0x2D, 0x00]));
        let awa = store.numeric("environment.wind.angleApparent").unwrap();
        assert!((awa - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        decode_message(&mut store, &msg(0x10, 0x01, &[0x2D, 0x80]));
        let awa = store.numeric("environment.wind.angleApparent").unwrap();
        assert!((awa + std::f64::consts::FRAC_PI_2).abs() < 1e-9);

        // 12.5 kn
        decode_message(&mut store, &msg(0x11, 0x01, &[0x0C, 0x05]));
        let aws = store.numeric("environment.wind.speedApparent").unwrap();
        assert!((aws - 12.5 * 0.514444).abs() < 1e-9);

        // 6.0 kn
        decode_message(&mut store, &msg(0x20, 0x01, &[0x3C, 0x00]));
        let stw = store.numeric("navigation.speedThroughWater").unwrap();
        assert!((stw - 6.0 * 0.514444).abs() < 1e-9);

        // (280 - 100) / 10 = 18.0 C
        decode_message(&mut store, &msg(0x23, 0x01, &[0x18, 0x01]));
        let temp = store.numeric("environment.water.temperature").unwrap();
        assert!((temp - 291.15).abs() < 1e-9);
    }

    #[test]
    fn test_headings() {
        let mut store = store();
        // 0x1B4 = 436 / 2 = 218 degrees
        let heading = SeatalkMessage {
            command: 0x9C,
            attribute: 0x01,
            data: vec![0xB4, 0x00],
        };
        assert_eq!(decode_message(&mut store, &heading), Decoded::Written);
        let h = store.numeric("navigation.headingMagnetic").unwrap();
        assert!((h - deg_to_rad(218.0)).abs() < 1e-9);

        // high bits from attribute >> 4: 0x1 -> 0x100 + 0x68 = 360 / 2 = 180 degrees
        let course = SeatalkMessage {
            command: 0x84,
            attribute: 0x16,
            data: vec![0x68, 0x00, 0x00, 0x00],
        };
        assert_eq!(decode_message(&mut store, &course), Decoded::Written);
        let c = store.numeric("steering.autopilot.target.headingMagnetic").unwrap();
        assert!((c - std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_and_short_commands() {
        let mut decoder = Seatalk1Decoder::new();
        let mut store = store();
        let start = Instant::now();

        // Lamp intensity, then a depth datagram whose attribute claims one data byte.
        let bytes = [0x30, 0x00, 0x0C, 0x00, 0x00, 0x00];
        for (i, b) in bytes.iter().enumerate() {
            decoder.process(&mut store, *b, start + Duration::from_millis(i as u64));
        }

        let stats = decoder.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.decoded, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_command_names() {
        assert_eq!(command_name(0x00), "Depth Below Transducer");
        assert_eq!(command_name(0x9C), "Compass Heading (Magnetic)");
        assert_eq!(command_name(0xFF), "Unknown");
    }
}
