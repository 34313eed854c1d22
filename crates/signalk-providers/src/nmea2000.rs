//! NMEA 2000 PGN decoding.
//!
//! Only the payload of already reassembled messages is handled here; CAN
//! framing and fast-packet reassembly belong to the bus driver. Fields are
//! little-endian and an all-ones value means "not available".

use signalk_core::SignalKStore;
use thiserror::Error;

/// Source tag for everything decoded from the CAN bus.
pub const N2K_SOURCE: &str = "nmea2000.can";

#[derive(Debug, Error, PartialEq)]
pub enum N2kError {
    #[error("PGN {pgn}: payload too short ({len} bytes)")]
    Truncated { pgn: u32, len: usize },
}

/// Checked little-endian reader over a PGN payload.
struct Reader<'a> {
    pgn: u32,
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(pgn: u32, data: &'a [u8]) -> Self {
        Self {
            pgn,
            data,
            offset: 0,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], N2kError> {
        let bytes = self
            .data
            .get(self.offset..self.offset + N)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(N2kError::Truncated {
                pgn: self.pgn,
                len: self.data.len(),
            })?;
        self.offset += N;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), N2kError> {
        if self.offset + n > self.data.len() {
            return Err(N2kError::Truncated {
                pgn: self.pgn,
                len: self.data.len(),
            });
        }
        self.offset += n;
        Ok(())
    }

    fn get_u8(&mut self) -> Result<u8, N2kError> {
        Ok(self.take::<1>()?[0])
    }

    /// Unsigned 16-bit fixed point; `0xFFFF` is not available.
    fn get_u16_scaled(&mut self, resolution: f64) -> Result<Option<f64>, N2kError> {
        Ok(match u16::from_le_bytes(self.take()?) {
            0xFFFF => None,
            raw => Some(f64::from(raw) * resolution),
        })
    }

    /// Unsigned 32-bit fixed point; `0xFFFFFFFF` is not available.
    fn get_u32_scaled(&mut self, resolution: f64) -> Result<Option<f64>, N2kError> {
        Ok(match u32::from_le_bytes(self.take()?) {
            0xFFFF_FFFF => None,
            raw => Some(f64::from(raw) * resolution),
        })
    }

    /// Signed 32-bit fixed point; `0x7FFFFFFF` is not available.
    fn get_i32_scaled(&mut self, resolution: f64) -> Result<Option<f64>, N2kError> {
        Ok(match i32::from_le_bytes(self.take()?) {
            0x7FFF_FFFF => None,
            raw => Some(f64::from(raw) * resolution),
        })
    }
}

/// A decodable PGN.
pub trait Pgn: Sized {
    const PGN: u32;

    fn decode(data: &[u8]) -> Result<Self, N2kError>;

    /// Write the decoded fields to the store.
    fn apply(&self, store: &mut SignalKStore);
}

/// 129025 Position, Rapid Update.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRapid {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Pgn for PositionRapid {
    const PGN: u32 = 129025;

    fn decode(data: &[u8]) -> Result<Self, N2kError> {
        let mut r = Reader::new(Self::PGN, data);
        Ok(Self {
            latitude: r.get_i32_scaled(1e-7)?,
            longitude: r.get_i32_scaled(1e-7)?,
        })
    }

    fn apply(&self, store: &mut SignalKStore) {
        if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            store.update_navigation_position(lat, lon, N2K_SOURCE);
        }
    }
}

/// 129026 COG & SOG, Rapid Update.
#[derive(Debug, Clone, PartialEq)]
pub struct CogSogRapid {
    /// Radians.
    pub cog: Option<f64>,
    /// m/s.
    pub sog: Option<f64>,
}

impl Pgn for CogSogRapid {
    const PGN: u32 = 129026;

    fn decode(data: &[u8]) -> Result<Self, N2kError> {
        let mut r = Reader::new(Self::PGN, data);
        r.skip(2)?; // SID, COG reference
        Ok(Self {
            cog: r.get_u16_scaled(1e-4)?,
            sog: r.get_u16_scaled(0.01)?,
        })
    }

    fn apply(&self, store: &mut SignalKStore) {
        if let Some(cog) = self.cog {
            store.set_numeric(
                "navigation.courseOverGroundTrue",
                cog,
                N2K_SOURCE,
                Some("rad"),
                Some("Course over ground (true)"),
            );
        }
        if let Some(sog) = self.sog {
            store.set_numeric(
                "navigation.speedOverGround",
                sog,
                N2K_SOURCE,
                Some("m/s"),
                Some("Speed over ground"),
            );
        }
    }
}

/// Wind reference carried in PGN 130306.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindReference {
    TrueNorth,
    Magnetic,
    Apparent,
    TrueBoat,
    TrueWater,
    Other(u8),
}

impl From<u8> for WindReference {
    fn from(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Self::TrueNorth,
            1 => Self::Magnetic,
            2 => Self::Apparent,
            3 => Self::TrueBoat,
            4 => Self::TrueWater,
            other => Self::Other(other),
        }
    }
}

/// 130306 Wind Data.
#[derive(Debug, Clone, PartialEq)]
pub struct WindData {
    /// m/s.
    pub speed: Option<f64>,
    /// Radians.
    pub angle: Option<f64>,
    pub reference: WindReference,
}

impl Pgn for WindData {
    const PGN: u32 = 130306;

    fn decode(data: &[u8]) -> Result<Self, N2kError> {
        let mut r = Reader::new(Self::PGN, data);
        r.skip(1)?; // SID
        Ok(Self {
            speed: r.get_u16_scaled(0.01)?,
            angle: r.get_u16_scaled(1e-4)?,
            reference: WindReference::from(r.get_u8()?),
        })
    }

    fn apply(&self, store: &mut SignalKStore) {
        let (Some(speed), Some(angle)) = (self.speed, self.angle) else {
            return;
        };

        match self.reference {
            WindReference::Apparent => {
                store.set_numeric(
                    "environment.wind.speedApparent",
                    speed,
                    N2K_SOURCE,
                    Some("m/s"),
                    Some("Apparent wind speed"),
                );
                store.set_numeric(
                    "environment.wind.angleApparent",
                    angle,
                    N2K_SOURCE,
                    Some("rad"),
                    Some("Apparent wind angle"),
                );
            }
            WindReference::TrueNorth | WindReference::TrueWater => {
                store.set_numeric(
                    "environment.wind.speedTrue",
                    speed,
                    N2K_SOURCE,
                    Some("m/s"),
                    Some("True wind speed"),
                );
                store.set_numeric(
                    "environment.wind.angleTrueWater",
                    angle,
                    N2K_SOURCE,
                    Some("rad"),
                    Some("True wind angle"),
                );
                store.update_wind_alarm(speed);
            }
            _ => {}
        }
    }
}

/// 128267 Water Depth.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterDepth {
    /// Meters below the transducer.
    pub depth: Option<f64>,
}

impl Pgn for WaterDepth {
    const PGN: u32 = 128267;

    fn decode(data: &[u8]) -> Result<Self, N2kError> {
        let mut r = Reader::new(Self::PGN, data);
        r.skip(1)?;
        Ok(Self {
            depth: r.get_u32_scaled(0.01)?,
        })
    }

    fn apply(&self, store: &mut SignalKStore) {
        if let Some(depth) = self.depth {
            store.set_numeric(
                "environment.depth.belowTransducer",
                depth,
                N2K_SOURCE,
                Some("m"),
                Some("Depth below transducer"),
            );
            store.update_depth_alarm(depth);
        }
    }
}

/// 130310 Environmental Parameters (obsolete but still common).
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentalParameters {
    /// Kelvin.
    pub water_temperature: Option<f64>,
    /// Kelvin.
    pub air_temperature: Option<f64>,
    /// Pascal.
    pub pressure: Option<f64>,
}

impl Pgn for EnvironmentalParameters {
    const PGN: u32 = 130310;

    fn decode(data: &[u8]) -> Result<Self, N2kError> {
        let mut r = Reader::new(Self::PGN, data);
        r.skip(1)?;
        Ok(Self {
            water_temperature: r.get_u16_scaled(0.01)?,
            air_temperature: r.get_u16_scaled(0.01)?,
            pressure: r.get_u16_scaled(100.0)?,
        })
    }

    fn apply(&self, store: &mut SignalKStore) {
        if let Some(t) = self.water_temperature {
            store.set_numeric(
                "environment.water.temperature",
                t,
                N2K_SOURCE,
                Some("K"),
                Some("Water temperature"),
            );
        }
        if let Some(t) = self.air_temperature {
            store.set_numeric(
                "environment.outside.temperature",
                t,
                N2K_SOURCE,
                Some("K"),
                Some("Outside air temperature"),
            );
        }
        if let Some(p) = self.pressure {
            store.set_numeric(
                "environment.outside.pressure",
                p,
                N2K_SOURCE,
                Some("Pa"),
                Some("Outside pressure"),
            );
        }
    }
}

fn decode_and_apply<P: Pgn>(store: &mut SignalKStore, data: &[u8]) -> Result<bool, N2kError> {
    P::decode(data)?.apply(store);
    Ok(true)
}

/// Decode a reassembled PGN payload into the store.
///
/// Returns `Ok(false)` for PGNs this gateway does not handle.
pub fn handle_pgn(store: &mut SignalKStore, pgn: u32, data: &[u8]) -> Result<bool, N2kError> {
    match pgn {
        PositionRapid::PGN => decode_and_apply::<PositionRapid>(store, data),
        CogSogRapid::PGN => decode_and_apply::<CogSogRapid>(store, data),
        WindData::PGN => decode_and_apply::<WindData>(store, data),
        WaterDepth::PGN => decode_and_apply::<WaterDepth>(store, data),
        EnvironmentalParameters::PGN => decode_and_apply::<EnvironmentalParameters>(store, data),
        _ => {
            tracing::trace!("Ignoring PGN {}", pgn);
            Ok(false)
        }
    }
}
