//! # signalk-providers
//!
//! Data providers for the gateway.
//!
//! This crate provides decoders that turn bus traffic into canonical store
//! writes, and the reverse path back to NMEA 0183:
//! - NMEA 0183 sentences
//! - NMEA 2000 PGN payloads
//! - Seatalk 1 byte streams
//! - NMEA 0183 regeneration from the store
//! - Source arbitration bookkeeping
//!
//! Everything here is synchronous; the server crate owns the I/O.

pub mod nmea0183;
pub mod nmea2000;
pub mod regenerator;
pub mod seatalk1;
pub mod sources;

pub use nmea0183::{parse_sentence, validate_checksum, Nmea0183Error};
pub use nmea2000::{handle_pgn, N2kError};
pub use regenerator::regenerate;
pub use seatalk1::{Seatalk1Decoder, Seatalk1Stats};
pub use sources::{SourceKind, SourceStatus, SourceTracker};
