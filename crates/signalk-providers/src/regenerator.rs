//! NMEA 0183 output regenerated from the canonical store.
//!
//! Whatever bus a value arrived on, it goes back out as plain NMEA 0183 so
//! chartplotter apps on the TCP port see one consistent feed.

use chrono::{DateTime, Utc};
use signalk_core::conversions::{kelvin_to_celsius, rad_to_deg, MS_TO_KNOTS};
use signalk_core::store::POSITION_PATH;
use signalk_core::SignalKStore;

use crate::nmea0183::checksum;

/// Append `*HH\r\n` to a sentence body starting with `$`.
///
/// An existing checksum suffix is replaced.
pub fn finish_sentence(sentence: &str) -> String {
    let body = match sentence.find('*') {
        Some(star) => &sentence[..star],
        None => sentence,
    };
    let payload = body.strip_prefix('$').unwrap_or(body);
    format!("{}*{:02X}\r\n", body, checksum(payload))
}

/// Split absolute decimal degrees into whole degrees and minutes, carrying
/// minutes that would print as 60.0000.
fn degrees_minutes(value: f64) -> (u32, f64) {
    let abs = value.abs();
    let mut degrees = abs.trunc() as u32;
    let mut minutes = (abs - abs.trunc()) * 60.0;
    if minutes >= 59.99995 {
        degrees += 1;
        minutes = 0.0;
    }
    (degrees, minutes)
}

/// `DDMM.MMMM,N|S`
pub fn format_latitude(latitude: f64) -> String {
    let hemisphere = if latitude >= 0.0 { 'N' } else { 'S' };
    let (degrees, minutes) = degrees_minutes(latitude);
    format!("{:02}{:07.4},{}", degrees, minutes, hemisphere)
}

/// `DDDMM.MMMM,E|W`
pub fn format_longitude(longitude: f64) -> String {
    let hemisphere = if longitude >= 0.0 { 'E' } else { 'W' };
    let (degrees, minutes) = degrees_minutes(longitude);
    format!("{:03}{:07.4},{}", degrees, minutes, hemisphere)
}

/// `HHMMSS.000`
pub fn format_time(at: &DateTime<Utc>) -> String {
    at.format("%H%M%S.000").to_string()
}

/// `DDMMYY`
pub fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%d%m%y").to_string()
}

fn positive_degrees(rad: f64) -> f64 {
    let deg = rad_to_deg(rad);
    if deg < 0.0 {
        deg + 360.0
    } else {
        deg
    }
}

pub fn gga(lat: f64, lon: f64, at: &DateTime<Utc>, satellites: u32, altitude: Option<f64>) -> String {
    let quality = u8::from(satellites > 0);
    let tail = match altitude {
        Some(alt) => format!("{:.1},M,0.0,M,,", alt),
        None => ",M,,M,,".to_string(),
    };
    finish_sentence(&format!(
        "$GPGGA,{},{},{},{},{:02},1.0,{}",
        format_time(at),
        format_latitude(lat),
        format_longitude(lon),
        quality,
        satellites,
        tail
    ))
}

pub fn gll(lat: f64, lon: f64, at: &DateTime<Utc>) -> String {
    finish_sentence(&format!(
        "$GPGLL,{},{},{},A,A",
        format_latitude(lat),
        format_longitude(lon),
        format_time(at)
    ))
}

pub fn rmc(lat: f64, lon: f64, cog: f64, sog: f64, at: &DateTime<Utc>) -> String {
    finish_sentence(&format!(
        "$GPRMC,{},A,{},{},{:.2},{:.1},{},,,A",
        format_time(at),
        format_latitude(lat),
        format_longitude(lon),
        sog * MS_TO_KNOTS,
        rad_to_deg(cog),
        format_date(at)
    ))
}

pub fn vtg(cog: f64, sog: f64) -> String {
    finish_sentence(&format!(
        "$GPVTG,{:.1},T,,M,{:.2},N,{:.2},K,A",
        rad_to_deg(cog),
        sog * MS_TO_KNOTS,
        sog * 3.6
    ))
}

/// `reference` is `'R'` (apparent) or `'T'` (true). Speed is sent in m/s.
pub fn mwv(angle: f64, speed: f64, reference: char) -> String {
    finish_sentence(&format!(
        "$WIMWV,{:.1},{},{:.2},M,A",
        positive_degrees(angle),
        reference,
        speed
    ))
}

pub fn dpt(depth: f64) -> String {
    finish_sentence(&format!("$SDDPT,{:.2},{:.2}", depth, 0.0))
}

pub fn mtw(kelvin: f64) -> String {
    finish_sentence(&format!("$YXMTW,{:.1},C", kelvin_to_celsius(kelvin)))
}

pub fn hdg(heading: f64) -> String {
    finish_sentence(&format!("$GPHDG,{:.1},,,,", positive_degrees(heading)))
}

pub fn hdt(heading: f64) -> String {
    finish_sentence(&format!("$GPHDT,{:.1},T", positive_degrees(heading)))
}

/// All sentences the current store state supports, each CRLF terminated.
pub fn regenerate(store: &SignalKStore) -> Vec<String> {
    let mut out = Vec::new();
    let value = |path: &str| store.numeric(path).filter(|v| !v.is_nan());

    let cog = value("navigation.courseOverGroundTrue");
    let sog = value("navigation.speedOverGround");

    if let (Some(pos), Some(record)) = (store.position(), store.get(POSITION_PATH)) {
        let at = record.timestamp;
        let satellites = value("navigation.gnss.satellitesInView")
            .map(|s| s.max(0.0) as u32)
            .unwrap_or(0);
        let altitude = value("navigation.gnss.altitude");

        out.push(gga(pos.latitude, pos.longitude, &at, satellites, altitude));
        out.push(gll(pos.latitude, pos.longitude, &at));
        if let (Some(cog), Some(sog)) = (cog, sog) {
            out.push(rmc(pos.latitude, pos.longitude, cog, sog, &at));
        }
    }

    if let (Some(cog), Some(sog)) = (cog, sog) {
        out.push(vtg(cog, sog));
    }

    if let (Some(angle), Some(speed)) = (
        value("environment.wind.angleApparent"),
        value("environment.wind.speedApparent"),
    ) {
        out.push(mwv(angle, speed, 'R'));
    }
    if let (Some(angle), Some(speed)) = (
        value("environment.wind.angleTrueWater"),
        value("environment.wind.speedTrue"),
    ) {
        out.push(mwv(angle, speed, 'T'));
    }

    if let Some(depth) = value("environment.depth.belowTransducer") {
        out.push(dpt(depth));
    }
    if let Some(temp) = value("environment.water.temperature") {
        out.push(mtw(temp));
    }
    if let Some(heading) = value("navigation.headingMagnetic") {
        out.push(hdg(heading));
    }
    if let Some(heading) = value("navigation.headingTrue") {
        out.push(hdt(heading));
    }

    out
}
