//! NMEA 0183 sentence parser.
//!
//! Each sentence is dispatched on the talker-independent suffix of its first
//! field (`$GPRMC`, `$IIRMC`, ... all go to the RMC handler). Handlers convert
//! to SI units and write canonical paths tagged `nmea0183.<origin>`.
//!
//! Parsing is lenient on purpose:
//! - a checksum mismatch is logged and the sentence is still used
//! - empty or non-numeric fields read as NaN and only that field is skipped
//! - angles outside `[0, 360]` and negative speeds are skipped per field

use signalk_core::conversions::{deg_to_rad, knots_to_ms, FEET_TO_M, NM_TO_M};
use signalk_core::SignalKStore;
use thiserror::Error;

/// Errors that drop a whole sentence.
#[derive(Debug, Error, PartialEq)]
pub enum Nmea0183Error {
    #[error("not an NMEA sentence")]
    NotASentence,

    #[error("{kind} needs {min} fields, got {got}")]
    TooShort {
        kind: &'static str,
        min: usize,
        got: usize,
    },

    #[error("{0} status is not valid")]
    InvalidStatus(&'static str),

    #[error("unsupported sentence {0}")]
    Unsupported(String),
}

type Handler = fn(&mut SentenceWriter<'_>, &[&str]) -> Result<(), Nmea0183Error>;

/// Sentence suffix, minimum field count (including the address field), handler.
const SENTENCES: &[(&str, usize, Handler)] = &[
    ("RMC", 10, parse_rmc),
    ("GGA", 15, parse_gga),
    ("VTG", 9, parse_vtg),
    ("HDG", 2, parse_hdg),
    ("GLL", 7, parse_gll),
    ("HDM", 2, parse_hdm),
    ("HDT", 2, parse_hdt),
    ("MWD", 8, parse_mwd),
    ("VDR", 6, parse_vdr),
    ("VHW", 8, parse_vhw),
    ("VPW", 3, parse_vpw),
    ("MWV", 6, parse_mwv),
    ("VWT", 7, parse_vwt),
    ("WCV", 4, parse_wcv),
    ("XTE", 6, parse_xte),
    ("ZDA", 7, parse_zda),
    ("DBT", 7, parse_dbt),
    ("GSV", 4, parse_gsv),
];

/// Validate the `*HH` checksum: XOR of every byte between `$` and `*`.
///
/// A sentence without `*` is accepted. A checksum that is not exactly two
/// hex digits fails.
pub fn validate_checksum(sentence: &str) -> bool {
    let sentence = sentence.trim_end();
    let Some(star) = sentence.find('*') else {
        return true;
    };

    let body = sentence.get(1..star).unwrap_or("");
    let given = &sentence[star + 1..];
    if given.len() != 2 {
        return false;
    }
    let Ok(expected) = u8::from_str_radix(given, 16) else {
        return false;
    };

    checksum(body) == expected
}

/// XOR checksum over the bytes of `body`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Convert an NMEA `DDMM.MMMM` / `DDDMM.MMMM` coordinate to signed decimal
/// degrees.
///
/// The degree width is taken from the position of the decimal point: a dot at
/// index 4 means two degree digits, anything else three. `S` and `W` negate.
/// Returns NaN on malformed input.
pub fn nmea_coord_to_dec(coord: &str, hemisphere: &str) -> f64 {
    let coord = coord.trim();
    if coord.len() < 4 || !coord.is_ascii() {
        return f64::NAN;
    }
    let Some(dot) = coord.find('.') else {
        return f64::NAN;
    };

    let deg_len = if dot == 4 { 2 } else { 3 };
    if coord.len() < deg_len {
        return f64::NAN;
    }
    let (deg, min) = coord.split_at(deg_len);
    let (Ok(degrees), Ok(minutes)) = (deg.parse::<f64>(), min.parse::<f64>()) else {
        return f64::NAN;
    };

    let decimal = degrees + minutes / 60.0;
    match hemisphere.trim() {
        "S" | "W" => -decimal,
        _ => decimal,
    }
}

/// Split a sentence into fields, ignoring everything from `*` onward.
pub fn split_fields(sentence: &str) -> Vec<&str> {
    let data = match sentence.find('*') {
        Some(star) => &sentence[..star],
        None => sentence,
    };
    data.split(',').collect()
}

/// Parse one sentence into the store.
///
/// Returns the handled sentence type (e.g. "RMC").
pub fn parse_sentence(
    store: &mut SignalKStore,
    sentence: &str,
    origin: &str,
) -> Result<&'static str, Nmea0183Error> {
    let sentence = sentence.trim();
    if sentence.len() < 7 || !sentence.starts_with('$') {
        return Err(Nmea0183Error::NotASentence);
    }

    if !validate_checksum(sentence) {
        tracing::warn!("NMEA0183 checksum mismatch, using sentence anyway: {}", sentence);
    }

    let fields = split_fields(sentence);
    let address = fields[0];

    let Some(&(kind, min, handler)) = SENTENCES
        .iter()
        .find(|(suffix, _, _)| address.ends_with(suffix))
    else {
        return Err(Nmea0183Error::Unsupported(address.trim_start_matches('$').to_string()));
    };

    if fields.len() < min {
        return Err(Nmea0183Error::TooShort {
            kind,
            min,
            got: fields.len(),
        });
    }

    let mut writer = SentenceWriter {
        store,
        source: format!("nmea0183.{}", origin),
    };
    handler(&mut writer, &fields)?;
    Ok(kind)
}

struct SentenceWriter<'a> {
    store: &'a mut SignalKStore,
    source: String,
}

impl SentenceWriter<'_> {
    fn numeric(&mut self, path: &str, value: f64, units: &str, description: &str) {
        let units = (!units.is_empty()).then_some(units);
        self.store
            .set_numeric(path, value, &self.source, units, Some(description));
    }

    fn position(&mut self, lat: f64, lon: f64) {
        if !lat.is_nan() && !lon.is_nan() {
            self.store.update_navigation_position(lat, lon, &self.source);
        }
    }

    /// Write an angle given in degrees, if it is within `[0, 360]`.
    fn angle(&mut self, path: &str, degrees: f64, description: &str) {
        if valid_angle(degrees) {
            self.numeric(path, deg_to_rad(degrees), "rad", description);
        }
    }

    /// Write a speed given in knots, if it is non-negative.
    fn speed_knots(&mut self, path: &str, knots: f64, description: &str) -> Option<f64> {
        let ms = knots_to_ms(knots);
        if valid_speed(ms) {
            self.numeric(path, ms, "m/s", description);
            Some(ms)
        } else {
            None
        }
    }
}

fn num(field: &str) -> f64 {
    let field = field.trim();
    if field.is_empty() {
        return f64::NAN;
    }
    field.parse().unwrap_or(f64::NAN)
}

fn valid_angle(degrees: f64) -> bool {
    !degrees.is_nan() && (0.0..=360.0).contains(&degrees)
}

fn valid_speed(speed: f64) -> bool {
    !speed.is_nan() && speed >= 0.0
}

fn parse_rmc(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    if f[2] != "A" {
        return Err(Nmea0183Error::InvalidStatus("RMC"));
    }
    w.position(nmea_coord_to_dec(f[3], f[4]), nmea_coord_to_dec(f[5], f[6]));
    w.speed_knots("navigation.speedOverGround", num(f[7]), "Speed over ground");
    w.angle("navigation.courseOverGroundTrue", num(f[8]), "Course over ground (true)");
    Ok(())
}

fn parse_gga(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    let lat = nmea_coord_to_dec(f[2], f[3]);
    let lon = nmea_coord_to_dec(f[4], f[5]);
    let satellites = num(f[7]);
    let altitude = num(f[9]);

    if !lat.is_nan() && !lon.is_nan() {
        if satellites >= 0.0 {
            w.numeric("navigation.gnss.satellitesInView", satellites.trunc(), "", "Satellites in view");
        }
        w.position(lat, lon);
    }
    if !altitude.is_nan() {
        w.numeric("navigation.gnss.altitude", altitude, "m", "Altitude");
    }
    Ok(())
}

fn parse_vtg(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.angle("navigation.courseOverGroundTrue", num(f[1]), "Course over ground");
    w.speed_knots("navigation.speedOverGround", num(f[5]), "Speed over ground");
    Ok(())
}

fn parse_hdg(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.angle("navigation.headingMagnetic", num(f[1]), "Heading (magnetic)");
    Ok(())
}

fn parse_gll(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    if f[6] != "A" {
        return Err(Nmea0183Error::InvalidStatus("GLL"));
    }
    w.position(nmea_coord_to_dec(f[1], f[2]), nmea_coord_to_dec(f[3], f[4]));
    Ok(())
}

fn parse_hdm(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.angle("navigation.headingMagnetic", num(f[1]), "Heading (magnetic)");
    Ok(())
}

fn parse_hdt(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.angle("navigation.headingTrue", num(f[1]), "Heading (true)");
    Ok(())
}

fn parse_mwd(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.angle("environment.wind.directionTrue", num(f[1]), "Wind direction (true)");
    w.angle("environment.wind.directionMagnetic", num(f[3]), "Wind direction (magnetic)");
    if let Some(ms) = w.speed_knots("environment.wind.speedTrue", num(f[5]), "Wind speed (true)") {
        w.store.update_wind_alarm(ms);
    }
    Ok(())
}

fn parse_vdr(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.angle("navigation.current.setTrue", num(f[1]), "Current set (true)");
    w.speed_knots("navigation.current.drift", num(f[3]), "Current drift");
    Ok(())
}

fn parse_vhw(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.angle("navigation.headingTrue", num(f[1]), "Heading (true)");
    w.angle("navigation.headingMagnetic", num(f[3]), "Heading (magnetic)");
    w.speed_knots("navigation.speedThroughWater", num(f[5]), "Speed through water");
    Ok(())
}

fn parse_vpw(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.speed_knots("navigation.speedThroughWater", num(f[1]), "Speed through water");
    Ok(())
}

fn parse_mwv(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    if f[5] != "A" {
        return Err(Nmea0183Error::InvalidStatus("MWV"));
    }

    let angle = num(f[1]);
    let speed = num(f[3]);
    let speed_ms = match f[4] {
        "M" => speed,
        "K" => speed / 3.6,
        _ => knots_to_ms(speed),
    };

    if !valid_angle(angle) || !valid_speed(speed_ms) {
        return Ok(());
    }

    match f[2] {
        "R" => {
            w.numeric("environment.wind.angleApparent", deg_to_rad(angle), "rad", "Apparent wind angle");
            w.numeric("environment.wind.speedApparent", speed_ms, "m/s", "Apparent wind speed");
        }
        "T" => {
            w.numeric("environment.wind.angleTrueWater", deg_to_rad(angle), "rad", "True wind angle");
            w.numeric("environment.wind.speedTrue", speed_ms, "m/s", "True wind speed");
            w.store.update_wind_alarm(speed_ms);
        }
        _ => {}
    }
    Ok(())
}

/// `$--VWT,angle,L/R,knots,N,m/s,M,km/h,K`; a port (`L`) angle is negative.
fn parse_vwt(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    if let Some(ms) = w.speed_knots("environment.wind.speedTrue", num(f[3]), "True wind speed") {
        w.store.update_wind_alarm(ms);
    }

    let angle = num(f[1]);
    if valid_angle(angle) {
        let signed = if f[2] == "L" { -angle } else { angle };
        w.numeric("environment.wind.angleTrueWater", deg_to_rad(signed), "rad", "True wind angle");
    }
    Ok(())
}

fn parse_wcv(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    w.speed_knots(
        "navigation.course.nextPoint.velocityMadeGood",
        num(f[1]),
        "Velocity made good to waypoint",
    );
    Ok(())
}

fn parse_xte(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    if f[1] != "A" || f[2] != "A" {
        return Err(Nmea0183Error::InvalidStatus("XTE"));
    }
    let nm = num(f[3]);
    if !nm.is_nan() {
        let meters = nm * NM_TO_M;
        let signed = if f[4] == "L" { -meters } else { meters };
        w.numeric("navigation.course.crossTrackError", signed, "m", "Cross-track error");
    }
    Ok(())
}

/// `$--ZDA,hhmmss.ss,dd,mm,yyyy,zh,zm`
fn parse_zda(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    use chrono::{NaiveDate, NaiveTime, SecondsFormat};

    let time = f[1].trim();
    if time.len() < 6 || !time.is_ascii() {
        return Ok(());
    }
    let (Ok(h), Ok(m), Ok(s)) = (
        time[0..2].parse::<u32>(),
        time[2..4].parse::<u32>(),
        time[4..6].parse::<u32>(),
    ) else {
        return Ok(());
    };
    let millis = time
        .get(6..)
        .and_then(|frac| frac.parse::<f64>().ok())
        .map(|frac| (frac * 1000.0).round() as u32)
        .unwrap_or(0)
        .min(999);

    let (Ok(day), Ok(month), Ok(year)) = (
        f[2].trim().parse::<u32>(),
        f[3].trim().parse::<u32>(),
        f[4].trim().parse::<i32>(),
    ) else {
        return Ok(());
    };

    let (Some(date), Some(time)) = (
        NaiveDate::from_ymd_opt(year, month, day),
        NaiveTime::from_hms_milli_opt(h, m, s, millis),
    ) else {
        return Ok(());
    };

    let iso = date
        .and_time(time)
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    let source = w.source.clone();
    w.store
        .set_text("navigation.datetime", &iso, &source, None, Some("GNSS date and time"));
    Ok(())
}

fn parse_dbt(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    let feet = num(f[1]);
    let meters = num(f[3]);
    let depth = if meters.is_nan() { feet * FEET_TO_M } else { meters };

    if !depth.is_nan() && depth >= 0.0 {
        w.numeric("environment.depth.belowTransducer", depth, "m", "Depth below transducer");
        w.store.update_depth_alarm(depth);
    }
    Ok(())
}

fn parse_gsv(w: &mut SentenceWriter<'_>, f: &[&str]) -> Result<(), Nmea0183Error> {
    let satellites = num(f[3]);
    if !satellites.is_nan() && satellites >= 0.0 {
        w.numeric("navigation.gnss.satellitesInView", satellites.trunc(), "", "Satellites in view");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use signalk_core::alarms::WIND_KEY;
    use signalk_core::StoreValue;

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    fn store() -> SignalKStore {
        SignalKStore::new("urn:mrn:signalk:uuid:test")
    }

    /// Build a sentence with a correct checksum.
    fn sentence(body: &str) -> String {
        format!("${}*{:02X}", body, checksum(body))
    }

    #[test]
    fn test_coord_conversion() {
        assert!((nmea_coord_to_dec("4807.038", "N") - 48.1173).abs() < 1e-4);
        assert!((nmea_coord_to_dec("01131.000", "E") - 11.5167).abs() < 1e-4);
        assert!((nmea_coord_to_dec("4807.038", "S") + 48.1173).abs() < 1e-4);
        assert!((nmea_coord_to_dec("01131.000", "W") + 11.5167).abs() < 1e-4);
    }

    #[test]
    fn test_coord_malformed_is_nan() {
        assert!(nmea_coord_to_dec("", "N").is_nan());
        assert!(nmea_coord_to_dec("480", "N").is_nan());
        assert!(nmea_coord_to_dec("4807038", "N").is_nan());
        assert!(nmea_coord_to_dec("48x7.038", "N").is_nan());
    }

    #[test]
    fn test_checksum_validation() {
        assert!(validate_checksum(RMC));
        assert!(validate_checksum("$GPRMC,123519,A"));
        assert!(!validate_checksum(
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6B"
        ));
        assert!(!validate_checksum("$GPHDT,1.0,T*6"));
        assert!(!validate_checksum("$GPHDT,1.0,T*ZZ"));
    }

    #[test]
    fn test_parse_rmc() {
        let mut store = store();
        assert_eq!(parse_sentence(&mut store, RMC, "serial"), Ok("RMC"));

        let pos = store.position().unwrap();
        assert!((pos.latitude - 48.1173).abs() < 1e-4);
        assert!((pos.longitude - 11.5167).abs() < 1e-4);

        let sog = store.numeric("navigation.speedOverGround").unwrap();
        assert!((sog - 11.52).abs() < 0.02, "sog {sog}");
        let cog = store.numeric("navigation.courseOverGroundTrue").unwrap();
        assert!((cog - 1.473).abs() < 1e-3, "cog {cog}");

        let record = store.get("navigation.speedOverGround").unwrap();
        assert_eq!(record.source, "nmea0183.serial");
        assert_eq!(record.units.as_deref(), Some("m/s"));
    }

    #[test]
    fn test_bad_checksum_still_updates_store() {
        let mut store = store();
        let corrupted = RMC.replace("*6A", "*6B");
        assert!(!validate_checksum(&corrupted));

        assert_eq!(parse_sentence(&mut store, &corrupted, "serial"), Ok("RMC"));
        assert!(store.position().is_some());
        assert!(store.numeric("navigation.speedOverGround").is_some());
    }

    #[test]
    fn test_rmc_void_status_rejected() {
        let mut store = store();
        let void = sentence("GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W");
        assert_eq!(
            parse_sentence(&mut store, &void, "serial"),
            Err(Nmea0183Error::InvalidStatus("RMC"))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_short_sentence_ignored() {
        let mut store = store();
        let short = sentence("GPRMC,123519,A,4807.038");
        assert!(matches!(
            parse_sentence(&mut store, &short, "serial"),
            Err(Nmea0183Error::TooShort { kind: "RMC", min: 10, .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_unsupported_and_garbage() {
        let mut store = store();
        assert_eq!(
            parse_sentence(&mut store, "$GPXYZ,1,2,3", "serial"),
            Err(Nmea0183Error::Unsupported("GPXYZ".to_string()))
        );
        assert_eq!(
            parse_sentence(&mut store, "garbage", "serial"),
            Err(Nmea0183Error::NotASentence)
        );
    }

    #[test]
    fn test_invalid_fields_dropped_individually() {
        let mut store = store();
        let vtg = sentence("GPVTG,400.0,T,,M,5.0,N,9.3,K,A");
        parse_sentence(&mut store, &vtg, "serial").unwrap();
        assert!(store.get("navigation.courseOverGroundTrue").is_none());
        assert!(store.numeric("navigation.speedOverGround").is_some());

        let vtg = sentence("GPVTG,90.0,T,,M,-1.0,N,,K,A");
        parse_sentence(&mut store, &vtg, "serial").unwrap();
        assert!(store.numeric("navigation.courseOverGroundTrue").is_some());
        assert!((store.numeric("navigation.speedOverGround").unwrap() - 2.572).abs() < 1e-3);
    }

    #[test]
    fn test_gga_writes_position_satellites_altitude() {
        let mut store = store();
        let gga = sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert_eq!(parse_sentence(&mut store, &gga, "gps"), Ok("GGA"));
        assert_eq!(store.numeric("navigation.gnss.satellitesInView"), Some(8.0));
        assert_eq!(store.numeric("navigation.gnss.altitude"), Some(545.4));
        assert!(store.position().is_some());
    }

    #[test]
    fn test_mwv_relative_and_true() {
        let mut store = store();
        parse_sentence(&mut store, &sentence("IIMWV,045.0,R,10.0,N,A"), "serial").unwrap();
        assert!((store.numeric("environment.wind.angleApparent").unwrap() - 0.7854).abs() < 1e-4);
        assert!((store.numeric("environment.wind.speedApparent").unwrap() - 5.14444).abs() < 1e-4);

        parse_sentence(&mut store, &sentence("IIMWV,090.0,T,7.5,M,A"), "serial").unwrap();
        assert_eq!(store.numeric("environment.wind.speedTrue"), Some(7.5));
        assert!(store.numeric("environment.wind.angleTrueWater").is_some());
    }

    #[test]
    fn test_mwv_void_is_rejected() {
        let mut store = store();
        assert_eq!(
            parse_sentence(&mut store, &sentence("IIMWV,045.0,R,10.0,N,V"), "serial"),
            Err(Nmea0183Error::InvalidStatus("MWV"))
        );
    }

    #[test]
    fn test_true_wind_drives_alarm() {
        let mut store = store();
        store.set_json(
            "navigation.anchor.akat",
            json!({"wind": {"alarm": true, "max_speed": 20.0}}),
            "app",
            None,
            None,
        );
        parse_sentence(&mut store, &sentence("IIMWD,270.0,T,268.0,M,25.0,N,12.9,M"), "serial")
            .unwrap();

        let record = store.get(&format!("notifications.{}", WIND_KEY)).unwrap();
        match &record.value {
            StoreValue::Json(v) => assert_eq!(v["state"], "alarm"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_vwt_port_angle_is_negative() {
        let mut store = store();
        parse_sentence(&mut store, &sentence("IIVWT,030.0,L,12.0,N,6.2,M,22.2,K"), "serial")
            .unwrap();
        assert!((store.numeric("environment.wind.angleTrueWater").unwrap() + 0.5236).abs() < 1e-4);
        assert!((store.numeric("environment.wind.speedTrue").unwrap() - 6.1733).abs() < 1e-3);
    }

    #[test]
    fn test_dbt_prefers_meters_then_feet() {
        let mut store = store();
        parse_sentence(&mut store, &sentence("SDDBT,32.8,f,10.0,M,5.5,F"), "serial").unwrap();
        assert_eq!(store.numeric("environment.depth.belowTransducer"), Some(10.0));

        parse_sentence(&mut store, &sentence("SDDBT,10.0,f,,M,,F"), "serial").unwrap();
        assert!((store.numeric("environment.depth.belowTransducer").unwrap() - 3.048).abs() < 1e-9);
    }

    #[test]
    fn test_xte_left_is_negative() {
        let mut store = store();
        parse_sentence(&mut store, &sentence("GPXTE,A,A,0.5,L,N"), "serial").unwrap();
        assert_eq!(store.numeric("navigation.course.crossTrackError"), Some(-926.0));
    }

    #[test]
    fn test_zda_sets_datetime() {
        let mut store = store();
        parse_sentence(&mut store, &sentence("GPZDA,201530.00,04,07,2002,00,00"), "gps").unwrap();
        assert_eq!(
            store.get("navigation.datetime").unwrap().value,
            StoreValue::Text("2002-07-04T20:15:30.000Z".to_string())
        );

        let mut other = self::store();
        parse_sentence(&mut other, &sentence("GPZDA,201530.00,31,02,2002,00,00"), "gps").unwrap();
        assert!(other.get("navigation.datetime").is_none());
    }

    #[test]
    fn test_headings_and_water_speed() {
        let mut store = store();
        parse_sentence(&mut store, &sentence("HCHDG,180.0,,,,"), "serial").unwrap();
        parse_sentence(&mut store, &sentence("IIHDT,90.0,T"), "serial").unwrap();
        parse_sentence(&mut store, &sentence("IIVHW,,T,,M,6.0,N,11.1,K"), "serial").unwrap();

        assert!((store.numeric("navigation.headingMagnetic").unwrap() - std::f64::consts::PI).abs() < 1e-9);
        assert!((store.numeric("navigation.headingTrue").unwrap() - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((store.numeric("navigation.speedThroughWater").unwrap() - 3.0867).abs() < 1e-3);
    }

    #[test]
    fn test_gsv_and_gll() {
        let mut store = store();
        parse_sentence(&mut store, &sentence("GPGSV,3,1,11,03,03,111,00"), "gps").unwrap();
        assert_eq!(store.numeric("navigation.gnss.satellitesInView"), Some(11.0));

        parse_sentence(&mut store, &sentence("GPGLL,4916.45,N,12311.12,W,225444,A"), "gps").unwrap();
        let pos = store.position().unwrap();
        assert!((pos.latitude - 49.2742).abs() < 1e-3);
        assert!((pos.longitude + 123.1853).abs() < 1e-3);
    }
}
