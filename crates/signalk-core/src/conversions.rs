//! Unit conversions and geodesy helpers.
//!
//! SignalK stores everything in SI units (m/s, radians, Kelvin, meters), while
//! the instrument buses speak knots, degrees, feet and Celsius.

use std::f64::consts::PI;

/// Mean earth radius used for haversine distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Knots to meters per second.
pub const KNOTS_TO_MS: f64 = 0.514444;

/// Meters per second to knots (used when regenerating NMEA 0183).
pub const MS_TO_KNOTS: f64 = 1.94384;

/// Feet to meters.
pub const FEET_TO_M: f64 = 0.3048;

/// Nautical miles to meters.
pub const NM_TO_M: f64 = 1852.0;

/// Offset between Celsius and Kelvin.
pub const KELVIN_OFFSET: f64 = 273.15;

pub fn knots_to_ms(knots: f64) -> f64 {
    knots * KNOTS_TO_MS
}

/// Inverse of [`knots_to_ms`], exact so alarm thresholds round-trip.
pub fn ms_to_knots(ms: f64) -> f64 {
    ms / KNOTS_TO_MS
}

pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad * 180.0 / PI
}

pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + KELVIN_OFFSET
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Great-circle distance in meters between two WGS84 positions given in
/// decimal degrees, on a spherical earth.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = deg_to_rad(lat2 - lat1);
    let d_lon = deg_to_rad(lon2 - lon1);
    let a = (d_lat / 2.0).sin().powi(2)
        + deg_to_rad(lat1).cos() * deg_to_rad(lat2).cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_one_degree_of_latitude() {
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 111_195.0 * 0.005, "got {d}");
    }

    #[test]
    fn test_haversine_same_point() {
        assert_eq!(haversine_distance(48.1, 11.5, 48.1, 11.5), 0.0);
    }

    #[test]
    fn test_speed_conversions() {
        assert!((knots_to_ms(22.4) - 11.5235).abs() < 1e-3);
        assert!((ms_to_knots(knots_to_ms(20.0)) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_angle_conversions() {
        assert!((deg_to_rad(180.0) - PI).abs() < 1e-12);
        assert!((rad_to_deg(PI / 2.0) - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_temperature_conversions() {
        assert!((celsius_to_kelvin(20.0) - 293.15).abs() < 1e-9);
        assert!((kelvin_to_celsius(273.15)).abs() < 1e-9);
    }
}
