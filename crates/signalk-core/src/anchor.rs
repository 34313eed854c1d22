//! The `navigation.anchor.akat` composite configuration.
//!
//! Clients see one JSON object:
//!
//! ```json
//! {
//!   "anchor": {"enabled": true, "radius": 50, "lat": 48.1, "lon": 11.5},
//!   "depth":  {"alarm": true, "min_depth": 2.0},
//!   "wind":   {"alarm": false, "max_speed": 20.0}
//! }
//! ```
//!
//! Internally it is three independent config structs. Incoming objects are
//! applied field by field and the stored JSON is always regenerated from the
//! structs, never echoed from the client.

use crate::alarms::AlarmSettings;
use serde_json::{json, Map, Value};

/// Store path of the composite.
pub const ANCHOR_PATH: &str = "navigation.anchor.akat";

/// Prefix of sub-field writes that merge into the composite.
pub const ANCHOR_FIELD_PREFIX: &str = "navigation.anchor.akat.";

/// Persisted blobs larger than this are not written to storage.
pub const MAX_PERSISTED_BYTES: usize = 1900;

const POSITION_TOLERANCE_DEG: f64 = 0.00001;
const RADIUS_TOLERANCE_M: f64 = 0.1;
const THRESHOLD_TOLERANCE: f64 = 0.01;

/// Which parts of the configuration a request actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnchorChanges {
    pub position: bool,
    pub radius: bool,
    pub depth: bool,
    pub wind: bool,
    /// The request carried `anchor.enabled` but it was not applied.
    pub enabled_ignored: bool,
}

impl AnchorChanges {
    /// A request is about the anchor if it moved the anchor, resized the
    /// fence, or touched neither of the other two monitors.
    pub fn is_geofence_update(&self) -> bool {
        self.position || self.radius || (!self.depth && !self.wind)
    }
}

/// Lenient boolean: JSON bools, or numbers where nonzero is true.
fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Lenient number: JSON numbers or numeric strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Like [`as_number`], but `null` reads as NaN so an unset anchor position
/// survives a round trip through the rendered JSON.
fn as_coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(f64::NAN),
        other => as_number(other),
    }
}

/// True when two values differ by more than `tolerance`. NaN on exactly one
/// side counts as a difference.
fn differs(a: f64, b: f64, tolerance: f64) -> bool {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => false,
        (true, false) | (false, true) => true,
        (false, false) => (a - b).abs() > tolerance,
    }
}

impl AlarmSettings {
    /// Apply a client-supplied composite object.
    ///
    /// `anchor.enabled` is only honored when [`AnchorChanges::is_geofence_update`]
    /// holds, so a depth or wind toggle from an app that echoes a stale anchor
    /// section does not switch the geofence.
    pub fn apply_anchor_config(&mut self, incoming: &Value) -> AnchorChanges {
        let mut changes = AnchorChanges::default();

        let depth = incoming.get("depth").and_then(Value::as_object);
        let wind = incoming.get("wind").and_then(Value::as_object);
        let anchor = incoming.get("anchor").and_then(Value::as_object);

        let depth_enabled = depth.and_then(|d| d.get("alarm")).map(as_flag);
        let depth_threshold = depth.and_then(|d| d.get("min_depth")).and_then(as_number);
        let wind_enabled = wind.and_then(|w| w.get("alarm")).map(as_flag);
        let wind_threshold = wind.and_then(|w| w.get("max_speed")).and_then(as_number);

        if depth_enabled.is_some_and(|e| e != self.depth.enabled)
            || depth_threshold.is_some_and(|t| differs(t, self.depth.threshold, THRESHOLD_TOLERANCE))
        {
            changes.depth = true;
        }
        if wind_enabled.is_some_and(|e| e != self.wind.enabled)
            || wind_threshold.is_some_and(|t| differs(t, self.wind.threshold, THRESHOLD_TOLERANCE))
        {
            changes.wind = true;
        }

        if let Some(anchor) = anchor {
            let lat = anchor.get("lat").and_then(as_coordinate);
            let lon = anchor.get("lon").and_then(as_coordinate);
            if let (Some(lat), Some(lon)) = (lat, lon) {
                if differs(lat, self.geofence.anchor_lat, POSITION_TOLERANCE_DEG)
                    || differs(lon, self.geofence.anchor_lon, POSITION_TOLERANCE_DEG)
                {
                    changes.position = true;
                    tracing::info!(
                        "Anchor position changed: {:.6}, {:.6} -> {:.6}, {:.6}",
                        self.geofence.anchor_lat,
                        self.geofence.anchor_lon,
                        lat,
                        lon
                    );
                }
                self.geofence.anchor_lat = lat;
                self.geofence.anchor_lon = lon;
            }

            if let Some(radius) = anchor.get("radius").and_then(as_number) {
                if differs(radius, self.geofence.radius, RADIUS_TOLERANCE_M) {
                    changes.radius = true;
                    tracing::info!("Geofence radius changed: {:.0} -> {:.0} m", self.geofence.radius, radius);
                }
                self.geofence.radius = radius;
            }

            if let Some(enabled) = anchor.get("enabled").map(as_flag) {
                if changes.is_geofence_update() {
                    if enabled != self.geofence.enabled {
                        tracing::info!("Geofence enabled -> {}", enabled);
                    }
                    self.geofence.enabled = enabled;
                } else {
                    changes.enabled_ignored = true;
                    tracing::debug!(
                        "Ignoring anchor.enabled={} on a depth/wind update",
                        enabled
                    );
                }
            }
        }

        if let Some(threshold) = depth_threshold {
            self.depth.threshold = threshold;
        }
        if let Some(enabled) = depth_enabled {
            self.depth.enabled = enabled;
        }
        if let Some(threshold) = wind_threshold {
            self.wind.threshold = threshold;
        }
        if let Some(enabled) = wind_enabled {
            self.wind.enabled = enabled;
        }

        changes
    }

    /// Apply a persisted composite unconditionally, without the enable
    /// disambiguation. Used once at startup.
    pub fn restore_anchor_config(&mut self, blob: &Value) {
        if let Some(anchor) = blob.get("anchor").and_then(Value::as_object) {
            if let Some(enabled) = anchor.get("enabled") {
                self.geofence.enabled = as_flag(enabled);
            }
            if let Some(radius) = anchor.get("radius").and_then(as_number) {
                self.geofence.radius = radius;
            }
            let lat = anchor.get("lat").and_then(as_coordinate);
            let lon = anchor.get("lon").and_then(as_coordinate);
            if let (Some(lat), Some(lon)) = (lat, lon) {
                self.geofence.anchor_lat = lat;
                self.geofence.anchor_lon = lon;
            }
        }
        if let Some(depth) = blob.get("depth").and_then(Value::as_object) {
            if let Some(enabled) = depth.get("alarm") {
                self.depth.enabled = as_flag(enabled);
            }
            if let Some(threshold) = depth.get("min_depth").and_then(as_number) {
                self.depth.threshold = threshold;
            }
        }
        if let Some(wind) = blob.get("wind").and_then(Value::as_object) {
            if let Some(enabled) = wind.get("alarm") {
                self.wind.enabled = as_flag(enabled);
            }
            if let Some(threshold) = wind.get("max_speed").and_then(as_number) {
                self.wind.threshold = threshold;
            }
        }
    }

    /// Canonical composite regenerated from the live structs. NaN renders as
    /// `null`.
    pub fn anchor_config_json(&self) -> Value {
        json!({
            "anchor": {
                "enabled": self.geofence.enabled,
                "radius": self.geofence.radius,
                "lat": self.geofence.anchor_lat,
                "lon": self.geofence.anchor_lon,
            },
            "depth": {
                "alarm": self.depth.enabled,
                "min_depth": self.depth.threshold,
            },
            "wind": {
                "alarm": self.wind.enabled,
                "max_speed": self.wind.threshold,
            },
        })
    }
}

/// Set `value` at a dotted `field` path inside `target`, creating objects on
/// the way and replacing any non-object in between.
pub fn merge_field(target: &mut Value, field: &str, value: Value) {
    let mut current = target;
    let mut segments = field.split('.').peekable();

    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_render() {
        let settings = AlarmSettings::default();
        assert_eq!(
            settings.anchor_config_json(),
            json!({
                "anchor": {"enabled": false, "radius": 50.0, "lat": null, "lon": null},
                "depth": {"alarm": false, "min_depth": 2.0},
                "wind": {"alarm": false, "max_speed": 20.0},
            })
        );
    }

    #[test]
    fn test_geofence_only_update_applies_enabled() {
        let mut settings = AlarmSettings::default();
        let changes = settings.apply_anchor_config(&json!({
            "anchor": {"enabled": true, "lat": 48.1, "lon": 11.5, "radius": 40}
        }));
        assert!(changes.position);
        assert!(changes.radius);
        assert!(settings.geofence.enabled);
        assert_eq!(settings.geofence.anchor_lat, 48.1);
        assert_eq!(settings.geofence.radius, 40.0);
    }

    #[test]
    fn test_depth_toggle_ignores_stale_anchor_enabled() {
        let mut settings = AlarmSettings::default();
        settings.geofence.enabled = true;
        settings.geofence.anchor_lat = 48.1;
        settings.geofence.anchor_lon = 11.5;

        let changes = settings.apply_anchor_config(&json!({
            "anchor": {"enabled": false, "lat": 48.1, "lon": 11.5, "radius": 50},
            "depth": {"alarm": true, "min_depth": 3.0}
        }));

        assert!(changes.depth);
        assert!(changes.enabled_ignored);
        assert!(settings.geofence.enabled);
        assert!(settings.depth.enabled);
        assert_eq!(settings.depth.threshold, 3.0);
    }

    #[test]
    fn test_unchanged_monitors_let_enabled_through() {
        let mut settings = AlarmSettings::default();
        settings.geofence.enabled = true;

        let changes = settings.apply_anchor_config(&json!({
            "anchor": {"enabled": false},
            "depth": {"alarm": false, "min_depth": 2.0}
        }));
        assert!(changes.is_geofence_update());
        assert!(!settings.geofence.enabled);
    }

    #[test]
    fn test_position_needs_both_coordinates() {
        let mut settings = AlarmSettings::default();
        settings.apply_anchor_config(&json!({"anchor": {"lat": 10.0}}));
        assert!(settings.geofence.anchor_lat.is_nan());
    }

    #[test]
    fn test_numeric_flags_are_lenient() {
        let mut settings = AlarmSettings::default();
        settings.apply_anchor_config(&json!({"wind": {"alarm": 1, "max_speed": 25}}));
        assert!(settings.wind.enabled);
        assert_eq!(settings.wind.threshold, 25.0);
    }

    #[test]
    fn test_render_round_trip_is_stable() {
        let mut settings = AlarmSettings::default();
        settings.apply_anchor_config(&json!({
            "anchor": {"enabled": true, "lat": 48.1, "lon": 11.5, "radius": 40},
            "depth": {"alarm": true, "min_depth": 3.5}
        }));
        let rendered = settings.anchor_config_json();

        let mut copy = settings.clone();
        let changes = copy.apply_anchor_config(&rendered);
        assert_eq!(changes, AnchorChanges::default());
        assert_eq!(copy.anchor_config_json(), rendered);
    }

    #[test]
    fn test_restore_is_unconditional() {
        let mut settings = AlarmSettings::default();
        settings.restore_anchor_config(&json!({
            "anchor": {"enabled": true, "radius": 75, "lat": 1.0, "lon": 2.0},
            "depth": {"alarm": true, "min_depth": 4.0},
            "wind": {"alarm": true, "max_speed": 30.0}
        }));
        assert!(settings.geofence.enabled);
        assert!(settings.depth.enabled);
        assert!(settings.wind.enabled);
        assert_eq!(settings.geofence.radius, 75.0);
        assert_eq!(settings.wind.threshold, 30.0);
    }

    #[test]
    fn test_merge_field_creates_nested_objects() {
        let mut target = json!({"anchor": {"radius": 50}});
        merge_field(&mut target, "anchor.enabled", json!(true));
        merge_field(&mut target, "depth.min_depth", json!(3.0));
        assert_eq!(
            target,
            json!({"anchor": {"radius": 50, "enabled": true}, "depth": {"min_depth": 3.0}})
        );
    }
}
