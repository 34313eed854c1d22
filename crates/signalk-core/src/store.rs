//! SignalK data store.
//!
//! The store maps each dotted path to exactly one [`PathRecord`]. Writes are
//! last-write-wins regardless of source, and every write marks the record
//! changed, even when the value is identical to the previous one.
//!
//! Two paths are special:
//! - `navigation.anchor.akat` (and sub-fields under it) is normalized through
//!   the alarm settings and persisted; see [`crate::anchor`].
//! - `navigation.position` writes re-run the geofence monitor.

use crate::alarms::{AlarmOutcome, AlarmSettings, AlarmState, LogNotifier, PushNotifier, Transition};
use crate::anchor::{merge_field, ANCHOR_FIELD_PREFIX, ANCHOR_PATH, MAX_PERSISTED_BYTES};
use crate::config::ConfigStorage;
use crate::model::{PathValue, Position};
use crate::path::PathPattern;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Path of the vessel position.
pub const POSITION_PATH: &str = "navigation.position";

/// Source tag of alarm notifications.
pub const ALARM_SOURCE: &str = "signalk.alarms";

/// A stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Numeric(f64),
    Text(String),
    Json(Value),
}

impl StoreValue {
    /// Render for the wire. Non-finite numbers become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            StoreValue::Numeric(n) => json!(n),
            StoreValue::Text(s) => Value::String(s.clone()),
            StoreValue::Json(v) => v.clone(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StoreValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }
}

/// One record per path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRecord {
    pub value: StoreValue,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub units: Option<String>,
    pub description: Option<String>,
    pub changed: bool,
}

impl PathRecord {
    /// ISO-8601 timestamp with milliseconds, UTC.
    pub fn timestamp_string(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn to_path_value(&self, path: &str) -> PathValue {
        PathValue {
            path: path.to_string(),
            value: self.value.to_json(),
            units: self.units.clone(),
            description: self.description.clone(),
        }
    }
}

/// The canonical path store.
pub struct SignalKStore {
    self_urn: String,
    records: BTreeMap<String, PathRecord>,
    last_sent: BTreeMap<String, StoreValue>,
    alarms: AlarmSettings,
    storage: Option<Arc<dyn ConfigStorage>>,
    notifier: Arc<dyn PushNotifier>,
}

impl std::fmt::Debug for SignalKStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalKStore")
            .field("self_urn", &self.self_urn)
            .field("paths", &self.records.len())
            .field("alarms", &self.alarms)
            .finish()
    }
}

impl SignalKStore {
    /// Create an empty store. `self_urn` is the bare vessel URN
    /// ("urn:mrn:signalk:uuid:...").
    pub fn new(self_urn: impl Into<String>) -> Self {
        Self {
            self_urn: self_urn.into(),
            records: BTreeMap::new(),
            last_sent: BTreeMap::new(),
            alarms: AlarmSettings::default(),
            storage: None,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Persist the anchor composite to `storage`.
    pub fn with_storage(mut self, storage: Arc<dyn ConfigStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Hand push requests to `notifier` instead of logging them.
    pub fn with_notifier(mut self, notifier: Arc<dyn PushNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn self_urn(&self) -> &str {
        &self.self_urn
    }

    /// Context used in outgoing deltas, "vessels.<urn>".
    pub fn self_context(&self) -> String {
        format!("vessels.{}", self.self_urn)
    }

    pub fn alarms(&self) -> &AlarmSettings {
        &self.alarms
    }

    pub fn get(&self, path: &str) -> Option<&PathRecord> {
        self.records.get(path)
    }

    /// Numeric value at `path`, if the record is numeric.
    pub fn numeric(&self, path: &str) -> Option<f64> {
        self.records.get(path).and_then(|r| r.value.as_f64())
    }

    /// Current vessel position, read from `navigation.position`.
    pub fn position(&self) -> Option<Position> {
        match &self.records.get(POSITION_PATH)?.value {
            StoreValue::Json(v) => {
                let lat = v.get("latitude")?.as_f64()?;
                let lon = v.get("longitude")?.as_f64()?;
                Some(Position {
                    latitude: lat,
                    longitude: lon,
                })
            }
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PathRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value last handed to [`take_changes`](Self::take_changes) for `path`.
    pub fn last_sent(&self, path: &str) -> Option<&StoreValue> {
        self.last_sent.get(path)
    }

    pub fn has_changes(&self) -> bool {
        self.records.values().any(|r| r.changed)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    pub fn set_numeric(
        &mut self,
        path: &str,
        value: f64,
        source: &str,
        units: Option<&str>,
        description: Option<&str>,
    ) {
        if let Some(field) = path.strip_prefix(ANCHOR_FIELD_PREFIX) {
            self.merge_anchor_field(field, json!(value), source);
            return;
        }
        self.put(path, StoreValue::Numeric(value), source, units, description);
    }

    pub fn set_text(
        &mut self,
        path: &str,
        value: &str,
        source: &str,
        units: Option<&str>,
        description: Option<&str>,
    ) {
        if let Some(field) = path.strip_prefix(ANCHOR_FIELD_PREFIX) {
            self.merge_anchor_field(field, Value::String(value.to_string()), source);
            return;
        }
        self.put(path, StoreValue::Text(value.to_string()), source, units, description);
    }

    /// Store a JSON value. Writes to the anchor composite are normalized,
    /// persisted and followed by a geofence evaluation.
    pub fn set_json(
        &mut self,
        path: &str,
        value: Value,
        source: &str,
        units: Option<&str>,
        description: Option<&str>,
    ) {
        if let Some(field) = path.strip_prefix(ANCHOR_FIELD_PREFIX) {
            self.merge_anchor_field(field, value, source);
            return;
        }
        if path == ANCHOR_PATH {
            self.write_anchor_config(&value, source, description);
            return;
        }
        self.put(path, StoreValue::Json(value), source, units, description);
    }

    /// Write `{latitude, longitude}` to `navigation.position` and evaluate
    /// the geofence. NaN on either axis rejects the update.
    pub fn update_navigation_position(&mut self, lat: f64, lon: f64, source: &str) {
        if lat.is_nan() || lon.is_nan() {
            tracing::debug!("Position update from {} rejected: NaN", source);
            return;
        }

        self.put(
            POSITION_PATH,
            StoreValue::Json(json!({ "latitude": lat, "longitude": lon })),
            source,
            None,
            Some("Vessel position"),
        );
        self.evaluate_geofence();
    }

    /// Feed a depth sample (meters) to the depth monitor.
    pub fn update_depth_alarm(&mut self, depth: f64) {
        let outcome = self.alarms.depth.evaluate(depth);
        self.apply_outcome(outcome);
    }

    /// Feed a true wind speed sample (m/s) to the wind monitor.
    pub fn update_wind_alarm(&mut self, wind_ms: f64) {
        let outcome = self.alarms.wind.evaluate(wind_ms);
        self.apply_outcome(outcome);
    }

    /// Re-run the geofence against the stored position.
    pub fn evaluate_geofence(&mut self) {
        let position = self.position();
        let outcome = self.alarms.geofence.evaluate(position);
        self.apply_outcome(outcome);
    }

    /// Apply a persisted anchor composite at startup and publish it, without
    /// writing it back to storage.
    pub fn restore_anchor_config(&mut self, blob: &Value) {
        self.alarms.restore_anchor_config(blob);
        let canonical = self.alarms.anchor_config_json();
        self.put(
            ANCHOR_PATH,
            StoreValue::Json(canonical),
            "storage",
            None,
            Some("Restored anchor configuration"),
        );
        tracing::info!(
            geofence = self.alarms.geofence.enabled,
            depth = self.alarms.depth.enabled,
            wind = self.alarms.wind.enabled,
            "Restored anchor configuration"
        );
    }

    // ------------------------------------------------------------------------
    // Reads for distribution
    // ------------------------------------------------------------------------

    /// Collect every changed record, clear its flag and remember the value
    /// as last sent.
    pub fn take_changes(&mut self) -> Vec<PathValue> {
        let mut changes = Vec::new();
        for (path, record) in self.records.iter_mut().filter(|(_, r)| r.changed) {
            record.changed = false;
            changes.push(record.to_path_value(path));
            self.last_sent.insert(path.clone(), record.value.clone());
        }
        changes
    }

    /// Current values of every path matching any of `patterns`.
    pub fn snapshot_matching(&self, patterns: &[PathPattern]) -> Vec<PathValue> {
        self.records
            .iter()
            .filter(|(path, _)| patterns.iter().any(|p| p.matches(path)))
            .map(|(path, record)| record.to_path_value(path))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn put(
        &mut self,
        path: &str,
        value: StoreValue,
        source: &str,
        units: Option<&str>,
        description: Option<&str>,
    ) {
        self.records.insert(
            path.to_string(),
            PathRecord {
                value,
                timestamp: Utc::now(),
                source: source.to_string(),
                units: units.map(str::to_string),
                description: description.map(str::to_string),
                changed: true,
            },
        );
    }

    fn merge_anchor_field(&mut self, field: &str, value: Value, source: &str) {
        let mut composite = match self.records.get(ANCHOR_PATH) {
            Some(PathRecord {
                value: StoreValue::Json(v),
                ..
            }) if v.is_object() => v.clone(),
            _ => self.alarms.anchor_config_json(),
        };
        merge_field(&mut composite, field, value);
        self.write_anchor_config(&composite, source, Some("Anchor configuration"));
    }

    fn write_anchor_config(&mut self, incoming: &Value, source: &str, description: Option<&str>) {
        let changes = self.alarms.apply_anchor_config(incoming);
        tracing::debug!(?changes, "Anchor configuration applied");

        let canonical = self.alarms.anchor_config_json();
        let text = canonical.to_string();
        self.put(ANCHOR_PATH, StoreValue::Json(canonical), source, None, description);
        self.persist_anchor(&text);
        self.evaluate_geofence();
    }

    fn persist_anchor(&self, text: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        if text.len() > MAX_PERSISTED_BYTES {
            tracing::error!(
                "Anchor configuration is {} bytes (limit {}), not persisted",
                text.len(),
                MAX_PERSISTED_BYTES
            );
            return;
        }
        match storage.save_anchor_blob(text) {
            Ok(()) => tracing::debug!("Persisted anchor configuration ({} bytes)", text.len()),
            Err(e) => tracing::error!("Failed to persist anchor configuration: {}", e),
        }
    }

    fn apply_outcome(&mut self, outcome: AlarmOutcome) {
        match outcome.transition {
            Some(Transition::Raised { key, message }) => {
                self.set_notification(key, AlarmState::Alarm, &message);
            }
            Some(Transition::Cleared { key }) => {
                self.set_notification(key, AlarmState::Normal, "");
            }
            None => {}
        }
        if let Some(push) = outcome.push {
            self.notifier.notify(&push);
        }
    }

    fn set_notification(&mut self, key: &str, state: AlarmState, message: &str) {
        let body = json!({
            "state": state.as_str(),
            "method": "visual",
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "message": message,
        });
        self.put(
            &format!("notifications.{}", key),
            StoreValue::Json(body),
            ALARM_SOURCE,
            None,
            Some("Alarm notification"),
        );
        tracing::info!("Notification {} -> {}: {}", key, state.as_str(), message);
    }
}
