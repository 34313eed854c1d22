//! REST handler logic, independent of any HTTP framework.
//!
//! The binary wraps these with its router; everything here works on the
//! store and plain JSON values.

use crate::path::rest_path_to_dotted;
use crate::store::{PathRecord, SignalKStore};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Reasons a PUT is refused.
#[derive(Debug, Error, PartialEq)]
pub enum PutError {
    #[error("Invalid JSON")]
    InvalidJson,
    #[error("Value cannot be null")]
    NullValue,
}

impl PutError {
    pub fn status_code(&self) -> u16 {
        400
    }
}

/// `{value, timestamp, $source}` for one path, or `None` if unknown.
pub fn get_path(store: &SignalKStore, rest_path: &str) -> Option<Value> {
    let path = rest_path_to_dotted(rest_path);
    let record = store.get(&path)?;
    Some(json!({
        "value": record.value.to_json(),
        "timestamp": record.timestamp_string(),
        "$source": record.source,
    }))
}

/// Apply a PUT body to the store.
///
/// The body is `{value, source?, description?}`; a body without a `value`
/// key is taken as the value itself. Booleans are stored as 1.0 / 0.0.
pub fn put_path(store: &mut SignalKStore, rest_path: &str, body: &[u8]) -> Result<(), PutError> {
    let doc: Value = serde_json::from_slice(body).map_err(|_| PutError::InvalidJson)?;
    let path = rest_path_to_dotted(rest_path);

    let value = match doc.get("value") {
        Some(v) => v.clone(),
        None => doc.clone(),
    };
    let source = doc.get("source").and_then(Value::as_str).unwrap_or("app");
    let description = doc
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("Set by client");

    write_value(store, &path, value, source, description)?;
    tracing::debug!("PUT {} from {}", path, source);
    Ok(())
}

/// Store one client-supplied JSON value under `path`.
///
/// Shared by REST PUT and WebSocket `updates`. Booleans become 1.0 / 0.0,
/// objects and arrays are stored as JSON, null is refused. Every other JSON
/// shape has a mapping.
pub fn write_value(
    store: &mut SignalKStore,
    path: &str,
    value: Value,
    source: &str,
    description: &str,
) -> Result<(), PutError> {
    match value {
        Value::Null => return Err(PutError::NullValue),
        Value::Number(n) => {
            // `as_f64` only fails with serde_json's `arbitrary_precision`.
            let n = n.as_f64().ok_or(PutError::InvalidJson)?;
            store.set_numeric(path, n, source, None, Some(description));
        }
        Value::Bool(b) => {
            store.set_numeric(path, if b { 1.0 } else { 0.0 }, source, None, Some(description));
        }
        Value::String(s) => {
            store.set_text(path, &s, source, None, Some(description));
        }
        v @ (Value::Object(_) | Value::Array(_)) => {
            store.set_json(path, v, source, None, Some(description));
        }
    }
    Ok(())
}

/// Body of a successful PUT response.
pub fn put_completed() -> Value {
    json!({"state": "COMPLETED", "statusCode": 200})
}

/// Body of a refused PUT.
pub fn put_failed(err: &PutError) -> Value {
    json!({"state": "COMPLETED", "statusCode": err.status_code(), "message": err.to_string()})
}

/// The self vessel as a nested tree, built by splitting the flat paths.
///
/// Leaves are `{value, timestamp, $source, meta?}`.
pub fn vessel_tree(store: &SignalKStore) -> Value {
    let mut root = Map::new();
    root.insert("uuid".to_string(), Value::String(store.self_urn().to_string()));

    for (path, record) in store.iter() {
        insert_leaf(&mut root, path, leaf(record));
    }

    Value::Object(root)
}

/// Root document served at `/signalk/v1/api`.
pub fn api_root(store: &SignalKStore, version: &str) -> Value {
    let mut vessels = Map::new();
    vessels.insert(store.self_urn().to_string(), vessel_tree(store));
    json!({
        "version": version,
        "self": store.self_context(),
        "vessels": vessels,
    })
}

fn leaf(record: &PathRecord) -> Value {
    let mut obj = Map::new();
    obj.insert("value".to_string(), record.value.to_json());
    obj.insert("timestamp".to_string(), Value::String(record.timestamp_string()));
    obj.insert("$source".to_string(), Value::String(record.source.clone()));

    let mut meta = Map::new();
    if let Some(units) = &record.units {
        meta.insert("units".to_string(), Value::String(units.clone()));
    }
    if let Some(description) = &record.description {
        meta.insert("description".to_string(), Value::String(description.clone()));
    }
    if !meta.is_empty() {
        obj.insert("meta".to_string(), Value::Object(meta));
    }
    Value::Object(obj)
}

fn insert_leaf(root: &mut Map<String, Value>, path: &str, leaf: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        // A leaf already sits where a branch is needed; keep the leaf.
        let Value::Object(map) = entry else {
            return;
        };
        current = map;
    }
    current.insert(last.to_string(), leaf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreValue;

    const URN: &str = "urn:mrn:signalk:uuid:test-vessel";

    #[test]
    fn test_get_path() {
        let mut store = SignalKStore::new(URN);
        store.set_numeric("navigation.speedOverGround", 3.85, "nmea0183.serial", Some("m/s"), None);

        let body = get_path(&store, "navigation/speedOverGround").unwrap();
        assert_eq!(body["value"], 3.85);
        assert_eq!(body["$source"], "nmea0183.serial");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

        assert!(get_path(&store, "navigation/missing").is_none());
    }

    #[test]
    fn test_put_number_bool_and_string() {
        let mut store = SignalKStore::new(URN);

        put_path(&mut store, "environment/depth/offset", br#"{"value": 0.4}"#).unwrap();
        put_path(&mut store, "electrical/switches/light", br#"{"value": true, "source": "panel"}"#).unwrap();
        put_path(&mut store, "name", br#"{"value": "Aurora"}"#).unwrap();

        assert_eq!(store.numeric("environment.depth.offset"), Some(0.4));
        let light = store.get("electrical.switches.light").unwrap();
        assert_eq!(light.value, StoreValue::Numeric(1.0));
        assert_eq!(light.source, "panel");
        assert_eq!(
            store.get("name").unwrap().value,
            StoreValue::Text("Aurora".to_string())
        );
        assert_eq!(
            store.get("name").unwrap().description.as_deref(),
            Some("Set by client")
        );
    }

    #[test]
    fn test_put_rejects_null_and_bad_json() {
        let mut store = SignalKStore::new(URN);
        assert_eq!(
            put_path(&mut store, "a/b", br#"{"value": null}"#),
            Err(PutError::NullValue)
        );
        assert_eq!(put_path(&mut store, "a/b", b"{not json"), Err(PutError::InvalidJson));
        assert!(store.is_empty());
    }

    #[test]
    fn test_every_non_null_shape_is_stored() {
        let mut store = SignalKStore::new(URN);

        write_value(&mut store, "a.big", json!(u64::MAX), "app", "x").unwrap();
        write_value(&mut store, "a.negative", json!(i64::MIN), "app", "x").unwrap();
        write_value(&mut store, "a.list", json!([1, "two"]), "app", "x").unwrap();
        write_value(&mut store, "a.object", json!({"k": false}), "app", "x").unwrap();

        assert_eq!(store.numeric("a.big"), Some(u64::MAX as f64));
        assert_eq!(store.numeric("a.negative"), Some(i64::MIN as f64));
        assert_eq!(store.get("a.list").unwrap().value, StoreValue::Json(json!([1, "two"])));
        assert_eq!(store.get("a.object").unwrap().value.to_json(), json!({"k": false}));
        assert_eq!(
            write_value(&mut store, "a.null", Value::Null, "app", "x"),
            Err(PutError::NullValue)
        );
    }

    #[test]
    fn test_put_anchor_config_is_normalized() {
        let mut store = SignalKStore::new(URN);
        put_path(
            &mut store,
            "navigation/anchor/akat",
            br#"{"value": {"wind": {"alarm": true, "max_speed": 25}}}"#,
        )
        .unwrap();
        assert!(store.alarms().wind.enabled);
        assert_eq!(store.alarms().wind.threshold, 25.0);
    }

    #[test]
    fn test_vessel_tree_nests_paths() {
        let mut store = SignalKStore::new(URN);
        store.set_numeric("navigation.speedOverGround", 3.85, "gps", Some("m/s"), None);
        store.set_numeric("navigation.courseOverGroundTrue", 1.2, "gps", Some("rad"), None);
        store.set_text("name", "Aurora", "app", None, None);

        let tree = vessel_tree(&store);
        assert_eq!(tree["uuid"], URN);
        assert_eq!(tree["navigation"]["speedOverGround"]["value"], 3.85);
        assert_eq!(tree["navigation"]["speedOverGround"]["meta"]["units"], "m/s");
        assert_eq!(tree["navigation"]["courseOverGroundTrue"]["$source"], "gps");
        assert_eq!(tree["name"]["value"], "Aurora");
        assert!(tree["name"].get("meta").is_none());
    }

    #[test]
    fn test_api_root() {
        let store = SignalKStore::new(URN);
        let root = api_root(&store, "1.7.0");
        assert_eq!(root["self"], format!("vessels.{}", URN));
        assert!(root["vessels"][URN].is_object());
    }
}
