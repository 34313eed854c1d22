//! Protocol message types for WebSocket communication.
//!
//! This module defines all message types exchanged over the SignalK WebSocket protocol:
//! - Server → Client: Hello, Delta
//! - Client → Server: Subscribe, Unsubscribe, Updates
//!
//! Messages are serialized as JSON over WebSocket text frames.

use serde::{Deserialize, Serialize};
use signalk_core::{Delta, SIGNALK_VERSION};

/// Subscription request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub subscribe: Vec<Subscription>,
}

/// A single subscription specification.
///
/// Only `path` affects what is sent; the remaining fields are accepted for
/// compatibility with SignalK clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default = "default_subscription_path")]
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<SubscriptionFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<SubscriptionPolicy>,
    #[serde(rename = "minPeriod", skip_serializing_if = "Option::is_none")]
    pub min_period: Option<u64>,
}

fn default_subscription_path() -> String {
    "*".to_string()
}

/// Subscription format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionFormat {
    Delta,
    Full,
}

/// Subscription policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPolicy {
    Instant,
    Ideal,
    Fixed,
}

/// Unsubscribe request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub unsubscribe: Vec<UnsubscribeSpec>,
}

/// Unsubscribe specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeSpec {
    pub path: String,
}

/// Direct writes from a client, in delta shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub updates: Vec<ClientUpdate>,
}

/// One update inside an [`UpdatesRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientUpdate {
    /// Either a plain label string or a source object with a `label`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<serde_json::Value>,
    #[serde(default)]
    pub values: Vec<ClientValue>,
}

impl ClientUpdate {
    /// Source tag to store the values under; "app" when none is given.
    pub fn source_label(&self) -> String {
        match &self.source {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
            Some(serde_json::Value::Object(obj)) => obj
                .get("label")
                .and_then(|l| l.as_str())
                .unwrap_or("app")
                .to_string(),
            _ => "app".to_string(),
        }
    }
}

/// A path/value pair written by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientValue {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

// ============================================================================
// Hello Message (Server → Client on connect)
// ============================================================================

/// Hello message sent by server immediately on WebSocket connection.
///
/// # Example
/// ```json
/// {
///   "self": "vessels.urn:mrn:signalk:uuid:c0d79334-4e25-4245-8892-54e8ccc8021d",
///   "version": "1.7.0",
///   "timestamp": "2024-01-17T10:30:00.000Z",
///   "server": {"id": "signalk-rs-gateway", "version": "0.1.0"}
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    /// The "self" context identifier for this vessel.
    #[serde(rename = "self")]
    pub self_context: String,

    /// SignalK protocol version supported.
    pub version: String,

    /// Current server timestamp in ISO 8601 format.
    pub timestamp: String,

    pub server: ServerInfo,
}

/// Server identification inside the hello message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    pub version: String,
}

impl HelloMessage {
    /// Create a new Hello message. `self_context` is "vessels.<urn>".
    pub fn new(server_id: impl Into<String>, self_context: impl Into<String>) -> Self {
        Self {
            self_context: self_context.into(),
            version: SIGNALK_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            server: ServerInfo {
                id: server_id.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

// ============================================================================
// Unified Message Enums
// ============================================================================

/// Messages that can be sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Hello message sent on connection.
    Hello(HelloMessage),

    /// Delta update with new data.
    Delta(Delta),
}

/// Messages that can be received from client.
///
/// Uses untagged deserialization - the message type is determined by
/// examining which fields are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Direct value writes.
    Updates(UpdatesRequest),

    /// Subscribe to data paths.
    Subscribe(SubscribeRequest),

    /// Unsubscribe from data paths.
    Unsubscribe(UnsubscribeRequest),
}

// ============================================================================
// Discovery Endpoint
// ============================================================================

/// Discovery response for `/signalk` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub endpoints: DiscoveryEndpoints,
    pub server: ServerInfo,
}

/// Endpoints advertised in discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryEndpoints {
    pub v1: DiscoveryV1,
}

/// Version 1 API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryV1 {
    pub version: String,
    #[serde(rename = "signalk-http")]
    pub signalk_http: String,
    #[serde(rename = "signalk-ws")]
    pub signalk_ws: String,
}

impl DiscoveryResponse {
    /// Create a discovery response. HTTP and WebSocket may live on different
    /// ports, so each is given as a full `host:port`.
    pub fn new(server_id: &str, http_host: &str, ws_host: &str) -> Self {
        Self {
            endpoints: DiscoveryEndpoints {
                v1: DiscoveryV1 {
                    version: SIGNALK_VERSION.to_string(),
                    signalk_http: format!("http://{}/signalk/v1/api/", http_host),
                    signalk_ws: format!("ws://{}/signalk/v1/stream", ws_host),
                },
            },
            server: ServerInfo {
                id: server_id.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_serialization() {
        let hello = HelloMessage::new("test-server", "vessels.urn:mrn:signalk:uuid:test");
        let json = serde_json::to_string(&hello).unwrap();

        assert!(json.contains("\"self\":\"vessels.urn:mrn:signalk:uuid:test\""));
        assert!(json.contains("\"version\":\"1.7.0\""));
        assert!(json.contains("\"server\":{\"id\":\"test-server\""));
    }

    #[test]
    fn test_subscribe_deserialization() {
        let json = r#"{
            "context": "vessels.self",
            "subscribe": [
                {"path": "navigation.speedOverGround", "period": 1000, "format": "delta", "policy": "ideal"},
                {"period": 500}
            ]
        }"#;

        let req: SubscribeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.context.as_deref(), Some("vessels.self"));
        assert_eq!(req.subscribe.len(), 2);
        assert_eq!(req.subscribe[0].path, "navigation.speedOverGround");
        assert_eq!(req.subscribe[0].period, Some(1000));
        assert_eq!(req.subscribe[1].path, "*");
    }

    #[test]
    fn test_update_source_label() {
        let json = r#"{"updates": [
            {"values": []},
            {"source": "6pack", "values": []},
            {"source": {"label": "chartplotter", "type": "signalk"}, "values": []}
        ]}"#;
        let req: UpdatesRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.updates[0].source_label(), "app");
        assert_eq!(req.updates[1].source_label(), "6pack");
        assert_eq!(req.updates[2].source_label(), "chartplotter");
    }

    #[test]
    fn test_discovery_response() {
        let discovery = DiscoveryResponse::new("gateway", "boat.local:3001", "boat.local:3000");
        let value = serde_json::to_value(&discovery).unwrap();
        assert_eq!(
            value["endpoints"]["v1"]["signalk-ws"],
            "ws://boat.local:3000/signalk/v1/stream"
        );
        assert_eq!(value["server"]["id"], "gateway");
    }
}
