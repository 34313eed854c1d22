//! SignalK WebSocket server.
//!
//! This module provides the delta stream on `/signalk/v1/stream`:
//! - Hello message on connect
//! - Periodic delta distribution of changed store paths
//! - Heartbeat deltas to keep idle connections open
//! - Subscribe / unsubscribe / updates from clients

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use signalk_core::path::strip_vessel_prefix;
use signalk_core::rest::write_value;
use signalk_core::{Delta, GatewaySettings, PathValue, SignalKStore, Source, Update};
use signalk_protocol::{
    decode_client_message, encode_server_message, ClientMessage, HelloMessage, ServerMessage,
};
use signalk_providers::SourceTracker;

use crate::gateway::{Ingest, ServerEvent, SharedSources, SharedStore};
use crate::subscription::{ClientSubscriptions, SubscribedClients};
use crate::BoxError;

/// Path carrying the server uptime in heartbeat deltas.
pub const HEARTBEAT_PATH: &str = "navigation.heartbeat";

/// Source type advertised on every outgoing delta.
pub const DELTA_SOURCE_TYPE: &str = "NMEA0183";

/// Configuration for the SignalK server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name sent in the hello message and as the delta source label.
    pub name: String,
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Distribution tick.
    pub delta_interval: Duration,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "signalk-rs-gateway".to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            delta_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(20),
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &GatewaySettings) -> Result<Self, std::net::AddrParseError> {
        Ok(Self {
            name: settings.server_name.clone(),
            bind_addr: settings.ws_bind.parse()?,
            delta_interval: Duration::from_millis(settings.delta_interval_ms.max(1)),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs.max(1)),
        })
    }
}

/// Frames fanned out to every connection handler.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A distribution delta. `paths` lists the changed paths it carries;
    /// `legacy` is set when no client had negotiated subscriptions.
    Delta {
        text: Arc<str>,
        paths: Arc<[String]>,
        legacy: bool,
    },
    /// Sent to every client regardless of subscriptions.
    Heartbeat { text: Arc<str> },
}

/// Build the distribution envelope from the store's changed paths.
///
/// Clears the changed flags. Returns `None` when nothing changed.
pub fn build_delta(store: &mut SignalKStore, server_name: &str) -> Option<(Delta, Vec<String>)> {
    if !store.has_changes() {
        return None;
    }
    let values = store.take_changes();
    if values.is_empty() {
        return None;
    }
    let paths = values.iter().map(|v| v.path.clone()).collect();
    Some((envelope(store.self_context(), server_name, values), paths))
}

/// Heartbeat delta carrying the uptime in seconds.
pub fn heartbeat_delta(self_context: &str, server_name: &str, uptime: Duration) -> Delta {
    envelope(
        self_context.to_string(),
        server_name,
        vec![PathValue::new(HEARTBEAT_PATH, serde_json::json!(uptime.as_secs()))],
    )
}

fn envelope(context: String, server_name: &str, values: Vec<PathValue>) -> Delta {
    Delta {
        context: Some(context),
        updates: vec![Update {
            timestamp: Some(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            source: Some(Source {
                label: server_name.to_string(),
                source_type: Some(DELTA_SOURCE_TYPE.to_string()),
            }),
            values,
        }],
    }
}

/// Number of open WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectedClients(Arc<AtomicUsize>);

impl ConnectedClients {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn connect(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

/// Everything a connection handler needs.
#[derive(Clone)]
struct ConnectionContext {
    config: Arc<ServerConfig>,
    self_context: Arc<str>,
    store: SharedStore,
    subscribed: SubscribedClients,
    connected: ConnectedClients,
}

/// The SignalK WebSocket server.
pub struct SignalKServer {
    config: ServerConfig,
    self_context: String,
    store: SharedStore,
    /// Channel for fanning deltas out to all connection handlers.
    outbound_tx: broadcast::Sender<Outbound>,
    /// Channel for receiving raw input from providers.
    event_tx: mpsc::Sender<ServerEvent>,
    event_rx: mpsc::Receiver<ServerEvent>,
    sources: SharedSources,
    subscribed: SubscribedClients,
    connected: ConnectedClients,
}

impl SignalKServer {
    /// Create a new server owning `store`.
    pub fn new(config: ServerConfig, store: SignalKStore) -> Self {
        let self_context = store.self_context();
        let (outbound_tx, _) = broadcast::channel(1024);
        let (event_tx, event_rx) = mpsc::channel(1024);

        Self {
            config,
            self_context,
            store: Arc::new(RwLock::new(store)),
            outbound_tx,
            event_tx,
            event_rx,
            sources: Arc::new(RwLock::new(SourceTracker::new())),
            subscribed: SubscribedClients::new(),
            connected: ConnectedClients::default(),
        }
    }

    /// Get a sender for submitting raw input to the ingest actor.
    pub fn event_sender(&self) -> mpsc::Sender<ServerEvent> {
        self.event_tx.clone()
    }

    /// Shared handle to the store, for the REST layer and the regenerator.
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// "vessels.<urn>"
    pub fn self_context(&self) -> &str {
        &self.self_context
    }

    /// Source arbitration state maintained by the ingest actor.
    pub fn sources(&self) -> SharedSources {
        self.sources.clone()
    }

    pub fn connected_clients(&self) -> ConnectedClients {
        self.connected.clone()
    }

    /// Bind the configured address and serve.
    pub async fn run(self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), BoxError> {
        info!("SignalK server listening on {}", listener.local_addr()?);

        let Self {
            config,
            self_context,
            store,
            outbound_tx,
            event_tx,
            event_rx,
            sources,
            subscribed,
            connected,
        } = self;
        // Inputs hold their own senders; ingest ends when all of them are gone.
        drop(event_tx);

        tokio::spawn(Ingest::with_sources(store.clone(), sources).run(event_rx));
        tokio::spawn(distribution_loop(
            store.clone(),
            outbound_tx.clone(),
            subscribed.clone(),
            config.name.clone(),
            config.delta_interval,
        ));
        tokio::spawn(heartbeat_loop(
            outbound_tx.clone(),
            self_context.clone(),
            config.name.clone(),
            config.heartbeat_interval,
        ));

        let ctx = ConnectionContext {
            config: Arc::new(config),
            self_context: Arc::from(self_context.as_str()),
            store,
            subscribed,
            connected,
        };

        // Accept connections
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let ctx = ctx.clone();
                    let outbound_rx = outbound_tx.subscribe();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, ctx, outbound_rx).await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn distribution_loop(
    store: SharedStore,
    outbound_tx: broadcast::Sender<Outbound>,
    subscribed: SubscribedClients,
    server_name: String,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let built = {
            let mut store = store.write().await;
            build_delta(&mut store, &server_name)
        };
        let Some((delta, paths)) = built else {
            continue;
        };

        match encode_server_message(&ServerMessage::Delta(delta)) {
            Ok(text) => {
                // No receivers just means nobody is connected.
                let _ = outbound_tx.send(Outbound::Delta {
                    text: Arc::from(text),
                    paths: Arc::from(paths),
                    legacy: subscribed.legacy_mode(),
                });
            }
            Err(e) => error!("Failed to encode delta: {}", e),
        }
    }
}

async fn heartbeat_loop(
    outbound_tx: broadcast::Sender<Outbound>,
    self_context: String,
    server_name: String,
    period: Duration,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let delta = heartbeat_delta(&self_context, &server_name, started.elapsed());
        if let Ok(text) = encode_server_message(&ServerMessage::Delta(delta)) {
            let _ = outbound_tx.send(Outbound::Heartbeat {
                text: Arc::from(text),
            });
        }
    }
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ConnectionContext,
    mut outbound_rx: broadcast::Receiver<Outbound>,
) -> Result<(), BoxError> {
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        debug!("WebSocket upgrade for {}", req.uri().path());
        Ok(resp)
    })
    .await?;

    ctx.connected.connect();
    info!("New connection from {} ({} connected)", addr, ctx.connected.count());

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut subscriptions = ClientSubscriptions::new();

    let result = async {
        let hello = HelloMessage::new(&ctx.config.name, ctx.self_context.as_ref());
        let hello_msg = encode_server_message(&ServerMessage::Hello(hello))?;
        ws_tx.send(Message::Text(hello_msg)).await?;
        debug!("Sent Hello to {}", addr);

        loop {
            tokio::select! {
                // Handle incoming messages from client
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = handle_client_message(&text, &ctx, &mut subscriptions, &mut ws_tx).await {
                                warn!("Error handling message from {}: {}", addr, e);
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Client {} closed connection", addr);
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_tx.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            debug!("Ignoring binary frame from {}", addr);
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error from {}: {}", addr, e);
                            break;
                        }
                        None => {
                            info!("Client {} disconnected", addr);
                            break;
                        }
                        _ => {}
                    }
                }

                // Frames fanned out by the distribution and heartbeat loops
                outbound = outbound_rx.recv() => {
                    let text = match outbound {
                        Ok(Outbound::Delta { text, paths, legacy }) => {
                            let wanted = legacy
                                || (subscriptions.is_negotiated() && subscriptions.wants_any(&paths));
                            if !wanted {
                                continue;
                            }
                            text
                        }
                        Ok(Outbound::Heartbeat { text }) => text,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Client {} lagged {} messages", addr, n);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Delta channel closed");
                            break;
                        }
                    };

                    if let Err(e) = ws_tx.send(Message::Text(text.to_string())).await {
                        error!("Failed to send delta to {}: {}", addr, e);
                        break;
                    }
                }
            }
        }
        Ok::<(), BoxError>(())
    }
    .await;

    if subscriptions.is_negotiated() {
        ctx.subscribed.remove();
    }
    ctx.connected.disconnect();
    result
}

/// Handle a message received from a client.
async fn handle_client_message(
    text: &str,
    ctx: &ConnectionContext,
    subscriptions: &mut ClientSubscriptions,
    ws_tx: &mut WsSink,
) -> Result<(), BoxError> {
    match decode_client_message(text)? {
        ClientMessage::Updates(req) => {
            let mut store = ctx.store.write().await;
            for update in &req.updates {
                let source = update.source_label();
                for value in &update.values {
                    let path = strip_vessel_prefix(&value.path, store.self_urn()).to_string();
                    if path.is_empty() {
                        continue;
                    }
                    if let Err(e) =
                        write_value(&mut store, &path, value.value.clone(), &source, "WebSocket update")
                    {
                        debug!("Ignoring update for {}: {}", path, e);
                    }
                }
            }
        }
        ClientMessage::Subscribe(req) => {
            debug!("Client subscribed to {:?}", req.subscribe);
            if subscriptions.subscribe(&req.subscribe) {
                ctx.subscribed.add();
            }

            let values = ctx.store.read().await.snapshot_matching(subscriptions.patterns());
            if !values.is_empty() {
                let snapshot = envelope(ctx.self_context.to_string(), &ctx.config.name, values);
                let msg = encode_server_message(&ServerMessage::Delta(snapshot))?;
                ws_tx.send(Message::Text(msg)).await?;
            }
        }
        ClientMessage::Unsubscribe(req) => {
            debug!("Client unsubscribed from {:?}", req.unsubscribe);
            subscriptions.unsubscribe(&req.unsubscribe);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_delta_clears_changes() {
        let mut store = SignalKStore::new("urn:mrn:signalk:uuid:test");
        assert!(build_delta(&mut store, "gw").is_none());

        store.set_numeric("navigation.speedOverGround", 3.2, "test", Some("m/s"), None);
        store.set_numeric("navigation.headingTrue", 1.0, "test", Some("rad"), None);

        let (delta, paths) = build_delta(&mut store, "gw").unwrap();
        assert_eq!(delta.context.as_deref(), Some("vessels.urn:mrn:signalk:uuid:test"));
        assert_eq!(delta.updates[0].values.len(), 2);
        assert_eq!(paths.len(), 2);

        let source = delta.updates[0].source.as_ref().unwrap();
        assert_eq!(source.label, "gw");
        assert_eq!(source.source_type.as_deref(), Some("NMEA0183"));

        assert!(build_delta(&mut store, "gw").is_none());
    }

    #[test]
    fn test_heartbeat_delta() {
        let delta = heartbeat_delta("vessels.urn:x", "gw", Duration::from_secs(40));
        let value = &delta.updates[0].values[0];
        assert_eq!(value.path, HEARTBEAT_PATH);
        assert_eq!(value.value, serde_json::json!(40));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = GatewaySettings {
            server_name: "boat".to_string(),
            ws_bind: "127.0.0.1:4000".to_string(),
            ..GatewaySettings::default()
        };
        let config = ServerConfig::from_settings(&settings).unwrap();
        assert_eq!(config.name, "boat");
        assert_eq!(config.bind_addr.port(), 4000);
        assert_eq!(config.delta_interval, Duration::from_millis(100));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));

        let bad = GatewaySettings {
            ws_bind: "nowhere".to_string(),
            ..GatewaySettings::default()
        };
        assert!(ServerConfig::from_settings(&bad).is_err());
    }
}
