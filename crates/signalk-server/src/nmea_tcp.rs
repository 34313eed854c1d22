//! NMEA 0183 over TCP (port 10110).
//!
//! Clients receive the regenerated sentence feed and may send sentences of
//! their own, which are ingested with origin `tcp`. A client is dropped when
//! a write fails or after the idle timeout without traffic in either
//! direction. Inbound lines that are not UTF-8 or exceed 120 bytes are skipped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use signalk_core::GatewaySettings;
use signalk_providers::regenerate;

use crate::gateway::{ServerEvent, SharedStore};
use crate::inputs::SentenceReader;
use crate::BoxError;

/// Origin tag for sentences received from TCP clients.
pub const TCP_ORIGIN: &str = "tcp";

#[derive(Debug, Clone)]
pub struct NmeaTcpConfig {
    pub bind_addr: SocketAddr,
    pub max_clients: usize,
    pub idle_timeout: Duration,
}

impl Default for NmeaTcpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 10110)),
            max_clients: 8,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl NmeaTcpConfig {
    pub fn from_settings(settings: &GatewaySettings) -> Result<Self, std::net::AddrParseError> {
        Ok(Self {
            bind_addr: settings.nmea_tcp_bind.parse()?,
            max_clients: settings.nmea_tcp_max_clients,
            idle_timeout: Duration::from_secs(settings.nmea_tcp_idle_timeout_secs),
        })
    }
}

pub struct NmeaTcpServer {
    config: NmeaTcpConfig,
    event_tx: mpsc::Sender<ServerEvent>,
    sentence_tx: broadcast::Sender<Arc<str>>,
    clients: Arc<AtomicUsize>,
}

impl NmeaTcpServer {
    pub fn new(config: NmeaTcpConfig, event_tx: mpsc::Sender<ServerEvent>) -> Self {
        let (sentence_tx, _) = broadcast::channel(256);
        Self {
            config,
            event_tx,
            sentence_tx,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sender for outgoing sentences (CRLF terminated).
    pub fn sentence_sender(&self) -> broadcast::Sender<Arc<str>> {
        self.sentence_tx.clone()
    }

    pub fn client_count(&self) -> Arc<AtomicUsize> {
        self.clients.clone()
    }

    pub async fn run(self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<(), BoxError> {
        info!("NMEA0183 TCP server listening on {}", listener.local_addr()?);

        loop {
            let (mut stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept NMEA client: {}", e);
                    continue;
                }
            };

            let active = self.clients.load(Ordering::SeqCst);
            if active >= self.config.max_clients {
                warn!("Rejecting NMEA client {}: {} clients connected", addr, active);
                let _ = stream.shutdown().await;
                continue;
            }

            self.clients.fetch_add(1, Ordering::SeqCst);
            info!("NMEA client {} connected ({} active)", addr, active + 1);

            let clients = self.clients.clone();
            let sentences = self.sentence_tx.subscribe();
            let event_tx = self.event_tx.clone();
            let idle = self.config.idle_timeout;
            tokio::spawn(async move {
                if let Err(e) = handle_client(stream, addr, sentences, event_tx, idle).await {
                    debug!("NMEA client {} error: {}", addr, e);
                }
                let left = clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
                info!("NMEA client {} disconnected ({} active)", addr, left);
            });
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    mut sentences: broadcast::Receiver<Arc<str>>,
    event_tx: mpsc::Sender<ServerEvent>,
    idle_timeout: Duration,
) -> Result<(), BoxError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = SentenceReader::new(reader);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            line = lines.next_sentence() => {
                match line? {
                    Some(sentence) => {
                        last_activity = Instant::now();
                        if sentence.starts_with('$') {
                            event_tx
                                .send(ServerEvent::Nmea0183 {
                                    sentence,
                                    origin: TCP_ORIGIN.to_string(),
                                })
                                .await?;
                        }
                    }
                    None => return Ok(()),
                }
            }

            sentence = sentences.recv() => {
                match sentence {
                    Ok(sentence) => {
                        writer.write_all(sentence.as_bytes()).await?;
                        last_activity = Instant::now();
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("NMEA client {} lagged {} sentences", addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }

            _ = tokio::time::sleep_until(last_activity + idle_timeout) => {
                info!("NMEA client {} idle for {:?}, disconnecting", addr, idle_timeout);
                return Ok(());
            }
        }
    }
}

/// Regenerate sentences from the store every `period` and publish them.
pub async fn run_regenerator(
    store: SharedStore,
    sentence_tx: broadcast::Sender<Arc<str>>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let sentences = regenerate(&*store.read().await);
        for sentence in sentences {
            // No receivers just means no TCP clients.
            let _ = sentence_tx.send(Arc::from(sentence));
        }
    }
}
