//! Ingest actor.
//!
//! Every input task sends raw bus traffic here; this is the only place
//! decoders run, so store writes happen in arrival order under one write
//! lock per unit of work.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace, warn};

use signalk_core::SignalKStore;
use signalk_providers::nmea0183::{parse_sentence, Nmea0183Error};
use signalk_providers::nmea2000::{handle_pgn, N2K_SOURCE};
use signalk_providers::seatalk1::{Seatalk1Decoder, Seatalk1Stats, SEATALK_SOURCE};
use signalk_providers::SourceTracker;

/// The canonical store shared between the ingest actor, the distributor and
/// the REST layer.
pub type SharedStore = Arc<RwLock<SignalKStore>>;

/// Source arbitration state, written by the ingest actor and readable by
/// the REST layer.
pub type SharedSources = Arc<RwLock<SourceTracker>>;

/// Raw input handed to the ingest actor.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// One NMEA 0183 sentence. `origin` becomes the `nmea0183.<origin>` tag.
    Nmea0183 { sentence: String, origin: String },
    /// A reassembled NMEA 2000 payload.
    Nmea2000 { pgn: u32, payload: Vec<u8> },
    /// Seatalk 1 bytes read together at `at`.
    Seatalk { bytes: Vec<u8>, at: Instant },
}

pub struct Ingest {
    store: SharedStore,
    sources: SharedSources,
    seatalk: Seatalk1Decoder,
}

impl Ingest {
    pub fn new(store: SharedStore) -> Self {
        Self::with_sources(store, Arc::new(RwLock::new(SourceTracker::new())))
    }

    pub fn with_sources(store: SharedStore, sources: SharedSources) -> Self {
        Self {
            store,
            sources,
            seatalk: Seatalk1Decoder::new(),
        }
    }

    /// Handle to the source tracker; stays valid after `run` takes `self`.
    pub fn sources(&self) -> SharedSources {
        self.sources.clone()
    }

    pub fn seatalk_stats(&self) -> Seatalk1Stats {
        self.seatalk.stats()
    }

    /// Apply one event to the store. Malformed input is logged and dropped.
    pub async fn apply(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Nmea0183 { sentence, origin } => {
                self.observe(&format!("nmea0183.{}", origin), Instant::now())
                    .await;
                let mut store = self.store.write().await;
                match parse_sentence(&mut store, &sentence, &origin) {
                    Ok(kind) => trace!("{} from {}", kind, origin),
                    Err(e @ Nmea0183Error::InvalidStatus(_)) => debug!("{}: {}", e, sentence),
                    Err(e) => debug!("Dropped sentence from {}: {}", origin, e),
                }
            }
            ServerEvent::Nmea2000 { pgn, payload } => {
                self.observe(N2K_SOURCE, Instant::now()).await;
                let mut store = self.store.write().await;
                if let Err(e) = handle_pgn(&mut store, pgn, &payload) {
                    warn!("Dropped NMEA2000 message: {}", e);
                }
            }
            ServerEvent::Seatalk { bytes, at } => {
                self.observe(SEATALK_SOURCE, at).await;
                let mut store = self.store.write().await;
                for byte in bytes {
                    self.seatalk.process(&mut store, byte, at);
                }
            }
        }
    }

    async fn observe(&self, tag: &str, at: Instant) {
        self.sources.write().await.observe(tag, at);
    }

    /// Drain events until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<ServerEvent>) {
        while let Some(event) = rx.recv().await {
            self.apply(event).await;
        }
        let stats = self.seatalk.stats();
        debug!(
            "Ingest stopped (seatalk received={} decoded={} unknown={} discarded={})",
            stats.received, stats.decoded, stats.unknown, stats.discarded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedStore {
        Arc::new(RwLock::new(SignalKStore::new("urn:mrn:signalk:uuid:test")))
    }

    #[tokio::test]
    async fn test_events_reach_store() {
        let store = shared();
        let mut ingest = Ingest::new(store.clone());

        ingest
            .apply(ServerEvent::Nmea0183 {
                sentence: "$IIHDT,90.0,T".to_string(),
                origin: "gps".to_string(),
            })
            .await;
        ingest
            .apply(ServerEvent::Nmea2000 {
                pgn: 128267,
                payload: vec![0x00, 0xD2, 0x04, 0x00, 0x00, 0x00, 0x00, 0xFF],
            })
            .await;
        ingest
            .apply(ServerEvent::Seatalk {
                bytes: vec![0x20, 0x01, 0x3C, 0x00],
                at: Instant::now(),
            })
            .await;

        let store = store.read().await;
        assert_eq!(store.get("navigation.headingTrue").unwrap().source, "nmea0183.gps");
        assert!(store.numeric("environment.depth.belowTransducer").is_some());
        assert!(store.numeric("navigation.speedThroughWater").is_some());
        assert_eq!(ingest.seatalk_stats().decoded, 1);
        assert_eq!(
            ingest.sources().read().await.active(),
            Some("nmea2000.can")
        );
    }

    #[tokio::test]
    async fn test_garbage_does_not_stop_ingest() {
        let store = shared();
        let (tx, rx) = mpsc::channel(8);
        let ingest = Ingest::new(store.clone());
        let sources = ingest.sources();
        let handle = tokio::spawn(ingest.run(rx));

        for sentence in ["garbage", "$GPRMC,1,2", "$IIHDM,45.0,M"] {
            tx.send(ServerEvent::Nmea0183 {
                sentence: sentence.to_string(),
                origin: "tcp".to_string(),
            })
            .await
            .unwrap();
        }
        tx.send(ServerEvent::Nmea2000 {
            pgn: 129025,
            payload: vec![0x01],
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let store = store.read().await;
        assert_eq!(store.len(), 1);
        assert!(store.numeric("navigation.headingMagnetic").is_some());

        // Still readable after `run` consumed the actor.
        let sources = sources.read().await;
        assert_eq!(sources.active(), Some("nmea2000.can"));
        assert_eq!(sources.len(), 2);
    }
}
