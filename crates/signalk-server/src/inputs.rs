//! Stream inputs feeding the ingest actor.
//!
//! Serial devices are opened as plain files (the port is expected to be
//! configured already, e.g. with `stty`). Upstream NMEA 0183 TCP servers are
//! reconnected after a fixed delay.

use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use signalk_core::InputConfig;

use crate::gateway::ServerEvent;

/// Wait between reconnect / reopen attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Longest accepted sentence, excluding the line terminator.
pub const MAX_SENTENCE_LEN: usize = 120;

/// Why a reader stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEnd {
    /// The stream reached end of file.
    Eof,
    /// The ingest actor is gone; stop for good.
    IngestClosed,
}

/// Line reader for noisy NMEA 0183 streams.
///
/// Lines longer than [`MAX_SENTENCE_LEN`] are discarded up to the next `\n`
/// without buffering them. Lines that are not valid UTF-8 are skipped.
/// `next_sentence` is cancel safe: partial lines survive a dropped future.
pub struct SentenceReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
    overflowed: bool,
}

impl<R: AsyncRead + Unpin> SentenceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: Vec::with_capacity(MAX_SENTENCE_LEN + 2),
            overflowed: false,
        }
    }

    /// Next non-empty, trimmed line, or `None` at end of stream.
    pub async fn next_sentence(&mut self) -> std::io::Result<Option<String>> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                let overflowed = std::mem::take(&mut self.overflowed);
                if overflowed || self.line.is_empty() {
                    self.line.clear();
                    return Ok(None);
                }
                if let Some(sentence) = self.take_line() {
                    return Ok(Some(sentence));
                }
                return Ok(None);
            }

            let (used, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };

            if !self.overflowed {
                // Room for the sentence plus "\r\n".
                if self.line.len() + used > MAX_SENTENCE_LEN + 2 {
                    self.overflowed = true;
                    self.line.clear();
                } else {
                    self.line.extend_from_slice(&available[..used]);
                }
            }
            self.inner.consume(used);

            if complete {
                if std::mem::take(&mut self.overflowed) {
                    debug!("Discarded line longer than {} bytes", MAX_SENTENCE_LEN);
                    continue;
                }
                if let Some(sentence) = self.take_line() {
                    return Ok(Some(sentence));
                }
            }
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let decoded = std::str::from_utf8(&self.line)
            .map(|line| line.trim().to_string())
            .map_err(|e| debug!("Skipped undecodable line: {}", e))
            .ok();
        self.line.clear();
        decoded.filter(|line| !line.is_empty())
    }
}

/// Forward every sentence line of `reader` as an NMEA 0183 event.
pub async fn read_nmea_lines<R>(
    reader: R,
    origin: &str,
    tx: &mpsc::Sender<ServerEvent>,
) -> std::io::Result<ReadEnd>
where
    R: AsyncRead + Unpin,
{
    let mut lines = SentenceReader::new(reader);
    while let Some(sentence) = lines.next_sentence().await? {
        let event = ServerEvent::Nmea0183 {
            sentence,
            origin: origin.to_string(),
        };
        if tx.send(event).await.is_err() {
            return Ok(ReadEnd::IngestClosed);
        }
    }
    Ok(ReadEnd::Eof)
}

/// Forward raw Seatalk bytes, stamped with their arrival time.
pub async fn read_seatalk_bytes<R>(
    mut reader: R,
    tx: &mpsc::Sender<ServerEvent>,
) -> std::io::Result<ReadEnd>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(ReadEnd::Eof);
        }
        let event = ServerEvent::Seatalk {
            bytes: buf[..n].to_vec(),
            at: Instant::now(),
        };
        if tx.send(event).await.is_err() {
            return Ok(ReadEnd::IngestClosed);
        }
    }
}

async fn run_nmea_device(path: String, origin: String, tx: mpsc::Sender<ServerEvent>) {
    loop {
        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                info!("Reading NMEA0183 from {} as {}", path, origin);
                match read_nmea_lines(file, &origin, &tx).await {
                    Ok(ReadEnd::IngestClosed) => return,
                    Ok(ReadEnd::Eof) => debug!("{} reached end of file", path),
                    Err(e) => warn!("Read error on {}: {}", path, e),
                }
            }
            Err(e) => warn!("Cannot open {}: {}", path, e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_seatalk_device(path: String, tx: mpsc::Sender<ServerEvent>) {
    loop {
        match tokio::fs::File::open(&path).await {
            Ok(file) => {
                info!("Reading Seatalk1 from {}", path);
                match read_seatalk_bytes(file, &tx).await {
                    Ok(ReadEnd::IngestClosed) => return,
                    Ok(ReadEnd::Eof) => debug!("{} reached end of file", path),
                    Err(e) => warn!("Read error on {}: {}", path, e),
                }
            }
            Err(e) => warn!("Cannot open {}: {}", path, e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_upstream_tcp(host: String, port: u16, origin: String, tx: mpsc::Sender<ServerEvent>) {
    loop {
        match TcpStream::connect((host.as_str(), port)).await {
            Ok(stream) => {
                info!("Connected to upstream NMEA0183 {}:{}", host, port);
                match read_nmea_lines(stream, &origin, &tx).await {
                    Ok(ReadEnd::IngestClosed) => return,
                    Ok(ReadEnd::Eof) => info!("Upstream {}:{} closed the connection", host, port),
                    Err(e) => warn!("Upstream {}:{} read error: {}", host, port, e),
                }
            }
            Err(e) => warn!("Cannot connect to upstream {}:{}: {}", host, port, e),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Spawn one task per configured input.
pub fn spawn_inputs(inputs: &[InputConfig], tx: &mpsc::Sender<ServerEvent>) -> Vec<JoinHandle<()>> {
    inputs
        .iter()
        .map(|input| match input.clone() {
            InputConfig::Nmea0183Device { path, origin } => {
                tokio::spawn(run_nmea_device(path, origin, tx.clone()))
            }
            InputConfig::SeatalkDevice { path } => tokio::spawn(run_seatalk_device(path, tx.clone())),
            InputConfig::Nmea0183Tcp { host, port, origin } => {
                tokio::spawn(run_upstream_tcp(host, port, origin, tx.clone()))
            }
        })
        .collect()
}
