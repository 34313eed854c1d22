//! Source arbitration bookkeeping.
//!
//! Tracks when each input source was last heard and which non-stale source
//! has the best rank. The active source is only reported (logs and
//! [`SourceTracker::active`]); store writes are last-write-wins regardless.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

/// A source that has not been heard from for this long is ignored.
pub const STALE_AFTER: Duration = Duration::from_secs(10);

/// Source classes in priority order, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Can,
    Rs485,
    SingleEnded,
    Seatalk,
    Gps,
    Tcp,
    Unknown,
}

impl SourceKind {
    /// Classify a source tag such as `nmea2000.can` or `nmea0183.rs485`.
    pub fn classify(tag: &str) -> Self {
        let tag = tag.to_ascii_lowercase();
        if tag.starts_with("nmea2000") || tag.ends_with(".can") {
            Self::Can
        } else if tag.contains("rs485") {
            Self::Rs485
        } else if tag.contains("single") || tag.contains("direct") {
            Self::SingleEnded
        } else if tag.contains("seatalk") {
            Self::Seatalk
        } else if tag.contains("gps") {
            Self::Gps
        } else if tag.contains("tcp") {
            Self::Tcp
        } else {
            Self::Unknown
        }
    }
}

/// One tracked source as seen at a given instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub tag: String,
    pub kind: SourceKind,
    pub age_ms: u64,
    pub stale: bool,
}

#[derive(Debug, Clone)]
struct SourceEntry {
    kind: SourceKind,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct SourceTracker {
    sources: HashMap<String, SourceEntry>,
    active: Option<String>,
    stale_after: Duration,
}

impl Default for SourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceTracker {
    pub fn new() -> Self {
        Self::with_staleness(STALE_AFTER)
    }

    pub fn with_staleness(stale_after: Duration) -> Self {
        Self {
            sources: HashMap::new(),
            active: None,
            stale_after,
        }
    }

    /// Record traffic from `tag` at `at` and re-elect the active source.
    pub fn observe(&mut self, tag: &str, at: Instant) -> Option<&str> {
        let tag = tag.to_ascii_lowercase();
        match self.sources.get_mut(&tag) {
            Some(entry) => entry.last_seen = at,
            None => {
                let kind = SourceKind::classify(&tag);
                tracing::debug!("New source {} ({:?})", tag, kind);
                self.sources.insert(tag, SourceEntry { kind, last_seen: at });
            }
        }
        self.recompute(at);
        self.active()
    }

    /// Re-elect the best non-stale source as of `now`.
    pub fn recompute(&mut self, now: Instant) {
        let best = self
            .sources
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_seen) <= self.stale_after)
            .min_by(|(a_tag, a), (b_tag, b)| a.kind.cmp(&b.kind).then_with(|| a_tag.cmp(b_tag)))
            .map(|(tag, _)| tag.clone());

        if best != self.active {
            match &best {
                Some(tag) => tracing::info!(
                    "Active source: {} (was {})",
                    tag,
                    self.active.as_deref().unwrap_or("none")
                ),
                None => tracing::info!("No active source, all sources stale"),
            }
            self.active = best;
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn kind_of(&self, tag: &str) -> Option<SourceKind> {
        self.sources.get(&tag.to_ascii_lowercase()).map(|e| e.kind)
    }

    /// Every known source, best rank first.
    pub fn status(&self, now: Instant) -> Vec<SourceStatus> {
        let mut out: Vec<SourceStatus> = self
            .sources
            .iter()
            .map(|(tag, entry)| {
                let age = now.saturating_duration_since(entry.last_seen);
                SourceStatus {
                    tag: tag.clone(),
                    kind: entry.kind,
                    age_ms: u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
                    stale: age > self.stale_after,
                }
            })
            .collect();
        out.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.tag.cmp(&b.tag)));
        out
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(SourceKind::classify("nmea2000.can"), SourceKind::Can);
        assert_eq!(SourceKind::classify("nmea0183.RS485"), SourceKind::Rs485);
        assert_eq!(SourceKind::classify("nmea0183.direct"), SourceKind::SingleEnded);
        assert_eq!(SourceKind::classify("seatalk1"), SourceKind::Seatalk);
        assert_eq!(SourceKind::classify("nmea0183.GPS"), SourceKind::Gps);
        assert_eq!(SourceKind::classify("nmea0183.tcp"), SourceKind::Tcp);
        assert_eq!(SourceKind::classify("app"), SourceKind::Unknown);
        assert!(SourceKind::Can < SourceKind::Unknown);
    }

    #[test]
    fn test_best_rank_wins() {
        let mut tracker = SourceTracker::new();
        let t0 = Instant::now();

        assert_eq!(tracker.observe("nmea0183.tcp", t0), Some("nmea0183.tcp"));
        assert_eq!(tracker.observe("nmea0183.gps", t0), Some("nmea0183.gps"));
        assert_eq!(tracker.observe("nmea0183.tcp", t0), Some("nmea0183.gps"));
        assert_eq!(tracker.observe("nmea2000.can", t0), Some("nmea2000.can"));
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_status_orders_by_rank() {
        let mut tracker = SourceTracker::new();
        let t0 = Instant::now();
        tracker.observe("nmea0183.tcp", t0);
        tracker.observe("nmea2000.can", t0);

        let status = tracker.status(t0 + Duration::from_secs(12));
        assert_eq!(status.len(), 2);
        assert_eq!(status[0].tag, "nmea2000.can");
        assert_eq!(status[0].kind, SourceKind::Can);
        assert_eq!(status[0].age_ms, 12_000);
        assert!(status[0].stale);

        let json = serde_json::to_value(&status[1]).unwrap();
        assert_eq!(json["kind"], "tcp");
        assert_eq!(json["ageMs"], 12_000);
    }

    #[test]
    fn test_stale_source_loses_active() {
        let mut tracker = SourceTracker::new();
        let t0 = Instant::now();
        tracker.observe("nmea2000.can", t0);
        tracker.observe("nmea0183.tcp", t0);

        let later = t0 + Duration::from_secs(11);
        assert_eq!(tracker.observe("nmea0183.tcp", later), Some("nmea0183.tcp"));

        let much_later = later + Duration::from_secs(11);
        tracker.recompute(much_later);
        assert_eq!(tracker.active(), None);
    }
}
