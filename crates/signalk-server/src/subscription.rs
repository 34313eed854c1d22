//! Subscription management for WebSocket clients.
//!
//! Each client holds a set of path globs. Until any connected client has
//! negotiated a subscription the server runs in legacy mode and every client
//! receives every delta.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use signalk_core::PathPattern;
use signalk_protocol::{Subscription, UnsubscribeSpec};

/// Path globs negotiated by one client.
#[derive(Debug, Default)]
pub struct ClientSubscriptions {
    patterns: Vec<PathPattern>,
    negotiated: bool,
}

impl ClientSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the paths of a subscribe request.
    ///
    /// Returns `true` the first time this client subscribes.
    pub fn subscribe(&mut self, subs: &[Subscription]) -> bool {
        let first = !self.negotiated;
        self.negotiated = true;

        if subs.is_empty() {
            self.add(PathPattern::new("*"));
        }
        for sub in subs {
            self.add(PathPattern::new(&sub.path));
        }
        first
    }

    fn add(&mut self, pattern: PathPattern) {
        if !self.patterns.iter().any(|p| p.as_str() == pattern.as_str()) {
            self.patterns.push(pattern);
        }
    }

    /// Remove exactly matching globs. `*` clears the set.
    pub fn unsubscribe(&mut self, specs: &[UnsubscribeSpec]) {
        for spec in specs {
            if spec.path == "*" {
                self.patterns.clear();
            } else {
                self.patterns.retain(|p| p.as_str() != spec.path);
            }
        }
    }

    pub fn is_negotiated(&self) -> bool {
        self.negotiated
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    pub fn wants(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    /// True if at least one of `paths` matches. The whole envelope is sent
    /// in that case, unfiltered.
    pub fn wants_any(&self, paths: &[String]) -> bool {
        paths.iter().any(|path| self.wants(path))
    }
}

/// Count of connected clients that have negotiated subscriptions.
#[derive(Debug, Clone, Default)]
pub struct SubscribedClients(Arc<AtomicUsize>);

impl SubscribedClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn remove(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// No client has negotiated: broadcast everything to everyone.
    pub fn legacy_mode(&self) -> bool {
        self.count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(path: &str) -> Subscription {
        serde_json::from_value(serde_json::json!({ "path": path })).unwrap()
    }

    fn unsub(path: &str) -> UnsubscribeSpec {
        UnsubscribeSpec {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_subscribe_and_match() {
        let mut subs = ClientSubscriptions::new();
        assert!(!subs.is_negotiated());

        assert!(subs.subscribe(&[sub("navigation.*")]));
        assert!(!subs.subscribe(&[sub("navigation.*"), sub("*.temperature")]));
        assert_eq!(subs.patterns().len(), 2);

        assert!(subs.wants("navigation.position"));
        assert!(subs.wants("environment.water.temperature"));
        assert!(!subs.wants("environment.wind.speedTrue"));
    }

    #[test]
    fn test_envelope_sent_if_any_path_matches() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe(&[sub("navigation.*")]);

        let mixed = vec![
            "environment.wind.speedTrue".to_string(),
            "navigation.speedOverGround".to_string(),
        ];
        assert!(subs.wants_any(&mixed));
        assert!(!subs.wants_any(&["environment.depth.belowTransducer".to_string()]));
    }

    #[test]
    fn test_unsubscribe() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe(&[sub("navigation.*"), sub("environment.*")]);

        subs.unsubscribe(&[unsub("navigation.*")]);
        assert!(!subs.wants("navigation.position"));
        assert!(subs.wants("environment.depth.belowTransducer"));

        subs.unsubscribe(&[unsub("*")]);
        assert!(subs.patterns().is_empty());
        assert!(subs.is_negotiated());
    }

    #[test]
    fn test_empty_subscribe_means_everything() {
        let mut subs = ClientSubscriptions::new();
        subs.subscribe(&[]);
        assert!(subs.wants("anything.at.all"));
    }

    #[test]
    fn test_subscribed_clients_counter() {
        let clients = SubscribedClients::new();
        assert!(clients.legacy_mode());

        let shared = clients.clone();
        shared.add();
        assert!(!clients.legacy_mode());

        clients.remove();
        clients.remove();
        assert_eq!(clients.count(), 0);
    }
}
