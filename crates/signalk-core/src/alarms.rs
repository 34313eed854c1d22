//! Alarm monitors: geofence, depth and wind.
//!
//! Each monitor is a two-state machine (normal / alarm) over its own config
//! struct. Evaluation does no I/O; it returns an [`AlarmOutcome`] that the
//! store turns into a `notifications.<key>` write and, optionally, a push
//! request handed to a [`PushNotifier`].

use crate::conversions::{haversine_distance, ms_to_knots};
use crate::model::Position;
use serde::{Deserialize, Serialize};

/// Notification key for the geofence monitor.
pub const GEOFENCE_KEY: &str = "geofence.exit";
/// Notification key for the depth monitor.
pub const DEPTH_KEY: &str = "depth.alarm";
/// Notification key for the wind monitor.
pub const WIND_KEY: &str = "wind.alarm";

/// Wind alarm only releases once the wind drops this far below the threshold.
pub const WIND_RESET_HYSTERESIS_KNOTS: f64 = 1.0;

/// State written into a notification object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    Normal,
    Alarm,
}

impl AlarmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmState::Normal => "normal",
            AlarmState::Alarm => "alarm",
        }
    }
}

/// A state change of one monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Raised { key: &'static str, message: String },
    Cleared { key: &'static str },
}

/// A request for an out-of-band push notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub title: String,
    pub body: String,
    pub category: &'static str,
}

/// Result of one monitor evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmOutcome {
    pub transition: Option<Transition>,
    pub push: Option<PushRequest>,
}

impl AlarmOutcome {
    fn cleared(key: &'static str) -> Self {
        Self {
            transition: Some(Transition::Cleared { key }),
            push: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transition.is_none() && self.push.is_none()
    }
}

/// Delivery seam for push notifications.
///
/// Transport and rate limiting live behind this trait.
pub trait PushNotifier: Send + Sync {
    fn notify(&self, request: &PushRequest);
}

/// Default notifier: records the request in the log and sends nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl PushNotifier for LogNotifier {
    fn notify(&self, request: &PushRequest) {
        tracing::info!(
            category = request.category,
            title = %request.title,
            "Push notification requested: {}",
            request.body
        );
    }
}

/// Anchor geofence around a stored position.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceConfig {
    pub enabled: bool,
    pub anchor_lat: f64,
    pub anchor_lon: f64,
    /// Radius in meters.
    pub radius: f64,
    pub alarm_active: bool,
    pub last_distance: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            anchor_lat: f64::NAN,
            anchor_lon: f64::NAN,
            radius: 50.0,
            alarm_active: false,
            last_distance: f64::NAN,
        }
    }
}

impl GeofenceConfig {
    pub fn has_anchor(&self) -> bool {
        !self.anchor_lat.is_nan() && !self.anchor_lon.is_nan()
    }

    /// Evaluate against the current vessel position.
    ///
    /// While outside the radius every call requests a push, not only the
    /// first one.
    pub fn evaluate(&mut self, position: Option<Position>) -> AlarmOutcome {
        if !self.enabled {
            if self.alarm_active {
                self.alarm_active = false;
                return AlarmOutcome::cleared(GEOFENCE_KEY);
            }
            return AlarmOutcome::default();
        }

        if !self.has_anchor() {
            return AlarmOutcome::default();
        }

        let Some(pos) = position else {
            return AlarmOutcome::default();
        };

        let distance = haversine_distance(pos.latitude, pos.longitude, self.anchor_lat, self.anchor_lon);
        self.last_distance = distance;

        if distance > self.radius {
            let message = format!(
                "Vessel left geofence: {:.0} m (> {:.0} m)",
                distance, self.radius
            );

            let transition = if self.alarm_active {
                None
            } else {
                self.alarm_active = true;
                tracing::warn!("Geofence alarm: {}", message);
                Some(Transition::Raised {
                    key: GEOFENCE_KEY,
                    message: message.clone(),
                })
            };

            AlarmOutcome {
                transition,
                push: Some(PushRequest {
                    title: "Geofence Alert".to_string(),
                    body: message,
                    category: "geofence",
                }),
            }
        } else if self.alarm_active {
            self.alarm_active = false;
            tracing::info!("Geofence: back inside ({:.0} m)", distance);
            AlarmOutcome::cleared(GEOFENCE_KEY)
        } else {
            AlarmOutcome::default()
        }
    }
}

/// Shallow water alarm.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthAlarmConfig {
    pub enabled: bool,
    /// Minimum depth in meters.
    pub threshold: f64,
    pub alarm_active: bool,
    pub last_depth: f64,
}

impl Default for DepthAlarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 2.0,
            alarm_active: false,
            last_depth: f64::NAN,
        }
    }
}

impl DepthAlarmConfig {
    /// Evaluate a depth sample in meters. Triggers at or below the threshold.
    pub fn evaluate(&mut self, depth: f64) -> AlarmOutcome {
        self.last_depth = depth;

        if !self.enabled {
            if self.alarm_active {
                self.alarm_active = false;
                return AlarmOutcome::cleared(DEPTH_KEY);
            }
            return AlarmOutcome::default();
        }

        if depth.is_nan() {
            return AlarmOutcome::default();
        }

        let triggered = depth <= self.threshold;

        if triggered && !self.alarm_active {
            let message = format!("Depth {:.1} m (limit {:.1} m)", depth, self.threshold);
            self.alarm_active = true;
            tracing::warn!("Depth alarm: {}", message);
            AlarmOutcome {
                transition: Some(Transition::Raised {
                    key: DEPTH_KEY,
                    message: message.clone(),
                }),
                push: Some(PushRequest {
                    title: "Depth Alert".to_string(),
                    body: message,
                    category: "depth",
                }),
            }
        } else if !triggered && self.alarm_active {
            self.alarm_active = false;
            tracing::info!("Depth: back to normal ({:.1} m)", depth);
            AlarmOutcome::cleared(DEPTH_KEY)
        } else {
            AlarmOutcome::default()
        }
    }
}

/// Strong wind alarm with a release hysteresis.
#[derive(Debug, Clone, PartialEq)]
pub struct WindAlarmConfig {
    pub enabled: bool,
    /// Maximum wind speed in knots.
    pub threshold: f64,
    pub alarm_active: bool,
    /// Last sample, in knots.
    pub last_wind: f64,
}

impl Default for WindAlarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 20.0,
            alarm_active: false,
            last_wind: f64::NAN,
        }
    }
}

impl WindAlarmConfig {
    /// Evaluate a wind speed sample in m/s.
    pub fn evaluate(&mut self, wind_ms: f64) -> AlarmOutcome {
        self.evaluate_knots(ms_to_knots(wind_ms))
    }

    /// Evaluate a wind speed sample already in knots.
    pub fn evaluate_knots(&mut self, knots: f64) -> AlarmOutcome {
        self.last_wind = knots;

        if !self.enabled {
            if self.alarm_active {
                self.alarm_active = false;
                return AlarmOutcome::cleared(WIND_KEY);
            }
            return AlarmOutcome::default();
        }

        if knots.is_nan() {
            return AlarmOutcome::default();
        }

        if knots >= self.threshold && !self.alarm_active {
            let message = format!("True wind {:.1} kn (limit {:.1} kn)", knots, self.threshold);
            self.alarm_active = true;
            tracing::warn!("Wind alarm: {}", message);
            AlarmOutcome {
                transition: Some(Transition::Raised {
                    key: WIND_KEY,
                    message: message.clone(),
                }),
                push: Some(PushRequest {
                    title: "Wind Alert".to_string(),
                    body: message,
                    category: "wind",
                }),
            }
        } else if self.alarm_active && knots <= self.threshold - WIND_RESET_HYSTERESIS_KNOTS {
            self.alarm_active = false;
            tracing::info!("Wind: back below threshold ({:.1} kn)", knots);
            AlarmOutcome::cleared(WIND_KEY)
        } else {
            AlarmOutcome::default()
        }
    }
}

/// The three monitors' live configuration.
///
/// Externally this is visible as the `navigation.anchor.akat` composite; see
/// [`crate::anchor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmSettings {
    pub geofence: GeofenceConfig,
    pub depth: DepthAlarmConfig,
    pub wind: WindAlarmConfig,
}
