//! # signalk-core
//!
//! Core data model and store of the marine data gateway.
//!
//! This crate provides:
//! - Data model types (Delta, Update, PathValue, Source)
//! - Path glob matching for subscriptions
//! - The canonical path store with the anchor composite merge logic
//! - Geofence, depth and wind alarm monitors
//! - Configuration persistence and REST handler logic
//!
//! This crate is intentionally runtime-agnostic and contains no async code.

pub mod alarms;
pub mod anchor;
pub mod config;
pub mod conversions;
pub mod model;
pub mod path;
pub mod rest;
pub mod store;

pub use alarms::{AlarmSettings, LogNotifier, PushNotifier, PushRequest};
pub use config::{ConfigError, ConfigStorage, GatewaySettings, InputConfig};
pub use model::*;
pub use path::PathPattern;
pub use store::{PathRecord, SignalKStore, StoreValue};

/// SignalK schema version reported by the gateway.
pub const SIGNALK_VERSION: &str = "1.7.0";
