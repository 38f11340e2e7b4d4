//! Bridge client contract and raw wire shapes.
//!
//! The crate never performs network I/O itself. The host supplies a
//! [`BridgeClient`] that talks to the actual bridge; this module only pins
//! down the JSON shapes flowing across that seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Raw per-device state as reported by the bridge.
///
/// Fields are kept as loosely-typed options on purpose: bridges omit fields
/// a device does not support, and freshly initialized devices can report
/// nonsense (null, NaN-ish strings parsed as numbers). Capability derivation
/// and normalization both start from this shape.
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawDeviceState {
    pub on: Option<bool>,
    pub bri: Option<f64>,
    pub hue: Option<f64>,
    pub sat: Option<f64>,
    pub xy: Option<Vec<f64>>,
    pub ct: Option<f64>,
    pub colormode: Option<String>,
    pub reachable: Option<bool>,
}

impl RawDeviceState {
    /// The xy pair, if the bridge reported a well-formed one.
    pub fn xy_pair(&self) -> Option<(f64, f64)> {
        match self.xy.as_deref() {
            Some([x, y]) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        }
    }
}

/// A light as returned by the bridge's light listing.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawLight {
    pub id: String,
    #[serde(rename = "uniqueid")]
    pub unique_id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "modelid")]
    pub model_id: Option<String>,
    pub state: RawDeviceState,
}

/// Aggregate on/off state of a group's members.
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RawGroupState {
    pub any_on: Option<bool>,
    pub all_on: Option<bool>,
}

/// A group as returned by the bridge's group listing.
///
/// The `action` field carries the same shape as a light's `state` and is
/// what the group's normalized state is parsed from.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RawGroup {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub class: Option<String>,
    #[serde(default)]
    pub lights: Vec<String>,
    pub action: RawDeviceState,
    pub state: Option<RawGroupState>,
}

/// A normalized command ready to be transmitted to a device or group.
///
/// Serializes to the bridge's wire shape, so hosts can hand it directly to
/// their transport (`transitiontime` is in 100 ms steps per that API).
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceIntent {
    pub on: Option<bool>,
    pub bri: Option<u8>,
    pub hue: Option<u16>,
    pub sat: Option<u8>,
    pub xy: Option<(f64, f64)>,
    pub ct: Option<u16>,
    #[serde(rename = "transitiontime")]
    pub transition_time: Option<u32>,
    pub alert: Option<String>,
    pub effect: Option<String>,
}

impl DeviceIntent {
    /// True if the intent carries at least one field worth transmitting.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Transport-level access to the bridge, supplied by the host.
///
/// Listing calls return the raw wire shapes above; the set calls are
/// fire-and-forget apart from their error result. Implementations are free
/// to batch, rate-limit or retry internally.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Fetch the current light listing.
    async fn list_lights(&self) -> Result<Vec<RawLight>>;

    /// Fetch the current group listing (including the group 0 pseudo-group;
    /// the engine filters it out).
    async fn list_groups(&self) -> Result<Vec<RawGroup>>;

    /// Transmit a state change to a single light.
    async fn set_light_state(&self, id: &str, intent: &DeviceIntent) -> Result<()>;

    /// Transmit a state change to a group.
    async fn set_group_state(&self, id: &str, intent: &DeviceIntent) -> Result<()>;
}
