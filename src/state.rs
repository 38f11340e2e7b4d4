//! Normalized device state.
//!
//! All numeric fields here are integer device units (0-254 brightness,
//! 16-bit hue, 8-bit saturation, mired color temperature). External
//! percentage and degree units only exist in the projection built by
//! [`crate::LightEntity::state_message`].

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::bridge::RawDeviceState;
use crate::capabilities::{Capability, CapabilitySet};
use crate::color;

/// Full scale of the device brightness octet.
///
/// The bridge protocol tops out at 254, not 255; every brightness write in
/// this crate goes through this constant so the convention stays in one
/// place.
pub const BRI_MAX: u8 = 254;

/// Which color representation is currently authoritative for a device.
///
/// The wire names (`hs`, `xy`, `ct`) match the bridge's `colormode` field.
#[derive(Debug, Display, EnumString, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    #[strum(serialize = "brightness")]
    #[serde(rename = "brightness")]
    Brightness,
    #[strum(serialize = "xy")]
    #[serde(rename = "xy")]
    Xy,
    #[strum(serialize = "hs")]
    #[serde(rename = "hs")]
    HueSat,
    #[strum(serialize = "ct")]
    #[serde(rename = "ct")]
    Temperature,
}

/// A device's state in integer device units.
///
/// Exactly the fields implied by `color_mode` are authoritative; the others
/// are stale mirrors kept only when the device's capability set reported
/// them at construction.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NormalizedState {
    pub on: bool,
    /// Brightness in device units, `0..=254`.
    pub brightness: u8,
    pub color_mode: ColorMode,
    /// CIE chromaticity, each coordinate in `[0, 1]`.
    pub xy: Option<(f64, f64)>,
    /// 16-bit device hue (`0..=0xFFFF` maps to 0-360 degrees).
    pub hue: Option<u16>,
    /// 8-bit device saturation.
    pub sat: Option<u8>,
    /// Color temperature in mired, `125..=500`.
    pub color_temp: Option<u16>,
    pub reachable: bool,
}

impl Default for NormalizedState {
    fn default() -> Self {
        Self {
            on: false,
            brightness: BRI_MAX,
            color_mode: ColorMode::Brightness,
            xy: None,
            hue: None,
            sat: None,
            color_temp: None,
            reachable: true,
        }
    }
}

impl NormalizedState {
    /// Parse a raw bridge snapshot into device units.
    ///
    /// Color fields are only carried over when `caps` says the device
    /// reports them; everything is clamped into its device range so NaN or
    /// out-of-range junk from the bridge never lands in the state.
    pub fn from_raw(raw: &RawDeviceState, caps: CapabilitySet) -> Self {
        let xy = if caps.has(Capability::Xy) {
            raw.xy_pair()
                .map(|(x, y)| (color::clamp01(x), color::clamp01(y)))
        } else {
            None
        };
        let (hue, sat) = if caps.has(Capability::HueSat) {
            (
                raw.hue.map(|h| clamp_int(h, 65_535.0) as u16),
                raw.sat.map(|s| clamp_int(s, 255.0) as u8),
            )
        } else {
            (None, None)
        };
        let color_temp = if caps.has(Capability::ColorTemp) {
            raw.ct
                .map(|ct| clamp_int(ct, f64::from(color::MIRED_MAX)) as u16)
                .map(|ct| ct.max(color::MIRED_MIN))
        } else {
            None
        };

        let color_mode = raw
            .colormode
            .as_deref()
            .and_then(|mode| ColorMode::from_str(mode).ok())
            .filter(|mode| match mode {
                ColorMode::Xy => xy.is_some(),
                ColorMode::HueSat => hue.is_some() && sat.is_some(),
                ColorMode::Temperature => color_temp.is_some(),
                ColorMode::Brightness => true,
            })
            .unwrap_or_else(|| {
                if xy.is_some() {
                    ColorMode::Xy
                } else if hue.is_some() && sat.is_some() {
                    ColorMode::HueSat
                } else if color_temp.is_some() {
                    ColorMode::Temperature
                } else {
                    ColorMode::Brightness
                }
            });

        Self {
            on: raw.on.unwrap_or(false),
            brightness: raw
                .bri
                .map_or(BRI_MAX, |bri| clamp_int(bri, f64::from(BRI_MAX)) as u8),
            color_mode,
            xy,
            hue,
            sat,
            color_temp,
            reachable: raw.reachable.unwrap_or(true),
        }
    }

    /// Brightness as a fraction of full scale, for color math.
    pub fn brightness_fraction(&self) -> f64 {
        f64::from(self.brightness) / f64::from(BRI_MAX)
    }

    /// Brightness as an external percentage, `0..=100`.
    pub fn brightness_percent(&self) -> u8 {
        (f64::from(self.brightness) / f64::from(BRI_MAX) * 100.0).round() as u8
    }
}

/// Scale an external percentage (`0..=100`) to device brightness units.
pub fn percent_to_bri(percent: f64) -> u8 {
    let percent = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    (percent / 100.0 * f64::from(BRI_MAX)).round() as u8
}

/// Scale an HSV value component (`[0, 1]`) to device brightness units.
pub fn value_to_bri(value: f64) -> u8 {
    (color::clamp01(value) * f64::from(BRI_MAX)).round() as u8
}

/// Convert a 16-bit device hue to degrees.
pub fn hue_to_degrees(hue: u16) -> f64 {
    f64::from(hue) / 65_535.0 * 360.0
}

/// Convert degrees to the 16-bit device hue.
pub fn degrees_to_hue(degrees: f64) -> u16 {
    let degrees = if degrees.is_finite() {
        degrees.rem_euclid(360.0)
    } else {
        0.0
    };
    (degrees / 360.0 * 65_535.0).round() as u16
}

/// Convert an 8-bit device saturation to `[0, 1]`.
pub fn sat_to_fraction(sat: u8) -> f64 {
    f64::from(sat) / 255.0
}

/// Convert a `[0, 1]` saturation to the 8-bit device scale.
pub fn fraction_to_sat(fraction: f64) -> u8 {
    (color::clamp01(fraction) * 255.0).round() as u8
}

fn clamp_int(v: f64, max: f64) -> f64 {
    if v.is_finite() {
        v.round().clamp(0.0, max)
    } else {
        0.0
    }
}
