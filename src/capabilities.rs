//! Per-device capability derivation.

use std::fmt;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::bridge::RawDeviceState;

/// A color-control representation a device supports.
#[derive(Debug, Display, EnumIter, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Brightness,
    Xy,
    HueSat,
    ColorTemp,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::Brightness => 0b0001,
            Self::Xy => 0b0010,
            Self::HueSat => 0b0100,
            Self::ColorTemp => 0b1000,
        }
    }
}

/// The set of capabilities derived from a raw observed state.
///
/// Always derived, never mutated directly; re-derived on every observed
/// update because upstream reporting can be inconsistent (a just-initialized
/// device may briefly drop fields it normally reports).
///
/// # Examples
///
/// ```
/// use hue_lights_rs::{Capability, CapabilitySet, RawDeviceState};
///
/// let raw = RawDeviceState {
///     hue: Some(8000.0),
///     sat: Some(140.0),
///     ..RawDeviceState::default()
/// };
/// let caps = CapabilitySet::derive(&raw);
/// assert!(caps.has(Capability::Brightness));
/// assert!(caps.has(Capability::HueSat));
/// assert!(!caps.has(Capability::Xy));
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// Derive the capability set from raw bridge fields.
    ///
    /// Brightness is unconditional. XY requires a well-formed finite pair,
    /// hue/sat requires both components finite, color temperature requires a
    /// finite `ct` value.
    pub fn derive(raw: &RawDeviceState) -> Self {
        let mut bits = Capability::Brightness.bit();
        if raw.xy_pair().is_some() {
            bits |= Capability::Xy.bit();
        }
        if matches!((raw.hue, raw.sat), (Some(h), Some(s)) if h.is_finite() && s.is_finite()) {
            bits |= Capability::HueSat.bit();
        }
        if raw.ct.is_some_and(f64::is_finite) {
            bits |= Capability::ColorTemp.bit();
        }
        Self(bits)
    }

    /// A set with only the unconditional brightness capability.
    pub const fn brightness_only() -> Self {
        Self(Capability::Brightness.bit())
    }

    pub fn has(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// True if the device accepts any real color representation.
    pub fn has_color(self) -> bool {
        self.has(Capability::Xy) || self.has(Capability::HueSat)
    }

    /// Lowercase capability names for the external projection.
    pub fn names(self) -> Vec<String> {
        Capability::iter()
            .filter(|c| self.has(*c))
            .map(|c| c.to_string())
            .collect()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(Capability::iter().filter(|c| self.has(*c)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_is_unconditional() {
        let caps = CapabilitySet::derive(&RawDeviceState::default());
        assert!(caps.has(Capability::Brightness));
        assert!(!caps.has_color());
        assert_eq!(caps, CapabilitySet::brightness_only());
    }

    #[test]
    fn full_color_device() {
        let raw = RawDeviceState {
            bri: Some(200.0),
            hue: Some(1000.0),
            sat: Some(100.0),
            xy: Some(vec![0.4, 0.4]),
            ct: Some(300.0),
            ..RawDeviceState::default()
        };
        let caps = CapabilitySet::derive(&raw);
        assert!(caps.has(Capability::Xy));
        assert!(caps.has(Capability::HueSat));
        assert!(caps.has(Capability::ColorTemp));
    }

    #[test]
    fn non_finite_fields_do_not_count() {
        let raw = RawDeviceState {
            hue: Some(f64::NAN),
            sat: Some(100.0),
            ct: Some(f64::INFINITY),
            xy: Some(vec![0.3, f64::NAN]),
            ..RawDeviceState::default()
        };
        let caps = CapabilitySet::derive(&raw);
        assert_eq!(caps, CapabilitySet::brightness_only());
    }

    #[test]
    fn hue_without_sat_is_not_hue_sat() {
        let raw = RawDeviceState {
            hue: Some(1000.0),
            ..RawDeviceState::default()
        };
        assert!(!CapabilitySet::derive(&raw).has(Capability::HueSat));
    }

    #[test]
    fn names_are_lowercase() {
        let raw = RawDeviceState {
            ct: Some(366.0),
            ..RawDeviceState::default()
        };
        assert_eq!(
            CapabilitySet::derive(&raw).names(),
            vec!["brightness".to_string(), "color_temp".to_string()]
        );
    }
}
