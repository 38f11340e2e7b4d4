//! Pure color-space conversion math.
//!
//! Everything in this module is a deterministic function of its inputs:
//! RGB ↔ CIE xy chromaticity (gamma-corrected, Wide-Gamut D65 matrices),
//! RGB ↔ HSV, Mired ↔ Kelvin, and a black-body Kelvin → RGB approximation
//! used when projecting temperature-mode devices into RGB space.
//!
//! Conversions through xy chromaticity are lossy by design: brightness is
//! carried separately, so a hue/saturation value pushed through xy and back
//! can move by a few device units. Callers tolerate that error instead of
//! trying to correct it.

use serde::{Deserialize, Serialize};

/// Lowest mired value accepted by the devices (8000 K).
pub const MIRED_MIN: u16 = 125;
/// Highest mired value accepted by the devices (2000 K).
pub const MIRED_MAX: u16 = 500;
/// Warmest supported color temperature.
pub const KELVIN_MIN: u16 = 2000;
/// Coolest supported color temperature.
pub const KELVIN_MAX: u16 = 8000;

/// An RGB color with red, green, and blue components (0-255 each).
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    /// Create a color with the given RGB values.
    pub fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// A color in HSV space.
///
/// Hue is in degrees `[0, 360)`, saturation and value in `[0, 1]`. Device
/// and percentage scalings happen at the call sites.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

impl Hsv {
    pub fn new(hue: f64, saturation: f64, value: f64) -> Self {
        Self {
            hue: if hue.is_finite() { hue.rem_euclid(360.0) } else { 0.0 },
            saturation: clamp01(saturation),
            value: clamp01(value),
        }
    }
}

/// Convert an RGB color to CIE xy chromaticity.
///
/// Channels are normalized to `[0, 1]`, sRGB gamma-expanded (unless
/// `gamma_correct` is false), pushed through the Wide-Gamut RGB → XYZ (D65)
/// matrix and projected to `(x, y)`. Both coordinates are clamped to `[0, 1]`.
///
/// # Examples
///
/// ```
/// use hue_lights_rs::color::{rgb_to_xy, Rgb};
///
/// let (x, y) = rgb_to_xy(Rgb::new(255, 0, 0), true);
/// assert!(x > 0.6 && y < 0.35);
/// ```
pub fn rgb_to_xy(rgb: Rgb, gamma_correct: bool) -> (f64, f64) {
    let r = channel_to_linear(rgb.red, gamma_correct);
    let g = channel_to_linear(rgb.green, gamma_correct);
    let b = channel_to_linear(rgb.blue, gamma_correct);

    // Wide-Gamut RGB -> XYZ, D65 reference white.
    let x = r * 0.664511 + g * 0.154324 + b * 0.162028;
    let y = r * 0.283881 + g * 0.668433 + b * 0.047685;
    let z = r * 0.000088 + g * 0.072310 + b * 0.986039;

    let sum = x + y + z;
    if !sum.is_finite() || sum <= f64::EPSILON {
        return (0.0, 0.0);
    }
    (clamp01(x / sum), clamp01(y / sum))
}

/// Convert CIE xy chromaticity plus a relative brightness to RGB.
///
/// `brightness` is the Y component in `[0, 1]`. XYZ is reconstructed from
/// the chromaticity, mapped through the inverse D65 matrix, rescaled so no
/// channel exceeds 1, inverse-gamma-compressed (unless disabled) and scaled
/// to `0..=255`.
pub fn xy_to_rgb(x: f64, y: f64, brightness: f64, gamma_correct: bool) -> Rgb {
    let x = clamp01(x);
    let y = clamp01(y);
    let brightness = clamp01(brightness);
    if y <= f64::EPSILON || brightness <= f64::EPSILON {
        return Rgb::new(0, 0, 0);
    }

    let yy = brightness;
    let xx = (yy / y) * x;
    let zz = (yy / y) * (1.0 - x - y);

    let mut r = xx * 1.656492 - yy * 0.354851 - zz * 0.255038;
    let mut g = -xx * 0.707196 + yy * 1.655397 + zz * 0.036152;
    let mut b = xx * 0.051713 - yy * 0.121364 + zz * 1.011530;

    // Rescale out-of-gamut results so the dominant channel saturates
    // instead of skewing the hue when clamped.
    let max = r.max(g).max(b);
    if max > 1.0 {
        r /= max;
        g /= max;
        b /= max;
    }

    Rgb::new(
        linear_to_channel(r, gamma_correct),
        linear_to_channel(g, gamma_correct),
        linear_to_channel(b, gamma_correct),
    )
}

/// Convert RGB to HSV (hue in degrees, saturation/value in `[0, 1]`).
pub fn rgb_to_hsv(rgb: Rgb) -> Hsv {
    let r = f64::from(rgb.red) / 255.0;
    let g = f64::from(rgb.green) / 255.0;
    let b = f64::from(rgb.blue) / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f64::EPSILON {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max <= f64::EPSILON { 0.0 } else { delta / max };

    Hsv::new(hue, saturation, max)
}

/// Convert HSV (hue in degrees, saturation/value in `[0, 1]`) to RGB.
///
/// # Examples
///
/// ```
/// use hue_lights_rs::color::{hsv_to_rgb, Hsv, Rgb};
///
/// assert_eq!(hsv_to_rgb(Hsv::new(0.0, 1.0, 1.0)), Rgb::new(255, 0, 0));
/// assert_eq!(hsv_to_rgb(Hsv::new(120.0, 1.0, 1.0)), Rgb::new(0, 255, 0));
/// ```
pub fn hsv_to_rgb(hsv: Hsv) -> Rgb {
    let Hsv {
        hue,
        saturation,
        value,
    } = Hsv::new(hsv.hue, hsv.saturation, hsv.value);

    if saturation <= f64::EPSILON {
        let gray = scale_255(value);
        return Rgb::new(gray, gray, gray);
    }

    let h = hue / 60.0;
    let i = h.floor();
    let f = h - i;
    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));

    let (r, g, b) = match i as i32 % 6 {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };

    Rgb::new(scale_255(r), scale_255(g), scale_255(b))
}

/// Convert a mired value to Kelvin.
///
/// The input is clamped to `[125, 500]` mired first, so the result always
/// lands in `[2000, 8000]` K.
///
/// # Examples
///
/// ```
/// use hue_lights_rs::color::mired_to_kelvin;
///
/// assert_eq!(mired_to_kelvin(500), 2000);
/// assert_eq!(mired_to_kelvin(0), 8000); // clamped to 125 mired
/// ```
pub fn mired_to_kelvin(mired: u16) -> u16 {
    let mired = mired.clamp(MIRED_MIN, MIRED_MAX);
    (1_000_000 / u32::from(mired)) as u16
}

/// Convert a Kelvin value to mired.
///
/// The input is clamped to `[2000, 8000]` K first, so the result always
/// lands in `[125, 500]` mired.
pub fn kelvin_to_mired(kelvin: u16) -> u16 {
    let kelvin = kelvin.clamp(KELVIN_MIN, KELVIN_MAX);
    (1_000_000 / u32::from(kelvin)) as u16
}

/// Approximate the RGB appearance of a black-body radiator at `kelvin`.
///
/// Uses the Tanner Helland curve fit. The input is clamped to the supported
/// `[2000, 8000]` K range.
pub fn kelvin_to_rgb(kelvin: u16) -> Rgb {
    let temp = f64::from(kelvin.clamp(KELVIN_MIN, KELVIN_MAX)) / 100.0;

    let red = if temp <= 66.0 {
        255.0
    } else {
        329.698_727_446 * (temp - 60.0).powf(-0.133_204_759_2)
    };

    let green = if temp <= 66.0 {
        99.470_802_586_1 * temp.ln() - 161.119_568_166_1
    } else {
        288.122_169_528_3 * (temp - 60.0).powf(-0.075_514_849_2)
    };

    let blue = if temp >= 66.0 {
        255.0
    } else if temp <= 19.0 {
        0.0
    } else {
        138.517_731_223_1 * (temp - 10.0).ln() - 305.044_792_730_7
    };

    Rgb::new(
        clamp_255(red),
        clamp_255(green),
        clamp_255(blue),
    )
}

/// Clamp a float to `[0, 1]`, mapping NaN to 0.
pub(crate) fn clamp01(v: f64) -> f64 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}

fn clamp_255(v: f64) -> u8 {
    if v.is_finite() {
        v.round().clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

fn scale_255(v: f64) -> u8 {
    clamp_255(clamp01(v) * 255.0)
}

fn channel_to_linear(channel: u8, gamma_correct: bool) -> f64 {
    let v = f64::from(channel) / 255.0;
    if !gamma_correct {
        return v;
    }
    if v > 0.04045 {
        ((v + 0.055) / 1.055).powf(2.4)
    } else {
        v / 12.92
    }
}

fn linear_to_channel(v: f64, gamma_correct: bool) -> u8 {
    let v = clamp01(v);
    if !gamma_correct {
        return scale_255(v);
    }
    let compressed = if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    scale_255(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Rgb, expected: Rgb, tolerance: i16) {
        for (a, e) in [
            (actual.red, expected.red),
            (actual.green, expected.green),
            (actual.blue, expected.blue),
        ] {
            let diff = (i16::from(a) - i16::from(e)).abs();
            assert!(
                diff <= tolerance,
                "channel off by {diff} (> {tolerance}): {actual:?} vs {expected:?}"
            );
        }
    }

    #[test]
    fn xy_round_trip_has_bounded_error() {
        // Exact equality is not the contract; fully-bright inputs must come
        // back within a few device units per channel.
        for rgb in [
            Rgb::new(255, 0, 0),
            Rgb::new(0, 255, 0),
            Rgb::new(0, 0, 255),
            Rgb::new(255, 255, 255),
            Rgb::new(255, 128, 0),
            Rgb::new(64, 255, 160),
        ] {
            let (x, y) = rgb_to_xy(rgb, true);
            let back = xy_to_rgb(x, y, 1.0, true);
            assert_close(back, rgb, 3);
        }
    }

    #[test]
    fn xy_is_clamped() {
        let (x, y) = rgb_to_xy(Rgb::new(255, 0, 0), true);
        assert!((0.0..=1.0).contains(&x));
        assert!((0.0..=1.0).contains(&y));
    }

    #[test]
    fn black_maps_to_origin() {
        assert_eq!(rgb_to_xy(Rgb::new(0, 0, 0), true), (0.0, 0.0));
        assert_eq!(xy_to_rgb(0.3, 0.3, 0.0, true), Rgb::new(0, 0, 0));
    }

    #[test]
    fn degenerate_chromaticity_yields_black_not_nan() {
        assert_eq!(xy_to_rgb(0.5, 0.0, 1.0, true), Rgb::new(0, 0, 0));
        assert_eq!(xy_to_rgb(f64::NAN, f64::NAN, 1.0, true), Rgb::new(0, 0, 0));
    }

    #[test]
    fn hsv_round_trip() {
        for rgb in [
            Rgb::new(255, 0, 0),
            Rgb::new(12, 200, 97),
            Rgb::new(255, 255, 255),
            Rgb::new(0, 0, 0),
        ] {
            assert_eq!(hsv_to_rgb(rgb_to_hsv(rgb)), rgb);
        }
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(rgb_to_hsv(Rgb::new(255, 0, 0)).hue, 0.0);
        assert_eq!(rgb_to_hsv(Rgb::new(0, 255, 0)).hue, 120.0);
        assert_eq!(rgb_to_hsv(Rgb::new(0, 0, 255)).hue, 240.0);
        assert_eq!(rgb_to_hsv(Rgb::new(255, 0, 0)).saturation, 1.0);
    }

    #[test]
    fn hsv_hue_wraps() {
        assert_eq!(hsv_to_rgb(Hsv::new(360.0, 1.0, 1.0)), Rgb::new(255, 0, 0));
        assert_eq!(hsv_to_rgb(Hsv::new(-120.0, 1.0, 1.0)), Rgb::new(0, 0, 255));
    }

    #[test]
    fn mired_kelvin_inverses_clamp() {
        assert_eq!(mired_to_kelvin(250), 4000);
        assert_eq!(kelvin_to_mired(4000), 250);
        // Out-of-range inputs clamp before the division, never blow up.
        assert_eq!(mired_to_kelvin(1), mired_to_kelvin(MIRED_MIN));
        assert_eq!(kelvin_to_mired(100), kelvin_to_mired(KELVIN_MIN));
        assert_eq!(kelvin_to_mired(60_000), kelvin_to_mired(KELVIN_MAX));
    }

    #[test]
    fn kelvin_to_rgb_warm_is_redder_than_cool() {
        let warm = kelvin_to_rgb(2000);
        let cool = kelvin_to_rgb(8000);
        assert_eq!(warm.red, 255);
        assert!(warm.blue < cool.blue);
        assert_eq!(cool.blue, 255);
    }

    #[test]
    fn gamma_bypass_is_linear() {
        let (x_lin, y_lin) = rgb_to_xy(Rgb::new(128, 128, 128), false);
        let (x_gam, y_gam) = rgb_to_xy(Rgb::new(128, 128, 128), true);
        // Gray has the same chromaticity either way.
        assert!((x_lin - x_gam).abs() < 1e-9);
        assert!((y_lin - y_gam).abs() < 1e-9);
    }
}
