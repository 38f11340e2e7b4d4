//! Light and group entities.
//!
//! A [`LightEntity`] owns the normalized state, capability set and
//! echo-suppression deadline for one bridge device or group. It is where
//! loosely-typed commands are normalized into device units, where observed
//! bridge snapshots are reconciled against local state, and where the
//! external projection is built.

use std::time::{Duration, Instant};

use log::debug;
use serde_json::{Value, json};

use crate::bridge::{DeviceIntent, RawDeviceState, RawGroup, RawLight};
use crate::capabilities::{Capability, CapabilitySet};
use crate::color::{self, Hsv, Rgb};
use crate::command::{self, CommandSettings, LightCommand};
use crate::errors::Error;
use crate::state::{
    ColorMode, NormalizedState, degrees_to_hue, fraction_to_sat, hue_to_degrees, percent_to_bri,
    sat_to_fraction, value_to_bri,
};

type Result<T> = std::result::Result<T, Error>;

/// Default window during which polled updates are treated as echoes of a
/// command this entity just issued.
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_secs(2);

/// Saturation forced onto the RGB projection of temperature-mode devices,
/// so white light renders as a tint instead of a saturated color.
const TEMPERATURE_PROJECTION_SAT: f64 = 0.05;

/// D65-ish white point used when an xy-mode device has not reported a pair.
const WHITE_POINT: (f64, f64) = (0.3227, 0.329);

/// Brightness floor for the xy projection so an almost-off light still
/// projects its chromaticity instead of collapsing to black.
const MIN_PROJECTION_Y: f64 = 1.0 / 254.0;

/// Whether an id refers to a single light or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Light,
    Group,
}

/// Identity of a device or group as known to the engine.
///
/// Bridge light and group id namespaces overlap (both start at "1"), so the
/// kind is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LightId {
    pub kind: TargetKind,
    pub id: String,
}

impl LightId {
    pub fn light(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Light,
            id: id.into(),
        }
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Group,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for LightId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TargetKind::Light => write!(f, "light/{}", self.id),
            TargetKind::Group => write!(f, "group/{}", self.id),
        }
    }
}

/// Descriptive metadata for a device or group.
///
/// Refreshed unconditionally on every observed snapshot, independent of the
/// state equality check.
#[derive(Debug, Clone, PartialEq)]
pub struct LightInfo {
    pub name: String,
    /// Device or group type string as reported by the bridge.
    pub kind: String,
    pub model_id: Option<String>,
    pub unique_id: Option<String>,
    /// Member light ids, for groups.
    pub lights: Vec<String>,
    pub class: Option<String>,
}

impl From<&RawLight> for LightInfo {
    fn from(raw: &RawLight) -> Self {
        Self {
            name: raw.name.clone(),
            kind: raw.kind.clone(),
            model_id: raw.model_id.clone(),
            unique_id: raw.unique_id.clone(),
            lights: Vec::new(),
            class: None,
        }
    }
}

impl From<&RawGroup> for LightInfo {
    fn from(raw: &RawGroup) -> Self {
        Self {
            name: raw.name.clone(),
            kind: raw.kind.clone(),
            model_id: None,
            unique_id: None,
            lights: raw.lights.clone(),
            class: raw.class.clone(),
        }
    }
}

/// Result of feeding an observed snapshot into an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Discarded: the snapshot arrived inside the echo window.
    Suppressed,
    /// Parsed state matched what we already had.
    Unchanged,
    /// State replaced; subscribers should be notified.
    Updated,
}

/// One known device or group.
#[derive(Debug, Clone)]
pub struct LightEntity {
    id: LightId,
    info: LightInfo,
    capabilities: CapabilitySet,
    state: NormalizedState,
    echo_deadline: Option<Instant>,
    echo_window: Duration,
}

/// A color value resolved from a command, before transcoding to the
/// device's native representation.
enum ResolvedColor {
    Xy(f64, f64),
    /// Device-unit hue and saturation.
    Hs(u16, u8),
    Rgb(Rgb),
    Ct(u16),
}

impl LightEntity {
    pub fn from_raw_light(raw: &RawLight, echo_window: Duration) -> Self {
        Self::new(LightId::light(&raw.id), raw.into(), &raw.state, echo_window)
    }

    pub fn from_raw_group(raw: &RawGroup, echo_window: Duration) -> Self {
        Self::new(LightId::group(&raw.id), raw.into(), &raw.action, echo_window)
    }

    fn new(id: LightId, info: LightInfo, raw: &RawDeviceState, echo_window: Duration) -> Self {
        let capabilities = CapabilitySet::derive(raw);
        Self {
            id,
            info,
            capabilities,
            state: NormalizedState::from_raw(raw, capabilities),
            echo_deadline: None,
            echo_window,
        }
    }

    pub fn id(&self) -> &LightId {
        &self.id
    }

    pub fn is_group(&self) -> bool {
        self.id.kind == TargetKind::Group
    }

    pub fn info(&self) -> &LightInfo {
        &self.info
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn state(&self) -> &NormalizedState {
        &self.state
    }

    /// Apply a parsed subscriber command.
    ///
    /// On success the normalized change has been merged into the entity's
    /// state, the echo window is armed from `now`, and the returned intent
    /// is ready for the bridge transport. On error nothing was mutated.
    pub fn apply_command(&mut self, command: &LightCommand, now: Instant) -> Result<DeviceIntent> {
        let mut intent = DeviceIntent::default();
        let mut echo_extension = Duration::ZERO;

        match command {
            LightCommand::Switch(on) => {
                self.state.on = *on;
                intent.on = Some(*on);
            }
            LightCommand::Toggle => {
                self.state.on = !self.state.on;
                intent.on = Some(self.state.on);
            }
            LightCommand::Brightness(percent) => {
                self.state.on = true;
                self.state.brightness = percent_to_bri(*percent);
                intent.on = Some(true);
                intent.bri = Some(self.state.brightness);
            }
            LightCommand::Settings(settings) => {
                echo_extension = self.apply_settings(settings, &mut intent)?;
            }
        }

        self.echo_deadline = Some(now + self.echo_window + echo_extension);
        debug!("{}: applied command, intent {:?}", self.id, intent);
        Ok(intent)
    }

    /// Feed an observed bridge snapshot into the entity.
    ///
    /// Metadata refreshes unconditionally. State only changes when the
    /// snapshot is outside the echo window and differs from what is held;
    /// a reachability flip alone counts as a difference.
    pub fn reconcile_observed(
        &mut self,
        info: LightInfo,
        raw: &RawDeviceState,
        now: Instant,
    ) -> ReconcileOutcome {
        self.info = info;

        if self.echo_deadline.is_some_and(|deadline| now < deadline) {
            debug!("{}: update suppressed inside echo window", self.id);
            return ReconcileOutcome::Suppressed;
        }

        self.capabilities = CapabilitySet::derive(raw);
        let observed = NormalizedState::from_raw(raw, self.capabilities);
        if observed == self.state {
            return ReconcileOutcome::Unchanged;
        }
        self.state = observed;
        ReconcileOutcome::Updated
    }

    /// Build the externally consumable snapshot of this entity.
    ///
    /// The canonical `(xy, hsv, rgb)` triple is always present, derived from
    /// whichever representation is authoritative. Brightness and HSV
    /// components are external percentage/degree units; the raw device-unit
    /// state rides along under `"state"` for diagnostics.
    pub fn state_message(&self) -> Value {
        let (rgb, hsv, xy) = self.projected_color();

        let mut message = json!({
            "id": self.id.id,
            "type": match self.id.kind {
                TargetKind::Light => "light",
                TargetKind::Group => "group",
            },
            "name": self.info.name,
            "deviceType": self.info.kind,
            "on": self.state.on,
            "brightness": self.state.brightness_percent(),
            "rgb": [rgb.red, rgb.green, rgb.blue],
            "hsv": {
                "hue": hsv.hue.round() as u16 % 360,
                "saturation": (hsv.saturation * 100.0).round() as u8,
                "value": (hsv.value * 100.0).round() as u8,
            },
            "xy": { "x": xy.0, "y": xy.1 },
            "colorMode": self.state.color_mode,
            "reachable": self.state.reachable,
            "capabilities": self.capabilities.names(),
            "state": self.state,
        });

        if let Some(object) = message.as_object_mut() {
            if let Some(model_id) = &self.info.model_id {
                object.insert("modelId".into(), json!(model_id));
            }
            if let Some(unique_id) = &self.info.unique_id {
                object.insert("uniqueId".into(), json!(unique_id));
            }
            if self.is_group() {
                object.insert("lights".into(), json!(self.info.lights));
                if let Some(class) = &self.info.class {
                    object.insert("class".into(), json!(class));
                }
            }
            if self.capabilities.has(Capability::ColorTemp) {
                let mired = self.state.color_temp.unwrap_or(color::MIRED_MAX);
                object.insert("mired".into(), json!(mired));
                object.insert("kelvin".into(), json!(color::mired_to_kelvin(mired)));
            }
        }

        message
    }

    /// Resolve the canonical color triple for the projection.
    fn projected_color(&self) -> (Rgb, Hsv, (f64, f64)) {
        let value = self.state.brightness_fraction();
        match self.state.color_mode {
            ColorMode::Xy => {
                let (x, y) = self.state.xy.unwrap_or(WHITE_POINT);
                let rgb = color::xy_to_rgb(x, y, value.max(MIN_PROJECTION_Y), true);
                (rgb, color::rgb_to_hsv(rgb), (x, y))
            }
            ColorMode::HueSat => {
                let hsv = Hsv::new(
                    hue_to_degrees(self.state.hue.unwrap_or(0)),
                    sat_to_fraction(self.state.sat.unwrap_or(0)),
                    value,
                );
                let rgb = color::hsv_to_rgb(hsv);
                let chroma = color::hsv_to_rgb(Hsv::new(hsv.hue, hsv.saturation, 1.0));
                (rgb, hsv, color::rgb_to_xy(chroma, true))
            }
            ColorMode::Temperature => {
                let mired = self.state.color_temp.unwrap_or(color::MIRED_MAX);
                let warm = color::kelvin_to_rgb(color::mired_to_kelvin(mired));
                let tinted = Hsv::new(
                    color::rgb_to_hsv(warm).hue,
                    TEMPERATURE_PROJECTION_SAT,
                    value,
                );
                let rgb = color::hsv_to_rgb(tinted);
                let chroma = color::hsv_to_rgb(Hsv::new(tinted.hue, tinted.saturation, 1.0));
                (rgb, tinted, color::rgb_to_xy(chroma, true))
            }
            ColorMode::Brightness => {
                let hsv = Hsv::new(0.0, 0.0, value);
                let rgb = color::hsv_to_rgb(hsv);
                (rgb, hsv, color::rgb_to_xy(Rgb::new(255, 255, 255), true))
            }
        }
    }

    fn apply_settings(
        &mut self,
        settings: &CommandSettings,
        intent: &mut DeviceIntent,
    ) -> Result<Duration> {
        // Resolve the color channel first (first match wins), without
        // touching state: errors must leave the entity untouched.
        let resolved = self.resolve_color(settings)?;

        // Brightness is independent of the color channel. An explicit `bri`
        // wins; otherwise an RGB-flavored command carries its own value.
        let new_brightness = settings.bri.map(percent_to_bri).or_else(|| {
            if let Some(ResolvedColor::Rgb(rgb)) = &resolved {
                Some(value_to_bri(color::rgb_to_hsv(*rgb).value))
            } else {
                None
            }
        });

        if let Some(resolved) = resolved {
            self.commit_color(resolved, intent)?;
        }
        if let Some(brightness) = new_brightness {
            self.state.brightness = brightness;
            intent.bri = Some(brightness);
        }
        if let Some(on) = settings.on {
            self.state.on = on;
            intent.on = Some(on);
        }

        intent.alert.clone_from(&settings.alert);
        intent.effect.clone_from(&settings.effect);

        let mut echo_extension = Duration::ZERO;
        if let Some(duration) = settings.duration {
            // Wire transitions are 100ms steps; the echo window grows by
            // the transition length rounded up to whole seconds.
            intent.transition_time = Some(duration.div_ceil(100).min(u64::from(u32::MAX)) as u32);
            echo_extension = Duration::from_secs(duration.div_ceil(1000));
        }

        Ok(echo_extension)
    }

    /// Pick the color channel with the documented precedence. Only reads
    /// current state, for partial inputs.
    fn resolve_color(&self, s: &CommandSettings) -> Result<Option<ResolvedColor>> {
        if s.xy.is_some() || s.x.is_some() || s.y.is_some() {
            let (current_x, current_y) = self.current_xy();
            let (x, y) = s
                .xy
                .unwrap_or((s.x.unwrap_or(current_x), s.y.unwrap_or(current_y)));
            return Ok(Some(ResolvedColor::Xy(
                color::clamp01(x),
                color::clamp01(y),
            )));
        }
        if let Some(hue) = s.hue {
            // Saturation and brightness are preserved.
            let sat = self
                .state
                .sat
                .unwrap_or_else(|| fraction_to_sat(self.current_hsv().saturation));
            return Ok(Some(ResolvedColor::Hs(clamp_u16(hue), sat)));
        }
        if let Some((r, g, b)) = s.rgb {
            return Ok(Some(ResolvedColor::Rgb(Rgb::new(
                clamp_u8(r),
                clamp_u8(g),
                clamp_u8(b),
            ))));
        }
        if s.red.is_some() || s.green.is_some() || s.blue.is_some() {
            let mut rgb = color::hsv_to_rgb(self.current_hsv());
            if let Some(red) = s.red {
                rgb.red = clamp_u8(red);
            }
            if let Some(green) = s.green {
                rgb.green = clamp_u8(green);
            }
            if let Some(blue) = s.blue {
                rgb.blue = clamp_u8(blue);
            }
            return Ok(Some(ResolvedColor::Rgb(rgb)));
        }
        if let Some(hex) = &s.hex {
            let (r, g, b) = command::parse_hex(hex)?;
            return Ok(Some(ResolvedColor::Rgb(Rgb::new(r, g, b))));
        }
        if let Some(sat) = s.sat {
            let hue = self
                .state
                .hue
                .unwrap_or_else(|| degrees_to_hue(self.current_hsv().hue));
            return Ok(Some(ResolvedColor::Hs(hue, clamp_u8(sat))));
        }
        if let Some(ct) = s.ct {
            let mired = clamp_u16(ct).clamp(color::MIRED_MIN, color::MIRED_MAX);
            return Ok(Some(ResolvedColor::Ct(mired)));
        }
        if let Some(kelvin) = s.kelvin {
            let kelvin = clamp_u16(kelvin).clamp(color::KELVIN_MIN, color::KELVIN_MAX);
            return Ok(Some(ResolvedColor::Ct(color::kelvin_to_mired(kelvin))));
        }
        Ok(None)
    }

    /// Write a resolved color into state and intent, transcoded to the
    /// device's native representation when necessary.
    fn commit_color(&mut self, resolved: ResolvedColor, intent: &mut DeviceIntent) -> Result<()> {
        let native_xy = self.capabilities.has(Capability::Xy);
        let native_hs = self.capabilities.has(Capability::HueSat);

        match resolved {
            ResolvedColor::Ct(mired) => {
                if !self.capabilities.has(Capability::ColorTemp) {
                    return Err(Error::unsupported_color(&self.id.id, "color temperature"));
                }
                self.state.color_temp = Some(mired);
                self.state.color_mode = ColorMode::Temperature;
                intent.ct = Some(mired);
            }
            ResolvedColor::Xy(x, y) => {
                if native_xy {
                    self.write_xy((x, y), intent);
                } else if native_hs {
                    let rgb = color::xy_to_rgb(x, y, 1.0, true);
                    let hsv = color::rgb_to_hsv(rgb);
                    self.write_hs(
                        degrees_to_hue(hsv.hue),
                        fraction_to_sat(hsv.saturation),
                        intent,
                    );
                } else {
                    return Err(Error::unsupported_color(&self.id.id, "xy color"));
                }
            }
            ResolvedColor::Hs(hue, sat) => {
                if native_hs {
                    self.write_hs(hue, sat, intent);
                } else if native_xy {
                    let rgb = color::hsv_to_rgb(Hsv::new(
                        hue_to_degrees(hue),
                        sat_to_fraction(sat),
                        1.0,
                    ));
                    self.write_xy(color::rgb_to_xy(rgb, true), intent);
                } else {
                    return Err(Error::unsupported_color(&self.id.id, "hue/saturation color"));
                }
            }
            ResolvedColor::Rgb(rgb) => {
                if native_xy {
                    self.write_xy(color::rgb_to_xy(rgb, true), intent);
                } else if native_hs {
                    let hsv = color::rgb_to_hsv(rgb);
                    self.write_hs(
                        degrees_to_hue(hsv.hue),
                        fraction_to_sat(hsv.saturation),
                        intent,
                    );
                } else {
                    return Err(Error::unsupported_color(&self.id.id, "rgb color"));
                }
            }
        }
        Ok(())
    }

    fn write_xy(&mut self, xy: (f64, f64), intent: &mut DeviceIntent) {
        self.state.xy = Some(xy);
        self.state.color_mode = ColorMode::Xy;
        intent.xy = Some(xy);
        // Keep the hue/sat mirror warm on dual-capability devices.
        if self.capabilities.has(Capability::HueSat) {
            let hsv = color::rgb_to_hsv(color::xy_to_rgb(xy.0, xy.1, 1.0, true));
            self.state.hue = Some(degrees_to_hue(hsv.hue));
            self.state.sat = Some(fraction_to_sat(hsv.saturation));
        }
    }

    fn write_hs(&mut self, hue: u16, sat: u8, intent: &mut DeviceIntent) {
        self.state.hue = Some(hue);
        self.state.sat = Some(sat);
        self.state.color_mode = ColorMode::HueSat;
        intent.hue = Some(hue);
        intent.sat = Some(sat);
        if self.capabilities.has(Capability::Xy) {
            let rgb =
                color::hsv_to_rgb(Hsv::new(hue_to_degrees(hue), sat_to_fraction(sat), 1.0));
            self.state.xy = Some(color::rgb_to_xy(rgb, true));
        }
    }

    /// The entity's current color as HSV, whatever the authoritative mode.
    fn current_hsv(&self) -> Hsv {
        let value = self.state.brightness_fraction();
        match self.state.color_mode {
            ColorMode::HueSat => Hsv::new(
                hue_to_degrees(self.state.hue.unwrap_or(0)),
                sat_to_fraction(self.state.sat.unwrap_or(0)),
                value,
            ),
            ColorMode::Xy => {
                let (x, y) = self.state.xy.unwrap_or(WHITE_POINT);
                let chroma = color::rgb_to_hsv(color::xy_to_rgb(x, y, 1.0, true));
                Hsv::new(chroma.hue, chroma.saturation, value)
            }
            ColorMode::Temperature => {
                let mired = self.state.color_temp.unwrap_or(color::MIRED_MAX);
                let warm = color::rgb_to_hsv(color::kelvin_to_rgb(color::mired_to_kelvin(mired)));
                Hsv::new(warm.hue, warm.saturation, value)
            }
            ColorMode::Brightness => Hsv::new(0.0, 0.0, value),
        }
    }

    /// The entity's current chromaticity, derived when not natively held.
    fn current_xy(&self) -> (f64, f64) {
        if let Some(xy) = self.state.xy {
            return xy;
        }
        let hsv = self.current_hsv();
        let chroma = color::hsv_to_rgb(Hsv::new(hsv.hue, hsv.saturation, 1.0));
        color::rgb_to_xy(chroma, true)
    }
}

fn clamp_u8(v: f64) -> u8 {
    if v.is_finite() {
        v.round().clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

fn clamp_u16(v: f64) -> u16 {
    if v.is_finite() {
        v.round().clamp(0.0, 65_535.0) as u16
    } else {
        0
    }
}
