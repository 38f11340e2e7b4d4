//! Incoming command parsing.
//!
//! Subscribers talk to the engine in loosely-typed JSON: a bare boolean,
//! an `"on"`/`"off"`/`"toggle"` string, a bare number (brightness percent)
//! or a settings object mixing color, temperature, brightness and transition
//! fields. This module turns that into a typed [`LightCommand`]; the entity
//! does the actual normalization against its capability set.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// A structured settings command.
///
/// All fields optional; unknown keys reject the whole command. `bri` is an
/// external percentage (0-100), `hue`/`sat` are device units (16-bit /
/// 8-bit), `ct` is mired and `duration` is a transition in milliseconds.
#[derive(Default, Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommandSettings {
    pub on: Option<bool>,
    pub hue: Option<f64>,
    #[serde(alias = "saturation")]
    pub sat: Option<f64>,
    pub xy: Option<(f64, f64)>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub red: Option<f64>,
    pub green: Option<f64>,
    pub blue: Option<f64>,
    pub rgb: Option<(f64, f64, f64)>,
    pub hex: Option<String>,
    #[serde(alias = "mired", alias = "mirek")]
    pub ct: Option<f64>,
    pub kelvin: Option<f64>,
    #[serde(alias = "brightness")]
    pub bri: Option<f64>,
    /// Transition duration in milliseconds.
    pub duration: Option<u64>,
    pub alert: Option<String>,
    pub effect: Option<String>,
}

impl CommandSettings {
    /// True if no recognized attribute was given at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A parsed subscriber command.
#[derive(Debug, Clone, PartialEq)]
pub enum LightCommand {
    /// Switch on or off unconditionally.
    Switch(bool),
    /// Flip the current on/off state.
    Toggle,
    /// Switch on and set brightness as a percentage.
    Brightness(f64),
    /// Structured settings object.
    Settings(Box<CommandSettings>),
}

impl LightCommand {
    /// Parse a loosely-typed JSON command.
    ///
    /// # Examples
    ///
    /// ```
    /// use hue_lights_rs::LightCommand;
    /// use serde_json::json;
    ///
    /// assert_eq!(
    ///     LightCommand::parse(&json!(true)).unwrap(),
    ///     LightCommand::Switch(true)
    /// );
    /// assert_eq!(
    ///     LightCommand::parse(&json!("off")).unwrap(),
    ///     LightCommand::Switch(false)
    /// );
    /// assert_eq!(
    ///     LightCommand::parse(&json!(75)).unwrap(),
    ///     LightCommand::Brightness(75.0)
    /// );
    /// assert!(LightCommand::parse(&json!(["nonsense"])).is_err());
    /// ```
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(on) => Ok(Self::Switch(*on)),
            Value::String(word) => match word.as_str() {
                "on" => Ok(Self::Switch(true)),
                "off" => Ok(Self::Switch(false)),
                "toggle" => Ok(Self::Toggle),
                other => Err(Error::UnrecognizedCommand(format!("string {other:?}"))),
            },
            Value::Number(n) => {
                let percent = n
                    .as_f64()
                    .filter(|p| p.is_finite())
                    .ok_or_else(|| Error::UnrecognizedCommand(format!("number {n}")))?;
                Ok(Self::Brightness(percent.clamp(0.0, 100.0)))
            }
            Value::Object(_) => {
                let settings: CommandSettings = serde_json::from_value(value.clone())
                    .map_err(|e| Error::UnrecognizedCommand(e.to_string()))?;
                if settings.is_empty() {
                    return Err(Error::EmptyCommand);
                }
                if let Some(hex) = &settings.hex {
                    parse_hex(hex)?;
                }
                Ok(Self::Settings(Box::new(settings)))
            }
            other => Err(Error::UnrecognizedCommand(format!("{other}"))),
        }
    }
}

/// Validate and decode a `#rrggbb` / `rrggbb` color string.
pub(crate) fn parse_hex(hex: &str) -> Result<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::UnrecognizedCommand(format!("hex color {hex:?}")));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).unwrap_or_default()
    };
    Ok((channel(0..2), channel(2..4), channel(4..6)))
}
