//! # hue_lights_rs
//!
//! An async Rust library for keeping local light state in sync with a
//! Hue-style bridge that only exposes polling.
//!
//! This crate provides a **runtime-agnostic** reconciliation engine for
//! color-capable lights and groups. The host supplies the transport (a
//! [`BridgeClient`] implementation over whatever HTTP stack it already has);
//! the engine handles everything in between: capability derivation, state
//! normalization into integer device units, loosely-typed command parsing,
//! color space transcoding, echo suppression and subscriber fan-out.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hue_lights_rs::{Config, LightId, SyncEngine};
//!
//! // Works with any async runtime!
//! async fn watch_a_light(client: Arc<dyn hue_lights_rs::BridgeClient>) {
//!     let engine = SyncEngine::new(client, Config::default());
//!     engine.start().await.expect("first poll failed");
//!
//!     engine
//!         .register_subscriber(LightId::light("1"), |event, message| {
//!             println!("{event}: {message}");
//!         })
//!         .await;
//!
//!     // Loosely-typed commands: bools, percentages, "toggle", or objects
//!     // with hex/rgb/xy/kelvin attributes all normalize the same way.
//!     engine
//!         .apply_command(&LightId::light("1"), &serde_json::json!({"hex": "#ff8800"}))
//!         .await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Runtime Agnostic**: Works with tokio, async-std, or smol async runtimes
//! - **Transport Agnostic**: Bring your own HTTP client via [`BridgeClient`]
//! - **Capability Model**: Per-device [`CapabilitySet`] derived from what the
//!   bridge actually reports
//! - **Color Math**: sRGB/Wide-Gamut xy, HSV and color temperature
//!   conversions in [`color`]
//! - **Command Normalization**: One loosely-typed entry point for switches,
//!   brightness, RGB, hex, xy, hue/sat and kelvin/mired inputs
//! - **Echo Suppression**: Polled snapshots that merely echo a just-issued
//!   command are discarded instead of bouncing state back
//! - **Subscribers**: Token-based callbacks per light or group with `new`
//!   and `update` events
//!
//! ## Runtime Selection
//!
//! This library is runtime-agnostic. Select your preferred runtime using feature flags:
//!
//! ### Using tokio (default)
//!
//! ```toml
//! [dependencies]
//! hue-lights-rs = "0.1"
//! tokio = { version = "1", features = ["rt-multi-thread", "macros"] }
//! ```
//!
//! ### Using async-std
//!
//! ```toml
//! [dependencies]
//! hue-lights-rs = { version = "0.1", default-features = false, features = ["runtime-async-std"] }
//! async-std = { version = "1.12", features = ["attributes"] }
//! ```
//!
//! ### Using smol
//!
//! ```toml
//! [dependencies]
//! hue-lights-rs = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! smol = "2"
//! ```
//!
//! ## Feature Flags
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime

mod bridge;
mod capabilities;
pub mod color;
mod command;
mod engine;
mod errors;
mod light;
mod registry;
pub mod runtime;
mod state;

// Re-export public API
pub use bridge::{BridgeClient, DeviceIntent, RawDeviceState, RawGroup, RawGroupState, RawLight};
pub use capabilities::{Capability, CapabilitySet};
pub use command::{CommandSettings, LightCommand};
pub use engine::{Config, Diagnostics, SyncEngine};
pub use errors::Error;
pub use light::{
    DEFAULT_ECHO_WINDOW, LightEntity, LightId, LightInfo, ReconcileOutcome, TargetKind,
};
pub use registry::{EventKind, HandlerRegistry, StateCallback};
pub use state::{BRI_MAX, ColorMode, NormalizedState};
