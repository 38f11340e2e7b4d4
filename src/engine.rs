//! Poll-driven reconciliation engine.
//!
//! The engine owns every known [`LightEntity`], periodically pulls the
//! bridge's light and group listings through the host-supplied
//! [`BridgeClient`], reconciles them against local state, and fans resulting
//! events out to registered subscribers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::bridge::BridgeClient;
use crate::command::LightCommand;
use crate::errors::Error;
use crate::light::{DEFAULT_ECHO_WINDOW, LightEntity, LightId, ReconcileOutcome, TargetKind};
use crate::registry::{EventKind, HandlerRegistry, StateCallback};
use crate::runtime;

type Result<T> = std::result::Result<T, Error>;

/// Group id the bridge uses for the implicit all-lights pseudo-group.
const ALL_LIGHTS_GROUP: &str = "0";

/// Upper bound on one poll cycle's bridge listings.
const LISTING_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    poll_interval: Duration,
    echo_window: Duration,
}

impl Config {
    /// Polling faster than this hammers the bridge for no benefit.
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Build a validated configuration.
    pub fn new(poll_interval: Duration, echo_window: Duration) -> Result<Self> {
        if poll_interval < Self::MIN_POLL_INTERVAL {
            return Err(Error::IntervalTooShort(poll_interval));
        }
        Ok(Self {
            poll_interval,
            echo_window,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn echo_window(&self) -> Duration {
        self.echo_window
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            echo_window: DEFAULT_ECHO_WINDOW,
        }
    }
}

/// Point-in-time view of the engine's health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub running: bool,
    pub known_lights: usize,
    pub known_groups: usize,
    pub total_subscribers: usize,
    pub seconds_since_last_poll: Option<f64>,
    pub last_error: Option<String>,
}

/// Keeps local light state in sync with a polling-only bridge.
pub struct SyncEngine {
    core: Arc<EngineCore>,
    poll_task: StdMutex<Option<runtime::JoinHandle<()>>>,
}

struct EngineCore {
    client: Arc<dyn BridgeClient>,
    config: Config,
    entities: runtime::Mutex<HashMap<LightId, LightEntity>>,
    registry: StdMutex<HandlerRegistry>,
    running: AtomicBool,
    polling: AtomicBool,
    last_poll: StdMutex<Option<Instant>>,
    last_error: StdMutex<Option<String>>,
}

impl SyncEngine {
    pub fn new(client: Arc<dyn BridgeClient>, config: Config) -> Self {
        Self {
            core: Arc::new(EngineCore {
                client,
                config,
                entities: runtime::Mutex::new(HashMap::new()),
                registry: StdMutex::new(HandlerRegistry::new()),
                running: AtomicBool::new(false),
                polling: AtomicBool::new(false),
                last_poll: StdMutex::new(None),
                last_error: StdMutex::new(None),
            }),
            poll_task: StdMutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Start polling.
    ///
    /// The first poll runs synchronously so the engine comes up with a
    /// populated device map or not at all; subsequent polls run on a
    /// background task at the configured interval. Calling `start` on a
    /// running engine is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.core.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.core.poll_once().await {
            self.core.running.store(false, Ordering::SeqCst);
            return Err(Error::StartFailed(e.to_string()));
        }

        let core = Arc::clone(&self.core);
        let handle = runtime::spawn(async move {
            while core.running.load(Ordering::SeqCst) {
                runtime::sleep(core.config.poll_interval).await;
                if !core.running.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = core.poll_once().await {
                    warn!("poll failed: {e}");
                }
            }
        });
        *self.poll_task.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Stop polling and forget every device and subscriber.
    pub async fn stop(&self) {
        self.core.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.poll_task.lock().unwrap().take() {
            handle.abort();
        }
        self.core.entities.lock().await.clear();
        self.core.registry.lock().unwrap().clear();
    }

    /// Run a single poll cycle immediately.
    ///
    /// A cycle already in flight makes this a no-op; ticks are dropped, not
    /// queued, when the bridge is slower than the poll interval.
    pub async fn poll_once(&self) -> Result<()> {
        self.core.poll_once().await
    }

    /// Normalize and apply a loosely-typed command to a known device.
    ///
    /// Returns whether the command was accepted. Rejections (unknown id,
    /// unrecognized shape, unsupported color) are logged and leave all state
    /// untouched. Transport failures after acceptance do not roll the local
    /// state back; the next poll past the echo window re-converges it.
    pub async fn apply_command(&self, id: &LightId, payload: &Value) -> bool {
        let command = match LightCommand::parse(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("{id}: rejected command: {e}");
                return false;
            }
        };

        let (intent, message) = {
            let mut entities = self.core.entities.lock().await;
            let Some(entity) = entities.get_mut(id) else {
                warn!("{id}: command for unknown device");
                return false;
            };
            match entity.apply_command(&command, Instant::now()) {
                Ok(intent) => (intent, entity.state_message()),
                Err(e) => {
                    warn!("{id}: rejected command: {e}");
                    return false;
                }
            }
        };

        if !intent.is_empty() {
            let result = match id.kind {
                TargetKind::Light => self.core.client.set_light_state(&id.id, &intent).await,
                TargetKind::Group => self.core.client.set_group_state(&id.id, &intent).await,
            };
            if let Err(e) = result {
                warn!("{id}: transmit failed: {e}");
                *self.core.last_error.lock().unwrap() = Some(e.to_string());
            }
        }

        self.core.dispatch(id, EventKind::Update, &message);
        true
    }

    /// The current projection for one device, if known.
    pub async fn state_message(&self, id: &LightId) -> Option<Value> {
        self.core
            .entities
            .lock()
            .await
            .get(id)
            .map(LightEntity::state_message)
    }

    /// Ids of every known device, split by kind.
    pub async fn list_known_devices(&self) -> Value {
        let entities = self.core.entities.lock().await;
        let mut lights = Vec::new();
        let mut groups = Vec::new();
        for id in entities.keys() {
            match id.kind {
                TargetKind::Light => lights.push(id.id.clone()),
                TargetKind::Group => groups.push(id.id.clone()),
            }
        }
        lights.sort();
        groups.sort();
        json!({ "lights": lights, "groups": groups })
    }

    /// Register a callback for one device's events.
    ///
    /// If the device is already known, its current snapshot is delivered to
    /// the new subscriber immediately, tagged as a `new` event. Registration
    /// happens before the snapshot is read, so a poll landing in between
    /// still reaches the subscriber instead of slipping past it.
    pub async fn register_subscriber<F>(&self, id: LightId, callback: F) -> Uuid
    where
        F: Fn(EventKind, &Value) + Send + Sync + 'static,
    {
        let callback: StateCallback = Arc::new(callback);
        let token = self
            .core
            .registry
            .lock()
            .unwrap()
            .register(id.clone(), Arc::clone(&callback));

        let initial = {
            self.core
                .entities
                .lock()
                .await
                .get(&id)
                .map(LightEntity::state_message)
        };
        if let Some(message) = initial {
            callback(EventKind::New, &tag_event(message, EventKind::New));
        }
        token
    }

    /// Remove one subscriber registration.
    pub fn unregister_subscriber(&self, id: &LightId, token: &Uuid) -> bool {
        self.core.registry.lock().unwrap().unregister(id, token)
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        let (known_lights, known_groups) = {
            let entities = self.core.entities.lock().await;
            let lights = entities
                .keys()
                .filter(|id| id.kind == TargetKind::Light)
                .count();
            (lights, entities.len() - lights)
        };
        Diagnostics {
            running: self.is_running(),
            known_lights,
            known_groups,
            total_subscribers: self.core.registry.lock().unwrap().total_subscribers(),
            seconds_since_last_poll: self
                .core
                .last_poll
                .lock()
                .unwrap()
                .map(|t| t.elapsed().as_secs_f64()),
            last_error: self.core.last_error.lock().unwrap().clone(),
        }
    }
}

impl EngineCore {
    async fn poll_once(&self) -> Result<()> {
        if self.polling.swap(true, Ordering::SeqCst) {
            debug!("poll tick dropped; previous cycle still in flight");
            return Ok(());
        }
        let result = self.poll_inner().await;
        self.polling.store(false, Ordering::SeqCst);
        match &result {
            Ok(()) => *self.last_poll.lock().unwrap() = Some(Instant::now()),
            Err(e) => *self.last_error.lock().unwrap() = Some(e.to_string()),
        }
        result
    }

    /// One full reconciliation cycle. Either listing failing aborts the
    /// whole cycle; no partial reconciliation happens.
    async fn poll_inner(&self) -> Result<()> {
        let (lights, groups) = runtime::timeout(LISTING_TIMEOUT, async {
            futures::join!(self.client.list_lights(), self.client.list_groups())
        })
        .await
        .map_err(|_| Error::transport("poll", "bridge listing timed out"))?;
        let lights = lights?;
        let groups = groups?;

        let now = Instant::now();
        let mut events: Vec<(LightId, EventKind, Value)> = Vec::new();
        {
            let mut entities = self.entities.lock().await;
            for light in &lights {
                let id = LightId::light(&light.id);
                match entities.entry(id.clone()) {
                    Entry::Vacant(slot) => {
                        debug!("{id}: discovered");
                        let entity =
                            slot.insert(LightEntity::from_raw_light(light, self.config.echo_window));
                        events.push((id, EventKind::New, entity.state_message()));
                    }
                    Entry::Occupied(mut slot) => {
                        let entity = slot.get_mut();
                        if entity.reconcile_observed(light.into(), &light.state, now)
                            == ReconcileOutcome::Updated
                        {
                            events.push((id, EventKind::Update, entity.state_message()));
                        }
                    }
                }
            }
            for group in &groups {
                if group.id == ALL_LIGHTS_GROUP {
                    continue;
                }
                let id = LightId::group(&group.id);
                match entities.entry(id.clone()) {
                    Entry::Vacant(slot) => {
                        debug!("{id}: discovered");
                        let entity =
                            slot.insert(LightEntity::from_raw_group(group, self.config.echo_window));
                        events.push((id, EventKind::New, entity.state_message()));
                    }
                    Entry::Occupied(mut slot) => {
                        let entity = slot.get_mut();
                        if entity.reconcile_observed(group.into(), &group.action, now)
                            == ReconcileOutcome::Updated
                        {
                            events.push((id, EventKind::Update, entity.state_message()));
                        }
                    }
                }
            }
        }

        // Dispatch outside the entity lock so callbacks can call back into
        // the engine's async surface.
        for (id, kind, message) in &events {
            self.dispatch(id, *kind, message);
        }
        Ok(())
    }

    /// Deliver an event to every subscriber of `id`.
    ///
    /// The registry lock is only held long enough to snapshot the callback
    /// list; callbacks run unlocked so they can re-enter
    /// register/unregister without deadlocking.
    fn dispatch(&self, id: &LightId, kind: EventKind, message: &Value) {
        let callbacks = self.registry.lock().unwrap().subscribers(id);
        if callbacks.is_empty() {
            return;
        }
        debug!("{id}: dispatching {kind} to {} subscriber(s)", callbacks.len());
        let tagged = tag_event(message.clone(), kind);
        for callback in &callbacks {
            callback(kind, &tagged);
        }
    }
}

/// Stamp the event kind into a projection payload.
fn tag_event(mut message: Value, kind: EventKind) -> Value {
    if let Some(object) = message.as_object_mut() {
        object.insert("event".into(), Value::String(kind.to_string()));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{DeviceIntent, RawGroup, RawLight};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Bridge double that replays scripted listing responses and records
    /// transmitted intents.
    #[derive(Default)]
    struct ScriptedBridge {
        lights: Mutex<VecDeque<Result<Vec<RawLight>>>>,
        groups: Mutex<VecDeque<Result<Vec<RawGroup>>>>,
        sent: Mutex<Vec<(String, DeviceIntent)>>,
    }

    impl ScriptedBridge {
        fn push_lights(&self, response: Result<Vec<RawLight>>) {
            self.lights.lock().unwrap().push_back(response);
        }

        fn push_groups(&self, response: Result<Vec<RawGroup>>) {
            self.groups.lock().unwrap().push_back(response);
        }

        fn push_listing(&self, lights: Vec<RawLight>, groups: Vec<RawGroup>) {
            self.push_lights(Ok(lights));
            self.push_groups(Ok(groups));
        }
    }

    #[async_trait]
    impl BridgeClient for ScriptedBridge {
        async fn list_lights(&self) -> Result<Vec<RawLight>> {
            self.lights
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn list_groups(&self) -> Result<Vec<RawGroup>> {
            self.groups
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn set_light_state(&self, id: &str, intent: &DeviceIntent) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((format!("light/{id}"), intent.clone()));
            Ok(())
        }

        async fn set_group_state(&self, id: &str, intent: &DeviceIntent) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((format!("group/{id}"), intent.clone()));
            Ok(())
        }
    }

    fn light(id: &str, on: bool, bri: f64) -> RawLight {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Light {id}"),
            "type": "Extended color light",
            "state": {
                "on": on,
                "bri": bri,
                "hue": 1000,
                "sat": 100,
                "xy": [0.4, 0.4],
                "ct": 300,
                "colormode": "xy",
                "reachable": true
            }
        }))
        .unwrap()
    }

    fn group(id: &str, name: &str) -> RawGroup {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "type": "Room",
            "lights": ["1"],
            "action": { "on": true, "bri": 254, "colormode": "ct", "ct": 366 }
        }))
        .unwrap()
    }

    fn engine(bridge: Arc<ScriptedBridge>) -> SyncEngine {
        // Zero echo window so reconciliation tests see every poll.
        let config = Config::new(Duration::from_secs(60), Duration::ZERO).unwrap();
        SyncEngine::new(bridge, config)
    }

    fn event_log() -> (
        Arc<Mutex<Vec<EventKind>>>,
        impl Fn(EventKind, &Value) + Send + Sync,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |kind, _: &Value| sink.lock().unwrap().push(kind))
    }

    #[test]
    fn config_rejects_sub_floor_interval() {
        let result = Config::new(Duration::from_millis(100), DEFAULT_ECHO_WINDOW);
        assert!(matches!(result, Err(Error::IntervalTooShort(_))));
    }

    #[tokio::test]
    async fn first_poll_discovers_lights_and_groups() {
        let bridge = Arc::new(ScriptedBridge::default());
        bridge.push_listing(vec![light("1", true, 200.0)], vec![group("2", "Kitchen")]);
        let engine = engine(Arc::clone(&bridge));

        engine.poll_once().await.unwrap();

        let known = engine.list_known_devices().await;
        assert_eq!(known["lights"], serde_json::json!(["1"]));
        assert_eq!(known["groups"], serde_json::json!(["2"]));
    }

    #[tokio::test]
    async fn all_lights_pseudo_group_is_skipped() {
        let bridge = Arc::new(ScriptedBridge::default());
        bridge.push_listing(Vec::new(), vec![group("0", "All"), group("1", "Kitchen")]);
        let engine = engine(Arc::clone(&bridge));

        engine.poll_once().await.unwrap();

        let known = engine.list_known_devices().await;
        assert_eq!(known["groups"], serde_json::json!(["1"]));
    }

    #[tokio::test]
    async fn new_fires_once_per_device() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        let (seen, callback) = event_log();
        // Registering against a known device yields an immediate snapshot.
        engine.register_subscriber(LightId::light("1"), callback).await;
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::New]);

        // Re-observing the same device fires no further events.
        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn changed_state_fires_update() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        let (seen, callback) = event_log();
        engine.register_subscriber(LightId::light("1"), callback).await;

        bridge.push_listing(vec![light("1", false, 10.0)], Vec::new());
        engine.poll_once().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::New, EventKind::Update]);
    }

    #[tokio::test]
    async fn failed_listing_aborts_cycle_without_forgetting_devices() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        bridge.push_lights(Err(Error::transport("list_lights", "connection refused")));
        bridge.push_groups(Ok(Vec::new()));
        assert!(engine.poll_once().await.is_err());

        let known = engine.list_known_devices().await;
        assert_eq!(known["lights"], serde_json::json!(["1"]));
        assert!(engine.diagnostics().await.last_error.is_some());
    }

    #[tokio::test]
    async fn start_fails_when_first_poll_fails() {
        let bridge = Arc::new(ScriptedBridge::default());
        bridge.push_lights(Err(Error::transport("list_lights", "unauthorized")));
        bridge.push_groups(Ok(Vec::new()));
        let engine = engine(Arc::clone(&bridge));

        let result = engine.start().await;
        assert!(matches!(result, Err(Error::StartFailed(_))));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let bridge = Arc::new(ScriptedBridge::default());
        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        let engine = engine(Arc::clone(&bridge));

        engine.start().await.unwrap();
        assert!(engine.is_running());
        // Second start is a no-op.
        engine.start().await.unwrap();

        engine.stop().await;
        assert!(!engine.is_running());
        let known = engine.list_known_devices().await;
        assert_eq!(known["lights"], serde_json::json!([] as [&str; 0]));
    }

    #[tokio::test]
    async fn apply_command_transmits_and_notifies() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", false, 10.0)], Vec::new());
        engine.poll_once().await.unwrap();

        let (seen, callback) = event_log();
        engine.register_subscriber(LightId::light("1"), callback).await;

        let id = LightId::light("1");
        assert!(engine.apply_command(&id, &serde_json::json!(true)).await);

        let sent = bridge.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "light/1");
        assert_eq!(sent[0].1.on, Some(true));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::New, EventKind::Update]
        );
    }

    #[tokio::test]
    async fn apply_command_routes_groups_to_group_endpoint() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(Vec::new(), vec![group("3", "Attic")]);
        engine.poll_once().await.unwrap();

        let id = LightId::group("3");
        assert!(engine.apply_command(&id, &serde_json::json!(42)).await);

        let sent = bridge.sent.lock().unwrap();
        assert_eq!(sent[0].0, "group/3");
        assert_eq!(sent[0].1.bri, Some(107)); // 42% of 254
    }

    #[tokio::test]
    async fn apply_command_rejects_unknown_device() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));
        let id = LightId::light("99");
        assert!(!engine.apply_command(&id, &serde_json::json!(true)).await);
        assert!(bridge.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_command_rejects_malformed_payload() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        let id = LightId::light("1");
        assert!(!engine.apply_command(&id, &serde_json::json!("sideways")).await);
        assert!(!engine.apply_command(&id, &serde_json::json!({})).await);
        assert!(bridge.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscriber_can_unregister_itself_during_dispatch() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = Arc::new(engine(Arc::clone(&bridge)));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        let id = LightId::light("1");
        let token: Arc<Mutex<Option<Uuid>>> = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let engine_handle = Arc::clone(&engine);
        let token_handle = Arc::clone(&token);
        let seen_handle = Arc::clone(&seen);
        let callback_id = id.clone();
        let registered = engine
            .register_subscriber(id.clone(), move |kind, _: &Value| {
                seen_handle.lock().unwrap().push(kind);
                if kind == EventKind::Update {
                    if let Some(own_token) = token_handle.lock().unwrap().take() {
                        engine_handle.unregister_subscriber(&callback_id, &own_token);
                    }
                }
            })
            .await;
        *token.lock().unwrap() = Some(registered);

        // Delivery must complete even though the callback re-enters the
        // engine's subscription surface.
        bridge.push_listing(vec![light("1", false, 10.0)], Vec::new());
        engine.poll_once().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventKind::New, EventKind::Update]
        );
        assert_eq!(engine.diagnostics().await.total_subscribers, 0);

        // The callback is gone; further updates reach nobody.
        bridge.push_listing(vec![light("1", true, 254.0)], Vec::new());
        engine.poll_once().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dispatched_messages_carry_event_tag() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine
            .register_subscriber(LightId::light("1"), move |_, message: &Value| {
                sink.lock().unwrap().push(message["event"].clone());
            })
            .await;

        bridge.push_listing(vec![light("1", false, 10.0)], Vec::new());
        engine.poll_once().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![serde_json::json!("new"), serde_json::json!("update")]
        );
    }

    #[tokio::test]
    async fn registration_precedes_initial_snapshot() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = Arc::new(engine(Arc::clone(&bridge)));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        // By the time the initial snapshot arrives the registration must
        // already be visible, so no poll can slip between the two.
        let engine_handle = Arc::clone(&engine);
        let observed_count = Arc::new(Mutex::new(None));
        let count_handle = Arc::clone(&observed_count);
        engine
            .register_subscriber(LightId::light("1"), move |kind, _: &Value| {
                if kind == EventKind::New {
                    let registry = engine_handle.core.registry.lock().unwrap();
                    *count_handle.lock().unwrap() =
                        Some(registry.subscriber_count(&LightId::light("1")));
                }
            })
            .await;

        assert_eq!(*observed_count.lock().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", true, 200.0)], Vec::new());
        engine.poll_once().await.unwrap();

        let (seen, callback) = event_log();
        let id = LightId::light("1");
        let token = engine.register_subscriber(id.clone(), callback).await;
        assert!(engine.unregister_subscriber(&id, &token));

        bridge.push_listing(vec![light("1", false, 10.0)], Vec::new());
        engine.poll_once().await.unwrap();
        // Only the initial snapshot was ever delivered.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn diagnostics_reflect_engine_shape() {
        let bridge = Arc::new(ScriptedBridge::default());
        let engine = engine(Arc::clone(&bridge));

        bridge.push_listing(vec![light("1", true, 200.0)], vec![group("2", "Kitchen")]);
        engine.poll_once().await.unwrap();

        let diagnostics = engine.diagnostics().await;
        assert!(!diagnostics.running);
        assert_eq!(diagnostics.known_lights, 1);
        assert_eq!(diagnostics.known_groups, 1);
        assert_eq!(diagnostics.total_subscribers, 0);
        assert!(diagnostics.seconds_since_last_poll.is_some());
        assert!(diagnostics.last_error.is_none());
    }
}
