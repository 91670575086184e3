use std::{collections::HashMap, io::ErrorKind, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use chrono_tz::Tz;
use hvac_common::{
    command_topic, config::room_from_hostname, RelayDriver, RuntimeConfig, SensorDriver,
    ThermostatEngine,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, Outgoing, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    bus::MqttBus,
    control::{apply_remote_command, publish_report, Controller, SharedState},
    relay::{LoggingRelay, SysfsGpioRelay},
    sensor::{FileDriver, SensorReader, SimulatedDriver},
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const MQTT_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HOSTNAME: &str = "thermopi";

#[derive(Clone)]
struct AppState {
    shared: SharedState,
    room: String,
}

#[derive(Clone)]
struct ConfigStore {
    runtime_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime);

    let room = resolve_room(&runtime);
    let timezone: Tz = runtime.timezone.parse().unwrap_or_else(|err| {
        warn!("unknown timezone {:?} ({err}), reporting in UTC", runtime.timezone);
        chrono_tz::UTC
    });
    info!("thermostat for room {room:?} starting");

    let engine = ThermostatEngine::new(
        runtime.settings.clone(),
        runtime.circuits.clone(),
        Utc::now(),
    );
    let shared = SharedState::new(engine);

    let mut mqtt_options = MqttOptions::new(
        format!("hvac-controller-{room}"),
        runtime.network.mqtt_host.clone(),
        runtime.network.mqtt_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if !runtime.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            runtime.network.mqtt_user.clone(),
            runtime.network.mqtt_pass.clone(),
        );
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let bus = MqttBus::new(mqtt.clone());

    mqtt.subscribe(command_topic(&room), QoS::AtMostOnce).await?;
    let mqtt_loop = spawn_mqtt_loop(shared.clone(), mqtt.clone(), eventloop, room.clone());
    spawn_halt_on_ctrl_c(shared.clone());

    let controller = Controller::new(
        shared.clone(),
        SensorReader::new(
            build_sensor(),
            Duration::from_millis(runtime.controller.sensor_retry_backoff_ms),
        ),
        build_relay(&runtime),
        bus.clone(),
        &room,
        timezone,
    );
    let control = tokio::spawn(
        controller.run(Duration::from_millis(runtime.controller.tick_interval_ms)),
    );
    spawn_state_publish_loop(
        shared.clone(),
        bus,
        room.clone(),
        timezone,
        Duration::from_millis(runtime.controller.report_interval_ms),
    );

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/settings", get(handle_get_settings))
        .route("/api/command", post(handle_post_command))
        .with_state(AppState {
            shared: shared.clone(),
            room,
        });

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.controller.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;
    info!("controller listening on http://{addr}");

    let shutdown = shared.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.halted().await })
        .await?;

    control.await.context("control loop task failed")?;
    flush_and_disconnect(&mqtt, mqtt_loop).await;
    info!("thermostat stopped");
    Ok(())
}

fn apply_env_overrides(runtime: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        runtime.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Ok(room) = std::env::var("THERMOSTAT_ROOM") {
        runtime.room = Some(room);
    }
}

fn resolve_room(runtime: &RuntimeConfig) -> String {
    if let Some(room) = runtime.room.as_deref().filter(|room| !room.trim().is_empty()) {
        return room.trim().to_string();
    }
    let hostname = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());
    room_from_hostname(&hostname)
}

fn build_sensor() -> Box<dyn SensorDriver> {
    match std::env::var("THERMOSTAT_SENSOR_FILE") {
        Ok(path) => {
            info!("reading temperature from {path}");
            Box::new(FileDriver::new(path))
        }
        Err(_) => {
            warn!("no sensor configured, using simulated readings");
            Box::new(SimulatedDriver::default())
        }
    }
}

fn build_relay(runtime: &RuntimeConfig) -> Box<dyn RelayDriver> {
    match runtime.relay.gpio_root.as_deref() {
        Some(root) => {
            info!("driving relays through {root}");
            Box::new(SysfsGpioRelay::new(root, runtime.relay.clone()))
        }
        None => Box::new(LoggingRelay),
    }
}

fn spawn_mqtt_loop(
    shared: SharedState,
    mqtt: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    room: String,
) -> JoinHandle<()> {
    let topic = command_topic(&room);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(event) => {
                    if let MqttFlow::Stop = handle_mqtt_event(&shared, &mqtt, &topic, event).await
                    {
                        break;
                    }
                }
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    })
}

enum MqttFlow {
    Continue,
    Stop,
}

async fn handle_mqtt_event(
    shared: &SharedState,
    mqtt: &AsyncClient,
    topic: &str,
    event: Event,
) -> MqttFlow {
    match event {
        Event::Incoming(Incoming::Publish(message)) => {
            if message.topic != topic {
                return MqttFlow::Continue;
            }
            if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                warn!(
                    "dropping oversized command on {} ({} bytes)",
                    message.topic,
                    message.payload.len()
                );
                return MqttFlow::Continue;
            }
            let _ = apply_remote_command(shared, &message.payload).await;
        }
        Event::Incoming(Incoming::ConnAck(_)) => {
            info!("mqtt connected");
            if let Err(err) = mqtt.try_subscribe(topic, QoS::AtMostOnce) {
                warn!("resubscribe to {topic} failed: {err}");
            }
        }
        Event::Outgoing(Outgoing::Disconnect) => {
            info!("mqtt disconnected");
            return MqttFlow::Stop;
        }
        _ => {}
    }
    MqttFlow::Continue
}

/// Requests are sent in queue order, so once the disconnect goes out every
/// circuit command queued by the final halt has been written.
async fn flush_and_disconnect(mqtt: &AsyncClient, mqtt_loop: JoinHandle<()>) {
    if let Err(err) = mqtt.disconnect().await {
        warn!("mqtt disconnect failed: {err}");
        return;
    }
    match tokio::time::timeout(MQTT_FLUSH_TIMEOUT, mqtt_loop).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("mqtt loop task failed: {err}"),
        Err(_) => warn!("mqtt queue not flushed within {MQTT_FLUSH_TIMEOUT:?}"),
    }
}

fn spawn_state_publish_loop(
    shared: SharedState,
    bus: MqttBus,
    room: String,
    timezone: Tz,
    period: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shared.halted() => break,
            }
            if let Err(err) = publish_report(&shared, &bus, &room, &timezone).await {
                warn!("periodic report failed: {err}");
            }
        }
    });
}

fn spawn_halt_on_ctrl_c(shared: SharedState) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, halting");
                shared.request_halt();
            }
            Err(err) => warn!("ctrl-c handler unavailable: {err}"),
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let payload = state
        .shared
        .engine
        .lock()
        .await
        .status_payload(&state.room, Utc::now());
    Json(payload)
}

async fn handle_get_settings(State(state): State<AppState>) -> impl IntoResponse {
    let settings = state.shared.engine.lock().await.settings().clone();
    Json(settings)
}

async fn handle_post_command(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    if let Err(err) = apply_remote_command(&state.shared, value.as_bytes()).await {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    handle_get_status(State(state)).await.into_response()
}

impl ConfigStore {
    fn new() -> Self {
        let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermostat"));

        Self {
            runtime_path: data_dir.join("runtime.json"),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(&self.runtime_path).await {
            Ok(raw) => RuntimeConfig::from_json(&raw)
                .with_context(|| format!("invalid config in {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
