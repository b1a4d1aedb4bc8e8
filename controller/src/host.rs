use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use climate_common::{
    settings::schema,
    topics::{parse_entity_topic, state_subscription},
    RuntimeConfig, SettingsSnapshot, Switch,
};

use crate::{
    controller::{ClimateController, Clock},
    platform::{EntityCache, OutboundMessage, Platform},
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const STARTUP_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct AppState {
    controllers: Arc<Mutex<Vec<Arc<ClimateController>>>>,
    cache: EntityCache,
    state_base: Arc<String>,
    power_draw_entity: Arc<String>,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.climate.sanitize();

    let timezone: Tz = runtime
        .timezone
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid timezone '{}': {err}", runtime.timezone))?;

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("climate-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);

    let climate = Arc::new(runtime.climate.clone());
    let cache = EntityCache::new();
    let app_state = AppState {
        controllers: Arc::new(Mutex::new(Vec::new())),
        cache: cache.clone(),
        state_base: Arc::new(runtime.network.state_topic_base.clone()),
        power_draw_entity: Arc::new(climate.ac_power_draw_entity.clone()),
    };

    mqtt.subscribe(
        state_subscription(&runtime.network.state_topic_base),
        QoS::AtMostOnce,
    )
    .await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_publish_loop(mqtt, outbound_rx);

    wait_for_entities(&cache, &required_entities(&runtime), STARTUP_GRACE).await;

    let platform = Platform::new(
        cache.clone(),
        outbound_tx,
        &runtime.network,
        Arc::clone(&climate),
    );
    let clock: Clock = Arc::new(move || now_in_timezone(timezone));
    let entity_states = cache.snapshot().await;

    let mut controllers = Vec::with_capacity(runtime.controllers.len());
    for config in &runtime.controllers {
        let (settings, missing) =
            SettingsSnapshot::load(config.profile, |entity| entity_states.get(entity).cloned())
                .with_context(|| format!("failed to load settings for '{}'", config.name))?;
        for entity in missing {
            warn!(controller = %config.name, %entity, "setting has no state, using default");
        }

        controllers.push(Arc::new(ClimateController::new(
            config,
            Arc::clone(&climate),
            settings,
            platform.clone(),
            Arc::clone(&clock),
        )));
    }
    *app_state.controllers.lock().await = controllers.clone();

    for controller in &controllers {
        let state = cache.get(controller.active_entity()).await;
        if state.as_deref().and_then(Switch::from_state) == Some(Switch::On) {
            controller.on_active_change(Switch::On).await?;
        }
    }

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Every entity whose retained state must be known before settings load.
fn required_entities(runtime: &RuntimeConfig) -> Vec<String> {
    let mut entities: Vec<String> = runtime
        .controllers
        .iter()
        .flat_map(|config| {
            schema(config.profile)
                .into_iter()
                .map(|entry| entry.entity)
                .chain(std::iter::once(config.active_entity.clone()))
        })
        .collect();
    entities.sort();
    entities.dedup();
    entities
}

async fn wait_for_entities(cache: &EntityCache, entities: &[String], grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    loop {
        let states = cache.snapshot().await;
        let missing = entities
            .iter()
            .filter(|entity| !states.contains_key(*entity))
            .count();

        if missing == 0 {
            info!("received state for {} entities", entities.len());
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(missing, "starting before all entity states arrived");
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_publish_loop(mqtt: AsyncClient, mut outbound: mpsc::Receiver<OutboundMessage>) {
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            debug!(topic = %message.topic, "publishing service call");
            if let Err(err) = mqtt
                .publish(message.topic, QoS::AtLeastOnce, false, message.payload)
                .await
            {
                warn!("service call publish failed: {err}");
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let Some(entity) = parse_entity_topic(&app_state.state_base, &topic) else {
        return Ok(());
    };
    let value = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    let Some(previous) = app_state.cache.update(&entity, &value).await else {
        return Ok(());
    };
    debug!(%entity, ?previous, %value, "entity state changed");

    let controllers = app_state.controllers.lock().await.clone();
    for controller in controllers {
        if entity == controller.active_entity() {
            if let Some(switch) = Switch::from_state(&value) {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    if let Err(err) = controller.on_active_change(switch).await {
                        warn!("active flag handling failed: {err:#}");
                    }
                });
            }
        }

        if entity == *app_state.power_draw_entity {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                if let Err(err) = controller.on_power_draw_change().await {
                    warn!("external fan update failed: {err:#}");
                }
            });
        }

        if let Some(field) = controller.setting_for(&entity) {
            controller.on_setting_change(field, &value).await;
        }
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let controllers = state.controllers.lock().await.clone();
    let mut statuses = Vec::with_capacity(controllers.len());
    for controller in &controllers {
        statuses.push(controller.status().await);
    }
    Json(statuses)
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(err) => {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    }
}

fn now_in_timezone(timezone: Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(&timezone);
    local.with_timezone(&local.offset().fix())
}
