use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use climate_common::{
    topics::{
        command_topic, notify_topic, NotificationPayload, ServiceCall, SERVICE_INPUT_BOOLEAN_OFF,
        SERVICE_SELECT_OPTION, SERVICE_SWITCH_OFF, SERVICE_SWITCH_ON,
    },
    AcMode, ClimateAction, ClimateConfig, Location, NetworkConfig, Switch,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Latest known state of every platform entity, fed from the MQTT
/// statestream.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    states: Arc<Mutex<HashMap<String, String>>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` and returns the previous state when it differs.
    pub async fn update(&self, entity: &str, value: &str) -> Option<Option<String>> {
        let mut states = self.states.lock().await;
        let previous = states.insert(entity.to_string(), value.to_string());
        if previous.as_deref() == Some(value) {
            None
        } else {
            Some(previous)
        }
    }

    pub async fn get(&self, entity: &str) -> Option<String> {
        self.states.lock().await.get(entity).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.states.lock().await.clone()
    }
}

/// Reads entity states from the cache and turns actions into service-call
/// publishes. Writes are fire-and-forget.
#[derive(Debug, Clone)]
pub struct Platform {
    cache: EntityCache,
    outbound: mpsc::Sender<OutboundMessage>,
    command_base: String,
    climate: Arc<ClimateConfig>,
}

impl Platform {
    pub fn new(
        cache: EntityCache,
        outbound: mpsc::Sender<OutboundMessage>,
        network: &NetworkConfig,
        climate: Arc<ClimateConfig>,
    ) -> Self {
        Self {
            cache,
            outbound,
            command_base: network.command_topic_base.clone(),
            climate,
        }
    }

    pub async fn state(&self, entity: &str) -> Option<String> {
        self.cache.get(entity).await
    }

    pub async fn read_number(&self, entity: &str) -> anyhow::Result<f64> {
        let raw = self
            .state(entity)
            .await
            .with_context(|| format!("entity {entity} has no state"))?;
        let value = raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("entity {entity} reported non-numeric state '{raw}'"))?;
        anyhow::ensure!(value.is_finite(), "entity {entity} reported {value}");
        Ok(value)
    }

    pub async fn read_temp(&self, location: Location) -> anyhow::Result<f64> {
        self.read_number(&self.climate.temp_entity(location)).await
    }

    pub async fn read_power_draw(&self) -> anyhow::Result<f64> {
        self.read_number(&self.climate.ac_power_draw_entity).await
    }

    pub async fn execute(&self, action: &ClimateAction) -> anyhow::Result<()> {
        match action {
            ClimateAction::SetAcMode(mode) => self.select_ac_mode(*mode).await,
            ClimateAction::SetExternalFan(switch) => {
                self.switch(&self.climate.external_fan_entity, *switch)
                    .await
            }
            ClimateAction::SetBedroomHeater(switch) => {
                self.switch(&self.climate.bedroom_heater_entity, *switch)
                    .await
            }
            ClimateAction::Notify { title, message } => self.notify(title, message).await,
            ClimateAction::DeactivateController(entity) => {
                let call = ServiceCall {
                    entity_id: entity,
                    option: None,
                };
                self.call_service(SERVICE_INPUT_BOOLEAN_OFF, &call).await
            }
        }
    }

    pub async fn notify(&self, title: &str, message: &str) -> anyhow::Result<()> {
        let topic = notify_topic(&self.command_base, &self.climate.notify_target);
        self.publish(topic, &NotificationPayload { title, message })
            .await
    }

    async fn select_ac_mode(&self, mode: AcMode) -> anyhow::Result<()> {
        let call = ServiceCall {
            entity_id: &self.climate.ac_mode_entity,
            option: Some(mode.as_str()),
        };
        self.call_service(SERVICE_SELECT_OPTION, &call).await
    }

    async fn switch(&self, entity: &str, switch: Switch) -> anyhow::Result<()> {
        let service = match switch {
            Switch::On => SERVICE_SWITCH_ON,
            Switch::Off => SERVICE_SWITCH_OFF,
        };
        let call = ServiceCall {
            entity_id: entity,
            option: None,
        };
        self.call_service(service, &call).await
    }

    async fn call_service(
        &self,
        service: (&str, &str),
        call: &ServiceCall<'_>,
    ) -> anyhow::Result<()> {
        self.publish(command_topic(&self.command_base, service), call)
            .await
    }

    async fn publish<T: Serialize>(&self, topic: String, body: &T) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(body).context("failed to encode service call")?;
        self.outbound
            .send(OutboundMessage { topic, payload })
            .await
            .context("mqtt publisher has shut down")
    }
}
