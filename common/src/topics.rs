//! MQTT topic layout shared with the automation platform.
//!
//! Entity state arrives on the statestream layout
//! `<state_base>/<domain>/<object_id>/state`; service calls go out on
//! `<command_base>/<domain>/<service>`.

use serde::Serialize;

pub const STATE_SUFFIX: &str = "state";

pub const SERVICE_SELECT_OPTION: (&str, &str) = ("select", "select_option");
pub const SERVICE_SWITCH_ON: (&str, &str) = ("switch", "turn_on");
pub const SERVICE_SWITCH_OFF: (&str, &str) = ("switch", "turn_off");
pub const SERVICE_INPUT_BOOLEAN_OFF: (&str, &str) = ("input_boolean", "turn_off");

/// Wildcard that covers every entity state under `state_base`.
pub fn state_subscription(state_base: &str) -> String {
    format!("{state_base}/+/+/{STATE_SUFFIX}")
}

pub fn entity_state_topic(state_base: &str, entity: &str) -> Option<String> {
    let (domain, object_id) = entity.split_once('.')?;
    Some(format!("{state_base}/{domain}/{object_id}/{STATE_SUFFIX}"))
}

/// Maps a state topic back to its `domain.object_id` entity id.
pub fn parse_entity_topic(state_base: &str, topic: &str) -> Option<String> {
    let rest = topic.strip_prefix(state_base)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let domain = parts.next().filter(|part| !part.is_empty())?;
    let object_id = parts.next().filter(|part| !part.is_empty())?;

    match (parts.next(), parts.next()) {
        (Some(STATE_SUFFIX), None) => Some(format!("{domain}.{object_id}")),
        _ => None,
    }
}

pub fn command_topic(command_base: &str, (domain, service): (&str, &str)) -> String {
    format!("{command_base}/{domain}/{service}")
}

pub fn notify_topic(command_base: &str, target: &str) -> String {
    format!("{command_base}/notify/{target}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCall<'a> {
    pub entity_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload<'a> {
    pub title: &'a str,
    pub message: &'a str,
}
