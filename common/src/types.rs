use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcMode {
    Off,
    Cool,
    Fan,
}

impl AcMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Cool => "Cool",
            Self::Fan => "Fan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn from_state(state: &str) -> Option<Self> {
        match state.trim().to_ascii_lowercase().as_str() {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Temperature sensor placement. Indoor variants double as rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Bedroom,
    Office,
    LivingRoom,
    OutsideCitySide,
    OutsideForestSide,
}

impl Location {
    pub const ROOMS: [Location; 3] = [Self::Bedroom, Self::Office, Self::LivingRoom];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bedroom => "bedroom",
            Self::Office => "office",
            Self::LivingRoom => "living_room",
            Self::OutsideCitySide => "outside_city_side",
            Self::OutsideForestSide => "outside_forest_side",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningDirection {
    Warm,
    Cold,
}

impl WarningDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Warm => Self::Cold,
            Self::Cold => Self::Warm,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Warm => "WARM",
            Self::Cold => "COLD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Ordinary,
    Sleep,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Sleep => "sleep",
        }
    }
}

/// Side effect requested by the core. The host executes these in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClimateAction {
    SetAcMode(AcMode),
    SetExternalFan(Switch),
    SetBedroomHeater(Switch),
    Notify { title: String, message: String },
    DeactivateController(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FreezeStatus {
    pub state: &'static str,
    #[serde(rename = "lowDrawSecs")]
    pub low_draw_secs: f64,
    #[serde(rename = "defrostSecs")]
    pub defrost_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub name: String,
    pub profile: &'static str,
    pub active: bool,
    pub generation: u64,
    pub cooling: bool,
    #[serde(rename = "fansActive")]
    pub fans_active: bool,
    #[serde(rename = "fanMinutesThisHour")]
    pub fan_minutes_this_hour: f64,
    pub freeze: FreezeStatus,
    #[serde(rename = "alarmAt")]
    pub alarm_at: Option<String>,
}
