pub mod config;
pub mod cooling;
pub mod error;
pub mod fan_runtime;
pub mod freeze;
pub mod ordinary;
pub mod policy;
pub mod settings;
pub mod sleep;
pub mod topics;
pub mod types;
pub mod warmup;
pub mod warnings;

pub use config::{ClimateConfig, ControllerConfig, NetworkConfig, RuntimeConfig};
pub use cooling::{CoolingPolicy, FanFallback};
pub use error::ClimateError;
pub use ordinary::OrdinaryPolicy;
pub use policy::{ControlInput, ControlPolicy};
pub use settings::{SettingField, SettingsSnapshot};
pub use sleep::SleepPolicy;
pub use types::{
    AcMode, ClimateAction, ControllerStatus, FreezeStatus, Location, Profile, Switch,
    WarningDirection,
};
pub use warmup::{AlarmResolver, AlarmStep};
