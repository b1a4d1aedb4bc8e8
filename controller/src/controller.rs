use std::{sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, Timelike};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use climate_common::{
    settings::{schema, SettingEntry},
    AlarmResolver, AlarmStep, ClimateAction, ClimateConfig, ControlInput, ControlPolicy,
    ControllerConfig, ControllerStatus, CoolingPolicy, FanFallback, Location, OrdinaryPolicy,
    Profile, SettingField, SettingsSnapshot, SleepPolicy, Switch,
};

use crate::{
    platform::Platform,
    supervisor::{RestartPolicy, SessionRunner, SessionToken, Supervisor},
};

pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

const HANDOVER_SETTLE: Duration = Duration::from_secs(1);

struct ControllerCore {
    policy: Box<dyn ControlPolicy>,
    cooling: CoolingPolicy,
}

struct Readings {
    outside_temp: f64,
    ac_power_draw_w: f64,
    room_temps: Vec<(Location, f64)>,
}

/// One configured climate profile bound to the platform.
pub struct ClimateController {
    name: String,
    profile: Profile,
    active_entity: String,
    rooms: Vec<Location>,
    schema: Vec<SettingEntry>,
    climate: Arc<ClimateConfig>,
    restart: RestartPolicy,
    platform: Platform,
    clock: Clock,
    settings: Mutex<SettingsSnapshot>,
    core: Mutex<ControllerCore>,
    supervisor: Supervisor,
}

impl ClimateController {
    pub fn new(
        config: &ControllerConfig,
        climate: Arc<ClimateConfig>,
        settings: SettingsSnapshot,
        platform: Platform,
        clock: Clock,
    ) -> Self {
        let policy: Box<dyn ControlPolicy> = match config.profile {
            Profile::Ordinary => Box::new(OrdinaryPolicy::new()),
            Profile::Sleep => Box::new(SleepPolicy::new(config.exclusive_with.clone())),
        };

        Self {
            name: config.name.clone(),
            profile: config.profile,
            active_entity: config.active_entity.clone(),
            rooms: policy.rooms().to_vec(),
            schema: schema(config.profile),
            restart: RestartPolicy::from_config(&climate),
            climate,
            platform,
            clock,
            settings: Mutex::new(settings),
            core: Mutex::new(ControllerCore {
                policy,
                cooling: CoolingPolicy::new(),
            }),
            supervisor: Supervisor::new(),
        }
    }

    pub fn active_entity(&self) -> &str {
        &self.active_entity
    }

    pub fn setting_for(&self, entity: &str) -> Option<SettingField> {
        self.schema
            .iter()
            .find(|entry| entry.entity == entity)
            .map(|entry| entry.field)
    }

    pub async fn on_setting_change(&self, field: SettingField, raw: &str) {
        let mut settings = self.settings.lock().await;
        match settings.apply(field, raw) {
            Ok(()) => debug!(controller = %self.name, ?field, value = raw, "setting updated"),
            Err(err) => warn!(controller = %self.name, "ignoring setting update: {err}"),
        }
    }

    pub async fn on_active_change(self: &Arc<Self>, switch: Switch) -> anyhow::Result<()> {
        match switch {
            Switch::On => {
                info!(controller = %self.name, "activated");
                self.supervisor.start(Arc::clone(self), self.restart);
            }
            Switch::Off => {
                info!(controller = %self.name, "deactivated");
                self.supervisor.deactivate();
                let mut actions = Vec::new();
                self.core.lock().await.cooling.deactivate(&mut actions);
                for action in &actions {
                    self.platform.execute(action).await?;
                }
            }
        }
        Ok(())
    }

    /// Re-derives the external fan outside the tick cadence.
    pub async fn on_power_draw_change(&self) -> anyhow::Result<()> {
        if !self.supervisor.is_active() {
            return Ok(());
        }

        let settings = self.settings.lock().await.clone();
        let readings = Readings {
            outside_temp: self.platform.read_temp(Location::OutsideForestSide).await?,
            ac_power_draw_w: self.platform.read_power_draw().await?,
            room_temps: Vec::new(),
        };

        let mut actions = Vec::new();
        {
            let core = self.core.lock().await;
            let input = self.input(&settings, &readings);
            if let Some(decision) = core.cooling.handle_external_fan(&input, &mut actions) {
                debug!(
                    controller = %self.name,
                    draw_w = readings.ac_power_draw_w,
                    fan = decision.as_str(),
                    "external fan re-evaluated"
                );
            }
        }

        for action in &actions {
            self.platform.execute(action).await?;
        }
        Ok(())
    }

    pub async fn status(&self) -> ControllerStatus {
        let core = self.core.lock().await;
        ControllerStatus {
            name: self.name.clone(),
            profile: self.profile.as_str(),
            active: self.supervisor.is_active(),
            generation: self.supervisor.generation(),
            cooling: core.cooling.is_cooling(),
            fans_active: core.cooling.fans_active(),
            fan_minutes_this_hour: core.cooling.fan_runtime().minutes_this_hour(),
            freeze: core.cooling.freeze().status(),
            alarm_at: core.policy.alarm().map(|alarm| alarm.to_rfc3339()),
        }
    }

    fn input<'a>(
        &'a self,
        settings: &'a SettingsSnapshot,
        readings: &'a Readings,
    ) -> ControlInput<'a> {
        ControlInput {
            now: (self.clock)(),
            active: self.supervisor.is_active(),
            settings,
            config: &self.climate,
            outside_temp: readings.outside_temp,
            ac_power_draw_w: readings.ac_power_draw_w,
            room_temps: &readings.room_temps,
        }
    }

    async fn read(&self) -> anyhow::Result<Readings> {
        let mut room_temps = Vec::with_capacity(self.rooms.len());
        for room in &self.rooms {
            room_temps.push((*room, self.platform.read_temp(*room).await?));
        }

        Ok(Readings {
            outside_temp: self.platform.read_temp(Location::OutsideForestSide).await?,
            ac_power_draw_w: self.platform.read_power_draw().await?,
            room_temps,
        })
    }

    /// Stops at the first action issued after the session went stale.
    async fn execute(
        &self,
        token: &SessionToken,
        actions: Vec<ClimateAction>,
    ) -> anyhow::Result<()> {
        for action in actions {
            if !token.is_current() {
                debug!(
                    controller = %self.name,
                    generation = token.generation(),
                    "session superseded, dropping remaining actions"
                );
                return Ok(());
            }
            self.platform.execute(&action).await?;
        }
        Ok(())
    }

    async fn resolve_alarm(
        &self,
        token: &SessionToken,
    ) -> anyhow::Result<Option<DateTime<FixedOffset>>> {
        let mut resolver = AlarmResolver::new(&self.climate);

        loop {
            if !token.is_current() {
                return Ok(None);
            }

            let raw = self.platform.state(&self.climate.next_alarm_entity).await;
            match resolver.observe(raw.as_deref(), (self.clock)()) {
                AlarmStep::Resolved(alarm_at) => {
                    info!(controller = %self.name, %alarm_at, "next alarm resolved");
                    return Ok(Some(alarm_at));
                }
                AlarmStep::Retry { delay, notice } => {
                    if let Some(notice) = notice {
                        self.notify_user(&notice).await?;
                    }
                    debug!(
                        controller = %self.name,
                        attempt = resolver.failures(),
                        "next alarm unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                AlarmStep::Fallback { alarm_at, notice } => {
                    if let Some(notice) = notice {
                        self.notify_user(&notice).await?;
                    }
                    warn!(controller = %self.name, %alarm_at, "using default alarm time");
                    return Ok(Some(alarm_at));
                }
            }
        }
    }

    fn log_fallback(&self, fallback: Option<FanFallback>) {
        if let Some(fallback) = fallback {
            debug!(controller = %self.name, reason = fallback.describe(), "AC running as fan");
        }
    }

    async fn notify_user(&self, message: &str) -> anyhow::Result<()> {
        self.platform
            .notify(&self.climate.notification_title, message)
            .await
    }
}

impl SessionRunner for ClimateController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start_session(&self, token: &SessionToken) -> anyhow::Result<()> {
        let uses_alarm = self.core.lock().await.policy.uses_alarm();
        let alarm = if uses_alarm {
            self.resolve_alarm(token).await?
        } else {
            None
        };

        let settings = self.settings.lock().await.clone();
        let readings = self.read().await?;

        let (actions, fallback) = {
            let mut guard = self.core.lock().await;
            let core = &mut *guard;
            if let Some(alarm_at) = alarm {
                core.policy.set_alarm(alarm_at);
            }
            let input = self.input(&settings, &readings);
            let actions = core.policy.on_session_start(&mut core.cooling, &input)?;
            (actions, core.cooling.last_fallback())
        };
        self.log_fallback(fallback);

        let hands_over = actions
            .iter()
            .any(|action| matches!(action, ClimateAction::DeactivateController(_)));
        self.execute(token, actions).await?;

        // The other controller's switch-off writes land before our first tick.
        if hands_over {
            tokio::time::sleep(HANDOVER_SETTLE).await;
        }
        Ok(())
    }

    async fn tick(&self, token: &SessionToken) -> anyhow::Result<()> {
        let settings = self.settings.lock().await.clone();
        let readings = self.read().await?;

        let (actions, fallback) = {
            let mut guard = self.core.lock().await;
            let core = &mut *guard;
            let input = self.input(&settings, &readings);

            if let Some(minutes) = core
                .cooling
                .update_fan_runtime(input.now.hour(), input.polling_interval_secs())
            {
                info!(controller = %self.name, minutes, "fan runtime for the past hour");
            }

            let actions = core.policy.loop_logic(&mut core.cooling, &input)?;
            (actions, core.cooling.last_fallback())
        };

        self.log_fallback(fallback);

        self.execute(token, actions).await
    }

    async fn polling_interval(&self) -> Duration {
        self.settings.lock().await.polling_interval()
    }

    async fn report_failure(&self, err: &anyhow::Error) {
        if let Err(notify_err) = self
            .notify_user(&format!("An error happened: {err}"))
            .await
        {
            warn!(controller = %self.name, "failed to send error notification: {notify_err:#}");
        }
    }
}
