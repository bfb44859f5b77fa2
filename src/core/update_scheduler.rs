//! Update scheduler: attaches the right update strategy to each module
//!
//! - **Static / OnDemand**: no background work. OnDemand modules refresh via
//!   [`UpdateScheduler::trigger_manual_update`] or a claimed inbound message.
//! - **Periodic**: one timer loop per module at its declared interval, plus a
//!   scheduler-wide sweep that refreshes every Periodic module on its own
//!   cadence.
//! - **EventDriven**: the module's listeners are set up and started with a
//!   callback that refreshes the widget after each event.
//!
//! Every background worker hangs off a child of the scheduler's root
//! cancellation token. The state lock is never held across an `.await` or a
//! call into the registry.

use futures::FutureExt;
use log::{debug, error, info, trace, warn};
use rg_bar_core::{
    callback, ModuleRegistry, RegistryError, UpdateMode, WidgetHandle, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_UPDATE_INTERVAL,
};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Module already scheduled: {0}")]
    AlreadyScheduled(String),

    #[error("Module not scheduled: {0}")]
    NotScheduled(String),

    #[error("Module {name} updates {mode}, not on demand")]
    WrongMode { name: String, mode: UpdateMode },

    #[error("Scheduler has been shut down")]
    ShutDown,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Scheduler bookkeeping for one module
struct ModuleUpdateInfo {
    mode: UpdateMode,
    token: CancellationToken,
    timer: Option<JoinHandle<()>>,
    active: bool,
}

#[derive(Default)]
struct SchedulerState {
    updates: HashMap<String, ModuleUpdateInfo>,
    widgets: HashMap<String, WidgetHandle>,
}

/// Drives module updates according to their update mode
pub struct UpdateScheduler {
    registry: Arc<ModuleRegistry>,
    runtime: Handle,
    root: CancellationToken,
    state: RwLock<SchedulerState>,
    sweep_interval: Option<Duration>,
}

impl UpdateScheduler {
    /// Create a scheduler whose workers run on `runtime`
    pub fn new(registry: Arc<ModuleRegistry>, runtime: Handle) -> Self {
        Self {
            registry,
            runtime,
            root: CancellationToken::new(),
            state: RwLock::new(SchedulerState::default()),
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }

    /// Cadence of the sweep over Periodic modules; `None` disables it
    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval.filter(|d| !d.is_zero());
        self
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    fn read(&self) -> RwLockReadGuard<'_, SchedulerState> {
        self.state.read().unwrap_or_else(|e| {
            warn!("Scheduler state lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, SchedulerState> {
        self.state.write().unwrap_or_else(|e| {
            warn!("Scheduler state lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Start the scheduler-wide sweep over Periodic modules
    ///
    /// Does nothing when the sweep is disabled.
    pub fn start(self: &Arc<Self>) {
        let Some(period) = self.sweep_interval else {
            debug!("Periodic sweep disabled");
            return;
        };
        let scheduler: Weak<Self> = Arc::downgrade(self);
        let token = self.root.child_token();

        self.runtime.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                let Some(strong) = scheduler.upgrade() else {
                    break;
                };
                let updated = strong.update_modules_by_mode(UpdateMode::Periodic).await;
                trace!("Periodic sweep refreshed {} module(s)", updated);
            }
            debug!("Periodic sweep stopped");
        });
    }

    /// Attach the update strategy matching the module's mode
    pub fn schedule_module(&self, name: &str, widget: WidgetHandle) -> Result<(), SchedulerError> {
        if self.root.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        if self.is_scheduled(name) {
            return Err(SchedulerError::AlreadyScheduled(name.to_string()));
        }
        let mode = self.registry.module_mode(name)?;
        let interval = self.registry.module_interval(name)?;
        let token = self.root.child_token();

        // Reserve the name before any worker exists
        {
            let mut state = self.write();
            if state.updates.contains_key(name) {
                return Err(SchedulerError::AlreadyScheduled(name.to_string()));
            }
            state.updates.insert(
                name.to_string(),
                ModuleUpdateInfo {
                    mode,
                    token: token.clone(),
                    timer: None,
                    active: false,
                },
            );
            state.widgets.insert(name.to_string(), widget.clone());
        }

        let timer = match mode {
            UpdateMode::Static | UpdateMode::OnDemand => None,
            UpdateMode::Periodic => Some(self.spawn_periodic(name, widget, interval, token.clone())),
            UpdateMode::EventDriven => {
                self.start_event_driven(name, widget, token.clone());
                None
            }
        };

        let mut state = self.write();
        match state.updates.get_mut(name) {
            Some(info) if !token.is_cancelled() => {
                info.timer = timer;
                info.active = true;
            }
            _ => {
                // Unscheduled while starting up
                token.cancel();
                return Err(SchedulerError::NotScheduled(name.to_string()));
            }
        }
        info!("Scheduled module {} ({}, {:?})", name, mode, interval);
        Ok(())
    }

    fn spawn_periodic(
        &self,
        name: &str,
        widget: WidgetHandle,
        period: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        let name = name.to_string();
        let period = if period.is_zero() {
            DEFAULT_UPDATE_INTERVAL
        } else {
            period
        };
        let first_tick = Instant::now() + period;

        self.runtime.spawn(async move {
            let mut ticks = interval_at(first_tick, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {}
                }

                let update = AssertUnwindSafe(registry.update_module_widget(&name, &widget))
                    .catch_unwind()
                    .await;
                match update {
                    Ok(Ok(())) => trace!("Updated module {}", name),
                    Ok(Err(e)) if e.is_panic() => {
                        error!("Module {} panicked during update, stopping its timer: {}", name, e);
                        token.cancel();
                        break;
                    }
                    Ok(Err(RegistryError::ModuleNotFound(_))) => {
                        debug!("Module {} is gone, stopping its timer", name);
                        break;
                    }
                    Ok(Err(e)) => warn!("Update of module {} failed: {}", name, e),
                    Err(_) => {
                        error!("Timer loop for module {} panicked, stopping it", name);
                        token.cancel();
                        break;
                    }
                }
            }
            debug!("Timer loop for module {} exited", name);
        })
    }

    fn start_event_driven(&self, name: &str, widget: WidgetHandle, token: CancellationToken) {
        match self.registry.setup_module_listeners(name) {
            Ok(0) => {
                warn!("Event-driven module {} declared no listeners", name);
                return;
            }
            Ok(count) => debug!("Module {} set up {} listener(s)", name, count),
            Err(e) => {
                error!("Listener setup failed for module {}: {}", name, e);
                return;
            }
        }

        let registry = Arc::clone(&self.registry);
        let module = name.to_string();
        let on_event = callback(move || {
            let registry = Arc::clone(&registry);
            let module = module.clone();
            let widget = widget.clone();
            let token = token.clone();
            async move {
                if token.is_cancelled() {
                    return;
                }
                if let Err(e) = registry.update_module_widget(&module, &widget).await {
                    warn!("Event update of module {} failed: {}", module, e);
                }
            }
        });

        // Listener workers are spawned on the scheduler's runtime
        let _guard = self.runtime.enter();
        if let Err(e) = self.registry.start_module_listeners(name, on_event) {
            error!("Starting listeners for module {} failed: {}", name, e);
        }
    }

    /// Stop the module's update strategy and forget it
    pub fn unschedule_module(&self, name: &str) -> Result<(), SchedulerError> {
        let info = {
            let mut state = self.write();
            state.widgets.remove(name);
            state
                .updates
                .remove(name)
                .ok_or_else(|| SchedulerError::NotScheduled(name.to_string()))?
        };
        self.stop_info(name, info);
        info!("Unscheduled module {}", name);
        Ok(())
    }

    fn stop_info(&self, name: &str, info: ModuleUpdateInfo) {
        info.token.cancel();
        drop(info.timer);
        if info.mode == UpdateMode::EventDriven {
            match self.registry.stop_module_listeners(name) {
                Ok(()) | Err(RegistryError::ModuleNotFound(_)) => {}
                Err(e) => warn!("Stopping listeners of module {} failed: {}", name, e),
            }
        }
    }

    /// Refresh every active module of the given mode; returns how many
    /// updates succeeded
    pub async fn update_modules_by_mode(&self, mode: UpdateMode) -> usize {
        let targets: Vec<(String, WidgetHandle, CancellationToken)> = {
            let state = self.read();
            state
                .updates
                .iter()
                .filter(|(_, info)| info.mode == mode && info.active && !info.token.is_cancelled())
                .filter_map(|(name, info)| {
                    state
                        .widgets
                        .get(name)
                        .map(|widget| (name.clone(), widget.clone(), info.token.clone()))
                })
                .collect()
        };

        let mut updated = 0;
        for (name, widget, token) in targets {
            if token.is_cancelled() {
                continue;
            }
            match self.registry.update_module_widget(&name, &widget).await {
                Ok(()) => updated += 1,
                Err(e) if e.is_panic() => {
                    error!("Module {} panicked during update, deactivating it: {}", name, e);
                    token.cancel();
                }
                Err(e) => warn!("Sweep update of module {} failed: {}", name, e),
            }
        }
        updated
    }

    /// Refresh an OnDemand module now
    pub async fn trigger_manual_update(&self, name: &str) -> Result<(), SchedulerError> {
        let widget = {
            let state = self.read();
            let info = state
                .updates
                .get(name)
                .ok_or_else(|| SchedulerError::NotScheduled(name.to_string()))?;
            if info.mode != UpdateMode::OnDemand {
                return Err(SchedulerError::WrongMode {
                    name: name.to_string(),
                    mode: info.mode,
                });
            }
            state
                .widgets
                .get(name)
                .cloned()
                .ok_or_else(|| SchedulerError::NotScheduled(name.to_string()))?
        };
        self.registry.update_module_widget(name, &widget).await?;
        Ok(())
    }

    /// Route an inbound message to the first scheduled module claiming it
    ///
    /// An OnDemand module that claims the message is refreshed right away.
    pub async fn handle_ipc_message(&self, message: &str) -> bool {
        for name in self.registry.ipc_module_names() {
            let Some(mode) = self.scheduled_mode(&name) else {
                continue;
            };
            if !self.registry.handle_module_ipc(&name, message) {
                continue;
            }
            debug!("Message handled by module {}", name);
            if mode == UpdateMode::OnDemand {
                if let Err(e) = self.trigger_manual_update(&name).await {
                    warn!("Refresh of module {} after message failed: {}", name, e);
                }
            }
            return true;
        }
        debug!("No module handled message: {}", message);
        false
    }

    /// Forward a click to the module owning the widget
    ///
    /// Called on the UI thread. A consumed click schedules a refresh.
    pub fn handle_click(&self, name: &str) -> bool {
        let target = {
            let state = self.read();
            state
                .updates
                .get(name)
                .filter(|info| !info.token.is_cancelled())
                .and_then(|info| {
                    state
                        .widgets
                        .get(name)
                        .map(|widget| (widget.clone(), info.token.clone()))
                })
        };
        let Some((widget, token)) = target else {
            return false;
        };
        if !self.registry.handle_module_click(name, &widget) {
            return false;
        }
        let registry = Arc::clone(&self.registry);
        let name = name.to_string();
        self.runtime.spawn(async move {
            if token.is_cancelled() {
                debug!("Module {} unscheduled before its click refresh", name);
                return;
            }
            if let Err(e) = registry.update_module_widget(&name, &widget).await {
                warn!("Refresh of module {} after click failed: {}", name, e);
            }
        });
        true
    }

    /// Unschedule every module, then clean up the registry
    pub fn cleanup_all(&self) {
        let drained: Vec<(String, ModuleUpdateInfo)> = {
            let mut state = self.write();
            state.widgets.clear();
            state.updates.drain().collect()
        };
        for (name, info) in drained {
            self.stop_info(&name, info);
        }
        self.registry.cleanup_all();
    }

    /// Cancel every worker and release every module
    ///
    /// The scheduler accepts no new modules afterwards.
    pub fn shutdown(&self) {
        info!("Shutting down update scheduler");
        self.root.cancel();
        self.cleanup_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.read().updates.contains_key(name)
    }

    /// Whether the module's strategy finished starting and is still live
    ///
    /// A Periodic module whose update panicked stays scheduled but inactive.
    pub fn is_active(&self, name: &str) -> bool {
        self.read()
            .updates
            .get(name)
            .map(|info| info.active && !info.token.is_cancelled())
            .unwrap_or(false)
    }

    pub fn scheduled_mode(&self, name: &str) -> Option<UpdateMode> {
        self.read().updates.get(name).map(|info| info.mode)
    }

    pub fn widget(&self, name: &str) -> Option<WidgetHandle> {
        self.read().widgets.get(name).cloned()
    }

    pub fn scheduled_count(&self) -> usize {
        self.read().updates.len()
    }

    pub fn widget_count(&self) -> usize {
        self.read().widgets.len()
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
