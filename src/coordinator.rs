//! Startup sequence, service lifecycle and signal handling.

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::broadcast::{self, error::RecvError},
};

use crate::{
    config::Config,
    control_loop::ControlLoop,
    controller::Channels,
    drivers::vision::{Vision, hiddev::HidDev},
    event::{Event, EventBus},
    providers::{ControlServiceProvider, ServiceProvider},
    task_manager::TaskManager,
};

/// Owns the services of a running daemon.
///
/// Startup order: validate configuration, discover the device, open the PWM
/// channels, then hand the control loop to its service. Nothing touches
/// hardware until the configuration is known to be usable.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    events: broadcast::Receiver<Event>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        let event_bus = EventBus::new();
        let events = event_bus.subscribe();

        Self {
            task_manager: TaskManager::new(),
            event_bus,
            events,
            service_providers: Vec::new(),
        }
    }

    /// Builds the control service from `config`.
    pub fn initialize(&mut self, config: &Config) -> Result<()> {
        let plans = config.validate().context("Invalid configuration")?;

        let device = Vision::<HidDev>::find_in(&config.device_dir)?
            .ok_or_else(|| anyhow!("Could not find VISION device"))?;
        info!("Found device: {}", device.identity());

        let channels = Channels::open_all(&config.hwmon_dir, &plans)
            .context("Failed to open PWM channels")?;

        let control = ControlLoop::new(
            device,
            channels,
            config.jump_threshold,
            config.max_consecutive_failures,
        );
        self.register(Box::new(ControlServiceProvider::new(
            control,
            self.event_bus.clone(),
        )));
        Ok(())
    }

    /// Adds a service, keeping providers sorted by priority.
    pub fn register(&mut self, provider: Box<dyn ServiceProvider>) {
        self.service_providers.push(provider);
        self.service_providers
            .sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Starts services in priority order. A critical failure aborts startup.
    pub async fn start_all_services(&mut self) -> Result<()> {
        for provider in &self.service_providers {
            match provider.start(&mut self.task_manager).await {
                Ok(()) => info!(
                    "Service '{}' started (priority: {}, critical: {})",
                    provider.name(),
                    provider.priority(),
                    provider.is_critical()
                ),
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => warn!("Service '{}' failed to start: {e:#}", provider.name()),
            }
        }
        Ok(())
    }

    /// Waits for SIGINT, SIGTERM or a service event, then shuts down.
    ///
    /// Returns an error when a critical service failed.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        let outcome = loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for SIGINT")?;
                    info!("Received SIGINT, stopping");
                    break Ok(());
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, stopping");
                    break Ok(());
                }
                event = self.events.recv() => match event {
                    Ok(Event::ControlFailure(reason)) => {
                        break Err(anyhow!("Control loop failed: {reason}"));
                    }
                    Ok(Event::SystemShutdown) => break Ok(()),
                    Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
                    Err(RecvError::Closed) => break Err(anyhow!("Event bus closed unexpectedly")),
                },
            }
        };

        self.shutdown().await;
        outcome
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.task_manager.shutdown_all().await {
            warn!("{e:#}");
        }
        info!("Shutdown complete");
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
