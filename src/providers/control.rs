use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::error;

use crate::{
    control_loop::ControlLoop,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    sensors::ReportSource,
    task_manager::TaskManager,
};

/// Runs the control loop as the daemon's critical service.
///
/// The loop is handed over on the first `start`; a second start fails. When
/// the loop gives up, a [`Event::ControlFailure`] is published so the
/// coordinator can terminate the daemon.
pub struct ControlServiceProvider<S: ReportSource + 'static> {
    control: Mutex<Option<ControlLoop<S>>>,
    event_bus: EventBus,
}

impl<S: ReportSource + 'static> ControlServiceProvider<S> {
    pub fn new(control: ControlLoop<S>, event_bus: EventBus) -> Self {
        Self {
            control: Mutex::new(Some(control)),
            event_bus,
        }
    }
}

#[async_trait]
impl<S: ReportSource + 'static> ServiceProvider for ControlServiceProvider<S> {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let control = self
            .control
            .lock()
            .map_err(|_| anyhow!("control loop lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow!("{} already started", self.name()))?;
        let event_bus = self.event_bus.clone();

        task_manager.spawn_task(self.name(), move |token| async move {
            if let Err(e) = control.run(token).await {
                if let Err(publish_err) = event_bus.publish(Event::ControlFailure(e.to_string())) {
                    error!("Failed to report control failure: {publish_err}");
                }
                return Err(e.into());
            }
            Ok(())
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ControlService"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_critical(&self) -> bool {
        true
    }
}
