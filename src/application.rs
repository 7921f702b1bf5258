//! Daemon lifecycle: initialize, start, wait, shut down.

use anyhow::{Result, anyhow};

use crate::{config::Config, coordinator::SystemCoordinator};

/// The running daemon.
///
/// # Example
///
/// ```no_run
/// use vision_pwmd::{application::Application, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load(None)?;
/// let mut app = Application::builder().with_config(config).build()?;
/// app.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    coordinator: SystemCoordinator,
    config: Config,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    /// Runs until a stop signal arrives or the control loop gives up.
    pub async fn run(&mut self) -> Result<()> {
        self.coordinator.initialize(&self.config)?;
        self.coordinator.start_all_services().await?;
        self.coordinator.run_main_loop().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[derive(Default)]
pub struct ApplicationBuilder {
    config: Option<Config>,
}

impl ApplicationBuilder {
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Application> {
        let config = self
            .config
            .ok_or_else(|| anyhow!("Configuration is required"))?;

        Ok(Application {
            coordinator: SystemCoordinator::new(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn build_requires_config() {
        let err = Application::builder().build().err().unwrap();
        assert!(err.to_string().contains("Configuration is required"));
    }

    #[tokio::test]
    async fn run_reports_bad_configuration_without_touching_hardware() {
        let config = Config {
            device_dir: PathBuf::from("/nonexistent/usb"),
            ..Config::default()
        };
        let mut app = Application::builder().with_config(config).build().unwrap();

        let err = app.run().await.unwrap_err();
        assert!(format!("{err:#}").contains("no PWM channels"));
        assert_eq!(app.config().device_dir, PathBuf::from("/nonexistent/usb"));
    }
}
