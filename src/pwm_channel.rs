//! A single hwmon PWM output.
//!
//! Opening a channel switches it to manual control by writing `1` to
//! `<name>_enable`. Duty values are rewritten at offset 0 and only when they
//! differ from the last value handed to the channel.

use std::{
    fmt,
    fs::OpenOptions,
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::info;

use crate::{config::ChannelPlan, error::PwmdError, fan_curve::FanCurve};

const MANUAL_MODE: &[u8] = b"1";

/// Anything a duty value can be written into.
pub trait PwmTarget: Write + Seek + Send {}

impl<T: Write + Seek + Send> PwmTarget for T {}

pub struct PwmChannel {
    name: String,
    path: PathBuf,
    curve: FanCurve,
    target: Box<dyn PwmTarget>,
    last_duty: Option<u8>,
}

impl PwmChannel {
    /// Opens `<hwmon_dir>/<name>` for writing and enables manual control.
    ///
    /// Neither file is ever created.
    pub fn open(hwmon_dir: &Path, plan: &ChannelPlan) -> Result<Self, PwmdError> {
        let path = hwmon_dir.join(&plan.name);
        if !path.exists() {
            return Err(PwmdError::Config(format!(
                "unknown pwm channel '{}' ({} does not exist)",
                plan.name,
                path.display()
            )));
        }

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(PwmdError::actuation(&path))?;

        enable_manual_control(&path)?;
        info!(
            "{}: manual control enabled, curve '{}'",
            plan.name, plan.curve_type
        );

        Ok(Self::new(&plan.name, path, plan.curve, Box::new(file)))
    }

    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        curve: FanCurve,
        target: Box<dyn PwmTarget>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            curve,
            target,
            last_duty: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn curve(&self) -> FanCurve {
        self.curve
    }

    pub fn last_duty(&self) -> Option<u8> {
        self.last_duty
    }

    /// Maps `temp` through the channel's curve and applies the result.
    pub fn set_temperature(&mut self, temp: f64) -> Result<bool, PwmdError> {
        self.set_duty(self.curve.duty(temp))
    }

    /// Writes `duty` unless it equals the last value; returns whether a write
    /// was attempted.
    ///
    /// The value is remembered even if the write fails, so a failing duty is
    /// not retried until it changes.
    pub fn set_duty(&mut self, duty: u8) -> Result<bool, PwmdError> {
        if self.last_duty == Some(duty) {
            return Ok(false);
        }
        self.last_duty = Some(duty);

        info!("{} <- {}", self.name, duty);
        self.write_duty(duty)
            .map_err(PwmdError::actuation(&self.path))?;
        Ok(true)
    }

    fn write_duty(&mut self, duty: u8) -> std::io::Result<()> {
        self.target.seek(SeekFrom::Start(0))?;
        self.target.write_all(duty.to_string().as_bytes())?;
        self.target.flush()
    }
}

impl fmt::Debug for PwmChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PwmChannel")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("curve", &self.curve)
            .field("last_duty", &self.last_duty)
            .finish_non_exhaustive()
    }
}

fn enable_path(pwm_path: &Path) -> PathBuf {
    let mut name = pwm_path.as_os_str().to_owned();
    name.push("_enable");
    PathBuf::from(name)
}

fn enable_manual_control(pwm_path: &Path) -> Result<(), PwmdError> {
    let path = enable_path(pwm_path);
    OpenOptions::new()
        .write(true)
        .open(&path)
        .and_then(|mut file| file.write_all(MANUAL_MODE))
        .map_err(PwmdError::actuation(path))
}
