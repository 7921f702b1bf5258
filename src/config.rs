//! Configuration management for the vision_pwmd daemon.
//!
//! Settings come from an optional YAML file; channels given on the command
//! line replace the file's channel list. Everything is validated before the
//! first device is touched.

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use log::{LevelFilter, info};
use serde::{Deserialize, Serialize};

use crate::{
    error::PwmdError,
    fan_curve::{CurveRegistry, FanCurve, Quadratic},
};

/// Main configuration structure.
///
/// # Example
///
/// ```yaml
/// version: 1
/// hwmon_dir: /sys/class/hwmon/hwmon0
/// default_curve: fan
/// channels:
///   - pwm1=pump
///   - pwm2
/// curves:
///   - kind: fan
///     id: quiet
///     coefficients: [0.5, -0.45, 0.06]
/// jump_threshold: 0.5
/// max_consecutive_failures: 3
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Directory holding the `pwmN` / `pwmN_enable` files.
    #[serde(default = "defaults::hwmon_dir")]
    pub hwmon_dir: PathBuf,

    /// Directory scanned for hiddev nodes.
    #[serde(default = "defaults::device_dir")]
    pub device_dir: PathBuf,

    /// Curve type for channels given without `=type`.
    #[serde(default = "defaults::default_curve")]
    pub default_curve: String,

    #[serde(default)]
    pub channels: Vec<ChannelSpec>,

    /// Additional or overriding curve definitions.
    #[serde(default)]
    pub curves: Vec<CurveCfg>,

    /// Temperature change per poll (degrees) that triggers a jump warning.
    #[serde(default = "defaults::jump_threshold")]
    pub jump_threshold: f64,

    /// Failed polls in a row before the daemon gives up.
    #[serde(default = "defaults::max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

/// Curve definitions. Breakpoints are fixed per kind; only the quadratic varies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CurveCfg {
    Fan {
        id: String,
        #[serde(default)]
        coefficients: Quadratic,
    },
    Pump {
        id: String,
        #[serde(default)]
        coefficients: Quadratic,
    },
}

impl CurveCfg {
    pub fn get_id(&self) -> String {
        match self {
            CurveCfg::Fan { id, .. } | CurveCfg::Pump { id, .. } => id.clone(),
        }
    }
}

/// `name` or `name=type` as given on the command line or in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelSpec {
    pub name: String,
    pub curve: Option<String>,
}

impl FromStr for ChannelSpec {
    type Err = PwmdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, curve) = match s.split_once('=') {
            Some((name, curve)) => (name.trim(), Some(curve.trim())),
            None => (s.trim(), None),
        };

        if name.is_empty() {
            return Err(PwmdError::Config(format!("empty channel name in '{s}'")));
        }
        if name.contains('/') || name == "." || name == ".." {
            return Err(PwmdError::Config(format!("invalid channel name '{name}'")));
        }
        if curve.is_some_and(str::is_empty) {
            return Err(PwmdError::Config(format!("empty curve type in '{s}'")));
        }

        Ok(Self {
            name: name.to_string(),
            curve: curve.map(str::to_string),
        })
    }
}

impl TryFrom<String> for ChannelSpec {
    type Error = PwmdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelSpec> for String {
    fn from(spec: ChannelSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.curve {
            Some(curve) => write!(f, "{}={}", self.name, curve),
            None => f.write_str(&self.name),
        }
    }
}

/// A channel whose curve type has been resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPlan {
    pub name: String,
    pub curve_type: String,
    pub curve: FanCurve,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            hwmon_dir: defaults::hwmon_dir(),
            device_dir: defaults::device_dir(),
            default_curve: defaults::default_curve(),
            channels: Vec::new(),
            curves: Vec::new(),
            jump_threshold: defaults::jump_threshold(),
            max_consecutive_failures: defaults::max_consecutive_failures(),
            log_level: defaults::log_level(),
            pid_file: None,
        }
    }
}

impl Config {
    /// Loads the configuration file, or falls back to built-in defaults.
    ///
    /// Searches in order:
    /// 1. `path`
    /// 2. `VISION_PWMD_CONFIG` environment variable
    /// 3. `$XDG_CONFIG_HOME/vision_pwmd/config.yml` or `~/.config/vision_pwmd/config.yml`
    /// 4. `/etc/vision_pwmd/config.yml`
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        match path.or_else(locate_config) {
            Some(path) => Self::load_from_path(&path),
            None => {
                info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        info!("Loading config from: {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        Ok(config)
    }

    /// Replaces the channel list when the command line names any channels.
    pub fn with_channels(mut self, channels: Vec<ChannelSpec>) -> Self {
        if !channels.is_empty() {
            self.channels = channels;
        }
        self
    }

    pub fn registry(&self) -> CurveRegistry {
        CurveRegistry::from_cfg(&self.curves)
    }

    /// Resolves every channel's curve type.
    ///
    /// Fails on an empty channel list or an unknown curve type.
    pub fn channel_plan(&self) -> Result<Vec<ChannelPlan>, PwmdError> {
        if self.channels.is_empty() {
            return Err(PwmdError::Config("no PWM channels given".into()));
        }

        let registry = self.registry();
        self.channels
            .iter()
            .map(|spec| {
                let curve_type = spec.curve.as_deref().unwrap_or(&self.default_curve);
                Ok(ChannelPlan {
                    name: spec.name.clone(),
                    curve_type: curve_type.to_string(),
                    curve: registry.resolve(curve_type)?,
                })
            })
            .collect()
    }

    pub fn log_level(&self) -> Result<LevelFilter, PwmdError> {
        self.log_level
            .parse()
            .map_err(|_| PwmdError::Config(format!("invalid log level '{}'", self.log_level)))
    }

    /// Checks everything that can be checked without touching hardware.
    pub fn validate(&self) -> Result<Vec<ChannelPlan>, PwmdError> {
        if self.version != 1 {
            return Err(PwmdError::Config(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        if !self.jump_threshold.is_finite() || self.jump_threshold < 0.0 {
            return Err(PwmdError::Config(format!(
                "jump_threshold must be a non-negative number, got {}",
                self.jump_threshold
            )));
        }
        if self.max_consecutive_failures == 0 {
            return Err(PwmdError::Config(
                "max_consecutive_failures must be at least 1".into(),
            ));
        }
        self.log_level()?;
        self.channel_plan()
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn hwmon_dir() -> PathBuf {
        PathBuf::from("/sys/class/hwmon/hwmon0")
    }

    pub fn device_dir() -> PathBuf {
        PathBuf::from(crate::drivers::vision::DEVICE_DIR)
    }

    pub fn default_curve() -> String {
        String::from("fan")
    }

    pub fn jump_threshold() -> f64 {
        0.5
    }

    pub fn max_consecutive_failures() -> u32 {
        3
    }

    pub fn log_level() -> String {
        String::from("info")
    }
}

fn locate_config() -> Option<PathBuf> {
    if let Ok(env_path) = env::var("VISION_PWMD_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("vision_pwmd/config.yml");
        if cfg_dir.exists() {
            return Some(cfg_dir);
        }
    }

    let etc = Path::new("/etc/vision_pwmd/config.yml");
    etc.exists().then(|| etc.to_path_buf())
}
