use std::{fmt, path::PathBuf, str::FromStr};

use clap::Parser;

use crate::{config::ChannelSpec, drivers::vision::protocol::SENSOR_COUNT};

/// vision_pwmd: drives hwmon PWM outputs from the VISION coolant temperature
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// PWM channels to drive, as `pwmN` or `pwmN=curve` (e.g. pwm1=pump)
    #[arg(value_name = "CHANNEL")]
    pub channels: Vec<ChannelSpec>,

    /// YAML config file path
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'd', long = "daemonize")]
    pub daemonize: bool,

    /// Write the daemon's PID to this file
    #[arg(short = 'p', long = "pid-file")]
    pub pid_file: Option<PathBuf>,
}

/// visioncli: prints what the VISION controller reports
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct DiagCli {
    /// Print the device identity, all temperatures and the raw report (to stderr)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Temperature to print: `all` or a sensor index
    #[arg(short = 't', long = "temp", default_value = "all")]
    pub temp: SensorSelection,

    /// Print identity and temperatures as JSON
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorSelection {
    #[default]
    All,
    Slot(usize),
}

impl FromStr for SensorSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        match s.parse::<usize>() {
            Ok(slot) if slot < SENSOR_COUNT => Ok(Self::Slot(slot)),
            _ => Err(format!(
                "expected 'all' or a sensor index 0..={}, got '{s}'",
                SENSOR_COUNT - 1
            )),
        }
    }
}

impl fmt::Display for SensorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Slot(slot) => write!(f, "{slot}"),
        }
    }
}
