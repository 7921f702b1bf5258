//! Temperature to PWM duty curves.
//!
//! Every curve is piecewise: fixed breakpoints hand out constant duties, and a
//! quadratic (in percent) fills the gap between them. Only the quadratic
//! coefficients are configurable.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{config::CurveCfg, error::PwmdError};

/// Below this the fan is switched off.
pub const FAN_OFF_BELOW: f64 = 15.0;
/// Below this (and at or above [`FAN_OFF_BELOW`]) the fan runs silent.
pub const FAN_SILENT_BELOW: f64 = 30.0;
pub const FAN_SILENT_DUTY: u8 = 40;
/// Above this the fan runs at full blast.
pub const FAN_FULL_ABOVE: f64 = 42.0;
pub const FAN_FULL_DUTY: u8 = 255;

/// The pump never drops below [`PUMP_FLOOR_DUTY`] under this temperature.
pub const PUMP_FLOOR_BELOW: f64 = 35.0;
pub const PUMP_FLOOR_DUTY: u8 = 76;

const PERCENT_TO_DUTY: f64 = 2.55;

/// `c0 + c1·t + c2·t²`, yielding a percentage.
///
/// Serialized as `[c0, c1, c2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Quadratic {
    pub c0: f64,
    pub c1: f64,
    pub c2: f64,
}

impl Quadratic {
    /// Custom fit for the stock radiator fans.
    pub const FAN: Self = Self {
        c0: 1.859406,
        c1: -0.4977863,
        c2: 0.06597786,
    };

    pub fn eval(&self, temp: f64) -> f64 {
        self.c0 + self.c1 * temp + self.c2 * temp.powi(2)
    }
}

impl Default for Quadratic {
    fn default() -> Self {
        Self::FAN
    }
}

impl From<[f64; 3]> for Quadratic {
    fn from([c0, c1, c2]: [f64; 3]) -> Self {
        Self { c0, c1, c2 }
    }
}

impl From<Quadratic> for [f64; 3] {
    fn from(q: Quadratic) -> Self {
        [q.c0, q.c1, q.c2]
    }
}

/// Curve kinds known to the daemon.
///
/// # Example
///
/// ```
/// use vision_pwmd::fan_curve::{FanCurve, Quadratic};
///
/// let fan = FanCurve::Fan(Quadratic::FAN);
/// assert_eq!(fan.duty(10.0), 0);
/// assert_eq!(fan.duty(50.0), 255);
///
/// let pump = FanCurve::Pump(Quadratic::FAN);
/// assert_eq!(pump.duty(10.0), 76);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "c")]
pub enum FanCurve {
    Fan(Quadratic),
    /// Fan curve with an "always running" floor.
    Pump(Quadratic),
}

impl FanCurve {
    /// Duty value (0..=255) for `temp` degrees.
    pub fn duty(&self, temp: f64) -> u8 {
        match self {
            Self::Fan(q) => fan_duty(q, temp),
            Self::Pump(_) if temp < PUMP_FLOOR_BELOW => PUMP_FLOOR_DUTY,
            Self::Pump(q) => fan_duty(q, temp),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fan(_) => "fan",
            Self::Pump(_) => "pump",
        }
    }
}

impl From<&CurveCfg> for FanCurve {
    fn from(curve_cfg: &CurveCfg) -> Self {
        match curve_cfg {
            CurveCfg::Fan { coefficients, .. } => FanCurve::Fan(*coefficients),
            CurveCfg::Pump { coefficients, .. } => FanCurve::Pump(*coefficients),
        }
    }
}

fn fan_duty(q: &Quadratic, temp: f64) -> u8 {
    if temp < FAN_OFF_BELOW {
        return 0;
    }
    if temp < FAN_SILENT_BELOW {
        return FAN_SILENT_DUTY;
    }
    if temp > FAN_FULL_ABOVE {
        return FAN_FULL_DUTY;
    }

    let pct = q.eval(temp);
    let duty = percent_to_duty(pct);
    debug!("temp: {temp} -> pwm_pct: {pct} pwm: {duty}");
    duty
}

/// Clamps to 0..=100 %, scales, and truncates toward zero.
fn percent_to_duty(pct: f64) -> u8 {
    // NaN survives clamp and saturates to 0 in the cast.
    (pct.clamp(0.0, 100.0) * PERCENT_TO_DUTY) as u8
}

/// Curve type name → curve.
#[derive(Debug, Clone)]
pub struct CurveRegistry(HashMap<String, FanCurve>);

impl CurveRegistry {
    /// Registry holding only the built-in `fan` and `pump` curves.
    pub fn with_defaults() -> Self {
        Self(HashMap::from([
            (String::from("fan"), FanCurve::Fan(Quadratic::FAN)),
            (String::from("pump"), FanCurve::Pump(Quadratic::FAN)),
        ]))
    }

    /// Built-in curves, then `curves` in order (later entries win).
    pub fn from_cfg(curves: &[CurveCfg]) -> Self {
        let mut registry = Self::with_defaults();
        for cfg in curves {
            registry.0.insert(cfg.get_id(), FanCurve::from(cfg));
        }
        registry
    }

    pub fn resolve(&self, name: &str) -> Result<FanCurve, PwmdError> {
        self.0.get(name).copied().ok_or_else(|| {
            PwmdError::Config(format!(
                "unknown curve type '{name}' (known: {})",
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for CurveRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
