use std::path::Path;

use log::error;

use crate::{config::ChannelPlan, error::PwmdError, pwm_channel::PwmChannel};

/// The ordered set of PWM outputs driven by the daemon.
#[derive(Debug, Default)]
pub struct Channels(Vec<PwmChannel>);

impl Channels {
    /// Opens every planned channel, in order. The first failure aborts.
    pub fn open_all(hwmon_dir: &Path, plans: &[ChannelPlan]) -> Result<Self, PwmdError> {
        plans
            .iter()
            .map(|plan| PwmChannel::open(hwmon_dir, plan))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn new(channels: Vec<PwmChannel>) -> Self {
        Self(channels)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PwmChannel> {
        self.0.iter()
    }

    /// Applies `temp` to every channel and returns the number of writes
    /// attempted.
    ///
    /// A failing channel is logged and does not stop the others.
    pub fn set_temperature(&mut self, temp: f64) -> usize {
        let mut writes = 0;
        for channel in &mut self.0 {
            match channel.set_temperature(temp) {
                Ok(true) => writes += 1,
                Ok(false) => {}
                Err(e) => {
                    writes += 1;
                    error!("{}: {e}", channel.name());
                }
            }
        }
        writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fan_curve::{FanCurve, Quadratic},
        pwm_channel::tests::recorded,
    };
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    const FAN: FanCurve = FanCurve::Fan(Quadratic::FAN);
    const PUMP: FanCurve = FanCurve::Pump(Quadratic::FAN);

    #[test]
    fn every_channel_follows_its_own_curve() {
        let (fan, fan_rec) = recorded("pwm1", FAN);
        let (pump, pump_rec) = recorded("pwm2", PUMP);
        let mut channels = Channels::new(vec![fan, pump]);

        assert_eq!(channels.set_temperature(20.0), 2);
        assert_eq!(fan_rec.writes(), vec!["40"]);
        assert_eq!(pump_rec.writes(), vec!["76"]);

        // both duties unchanged
        assert_eq!(channels.set_temperature(21.0), 0);
    }

    #[test]
    fn failing_channel_does_not_block_others() {
        let (broken, broken_rec) = recorded("pwm1", FAN);
        let (fine, fine_rec) = recorded("pwm2", FAN);
        *broken_rec.fail.lock().unwrap() = true;
        let mut channels = Channels::new(vec![broken, fine]);

        assert_eq!(channels.set_temperature(50.0), 2);
        assert!(broken_rec.writes().is_empty());
        assert_eq!(fine_rec.writes(), vec!["255"]);
    }

    #[test]
    fn open_all_keeps_order_and_stops_on_missing_channel() {
        let dir = tempdir().unwrap();
        for name in ["pwm1", "pwm1_enable", "pwm2", "pwm2_enable"] {
            fs::write(dir.path().join(name), "0").unwrap();
        }
        let plan = |name: &str, curve: FanCurve| ChannelPlan {
            name: name.into(),
            curve_type: curve.kind().into(),
            curve,
        };

        let channels =
            Channels::open_all(dir.path(), &[plan("pwm2", PUMP), plan("pwm1", FAN)]).unwrap();
        let names: Vec<_> = channels.iter().map(PwmChannel::name).collect();
        assert_eq!(names, vec!["pwm2", "pwm1"]);

        let err = Channels::open_all(dir.path(), &[plan("pwm1", FAN), plan("pwm3", FAN)])
            .unwrap_err();
        assert!(matches!(err, PwmdError::Config(_)));
    }
}
