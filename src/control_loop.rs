//! Poll, decode, evaluate, actuate.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::{
    controller::Channels, drivers::vision::protocol, error::PwmdError, sensors::ReportSource,
};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sensor slot carrying the coolant temperature.
pub const PRIMARY_SENSOR_SLOT: usize = 4;

/// Outcome of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cycle {
    /// Same reading as last time; no channel was evaluated.
    Unchanged { temp: f64 },
    /// Every channel was evaluated. `jump` holds the delta when it exceeded
    /// the jump threshold.
    Actuated {
        temp: f64,
        writes: usize,
        jump: Option<f64>,
    },
}

pub struct ControlLoop<S: ReportSource> {
    source: S,
    channels: Channels,
    last_temp: Option<f64>,
    jump_threshold: f64,
    max_failures: u32,
    poll_interval: Duration,
}

impl<S: ReportSource> ControlLoop<S> {
    pub fn new(source: S, channels: Channels, jump_threshold: f64, max_failures: u32) -> Self {
        Self {
            source,
            channels,
            last_temp: None,
            jump_threshold,
            max_failures: max_failures.max(1),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn last_temp(&self) -> Option<f64> {
        self.last_temp
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Fetches one report and applies its primary temperature.
    pub fn cycle(&mut self) -> Result<Cycle, PwmdError> {
        let report = self.source.fetch_report()?;
        let temp = protocol::temperature(&report, PRIMARY_SENSOR_SLOT)?;
        Ok(self.apply(temp))
    }

    /// Applies `temp` to every channel unless it equals the previous reading.
    ///
    /// A jump beyond the threshold is only reported; the channels are still
    /// updated.
    pub fn apply(&mut self, temp: f64) -> Cycle {
        let Some(last) = self.last_temp else {
            self.last_temp = Some(temp);
            return Cycle::Actuated {
                temp,
                writes: self.channels.set_temperature(temp),
                jump: None,
            };
        };

        let diff = temp - last;
        if diff == 0.0 {
            debug!("Temperature unchanged at {temp}");
            return Cycle::Unchanged { temp };
        }

        let jump = (diff.abs() > self.jump_threshold).then_some(diff);
        if jump.is_some() {
            warn!(
                "Temperature jump > {} degrees ({last} -> {temp})",
                self.jump_threshold
            );
        }

        self.last_temp = Some(temp);
        Cycle::Actuated {
            temp,
            writes: self.channels.set_temperature(temp),
            jump,
        }
    }

    /// Runs cycles at the poll interval until `stop` is cancelled.
    ///
    /// Cancellation is only observed between cycles. Returns the last error
    /// once `max_failures` polls in a row have failed.
    pub async fn run(mut self, stop: CancellationToken) -> Result<(), PwmdError> {
        info!(
            "Control loop started on {} ({} channels)",
            self.source.describe(),
            self.channels.len()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                _ = ticker.tick() => match self.cycle() {
                    Ok(_) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        if failures >= self.max_failures {
                            error!("Giving up after {failures} failed polls: {e}");
                            return Err(e);
                        }
                        warn!("Poll failed ({failures}/{}): {e}", self.max_failures);
                    }
                },
            }
        }

        info!("Control loop stopped; channels keep their last duty");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        drivers::vision::protocol::encode_report,
        fan_curve::{FanCurve, Quadratic},
        pwm_channel::tests::{Recorder, recorded},
    };
    use pretty_assertions::assert_eq;
    use std::{
        collections::VecDeque,
        io,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };
    use tokio::time::{sleep, timeout};

    const FAN: FanCurve = FanCurve::Fan(Quadratic::FAN);

    /// Plays back a fixed script, then repeats `fallback` (or fails) forever.
    struct ScriptedSource {
        script: VecDeque<Result<Vec<u8>, PwmdError>>,
        fallback: Option<Vec<u8>>,
        fetches: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<Vec<u8>, PwmdError>>, fallback: Option<Vec<u8>>) -> Self {
            Self {
                script: script.into(),
                fallback,
                fetches: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ReportSource for ScriptedSource {
        fn fetch_report(&mut self) -> Result<Vec<u8>, PwmdError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(next) => next,
                None => self.fallback.clone().ok_or_else(ioctl_failure),
            }
        }

        fn describe(&self) -> String {
            String::from("scripted")
        }
    }

    fn ioctl_failure() -> PwmdError {
        PwmdError::Hardware {
            op: "HIDIOCGUSAGE",
            source: io::Error::from_raw_os_error(libc::EIO),
        }
    }

    fn report(hundredths: u16) -> Vec<u8> {
        encode_report([0, 0, 0, 0, hundredths])
    }

    fn control_loop(
        script: Vec<Result<Vec<u8>, PwmdError>>,
        fallback: Option<Vec<u8>>,
    ) -> (ControlLoop<ScriptedSource>, Recorder) {
        let (channel, recorder) = recorded("pwm1", FAN);
        let source = ScriptedSource::new(script, fallback);
        let control = ControlLoop::new(source, Channels::new(vec![channel]), 0.5, 3)
            .with_poll_interval(Duration::from_millis(1));
        (control, recorder)
    }

    #[test]
    fn first_reading_always_actuates() {
        let (mut control, recorder) = control_loop(vec![Ok(report(4500))], None);
        assert_eq!(control.last_temp(), None);

        let cycle = control.cycle().unwrap();
        assert_eq!(
            cycle,
            Cycle::Actuated {
                temp: 45.0,
                writes: 1,
                jump: None
            }
        );
        assert_eq!(control.last_temp(), Some(45.0));
        assert_eq!(recorder.writes(), vec!["255"]);
    }

    #[test]
    fn zero_delta_skips_every_channel() {
        let (mut control, recorder) =
            control_loop(vec![Ok(report(2000)), Ok(report(2000))], None);

        control.cycle().unwrap();
        assert_eq!(control.cycle().unwrap(), Cycle::Unchanged { temp: 20.0 });
        assert_eq!(recorder.writes(), vec!["40"]);
    }

    #[test]
    fn jump_is_reported_and_still_actuated() {
        let (mut control, recorder) =
            control_loop(vec![Ok(report(4000)), Ok(report(4060))], None);

        control.cycle().unwrap();
        match control.cycle().unwrap() {
            Cycle::Actuated { temp, writes, jump } => {
                assert_eq!(temp, 40.6);
                assert_eq!(writes, 1);
                let jump = jump.expect("jump should be reported");
                assert!((jump - 0.6).abs() < 1e-9);
            }
            other => panic!("expected actuation, got {other:?}"),
        }
        assert_eq!(control.last_temp(), Some(40.6));
        assert_eq!(recorder.writes().len(), 2);
    }

    #[test]
    fn small_change_is_not_a_jump() {
        let (mut control, _recorder) = control_loop(Vec::new(), None);
        control.apply(40.0);
        assert!(matches!(
            control.apply(40.3),
            Cycle::Actuated { jump: None, .. }
        ));
        assert!(matches!(
            control.apply(39.0),
            Cycle::Actuated { jump: Some(_), .. }
        ));
    }

    #[test]
    fn same_duty_after_change_writes_nothing() {
        let (mut control, recorder) = control_loop(Vec::new(), None);
        control.apply(20.0);
        assert_eq!(
            control.apply(20.2),
            Cycle::Actuated {
                temp: 20.2,
                writes: 0,
                jump: None
            }
        );
        assert_eq!(recorder.writes(), vec!["40"]);
    }

    #[test]
    fn short_report_is_a_hardware_error() {
        let (mut control, recorder) = control_loop(vec![Ok(vec![0x01; 16])], None);
        let err = control.cycle().unwrap_err();
        assert!(err.is_hardware());
        assert!(recorder.writes().is_empty());
        assert_eq!(control.last_temp(), None);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let (control, recorder) = control_loop(Vec::new(), Some(report(3500)));
        let stop = CancellationToken::new();
        let handle = tokio::spawn(control.run(stop.clone()));

        sleep(Duration::from_millis(20)).await;
        stop.cancel();

        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert_eq!(recorder.writes().len(), 1);
    }

    #[tokio::test]
    async fn run_gives_up_after_consecutive_failures() {
        let (control, recorder) = control_loop(Vec::new(), None);
        let fetches = control.source.fetches.clone();

        let result = timeout(
            Duration::from_secs(1),
            control.run(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(PwmdError::Hardware { .. })));
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
        assert!(recorder.writes().is_empty());
    }

    #[tokio::test]
    async fn successful_poll_resets_failure_count() {
        let script = vec![
            Err(ioctl_failure()),
            Err(ioctl_failure()),
            Ok(report(3000)),
            Err(ioctl_failure()),
            Err(ioctl_failure()),
        ];
        let (control, _recorder) = control_loop(script, Some(report(3000)));
        let fetches = control.source.fetches.clone();
        let stop = CancellationToken::new();
        let handle = tokio::spawn(control.run(stop.clone()));

        sleep(Duration::from_millis(30)).await;
        stop.cancel();

        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
        assert!(fetches.load(Ordering::SeqCst) > 5);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_no_cycle() {
        let (control, recorder) = control_loop(Vec::new(), Some(report(3500)));
        let fetches = control.source.fetches.clone();
        let stop = CancellationToken::new();
        stop.cancel();

        control.run(stop).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(recorder.writes().is_empty());
    }
}
