use crate::error::PwmdError;

/// Source of raw input reports for the control loop.
///
/// Each call must return a freshly read report.
pub trait ReportSource: Send {
    fn fetch_report(&mut self) -> Result<Vec<u8>, PwmdError>;

    fn describe(&self) -> String {
        String::from("unknown device")
    }
}
