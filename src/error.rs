//! Error taxonomy shared by the discovery, protocol and actuation layers.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised by the daemon core.
///
/// Absence of a matching device is not an error; discovery returns `Ok(None)`
/// and the caller decides whether that is fatal.
#[derive(Debug, Error)]
pub enum PwmdError {
    /// The device directory could not be enumerated.
    #[error("cannot scan device directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A step of the descriptor or report query sequence failed.
    #[error("{op} failed: {source}")]
    Hardware {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The fetched report is shorter than the input report layout.
    #[error("input report too short: expected at least {expected} bytes, got {actual}")]
    ShortReport { expected: usize, actual: usize },

    /// Unknown curve, missing actuation target, empty channel list and friends.
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing a duty value (or the manual-control sentinel) failed.
    #[error("write to {path} failed: {source}")]
    Actuation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PwmdError {
    pub(crate) fn hardware(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Hardware { op, source }
    }

    pub(crate) fn actuation(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Actuation { path, source }
    }

    /// True for failures of the hardware protocol, including short reports.
    pub fn is_hardware(&self) -> bool {
        matches!(self, Self::Hardware { .. } | Self::ShortReport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hardware_error_names_the_failed_step() {
        let err = PwmdError::hardware("HIDIOCGFIELDINFO")(io::Error::from_raw_os_error(libc::EIO));
        assert!(err.is_hardware());
        assert!(err.to_string().starts_with("HIDIOCGFIELDINFO failed"));
    }

    #[test]
    fn short_report_counts_as_hardware_failure() {
        let err = PwmdError::ShortReport {
            expected: 272,
            actual: 10,
        };
        assert!(err.is_hardware());
        assert_eq!(
            err.to_string(),
            "input report too short: expected at least 272 bytes, got 10"
        );
    }

    #[test]
    fn config_error_is_not_hardware() {
        assert!(!PwmdError::Config("no channels".into()).is_hardware());
    }
}
