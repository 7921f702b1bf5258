//! Aquacomputer VISION controller, reached through the kernel hiddev interface.
//!
//! Discovery scans [`DEVICE_DIR`] for `hiddev*` character devices and keeps the
//! first one whose vendor/product pair matches; everything else is closed again.

pub mod device_io;
pub mod hiddev;
pub mod protocol;

use std::{
    fmt, io,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::Serialize;

use crate::{error::PwmdError, sensors::ReportSource};

use self::{
    device_io::{DeviceIO, HID_REPORT_TYPE_INPUT, UsageRef},
    hiddev::HidDev,
};

pub const DEVICE_DIR: &str = "/dev/usb";
pub const DEVICE_PREFIX: &str = "hiddev";
pub const VID: u16 = 0x0c70; // Aquacomputer
pub const PID: u16 = 0xf00c;
pub const INPUT_REPORT_ID: u32 = 1;

const VENDOR_STRING_INDEX: i32 = 1;
const PRODUCT_STRING_INDEX: i32 = 2;

/// Vendor and product strings read once at discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub vendor: String,
    pub product: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.vendor, self.product)
    }
}

/// Exclusive handle to the matched controller.
#[derive(Debug)]
pub struct Vision<Io: DeviceIO = HidDev> {
    dev: Io,
    identity: Identity,
}

impl Vision<HidDev> {
    /// Looks for the controller in [`DEVICE_DIR`].
    pub fn find() -> Result<Option<Self>, PwmdError> {
        Self::find_in(Path::new(DEVICE_DIR))
    }

    pub fn find_in(dir: &Path) -> Result<Option<Self>, PwmdError> {
        probe(char_device_candidates(dir, DEVICE_PREFIX)?, HidDev::open)
    }
}

impl<Io: DeviceIO> Vision<Io> {
    /// Wraps a handle already known to be a VISION and reads its identity.
    ///
    /// A failing string descriptor query means the device is in a state we do
    /// not understand, so it is reported rather than skipped.
    pub fn open(dev: Io) -> Result<Self, PwmdError> {
        let vendor = dev
            .string_descriptor(VENDOR_STRING_INDEX)
            .map_err(PwmdError::hardware("HIDIOCGSTRING(vendor)"))?;
        let product = dev
            .string_descriptor(PRODUCT_STRING_INDEX)
            .map_err(PwmdError::hardware("HIDIOCGSTRING(product)"))?;

        Ok(Self {
            dev,
            identity: Identity { vendor, product },
        })
    }

    pub fn is_vision(dev: &Io) -> bool {
        dev.device_info()
            .map(|info| info.vendor == VID && info.product == PID)
            .unwrap_or(false)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Reads the current input report.
    ///
    /// The buffer starts with the report id followed by one byte per usage of
    /// field 0, in usage order. Nothing is cached between calls.
    pub fn read_input_report(&self) -> Result<Vec<u8>, PwmdError> {
        let report = self
            .dev
            .report_info(HID_REPORT_TYPE_INPUT, INPUT_REPORT_ID)
            .map_err(PwmdError::hardware("HIDIOCGREPORTINFO"))?;
        let field = self
            .dev
            .field_info(&report, 0)
            .map_err(PwmdError::hardware("HIDIOCGFIELDINFO"))?;

        let mut buf = Vec::with_capacity(field.max_usage as usize + 1);
        buf.push(report.report_id as u8);

        for usage_index in 0..field.max_usage {
            let usage = UsageRef {
                report_type: field.report_type,
                report_id: report.report_id,
                field_index: 0,
                usage_index,
            };
            // Usage codes are not interpreted, only positions are.
            self.dev
                .usage_code(&usage)
                .map_err(PwmdError::hardware("HIDIOCGUCODE"))?;
            let value = self
                .dev
                .usage_value(&usage)
                .map_err(PwmdError::hardware("HIDIOCGUSAGE"))?;
            buf.push(value as u8);
        }

        Ok(buf)
    }
}

impl<Io: DeviceIO> ReportSource for Vision<Io> {
    fn fetch_report(&mut self) -> Result<Vec<u8>, PwmdError> {
        self.read_input_report()
    }

    fn describe(&self) -> String {
        self.identity.to_string()
    }
}

/// Character devices in `dir` whose name starts with `prefix`, sorted by name.
pub fn char_device_candidates(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, PwmdError> {
    let discovery = |source| PwmdError::Discovery {
        path: dir.to_path_buf(),
        source,
    };

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(discovery)? {
        let entry = entry.map_err(discovery)?;
        let is_chr = entry
            .file_type()
            .map(|kind| kind.is_char_device())
            .unwrap_or(false);
        if is_chr && entry.file_name().to_string_lossy().starts_with(prefix) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates)
}

/// Opens each candidate in turn and returns the first VISION found.
///
/// Candidates that cannot be opened or do not match are skipped (and closed).
pub fn probe<Io, F>(
    candidates: impl IntoIterator<Item = PathBuf>,
    mut open: F,
) -> Result<Option<Vision<Io>>, PwmdError>
where
    Io: DeviceIO,
    F: FnMut(&Path) -> io::Result<Io>,
{
    for path in candidates {
        let dev = match open(&path) {
            Ok(dev) => dev,
            Err(e) => {
                debug!("Skipping {}: {e}", path.display());
                continue;
            }
        };
        if Vision::is_vision(&dev) {
            info!("VISION controller at {}", path.display());
            return Vision::open(dev).map(Some);
        }
        debug!("{} is not a VISION controller", path.display());
    }
    Ok(None)
}
