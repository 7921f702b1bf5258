//! Raw bindings for the Linux hiddev character device interface
//! (`<linux/hiddev.h>`), and the real [`DeviceIO`] implementation built on them.

use std::{
    fs::File,
    io,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
};

use super::device_io::{DeviceIO, DeviceInfo, FieldInfo, ReportInfo, UsageRef};

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;
const IOC_READ: u32 = 2;
const IOC_READ_WRITE: u32 = 3;

const HIDDEV_IOCTL_TYPE: u8 = b'H';
const HID_STRING_SIZE: usize = 256;

const fn ioctl_code(direction: u32, kind: u8, nr: u8, size: usize) -> libc::c_ulong {
    ((direction << IOC_DIRSHIFT)
        | ((kind as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)) as libc::c_ulong
}

const fn ior<T>(nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ, HIDDEV_IOCTL_TYPE, nr, std::mem::size_of::<T>())
}

const fn iowr<T>(nr: u8) -> libc::c_ulong {
    ioctl_code(IOC_READ_WRITE, HIDDEV_IOCTL_TYPE, nr, std::mem::size_of::<T>())
}

#[repr(C)]
#[derive(Debug, Default)]
struct HiddevDevinfo {
    bustype: u32,
    busnum: u32,
    devnum: u32,
    ifnum: u32,
    vendor: i16,
    product: i16,
    version: i16,
    num_applications: u32,
}

#[repr(C)]
struct HiddevStringDescriptor {
    index: i32,
    value: [u8; HID_STRING_SIZE],
}

#[repr(C)]
#[derive(Debug, Default)]
struct HiddevReportInfo {
    report_type: u32,
    report_id: u32,
    num_fields: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct HiddevFieldInfo {
    report_type: u32,
    report_id: u32,
    field_index: u32,
    maxusage: u32,
    flags: u32,
    physical: u32,
    logical: u32,
    application: u32,
    logical_minimum: i32,
    logical_maximum: i32,
    physical_minimum: i32,
    physical_maximum: i32,
    unit_exponent: u32,
    unit: u32,
}

#[repr(C)]
#[derive(Debug, Default)]
struct HiddevUsageRef {
    report_type: u32,
    report_id: u32,
    field_index: u32,
    usage_index: u32,
    usage_code: u32,
    value: i32,
}

impl From<&UsageRef> for HiddevUsageRef {
    fn from(usage: &UsageRef) -> Self {
        Self {
            report_type: usage.report_type,
            report_id: usage.report_id,
            field_index: usage.field_index,
            usage_index: usage.usage_index,
            ..Self::default()
        }
    }
}

const HIDIOCGDEVINFO: libc::c_ulong = ior::<HiddevDevinfo>(0x03);
const HIDIOCGSTRING: libc::c_ulong = ior::<HiddevStringDescriptor>(0x04);
const HIDIOCGREPORTINFO: libc::c_ulong = iowr::<HiddevReportInfo>(0x09);
const HIDIOCGFIELDINFO: libc::c_ulong = iowr::<HiddevFieldInfo>(0x0A);
const HIDIOCGUSAGE: libc::c_ulong = iowr::<HiddevUsageRef>(0x0B);
const HIDIOCGUCODE: libc::c_ulong = iowr::<HiddevUsageRef>(0x0D);

fn parse_c_string(bytes: &[u8]) -> String {
    let nul_idx = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..nul_idx]).trim().to_string()
}

/// An open `/dev/usb/hiddevN` node.
///
/// The descriptor is closed when the value is dropped.
#[derive(Debug)]
pub struct HidDev {
    file: File,
    path: PathBuf,
}

impl HidDev {
    /// Opens a hiddev node read-only.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(&self, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
        // SAFETY: `arg` is a live, exclusively borrowed `#[repr(C)]` struct whose
        // layout and size match the one encoded in `request`.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request, arg as *mut T) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl DeviceIO for HidDev {
    fn device_info(&self) -> io::Result<DeviceInfo> {
        let mut info = HiddevDevinfo::default();
        self.ioctl(HIDIOCGDEVINFO, &mut info)?;
        Ok(DeviceInfo {
            vendor: info.vendor as u16,
            product: info.product as u16,
        })
    }

    fn string_descriptor(&self, index: i32) -> io::Result<String> {
        let mut desc = HiddevStringDescriptor {
            index,
            value: [0; HID_STRING_SIZE],
        };
        self.ioctl(HIDIOCGSTRING, &mut desc)?;
        Ok(parse_c_string(&desc.value))
    }

    fn report_info(&self, report_type: u32, report_id: u32) -> io::Result<ReportInfo> {
        let mut info = HiddevReportInfo {
            report_type,
            report_id,
            ..HiddevReportInfo::default()
        };
        self.ioctl(HIDIOCGREPORTINFO, &mut info)?;
        Ok(ReportInfo {
            report_type: info.report_type,
            report_id: info.report_id,
            num_fields: info.num_fields,
        })
    }

    fn field_info(&self, report: &ReportInfo, field_index: u32) -> io::Result<FieldInfo> {
        let mut info = HiddevFieldInfo {
            report_type: report.report_type,
            report_id: report.report_id,
            field_index,
            ..HiddevFieldInfo::default()
        };
        self.ioctl(HIDIOCGFIELDINFO, &mut info)?;
        Ok(FieldInfo {
            report_type: info.report_type,
            report_id: info.report_id,
            field_index: info.field_index,
            max_usage: info.maxusage,
        })
    }

    fn usage_code(&self, usage: &UsageRef) -> io::Result<u32> {
        let mut uref = HiddevUsageRef::from(usage);
        self.ioctl(HIDIOCGUCODE, &mut uref)?;
        Ok(uref.usage_code)
    }

    fn usage_value(&self, usage: &UsageRef) -> io::Result<i32> {
        let mut uref = HiddevUsageRef::from(usage);
        self.ioctl(HIDIOCGUSAGE, &mut uref)?;
        Ok(uref.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn struct_sizes_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<HiddevDevinfo>(), 28);
        assert_eq!(std::mem::size_of::<HiddevStringDescriptor>(), 260);
        assert_eq!(std::mem::size_of::<HiddevReportInfo>(), 12);
        assert_eq!(std::mem::size_of::<HiddevFieldInfo>(), 56);
        assert_eq!(std::mem::size_of::<HiddevUsageRef>(), 24);
    }

    #[test]
    fn request_codes_match_linux_headers() {
        assert_eq!(HIDIOCGDEVINFO, 0x801C_4803);
        assert_eq!(HIDIOCGSTRING, 0x8104_4804);
        assert_eq!(HIDIOCGREPORTINFO, 0xC00C_4809);
        assert_eq!(HIDIOCGFIELDINFO, 0xC038_480A);
        assert_eq!(HIDIOCGUSAGE, 0xC018_480B);
        assert_eq!(HIDIOCGUCODE, 0xC018_480D);
    }

    #[test]
    fn c_string_stops_at_nul() {
        let mut raw = [0u8; 16];
        raw[..5].copy_from_slice(b"aqua ");
        assert_eq!(parse_c_string(&raw), "aqua");
        assert_eq!(parse_c_string(b"no-nul"), "no-nul");
    }

    #[test]
    fn ioctl_on_regular_file_reports_os_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let dev = HidDev::open(file.path()).unwrap();
        assert!(dev.device_info().is_err());
        assert_eq!(dev.path(), file.path());
    }
}
