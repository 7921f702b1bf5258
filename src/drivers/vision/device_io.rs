use std::io;

/// `HID_REPORT_TYPE_INPUT` from `<linux/hiddev.h>`.
pub const HID_REPORT_TYPE_INPUT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub vendor: u16,
    pub product: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportInfo {
    pub report_type: u32,
    pub report_id: u32,
    pub num_fields: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldInfo {
    pub report_type: u32,
    pub report_id: u32,
    pub field_index: u32,
    /// Number of usages (positional values) carried by the field.
    pub max_usage: u32,
}

/// Address of one usage slot inside a report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageRef {
    pub report_type: u32,
    pub report_id: u32,
    pub field_index: u32,
    pub usage_index: u32,
}

/// Typed queries against an open hiddev handle.
///
/// Every call maps to exactly one ioctl and fails independently with the OS error.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceIO: Send + 'static {
    fn device_info(&self) -> io::Result<DeviceInfo>;
    fn string_descriptor(&self, index: i32) -> io::Result<String>;
    fn report_info(&self, report_type: u32, report_id: u32) -> io::Result<ReportInfo>;
    fn field_info(&self, report: &ReportInfo, field_index: u32) -> io::Result<FieldInfo>;
    fn usage_code(&self, usage: &UsageRef) -> io::Result<u32>;
    fn usage_value(&self, usage: &UsageRef) -> io::Result<i32>;
}
