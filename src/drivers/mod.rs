//! Hardware drivers.

pub mod vision;
