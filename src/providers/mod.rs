//! Services started by the coordinator.

pub mod control;
pub mod traits;

pub use control::ControlServiceProvider;
pub use traits::ServiceProvider;
