//! # vision_pwmd
//!
//! A Linux daemon that drives hwmon PWM outputs from the coolant temperature
//! reported by an aquacomputer VISION controller over hiddev.
//!
//! ## Architecture
//!
//! - [`drivers::vision`] finds the controller and reads its input report
//! - [`fan_curve`] maps a temperature to a duty value per curve type
//! - [`pwm_channel`] writes duty values with hysteresis
//! - [`control_loop`] runs the once-per-second poll/actuate cycle
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) wires it together,
//!   starts services through the [`TaskManager`](task_manager::TaskManager)
//!   and stops them on SIGINT/SIGTERM
//!
//! ## Example
//!
//! ```no_run
//! use vision_pwmd::{
//!     application::Application,
//!     config::{ChannelSpec, Config},
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?.with_channels(vec!["pwm1=pump".parse::<ChannelSpec>()?]);
//!     let runtime = tokio::runtime::Builder::new_current_thread()
//!         .enable_all()
//!         .build()?;
//!     runtime.block_on(async {
//!         Application::builder().with_config(config).build()?.run().await
//!     })
//! }
//! ```

pub mod application;
pub mod cli;
pub mod config;
pub mod control_loop;
pub mod controller;
pub mod coordinator;
pub mod drivers;
pub mod error;
pub mod event;
pub mod fan_curve;
pub mod providers;
pub mod pwm_channel;
pub mod sensors;
pub mod task_manager;
