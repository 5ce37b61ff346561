//! # Configuration
//!
//! Process configuration for the controller.

mod controller;

pub use controller::ControllerConfig;
