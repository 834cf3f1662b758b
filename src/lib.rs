//! Per-app daily usage limits for the desktop.
//!
//! The [`blocker`] module holds the monitoring and enforcement engine; the
//! remaining modules wire it to a config file, a state file and the host
//! desktop.

pub mod blocker;
pub mod config;
pub mod platform;
pub mod state;
pub mod store;
