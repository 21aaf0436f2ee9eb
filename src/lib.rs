//! # Blueshift
//!
//! Adjusts the colour output of graphics display pipelines, the gamma
//! correction lookup tables programmed into monitor CRTCs, according
//! to time of day, geographic position, colour temperature, ICC
//! profiles and user-configured arithmetic.
//!
//! ## Architecture
//!
//! - **curve**: the ramp engine, working curves and their operators
//! - **colour**: colour space conversions
//! - **blackbody**: temperature-to-whitepoint algorithms and LUTs
//! - **icc**: ICC VCGT/MLUT calibration parsing
//! - **interpolation**: ramp resizing and halo elimination
//! - **solar**: solar elevation and event prediction
//! - **output**: the CRTC/Screen/Display model and ramp coercion
//! - **backend**: adjustment-method dispatch (RandR, DRM, dummy, ...)
//! - **transition**: the signal-driven fade/run/reload scheduler
//! - **adhoc**: command-line day/night settings
//! - **config**: blueshiftrc discovery and the declarative config

pub mod adhoc;
pub mod args;
pub mod backend;
pub mod blackbody;
pub mod colour;
pub mod config;
pub mod constants;
pub mod curve;
pub mod edid;
pub mod icc;
pub mod interpolation;
pub mod logger;
pub mod output;
pub mod process;
pub mod signals;
pub mod solar;
pub mod transition;

// Re-export the types most consumers need
pub use adhoc::AdhocSettings;
pub use backend::{Backend, BackendType};
pub use curve::{Channels, RampEngine};
pub use interpolation::Interpolation;
pub use logger::{Log, LogLevel};
pub use output::{Depth, Display, Lifespan, MonitorController, MultiCrtc, Ramps};
pub use transition::{ConfigScript, Scheduler, SchedulerFlags, SchedulerSettings};
