#![forbid(unsafe_code)]

//! Priority-weighted bandwidth distribution.
//!
//! A [`BandwidthController`] samples one externally-refreshed bandwidth
//! estimate on a fixed interval and splits it across subscribed consumers in
//! proportion to their [`Priority`]. Each consumer receives its share through
//! a [`BitrateSink`] callback, dispatched concurrently and bounded by a
//! per-subscriber timeout so a slow consumer can never starve the next tick.
//!
//! Bandwidth *measurement* is out of scope: the estimate is produced by an
//! external congestion controller behind the [`BandwidthEstimator`] trait.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vireo_bandwidth::{BandwidthController, ControllerOptions, Priority, SharedEstimate};
//!
//! let controller = Arc::new(BandwidthController::new(ControllerOptions::default()));
//! let estimate = Arc::new(SharedEstimate::new());
//! estimate.publish(2_000_000);
//!
//! controller.attach_estimator(estimate);
//! controller.subscribe("camera", Priority::LEVEL3, camera_sink)?;
//! controller.subscribe("screen", Priority::LEVEL1, screen_sink)?;
//! controller.start()?;
//! ```

mod controller;
mod error;
mod estimator;
mod priority;
mod registry;

pub use controller::{BandwidthController, ControllerOptions, ControllerState};
pub use error::{BandwidthError, BandwidthResult};
pub use estimator::{BandwidthEstimator, SharedEstimate};
pub use priority::Priority;
pub use registry::{BitrateSink, Registry, SinkError, Subscriber};
