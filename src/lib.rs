//! Per-client request rate-limiting middleware for [`tower`].
//!
//! [`GateLayer`] derives a client identity for each request with a pluggable
//! [`IdentityFn`], keeps an adaptive exponential-moving-average rate
//! estimate per identity in a bounded, concurrent [`TrackerTable`], and
//! hands requests that exceed the limit off to a [`RejectionHandler`] that
//! may delay its response before terminating the exchange with a
//! configurable status (`420 Enhance Your Calm` by default).
//!
//! Idle trackers are reclaimed in the background by a [`wheel::TimeoutWheel`]
//! so that long-running processes do not accumulate state for clients that
//! have gone away.
//!
//! [`tower`]: https://docs.rs/tower

#![deny(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

mod clock;
mod config;
mod error;
mod estimator;
mod gate;
mod identity;
mod reject;
mod request;
mod scheduler;
mod table;
mod tracker;
mod wheel;

pub use crate::clock::{Clock, MonotonicClock};
pub use crate::config::Config;
pub use crate::error::{BoxError, ConfigError};
pub use crate::estimator::{RateEstimator, RateEstimatorFactory};
pub use crate::gate::{Gate, GateLayer, GateFuture};
pub use crate::identity::{
    ConnectionId, IdentityFn, RemoteAddress, RemoteAddressPort, RemotePort,
};
pub use crate::reject::{ImmediateReject, DelayedReject, RejectResponse, RejectionHandler};
pub use crate::request::{ConnectionInfo, TimestampedRequest};
pub use crate::scheduler::{Scheduler, TokioScheduler};
pub use crate::table::TrackerTable;
