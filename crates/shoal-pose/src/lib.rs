//! Shoal Pose - Hand and arm pose as shared state
//!
//! This is NOT skeleton tracking. The estimator runs elsewhere; this crate
//! holds the latest wrist/elbow coordinates it reported, in scene space,
//! with a sentinel for "no data yet".

pub mod hands;
pub mod landmarks;
pub mod shared;

pub use hands::*;
pub use landmarks::*;
pub use shared::*;
