//! Shoal Test Harness - scene simulation and end-to-end scenarios
//!
//! This crate provides:
//! - A scene simulator with scripted hands and a fixed tick
//! - Invariant tracing across ticks (privilege holders, attempt spacing)
//! - A local HTTP fixture server for animations and code images
//! - Encoded image fixtures

pub mod fixtures;
pub mod server;
pub mod simulator;

#[cfg(test)]
mod scenarios;

pub use fixtures::*;
pub use server::*;
pub use simulator::*;
