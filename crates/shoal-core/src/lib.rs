//! Shoal Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the installation:
//! - Identifiers (EntityId, TextureHandle)
//! - Scene time (SceneTime)
//! - 2D geometry (Vec2, arm segment test)
//! - Error taxonomy

pub mod id;
pub mod time;
pub mod geometry;
pub mod error;

pub use id::*;
pub use time::*;
pub use geometry::*;
pub use error::*;
