//! Shoal Assets - animated image pipeline
//!
//! Download and decode run off the main tick and produce owned
//! [`RawFrame`]s. Hydration into render-surface textures and looped
//! playback happen on the main tick only.

pub mod frame;
pub mod decode;
pub mod surface;
pub mod playback;
pub mod pipeline;

pub use frame::*;
pub use decode::*;
pub use surface::*;
pub use playback::*;
pub use pipeline::*;
