//! Shoal Runtime - Stage orchestration and main tick
//!
//! Each call to [`Stage::tick`] runs, in order:
//! 1. Advance the scene clock
//! 2. Dispatch queued spawn events into new entities
//! 3. Collect finished background asset work and hydrate it
//! 4. Snapshot the shared pose
//! 5. Arbitrate which entity (if any) the hands attract
//! 6. Step every entity's state machine and motion
//! 7. Advance playback and present the scene

pub mod arbiter;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod entity;
pub mod gate;
pub mod registry;
pub mod stage;

pub use arbiter::*;
pub use clock::*;
pub use config::*;
pub use dispatcher::*;
pub use entity::*;
pub use gate::*;
pub use registry::*;
pub use stage::*;
