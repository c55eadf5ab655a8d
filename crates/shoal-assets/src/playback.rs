//! Looped frame sequencing
//!
//! Each frame is shown, then held for its relative delay (its timestamp
//! minus the previous frame's, floored at zero) before the next one. The
//! "previous" timestamp resets to zero at every wrap, so the first frame
//! of each cycle is held for its own timestamp.

use std::time::Duration;

use shoal_core::TextureHandle;

use crate::HydratedFrame;

/// Restartable infinite loop over hydrated frames, advanced by the tick
#[derive(Debug, Default)]
pub struct Playback {
    frames: Vec<HydratedFrame>,
    index: usize,
    prev_timestamp: u32,
    held: Duration,
    playing: bool,
}

impl Playback {
    pub fn new(frames: Vec<HydratedFrame>) -> Self {
        Playback {
            frames,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[HydratedFrame] {
        &self.frames
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Restart from the first frame. Does nothing without frames.
    pub fn start(&mut self) {
        if self.frames.is_empty() {
            return;
        }
        self.index = 0;
        self.prev_timestamp = 0;
        self.held = Duration::ZERO;
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Frame currently on screen
    pub fn current(&self) -> Option<TextureHandle> {
        self.frames.get(self.index).map(|f| f.texture)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    /// How long the current frame is held before advancing
    pub fn current_delay(&self) -> Duration {
        self.frames
            .get(self.index)
            .map(|f| Duration::from_millis(u64::from(f.timestamp_ms.saturating_sub(self.prev_timestamp))))
            .unwrap_or(Duration::ZERO)
    }

    /// Per-frame hold times for one full cycle, in milliseconds
    pub fn cycle_delays(&self) -> Vec<u32> {
        let mut prev = 0u32;
        self.frames
            .iter()
            .map(|f| {
                let delay = f.timestamp_ms.saturating_sub(prev);
                prev = f.timestamp_ms;
                delay
            })
            .collect()
    }

    fn cycle_length(&self) -> Duration {
        Duration::from_millis(self.cycle_delays().iter().map(|&d| u64::from(d)).sum())
    }

    fn step(&mut self) {
        self.prev_timestamp = self.frames[self.index].timestamp_ms;
        self.index += 1;
        if self.index == self.frames.len() {
            self.index = 0;
            self.prev_timestamp = 0;
        }
    }

    /// Advance by `dt` of scene time and return the frame to show.
    ///
    /// At most one full cycle is stepped per call; surplus time is folded
    /// back modulo the cycle length.
    pub fn advance(&mut self, dt: Duration) -> Option<TextureHandle> {
        if !self.playing || self.frames.is_empty() {
            return self.current();
        }

        self.held += dt;
        let mut steps = 0;
        while steps < self.frames.len() {
            let delay = self.current_delay();
            if self.held < delay {
                break;
            }
            self.held -= delay;
            self.step();
            steps += 1;
        }

        if steps == self.frames.len() {
            let cycle = self.cycle_length();
            self.held = if cycle.is_zero() {
                Duration::ZERO
            } else {
                Duration::from_nanos((self.held.as_nanos() % cycle.as_nanos()) as u64)
            };
        }

        self.current()
    }

    /// Hand the frames back (for release) and leave the playback empty
    pub fn take_frames(&mut self) -> Vec<HydratedFrame> {
        self.playing = false;
        self.index = 0;
        self.prev_timestamp = 0;
        self.held = Duration::ZERO;
        std::mem::take(&mut self.frames)
    }
}
