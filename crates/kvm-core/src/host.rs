//! Services the VM consumes from its embedder

use std::time::{Duration, Instant};

use crate::gpu::Frame;
use crate::input::InputSnapshot;

/// Embedder-provided presentation, input, clock and text output.
///
/// Only `present` and `sample_input` are required; the rest default to the
/// real clock, a blocking sleep and stdout.
pub trait Host {
    /// Show a composed frame
    fn present(&mut self, frame: &Frame);

    /// Sample the current keyboard and mouse state
    fn sample_input(&mut self) -> InputSnapshot;

    /// Monotonic clock
    fn now(&self) -> Instant {
        Instant::now()
    }

    /// Block for `duration`
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Text printed by ROM code
    fn print(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Host without a window: records output and frames, never blocks.
///
/// Sleeping advances a virtual clock instead of the thread, so timers
/// observe the delay without the test waiting for it.
#[derive(Debug, Clone)]
pub struct HeadlessHost {
    /// Lines passed to [`Host::print`]
    pub output: Vec<String>,
    /// Most recently presented frame
    pub last_frame: Option<Frame>,
    pub frames_presented: usize,
    /// Input returned by every sample
    pub input: InputSnapshot,
    skipped: Duration,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            last_frame: None,
            frames_presented: 0,
            input: InputSnapshot::default(),
            skipped: Duration::ZERO,
        }
    }

    /// Total time spent in [`Host::sleep`]
    pub fn slept(&self) -> Duration {
        self.skipped
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for HeadlessHost {
    fn present(&mut self, frame: &Frame) {
        self.frames_presented += 1;
        self.last_frame = Some(frame.clone());
    }

    fn sample_input(&mut self) -> InputSnapshot {
        self.input.clone()
    }

    fn now(&self) -> Instant {
        Instant::now() + self.skipped
    }

    fn sleep(&mut self, duration: Duration) {
        self.skipped += duration;
    }

    fn print(&mut self, text: &str) {
        self.output.push(text.to_string());
    }
}
