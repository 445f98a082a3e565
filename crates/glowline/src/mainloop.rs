use std::time::{Duration, Instant};

/// What one draw tick should do before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Fixed simulation steps to run.
    pub updates: u32,
    /// Set when the accumulated time needed more than the allowed steps.
    pub panicked: bool,
    /// Simulation time thrown away by a panic.
    pub discarded: Duration,
}

/// Fixed-timestep accumulator driving `update` at a constant rate while
/// drawing as often as the display allows.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    max_updates: u32,
    lag: Duration,
    last: Option<Instant>,
}

impl FixedStep {
    pub fn new(step: Duration, max_updates: u32) -> Self {
        Self {
            step: step.max(Duration::from_micros(1)),
            max_updates: max_updates.max(1),
            lag: Duration::ZERO,
            last: None,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Measures the time since the previous tick; the first tick only starts
    /// the clock.
    pub fn tick(&mut self, now: Instant) -> Tick {
        let elapsed = self
            .last
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last = Some(now);
        self.advance(elapsed)
    }

    pub fn advance(&mut self, elapsed: Duration) -> Tick {
        self.lag += elapsed;

        let mut updates = 0;
        while self.lag >= self.step && updates < self.max_updates {
            self.lag -= self.step;
            updates += 1;
        }

        if self.lag >= self.step {
            return Tick {
                updates,
                panicked: true,
                discarded: std::mem::take(&mut self.lag),
            };
        }

        Tick {
            updates,
            panicked: false,
            discarded: Duration::ZERO,
        }
    }
}
