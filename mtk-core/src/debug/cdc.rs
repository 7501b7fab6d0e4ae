//! Clock-domain crossing.

/// Two-stage flip-flop synchronizer for a single-bit signal entering the core clock domain.
///
/// The output follows the input with a latency of two ticks.
#[derive(Debug, Clone, Default)]
pub struct FfSynchronizer {
    stages: [bool; 2],
}

impl FfSynchronizer {
    pub fn new(reset: bool) -> Self {
        Self {
            stages: [reset; 2],
        }
    }

    pub fn tick(&mut self, input: bool) -> bool {
        self.stages = [input, self.stages[0]];
        self.stages[1]
    }

    pub fn output(&self) -> bool {
        self.stages[1]
    }
}
