use std::collections::HashSet;

use livekit_integration::RoomParticipant;

pub const BAR_COUNT: usize = 7;
pub const BAR_MIN_HEIGHT: f32 = 6.0;
pub const BAR_MAX_HEIGHT: f32 = 32.0;

// Center bars swing further than the edges.
const BAR_WEIGHTS: [f32; BAR_COUNT] = [0.45, 0.65, 0.85, 1.0, 0.85, 0.65, 0.45];
const DECAY: f32 = 0.6;

/// Turns agent audio levels into bar heights for the voice visualizer.
#[derive(Debug, Clone)]
pub struct AudioVisualizer {
    agents: HashSet<String>,
    level: f32,
}

impl Default for AudioVisualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioVisualizer {
    pub fn new() -> Self {
        Self {
            agents: HashSet::new(),
            level: 0.0,
        }
    }

    pub fn observe_participant(&mut self, participant: &RoomParticipant) {
        if participant.is_agent {
            self.agents.insert(participant.identity.clone());
        }
    }

    /// Returns true when the departing identity was a tracked agent.
    pub fn forget(&mut self, identity: &str) -> bool {
        let was_agent = self.agents.remove(identity);
        if was_agent && self.agents.is_empty() {
            self.level = 0.0;
        }
        was_agent
    }

    pub fn is_agent(&self, identity: &str) -> bool {
        self.agents.contains(identity)
    }

    /// Records a level for `identity`; levels from non-agent participants are ignored.
    pub fn record_level(&mut self, identity: &str, level: f32) -> Option<Vec<f32>> {
        if !self.is_agent(identity) {
            return None;
        }
        let level = if level.is_finite() {
            level.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.level = level.max(self.level * DECAY);
        Some(self.bar_heights())
    }

    pub fn bar_heights(&self) -> Vec<f32> {
        BAR_WEIGHTS
            .iter()
            .map(|weight| BAR_MIN_HEIGHT + (BAR_MAX_HEIGHT - BAR_MIN_HEIGHT) * self.level * weight)
            .collect()
    }

    pub fn reset(&mut self) {
        self.agents.clear();
        self.level = 0.0;
    }
}
