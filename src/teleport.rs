use crate::nav_structs::{distance, Vec3};

/// Flags position samples that jump farther than walking could explain.
#[derive(Debug, Clone)]
pub struct TeleportDetector {
    threshold: f64,
    last: Option<Vec3>,
}

impl TeleportDetector {
    pub fn new(threshold: f64) -> Self {
        TeleportDetector {
            threshold,
            last: None,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Records `position` and returns the jump length if it was a teleport.
    pub fn observe(&mut self, position: Vec3) -> Option<f64> {
        let previous = self.last.replace(position)?;
        let moved = distance(previous, position);
        (moved > self.threshold).then_some(moved)
    }
}
