use std::collections::VecDeque;

/// Frames of bass history used for the adaptive threshold (~0.7s at 60fps)
const HISTORY_LEN: usize = 43;
/// Minimum gap between onsets in seconds
const MIN_ONSET_GAP: f32 = 0.1;
/// Beat intensity decay per second (exponential)
const DECAY_PER_SEC: f32 = 6.0;

/// Onset detector over the bass band. Produces the decaying pulse fed into
/// `FeatureVector::beat_intensity`.
pub struct BeatTracker {
    history: VecDeque<f32>,
    intensity: f32,
    since_onset: f32,
}

impl Default for BeatTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BeatTracker {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
            intensity: 0.0,
            since_onset: f32::INFINITY,
        }
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Feed one frame of bass energy. Returns true on a detected onset.
    pub fn update(&mut self, bass: f32, dt: f32) -> bool {
        self.since_onset += dt;
        self.intensity *= (-DECAY_PER_SEC * dt).exp();

        let onset = if self.history.len() >= HISTORY_LEN / 2 {
            let mean = self.history.iter().sum::<f32>() / self.history.len() as f32;
            let threshold = mean * 1.5 + 0.01;
            bass > threshold && self.since_onset > MIN_ONSET_GAP
        } else {
            false
        };

        if onset {
            self.intensity = 1.0;
            self.since_onset = 0.0;
        }

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(bass);
        onset
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.intensity = 0.0;
        self.since_onset = f32::INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_signal_has_no_onsets() {
        let mut tracker = BeatTracker::new();
        for _ in 0..200 {
            assert!(!tracker.update(0.4, 1.0 / 60.0));
        }
        assert_eq!(tracker.intensity(), 0.0);
    }

    #[test]
    fn spike_triggers_pulse_that_decays() {
        let mut tracker = BeatTracker::new();
        for _ in 0..60 {
            tracker.update(0.1, 1.0 / 60.0);
        }
        assert!(tracker.update(0.9, 1.0 / 60.0));
        assert_eq!(tracker.intensity(), 1.0);

        tracker.update(0.1, 1.0 / 60.0);
        let after = tracker.intensity();
        assert!(after < 1.0 && after > 0.8);
    }

    #[test]
    fn onsets_respect_minimum_gap() {
        let mut tracker = BeatTracker::new();
        for _ in 0..60 {
            tracker.update(0.1, 1.0 / 60.0);
        }
        assert!(tracker.update(0.9, 1.0 / 60.0));
        assert!(!tracker.update(0.95, 1.0 / 60.0));
    }
}
