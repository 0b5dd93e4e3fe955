// crates/laminark-server/src/pipeline/topic_shift.rs
// Topic-shift detection: cosine distance between consecutive embeddings
// against an EWMA-adaptive threshold

use crate::config::TopicDetectionConfig;
use crate::similarity::cosine_distance;

/// EWMA decay factor
const EWMA_ALPHA: f64 = 0.3;

/// Adaptive threshold clamp bounds
const THRESHOLD_FLOOR: f64 = 0.15;
const THRESHOLD_CEILING: f64 = 0.6;

/// Manual threshold clamp bounds
const MANUAL_FLOOR: f64 = 0.05;
const MANUAL_CEILING: f64 = 0.95;

/// Threshold that never triggers (disabled detector; distances cap at 2.0)
const SENTINEL_THRESHOLD: f64 = 10.0;

/// Result of one detector invocation
#[derive(Debug, Clone)]
pub struct ShiftDetection {
    pub shifted: bool,
    pub distance: f64,
    pub threshold: f64,
    pub confidence: f64,
    pub had_previous: bool,
}

/// EWMA of distance mean and variance driving the adaptive threshold.
#[derive(Debug, Clone)]
pub struct AdaptiveThreshold {
    mean: f64,
    variance: f64,
    observation_count: i64,
    sensitivity: f64,
    manual: Option<f64>,
    enabled: bool,
}

impl AdaptiveThreshold {
    pub fn from_config(config: &TopicDetectionConfig) -> Self {
        Self {
            mean: 0.0,
            variance: 0.0,
            observation_count: 0,
            sensitivity: config.sensitivity(),
            manual: config
                .manual_threshold
                .map(|t| t.clamp(MANUAL_FLOOR, MANUAL_CEILING)),
            enabled: config.enabled,
        }
    }

    /// Seed the EWMA state from threshold history (cold start).
    pub fn seed(&mut self, mean: f64, variance: f64) {
        self.mean = mean;
        self.variance = variance;
    }

    /// Fold one distance into the EWMA state. A manual threshold bypasses
    /// adaptation entirely.
    pub fn update(&mut self, distance: f64) {
        if self.manual.is_some() {
            return;
        }
        self.mean = EWMA_ALPHA * distance + (1.0 - EWMA_ALPHA) * self.mean;
        let deviation = distance - self.mean;
        self.variance = EWMA_ALPHA * deviation * deviation + (1.0 - EWMA_ALPHA) * self.variance;
        self.observation_count += 1;
    }

    /// The threshold in effect right now.
    pub fn current(&self) -> f64 {
        if !self.enabled {
            return SENTINEL_THRESHOLD;
        }
        if let Some(manual) = self.manual {
            return manual;
        }
        (self.mean + self.sensitivity * self.variance.sqrt())
            .clamp(THRESHOLD_FLOOR, THRESHOLD_CEILING)
    }

    pub fn state(&self) -> (f64, f64, i64) {
        (self.mean, self.variance, self.observation_count)
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }
}

/// Detector over consecutive observation embeddings.
pub struct TopicShiftDetector {
    previous: Option<Vec<f32>>,
    threshold: AdaptiveThreshold,
}

impl TopicShiftDetector {
    pub fn new(config: &TopicDetectionConfig) -> Self {
        Self {
            previous: None,
            threshold: AdaptiveThreshold::from_config(config),
        }
    }

    /// Seed EWMA state from persisted history.
    pub fn seed(&mut self, mean: f64, variance: f64) {
        self.threshold.seed(mean, variance);
    }

    /// Compare `embedding` against the previous one. The first call after a
    /// reset records the embedding and never shifts.
    pub fn detect(&mut self, embedding: &[f32]) -> ShiftDetection {
        let threshold = self.threshold.current();
        let result = match self.previous.as_deref() {
            None => ShiftDetection {
                shifted: false,
                distance: 0.0,
                threshold,
                confidence: 0.0,
                had_previous: false,
            },
            Some(previous) => {
                let distance = cosine_distance(previous, embedding) as f64;
                let shifted = distance > threshold;
                let confidence = if shifted && threshold > 0.0 {
                    ((distance - threshold) / threshold).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                self.threshold.update(distance);
                ShiftDetection { shifted, distance, threshold, confidence, had_previous: true }
            }
        };
        self.previous = Some(embedding.to_vec());
        result
    }

    /// Forget the previous embedding (topic boundary, session end).
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn threshold(&self) -> &AdaptiveThreshold {
        &self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TopicPreset;

    fn config() -> TopicDetectionConfig {
        TopicDetectionConfig::default()
    }

    fn unit_vec(direction: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 8];
        v[direction] = 1.0;
        v
    }

    #[test]
    fn first_call_never_shifts() {
        let mut detector = TopicShiftDetector::new(&config());
        let result = detector.detect(&unit_vec(0));
        assert!(!result.shifted);
        assert!(!result.had_previous);
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn orthogonal_jump_shifts_with_high_confidence() {
        let mut config = config();
        config.manual_threshold = Some(0.3);
        let mut detector = TopicShiftDetector::new(&config);

        // Three near-identical embeddings, then an orthogonal one
        detector.detect(&unit_vec(0));
        assert!(!detector.detect(&unit_vec(0)).shifted);
        assert!(!detector.detect(&unit_vec(0)).shifted);
        let result = detector.detect(&unit_vec(1));
        assert!(result.shifted);
        assert!((result.distance - 1.0).abs() < 1e-6);
        // (1.0 - 0.3) / 0.3 > 1 -> clamped
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reset_forgets_previous() {
        let mut config = config();
        config.manual_threshold = Some(0.3);
        let mut detector = TopicShiftDetector::new(&config);
        detector.detect(&unit_vec(0));
        detector.reset();
        let result = detector.detect(&unit_vec(1));
        assert!(!result.shifted, "first call after reset must not shift");
    }

    #[test]
    fn disabled_config_never_triggers() {
        let mut config = config();
        config.enabled = false;
        let mut detector = TopicShiftDetector::new(&config);
        detector.detect(&unit_vec(0));
        let result = detector.detect(&unit_vec(1));
        assert!(!result.shifted);
        assert!(result.threshold > 2.0, "sentinel must exceed the max distance");
    }

    #[test]
    fn manual_threshold_bypasses_adaptation() {
        let mut config = config();
        config.manual_threshold = Some(0.5);
        let mut detector = TopicShiftDetector::new(&config);
        detector.detect(&unit_vec(0));
        for _ in 0..20 {
            detector.detect(&unit_vec(1));
            detector.detect(&unit_vec(0));
        }
        let (mean, variance, count) = detector.threshold().state();
        assert_eq!((mean, variance, count), (0.0, 0.0, 0));
        assert_eq!(detector.threshold().current(), 0.5);
    }

    #[test]
    fn manual_threshold_is_clamped_to_legal_range() {
        let mut config = config();
        config.manual_threshold = Some(3.0);
        let detector = TopicShiftDetector::new(&config);
        assert_eq!(detector.threshold().current(), 0.95);
    }

    #[test]
    fn adaptive_threshold_stays_bounded() {
        let mut threshold = AdaptiveThreshold::from_config(&config());
        // Feed extremes in both directions; clamp must always hold
        for _ in 0..50 {
            threshold.update(2.0);
            let t = threshold.current();
            assert!((THRESHOLD_FLOOR..=THRESHOLD_CEILING).contains(&t), "got {t}");
        }
        for _ in 0..50 {
            threshold.update(0.0);
            let t = threshold.current();
            assert!((THRESHOLD_FLOOR..=THRESHOLD_CEILING).contains(&t), "got {t}");
        }
    }

    #[test]
    fn ewma_follows_the_distance_stream() {
        let mut threshold = AdaptiveThreshold::from_config(&config());
        threshold.update(0.4);
        let (mean, _, _) = threshold.state();
        assert!((mean - 0.12).abs() < 1e-9, "0.3 * 0.4 = 0.12, got {mean}");
        threshold.update(0.4);
        let (mean2, _, _) = threshold.state();
        assert!(mean2 > mean, "mean converges toward the stream value");
    }

    #[test]
    fn sensitivity_presets_order_thresholds() {
        let mut sensitive = config();
        sensitive.preset = TopicPreset::Sensitive;
        let mut relaxed = config();
        relaxed.preset = TopicPreset::Relaxed;

        let mut t_sensitive = AdaptiveThreshold::from_config(&sensitive);
        let mut t_relaxed = AdaptiveThreshold::from_config(&relaxed);
        for d in [0.2, 0.5, 0.3, 0.6, 0.25] {
            t_sensitive.update(d);
            t_relaxed.update(d);
        }
        assert!(t_sensitive.current() <= t_relaxed.current());
    }

    #[test]
    fn seeding_initializes_state() {
        let mut detector = TopicShiftDetector::new(&config());
        detector.seed(0.35, 0.01);
        let (mean, variance, _) = detector.threshold().state();
        assert_eq!(mean, 0.35);
        assert_eq!(variance, 0.01);
        // threshold = 0.35 + 1.5 * 0.1 = 0.5
        assert!((detector.threshold().current() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_vector_never_shifts() {
        let mut config = config();
        config.manual_threshold = Some(0.1);
        let mut detector = TopicShiftDetector::new(&config);
        detector.detect(&unit_vec(0));
        let result = detector.detect(&vec![0.0f32; 8]);
        assert!(!result.shifted);
        assert_eq!(result.distance, 0.0);
    }
}
