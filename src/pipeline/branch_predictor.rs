use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub(crate) enum PredictorKind {
    #[serde(rename = "always-taken")]
    AlwaysTaken,
    #[serde(rename = "always-not-taken")]
    AlwaysNotTaken,
    #[serde(rename = "2-bit-counter")]
    TwoBitCounter,
}

/// Branch predictor with per-site state and global accuracy counters.
/// The 2-bit counter is keyed by the branch's instruction index and
/// saturates in [0, 3]; states 2 and 3 predict taken. An unseen site
/// starts at 1 (weakly not-taken).
#[derive(Clone, Debug, Serialize)]
pub(crate) struct BranchPredictor {
    pub(crate) kind: PredictorKind,
    counters: BTreeMap<usize, u8>,
    pub(crate) correct: u64,
    pub(crate) total: u64,
}

impl BranchPredictor {
    pub(crate) fn new(kind: PredictorKind) -> BranchPredictor {
        BranchPredictor {
            kind,
            counters: BTreeMap::new(),
            correct: 0,
            total: 0,
        }
    }

    pub(crate) fn predict(&self, site: usize) -> bool {
        match self.kind {
            PredictorKind::AlwaysTaken => true,
            PredictorKind::AlwaysNotTaken => false,
            PredictorKind::TwoBitCounter => self.counter(site) >= 2,
        }
    }

    pub(crate) fn counter(&self, site: usize) -> u8 {
        self.counters.get(&site).copied().unwrap_or(1)
    }

    // Called once per resolved branch, before the counter is stepped,
    // so the accuracy bookkeeping sees the prediction that was in
    // effect when the branch executed.
    pub(crate) fn update(&mut self, site: usize, taken: bool) {
        let predicted = self.predict(site);

        self.total += 1;
        if predicted == taken {
            self.correct += 1;
        }

        if self.kind == PredictorKind::TwoBitCounter {
            let counter = self.counter(site);
            let updated = if taken {
                (counter + 1).min(3)
            } else {
                counter.saturating_sub(1)
            };
            self.counters.insert(site, updated);
        }
    }

    pub(crate) fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_bit_counter_saturates() {
        let mut predictor = BranchPredictor::new(PredictorKind::TwoBitCounter);

        assert_eq!(predictor.counter(0), 1);
        assert!(!predictor.predict(0));

        predictor.update(0, true);
        assert_eq!(predictor.counter(0), 2);
        assert!(predictor.predict(0));

        predictor.update(0, true);
        predictor.update(0, true);
        assert_eq!(predictor.counter(0), 3);

        predictor.update(0, false);
        assert_eq!(predictor.counter(0), 2);
        predictor.update(0, false);
        predictor.update(0, false);
        predictor.update(0, false);
        assert_eq!(predictor.counter(0), 0);
        assert!(!predictor.predict(0));
    }

    #[test]
    fn test_accuracy_counters() {
        let mut predictor = BranchPredictor::new(PredictorKind::AlwaysTaken);

        predictor.update(3, true);
        predictor.update(3, false);
        predictor.update(7, true);

        assert_eq!(predictor.total, 3);
        assert_eq!(predictor.correct, 2);
        assert!((predictor.accuracy() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_static_predictors() {
        let taken = BranchPredictor::new(PredictorKind::AlwaysTaken);
        let not_taken = BranchPredictor::new(PredictorKind::AlwaysNotTaken);

        assert!(taken.predict(0));
        assert!(!not_taken.predict(0));
    }
}
