//! Running training state: best-model selection and interval averages

/// Best validation results seen so far
///
/// Accuracy decides which model is kept. Loss is only recorded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestTracker {
    accuracy: f64,
    loss: f64,
}

impl Default for BestTracker {
    fn default() -> Self {
        Self {
            accuracy: 0.0,
            loss: f64::INFINITY,
        }
    }
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one validation pass; true when the model should be saved as best
    pub fn observe(&mut self, accuracy: f64, loss: f64) -> bool {
        // NaN never replaces a finite best
        if loss < self.loss {
            self.loss = loss;
        }
        if accuracy > self.accuracy {
            self.accuracy = accuracy;
            true
        } else {
            false
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }
}

/// Averages reported every `interval` training batches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalReport {
    pub loss: f64,
    pub accuracy: f64,
}

/// Accumulates loss and matches between training log lines
#[derive(Debug, Clone)]
pub struct IntervalStats {
    interval: usize,
    batch_size: usize,
    batches: usize,
    loss_sum: f64,
    matches: usize,
}

impl IntervalStats {
    pub fn new(interval: usize, batch_size: usize) -> Self {
        Self {
            interval: interval.max(1),
            batch_size: batch_size.max(1),
            batches: 0,
            loss_sum: 0.0,
            matches: 0,
        }
    }

    /// Add one batch; returns the averages and resets once `interval` batches are in
    pub fn push(&mut self, loss: f64, matches: usize) -> Option<IntervalReport> {
        self.loss_sum += loss;
        self.matches += matches;
        self.batches += 1;

        if self.batches < self.interval {
            return None;
        }

        let interval = self.interval as f64;
        let report = IntervalReport {
            loss: self.loss_sum / interval,
            accuracy: self.matches as f64 / self.batch_size as f64 / interval,
        };
        self.reset();
        Some(report)
    }

    /// Drop a partly filled interval, e.g. at an epoch boundary
    pub fn reset(&mut self) {
        self.batches = 0;
        self.loss_sum = 0.0;
        self.matches = 0;
    }
}
