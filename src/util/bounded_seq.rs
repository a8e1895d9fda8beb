use std::collections::VecDeque;

/// A moving window over the most recent samples of some measurement.
/// Older samples fall out once the window is full.
#[derive(Debug, Clone)]
pub struct BoundedSeq {
    window: usize,
    samples: VecDeque<f64>,
    sum: f64,
}

impl BoundedSeq {
    pub fn new(window: usize) -> Self {
        debug_assert!(window > 0);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            sum: 0.0,
        }
    }

    pub fn add(&mut self, sample: f64) {
        if self.samples.len() == self.window {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
    }

    /// The average of the samples in the window, or 0 with no samples.
    pub fn avg(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn max(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
    }
}
