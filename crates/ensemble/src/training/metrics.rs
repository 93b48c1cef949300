//! Per-step loss history with epoch summaries and health checks.

/// Training and validation losses, one entry per training example per epoch.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LossHistory {
    /// Post-update training loss on the tiled example of each step.
    pub train: Vec<f64>,
    /// Mean validation loss after each step.
    pub validation: Vec<f64>,
    /// Steps per epoch (the number of training examples).
    pub steps_per_epoch: usize,
}

impl LossHistory {
    pub fn new(steps_per_epoch: usize) -> Self {
        Self {
            train: Vec::new(),
            validation: Vec::new(),
            steps_per_epoch,
        }
    }

    pub fn push(&mut self, train: f64, validation: f64) {
        self.train.push(train);
        self.validation.push(validation);
    }

    pub fn len(&self) -> usize {
        self.train.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }

    /// Number of epochs with at least one recorded step.
    pub fn num_epochs(&self) -> usize {
        if self.steps_per_epoch == 0 {
            return 0;
        }
        self.train.len().div_ceil(self.steps_per_epoch)
    }

    /// Mean training loss of each epoch.
    pub fn epoch_train_means(&self) -> Vec<f64> {
        chunk_means(&self.train, self.steps_per_epoch)
    }

    /// Mean validation loss of each epoch.
    pub fn epoch_validation_means(&self) -> Vec<f64> {
        chunk_means(&self.validation, self.steps_per_epoch)
    }

    /// Trailing moving average of the training loss over `window` steps.
    pub fn smoothed_train(&self, window: usize) -> Vec<f64> {
        let window = window.max(1);
        (0..self.train.len())
            .map(|i| {
                let start = (i + 1).saturating_sub(window);
                let slice = &self.train[start..=i];
                slice.iter().sum::<f64>() / slice.len() as f64
            })
            .collect()
    }

    /// Number of non-finite entries across both histories.
    pub fn non_finite_count(&self) -> usize {
        self.train
            .iter()
            .chain(&self.validation)
            .filter(|v| !v.is_finite())
            .count()
    }

    /// Return warning strings for unhealthy training runs.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let bad = self.non_finite_count();
        if bad > 0 {
            warnings.push(format!(
                "{bad} non-finite loss values; a member spread likely reached zero"
            ));
        }
        let means = self.epoch_train_means();
        if let (Some(first), Some(last)) = (means.first(), means.last()) {
            if means.len() > 1 && first.is_finite() && last.is_finite() && last > first {
                warnings.push(format!(
                    "training loss rose from {first:.4} (first epoch) to {last:.4} (last epoch)"
                ));
            }
        }
        warnings
    }
}

fn chunk_means(values: &[f64], chunk: usize) -> Vec<f64> {
    if chunk == 0 {
        return Vec::new();
    }
    values
        .chunks(chunk)
        .map(|c| c.iter().sum::<f64>() / c.len() as f64)
        .collect()
}
