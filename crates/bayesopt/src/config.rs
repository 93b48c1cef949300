//! TOML config loading for a design round.
//!
//! Deserializes a file with optional `[ensemble]`, `[training]`,
//! `[acquisition]` and `[optimizer]` sections. Every field is an override on
//! top of the corresponding burn `Config` defaults.

use std::path::Path;

use ensemble::{EnsembleConfig, PrngKey, TrainingConfig, VarianceGuard};
use serde::Deserialize;

use crate::acquisition::AcquisitionConfig;
use crate::optimizer::EmbeddingOptimizerConfig;

/// Top-level structure of a design TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignToml {
    #[serde(default)]
    pub ensemble: EnsembleOverrides,
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub acquisition: AcquisitionOverrides,
    #[serde(default)]
    pub optimizer: OptimizerOverrides,
}

/// Variance guard as written in TOML, e.g. `{ kind = "floor", min = 1e-6 }`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum GuardSetting {
    Raw,
    Abs,
    Floor { min: f64 },
}

impl From<GuardSetting> for VarianceGuard {
    fn from(setting: GuardSetting) -> Self {
        match setting {
            GuardSetting::Raw => VarianceGuard::Raw,
            GuardSetting::Abs => VarianceGuard::Abs,
            GuardSetting::Floor { min } => VarianceGuard::Floor { min },
        }
    }
}

/// Optional overrides for `EnsembleConfig`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsembleOverrides {
    pub hidden_shape: Option<Vec<usize>>,
    pub model_number: Option<usize>,
}

/// Optional overrides for `TrainingConfig`, plus the training seed.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingOverrides {
    pub lr: Option<f64>,
    pub beta_1: Option<f64>,
    pub beta_2: Option<f64>,
    /// Adam epsilon.
    pub epsilon: Option<f64>,
    pub epochs: Option<usize>,
    pub tile: Option<usize>,
    /// FGSM step size.
    pub adversarial_epsilon: Option<f64>,
    pub variance_guard: Option<GuardSetting>,
    pub log_interval: Option<usize>,
    pub max_steps: Option<usize>,
    /// Seed for initialization and shuffling. Defaults to 0.
    pub seed: Option<u64>,
}

/// Optional overrides for `AcquisitionConfig`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquisitionOverrides {
    pub xi: Option<f64>,
    pub variance_guard: Option<GuardSetting>,
    pub strict_variance: Option<bool>,
}

/// Optional overrides for `EmbeddingOptimizerConfig`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizerOverrides {
    pub embedding_dim: Option<usize>,
    pub num_steps: Option<usize>,
    pub lr: Option<f64>,
    pub beta_1: Option<f64>,
    pub beta_2: Option<f64>,
    pub epsilon: Option<f64>,
    pub seed: Option<u64>,
}

/// Load and deserialize a `DesignToml` from a TOML file.
pub fn load_design_toml(path: &Path) -> anyhow::Result<DesignToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: DesignToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {e}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded design config");
    Ok(config)
}

impl DesignToml {
    pub fn ensemble_config(&self) -> EnsembleConfig {
        let mut config = EnsembleConfig::new();
        if let Some(shape) = &self.ensemble.hidden_shape {
            config.hidden_shape = shape.clone();
        }
        if let Some(n) = self.ensemble.model_number {
            config.model_number = n;
        }
        config
    }

    pub fn training_config(&self) -> TrainingConfig {
        let o = &self.training;
        let mut config = TrainingConfig::new();
        if let Some(v) = o.lr {
            config.lr = v;
        }
        if let Some(v) = o.beta_1 {
            config.beta_1 = v;
        }
        if let Some(v) = o.beta_2 {
            config.beta_2 = v;
        }
        if let Some(v) = o.epsilon {
            config.epsilon = v;
        }
        if let Some(v) = o.epochs {
            config.epochs = v;
        }
        if let Some(v) = o.tile {
            config.tile = v;
        }
        if let Some(v) = o.adversarial_epsilon {
            config.loss.epsilon = v;
        }
        if let Some(guard) = &o.variance_guard {
            config.loss.variance_guard = guard.clone().into();
        }
        if let Some(v) = o.log_interval {
            config.log_interval = v;
        }
        if o.max_steps.is_some() {
            config.max_steps = o.max_steps;
        }
        config
    }

    /// Key for ensemble initialization and shuffling.
    pub fn training_key(&self) -> PrngKey {
        PrngKey::new(self.training.seed.unwrap_or(0))
    }

    pub fn acquisition_config(&self) -> AcquisitionConfig {
        let o = &self.acquisition;
        let mut config = AcquisitionConfig::new();
        if let Some(v) = o.xi {
            config.xi = v;
        }
        if let Some(guard) = &o.variance_guard {
            config.variance_guard = guard.clone().into();
        }
        if let Some(v) = o.strict_variance {
            config.strict_variance = v;
        }
        config
    }

    pub fn optimizer_config(&self) -> EmbeddingOptimizerConfig {
        let o = &self.optimizer;
        let mut config = EmbeddingOptimizerConfig::new().with_acquisition(self.acquisition_config());
        if o.embedding_dim.is_some() {
            config.embedding_dim = o.embedding_dim;
        }
        if let Some(v) = o.num_steps {
            config.num_steps = v;
        }
        if let Some(v) = o.lr {
            config.lr = v;
        }
        if let Some(v) = o.beta_1 {
            config.beta_1 = v;
        }
        if let Some(v) = o.beta_2 {
            config.beta_2 = v;
        }
        if let Some(v) = o.epsilon {
            config.epsilon = v;
        }
        if let Some(v) = o.seed {
            config.seed = v;
        }
        config
    }

    /// Reject settings that cannot train or propose, and log warnings for
    /// settings that are accepted but likely mistakes.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.ensemble_config().check()?;
        if self.training.tile == Some(0) {
            anyhow::bail!("training.tile must be > 0");
        }
        if self.optimizer.embedding_dim == Some(0) {
            anyhow::bail!("optimizer.embedding_dim must be > 0");
        }

        for (section, beta) in [
            ("training.beta_1", self.training.beta_1),
            ("training.beta_2", self.training.beta_2),
            ("optimizer.beta_1", self.optimizer.beta_1),
            ("optimizer.beta_2", self.optimizer.beta_2),
        ] {
            if let Some(b) = beta {
                if !(0.0..1.0).contains(&b) {
                    tracing::warn!(section, value = b, "Adam decay outside [0, 1)");
                }
            }
        }
        if self.training.epochs == Some(0) {
            tracing::warn!("training.epochs = 0; the ensemble will not be trained");
        }
        if self.training.variance_guard == Some(GuardSetting::Raw) {
            tracing::warn!("training.variance_guard = raw; negative spreads give NaN losses");
        }
        Ok(())
    }
}
