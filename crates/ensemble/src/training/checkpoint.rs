//! Save and restore trained ensembles.
//!
//! A checkpoint directory holds `model.mpk` (burn named MessagePack record)
//! and `meta.json` describing the architecture needed to rebuild the module.

use std::path::Path;

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use crate::key::PrngKey;
use crate::model::ensemble::{EnsembleBlock, EnsembleConfig, EnsemblePredictor};
use crate::training::metrics::LossHistory;

/// Metadata saved alongside the model weights.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    pub d_input: usize,
    pub hidden_shape: Vec<usize>,
    pub model_number: usize,
    pub steps: usize,
    pub final_train_loss: Option<f64>,
    pub final_validation_loss: Option<f64>,
}

impl CheckpointMeta {
    pub fn ensemble_config(&self) -> EnsembleConfig {
        EnsembleConfig::new()
            .with_hidden_shape(self.hidden_shape.clone())
            .with_model_number(self.model_number)
    }
}

/// Write model weights and metadata into `dir`, creating it if needed.
///
/// The architecture in `meta.json` is read from `model` itself.
pub fn save_checkpoint<B: Backend>(
    dir: &Path,
    model: &EnsembleBlock<B>,
    history: &LossHistory,
) -> anyhow::Result<CheckpointMeta> {
    std::fs::create_dir_all(dir)?;
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    let model_path = dir.join("model");
    model
        .clone()
        .save_file(model_path, &recorder)
        .map_err(|e| anyhow::anyhow!("Failed to save model to {}: {e}", dir.display()))?;

    let meta = CheckpointMeta {
        d_input: model.d_input(),
        hidden_shape: model.hidden_shape(),
        model_number: model.model_number(),
        steps: history.len(),
        final_train_loss: history.train.last().copied(),
        final_validation_loss: history.validation.last().copied(),
    };
    let meta_path = dir.join("meta.json");
    serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;

    tracing::info!(dir = %dir.display(), steps = meta.steps, "Checkpoint saved (model + meta)");
    Ok(meta)
}

/// Load an ensemble saved by [`save_checkpoint`].
///
/// Creates a fresh module from the saved architecture, then loads the
/// weights on top.
pub fn load_checkpoint<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> anyhow::Result<(EnsembleBlock<B>, CheckpointMeta)> {
    let meta_path = dir.join("meta.json");
    let meta: CheckpointMeta = serde_json::from_reader(
        std::fs::File::open(&meta_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?,
    )
    .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))?;

    let model = meta
        .ensemble_config()
        .init_with_input_dim::<B>(PrngKey::new(0), meta.d_input, device)
        .map_err(|e| anyhow::anyhow!("Invalid architecture in {}: {e}", meta_path.display()))?
        .load_file(
            dir.join("model"),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load checkpoint from {}: {e}", dir.display()))?;

    tracing::info!(dir = %dir.display(), d_input = meta.d_input, "Loaded ensemble checkpoint");
    Ok((model, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::tensor_to_vec;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let device = Default::default();
        let config = EnsembleConfig::new()
            .with_hidden_shape(vec![6])
            .with_model_number(3);
        let model = config.init_with_input_dim::<TestBackend>(PrngKey::new(21), 4, &device).unwrap();

        let mut history = LossHistory::new(2);
        history.push(1.5, 2.0);
        history.push(1.25, 1.75);

        let saved = save_checkpoint(tmp.path(), &model, &history).unwrap();
        assert_eq!(saved.steps, 2);
        assert_eq!(saved.final_train_loss, Some(1.25));
        assert_eq!(saved.hidden_shape, vec![6]);

        let (loaded, meta) = load_checkpoint::<TestBackend>(tmp.path(), &device).unwrap();
        assert_eq!(meta, saved);
        assert_eq!(loaded.d_input(), 4);
        assert_eq!(loaded.model_number(), 3);

        let input = Tensor::<TestBackend, 2>::random([5, 4], Distribution::Normal(0.0, 1.0), &device);
        let expected = tensor_to_vec(model.predict(input.clone()).unwrap());
        let actual = tensor_to_vec(loaded.predict(input).unwrap());
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_meta_architecture_comes_from_model() {
        let tmp = tempfile::TempDir::new().unwrap();
        let device = Default::default();
        let model = EnsembleConfig::new()
            .with_hidden_shape(vec![5, 3])
            .with_model_number(2)
            .init_with_input_dim::<TestBackend>(PrngKey::new(8), 4, &device)
            .unwrap();

        let saved = save_checkpoint(tmp.path(), &model, &LossHistory::new(1)).unwrap();
        assert_eq!(saved.hidden_shape, vec![5, 3]);
        assert_eq!(saved.model_number, 2);
        assert_eq!(saved.d_input, 4);

        let (loaded, _) = load_checkpoint::<TestBackend>(tmp.path(), &device).unwrap();
        assert_eq!(loaded.hidden_shape(), vec![5, 3]);
    }

    #[test]
    fn test_load_missing_checkpoint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = load_checkpoint::<TestBackend>(tmp.path(), &Default::default());
        assert!(result.is_err());
    }
}
