//! Model adapter: preprocessing, inference, and finding selection.

use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::TensorData;
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::classifier::ChestClassifier;
use crate::error::{ModelError, Result};

/// One of the top-K predicted classes for an image, reviewed
/// individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Class id into the adapter's label set.
    pub class_id: usize,
    /// Human-readable pathology label.
    pub label: String,
    /// Model probability in [0, 1].
    pub probability: f32,
}

/// Wraps a frozen classifier with the surfaces the review pipeline
/// needs: deterministic preprocessing, inference, the ordered label
/// set, and the target-layer contract.
///
/// The adapter is read-only after construction and safe to share
/// across reviewer sessions.
pub struct ModelAdapter<B: Backend, M: ChestClassifier<B>> {
    model: M,
    labels: Vec<String>,
    device: B::Device,
}

impl<B: Backend, M: ChestClassifier<B>> ModelAdapter<B, M> {
    /// Wrap a classifier with its ordered label set.
    ///
    /// # Errors
    ///
    /// - [`ModelError::NoTargetLayer`] if the model exposes no layer
    ///   for attribution methods to attach to.
    /// - [`ModelError::InvalidLabels`] if the label set is empty.
    pub fn new(model: M, labels: Vec<String>, device: B::Device) -> Result<Self> {
        if model.target_layers().is_empty() {
            return Err(ModelError::NoTargetLayer {
                model: model.name().to_string(),
            });
        }
        if labels.is_empty() {
            return Err(ModelError::InvalidLabels("label set is empty".to_string()));
        }
        Ok(Self {
            model,
            labels,
            device,
        })
    }

    /// The wrapped classifier.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The ordered label set. Index = class id.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The device tensors are created on.
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Decode raw image bytes into a display image and a model input
    /// tensor.
    ///
    /// The display image keeps the original resolution (overlays are
    /// blended onto it). The input is resized to the model's square
    /// input size, converted to single-channel, and rescaled to the
    /// `[-1024, 1024]` value range the chest X-ray model family
    /// expects. The transform is deterministic.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<(RgbImage, Tensor<B, 4>)> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| ModelError::Decode(e.to_string()))?;
        let display = decoded.to_rgb8();

        let size = self.model.input_size();
        let gray = decoded
            .resize_exact(size as u32, size as u32, FilterType::Triangle)
            .to_luma8();

        let values: Vec<f32> = gray
            .pixels()
            .map(|p| f32::from(p.0[0]) / 255.0 * 2048.0 - 1024.0)
            .collect();
        let input = Tensor::from_data(TensorData::new(values, [1, 1, size, size]), &self.device);

        Ok((display, input))
    }

    /// Run inference, returning one probability per label.
    ///
    /// Probabilities come from a per-class sigmoid (the pathology head
    /// is multi-label), so they do not sum to one.
    pub fn infer(&self, input: Tensor<B, 4>) -> Result<Vec<f32>> {
        let [_, _, h, w] = input.dims();
        let size = self.model.input_size();
        if h != size || w != size {
            return Err(ModelError::InvalidInput {
                expected: format!("(_, _, {size}, {size})"),
                got: format!("(_, _, {h}, {w})"),
            });
        }

        let probs = sigmoid(self.model.forward(input));
        let values = probs
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ModelError::Tensor(format!("{e:?}")))?;

        if values.len() != self.labels.len() {
            return Err(ModelError::InvalidLabels(format!(
                "model emits {} outputs but {} labels configured",
                values.len(),
                self.labels.len()
            )));
        }
        Ok(values)
    }

    /// The top `k` class ids, sorted by descending probability.
    ///
    /// Ties are broken by the lower class id, so the ordering is total
    /// and reproducible: rank 0 is always the same finding for a given
    /// probability vector.
    pub fn top_k(&self, probs: &[f32], k: usize) -> Result<Vec<usize>> {
        if k > probs.len() {
            return Err(ModelError::TopK {
                k,
                n_classes: probs.len(),
            });
        }
        let mut ids: Vec<usize> = (0..probs.len()).collect();
        ids.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
        ids.truncate(k);
        Ok(ids)
    }

    /// The top `k` findings with labels and probabilities attached.
    pub fn findings(&self, probs: &[f32], k: usize) -> Result<Vec<Finding>> {
        let ids = self.top_k(probs, k)?;
        ids.into_iter()
            .map(|class_id| {
                let label = self
                    .labels
                    .get(class_id)
                    .ok_or_else(|| {
                        ModelError::InvalidLabels(format!("no label for class {class_id}"))
                    })?
                    .clone();
                Ok(Finding {
                    class_id,
                    label,
                    probability: probs[class_id],
                })
            })
            .collect()
    }
}
