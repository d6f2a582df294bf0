//! Classifier capability trait and the built-in demo CNN.

use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Capability trait for a frozen chest X-ray classifier.
///
/// Implementations must be inference-only: `forward` takes `&self` and
/// never mutates parameters, so a model is safe to share read-only
/// across reviewer sessions.
pub trait ChestClassifier<B: Backend> {
    /// Forward pass returning raw logits.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape (batch, channels, height, width)
    ///
    /// # Returns
    ///
    /// Logits tensor of shape (batch, n_classes)
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Forward pass also returning the activations of each target
    /// layer, in [`Self::target_layers`] order.
    ///
    /// Attribution methods attach here: the returned activation tensors
    /// must be part of the autodiff graph when the backend tracks
    /// gradients.
    fn forward_features(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Vec<Tensor<B, 4>>);

    /// Names of the layers attribution methods attach to.
    ///
    /// May be empty, in which case the model cannot be used for
    /// explanation (the adapter rejects it at construction).
    fn target_layers(&self) -> Vec<String>;

    /// Side length of the square model input, in pixels.
    fn input_size(&self) -> usize;

    /// Get the model name.
    fn name(&self) -> &str;
}

/// Configuration for [`ConvClassifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvClassifierConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Base filter count; later blocks use a multiple of it.
    pub n_filters: usize,
    /// Side length of the square input.
    pub input_size: usize,
}

impl ConvClassifierConfig {
    /// Create a config with default capacity for the given class count.
    #[must_use]
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            n_filters: 32,
            input_size: 224,
        }
    }

    /// Set the base filter count.
    #[must_use]
    pub fn with_n_filters(mut self, n_filters: usize) -> Self {
        self.n_filters = n_filters;
        self
    }

    /// Set the input side length.
    #[must_use]
    pub fn with_input_size(mut self, input_size: usize) -> Self {
        self.input_size = input_size;
        self
    }

    /// Initialize the model on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvClassifier<B> {
        let f = self.n_filters;
        ConvClassifier {
            conv1: Conv2dConfig::new([1, f], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv2: Conv2dConfig::new([f, 2 * f], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            conv3: Conv2dConfig::new([2 * f, 2 * f], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(2 * f, self.n_classes).init(device),
            activation: Relu::new(),
            input_size: Ignored(self.input_size),
        }
    }
}

/// A small convolutional classifier.
///
/// Three strided conv blocks, global average pooling, and a linear
/// head. Not a clinical-grade architecture; it exists so the review
/// pipeline has a working model in demos and tests. Its last conv
/// block is the attribution target layer.
#[derive(Module, Debug)]
pub struct ConvClassifier<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
    activation: Relu,
    input_size: Ignored<usize>,
}

impl<B: Backend> ConvClassifier<B> {
    fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.conv1.forward(x));
        let x = self.activation.forward(self.conv2.forward(x));
        self.activation.forward(self.conv3.forward(x))
    }

    fn head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let pooled = self.pool.forward(features);
        let [batch, channels, _, _] = pooled.dims();
        self.fc.forward(pooled.reshape([batch, channels]))
    }
}

impl<B: Backend> ChestClassifier<B> for ConvClassifier<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.features(x);
        self.head(features)
    }

    fn forward_features(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Vec<Tensor<B, 4>>) {
        let features = self.features(x);
        let logits = self.head(features.clone());
        (logits, vec![features])
    }

    fn target_layers(&self) -> Vec<String> {
        vec!["conv3".to_string()]
    }

    fn input_size(&self) -> usize {
        self.input_size.0
    }

    fn name(&self) -> &str {
        "ConvClassifier"
    }
}
