//! Scoped activation and gradient capture.
//!
//! A [`CamContext`] is the acquire-compute-release boundary around one
//! attribution computation: building it runs the forward pass and
//! captures target-layer activations; dropping it releases everything.
//! Each method gets a fresh context, so no capture state from one
//! method can leak into the forward pass of the next.

use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::Distribution;

use xrview_model::ChestClassifier;

use crate::error::{ExplainError, Result};

/// Gradients captured for one target class.
pub struct CapturedGradients<B: AutodiffBackend> {
    /// Gradients w.r.t. each target layer's activations, in
    /// target-layer order.
    pub activation_grads: Vec<Tensor<B::InnerBackend, 4>>,
    /// Gradient w.r.t. the model input, when the input was tracked.
    pub input_grad: Option<Tensor<B::InnerBackend, 4>>,
}

/// One forward pass with live captures, scoped to a single attribution
/// method's computation.
pub struct CamContext<'a, B: AutodiffBackend, M: ChestClassifier<B>> {
    model: &'a M,
    input: Tensor<B, 4>,
    logits: Tensor<B, 2>,
    activations: Vec<Tensor<B, 4>>,
}

impl<'a, B: AutodiffBackend, M: ChestClassifier<B>> CamContext<'a, B, M> {
    /// Run the forward pass and capture target-layer activations.
    ///
    /// The input is re-marked for gradient tracking here; callers pass
    /// the plain preprocessed tensor.
    ///
    /// # Errors
    ///
    /// Fails if the batch is not a single image or the model captured
    /// no activations.
    pub fn acquire(model: &'a M, input: Tensor<B, 4>) -> Result<Self> {
        let [batch, _, _, _] = input.dims();
        if batch != 1 {
            return Err(ExplainError::Computation(format!(
                "expected a single image, got batch of {batch}"
            )));
        }

        let input = input.require_grad();
        let (logits, activations) = model.forward_features(input.clone());
        if activations.is_empty() {
            return Err(ExplainError::Computation(
                "model captured no target-layer activations".into(),
            ));
        }

        Ok(Self {
            model,
            input,
            logits,
            activations,
        })
    }

    /// Number of classes the captured forward pass emitted.
    pub fn n_classes(&self) -> usize {
        self.logits.dims()[1]
    }

    /// Captured activations, detached from the autodiff graph.
    pub fn activations(&self) -> Vec<Tensor<B::InnerBackend, 4>> {
        self.activations.iter().map(|a| a.clone().inner()).collect()
    }

    /// The preprocessed input, detached from the autodiff graph.
    pub fn input_detached(&self) -> Tensor<B::InnerBackend, 4> {
        self.input.clone().inner()
    }

    /// Sigmoid probability of one class from the captured forward pass.
    pub fn class_score(&self, class_id: usize) -> Result<f32> {
        self.check_class(class_id)?;
        let prob = sigmoid(self.logits.clone())
            .inner()
            .slice([0..1, class_id..class_id + 1]);
        Ok(prob.into_scalar().elem())
    }

    /// Backward pass for one class, capturing gradients at the target
    /// layers (and the input, if tracked).
    pub fn gradients_for(&self, class_id: usize) -> Result<CapturedGradients<B>> {
        self.check_class(class_id)?;

        let score = self
            .logits
            .clone()
            .slice([0..1, class_id..class_id + 1])
            .sum();
        let grads = score.backward();

        let activation_grads = self
            .activations
            .iter()
            .map(|a| {
                a.grad(&grads).ok_or_else(|| {
                    ExplainError::Computation(
                        "no gradient reached the target-layer activations".into(),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let input_grad = self.input.grad(&grads);

        Ok(CapturedGradients {
            activation_grads,
            input_grad,
        })
    }

    /// Activation gradients averaged over `n_samples` noisy re-runs of
    /// the forward pass (Gaussian noise with the given sigma).
    ///
    /// Each sample acquires and releases its own capture before the
    /// next sample runs.
    pub fn smoothed_gradients_for(
        &self,
        class_id: usize,
        n_samples: usize,
        sigma: f32,
    ) -> Result<Vec<Tensor<B::InnerBackend, 4>>> {
        self.check_class(class_id)?;
        let n_samples = n_samples.max(1);

        let mut acc: Option<Vec<Tensor<B::InnerBackend, 4>>> = None;
        for _ in 0..n_samples {
            let noise = Tensor::<B::InnerBackend, 4>::random(
                self.input.dims(),
                Distribution::Normal(0.0, f64::from(sigma)),
                &self.input.device(),
            );
            let noisy = Tensor::from_inner(self.input.clone().inner() + noise).require_grad();

            let (logits, activations) = self.model.forward_features(noisy);
            let score = logits.slice([0..1, class_id..class_id + 1]).sum();
            let grads = score.backward();

            let sample = activations
                .iter()
                .map(|a| {
                    a.grad(&grads).ok_or_else(|| {
                        ExplainError::Computation(
                            "no gradient reached the target-layer activations".into(),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            acc = Some(match acc {
                None => sample,
                Some(prev) => prev
                    .into_iter()
                    .zip(sample)
                    .map(|(p, s)| p + s)
                    .collect(),
            });
        }

        let scale = 1.0 / n_samples as f32;
        Ok(acc
            .unwrap_or_default()
            .into_iter()
            .map(|g| g * scale)
            .collect())
    }

    /// Inference-only forward pass for score-based methods, returning
    /// sigmoid probabilities. Used with masked inputs; captures from
    /// this context are not involved.
    pub fn forward_scores(&self, input: Tensor<B::InnerBackend, 4>) -> Result<Vec<f32>> {
        let logits = self.model.forward(Tensor::from_inner(input));
        sigmoid(logits)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ExplainError::Computation(format!("{e:?}")))
    }

    fn check_class(&self, class_id: usize) -> Result<()> {
        let n_classes = self.n_classes();
        if class_id >= n_classes {
            return Err(ExplainError::ClassOutOfRange {
                class_id,
                n_classes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use xrview_model::{ConvClassifier, ConvClassifierConfig};

    type TestBackend = Autodiff<NdArray>;

    fn model_and_input() -> (ConvClassifier<TestBackend>, Tensor<TestBackend, 4>) {
        let device = Default::default();
        let model = ConvClassifierConfig::new(3)
            .with_n_filters(4)
            .with_input_size(16)
            .init(&device);
        let input = Tensor::random([1, 1, 16, 16], Distribution::Normal(0.0, 1.0), &device);
        (model, input)
    }

    #[test]
    fn test_acquire_rejects_batches() {
        let device = Default::default();
        let model: ConvClassifier<TestBackend> = ConvClassifierConfig::new(3)
            .with_n_filters(4)
            .with_input_size(16)
            .init(&device);
        let batch = Tensor::zeros([2, 1, 16, 16], &device);

        assert!(CamContext::acquire(&model, batch).is_err());
    }

    #[test]
    fn test_gradients_reach_target_layer() {
        let (model, input) = model_and_input();
        let ctx = CamContext::acquire(&model, input).expect("acquire");

        let grads = ctx.gradients_for(1).expect("gradients");
        assert_eq!(grads.activation_grads.len(), 1);
        assert_eq!(grads.activation_grads[0].dims(), ctx.activations()[0].dims());
        assert!(grads.input_grad.is_some());
    }

    #[test]
    fn test_class_out_of_range() {
        let (model, input) = model_and_input();
        let ctx = CamContext::acquire(&model, input).expect("acquire");

        assert!(matches!(
            ctx.gradients_for(7),
            Err(ExplainError::ClassOutOfRange { class_id: 7, .. })
        ));
    }

    #[test]
    fn test_class_score_in_unit_interval() {
        let (model, input) = model_and_input();
        let ctx = CamContext::acquire(&model, input).expect("acquire");

        let score = ctx.class_score(0).expect("score");
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_smoothed_gradients_shape() {
        let (model, input) = model_and_input();
        let ctx = CamContext::acquire(&model, input).expect("acquire");

        let grads = ctx.smoothed_gradients_for(0, 2, 0.1).expect("smoothed");
        assert_eq!(grads.len(), 1);
        assert_eq!(grads[0].dims(), ctx.activations()[0].dims());
    }
}
