//! The closed registry of CAM methods.
//!
//! Method identifiers form an enumerated set; selecting a name outside
//! the set is a configuration error reported before any computation.
//! Each identifier maps to a factory producing a [`CamExtractor`]
//! operating through a scoped [`CamContext`].

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use xrview_model::ChestClassifier;

use crate::attribution::{normalize_unit, upsample_nearest};
use crate::context::CamContext;
use crate::error::{ExplainError, Result};

const EPS: f32 = 1e-8;

/// Supported attribution methods.
///
/// The set is closed: these eight identifiers are the ones the review
/// grid can render, and [`CamMethod::from_name`] rejects everything
/// else up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CamMethod {
    /// Gradient-weighted Class Activation Mapping.
    #[serde(rename = "GradCAM")]
    GradCam,
    /// GradCAM++ (higher-order gradient weighting).
    #[serde(rename = "GradCAMpp")]
    GradCamPp,
    /// GradCAM++ with gradients averaged over noisy inputs.
    #[serde(rename = "SmoothGradCAMpp")]
    SmoothGradCamPp,
    /// Axiom-based GradCAM.
    #[serde(rename = "XGradCAM")]
    XGradCam,
    /// Per-location gradient weighting.
    #[serde(rename = "LayerCAM")]
    LayerCam,
    /// Score-weighted CAM (mask-and-reforward, gradient-free).
    #[serde(rename = "ScoreCAM")]
    ScoreCam,
    /// Smoothed ScoreCAM.
    #[serde(rename = "SSCAM")]
    SsCam,
    /// Integration-based ScoreCAM.
    #[serde(rename = "ISCAM")]
    IsCam,
}

impl CamMethod {
    /// All supported methods, in the default grid order.
    pub const ALL: [CamMethod; 8] = [
        CamMethod::GradCam,
        CamMethod::GradCamPp,
        CamMethod::SmoothGradCamPp,
        CamMethod::XGradCam,
        CamMethod::LayerCam,
        CamMethod::ScoreCam,
        CamMethod::SsCam,
        CamMethod::IsCam,
    ];

    /// The registry identifier of this method.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CamMethod::GradCam => "GradCAM",
            CamMethod::GradCamPp => "GradCAMpp",
            CamMethod::SmoothGradCamPp => "SmoothGradCAMpp",
            CamMethod::XGradCam => "XGradCAM",
            CamMethod::LayerCam => "LayerCAM",
            CamMethod::ScoreCam => "ScoreCAM",
            CamMethod::SsCam => "SSCAM",
            CamMethod::IsCam => "ISCAM",
        }
    }

    /// Look up a method by its registry identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::UnknownMethod`] for identifiers outside
    /// the closed set.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|m| m.name() == name)
            .copied()
            .ok_or_else(|| ExplainError::UnknownMethod(name.to_string()))
    }

    /// Build the extractor implementing this method.
    #[must_use]
    pub fn extractor<B: AutodiffBackend, M: ChestClassifier<B>>(
        &self,
    ) -> Box<dyn CamExtractor<B, M>> {
        Box::new(MethodExtractor { method: *self })
    }
}

impl fmt::Display for CamMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CamMethod {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Capability interface every attribution method satisfies.
///
/// `compute` returns one raw map per target layer, in target-layer
/// order; fusion of multiple maps is the caller's step.
pub trait CamExtractor<B: AutodiffBackend, M: ChestClassifier<B>> {
    /// Display name for the grid cell.
    fn name(&self) -> String;

    /// Compute raw attribution maps for `class_id` through the scoped
    /// capture in `ctx`.
    fn compute(
        &self,
        ctx: &CamContext<'_, B, M>,
        class_id: usize,
    ) -> Result<Vec<Tensor<B::InnerBackend, 2>>>;
}

struct MethodExtractor {
    method: CamMethod,
}

impl<B: AutodiffBackend, M: ChestClassifier<B>> CamExtractor<B, M> for MethodExtractor {
    fn name(&self) -> String {
        self.method.name().to_string()
    }

    fn compute(
        &self,
        ctx: &CamContext<'_, B, M>,
        class_id: usize,
    ) -> Result<Vec<Tensor<B::InnerBackend, 2>>> {
        match self.method {
            CamMethod::GradCam => gradient_cams(ctx, class_id, GradWeighting::Mean),
            CamMethod::GradCamPp => gradient_cams(ctx, class_id, GradWeighting::PlusPlus),
            CamMethod::XGradCam => gradient_cams(ctx, class_id, GradWeighting::Axiom),
            CamMethod::LayerCam => layer_cams(ctx, class_id),
            CamMethod::SmoothGradCamPp => smooth_grad_cams(ctx, class_id, 4, 0.3),
            CamMethod::ScoreCam => score_cams(ctx, class_id, ScoreVariant::Plain),
            CamMethod::SsCam => score_cams(
                ctx,
                class_id,
                ScoreVariant::Smooth {
                    n_samples: 4,
                    sigma: 0.3,
                },
            ),
            CamMethod::IsCam => score_cams(ctx, class_id, ScoreVariant::Integrated { n_steps: 4 }),
        }
    }
}

enum GradWeighting {
    Mean,
    PlusPlus,
    Axiom,
}

enum ScoreVariant {
    Plain,
    Smooth { n_samples: usize, sigma: f32 },
    Integrated { n_steps: usize },
}

/// Sum the channel dimension of a weighted activation stack down to a
/// single spatial map.
fn collapse<B: Backend>(weighted: Tensor<B, 4>) -> Tensor<B, 2> {
    let summed = weighted.sum_dim(1).clamp_min(0.0);
    let [_, _, h, w] = summed.dims();
    summed.reshape([h, w])
}

fn channel_weights<B: Backend>(
    weighting: &GradWeighting,
    activations: &Tensor<B, 4>,
    gradients: &Tensor<B, 4>,
) -> Tensor<B, 4> {
    match weighting {
        // Global average pool the gradients: (1, C, H, W) -> (1, C, 1, 1).
        GradWeighting::Mean => gradients.clone().mean_dim(3).mean_dim(2),
        GradWeighting::PlusPlus => {
            let g2 = gradients.clone().powf_scalar(2.0);
            let g3 = g2.clone() * gradients.clone();
            let denom =
                g2.clone() * 2.0 + (activations.clone() * g3).sum_dim(3).sum_dim(2) + EPS;
            let alpha = g2 / denom;
            (alpha * gradients.clone().clamp_min(0.0))
                .sum_dim(3)
                .sum_dim(2)
        }
        GradWeighting::Axiom => {
            let denom = activations.clone().sum_dim(3).sum_dim(2) + EPS;
            (gradients.clone() * activations.clone() / denom)
                .sum_dim(3)
                .sum_dim(2)
        }
    }
}

fn gradient_cams<B: AutodiffBackend, M: ChestClassifier<B>>(
    ctx: &CamContext<'_, B, M>,
    class_id: usize,
    weighting: GradWeighting,
) -> Result<Vec<Tensor<B::InnerBackend, 2>>> {
    let grads = ctx.gradients_for(class_id)?;
    Ok(ctx
        .activations()
        .into_iter()
        .zip(grads.activation_grads)
        .map(|(acts, grad)| {
            let weights = channel_weights(&weighting, &acts, &grad);
            collapse(acts * weights)
        })
        .collect())
}

fn layer_cams<B: AutodiffBackend, M: ChestClassifier<B>>(
    ctx: &CamContext<'_, B, M>,
    class_id: usize,
) -> Result<Vec<Tensor<B::InnerBackend, 2>>> {
    let grads = ctx.gradients_for(class_id)?;
    Ok(ctx
        .activations()
        .into_iter()
        .zip(grads.activation_grads)
        .map(|(acts, grad)| collapse(acts * grad.clamp_min(0.0)))
        .collect())
}

fn smooth_grad_cams<B: AutodiffBackend, M: ChestClassifier<B>>(
    ctx: &CamContext<'_, B, M>,
    class_id: usize,
    n_samples: usize,
    sigma: f32,
) -> Result<Vec<Tensor<B::InnerBackend, 2>>> {
    let grads = ctx.smoothed_gradients_for(class_id, n_samples, sigma)?;
    Ok(ctx
        .activations()
        .into_iter()
        .zip(grads)
        .map(|(acts, grad)| {
            let weights = channel_weights(&GradWeighting::PlusPlus, &acts, &grad);
            collapse(acts * weights)
        })
        .collect())
}

/// Score-based CAM family: each activation channel becomes an input
/// mask; the class score of the masked re-forward weights the channel.
fn score_cams<B: AutodiffBackend, M: ChestClassifier<B>>(
    ctx: &CamContext<'_, B, M>,
    class_id: usize,
    variant: ScoreVariant,
) -> Result<Vec<Tensor<B::InnerBackend, 2>>> {
    let input = ctx.input_detached();
    let [_, _, ih, iw] = input.dims();
    let device = input.device();

    let mut out = Vec::new();
    for acts in ctx.activations() {
        let [_, channels, h, w] = acts.dims();

        let mut weights = Vec::with_capacity(channels);
        for c in 0..channels {
            let channel_map = acts.clone().narrow(1, c, 1).reshape([h, w]);
            let mask = normalize_unit(upsample_nearest(channel_map, [ih, iw]))
                .reshape([1, 1, ih, iw]);

            let score = match &variant {
                ScoreVariant::Plain => masked_score(ctx, &input, &mask, class_id)?,
                ScoreVariant::Smooth { n_samples, sigma } => {
                    let n = (*n_samples).max(1);
                    let mut total = 0.0;
                    for _ in 0..n {
                        let noise = Tensor::<B::InnerBackend, 4>::random(
                            [1, 1, ih, iw],
                            burn::tensor::Distribution::Normal(0.0, f64::from(*sigma)),
                            &device,
                        );
                        total += masked_score(ctx, &(input.clone() + noise), &mask, class_id)?;
                    }
                    total / n as f32
                }
                ScoreVariant::Integrated { n_steps } => {
                    let n = (*n_steps).max(1);
                    let mut total = 0.0;
                    for step in 1..=n {
                        let scaled = mask.clone() * (step as f32 / n as f32);
                        total += masked_score(ctx, &input, &scaled, class_id)?;
                    }
                    total / n as f32
                }
            };
            weights.push(score);
        }

        let weights = Tensor::<B::InnerBackend, 4>::from_data(
            TensorData::new(weights, [1, channels, 1, 1]),
            &device,
        );
        out.push(collapse(acts * weights));
    }
    Ok(out)
}

fn masked_score<B: AutodiffBackend, M: ChestClassifier<B>>(
    ctx: &CamContext<'_, B, M>,
    input: &Tensor<B::InnerBackend, 4>,
    mask: &Tensor<B::InnerBackend, 4>,
    class_id: usize,
) -> Result<f32> {
    let scores = ctx.forward_scores(input.clone() * mask.clone())?;
    scores
        .get(class_id)
        .copied()
        .ok_or(ExplainError::ClassOutOfRange {
            class_id,
            n_classes: scores.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use xrview_model::{ConvClassifier, ConvClassifierConfig};

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_registry_is_closed() {
        assert_eq!(CamMethod::ALL.len(), 8);
        for method in CamMethod::ALL {
            assert_eq!(CamMethod::from_name(method.name()).unwrap(), method);
        }
    }

    #[test]
    fn test_unknown_method_rejected() {
        let result = CamMethod::from_name("EigenCAM");
        assert!(matches!(result, Err(ExplainError::UnknownMethod(name)) if name == "EigenCAM"));
    }

    #[test]
    fn test_from_str_round_trip() {
        let method: CamMethod = "SmoothGradCAMpp".parse().unwrap();
        assert_eq!(method, CamMethod::SmoothGradCamPp);
    }

    #[test]
    fn test_serde_uses_registry_names() {
        let json = serde_json::to_string(&CamMethod::GradCamPp).unwrap();
        assert_eq!(json, "\"GradCAMpp\"");
        let back: CamMethod = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CamMethod::GradCamPp);
    }

    fn context_fixture() -> (ConvClassifier<TestBackend>, Tensor<TestBackend, 4>) {
        let device = Default::default();
        let model = ConvClassifierConfig::new(3)
            .with_n_filters(4)
            .with_input_size(16)
            .init(&device);
        let input = Tensor::random(
            [1, 1, 16, 16],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        (model, input)
    }

    #[test]
    fn test_gradient_methods_produce_spatial_maps() {
        let (model, input) = context_fixture();

        for method in [
            CamMethod::GradCam,
            CamMethod::GradCamPp,
            CamMethod::XGradCam,
            CamMethod::LayerCam,
        ] {
            let ctx = CamContext::acquire(&model, input.clone()).expect("acquire");
            let extractor = method.extractor::<TestBackend, _>();
            let maps = extractor.compute(&ctx, 0).expect("compute");

            assert_eq!(maps.len(), 1, "{method}");
            // 16 -> 8 -> 4 -> 2 through three stride-2 blocks.
            assert_eq!(maps[0].dims(), [2, 2], "{method}");
        }
    }

    #[test]
    fn test_score_method_produces_spatial_map() {
        let (model, input) = context_fixture();
        let ctx = CamContext::acquire(&model, input).expect("acquire");

        let extractor = CamMethod::ScoreCam.extractor::<TestBackend, _>();
        let maps = extractor.compute(&ctx, 1).expect("compute");
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].dims(), [2, 2]);
    }

    #[test]
    fn test_compute_rejects_bad_class() {
        let (model, input) = context_fixture();
        let ctx = CamContext::acquire(&model, input).expect("acquire");

        let extractor = CamMethod::GradCam.extractor::<TestBackend, _>();
        assert!(extractor.compute(&ctx, 99).is_err());
    }
}
