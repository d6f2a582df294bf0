//! The explanation aggregator: one overlay per configured method,
//! assembled into a comparison grid.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use xrview_model::ChestClassifier;

use crate::attribution::{fuse_cams, AttributionMap};
use crate::context::CamContext;
use crate::error::{ExplainError, Result};
use crate::methods::{CamExtractor, CamMethod};
use crate::overlay::{overlay_mask, placeholder_cell};

/// Configuration for [`ExplanationAggregator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Methods to compute, in grid order.
    pub methods: Vec<CamMethod>,
    /// Blending factor: weight of the original image in the overlay.
    pub alpha: f32,
    /// Cells per grid row.
    pub row_width: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            methods: CamMethod::ALL.to_vec(),
            alpha: 0.7,
            row_width: 3,
        }
    }
}

/// One cell of the comparison grid.
#[derive(Debug, Clone)]
pub struct GridCell {
    /// Method name labeling the cell.
    pub method_name: String,
    /// The rendered overlay, or `None` when the method failed and the
    /// cell renders as the explicit "unavailable" placeholder.
    pub overlay: Option<RgbImage>,
}

impl GridCell {
    /// Whether the method produced an overlay.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.overlay.is_some()
    }
}

/// The computed grid for one (image, finding) pair.
///
/// Always holds exactly one cell per configured method, whether or not
/// the method succeeded. Transient: recomputed on demand, never
/// persisted.
#[derive(Debug, Clone)]
pub struct ExplanationGrid {
    cells: Vec<GridCell>,
    row_width: usize,
}

impl ExplanationGrid {
    /// The cells, in configured method order.
    #[must_use]
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Number of cells (= number of configured methods).
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of cells whose method succeeded.
    #[must_use]
    pub fn available(&self) -> usize {
        self.cells.iter().filter(|c| c.is_available()).count()
    }

    /// Number of grid rows under the configured row width.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.cells.len().div_ceil(self.row_width)
    }

    /// Compose the cells into a single image, row-major, with
    /// placeholder cells where methods failed.
    #[must_use]
    pub fn compose(&self) -> RgbImage {
        let (cell_w, cell_h) = self
            .cells
            .iter()
            .find_map(|c| c.overlay.as_ref())
            .map_or((224, 224), |img| (img.width(), img.height()));

        let cols = self.row_width.min(self.cells.len()).max(1) as u32;
        let rows = self.rows().max(1) as u32;
        let mut canvas = RgbImage::new(cols * cell_w, rows * cell_h);

        for (idx, cell) in self.cells.iter().enumerate() {
            let col = (idx % self.row_width) as u32;
            let row = (idx / self.row_width) as u32;
            let placeholder;
            let tile = match &cell.overlay {
                Some(img) => img,
                None => {
                    placeholder = placeholder_cell(cell_w, cell_h);
                    &placeholder
                }
            };
            image::imageops::overlay(
                &mut canvas,
                tile,
                i64::from(col * cell_w),
                i64::from(row * cell_h),
            );
        }
        canvas
    }
}

/// Computes one fused overlay per configured method for a fixed
/// (model, input, display image, target class), isolating per-method
/// failures.
pub struct ExplanationAggregator {
    config: AggregatorConfig,
}

impl ExplanationAggregator {
    /// Create an aggregator.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::InvalidConfig`] when no methods are
    /// configured, the row width is zero, or alpha is outside [0, 1].
    pub fn new(config: AggregatorConfig) -> Result<Self> {
        if config.methods.is_empty() {
            return Err(ExplainError::InvalidConfig(
                "no attribution methods configured".into(),
            ));
        }
        if config.row_width == 0 {
            return Err(ExplainError::InvalidConfig("row width must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&config.alpha) {
            return Err(ExplainError::InvalidConfig(format!(
                "alpha {} outside [0, 1]",
                config.alpha
            )));
        }
        Ok(Self { config })
    }

    /// The aggregator configuration.
    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Compute the grid for one (image, finding) pair with the
    /// configured methods.
    ///
    /// Never fails as a whole: a method that errors yields an
    /// unavailable cell and the remaining methods still run.
    pub fn compute_grid<B: AutodiffBackend, M: ChestClassifier<B>>(
        &self,
        model: &M,
        input: &Tensor<B, 4>,
        display: &RgbImage,
        class_id: usize,
    ) -> ExplanationGrid {
        let extractors: Vec<Box<dyn CamExtractor<B, M>>> =
            self.config.methods.iter().map(|m| m.extractor()).collect();
        self.compute_grid_with(&extractors, model, input, display, class_id)
    }

    /// Compute the grid with explicit extractors.
    ///
    /// This is the seam the integration tests use to inject a
    /// deterministically failing method.
    pub fn compute_grid_with<B: AutodiffBackend, M: ChestClassifier<B>>(
        &self,
        extractors: &[Box<dyn CamExtractor<B, M>>],
        model: &M,
        input: &Tensor<B, 4>,
        display: &RgbImage,
        class_id: usize,
    ) -> ExplanationGrid {
        let cells = extractors
            .iter()
            .map(|extractor| {
                let name = extractor.name();
                match self.compute_cell(extractor.as_ref(), model, input, display, class_id) {
                    Ok(overlay) => {
                        debug!(method = %name, class_id, "attribution overlay computed");
                        GridCell {
                            method_name: name,
                            overlay: Some(overlay),
                        }
                    }
                    Err(error) => {
                        warn!(
                            method = %name,
                            class_id,
                            %error,
                            "attribution method failed; rendering placeholder cell"
                        );
                        GridCell {
                            method_name: name,
                            overlay: None,
                        }
                    }
                }
            })
            .collect();

        ExplanationGrid {
            cells,
            row_width: self.config.row_width,
        }
    }

    fn compute_cell<B: AutodiffBackend, M: ChestClassifier<B>>(
        &self,
        extractor: &dyn CamExtractor<B, M>,
        model: &M,
        input: &Tensor<B, 4>,
        display: &RgbImage,
        class_id: usize,
    ) -> Result<RgbImage> {
        // Fresh capture per method: the context's hooks live only for
        // this computation and are released before the next method's
        // forward pass runs.
        let ctx = CamContext::acquire(model, input.clone())?;
        let maps = extractor.compute(&ctx, class_id)?;
        drop(ctx);

        let fused = fuse_cams(maps)?;
        let map = AttributionMap::new(fused, class_id).normalize();
        overlay_mask(display, &map.to_host()?, self.config.alpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use xrview_model::{ConvClassifier, ConvClassifierConfig};

    type TestBackend = Autodiff<NdArray>;

    struct FailingExtractor;

    impl<B: AutodiffBackend, M: ChestClassifier<B>> CamExtractor<B, M> for FailingExtractor {
        fn name(&self) -> String {
            "Failing".to_string()
        }

        fn compute(
            &self,
            _ctx: &CamContext<'_, B, M>,
            _class_id: usize,
        ) -> crate::Result<Vec<Tensor<B::InnerBackend, 2>>> {
            Err(ExplainError::Computation("simulated fault".into()))
        }
    }

    fn fixture() -> (
        ConvClassifier<TestBackend>,
        Tensor<TestBackend, 4>,
        RgbImage,
    ) {
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
        let display = RgbImage::from_pixel(16, 16, image::Rgb([120, 120, 120]));
        (model, input, display)
    }

    #[test]
    fn test_rejects_empty_methods() {
        let config = AggregatorConfig {
            methods: vec![],
            ..AggregatorConfig::default()
        };
        assert!(matches!(
            ExplanationAggregator::new(config),
            Err(ExplainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_alpha() {
        let config = AggregatorConfig {
            alpha: 1.5,
            ..AggregatorConfig::default()
        };
        assert!(ExplanationAggregator::new(config).is_err());
    }

    #[test]
    fn test_grid_has_one_cell_per_method() {
        let (model, input, display) = fixture();
        let config = AggregatorConfig {
            methods: vec![CamMethod::GradCam, CamMethod::LayerCam],
            ..AggregatorConfig::default()
        };
        let aggregator = ExplanationAggregator::new(config).unwrap();

        let grid = aggregator.compute_grid(&model, &input, &display, 0);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.available(), 2);
        assert_eq!(grid.cells()[0].method_name, "GradCAM");
        assert_eq!(grid.cells()[1].method_name, "LayerCAM");
    }

    #[test]
    fn test_failure_is_isolated_to_its_cell() {
        let (model, input, display) = fixture();
        let aggregator = ExplanationAggregator::new(AggregatorConfig::default()).unwrap();

        let extractors: Vec<Box<dyn CamExtractor<TestBackend, ConvClassifier<TestBackend>>>> = vec![
            CamMethod::GradCam.extractor(),
            Box::new(FailingExtractor),
            CamMethod::LayerCam.extractor(),
        ];

        let grid = aggregator.compute_grid_with(&extractors, &model, &input, &display, 1);

        assert_eq!(grid.len(), 3);
        assert_eq!(grid.available(), 2);
        assert!(grid.cells()[0].is_available());
        assert!(!grid.cells()[1].is_available());
        assert!(grid.cells()[2].is_available());
    }

    #[test]
    fn test_all_methods_failing_still_yields_full_grid() {
        let (model, input, display) = fixture();
        let aggregator = ExplanationAggregator::new(AggregatorConfig::default()).unwrap();

        let extractors: Vec<Box<dyn CamExtractor<TestBackend, ConvClassifier<TestBackend>>>> =
            vec![Box::new(FailingExtractor), Box::new(FailingExtractor)];

        let grid = aggregator.compute_grid_with(&extractors, &model, &input, &display, 0);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.available(), 0);
    }

    #[test]
    fn test_bad_class_marks_all_cells_unavailable() {
        let (model, input, display) = fixture();
        let config = AggregatorConfig {
            methods: vec![CamMethod::GradCam],
            ..AggregatorConfig::default()
        };
        let aggregator = ExplanationAggregator::new(config).unwrap();

        let grid = aggregator.compute_grid(&model, &input, &display, 42);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.available(), 0);
    }

    #[test]
    fn test_compose_geometry() {
        let (model, input, display) = fixture();
        let config = AggregatorConfig {
            methods: vec![
                CamMethod::GradCam,
                CamMethod::GradCamPp,
                CamMethod::XGradCam,
                CamMethod::LayerCam,
            ],
            alpha: 0.7,
            row_width: 3,
        };
        let aggregator = ExplanationAggregator::new(config).unwrap();

        let grid = aggregator.compute_grid(&model, &input, &display, 0);
        assert_eq!(grid.rows(), 2);

        let composed = grid.compose();
        assert_eq!(composed.width(), 3 * display.width());
        assert_eq!(composed.height(), 2 * display.height());
    }
}
