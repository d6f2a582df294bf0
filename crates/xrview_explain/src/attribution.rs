//! Attribution map computation helpers.

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::{ExplainError, Result};

/// A 2-D attribution map for one (image, target class) pair.
///
/// Values are unbounded until [`AttributionMap::normalize`] is applied;
/// the overlay renderer expects normalized maps.
#[derive(Debug, Clone)]
pub struct AttributionMap<B: Backend> {
    /// The attribution values, shape (height, width).
    pub values: Tensor<B, 2>,
    /// The class the map explains.
    pub target_class: usize,
}

impl<B: Backend> AttributionMap<B> {
    /// Create a new attribution map.
    pub fn new(values: Tensor<B, 2>, target_class: usize) -> Self {
        Self {
            values,
            target_class,
        }
    }

    /// Get the (height, width) of the map.
    pub fn dims(&self) -> [usize; 2] {
        self.values.dims()
    }

    /// Normalize the attribution values to [0, 1].
    pub fn normalize(self) -> Self {
        Self {
            values: normalize_unit(self.values),
            target_class: self.target_class,
        }
    }

    /// Copy the map to host memory for rendering.
    pub fn to_host(&self) -> Result<HostMap> {
        let [height, width] = self.values.dims();
        let values = self
            .values
            .clone()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ExplainError::Computation(format!("{e:?}")))?;
        Ok(HostMap {
            values,
            height,
            width,
        })
    }
}

/// An attribution map copied to host memory, row-major.
#[derive(Debug, Clone)]
pub struct HostMap {
    /// Row-major values.
    pub values: Vec<f32>,
    /// Map height.
    pub height: usize,
    /// Map width.
    pub width: usize,
}

/// Min-max normalize a map to [0, 1].
///
/// A constant map is returned unchanged (range below epsilon).
pub fn normalize_unit<B: Backend>(map: Tensor<B, 2>) -> Tensor<B, 2> {
    let min_val: f32 = map.clone().min().into_scalar().elem();
    let max_val: f32 = map.clone().max().into_scalar().elem();
    let range = max_val - min_val;

    if range > 1e-8 {
        (map - min_val) / range
    } else {
        map
    }
}

/// Nearest-neighbor upsample of a 2-D map to the given (height, width).
///
/// Used to bring an activation-resolution map up to input resolution
/// for masking, and to align maps from differently-sized target layers
/// before fusion.
pub fn upsample_nearest<B: Backend>(map: Tensor<B, 2>, out: [usize; 2]) -> Tensor<B, 2> {
    let [h, w] = map.dims();
    let [oh, ow] = out;
    if h == oh && w == ow {
        return map;
    }
    let device = map.device();

    let rows: Vec<i64> = (0..oh).map(|i| ((i * h) / oh) as i64).collect();
    let cols: Vec<i64> = (0..ow).map(|j| ((j * w) / ow) as i64).collect();
    let rows = Tensor::<B, 1, Int>::from_data(TensorData::new(rows, [oh]), &device);
    let cols = Tensor::<B, 1, Int>::from_data(TensorData::new(cols, [ow]), &device);

    map.select(0, rows).select(1, cols)
}

/// Fuse the raw maps of one method's target layers into a single map.
///
/// All maps are upsampled to the largest spatial size, then combined
/// elementwise by maximum (the fusion rule of the CAM method family).
///
/// # Errors
///
/// Returns [`ExplainError::Computation`] if no maps were produced.
pub fn fuse_cams<B: Backend>(maps: Vec<Tensor<B, 2>>) -> Result<Tensor<B, 2>> {
    let mut iter = maps.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| ExplainError::Computation("method produced no attribution maps".into()))?;

    let mut target = first.dims();
    let rest: Vec<Tensor<B, 2>> = iter.collect();
    for map in &rest {
        let [h, w] = map.dims();
        target = [target[0].max(h), target[1].max(w)];
    }

    let mut fused = upsample_nearest(normalize_unit(first), target);
    for map in rest {
        fused = fused.max_pair(upsample_nearest(normalize_unit(map), target));
    }
    Ok(fused)
}
