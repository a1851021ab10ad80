//! Image tensors with explicit shape and element type (U8, U16, F16, F32, F64)
//!
//! Images arrive either 2-D (H×W, single channel) or 3-D (C×H×W, channel-first).
//! The spatial dimensions are always the trailing two axes.
//!
//! # Element Types
//!
//! - `TensorData::U8`: 8-bit samples, typically already display range
//! - `TensorData::U16`: 16-bit samples (PNG16, TIFF16)
//! - `TensorData::F16`: half floats
//! - `TensorData::F32` / `F64`: float images, commonly in [0, 1]
//!
//! All pixel math in the encoder runs on f32; `to_f32()` widens without rescaling.

use half::f16 as F16;
use image::DynamicImage;

/// Tensor element storage
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F16(Vec<F16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Element type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    U8,
    U16,
    F16,
    F32,
    F64,
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::U8(v) => v.len(),
            TensorData::U16(v) => v.len(),
            TensorData::F16(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            TensorData::U8(_) => DType::U8,
            TensorData::U16(_) => DType::U16,
            TensorData::F16(_) => DType::F16,
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
        }
    }
}

/// Tensor construction errors
#[derive(Debug, Clone, PartialEq)]
pub enum TensorError {
    EmptyShape,
    ShapeMismatch { shape: Vec<usize>, expected: usize, actual: usize },
}

impl std::fmt::Display for TensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorError::EmptyShape => write!(f, "Tensor shape must have at least one axis"),
            TensorError::ShapeMismatch { shape, expected, actual } => write!(
                f,
                "Shape {:?} needs {} elements, got {}",
                shape, expected, actual
            ),
        }
    }
}

impl std::error::Error for TensorError {}

/// N-dimensional row-major array
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Create tensor, validating that the shape covers exactly `data.len()` elements.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, TensorError> {
        if shape.is_empty() {
            return Err(TensorError::EmptyShape);
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn from_u8(shape: Vec<usize>, data: Vec<u8>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::U8(data))
    }

    pub fn from_u16(shape: Vec<usize>, data: Vec<u16>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::U16(data))
    }

    pub fn from_f16(shape: Vec<usize>, data: Vec<F16>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::F16(data))
    }

    pub fn from_f32(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::F32(data))
    }

    pub fn from_f64(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::F64(data))
    }

    /// Channel-first tensor from a decoded image.
    ///
    /// Luma images become 2-D (H×W); everything else C×H×W with C = 2, 3 or 4.
    /// 8-bit sources stay U8, 16-bit U16, float sources F32.
    pub fn from_dynamic_image(img: &DynamicImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let channels = img.color().channel_count() as usize;

        let data = match img {
            DynamicImage::ImageLuma8(b) => TensorData::U8(b.as_raw().clone()),
            DynamicImage::ImageLumaA8(b) => TensorData::U8(planar(b.as_raw(), 2)),
            DynamicImage::ImageRgb8(b) => TensorData::U8(planar(b.as_raw(), 3)),
            DynamicImage::ImageRgba8(b) => TensorData::U8(planar(b.as_raw(), 4)),
            DynamicImage::ImageLuma16(b) => TensorData::U16(b.as_raw().clone()),
            DynamicImage::ImageLumaA16(b) => TensorData::U16(planar(b.as_raw(), 2)),
            DynamicImage::ImageRgb16(b) => TensorData::U16(planar(b.as_raw(), 3)),
            DynamicImage::ImageRgba16(b) => TensorData::U16(planar(b.as_raw(), 4)),
            DynamicImage::ImageRgb32F(b) => TensorData::F32(planar(b.as_raw(), 3)),
            DynamicImage::ImageRgba32F(b) => TensorData::F32(planar(b.as_raw(), 4)),
            // Non-exhaustive upstream; normalize unknown layouts through RGBA8
            other => {
                let rgba = other.to_rgba8();
                return Self {
                    shape: vec![4, h, w],
                    data: TensorData::U8(planar(rgba.as_raw(), 4)),
                };
            }
        };

        let shape = if channels == 1 { vec![h, w] } else { vec![channels, h, w] };
        Self { shape, data }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Trailing two axes as (height, width); None for 1-D tensors.
    pub fn spatial_size(&self) -> Option<(usize, usize)> {
        match self.shape.as_slice() {
            [.., h, w] => Some((*h, *w)),
            _ => None,
        }
    }

    /// Widen every element to f32 (values unchanged, no range scaling).
    pub fn to_f32(&self) -> Vec<f32> {
        match &self.data {
            TensorData::U8(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::U16(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::F16(v) => v.iter().map(|x| x.to_f32()).collect(),
            TensorData::F32(v) => v.clone(),
            TensorData::F64(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }

    /// Minimum and maximum over all elements; NaNs are skipped.
    /// None when the tensor is empty or all-NaN.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max(&self.to_f32())
    }
}

/// Min/max of a slice skipping NaNs.
pub fn min_max(values: &[f32]) -> Option<(f32, f32)> {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Interleaved HWC samples → planar CHW.
fn planar<T: Copy>(interleaved: &[T], channels: usize) -> Vec<T> {
    let pixels = interleaved.len() / channels;
    let mut out = Vec::with_capacity(interleaved.len());
    for c in 0..channels {
        out.extend(interleaved.iter().skip(c).step_by(channels).take(pixels));
    }
    out
}
