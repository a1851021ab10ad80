//! Image → data-URL payload encoding
//!
//! Turns an image tensor into `data:image/<format>;base64,<bytes>` for the view layer.
//!
//! # Pipeline
//!
//! 1. Layout: C×H×W moved to H×W×C; a single channel is squeezed to H×W
//! 2. Statistics: min/max of the reference tensor (defaults to the image)
//! 3. Range inference, unless normalization is forced:
//!    - reference in [0, 1]: scale by 255
//!    - reference max < 20: switch to normalization
//!    - otherwise: pass through
//! 4. Normalization: `(v - ref_min) / (ref_max - ref_min) * 255`
//! 5. Thumbnail: fit inside (W, H) keeping h/w, or stretch to (W, H); area resampling
//! 6. Saturate to u8, compress with the `image` crate, base64, prepend header
//!
//! # Errors
//!
//! Nothing is caught or repaired: unsupported shapes, zero-width normalization
//! ranges, unknown formats and codec failures are all returned to the caller.

pub mod resize;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, LumaA, Rgb, Rgba};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::Cursor;
use std::sync::Arc;

use crate::entities::Tensor;
use crate::entities::tensor::min_max;

pub use resize::resize_area;

/// Default output format
pub const DEFAULT_FORMAT: &str = "png";

/// Values at or below this max (and >= 0) are treated as unit-range floats
const UNIT_RANGE_MAX: f32 = 1.0;

/// Reference max below which a non-unit image is normalized automatically
const LOW_RANGE_MAX: f32 = 20.0;

/// 1×1 black grayscale PNG shown before any image is set
const PLACEHOLDER_PNG_B64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAAAAAA6fptVAAAACklEQVQIHWNgAAAAAgABz8g15QAAAABJRU5ErkJggg==";

/// Encoder settings (persistent via Settings)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Force min/max normalization against the reference
    pub normalize: bool,
    /// Target box (width, height)
    pub thumbnail: Option<(u32, u32)>,
    /// Fit inside the thumbnail box instead of stretching to it
    pub keep_aspect_ratio: bool,
    /// Codec name, resolved like a file extension ("png", "jpeg", "tiff", ...)
    pub format: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            normalize: false,
            thumbnail: None,
            keep_aspect_ratio: true,
            format: DEFAULT_FORMAT.to_string(),
        }
    }
}

/// Encoding errors
#[derive(Debug)]
pub enum EncodeError {
    /// Only 2-D (H×W) and 3-D (C×H×W) tensors with non-empty spatial axes
    UnsupportedShape(Vec<usize>),
    /// Normalization against a reference whose min == max (or no finite values)
    DegenerateRange { min: f32, max: f32 },
    /// Thumbnail box with a zero side
    InvalidThumbnail(u32, u32),
    UnsupportedFormat(String),
    Codec(image::ImageError),
    /// Payload body is not valid base64
    Base64(base64::DecodeError),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::UnsupportedShape(shape) => write!(f, "Unsupported image shape: {:?}", shape),
            EncodeError::DegenerateRange { min, max } => {
                write!(f, "Cannot normalize: reference range [{}, {}] has zero width", min, max)
            }
            EncodeError::InvalidThumbnail(w, h) => write!(f, "Invalid thumbnail size: {}x{}", w, h),
            EncodeError::UnsupportedFormat(fmt) => write!(f, "Unsupported image format: {}", fmt),
            EncodeError::Codec(e) => write!(f, "Codec error: {}", e),
            EncodeError::Base64(e) => write!(f, "Invalid payload body: {}", e),
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EncodeError::Codec(e) => Some(e),
            EncodeError::Base64(e) => Some(e),
            _ => None,
        }
    }
}

impl From<image::ImageError> for EncodeError {
    fn from(e: image::ImageError) -> Self {
        EncodeError::Codec(e)
    }
}

/// Immutable data-URL payload: ASCII header + base64 body.
///
/// Clones share the same allocation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncodedPayload {
    text: Arc<str>,
    header_len: usize,
}

impl std::fmt::Debug for EncodedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedPayload")
            .field("header", &self.header())
            .field("len", &self.len())
            .finish()
    }
}

impl Default for EncodedPayload {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl EncodedPayload {
    fn from_parts(format: &str, body_b64: &str) -> Self {
        let header = header(format);
        let header_len = header.len();
        Self {
            text: Arc::from(header + body_b64),
            header_len,
        }
    }

    /// 1×1 black PNG
    pub fn placeholder() -> Self {
        Self::from_parts(DEFAULT_FORMAT, PLACEHOLDER_PNG_B64)
    }

    /// Parse an existing data URL; None unless it carries an image base64 header.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.strip_prefix("data:image/")?;
        let split = rest.find(";base64,")?;
        if split == 0 || !text.is_ascii() {
            return None;
        }
        Some(Self {
            text: Arc::from(text),
            header_len: "data:image/".len() + split + ";base64,".len(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// `data:image/<format>;base64,`
    pub fn header(&self) -> &str {
        &self.text[..self.header_len]
    }

    /// Format named in the header
    pub fn format(&self) -> &str {
        &self.text["data:image/".len()..self.header_len - ";base64,".len()]
    }

    /// Base64 body (without header)
    pub fn body(&self) -> &str {
        &self.text[self.header_len..]
    }

    /// Compressed image bytes
    pub fn decode_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(self.body())
    }

    /// Decode back into pixels (format sniffed from the bytes).
    pub fn decode_image(&self) -> Result<DynamicImage, EncodeError> {
        let bytes = self.decode_bytes().map_err(EncodeError::Base64)?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

impl Serialize for EncodedPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for EncodedPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        EncodedPayload::parse(&text)
            .ok_or_else(|| serde::de::Error::custom("expected data:image/<format>;base64, payload"))
    }
}

/// Data-URL header for `format`
pub fn header(format: &str) -> String {
    format!("data:image/{};base64,", format)
}

/// Interleaved f32 pixels (H×W×C)
struct Plane {
    data: Vec<f32>,
    width: usize,
    height: usize,
    channels: usize,
}

impl Plane {
    /// Move the channel axis last and squeeze a single channel.
    fn channels_last(image: &Tensor) -> Result<Self, EncodeError> {
        let unsupported = || EncodeError::UnsupportedShape(image.shape().to_vec());
        let values = image.to_f32();

        let plane = match *image.shape() {
            [h, w] => Plane { data: values, width: w, height: h, channels: 1 },
            [1, h, w] => Plane { data: values, width: w, height: h, channels: 1 },
            [c, h, w] => {
                let pixels = h * w;
                let mut data = vec![0.0f32; values.len()];
                for ch in 0..c {
                    let src = &values[ch * pixels..(ch + 1) * pixels];
                    for (i, &v) in src.iter().enumerate() {
                        data[i * c + ch] = v;
                    }
                }
                Plane { data, width: w, height: h, channels: c }
            }
            _ => return Err(unsupported()),
        };

        if plane.width == 0 || plane.height == 0 || plane.channels == 0 {
            return Err(unsupported());
        }
        Ok(plane)
    }
}

/// Encode `image` as a data-URL payload.
///
/// `reference` supplies the min/max statistics (defaults to `image` itself),
/// so one image can be displayed with another's dynamic range.
pub fn encode(
    image: &Tensor,
    reference: Option<&Tensor>,
    options: &EncodeOptions,
) -> Result<EncodedPayload, EncodeError> {
    let format = ImageFormat::from_extension(&options.format)
        .ok_or_else(|| EncodeError::UnsupportedFormat(options.format.clone()))?;

    let mut plane = Plane::channels_last(image)?;

    let stats = match reference {
        Some(r) => r.min_max(),
        None => min_max(&plane.data),
    };

    let mut normalize = options.normalize;
    if let Some((lo, hi)) = stats {
        if !normalize && lo >= 0.0 && hi <= UNIT_RANGE_MAX {
            plane.data.iter_mut().for_each(|v| *v *= 255.0);
        } else if hi < LOW_RANGE_MAX {
            normalize = true;
        }
    }

    if normalize {
        let (lo, hi) = match stats {
            Some((lo, hi)) if hi > lo => (lo, hi),
            Some((lo, hi)) => return Err(EncodeError::DegenerateRange { min: lo, max: hi }),
            None => return Err(EncodeError::DegenerateRange { min: f32::NAN, max: f32::NAN }),
        };
        let scale = 255.0 / (hi - lo);
        plane.data.iter_mut().for_each(|v| *v = (*v - lo) * scale);
    }

    if let Some((tw, th)) = options.thumbnail {
        if tw == 0 || th == 0 {
            return Err(EncodeError::InvalidThumbnail(tw, th));
        }
        let (dst_w, dst_h) = if options.keep_aspect_ratio {
            fit_within(plane.width, plane.height, tw, th)
        } else {
            (tw as usize, th as usize)
        };
        plane.data = resize_area(&plane.data, plane.width, plane.height, plane.channels, dst_w, dst_h);
        plane.width = dst_w;
        plane.height = dst_h;
    }

    let bytes = compress(&plane, format, image.shape())?;
    debug!(
        "Encoded {}x{}x{} as {} ({} bytes compressed)",
        plane.width,
        plane.height,
        plane.channels,
        options.format,
        bytes.len()
    );

    Ok(EncodedPayload::from_parts(&options.format, &BASE64.encode(&bytes)))
}

/// Largest (width, height) inside `tw`×`th` keeping the h/w ratio of the source.
pub fn fit_within(width: usize, height: usize, tw: u32, th: u32) -> (usize, usize) {
    let ratio = height as f64 / width as f64;
    let mindim = (tw as f64 * ratio).min(th as f64);
    let w = (mindim / ratio).round_ties_even().max(1.0) as usize;
    let h = mindim.round_ties_even().max(1.0) as usize;
    (w, h)
}

/// Saturating f32 → u8 (round to nearest, NaN → 0)
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn compress(plane: &Plane, format: ImageFormat, shape: &[usize]) -> Result<Vec<u8>, EncodeError> {
    let raw: Vec<u8> = plane.data.iter().map(|&v| to_u8(v)).collect();
    let (w, h) = (plane.width as u32, plane.height as u32);
    let unsupported = || EncodeError::UnsupportedShape(shape.to_vec());

    let img = match plane.channels {
        1 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, raw).map(DynamicImage::ImageLuma8),
        2 => ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, raw).map(DynamicImage::ImageLumaA8),
        3 => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, raw).map(DynamicImage::ImageRgb8),
        4 => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, raw).map(DynamicImage::ImageRgba8),
        _ => None,
    }
    .ok_or_else(unsupported)?;

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_pixels(payload: &EncodedPayload) -> (u32, u32, Vec<u8>) {
        let img = payload.decode_image().unwrap().to_luma8();
        (img.width(), img.height(), img.into_raw())
    }

    #[test]
    fn test_unit_range_scaled_to_255() {
        let values: Vec<f32> = (0..16).map(|i| i as f32 / 15.0).collect();
        let img = Tensor::from_f32(vec![4, 4], values).unwrap();
        let payload = encode(&img, None, &EncodeOptions::default()).unwrap();

        assert!(payload.as_bytes().starts_with(b"data:image/png;base64,"));
        assert_eq!(payload.format(), "png");
        let (w, h, px) = gray_pixels(&payload);
        assert_eq!((w, h), (4, 4));
        assert_eq!(px.iter().min(), Some(&0));
        assert_eq!(px.iter().max(), Some(&255));
        assert_eq!(px[5], 85); // 5/15 * 255
    }

    #[test]
    fn test_u8_passthrough_roundtrip() {
        let values: Vec<u8> = (0..24).map(|i| (i * 10) as u8).collect();
        let img = Tensor::from_u8(vec![4, 6], values.clone()).unwrap();
        let payload = encode(&img, None, &EncodeOptions::default()).unwrap();
        let (w, h, px) = gray_pixels(&payload);
        assert_eq!((w, h), (6, 4));
        assert_eq!(px, values);
    }

    #[test]
    fn test_f16_and_f64_unit_range_scaled_to_255() {
        let half = [0.0f32, 0.25, 0.5, 1.0].map(half::f16::from_f32).to_vec();
        let img = Tensor::from_f16(vec![2, 2], half).unwrap();
        let (_, _, px) = gray_pixels(&encode(&img, None, &EncodeOptions::default()).unwrap());
        assert_eq!(px, vec![0, 64, 128, 255]);

        let img = Tensor::from_f64(vec![1, 3], vec![0.0, 0.2, 1.0]).unwrap();
        let (_, _, px) = gray_pixels(&encode(&img, None, &EncodeOptions::default()).unwrap());
        assert_eq!(px, vec![0, 51, 255]);
    }

    #[test]
    fn test_u16_above_255_saturates() {
        let img = Tensor::from_u16(vec![1, 4], vec![0, 100, 300, 65535]).unwrap();
        let (_, _, px) = gray_pixels(&encode(&img, None, &EncodeOptions::default()).unwrap());
        assert_eq!(px, vec![0, 100, 255, 255]);
    }

    #[test]
    fn test_forced_normalize_with_reference() {
        let img = Tensor::from_f32(vec![1, 6], vec![10.0, 30.0, 50.0, 110.0, 200.0, -50.0]).unwrap();
        let reference = Tensor::from_f32(vec![2, 2], vec![10.0, 60.0, 90.0, 110.0]).unwrap();
        let opts = EncodeOptions { normalize: true, ..Default::default() };
        let payload = encode(&img, Some(&reference), &opts).unwrap();
        let (_, _, px) = gray_pixels(&payload);
        // (v - 10) / 100 * 255, saturated outside the reference range
        assert_eq!(px, vec![0, 51, 102, 255, 255, 0]);
    }

    #[test]
    fn test_forced_normalize_on_unit_image_does_not_prescale() {
        let img = Tensor::from_f32(vec![1, 3], vec![0.0, 0.25, 0.5]).unwrap();
        let opts = EncodeOptions { normalize: true, ..Default::default() };
        let (_, _, px) = gray_pixels(&encode(&img, None, &opts).unwrap());
        assert_eq!(px, vec![0, 128, 255]);
    }

    #[test]
    fn test_low_range_switches_to_normalize() {
        let img = Tensor::from_f32(vec![1, 3], vec![2.0, 4.0, 6.0]).unwrap();
        let (_, _, px) = gray_pixels(&encode(&img, None, &EncodeOptions::default()).unwrap());
        assert_eq!(px, vec![0, 128, 255]);

        // negative values below 20 are also normalized
        let img = Tensor::from_f32(vec![1, 2], vec![-1.0, 1.0]).unwrap();
        let (_, _, px) = gray_pixels(&encode(&img, None, &EncodeOptions::default()).unwrap());
        assert_eq!(px, vec![0, 255]);
    }

    #[test]
    fn test_degenerate_range_is_an_error() {
        let img = Tensor::from_f32(vec![2, 2], vec![5.0; 4]).unwrap();
        let err = encode(&img, None, &EncodeOptions::default()).unwrap_err();
        assert!(matches!(err, EncodeError::DegenerateRange { min, max } if min == 5.0 && max == 5.0));

        // unit-range constant is fine: scaled, never normalized
        let img = Tensor::from_f32(vec![2, 2], vec![0.5; 4]).unwrap();
        let (_, _, px) = gray_pixels(&encode(&img, None, &EncodeOptions::default()).unwrap());
        assert_eq!(px, vec![128; 4]);
    }

    #[test]
    fn test_thumbnail_keeps_ratio() {
        // h=40, w=80 → ratio 0.5 inside a 20x20 box
        let img = Tensor::from_u8(vec![40, 80], vec![200; 40 * 80]).unwrap();
        let opts = EncodeOptions { thumbnail: Some((20, 20)), ..Default::default() };
        let (w, h, px) = gray_pixels(&encode(&img, None, &opts).unwrap());
        assert_eq!((w, h), (20, 10));
        assert!(px.iter().all(|&p| p == 200));

        // tall image: h=90, w=30 inside 16x16
        let img = Tensor::from_u8(vec![90, 30], vec![100; 90 * 30]).unwrap();
        let opts = EncodeOptions { thumbnail: Some((16, 16)), ..Default::default() };
        let (w, h, _) = gray_pixels(&encode(&img, None, &opts).unwrap());
        assert_eq!(h, 16);
        assert!((w as i32 - 5).abs() <= 1, "w = {}", w);
    }

    #[test]
    fn test_thumbnail_stretch_matches_box() {
        let img = Tensor::from_u8(vec![40, 80], vec![200; 40 * 80]).unwrap();
        let opts = EncodeOptions {
            thumbnail: Some((20, 20)),
            keep_aspect_ratio: false,
            ..Default::default()
        };
        let (w, h, _) = gray_pixels(&encode(&img, None, &opts).unwrap());
        assert_eq!((w, h), (20, 20));

        let opts = EncodeOptions { thumbnail: Some((0, 20)), ..Default::default() };
        assert!(matches!(encode(&img, None, &opts), Err(EncodeError::InvalidThumbnail(0, 20))));
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(80, 40, 20, 20), (20, 10));
        assert_eq!(fit_within(100, 100, 30, 50), (30, 30));
        assert_eq!(fit_within(1000, 1, 10, 10), (10, 1));
    }

    #[test]
    fn test_single_channel_first_axis_squeezed() {
        let img = Tensor::from_u8(vec![1, 2, 3], vec![30, 60, 90, 120, 150, 180]).unwrap();
        let payload = encode(&img, None, &EncodeOptions::default()).unwrap();
        let decoded = payload.decode_image().unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
        assert_eq!(decoded.to_luma8().into_raw(), vec![30, 60, 90, 120, 150, 180]);
    }

    #[test]
    fn test_rgb_channel_first_layout() {
        // 3 channels, 1x2 pixels: R plane, G plane, B plane
        let img = Tensor::from_u8(vec![3, 1, 2], vec![255, 0, 0, 255, 40, 40]).unwrap();
        let payload = encode(&img, None, &EncodeOptions::default()).unwrap();
        let decoded = payload.decode_image().unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 40]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 255, 40]);
    }

    #[test]
    fn test_unsupported_inputs() {
        let img = Tensor::from_u8(vec![1, 1, 2, 2], vec![0; 4]).unwrap();
        assert!(matches!(
            encode(&img, None, &EncodeOptions::default()),
            Err(EncodeError::UnsupportedShape(ref s)) if s == &vec![1, 1, 2, 2]
        ));

        let img = Tensor::from_u8(vec![5, 2, 2], vec![0; 20]).unwrap();
        assert!(matches!(
            encode(&img, None, &EncodeOptions::default()),
            Err(EncodeError::UnsupportedShape(_))
        ));

        let img = Tensor::from_u8(vec![2, 2], vec![0, 50, 100, 150]).unwrap();
        let opts = EncodeOptions { format: "nope".into(), ..Default::default() };
        assert!(matches!(encode(&img, None, &opts), Err(EncodeError::UnsupportedFormat(ref f)) if f == "nope"));
    }

    #[test]
    fn test_jpeg_header_names_format() {
        let img = Tensor::from_u8(vec![8, 8], vec![128; 64]).unwrap();
        let opts = EncodeOptions { format: "jpeg".into(), ..Default::default() };
        let payload = encode(&img, None, &opts).unwrap();
        assert_eq!(payload.header(), "data:image/jpeg;base64,");
        assert_eq!(payload.format(), "jpeg");
        assert!(payload.decode_image().is_ok());
    }

    #[test]
    fn test_placeholder_and_parse() {
        let p = EncodedPayload::placeholder();
        assert_eq!(p.format(), "png");
        let (w, h, px) = gray_pixels(&p);
        assert_eq!((w, h, px), (1, 1, vec![0]));

        let parsed = EncodedPayload::parse(p.as_str()).unwrap();
        assert_eq!(parsed, p);
        assert!(EncodedPayload::parse("data:text/plain;base64,AAAA").is_none());
        assert!(EncodedPayload::parse("data:image/;base64,AAAA").is_none());

        let json = serde_json::to_string(&p).unwrap();
        let back: EncodedPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
