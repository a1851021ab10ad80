//! Area-averaging resize for thumbnails.
//!
//! Shrinking an axis: each destination pixel covers a footprint of `src / dst`
//! source pixels and its value is the coverage-weighted mean of every source
//! pixel the footprint overlaps (box filter on the exact footprint).
//!
//! Enlarging an axis: linear interpolation between the two nearest source
//! pixel centers, clamped at the edges.
//!
//! # Algorithm
//!
//! 1. Build per-axis tap lists (source index, weight), weights sum to 1
//! 2. Horizontal pass: rows resampled to the destination width
//! 3. Vertical pass: columns resampled to the destination height
//!
//! Both passes run row-parallel (rayon). Buffers are interleaved HWC f32.

use rayon::prelude::*;

/// Resampling taps for one destination index
type Taps = Vec<(usize, f32)>;

/// Resize interleaved `src` (width × height × channels) to `dst_w` × `dst_h`.
pub fn resize_area(
    src: &[f32],
    width: usize,
    height: usize,
    channels: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<f32> {
    debug_assert_eq!(src.len(), width * height * channels);
    if width == dst_w && height == dst_h {
        return src.to_vec();
    }

    let x_taps = axis_taps(width, dst_w);
    let y_taps = axis_taps(height, dst_h);

    // Horizontal pass: height rows of dst_w pixels
    let mut temp = vec![0.0f32; dst_w * height * channels];
    temp.par_chunks_mut(dst_w * channels)
        .enumerate()
        .for_each(|(y, out_row)| {
            let src_row = &src[y * width * channels..(y + 1) * width * channels];
            for (x, taps) in x_taps.iter().enumerate() {
                let out_px = &mut out_row[x * channels..(x + 1) * channels];
                for &(sx, w) in taps {
                    let px = &src_row[sx * channels..(sx + 1) * channels];
                    for c in 0..channels {
                        out_px[c] += px[c] * w;
                    }
                }
            }
        });

    // Vertical pass: dst_h rows, each a weighted sum of temp rows
    let row_len = dst_w * channels;
    let mut out = vec![0.0f32; dst_h * row_len];
    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, out_row)| {
            for &(sy, w) in &y_taps[y] {
                let src_row = &temp[sy * row_len..(sy + 1) * row_len];
                for (o, s) in out_row.iter_mut().zip(src_row) {
                    *o += s * w;
                }
            }
        });

    out
}

/// Taps for one axis: footprint averaging when shrinking, linear when enlarging.
fn axis_taps(src: usize, dst: usize) -> Vec<Taps> {
    if dst > src {
        linear_taps(src, dst)
    } else {
        area_taps(src, dst)
    }
}

/// Linear interpolation taps (pixel centers aligned, edges clamped).
fn linear_taps(src: usize, dst: usize) -> Vec<Taps> {
    let scale = src as f64 / dst as f64;
    let last = (src - 1) as f64;
    (0..dst)
        .map(|i| {
            let pos = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, last);
            let left = pos.floor() as usize;
            let frac = (pos - left as f64) as f32;
            if frac <= 1e-6 || left + 1 >= src {
                vec![(left, 1.0)]
            } else {
                vec![(left, 1.0 - frac), (left + 1, frac)]
            }
        })
        .collect()
}

/// Footprint taps mapping `src` samples onto `dst` samples.
fn area_taps(src: usize, dst: usize) -> Vec<Taps> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|i| {
            let start = i as f64 * scale;
            let end = (i + 1) as f64 * scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src);

            let mut taps: Vec<(usize, f64)> = (first..last)
                .filter_map(|s| {
                    let cover = end.min(s as f64 + 1.0) - start.max(s as f64);
                    (cover > 1e-9).then_some((s, cover))
                })
                .collect();
            if taps.is_empty() {
                taps.push((first.min(src - 1), 1.0));
            }

            let total: f64 = taps.iter().map(|&(_, w)| w).sum();
            taps.into_iter().map(|(s, w)| (s, (w / total) as f32)).collect()
        })
        .collect()
}
