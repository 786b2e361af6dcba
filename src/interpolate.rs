//! Expands sparse breakpoint sequences into dense, uniformly sampled buffers
//! ready for arbitrary-waveform playback.
//!
//! Each adjacent breakpoint pair receives a point budget proportional to its
//! share of the total time span; within a segment, samples are linearly
//! interpolated (start-inclusive, end-exclusive, with the final segment keeping
//! its endpoint). Rounding shortfalls are padded by repeating the last produced
//! value, so the returned buffer always holds exactly the requested number of
//! points and is never truncated mid-segment.

use ndarray::Array1;

use crate::error::SynthError;
use crate::recipe::SparseWaveform;

/// A uniformly time-sampled waveform, immutable after creation.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseBuffer {
    samples: Array1<f64>,
}
impl DenseBuffer {
    pub fn samples(&self) -> &Array1<f64> {
        &self.samples
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// Largest normalized peak in the buffer.
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }
    /// Largest jump between adjacent samples, used for the slew-rate check.
    pub fn max_step(&self) -> f64 {
        self.samples
            .windows(2)
            .into_iter()
            .fold(0.0, |acc: f64, w| acc.max((w[1] - w[0]).abs()))
    }
}

/// Expands `times`/`values` breakpoints into a `total_points`-long dense buffer.
///
/// Fails with `InvalidInput` unless both slices have the same length of at
/// least 2, `times` is strictly increasing, all entries are finite, and
/// `total_points` is at least the number of breakpoints.
///
/// # Examples
///
/// ```
/// use ferropulse::interpolate::interpolate_sparse_to_dense;
///
/// let dense = interpolate_sparse_to_dense(&[0.0, 1.0, 2.0], &[0.0, 1.0, 0.0], 100).unwrap();
/// assert_eq!(dense.len(), 100);
/// assert_eq!(dense.samples()[50], 1.0);
/// ```
pub fn interpolate_sparse_to_dense(
    times: &[f64],
    values: &[f64],
    total_points: usize,
) -> Result<DenseBuffer, SynthError> {
    if times.len() < 2 {
        return Err(SynthError::InvalidInput(format!(
            "interpolation requires at least 2 breakpoints, got {}",
            times.len()
        )));
    }
    if times.len() != values.len() {
        return Err(SynthError::InvalidInput(format!(
            "breakpoint times ({}) and values ({}) differ in length",
            times.len(),
            values.len()
        )));
    }
    if total_points < times.len() {
        return Err(SynthError::InvalidInput(format!(
            "total_points {} is below the breakpoint count {}",
            total_points,
            times.len()
        )));
    }
    if times.iter().chain(values.iter()).any(|x| !x.is_finite()) {
        return Err(SynthError::InvalidInput(
            "breakpoints must be finite".to_string(),
        ));
    }
    if times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(SynthError::InvalidInput(
            "breakpoint times must be strictly increasing".to_string(),
        ));
    }

    let span = times[times.len() - 1] - times[0];
    let n_segments = times.len() - 1;
    let mut samples: Vec<f64> = Vec::with_capacity(total_points);

    for i in 0..n_segments {
        let fraction = (times[i + 1] - times[i]) / span;
        let seg_points = (fraction * total_points as f64).floor() as usize;
        if seg_points == 0 {
            continue;
        }
        let (v0, v1) = (values[i], values[i + 1]);
        if i == n_segments - 1 {
            // The final segment keeps its endpoint.
            if seg_points == 1 {
                samples.push(v1);
            } else {
                let step = (v1 - v0) / (seg_points - 1) as f64;
                samples.extend((0..seg_points).map(|k| v0 + k as f64 * step));
            }
        } else {
            let step = (v1 - v0) / seg_points as f64;
            samples.extend((0..seg_points).map(|k| v0 + k as f64 * step));
        }
    }

    // Rounding may leave the buffer short; repeat the last value to pad.
    let last = *samples.last().unwrap_or(&values[0]);
    samples.resize(total_points, last);

    Ok(DenseBuffer {
        samples: Array1::from_vec(samples),
    })
}

impl SparseWaveform {
    /// Densifies this waveform to `total_points` uniform samples.
    pub fn densify(&self, total_points: usize) -> Result<DenseBuffer, SynthError> {
        interpolate_sparse_to_dense(&self.times(), &self.values(), total_points)
    }
}
