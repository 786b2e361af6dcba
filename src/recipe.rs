//! Provides definitions and implementations for drive-waveform recipes.
//!
//! ## Main Structures and Enumerations:
//!
//! - `WaveKind`: An enumeration of the supported pulse-sequence shapes: `TRIANGLE` for
//!   multi-cycle bipolar hysteresis sweeps, `PUND3` for the three-pulse
//!   reset/positive/up switching train, and `TRAIN` for generic coefficient-driven
//!   pulse trains.
//!
//! - `WaveRecipe`: A general recipe composed of a kind (`WaveKind`) and a set of
//!   arguments (`WaveArgs`). It offers typed constructor wrappers and a [`WaveRecipe::build`]
//!   method that produces the sparse breakpoint sequence to be densified.
//!
//! - `Breakpoint` and `SparseWaveform`: the sparse piecewise-linear representation
//!   consumed by the interpolation engine in [`crate::interpolate`].
//!
//! ## Utilities:
//!
//! - The `WaveArgs` type alias provides a convenient way to define recipe arguments
//!   using a dictionary with string keys and float values.
//!
//! - The module makes use of the `maplit` crate to enable easy creation of hashmaps.
//!
//! All breakpoint amplitudes stay normalized in `[-1, 1]`; the peak voltage recorded
//! in [`SparseWaveform::amplitude`] is applied at emission time, not during
//! construction.

use std::collections::HashMap;
use std::fmt;

use maplit::hashmap;

use crate::error::SynthError;

/// Type alias for recipe arguments: a dictionary with key-value pairs of
/// string (argument name) and float (value)
pub type WaveArgs = HashMap<String, f64>;

/// Enum type for the supported pulse-sequence shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaveKind {
    TRIANGLE,
    PUND3,
    TRAIN,
}
impl fmt::Display for WaveKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                WaveKind::TRIANGLE => "TRIANGLE",
                WaveKind::PUND3 => "PUND3",
                WaveKind::TRAIN => "TRAIN",
            }
        )
    }
}

/// A single (time, normalized-amplitude) anchor point of a piecewise-linear waveform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Breakpoint {
    pub time: f64,
    pub value: f64,
}

/// Ordered sparse breakpoint sequence plus the emission metadata the validator
/// and the device adapter need.
///
/// Invariants upheld by [`WaveRecipe::build`]:
/// - the first breakpoint sits at time 0 and times increase strictly,
/// - breakpoint values are normalized to `[-1, 1]`,
/// - `cycle_count >= 1` and `polarity` is `+1` or `-1`.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseWaveform {
    pub breakpoints: Vec<Breakpoint>,
    pub cycle_count: usize,
    /// Sign of the dominant amplitude parameter: `+1` or `-1`.
    pub polarity: i8,
    /// Peak amplitude in volts, applied by the emission path.
    pub amplitude: f64,
    /// Physical duration of the full pattern in seconds.
    pub duration: f64,
}
impl SparseWaveform {
    pub fn times(&self) -> Vec<f64> {
        self.breakpoints.iter().map(|bp| bp.time).collect()
    }
    pub fn values(&self) -> Vec<f64> {
        self.breakpoints.iter().map(|bp| bp.value).collect()
    }
}

/// Time offset inserted between coincident anchors so that a zero-delay edge
/// becomes a near-vertical step instead of swallowing the preceding plateau.
pub const EDGE_OFFSET: f64 = 1e-8;

/// Appends a breakpoint, nudging its time forward by [`EDGE_OFFSET`] when it
/// would not strictly exceed the previous anchor. Zero widths and delays are
/// valid inputs; the nudge keeps the sequence strictly increasing while the
/// step resolves within a single sample at realistic point counts.
fn push_breakpoint(breakpoints: &mut Vec<Breakpoint>, time: f64, value: f64) {
    let time = match breakpoints.last() {
        Some(last) if time <= last.time => last.time + EDGE_OFFSET,
        _ => time,
    };
    breakpoints.push(Breakpoint { time, value });
}

/// Struct for a general waveform recipe, consisting of kind and arguments.
///
/// Different recipe kinds expect different fields in their argument dictionary;
/// the minimally expected keys are checked in `WaveRecipe::new`. Prefer the
/// typed wrappers, which cannot produce a missing key.
///
/// ## Implemented recipe kinds and their expected fields:
/// 1. `WaveKind::TRIANGLE`:
///    - `amplitude` (signed peak, V)
///    - `frequency` (per-cycle, Hz)
///    - `n_cycles`
/// 2. `WaveKind::PUND3`:
///    - `reset_amp`, `reset_width`, `reset_delay`
///    - `p_u_amp`, `p_u_width`, `p_u_delay`
/// 3. `WaveKind::TRAIN`:
///    - `pulse_width`, `pulse_delay`, `num_pulses`
///    - plus a non-empty normalized coefficient list held outside the dictionary
///
/// # Examples
///
/// ```
/// use ferropulse::recipe::*;
///
/// let recipe = WaveRecipe::new_triangle(5.0, 1e3, 2).unwrap();
/// let sparse = recipe.build().unwrap();
/// assert_eq!(sparse.breakpoints.len(), 9);
/// assert_eq!(sparse.polarity, 1);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct WaveRecipe {
    kind: WaveKind,
    args: WaveArgs,
    // Per-pulse signed coefficients, only meaningful for `WaveKind::TRAIN`.
    // Fields stay private so every recipe passes through the key check in `new`.
    coeffs: Vec<f64>,
}
impl WaveRecipe {
    pub fn kind(&self) -> WaveKind {
        self.kind
    }
    pub fn args(&self) -> &WaveArgs {
        &self.args
    }
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Constructs a `WaveRecipe`, checking that the `args` dictionary contains
    /// the keys its kind requires. Missing keys and non-finite values report
    /// `InvalidInput`.
    pub fn new(kind: WaveKind, args: WaveArgs, coeffs: Vec<f64>) -> Result<Self, SynthError> {
        let required: &[&str] = match kind {
            WaveKind::TRIANGLE => &["amplitude", "frequency", "n_cycles"],
            WaveKind::PUND3 => &[
                "reset_amp",
                "reset_width",
                "reset_delay",
                "p_u_amp",
                "p_u_width",
                "p_u_delay",
            ],
            WaveKind::TRAIN => &["pulse_width", "pulse_delay", "num_pulses"],
        };
        for key in required {
            match args.get(*key) {
                None => {
                    return Err(SynthError::InvalidInput(format!(
                        "expected recipe kind {} to contain key {}",
                        kind, key
                    )))
                }
                Some(value) if !value.is_finite() => {
                    return Err(SynthError::InvalidInput(format!(
                        "recipe kind {} received non-finite {} = {}",
                        kind, key, value
                    )))
                }
                Some(_) => {}
            }
        }
        if kind == WaveKind::TRAIN {
            if coeffs.is_empty() {
                return Err(SynthError::InvalidInput(
                    "TRAIN recipe requires at least one pulse coefficient".to_string(),
                ));
            }
            if coeffs.iter().any(|c| !c.is_finite() || c.abs() > 1.0) {
                return Err(SynthError::InvalidInput(
                    "TRAIN coefficients must be finite and normalized to [-1, 1]".to_string(),
                ));
            }
        }
        Ok(WaveRecipe { kind, args, coeffs })
    }

    /// Wrapper for a multi-cycle bipolar triangle (hysteresis) sweep.
    ///
    /// `amplitude` is the signed peak in volts (a negative peak inverts the
    /// pattern polarity at emission), `frequency` the per-cycle frequency in Hz.
    pub fn new_triangle(amplitude: f64, frequency: f64, n_cycles: usize) -> Result<Self, SynthError> {
        Self::new(
            WaveKind::TRIANGLE,
            hashmap! {
                "amplitude".to_string() => amplitude,
                "frequency".to_string() => frequency,
                "n_cycles".to_string() => n_cycles as f64,
            },
            Vec::new(),
        )
    }

    /// Wrapper for the three-pulse reset + P + U switching train.
    ///
    /// The reset pulse polarity follows the sign of `reset_amp`; the P and U
    /// pulses take the opposite sign. Widths and delays are in seconds.
    pub fn new_three_pulse_pund(
        reset_amp: f64,
        reset_width: f64,
        reset_delay: f64,
        p_u_amp: f64,
        p_u_width: f64,
        p_u_delay: f64,
    ) -> Result<Self, SynthError> {
        Self::new(
            WaveKind::PUND3,
            hashmap! {
                "reset_amp".to_string() => reset_amp,
                "reset_width".to_string() => reset_width,
                "reset_delay".to_string() => reset_delay,
                "p_u_amp".to_string() => p_u_amp,
                "p_u_width".to_string() => p_u_width,
                "p_u_delay".to_string() => p_u_delay,
            },
            Vec::new(),
        )
    }

    /// Wrapper for a generic pulse train: the normalized `coeffs` list is
    /// replayed `num_pulses` times, each coefficient holding for `pulse_width`
    /// seconds followed by a `pulse_delay` transition to the next one.
    pub fn new_pulse_train(
        coeffs: Vec<f64>,
        pulse_width: f64,
        pulse_delay: f64,
        num_pulses: usize,
    ) -> Result<Self, SynthError> {
        Self::new(
            WaveKind::TRAIN,
            hashmap! {
                "pulse_width".to_string() => pulse_width,
                "pulse_delay".to_string() => pulse_delay,
                "num_pulses".to_string() => num_pulses as f64,
            },
            coeffs,
        )
    }

    fn arg(&self, key: &str) -> f64 {
        // Key presence was checked in `new`.
        *self.args.get(key).unwrap()
    }

    /// Builds the ordered sparse breakpoint sequence for this recipe.
    ///
    /// Re-running `build` on the same recipe yields an identical sequence.
    /// Fails with `InvalidInput` on negative widths or delays, zero or negative
    /// frequency, and repeat counts below 1.
    pub fn build(&self) -> Result<SparseWaveform, SynthError> {
        match self.kind {
            WaveKind::TRIANGLE => self.build_triangle(),
            WaveKind::PUND3 => self.build_three_pulse_pund(),
            WaveKind::TRAIN => self.build_pulse_train(),
        }
    }

    /// Unit triangle `[0, 1, 0, -1, 0]` over fractions `[0, 1, 2, 3, 4]`, with the
    /// inner segment `[1, 0, -1, 0]` repeated for every additional cycle so that
    /// the joining zero-crossing is not duplicated.
    fn build_triangle(&self) -> Result<SparseWaveform, SynthError> {
        let amplitude = self.arg("amplitude");
        let frequency = self.arg("frequency");
        let n_cycles = self.arg("n_cycles") as usize;
        if frequency <= 0.0 {
            return Err(SynthError::InvalidInput(format!(
                "triangle frequency must be positive, got {}",
                frequency
            )));
        }
        if n_cycles < 1 {
            return Err(SynthError::InvalidInput(
                "triangle n_cycles must be at least 1".to_string(),
            ));
        }

        let mut values = vec![0.0, 1.0, 0.0, -1.0, 0.0];
        for _ in 1..n_cycles {
            values.extend_from_slice(&[1.0, 0.0, -1.0, 0.0]);
        }
        let breakpoints = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Breakpoint {
                time: i as f64,
                value: v,
            })
            .collect();

        Ok(SparseWaveform {
            breakpoints,
            cycle_count: n_cycles,
            polarity: if amplitude >= 0.0 { 1 } else { -1 },
            amplitude: amplitude.abs(),
            duration: n_cycles as f64 / frequency,
        })
    }

    /// Six cumulative boundaries of `[0, reset_width, reset_delay, p_u_width,
    /// p_u_delay, p_u_width]` carrying `[-s*fr, -s*fr, 0, s*fp, s*fp, 0]`, where
    /// `s` follows the reset polarity and `fr`/`fp` are the pulses' fractions of
    /// the combined amplitude.
    fn build_three_pulse_pund(&self) -> Result<SparseWaveform, SynthError> {
        let reset_amp = self.arg("reset_amp");
        let p_u_amp = self.arg("p_u_amp");
        let widths = [
            ("reset_width", self.arg("reset_width")),
            ("reset_delay", self.arg("reset_delay")),
            ("p_u_width", self.arg("p_u_width")),
            ("p_u_delay", self.arg("p_u_delay")),
        ];
        for (name, w) in widths {
            if w < 0.0 {
                return Err(SynthError::InvalidInput(format!(
                    "{} must be non-negative, got {}",
                    name, w
                )));
            }
        }
        let amplitude = reset_amp.abs() + p_u_amp.abs();
        if amplitude == 0.0 {
            return Err(SynthError::InvalidInput(
                "PUND3 requires a non-zero reset or P/U amplitude".to_string(),
            ));
        }
        let sign = if reset_amp >= 0.0 { 1.0 } else { -1.0 };
        let frac_reset = reset_amp.abs() / amplitude;
        let frac_p_u = p_u_amp.abs() / amplitude;

        let (reset_width, reset_delay) = (self.arg("reset_width"), self.arg("reset_delay"));
        let (p_u_width, p_u_delay) = (self.arg("p_u_width"), self.arg("p_u_delay"));
        let segments = [0.0, reset_width, reset_delay, p_u_width, p_u_delay, p_u_width];
        let sparse_v = [
            -sign * frac_reset,
            -sign * frac_reset,
            0.0,
            sign * frac_p_u,
            sign * frac_p_u,
            0.0,
        ];

        let mut breakpoints = Vec::with_capacity(6);
        let mut t = 0.0;
        for (dt, v) in segments.iter().zip(sparse_v.iter()) {
            t += dt;
            push_breakpoint(&mut breakpoints, t, *v);
        }

        Ok(SparseWaveform {
            breakpoints,
            cycle_count: 1,
            polarity: sign as i8,
            amplitude,
            duration: reset_width + reset_delay + 2.0 * p_u_width + p_u_delay,
        })
    }

    /// One slot of `(pulse_width + pulse_delay)` per replayed coefficient: flat
    /// top across the width, linear transition across the delay, final return to
    /// zero at the end of the last slot.
    fn build_pulse_train(&self) -> Result<SparseWaveform, SynthError> {
        let pulse_width = self.arg("pulse_width");
        let pulse_delay = self.arg("pulse_delay");
        let num_pulses = self.arg("num_pulses") as usize;
        if pulse_width < 0.0 || pulse_delay < 0.0 {
            return Err(SynthError::InvalidInput(format!(
                "pulse_width {} and pulse_delay {} must be non-negative",
                pulse_width, pulse_delay
            )));
        }
        if pulse_width + pulse_delay <= 0.0 {
            return Err(SynthError::InvalidInput(
                "pulse train requires a non-zero slot duration".to_string(),
            ));
        }
        if num_pulses < 1 {
            return Err(SynthError::InvalidInput(
                "pulse train num_pulses must be at least 1".to_string(),
            ));
        }

        let slots = num_pulses * self.coeffs.len();
        let slot_len = pulse_width + pulse_delay;
        let mut breakpoints = Vec::with_capacity(2 * slots + 1);
        for slot in 0..slots {
            let value = self.coeffs[slot % self.coeffs.len()];
            let start = slot as f64 * slot_len;
            push_breakpoint(&mut breakpoints, start, value);
            push_breakpoint(&mut breakpoints, start + pulse_width, value);
        }
        let duration = slots as f64 * slot_len;
        push_breakpoint(&mut breakpoints, duration, 0.0);

        // Dominant coefficient decides the recorded polarity.
        let dominant = self
            .coeffs
            .iter()
            .cloned()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap();

        Ok(SparseWaveform {
            breakpoints,
            cycle_count: num_pulses,
            polarity: if dominant >= 0.0 { 1 } else { -1 },
            amplitude: 1.0,
            duration,
        })
    }
}
impl fmt::Display for WaveRecipe {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let args_string = self
            .args
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "[{}, {{{}}}]", self.kind, args_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_single_cycle_pattern() {
        let sparse = WaveRecipe::new_triangle(3.0, 100.0, 1).unwrap().build().unwrap();
        assert_eq!(sparse.values(), vec![0.0, 1.0, 0.0, -1.0, 0.0]);
        assert_eq!(sparse.times(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sparse.duration, 0.01);
    }

    #[test]
    fn triangle_repeats_without_duplicate_zero() {
        let sparse = WaveRecipe::new_triangle(-2.0, 10.0, 3).unwrap().build().unwrap();
        assert_eq!(sparse.breakpoints.len(), 13);
        assert_eq!(sparse.polarity, -1);
        assert_eq!(sparse.amplitude, 2.0);
        // Joined cycles: no two consecutive breakpoints share a value of 0.
        let values = sparse.values();
        for pair in values.windows(2) {
            assert!(pair[0] != 0.0 || pair[1] != 0.0);
        }
    }

    #[test]
    fn pund_sign_follows_reset_amplitude() {
        let sparse = WaveRecipe::new_three_pulse_pund(-5.0, 1e-3, 1e-3, 5.0, 0.5e-3, 0.5e-3)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(sparse.polarity, -1);
        let values = sparse.values();
        assert!(values[0] > 0.0 && values[1] > 0.0);
        assert!(values[3] < 0.0 && values[4] < 0.0);
        assert_eq!(sparse.duration, 1e-3 + 1e-3 + 2.0 * 0.5e-3 + 0.5e-3);
    }

    #[test]
    fn pund_boundaries_cover_total_duration() {
        let sparse = WaveRecipe::new_three_pulse_pund(1.0, 2e-3, 1e-3, 2.0, 1e-3, 3e-3)
            .unwrap()
            .build()
            .unwrap();
        let times = sparse.times();
        assert_eq!(times[0], 0.0);
        assert!((times.last().unwrap() - sparse.duration).abs() < 1e-15);
    }

    #[test]
    fn pulse_train_replays_coefficients() {
        let sparse = WaveRecipe::new_pulse_train(vec![1.0, -0.5], 1e-3, 1e-3, 2)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(sparse.duration, 4.0 * 2e-3);
        assert_eq!(sparse.cycle_count, 2);
        // Four flat tops carrying the repeated coefficient list.
        let values = sparse.values();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[2], -0.5);
        assert_eq!(*values.last().unwrap(), 0.0);
    }

    #[test]
    fn zero_delay_train_keeps_flat_tops() {
        let sparse = WaveRecipe::new_pulse_train(vec![0.5, -0.5], 1e-3, 0.0, 1)
            .unwrap()
            .build()
            .unwrap();
        // Both plateaus survive; the coincident edges become EDGE_OFFSET steps.
        assert_eq!(sparse.values(), vec![0.5, 0.5, -0.5, -0.5, 0.0]);
        let times = sparse.times();
        for pair in times.windows(2) {
            assert!(pair[1] > pair[0]);
        }
        assert_eq!(times[2], 1e-3 + EDGE_OFFSET);
    }

    #[test]
    fn zero_reset_delay_pund_keeps_reset_plateau() {
        let sparse = WaveRecipe::new_three_pulse_pund(-1.0, 1e-3, 0.0, 1.0, 1e-3, 1e-3)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(sparse.breakpoints.len(), 6);
        assert_eq!(sparse.values(), vec![0.5, 0.5, 0.0, -0.5, -0.5, 0.0]);
        let times = sparse.times();
        for pair in times.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn builds_are_idempotent() {
        let recipe = WaveRecipe::new_three_pulse_pund(1.0, 1e-3, 1e-3, 1.0, 1e-3, 1e-3).unwrap();
        assert_eq!(recipe.build().unwrap(), recipe.build().unwrap());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(WaveRecipe::new_triangle(1.0, 1e3, 0).unwrap().build().is_err());
        assert!(WaveRecipe::new_three_pulse_pund(1.0, -1e-3, 0.0, 1.0, 1e-3, 1e-3)
            .unwrap()
            .build()
            .is_err());
        assert!(WaveRecipe::new_pulse_train(vec![], 1e-3, 1e-3, 1).is_err());
        assert!(WaveRecipe::new_pulse_train(vec![2.0], 1e-3, 1e-3, 1).is_err());
        assert!(WaveRecipe::new(WaveKind::TRIANGLE, WaveArgs::new(), Vec::new()).is_err());
    }
}
