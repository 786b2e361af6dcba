//! Device capability modeling, waveform feasibility checks, and the session
//! object that owns one generator/source connection at a time.
//!
//! ## Overview
//!
//! - [`DeviceLimits`] is the data-driven capability record an adapter reports
//!   for its hardware: maximum sample rate, slew rate, and the supported
//!   arbitrary-waveform point range. The core never branches on instrument
//!   models; all per-model knowledge lives in this value.
//!
//! - [`check_points`] and [`validate_buffer`] implement the feasibility
//!   validator. Violations are blocking by default; the explicit
//!   [`ValidationPolicy::WarnOnly`] opt-in demotes them to logged warnings for
//!   callers that genuinely want the legacy continue-anyway behavior.
//!
//! - [`DeviceAdapter`] is the contract implemented by excluded driver code:
//!   report limits, accept a dense buffer for playback, accept a scalar
//!   command. [`VirtualAdapter`] is an in-memory implementation for tests and
//!   dry runs.
//!
//! - [`AdapterSession`] exclusively owns one adapter plus the named-waveform
//!   registry (an `IndexMap`, so iteration order is deterministic) with
//!   explicit collision semantics. Only the session holds mutable state; the
//!   build/densify/validate/encode functions it calls are all pure.

use indexmap::IndexMap;
use log::warn;

use crate::encoder::{encode, OutputCommand, SourceMode, SourceRanges};
use crate::error::SynthError;
use crate::interpolate::DenseBuffer;
use crate::recipe::WaveRecipe;

/// Capability record for one generator, supplied by its adapter and never
/// mutated by the core.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceLimits {
    /// Maximum playback sample rate in Sa/s.
    pub max_samp_rate: f64,
    /// Maximum output voltage change rate in V/s.
    pub slew_rate: f64,
    /// Inclusive (min, max) arbitrary-waveform point counts.
    pub points_range: (usize, usize),
}
impl DeviceLimits {
    /// Limits of the Keysight 81150A pulse function arbitrary generator.
    pub fn keysight_81150a() -> Self {
        DeviceLimits {
            max_samp_rate: 2e9,
            slew_rate: 1.0e9,
            points_range: (2, 524288),
        }
    }
}

/// How validator violations are handled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Violations are returned as errors before anything reaches hardware.
    #[default]
    Enforce,
    /// Violations are logged and execution continues.
    WarnOnly,
}

/// How a waveform name collision in the session registry is resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NameCollision {
    /// Loading under an existing name fails with `DuplicateName`.
    #[default]
    Reject,
    /// Loading under an existing name replaces the stored waveform.
    Overwrite,
}

/// Checks a requested point count against the device's supported range.
///
/// The caller is responsible for re-requesting with an adjusted count; the
/// core never truncates silently.
pub fn check_points(total_points: usize, limits: &DeviceLimits) -> Result<(), SynthError> {
    let (min, max) = limits.points_range;
    if total_points < min || total_points > max {
        return Err(SynthError::PointsExceeded {
            requested: total_points,
            min,
            max,
        });
    }
    Ok(())
}

/// Validates a dense buffer against the device limits.
///
/// `duration` is the physical playback time of the whole buffer in seconds and
/// `amplitude` the peak voltage applied at emission; together with the largest
/// inter-sample jump they bound the voltage change rate the generator must
/// deliver. Checks, in order: point count, effective sample rate, slew rate.
pub fn validate_buffer(
    buffer: &DenseBuffer,
    duration: f64,
    amplitude: f64,
    limits: &DeviceLimits,
    policy: ValidationPolicy,
) -> Result<(), SynthError> {
    if !(duration > 0.0) {
        return Err(SynthError::InvalidInput(format!(
            "buffer duration must be positive, got {}",
            duration
        )));
    }
    let result = buffer_violation(buffer, duration, amplitude, limits);
    match (result, policy) {
        (None, _) => Ok(()),
        (Some(err), ValidationPolicy::Enforce) => Err(err),
        (Some(err), ValidationPolicy::WarnOnly) => {
            warn!("waveform exceeds device limits, continuing anyway: {}", err);
            Ok(())
        }
    }
}

fn buffer_violation(
    buffer: &DenseBuffer,
    duration: f64,
    amplitude: f64,
    limits: &DeviceLimits,
) -> Option<SynthError> {
    if let Err(err) = check_points(buffer.len(), limits) {
        return Some(err);
    }
    let rate = buffer.len() as f64 / duration;
    if rate > limits.max_samp_rate {
        return Some(SynthError::RateExceeded {
            rate,
            max: limits.max_samp_rate,
        });
    }
    let demanded = buffer.max_step() * amplitude.abs() * rate;
    if demanded > limits.slew_rate {
        return Some(SynthError::SlewRateExceeded {
            demanded,
            max: limits.slew_rate,
        });
    }
    None
}

/// Contract implemented by the excluded per-instrument driver code.
///
/// The adapter owns all instrument I/O (writes, queries, settling delays);
/// this crate only hands it finished buffers and commands.
pub trait DeviceAdapter {
    /// Capability record for the attached hardware.
    fn device_limits(&self) -> DeviceLimits;
    /// Accepts a dense buffer for playback at `samp_rate` Sa/s under `name`.
    ///
    /// Buffer samples are normalized to `[-1, 1]`; the adapter applies the
    /// `amplitude` peak in volts and inverts the pattern when `polarity` is
    /// negative.
    fn emit_buffer(
        &mut self,
        name: &str,
        buffer: &DenseBuffer,
        samp_rate: f64,
        amplitude: f64,
        polarity: i8,
    ) -> Result<(), SynthError>;
    /// Accepts one encoded scalar set-point command.
    fn emit_scalar(&mut self, command: &OutputCommand) -> Result<(), SynthError>;
}

/// A waveform held in the session registry together with its playback rate
/// and the emission scaling recorded by the recipe build.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedWaveform {
    pub buffer: DenseBuffer,
    pub samp_rate: f64,
    /// Peak amplitude in volts, applied by the adapter at emission.
    pub amplitude: f64,
    /// `+1` or `-1`; a negative polarity inverts the normalized pattern.
    pub polarity: i8,
}

/// Exclusive owner of one adapter connection and its named-waveform registry.
///
/// # Examples
///
/// ```
/// use ferropulse::device::{AdapterSession, VirtualAdapter};
/// use ferropulse::recipe::WaveRecipe;
///
/// let mut session = AdapterSession::new(VirtualAdapter::new());
/// let recipe = WaveRecipe::new_triangle(5.0, 1e3, 2).unwrap();
/// session.load_waveform("hyst", &recipe, 1000).unwrap();
/// session.emit_waveform("hyst").unwrap();
/// assert_eq!(session.adapter().emitted_buffers.len(), 1);
/// ```
pub struct AdapterSession<A: DeviceAdapter> {
    adapter: A,
    waveforms: IndexMap<String, LoadedWaveform>,
    policy: ValidationPolicy,
    collision: NameCollision,
    ranges: SourceRanges,
    allow_extended_range: bool,
}
impl<A: DeviceAdapter> AdapterSession<A> {
    pub fn new(adapter: A) -> Self {
        AdapterSession {
            adapter,
            waveforms: IndexMap::new(),
            policy: ValidationPolicy::default(),
            collision: NameCollision::default(),
            ranges: SourceRanges::default(),
            allow_extended_range: false,
        }
    }

    // Immutable and mutable adapter access
    pub fn adapter(&self) -> &A {
        &self.adapter
    }
    pub fn adapter_(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn cfg_validation_policy(&mut self, policy: ValidationPolicy) {
        self.policy = policy;
    }
    pub fn cfg_name_collision(&mut self, collision: NameCollision) {
        self.collision = collision;
    }
    pub fn cfg_source_ranges(&mut self, ranges: SourceRanges) {
        self.ranges = ranges;
    }
    pub fn cfg_extended_range(&mut self, allow: bool) {
        self.allow_extended_range = allow;
    }

    /// Registered waveform names in load order.
    pub fn waveform_names(&self) -> Vec<&str> {
        self.waveforms.keys().map(|s| s.as_str()).collect()
    }
    pub fn waveform(&self, name: &str) -> Option<&LoadedWaveform> {
        self.waveforms.get(name)
    }

    /// Builds, densifies, and validates a recipe, then registers the dense
    /// buffer under `name`.
    ///
    /// The requested point count is pre-flight checked against the device's
    /// point range before any interpolation work; collision handling follows
    /// the configured [`NameCollision`] semantics.
    pub fn load_waveform(
        &mut self,
        name: &str,
        recipe: &WaveRecipe,
        total_points: usize,
    ) -> Result<(), SynthError> {
        if self.collision == NameCollision::Reject && self.waveforms.contains_key(name) {
            return Err(SynthError::DuplicateName(name.to_string()));
        }
        let limits = self.adapter.device_limits();
        check_points(total_points, &limits)?;

        let sparse = recipe.build()?;
        let buffer = sparse.densify(total_points)?;
        validate_buffer(&buffer, sparse.duration, sparse.amplitude, &limits, self.policy)?;

        let samp_rate = buffer.len() as f64 / sparse.duration;
        self.waveforms.insert(
            name.to_string(),
            LoadedWaveform {
                buffer,
                samp_rate,
                amplitude: sparse.amplitude,
                polarity: sparse.polarity,
            },
        );
        Ok(())
    }

    /// Hands a registered waveform to the adapter for playback.
    pub fn emit_waveform(&mut self, name: &str) -> Result<(), SynthError> {
        let loaded = self
            .waveforms
            .get(name)
            .ok_or_else(|| SynthError::UnknownWaveform(name.to_string()))?;
        self.adapter.emit_buffer(
            name,
            &loaded.buffer,
            loaded.samp_rate,
            loaded.amplitude,
            loaded.polarity,
        )
    }

    /// Encodes a scalar set-point and hands it to the adapter.
    pub fn drive_scalar(&mut self, value: f64, mode: SourceMode) -> Result<OutputCommand, SynthError> {
        let command = encode(value, mode, &self.ranges, self.allow_extended_range)?;
        self.adapter.emit_scalar(&command)?;
        Ok(command)
    }
}

/// Record of one buffer emission as seen by [`VirtualAdapter`].
#[derive(Clone, Debug, PartialEq)]
pub struct EmittedBuffer {
    pub name: String,
    pub points: usize,
    pub samp_rate: f64,
    pub amplitude: f64,
    pub polarity: i8,
}

/// In-memory adapter that records every emission; mirrors the virtual
/// instruments used for driver-less dry runs.
#[derive(Clone, Debug, Default)]
pub struct VirtualAdapter {
    limits: Option<DeviceLimits>,
    pub emitted_buffers: Vec<EmittedBuffer>,
    /// Literal command strings of every emitted scalar.
    pub emitted_commands: Vec<String>,
}
impl VirtualAdapter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_limits(limits: DeviceLimits) -> Self {
        VirtualAdapter {
            limits: Some(limits),
            ..Self::default()
        }
    }
}
impl DeviceAdapter for VirtualAdapter {
    fn device_limits(&self) -> DeviceLimits {
        self.limits.unwrap_or_else(DeviceLimits::keysight_81150a)
    }
    fn emit_buffer(
        &mut self,
        name: &str,
        buffer: &DenseBuffer,
        samp_rate: f64,
        amplitude: f64,
        polarity: i8,
    ) -> Result<(), SynthError> {
        self.emitted_buffers.push(EmittedBuffer {
            name: name.to_string(),
            points: buffer.len(),
            samp_rate,
            amplitude,
            polarity,
        });
        Ok(())
    }
    fn emit_scalar(&mut self, command: &OutputCommand) -> Result<(), SynthError> {
        self.emitted_commands.push(command.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolate::interpolate_sparse_to_dense;

    fn square_ish_buffer() -> DenseBuffer {
        interpolate_sparse_to_dense(&[0.0, 1.0, 2.0], &[0.0, 1.0, 0.0], 100).unwrap()
    }

    #[test]
    fn points_outside_range_are_rejected() {
        let limits = DeviceLimits {
            max_samp_rate: 1e6,
            slew_rate: 1e9,
            points_range: (10, 50),
        };
        assert!(matches!(
            check_points(9, &limits),
            Err(SynthError::PointsExceeded { .. })
        ));
        assert!(matches!(
            check_points(51, &limits),
            Err(SynthError::PointsExceeded { .. })
        ));
        assert!(check_points(10, &limits).is_ok());
        assert!(check_points(50, &limits).is_ok());
    }

    #[test]
    fn rate_and_slew_violations_block_by_default() {
        let buffer = square_ish_buffer();
        let limits = DeviceLimits {
            max_samp_rate: 1e3,
            slew_rate: 1e9,
            points_range: (2, 1000),
        };
        // 100 points over 1 ms -> 1e5 Sa/s, above the 1e3 Sa/s cap.
        let err =
            validate_buffer(&buffer, 1e-3, 1.0, &limits, ValidationPolicy::Enforce).unwrap_err();
        assert!(matches!(err, SynthError::RateExceeded { .. }));

        let limits = DeviceLimits {
            max_samp_rate: 1e9,
            slew_rate: 10.0,
            points_range: (2, 1000),
        };
        // Max step 1/49 at 1e5 Sa/s and 5 V peak demands ~1e4 V/s.
        let err =
            validate_buffer(&buffer, 1e-3, 5.0, &limits, ValidationPolicy::Enforce).unwrap_err();
        assert!(matches!(err, SynthError::SlewRateExceeded { .. }));
    }

    #[test]
    fn warn_only_policy_continues() {
        let buffer = square_ish_buffer();
        let limits = DeviceLimits {
            max_samp_rate: 1.0,
            slew_rate: 1e-6,
            points_range: (2, 1000),
        };
        assert!(validate_buffer(&buffer, 1e-3, 5.0, &limits, ValidationPolicy::WarnOnly).is_ok());
    }

    #[test]
    fn nonpositive_duration_is_always_fatal() {
        let buffer = square_ish_buffer();
        let limits = DeviceLimits::keysight_81150a();
        for policy in [ValidationPolicy::Enforce, ValidationPolicy::WarnOnly] {
            assert!(validate_buffer(&buffer, 0.0, 1.0, &limits, policy).is_err());
        }
    }

    #[test]
    fn registry_rejects_then_overwrites_on_request() {
        let mut session = AdapterSession::new(VirtualAdapter::new());
        let recipe = WaveRecipe::new_triangle(1.0, 1e3, 1).unwrap();
        session.load_waveform("wf", &recipe, 500).unwrap();
        let err = session.load_waveform("wf", &recipe, 500).unwrap_err();
        assert_eq!(err, SynthError::DuplicateName("wf".to_string()));

        session.cfg_name_collision(NameCollision::Overwrite);
        session.load_waveform("wf", &recipe, 600).unwrap();
        assert_eq!(session.waveform("wf").unwrap().buffer.len(), 600);
        assert_eq!(session.waveform_names(), vec!["wf"]);
    }

    #[test]
    fn emission_carries_peak_amplitude_and_polarity() {
        let mut session = AdapterSession::new(VirtualAdapter::new());
        let recipe = WaveRecipe::new_triangle(-7.5, 1e3, 1).unwrap();
        session.load_waveform("inv", &recipe, 500).unwrap();
        session.emit_waveform("inv").unwrap();
        let emitted = &session.adapter().emitted_buffers[0];
        assert_eq!(emitted.amplitude, 7.5);
        assert_eq!(emitted.polarity, -1);
        assert_eq!(emitted.samp_rate, 500.0 / 1e-3);
    }

    #[test]
    fn emitting_unknown_waveform_fails() {
        let mut session = AdapterSession::new(VirtualAdapter::new());
        assert_eq!(
            session.emit_waveform("nope").unwrap_err(),
            SynthError::UnknownWaveform("nope".to_string())
        );
    }

    #[test]
    fn session_preflights_point_count() {
        let limits = DeviceLimits {
            max_samp_rate: 1e9,
            slew_rate: 1e9,
            points_range: (2, 100),
        };
        let mut session = AdapterSession::new(VirtualAdapter::with_limits(limits));
        let recipe = WaveRecipe::new_triangle(1.0, 1e3, 1).unwrap();
        let err = session.load_waveform("wf", &recipe, 101).unwrap_err();
        assert!(matches!(err, SynthError::PointsExceeded { .. }));
    }
}
