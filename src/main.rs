use ferropulse::device::{AdapterSession, VirtualAdapter};
use ferropulse::encoder::SourceMode;
use ferropulse::error::SynthError;
use ferropulse::recipe::WaveRecipe;
use log::info;

fn main() -> Result<(), SynthError> {
    env_logger::init();

    let mut session = AdapterSession::new(VirtualAdapter::new());

    // Two-cycle hysteresis sweep at 1 kHz, 5 V peak.
    let hysteresis = WaveRecipe::new_triangle(5.0, 1e3, 2)?;
    session.load_waveform("hysteresis", &hysteresis, 524288)?;
    session.emit_waveform("hysteresis")?;

    // Negative-reset PUND train.
    let pund = WaveRecipe::new_three_pulse_pund(-5.0, 1e-3, 1e-3, 5.0, 0.5e-3, 0.5e-3)?;
    session.load_waveform("pund", &pund, 524288)?;
    session.emit_waveform("pund")?;

    let bias = session.drive_scalar(12.5, SourceMode::Voltage)?;
    info!("encoded bias set-point as {}", bias);

    for emitted in &session.adapter().emitted_buffers {
        println!(
            "{}: {} points at {:.3e} Sa/s, peak {}{} V",
            emitted.name,
            emitted.points,
            emitted.samp_rate,
            if emitted.polarity < 0 { "-" } else { "+" },
            emitted.amplitude
        );
    }
    for command in &session.adapter().emitted_commands {
        println!("scalar command: {}", command);
    }
    Ok(())
}
