//! Halite Sine - a virtual input device that plays a test tone.
//!
//! Shows the usual shape of a Halite driver:
//! 1. `Driver::new(..).with_setup(..)` builds the object tree once the host
//!    connects
//! 2. An [`IoRequestHandler`] fills input buffers on the IO thread
//! 3. `export_driver!` generates the CFPlugIn factory named in `Info.plist`

use std::f64::consts::TAU;
use std::sync::Arc;

use halite::prelude::*;

// =============================================================================
// Configuration
// =============================================================================

pub const FREQUENCY_HZ: f64 = 440.0;
pub const AMPLITUDE: f32 = 0.25;

// =============================================================================
// IO
// =============================================================================

/// Writes a sine wave into every input stream.
///
/// The phase is derived from the cycle's sample time, so the handler keeps
/// no state and every client reading the stream sees the same signal.
#[derive(Debug, Clone, Copy)]
pub struct SineHandler {
    frequency: f64,
    amplitude: f32,
}

impl SineHandler {
    pub fn new(frequency: f64, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
        }
    }
}

impl Default for SineHandler {
    fn default() -> Self {
        Self::new(FREQUENCY_HZ, AMPLITUDE)
    }
}

impl IoRequestHandler for SineHandler {
    fn on_read_input(
        &self,
        _client_id: u32,
        stream: &Stream,
        cycle: &IoCycleInfo,
        frames: u32,
        buffer: &mut [u8],
    ) -> Result<()> {
        let format = stream.format();
        if !matches!(format.sample_format(), Ok(SampleFormat::F32)) {
            buffer.fill(0);
            return Ok(());
        }
        let channels = format.channels_per_frame as usize;
        let step = TAU * self.frequency / format.sample_rate;
        let frame_bytes = channels * 4;

        for (index, frame) in buffer
            .chunks_exact_mut(frame_bytes)
            .take(frames as usize)
            .enumerate()
        {
            let time = cycle.input_sample_time + index as f64;
            let sample = ((time * step).sin() as f32 * self.amplitude).to_ne_bytes();
            for channel in frame.chunks_exact_mut(4) {
                channel.copy_from_slice(&sample);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Build the driver: one stereo input device with a volume and a mute
/// control.
pub fn build_driver() -> Driver {
    Driver::new(PluginParameters::new("Halite")).with_setup(|plugin| {
        let id = plugin.add_device(
            DeviceParameters::new("Halite Sine")
                .with_manufacturer("Halite")
                .with_uid("halite-sine")
                .with_available_sample_rates(vec![44_100.0, 48_000.0]),
        )?;
        let pin = plugin.device(id)?;
        let device = pin
            .downcast_ref::<Device>()
            .ok_or(Error::InvalidValue(format!("object {id} is not a device")))?;
        device.add_stream(StreamParameters::new(Direction::Input).with_name("Sine"))?;
        device.add_volume_control(VolumeParameters::new(ControlScope::Input))?;
        device.add_mute_control(MuteParameters::new(ControlScope::Input))?;
        device.set_io_handler(Arc::new(SineHandler::default()));
        log::info!("sine device {id} ready");
        Ok(())
    })
}

export_driver!(HaliteSineFactory, build_driver);

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(sample_time: f64) -> IoCycleInfo {
        IoCycleInfo {
            input_sample_time: sample_time,
            ..Default::default()
        }
    }

    #[test]
    fn test_handler_writes_sine() {
        let context = Arc::new(Context::new());
        let stream = Stream::new(&context, ObjectId(3), ObjectId(2), StreamParameters::new(Direction::Input));
        let handler = SineHandler::new(12_000.0, 1.0);
        let mut buffer = vec![0u8; 4 * 8];

        handler
            .on_read_input(1, &stream, &cycle(0.0), 4, &mut buffer)
            .unwrap();
        let samples: Vec<f32> = buffer
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        // A quarter period per frame at 48 kHz; both channels carry the same value.
        assert!(samples[0].abs() < 1e-6);
        assert!((samples[2] - 1.0).abs() < 1e-6);
        assert_eq!(samples[2], samples[3]);
        assert!((samples[6] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_handler_continues_across_cycles() {
        let context = Arc::new(Context::new());
        let stream = Stream::new(&context, ObjectId(3), ObjectId(2), StreamParameters::new(Direction::Input));
        let handler = SineHandler::default();
        let mut whole = vec![0u8; 8 * 8];
        let mut second = vec![0u8; 8 * 4];

        handler.on_read_input(1, &stream, &cycle(0.0), 8, &mut whole).unwrap();
        handler.on_read_input(1, &stream, &cycle(4.0), 4, &mut second).unwrap();
        assert_eq!(&whole[32..], &second[..]);
    }
}
