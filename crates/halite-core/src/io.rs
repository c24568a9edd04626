//! IO cycle types and the user-facing IO hook.
//!
//! The host drives each IO cycle through will-do / begin / do / end calls
//! on the realtime thread. Devices answer the timing questions themselves
//! and hand buffer work to an [`IoRequestHandler`].
//!
//! # Realtime
//!
//! Handler methods run on the host's IO thread. They must not block,
//! allocate or take locks held by non-realtime code.

use crate::convert::ConversionError;
use crate::error::Result;
use crate::stream::Stream;
use crate::types::{operation, ObjectId};

/// A host process connected to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub client_id: u32,
    pub process_id: i32,
    pub is_native_endian: bool,
    pub bundle_id: Option<String>,
}

/// Timing of the IO cycle in progress.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IoCycleInfo {
    pub cycle_counter: u64,
    pub nominal_frames: u32,
    pub input_sample_time: f64,
    pub input_host_time: u64,
    pub output_sample_time: f64,
    pub output_host_time: u64,
}

/// The zero timestamp of a running device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroTimestamp {
    pub sample_time: f64,
    pub host_time: u64,
    /// Changes whenever the timeline is discontinuous.
    pub seed: u64,
}

/// IO operations the host may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoOperation {
    Thread,
    Cycle,
    ReadInput,
    ConvertInput,
    ProcessInput,
    ProcessOutput,
    MixOutput,
    ProcessMix,
    ConvertMix,
    WriteMix,
}

impl IoOperation {
    pub fn from_code(code: u32) -> std::result::Result<Self, ConversionError> {
        Ok(match code {
            operation::THREAD => Self::Thread,
            operation::CYCLE => Self::Cycle,
            operation::READ_INPUT => Self::ReadInput,
            operation::CONVERT_INPUT => Self::ConvertInput,
            operation::PROCESS_INPUT => Self::ProcessInput,
            operation::PROCESS_OUTPUT => Self::ProcessOutput,
            operation::MIX_OUTPUT => Self::MixOutput,
            operation::PROCESS_MIX => Self::ProcessMix,
            operation::CONVERT_MIX => Self::ConvertMix,
            operation::WRITE_MIX => Self::WriteMix,
            other => return Err(ConversionError::UnknownCode(other)),
        })
    }

    pub const fn code(self) -> u32 {
        match self {
            Self::Thread => operation::THREAD,
            Self::Cycle => operation::CYCLE,
            Self::ReadInput => operation::READ_INPUT,
            Self::ConvertInput => operation::CONVERT_INPUT,
            Self::ProcessInput => operation::PROCESS_INPUT,
            Self::ProcessOutput => operation::PROCESS_OUTPUT,
            Self::MixOutput => operation::MIX_OUTPUT,
            Self::ProcessMix => operation::PROCESS_MIX,
            Self::ConvertMix => operation::CONVERT_MIX,
            Self::WriteMix => operation::WRITE_MIX,
        }
    }

    /// Operations that take place in place on a stream buffer.
    pub const fn uses_buffer(self) -> bool {
        !matches!(self, Self::Thread | Self::Cycle)
    }
}

/// Hooks for the audio data of a device.
///
/// Every method has a default: input reads produce silence and everything
/// else is a no-op. Buffers hold `frames` frames in the stream's virtual
/// format; implementations must stay within `buffer.len()` even if the
/// format changes concurrently.
pub trait IoRequestHandler: Send + Sync {
    /// IO is about to start for the first client.
    fn on_start_io(&self, _device: ObjectId) -> Result<()> {
        Ok(())
    }

    /// IO stopped for the last client.
    fn on_stop_io(&self, _device: ObjectId) {}

    /// Fill an input stream buffer.
    fn on_read_input(
        &self,
        _client_id: u32,
        _stream: &Stream,
        _cycle: &IoCycleInfo,
        _frames: u32,
        buffer: &mut [u8],
    ) -> Result<()> {
        buffer.fill(0);
        Ok(())
    }

    /// Process an input buffer after conversion.
    fn on_process_input(
        &self,
        _client_id: u32,
        _stream: &Stream,
        _cycle: &IoCycleInfo,
        _frames: u32,
        _buffer: &mut [u8],
    ) -> Result<()> {
        Ok(())
    }

    /// Process an output buffer before it is mixed.
    fn on_process_output(
        &self,
        _client_id: u32,
        _stream: &Stream,
        _cycle: &IoCycleInfo,
        _frames: u32,
        _buffer: &mut [u8],
    ) -> Result<()> {
        Ok(())
    }

    /// Consume the mixed output of all clients.
    fn on_write_mix(
        &self,
        _stream: &Stream,
        _cycle: &IoCycleInfo,
        _frames: u32,
        _buffer: &[u8],
    ) -> Result<()> {
        Ok(())
    }
}

/// Handler that reads silence and discards output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentIoHandler;

impl IoRequestHandler for SilentIoHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_codes() {
        for op in [
            IoOperation::Thread,
            IoOperation::Cycle,
            IoOperation::ReadInput,
            IoOperation::ConvertInput,
            IoOperation::ProcessInput,
            IoOperation::ProcessOutput,
            IoOperation::MixOutput,
            IoOperation::ProcessMix,
            IoOperation::ConvertMix,
            IoOperation::WriteMix,
        ] {
            assert_eq!(IoOperation::from_code(op.code()), Ok(op));
        }
        assert!(IoOperation::from_code(0).is_err());
    }

    #[test]
    fn test_buffer_operations() {
        assert!(!IoOperation::Cycle.uses_buffer());
        assert!(IoOperation::ReadInput.uses_buffer());
    }
}
