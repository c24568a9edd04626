//! Call tracing.
//!
//! Every host call is bracketed by [`Tracer::begin_span`] and
//! [`Tracer::end_span`]. Spans close even when the call fails or panics,
//! see [`CallContext`](crate::dispatcher::CallContext).

use crate::status::Status;
use crate::strings;
use crate::types::{ObjectId, PropertyAddress};

/// Host entry points, as seen by the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    QueryInterface,
    AddRef,
    Release,
    Initialize,
    CreateDevice,
    DestroyDevice,
    AddDeviceClient,
    RemoveDeviceClient,
    PerformConfigurationChange,
    AbortConfigurationChange,
    HasProperty,
    IsPropertySettable,
    GetPropertyDataSize,
    GetPropertyData,
    SetPropertyData,
    StartIo,
    StopIo,
    GetZeroTimestamp,
    WillDoIoOperation,
    BeginIoOperation,
    DoIoOperation,
    EndIoOperation,
}

impl Operation {
    pub const fn name(self) -> &'static str {
        match self {
            Self::QueryInterface => "QueryInterface",
            Self::AddRef => "AddRef",
            Self::Release => "Release",
            Self::Initialize => "Initialize",
            Self::CreateDevice => "CreateDevice",
            Self::DestroyDevice => "DestroyDevice",
            Self::AddDeviceClient => "AddDeviceClient",
            Self::RemoveDeviceClient => "RemoveDeviceClient",
            Self::PerformConfigurationChange => "PerformDeviceConfigurationChange",
            Self::AbortConfigurationChange => "AbortDeviceConfigurationChange",
            Self::HasProperty => "HasProperty",
            Self::IsPropertySettable => "IsPropertySettable",
            Self::GetPropertyDataSize => "GetPropertyDataSize",
            Self::GetPropertyData => "GetPropertyData",
            Self::SetPropertyData => "SetPropertyData",
            Self::StartIo => "StartIO",
            Self::StopIo => "StopIO",
            Self::GetZeroTimestamp => "GetZeroTimeStamp",
            Self::WillDoIoOperation => "WillDoIOOperation",
            Self::BeginIoOperation => "BeginIOOperation",
            Self::DoIoOperation => "DoIOOperation",
            Self::EndIoOperation => "EndIOOperation",
        }
    }

    /// Operations called on the realtime IO thread.
    pub const fn is_realtime(self) -> bool {
        matches!(
            self,
            Self::GetZeroTimestamp
                | Self::WillDoIoOperation
                | Self::BeginIoOperation
                | Self::DoIoOperation
                | Self::EndIoOperation
        )
    }
}

/// Everything a tracer learns about one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    /// Unique per driver instance.
    pub call_id: u64,
    pub operation: Operation,
    pub object: ObjectId,
    pub address: Option<PropertyAddress>,
    /// IO operation id for the IO calls.
    pub io_operation: Option<u32>,
}

impl CallInfo {
    pub fn new(call_id: u64, operation: Operation, object: ObjectId) -> Self {
        Self {
            call_id,
            operation,
            object,
            address: None,
            io_operation: None,
        }
    }

    pub fn with_address(mut self, address: PropertyAddress) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_io_operation(mut self, operation: u32) -> Self {
        self.io_operation = Some(operation);
        self
    }
}

impl std::fmt::Display for CallInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}(object={}", self.call_id, self.operation.name(), self.object)?;
        if let Some(address) = self.address {
            write!(
                f,
                ", selector={}, scope={}, element={}",
                strings::property_selector_to_string(address.selector),
                strings::scope_to_string(address.scope),
                address.element
            )?;
        }
        if let Some(op) = self.io_operation {
            write!(f, ", operation={}", strings::operation_to_string(op))?;
        }
        f.write_str(")")
    }
}

/// Receives call spans.
///
/// Implementations must be cheap: spans wrap every call, including the
/// realtime IO operations.
pub trait Tracer: Send + Sync {
    fn begin_span(&self, call: &CallInfo);
    fn end_span(&self, call: &CallInfo, status: Status);
}

/// Tracer that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn begin_span(&self, _call: &CallInfo) {}
    fn end_span(&self, _call: &CallInfo, _status: Status) {}
}

/// Tracer that writes spans to the `log` facade.
///
/// Realtime operations are skipped unless enabled, since formatting on
/// the IO thread allocates.
#[derive(Debug, Clone, Copy)]
pub struct LogTracer {
    level: log::Level,
    realtime: bool,
}

impl LogTracer {
    pub const fn new() -> Self {
        Self {
            level: log::Level::Debug,
            realtime: false,
        }
    }

    pub const fn with_level(mut self, level: log::Level) -> Self {
        self.level = level;
        self
    }

    /// Also trace the realtime IO operations.
    pub const fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    fn enabled(&self, call: &CallInfo) -> bool {
        (self.realtime || !call.operation.is_realtime()) && log::log_enabled!(self.level)
    }
}

impl Default for LogTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracer for LogTracer {
    fn begin_span(&self, call: &CallInfo) {
        if self.enabled(call) {
            log::log!(self.level, "{call}");
        }
    }

    fn end_span(&self, call: &CallInfo, status: Status) {
        if !self.enabled(call) {
            return;
        }
        if status.is_ok() {
            log::log!(self.level, "#{} {} -> OK", call.call_id, call.operation.name());
        } else {
            log::log!(
                self.level,
                "#{} {} -> {}",
                call.call_id,
                call.operation.name(),
                strings::status_to_string(status.code())
            );
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Tracer that records spans in order.
    #[derive(Default)]
    pub struct RecordingTracer {
        pub events: Mutex<Vec<(bool, CallInfo, Option<Status>)>>,
    }

    impl RecordingTracer {
        /// (begin?, operation, status) triples in call order.
        pub fn summary(&self) -> Vec<(bool, Operation, Option<Status>)> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|(begin, call, status)| (*begin, call.operation, *status))
                .collect()
        }
    }

    impl Tracer for RecordingTracer {
        fn begin_span(&self, call: &CallInfo) {
            self.events.lock().unwrap().push((true, *call, None));
        }

        fn end_span(&self, call: &CallInfo, status: Status) {
            self.events.lock().unwrap().push((false, *call, Some(status)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::selector;

    #[test]
    fn test_realtime_operations() {
        assert!(Operation::DoIoOperation.is_realtime());
        assert!(Operation::GetZeroTimestamp.is_realtime());
        assert!(!Operation::GetPropertyData.is_realtime());
    }

    #[test]
    fn test_call_info_display() {
        let call = CallInfo::new(7, Operation::GetPropertyData, ObjectId(3))
            .with_address(PropertyAddress::global(selector::NAME));
        assert_eq!(
            call.to_string(),
            "#7 GetPropertyData(object=3, selector=Name, scope=Global, element=0)"
        );
    }

    #[test]
    fn test_log_tracer_skips_realtime_by_default() {
        let tracer = LogTracer::new();
        let call = CallInfo::new(1, Operation::DoIoOperation, ObjectId(2));
        assert!(!tracer.enabled(&call));
    }
}
