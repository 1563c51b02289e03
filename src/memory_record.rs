//! Memory events and the records derived from them
//!
//! A [`MemoryEvent`] is the already-parsed allocator event handed over by the
//! trace parser. A [`MemoryRecord`] wraps one event 1:1 for attribution: it
//! resolves the device name once and carries the name of the operator it was
//! attributed to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Device that owns an allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Cpu,
    Cuda,
    /// Any device the report does not break out (e.g. XPU, MPS)
    #[serde(other)]
    Other,
}

/// Allocator event as emitted by the profiler (`[memory]` instant events)
///
/// Streams are grouped by `tid` and sorted by `ts` before they reach this
/// crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEvent {
    /// Allocator scope
    #[serde(default)]
    pub scope: String,
    pub tid: u64,
    #[serde(default)]
    pub pid: u64,
    /// Timestamp in microseconds
    pub ts: i64,
    pub device_type: DeviceType,
    #[serde(default)]
    pub device_id: i64,
    #[serde(default)]
    pub addr: u64,
    /// Signed byte delta (positive = allocation, negative = free)
    pub bytes: i64,
    #[serde(default)]
    pub total_allocated: i64,
    #[serde(default)]
    pub total_reserved: i64,
}

/// Index of a record in its thread's record list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub usize);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A memory event prepared for attribution
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    event: MemoryEvent,
    device_name: Option<String>,
    op_name: Option<String>,
}

impl MemoryRecord {
    pub fn from_event(event: MemoryEvent) -> Self {
        let device_name = match event.device_type {
            DeviceType::Cpu => Some("CPU".to_string()),
            DeviceType::Cuda => Some(format!("GPU{}", event.device_id)),
            DeviceType::Other => None,
        };

        Self {
            event,
            device_name,
            op_name: None,
        }
    }

    pub fn event(&self) -> &MemoryEvent {
        &self.event
    }

    pub fn tid(&self) -> u64 {
        self.event.tid
    }

    pub fn ts(&self) -> i64 {
        self.event.ts
    }

    pub fn bytes(&self) -> i64 {
        self.event.bytes
    }

    /// `CPU`, `GPU{n}`, or `None` for devices without a report column
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// Name of the operator this record was attributed to
    pub fn op_name(&self) -> Option<&str> {
        self.op_name.as_deref()
    }

    /// Stamp the owning operator. The first stamp wins.
    pub(crate) fn set_op_name(&mut self, name: &str) {
        if self.op_name.is_none() {
            self.op_name = Some(name.to_string());
        }
    }
}

impl From<MemoryEvent> for MemoryRecord {
    fn from(event: MemoryEvent) -> Self {
        Self::from_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(device_type: DeviceType, device_id: i64) -> MemoryEvent {
        MemoryEvent {
            scope: String::new(),
            tid: 1,
            pid: 1,
            ts: 10,
            device_type,
            device_id,
            addr: 0xdead,
            bytes: 512,
            total_allocated: 512,
            total_reserved: 2048,
        }
    }

    #[test]
    fn test_device_name_resolution() {
        assert_eq!(
            MemoryRecord::from_event(event(DeviceType::Cpu, -1)).device_name(),
            Some("CPU")
        );
        assert_eq!(
            MemoryRecord::from_event(event(DeviceType::Cuda, 3)).device_name(),
            Some("GPU3")
        );
        assert_eq!(
            MemoryRecord::from_event(event(DeviceType::Other, 0)).device_name(),
            None
        );
    }

    #[test]
    fn test_op_name_written_once() {
        let mut record = MemoryRecord::from_event(event(DeviceType::Cpu, 0));
        assert!(record.op_name().is_none());

        record.set_op_name("aten::empty");
        record.set_op_name("aten::add");
        assert_eq!(record.op_name(), Some("aten::empty"));
    }

    #[test]
    fn test_unknown_device_type_deserializes_as_other() {
        let json = r#"{"tid": 1, "ts": 5, "device_type": "xpu", "bytes": 8}"#;
        let event: MemoryEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.device_type, DeviceType::Other);
        assert_eq!(event.device_id, 0);
    }
}
