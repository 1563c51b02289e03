//! JSON output format for memory profiles

use crate::aggregation::MemoryReport;
use crate::diagnostics::AttributionDiagnostics;
use crate::memory_record::MemoryRecord;
use crate::profile::MemoryProfile;
use serde::Serialize;

/// A memory record with the operator it was attributed to
#[derive(Debug, Clone, Serialize)]
pub struct JsonMemoryRecord {
    pub tid: u64,
    /// Timestamp in microseconds
    pub ts: i64,
    /// `CPU`, `GPU{n}`, or null for other devices
    pub device: Option<String>,
    pub bytes: i64,
    pub total_allocated: i64,
    pub total_reserved: i64,
    /// Owning operator, null if the record was staled
    pub operator: Option<String>,
}

impl From<&MemoryRecord> for JsonMemoryRecord {
    fn from(record: &MemoryRecord) -> Self {
        let event = record.event();
        Self {
            tid: event.tid,
            ts: event.ts,
            device: record.device_name().map(str::to_string),
            bytes: event.bytes,
            total_allocated: event.total_allocated,
            total_reserved: event.total_reserved,
            operator: record.op_name().map(str::to_string),
        }
    }
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    /// `device -> operator -> [self_increase, self_alloc_bytes,
    /// self_alloc_count, total_increase, total_alloc_bytes,
    /// total_alloc_count, calls]`
    pub memory_stats: MemoryReport,
    pub diagnostics: AttributionDiagnostics,
    pub recommendations: Vec<String>,
    /// Per-record attribution (if --records enabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_records: Option<Vec<JsonMemoryRecord>>,
}

impl JsonOutput {
    /// Build the output for a finished profile
    pub fn new(profile: &MemoryProfile, recommendations: Vec<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "opmem-json-v1".to_string(),
            memory_stats: profile.report.clone(),
            diagnostics: profile.diagnostics,
            recommendations,
            memory_records: None,
        }
    }

    /// Include every record with its attributed operator
    pub fn with_records(mut self, profile: &MemoryProfile) -> Self {
        self.memory_records = Some(profile.records.iter().map(JsonMemoryRecord::from).collect());
        self
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
