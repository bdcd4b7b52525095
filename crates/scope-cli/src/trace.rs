//! Structured step traces for ScopeLang runs.
//!
//! When enabled, the evaluator records every expression it visits together
//! with the environment and both storage regions at that moment. Records are
//! written as JSONL: a header, one `step` per evaluated node, and a footer
//! summarising the run.

use std::io::Write;

use chrono::{SecondsFormat, Utc};

use crate::eval::Value;
use crate::store::Address;

/// Errors from trace emission. A failed trace write aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace write error (execution aborted): serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("trace write error (execution aborted): write {what}: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Trace data types
// ---------------------------------------------------------------------------

/// One environment binding visible at a step.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BindingEntry {
    pub name: String,
    pub address: Address,
}

/// One written cell of a storage region.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CellEntry {
    pub index: usize,
    pub value: Value,
}

impl From<(usize, Value)> for CellEntry {
    fn from((index, value): (usize, Value)) -> Self {
        CellEntry { index, value }
    }
}

/// A single trace entry recording one evaluation step.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StepEntry {
    pub seq: u64,
    /// Nesting depth of the evaluation call that visited `expr`.
    pub depth: usize,
    pub expr: String,
    pub env: Vec<BindingEntry>,
    pub stack: Vec<CellEntry>,
    pub heap: Vec<CellEntry>,
}

// ---------------------------------------------------------------------------
// TraceRecord: versioned trace envelope
// ---------------------------------------------------------------------------

/// Current trace schema version.
pub const TRACE_SCHEMA_VERSION: &str = "0.1";

/// A trace record in the JSONL stream.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "record")]
pub enum TraceRecord {
    #[serde(rename = "header")]
    Header(TraceHeader),
    #[serde(rename = "step")]
    Step(StepEntry),
    #[serde(rename = "footer")]
    Footer(TraceFooter),
}

/// Trace header, the first line of the JSONL stream.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TraceHeader {
    pub schema_version: String,
    pub timestamp: String,
}

/// Trace footer, the last line of the JSONL stream.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct TraceFooter {
    pub timestamp: String,
    pub step_count: u64,
    /// "complete" if finalize() was called normally.
    pub trace_status: String,
    /// "success" or "error".
    pub program_status: String,
}

// ---------------------------------------------------------------------------
// TraceEmitter
// ---------------------------------------------------------------------------

/// Emits JSONL trace records for one program run.
///
/// Call `finalize()` when the program completes to write the footer.
pub struct TraceEmitter {
    seq: u64,
    writer: Option<Box<dyn Write>>,
}

impl std::fmt::Debug for TraceEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceEmitter")
            .field("seq", &self.seq)
            .field("enabled", &self.writer.is_some())
            .finish()
    }
}

impl Default for TraceEmitter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TraceEmitter {
    /// Create a trace emitter that writes JSONL to the given writer.
    ///
    /// Emits a header record immediately.
    pub fn new(writer: Box<dyn Write>) -> Result<Self, TraceError> {
        let mut emitter = Self {
            seq: 0,
            writer: Some(writer),
        };
        emitter.write_record(
            &TraceRecord::Header(TraceHeader {
                schema_version: TRACE_SCHEMA_VERSION.to_string(),
                timestamp: now_rfc3339(),
            }),
            "header",
        )?;
        Ok(emitter)
    }

    /// Create a disabled trace emitter (no output).
    pub fn disabled() -> Self {
        Self {
            seq: 0,
            writer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Return the next sequence number and advance the counter.
    pub fn next_seq(&mut self) -> u64 {
        let s = self.seq;
        self.seq += 1;
        s
    }

    pub fn emit(&mut self, entry: StepEntry) -> Result<(), TraceError> {
        self.write_record(&TraceRecord::Step(entry), "step")
    }

    /// Write the footer record and flush.
    ///
    /// `program_status` should be "success" or "error".
    pub fn finalize(&mut self, program_status: &str) -> Result<(), TraceError> {
        let footer = TraceRecord::Footer(TraceFooter {
            timestamp: now_rfc3339(),
            step_count: self.seq,
            trace_status: "complete".to_string(),
            program_status: program_status.to_string(),
        });
        self.write_record(&footer, "footer")?;
        if let Some(ref mut w) = self.writer {
            w.flush()
                .map_err(|source| TraceError::Write { what: "flush", source })?;
        }
        Ok(())
    }

    fn write_record(&mut self, record: &TraceRecord, what: &'static str) -> Result<(), TraceError> {
        if let Some(ref mut w) = self.writer {
            let json = serde_json::to_string(record)
                .map_err(|source| TraceError::Serialize { what, source })?;
            writeln!(w, "{}", json).map_err(|source| TraceError::Write { what, source })?;
        }
        Ok(())
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
