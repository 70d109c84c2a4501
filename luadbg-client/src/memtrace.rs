//! Memory trace events
//!
//! A `MemoryTraceBegin/…/End` list is a full snapshot and replaces what
//! was held; `MemoryTraceStream…` batches append to it.

use luadbg_protocol::{MemoryTraceKind, MemoryTraceRecord};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Staging {
    Snapshot,
    Stream,
}

#[derive(Debug, Default)]
pub struct MemoryTrace {
    events: Vec<MemoryTraceRecord>,
    staged: Vec<MemoryTraceRecord>,
    staging: Option<Staging>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[MemoryTraceRecord] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.staged.clear();
        self.staging = None;
    }

    pub fn begin_snapshot(&mut self) {
        self.start(Staging::Snapshot);
    }

    pub fn begin_stream(&mut self) {
        self.start(Staging::Stream);
    }

    fn start(&mut self, staging: Staging) {
        if let Some(previous) = self.staging {
            warn!(?previous, "memory trace batch restarted before it ended");
        }
        self.staged.clear();
        self.staging = Some(staging);
    }

    pub fn add(&mut self, record: MemoryTraceRecord) {
        if self.staging.is_none() {
            warn!("memory trace record outside a batch");
            return;
        }
        self.staged.push(record);
    }

    pub fn end(&mut self) {
        match self.staging.take() {
            Some(Staging::Snapshot) => {
                self.events = std::mem::take(&mut self.staged);
            }
            Some(Staging::Stream) => {
                self.events.append(&mut self.staged);
            }
            None => {
                warn!("memory trace end without begin");
                return;
            }
        }
        debug!(events = self.events.len(), "memory trace updated");
    }

    /// Net bytes allocated across every recorded event
    pub fn live_bytes(&self) -> i64 {
        self.events
            .iter()
            .map(|e| match e.kind {
                MemoryTraceKind::Allocation => i64::from(e.new_size),
                MemoryTraceKind::Deallocation => -i64::from(e.old_size),
                MemoryTraceKind::Reallocation => i64::from(e.new_size) - i64::from(e.old_size),
            })
            .sum()
    }
}
