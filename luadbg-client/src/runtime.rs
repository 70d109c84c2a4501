//! Runtime-side state: hosted Lua states, advertised limits and feature
//! toggles

use luadbg_protocol::{Limits, LuaStateInfo, Message};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct LuaStates {
    states: Vec<LuaStateInfo>,
    staging: Option<Vec<LuaStateInfo>>,
}

impl LuaStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> &[LuaStateInfo] {
        &self.states
    }

    pub fn get(&self, address: &str) -> Option<&LuaStateInfo> {
        self.states.iter().find(|s| s.address == address)
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.staging = None;
    }

    /// A full list follows and replaces the current one
    pub fn begin(&mut self) {
        self.staging = Some(Vec::new());
    }

    /// Outside a list this is an incremental add
    pub fn add(&mut self, state: LuaStateInfo) {
        let list = self.staging.as_mut().unwrap_or(&mut self.states);
        match list.iter_mut().find(|s| s.address == state.address) {
            Some(existing) => *existing = state,
            None => list.push(state),
        }
    }

    pub fn remove(&mut self, address: &str) -> bool {
        let list = self.staging.as_mut().unwrap_or(&mut self.states);
        let before = list.len();
        list.retain(|s| s.address != address);
        before != list.len()
    }

    pub fn end(&mut self) {
        match self.staging.take() {
            Some(states) => {
                debug!(count = states.len(), "lua state list replaced");
                self.states = states;
            }
            None => warn!("lua state list end without begin"),
        }
    }

    /// Flip debugging for one state. Returns the message to send, or
    /// `None` for an unknown address.
    pub fn toggle(&mut self, address: &str) -> Option<Message> {
        let state = self.states.iter_mut().find(|s| s.address == address)?;
        state.debugging = !state.debugging;
        Some(Message::LuaStateToggle {
            address: address.to_string(),
        })
    }

    /// The runtime confirmed or initiated a toggle
    pub fn apply_toggle(&mut self, address: &str) {
        if let Some(state) = self.states.iter_mut().find(|s| s.address == address) {
            state.debugging = !state.debugging;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FeatureError {
    #[error("the runtime does not support the profiler")]
    ProfilerUnavailable,

    #[error("the runtime does not support memory tracing")]
    MemoryTracerUnavailable,

    #[error("the runtime accepts at most {max} variable filters")]
    TooManyFilters { max: u16 },
}

/// Limits reported by the runtime plus the local on/off state of optional
/// features
#[derive(Debug, Default)]
pub struct Features {
    limits: Limits,
    profiler_on: bool,
    memory_tracer_on: bool,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn set_limits(&mut self, limits: Limits) {
        if !limits.profiler_enabled {
            self.profiler_on = false;
        }
        if !limits.memory_tracer_enabled {
            self.memory_tracer_on = false;
        }
        self.limits = limits;
    }

    pub fn profiler_on(&self) -> bool {
        self.profiler_on
    }

    pub fn memory_tracer_on(&self) -> bool {
        self.memory_tracer_on
    }

    pub fn toggle_profiler(&mut self) -> Result<Message, FeatureError> {
        if !self.limits.profiler_enabled {
            return Err(FeatureError::ProfilerUnavailable);
        }
        self.profiler_on = !self.profiler_on;
        Ok(Message::ProfilerToggle)
    }

    pub fn toggle_memory_tracer(&mut self) -> Result<Message, FeatureError> {
        if !self.limits.memory_tracer_enabled {
            return Err(FeatureError::MemoryTracerUnavailable);
        }
        self.memory_tracer_on = !self.memory_tracer_on;
        Ok(Message::MemoryTraceToggle)
    }

    /// Undo a toggle that never reached the runtime
    pub fn revert_profiler_toggle(&mut self) {
        self.profiler_on = !self.profiler_on;
    }

    pub fn revert_memory_tracer_toggle(&mut self) {
        self.memory_tracer_on = !self.memory_tracer_on;
    }

    /// Check a filter count against the runtime's limit. A limit of 0
    /// means unlimited.
    pub fn check_filter_count(&self, count: usize) -> Result<(), FeatureError> {
        let max = self.limits.max_var_filters;
        if max != 0 && count > usize::from(max) {
            return Err(FeatureError::TooManyFilters { max });
        }
        Ok(())
    }

    /// Back to defaults on disconnect
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
